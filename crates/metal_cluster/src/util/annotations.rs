use kube::ResourceExt;

use crate::api::capi::{Cluster, PAUSED_ANNOTATION};

/// Returns true when the object carries the paused annotation, whatever its value.
pub fn has_paused<K: ResourceExt>(obj: &K) -> bool {
    obj.annotations().contains_key(PAUSED_ANNOTATION)
}

/// Returns true when either the owning cluster or the object itself is paused.
pub fn is_paused<K: ResourceExt>(cluster: &Cluster, obj: &K) -> bool {
    cluster.spec.paused || has_paused(cluster) || has_paused(obj)
}
