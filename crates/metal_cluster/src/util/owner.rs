use kube::api::ObjectMeta;
use tracing::*;

use crate::api::capi::{api_group, Cluster, CLUSTER_API_GROUP, CLUSTER_KIND};
use crate::store::{ObjectKey, ResourceStore};
use crate::util::errors::{Result, StdError};

/// Key of the owning `Cluster`, taken from the first owner reference of kind
/// `Cluster` in the Cluster API group. Owners live in the dependent's namespace.
pub fn owner_cluster_key(meta: &ObjectMeta) -> Option<ObjectKey> {
    let namespace = meta.namespace.as_deref()?;
    meta.owner_references
        .as_ref()?
        .iter()
        .find(|r| r.kind == CLUSTER_KIND && api_group(&r.api_version) == CLUSTER_API_GROUP)
        .map(|r| ObjectKey::new(namespace, &r.name))
}

/// Resolve the owning `Cluster` of an object.
///
/// Returns `Ok(None)` when no owner reference has been set yet. A reference to
/// a cluster that cannot be read is an error, the caller backs off and retries.
pub async fn get_owner_cluster(store: &dyn ResourceStore, meta: &ObjectMeta) -> Result<Option<Cluster>> {
    let Some(key) = owner_cluster_key(meta) else {
        return Ok(None);
    };
    match store.get_cluster(&key).await? {
        Some(cluster) => Ok(Some(cluster)),
        None => {
            debug!("owner cluster {} referenced but not found", key);
            Err(StdError::OwnerNotFound(key.to_string()).into())
        }
    }
}
