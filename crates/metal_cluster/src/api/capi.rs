//! The parts of the Cluster API contract this controller reads.
//!
//! `Cluster` is owned by the Cluster API core controllers. Only the fields
//! needed for ownership, pausing and the infrastructure back-reference are
//! modelled; everything else on the object is ignored when decoding.

use kube::CustomResource;
use serde::{Deserialize, Serialize};

pub const CLUSTER_API_GROUP: &str = "cluster.x-k8s.io";
pub const CLUSTER_KIND: &str = "Cluster";

/// Label linking machines (and other cluster-scoped dependents) to their cluster by name.
pub const CLUSTER_NAME_LABEL: &str = "cluster.x-k8s.io/cluster-name";
/// Annotation that suspends reconciliation of the object carrying it.
pub const PAUSED_ANNOTATION: &str = "cluster.x-k8s.io/paused";

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContractReference {
    pub api_version: Option<String>,
    pub kind: String,
    pub name: String,
    pub namespace: Option<String>,
}

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default)]
#[kube(
    kind = "Cluster",
    group = "cluster.x-k8s.io",
    version = "v1beta1",
    namespaced,
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    #[serde(default)]
    pub paused: bool,
    pub infrastructure_ref: Option<ContractReference>,
}

/// Returns the group part of an `apiVersion` string; the core group is empty.
pub fn api_group(api_version: &str) -> &str {
    match api_version.split_once('/') {
        Some((group, _)) => group,
        None => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_group_splits_version() {
        assert_eq!(api_group("cluster.x-k8s.io/v1beta1"), "cluster.x-k8s.io");
        assert_eq!(api_group("v1"), "");
    }

    #[test]
    fn cluster_decodes_partial_view() {
        let cluster: Cluster = serde_json::from_value(serde_json::json!({
            "apiVersion": "cluster.x-k8s.io/v1beta1",
            "kind": "Cluster",
            "metadata": { "name": "capi", "namespace": "default" },
            "spec": {
                "paused": true,
                "controlPlaneRef": { "kind": "KubeadmControlPlane", "name": "cp" },
                "infrastructureRef": {
                    "apiVersion": "infrastructure.cluster.x-k8s.io/v1alpha1",
                    "kind": "MetalCluster",
                    "name": "capi"
                }
            }
        }))
        .unwrap();

        assert!(cluster.spec.paused);
        let infra = cluster.spec.infrastructure_ref.unwrap();
        assert_eq!(infra.kind, "MetalCluster");
        assert_eq!(infra.namespace, None);
    }
}
