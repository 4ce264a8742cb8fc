use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::api::conditions_schema;
use crate::api::v1alpha1::conditions::{Condition, HasConditions};

/// Lets the cluster reconciler hold a MetalCluster in the store until every
/// machine of the cluster is gone.
pub static METAL_CLUSTER_FINALIZER: &str = "metalcluster.infrastructure.cluster.x-k8s.io";

/// Endpoint used to communicate with the control plane.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct ApiEndpoint {
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: i32,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NetworkRanges {
    #[serde(default)]
    pub cidr_blocks: Vec<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterNetwork {
    pub api_server_port: Option<i32>,
    pub services: Option<NetworkRanges>,
    pub pods: Option<NetworkRanges>,
    pub service_domain: Option<String>,
}

/// Generate the Kubernetes wrapper struct `MetalCluster` from our Spec and Status struct
///
/// This provides a hook for generating the CRD yaml (in crdgen)
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[kube(
    kind = "MetalCluster",
    group = "infrastructure.cluster.x-k8s.io",
    version = "v1alpha1",
    namespaced
)]
#[kube(status = "MetalClusterStatus", shortname = "metalcluster")]
#[kube(printcolumn = r#"{"name":"Ready","type":"boolean","jsonPath":".status.ready"}"#)]
#[serde(rename_all = "camelCase")]
pub struct MetalClusterSpec {
    #[serde(default)]
    pub control_plane_endpoint: Option<ApiEndpoint>,
    #[serde(default)]
    pub cluster_network: Option<ClusterNetwork>,
}

/// Observations of the MetalCluster initialization process.
#[derive(Deserialize, Serialize, Clone, Default, Debug, PartialEq, JsonSchema)]
pub struct MetalClusterInitializationStatus {
    /// True once the infrastructure reports the cluster as fully provisioned.
    pub provisioned: Option<bool>,
}

/// The status object of `MetalCluster`
#[derive(Deserialize, Serialize, Clone, Default, Debug, PartialEq, JsonSchema)]
pub struct MetalClusterStatus {
    /// Legacy readiness flag, mirrored from the `Ready` condition.
    #[serde(default)]
    pub ready: bool,
    pub initialization: Option<MetalClusterInitializationStatus>,
    #[serde(default)]
    #[schemars(schema_with = "conditions_schema")]
    pub conditions: Vec<Condition>,
}

impl HasConditions for MetalCluster {
    fn conditions(&self) -> &[Condition] {
        self.status.as_ref().map(|s| s.conditions.as_slice()).unwrap_or(&[])
    }

    fn set_conditions(&mut self, conditions: Vec<Condition>) {
        self.status.get_or_insert_with(Default::default).conditions = conditions;
    }
}
