use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::api::conditions_schema;
use crate::api::v1alpha1::conditions::{Condition, HasConditions};

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
pub struct LabelSelectorRequirement {
    pub key: String,
    pub operator: String,
    #[serde(default)]
    pub values: Vec<String>,
}

/// Matching criteria for labels on servers.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServerSelector {
    pub match_labels: Option<BTreeMap<String, String>>,
    pub match_expressions: Option<Vec<LabelSelectorRequirement>>,
}

/// Reference to the IPAM object used for IP allocation.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IpamObjectReference {
    pub name: String,
    pub api_group: String,
    pub kind: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IpamConfig {
    /// Name of the metadata key the allocated address is published under.
    pub metadata_key: String,
    pub ipam_ref: IpamObjectReference,
}

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[kube(
    kind = "MetalMachine",
    group = "infrastructure.cluster.x-k8s.io",
    version = "v1alpha1",
    namespaced
)]
#[kube(status = "MetalMachineStatus", shortname = "metalmachine")]
#[serde(rename_all = "camelCase")]
pub struct MetalMachineSpec {
    #[serde(rename = "providerID")]
    pub provider_id: Option<String>,
    /// Boot image for the server.
    pub image: String,
    pub server_selector: Option<ServerSelector>,
    #[serde(default)]
    pub ipam_config: Vec<IpamConfig>,
    /// Additional data passed to the machine.
    pub metadata: Option<serde_json::Value>,
}

#[derive(Deserialize, Serialize, Clone, Default, Debug, PartialEq, JsonSchema)]
pub struct MetalMachineInitializationStatus {
    pub provisioned: Option<bool>,
}

/// The status object of `MetalMachine`
#[derive(Deserialize, Serialize, Clone, Default, Debug, PartialEq, JsonSchema)]
pub struct MetalMachineStatus {
    #[serde(default)]
    pub ready: bool,
    pub initialization: Option<MetalMachineInitializationStatus>,
    #[serde(default)]
    #[schemars(schema_with = "conditions_schema")]
    pub conditions: Vec<Condition>,
}

impl HasConditions for MetalMachine {
    fn conditions(&self) -> &[Condition] {
        self.status.as_ref().map(|s| s.conditions.as_slice()).unwrap_or(&[])
    }

    fn set_conditions(&mut self, conditions: Vec<Condition>) {
        self.status.get_or_insert_with(Default::default).conditions = conditions;
    }
}
