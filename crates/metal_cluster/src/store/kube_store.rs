use std::collections::BTreeMap;

use async_trait::async_trait;
use kube::{
    api::{Api, ListParams, Patch, PatchParams},
    client::Client,
    runtime::events::{Event, Recorder, Reporter},
    Resource, ResourceExt,
};
use serde_json::json;
use tracing::*;

use super::{label_selector, ClusterChanges, ObjectKey, ResourceStore};
use crate::api::capi::Cluster;
use crate::api::v1alpha1::{MetalCluster, MetalClusterStatus, MetalMachine};
use crate::util::errors::{Result, StdError};

pub const FIELD_MANAGER: &str = "metal-cluster-controller";

/// `ResourceStore` backed by the Kubernetes API server.
pub struct KubeStore {
    client: Client,
    recorder: Recorder,
}

impl KubeStore {
    pub fn new(client: Client, reporter: Reporter) -> Self {
        Self {
            recorder: Recorder::new(client.clone(), reporter),
            client,
        }
    }

    fn patch_params() -> PatchParams {
        PatchParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        }
    }
}

enum Write<'a> {
    Finalizers(&'a [String]),
    Status(&'a MetalClusterStatus),
}

#[async_trait]
impl ResourceStore for KubeStore {
    async fn get_metal_cluster(&self, key: &ObjectKey) -> Result<Option<MetalCluster>> {
        let api: Api<MetalCluster> = Api::namespaced(self.client.clone(), &key.namespace);
        Ok(api.get_opt(&key.name).await.map_err(StdError::from)?)
    }

    async fn get_cluster(&self, key: &ObjectKey) -> Result<Option<Cluster>> {
        let api: Api<Cluster> = Api::namespaced(self.client.clone(), &key.namespace);
        Ok(api.get_opt(&key.name).await.map_err(StdError::from)?)
    }

    async fn list_metal_machines(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<MetalMachine>> {
        let api: Api<MetalMachine> = Api::namespaced(self.client.clone(), namespace);
        let lp = ListParams::default().labels(&label_selector(labels));
        let machines = api.list(&lp).await.map_err(StdError::from)?;
        Ok(machines.items)
    }

    /// Finalizers live on the main resource and status on its subresource, so
    /// the change set is written as up to two merge patches. Each one carries
    /// the resource version returned by the previous write, and a conflict on
    /// either aborts the rest.
    async fn update_metal_cluster(&self, cluster: &MetalCluster, changes: &ClusterChanges) -> Result<MetalCluster> {
        let name = cluster.name_any();
        let namespace = cluster
            .namespace()
            .ok_or_else(|| StdError::MetadataMissing(format!("namespace of MetalCluster {name}")))?;
        let mut resource_version = cluster
            .resource_version()
            .ok_or_else(|| StdError::MetadataMissing(format!("resourceVersion of MetalCluster {name}")))?;
        let api: Api<MetalCluster> = Api::namespaced(self.client.clone(), &namespace);

        let mut writes = Vec::new();
        if let Some(finalizers) = &changes.finalizers {
            writes.push(Write::Finalizers(finalizers));
        }
        if let Some(status) = &changes.status {
            writes.push(Write::Status(status));
        }
        // Once a deleting object has no finalizers left it may be gone, so
        // releasing finalizers has to be the last write.
        if cluster.meta().deletion_timestamp.is_some() {
            writes.reverse();
        }

        let mut latest = cluster.clone();
        for write in writes {
            latest = match write {
                Write::Finalizers(finalizers) => {
                    debug!("patching finalizers of {namespace}/{name} at {resource_version}");
                    let patch = json!({
                        "metadata": {
                            "resourceVersion": resource_version,
                            "finalizers": finalizers,
                        }
                    });
                    api.patch(&name, &Self::patch_params(), &Patch::Merge(&patch))
                        .await
                        .map_err(StdError::from)?
                }
                Write::Status(status) => {
                    debug!("patching status of {namespace}/{name} at {resource_version}");
                    let patch = json!({
                        "metadata": {
                            "resourceVersion": resource_version,
                        },
                        "status": status,
                    });
                    api.patch_status(&name, &Self::patch_params(), &Patch::Merge(&patch))
                        .await
                        .map_err(StdError::from)?
                }
            };
            resource_version = latest.resource_version().unwrap_or(resource_version);
        }
        Ok(latest)
    }

    async fn publish_event(&self, cluster: &MetalCluster, event: &Event) -> Result<()> {
        self.recorder
            .publish(event, &cluster.object_ref(&()))
            .await
            .map_err(StdError::KubeError)?;
        Ok(())
    }
}
