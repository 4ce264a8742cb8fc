//! Builders and an in-memory `ResourceStore` shared by the unit tests.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::runtime::events::{Event, EventType};
use kube::{api::ObjectMeta, Resource, ResourceExt};
use serde_json::json;

use crate::api::capi::{Cluster, ClusterSpec, ContractReference, CLUSTER_NAME_LABEL, PAUSED_ANNOTATION};
use crate::api::v1alpha1::{MetalCluster, MetalClusterSpec, MetalMachine, MetalMachineSpec, API_VERSION};
use crate::store::{ClusterChanges, ObjectKey, ResourceStore};
use crate::util::errors::{Result, StdError};

pub const NAMESPACE: &str = "default";

fn deletion_marker() -> Option<k8s_openapi::apimachinery::pkg::apis::meta::v1::Time> {
    serde_json::from_value(json!("2025-01-01T00:00:00Z")).unwrap()
}

/// An owner `Cluster` pointing back at a MetalCluster of the same name.
pub fn capi_cluster(name: &str) -> Cluster {
    let mut cluster = Cluster::new(
        name,
        ClusterSpec {
            paused: false,
            infrastructure_ref: Some(ContractReference {
                api_version: Some(API_VERSION.to_string()),
                kind: "MetalCluster".to_string(),
                name: name.to_string(),
                namespace: None,
            }),
        },
    );
    cluster.metadata.namespace = Some(NAMESPACE.to_string());
    cluster.metadata.uid = Some(format!("{name}-uid"));
    cluster
}

pub fn deleting<K: Resource>(mut obj: K) -> K {
    obj.meta_mut().deletion_timestamp = deletion_marker();
    obj
}

pub fn paused<K: Resource>(mut obj: K) -> K {
    obj.meta_mut()
        .annotations
        .get_or_insert_with(BTreeMap::new)
        .insert(PAUSED_ANNOTATION.to_string(), "true".to_string());
    obj
}

/// A MetalCluster, owned by `owner` when given.
pub fn metal_cluster(name: &str, owner: Option<&Cluster>) -> MetalCluster {
    let mut metal = MetalCluster::new(name, MetalClusterSpec::default());
    metal.metadata.namespace = Some(NAMESPACE.to_string());
    metal.metadata.owner_references = owner.map(|cluster| {
        vec![OwnerReference {
            api_version: "cluster.x-k8s.io/v1beta1".to_string(),
            kind: "Cluster".to_string(),
            name: cluster.name_any(),
            uid: cluster.uid().unwrap_or_default(),
            ..Default::default()
        }]
    });
    metal
}

/// A MetalMachine labelled as belonging to `cluster_name`.
pub fn metal_machine(name: &str, cluster_name: &str) -> MetalMachine {
    MetalMachine {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(NAMESPACE.to_string()),
            labels: Some(BTreeMap::from([(CLUSTER_NAME_LABEL.to_string(), cluster_name.to_string())])),
            ..Default::default()
        },
        spec: MetalMachineSpec {
            image: "ubuntu-24.04".to_string(),
            ..Default::default()
        },
        status: None,
    }
}

/// An event published through [`InMemoryStore`].
#[derive(Clone, Debug, PartialEq)]
pub struct RecordedEvent {
    pub key: ObjectKey,
    pub reason: String,
    pub warning: bool,
}

/// Store keeping objects in maps, with the optimistic locking and finalizer
/// semantics of the API server.
#[derive(Default)]
pub struct InMemoryStore {
    metal_clusters: Mutex<BTreeMap<ObjectKey, MetalCluster>>,
    clusters: Mutex<BTreeMap<ObjectKey, Cluster>>,
    machines: Mutex<BTreeMap<ObjectKey, MetalMachine>>,
    events: Mutex<Vec<RecordedEvent>>,
    version: AtomicU64,
    writes: AtomicUsize,
    fail_list: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_version(&self) -> String {
        (self.version.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }

    fn key<K: Resource>(obj: &K) -> ObjectKey {
        ObjectKey::from_resource(obj).unwrap()
    }

    pub fn insert_cluster(&self, mut cluster: Cluster) -> ObjectKey {
        cluster.metadata.resource_version = Some(self.next_version());
        let key = Self::key(&cluster);
        self.clusters.lock().unwrap().insert(key.clone(), cluster);
        key
    }

    pub fn insert_metal_cluster(&self, mut metal: MetalCluster) -> ObjectKey {
        metal.metadata.resource_version = Some(self.next_version());
        let key = Self::key(&metal);
        self.metal_clusters.lock().unwrap().insert(key.clone(), metal);
        key
    }

    pub fn insert_machine(&self, machine: MetalMachine) -> ObjectKey {
        let key = Self::key(&machine);
        self.machines.lock().unwrap().insert(key.clone(), machine);
        key
    }

    pub fn remove_machine(&self, key: &ObjectKey) {
        self.machines.lock().unwrap().remove(key);
    }

    /// Request deletion the way the API server does: objects without
    /// finalizers go at once, others only get the deletion marker.
    pub fn delete_metal_cluster(&self, key: &ObjectKey) {
        let mut metal_clusters = self.metal_clusters.lock().unwrap();
        let Some(metal) = metal_clusters.get_mut(key) else {
            return;
        };
        if metal.finalizers().is_empty() {
            metal_clusters.remove(key);
            return;
        }
        metal.metadata.deletion_timestamp = deletion_marker();
        metal.metadata.resource_version = Some(self.next_version());
    }

    pub fn delete_cluster(&self, key: &ObjectKey) {
        if let Some(cluster) = self.clusters.lock().unwrap().get_mut(key) {
            cluster.metadata.deletion_timestamp = deletion_marker();
            cluster.metadata.resource_version = Some(self.next_version());
        }
    }

    /// Simulate a write by another actor.
    pub fn touch_metal_cluster(&self, key: &ObjectKey) {
        if let Some(metal) = self.metal_clusters.lock().unwrap().get_mut(key) {
            metal.metadata.resource_version = Some(self.next_version());
        }
    }

    pub fn metal_cluster(&self, key: &ObjectKey) -> Option<MetalCluster> {
        self.metal_clusters.lock().unwrap().get(key).cloned()
    }

    /// Number of successful updates so far.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn fail_list(&self, fail: bool) {
        self.fail_list.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ResourceStore for InMemoryStore {
    async fn get_metal_cluster(&self, key: &ObjectKey) -> Result<Option<MetalCluster>> {
        Ok(self.metal_cluster(key))
    }

    async fn get_cluster(&self, key: &ObjectKey) -> Result<Option<Cluster>> {
        Ok(self.clusters.lock().unwrap().get(key).cloned())
    }

    async fn list_metal_machines(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<MetalMachine>> {
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(StdError::InvalidArgument("list unavailable".to_string()).into());
        }
        Ok(self
            .machines
            .lock()
            .unwrap()
            .values()
            .filter(|m| m.namespace().as_deref() == Some(namespace))
            .filter(|m| labels.iter().all(|(k, v)| m.labels().get(k) == Some(v)))
            .cloned()
            .collect())
    }

    async fn update_metal_cluster(&self, cluster: &MetalCluster, changes: &ClusterChanges) -> Result<MetalCluster> {
        let key = Self::key(cluster);
        let mut metal_clusters = self.metal_clusters.lock().unwrap();
        let Some(stored) = metal_clusters.get_mut(&key) else {
            return Err(StdError::Conflict(format!("{key} no longer exists")).into());
        };
        if stored.resource_version() != cluster.resource_version() {
            return Err(StdError::Conflict(format!(
                "{key} is at {:?}, write based on {:?}",
                stored.resource_version(),
                cluster.resource_version()
            ))
            .into());
        }

        if let Some(finalizers) = &changes.finalizers {
            stored.metadata.finalizers = Some(finalizers.clone());
        }
        if let Some(status) = &changes.status {
            stored.status = Some(status.clone());
        }
        stored.metadata.resource_version = Some(self.next_version());
        self.writes.fetch_add(1, Ordering::SeqCst);

        let updated = stored.clone();
        if updated.meta().deletion_timestamp.is_some() && updated.finalizers().is_empty() {
            metal_clusters.remove(&key);
        }
        Ok(updated)
    }

    async fn publish_event(&self, cluster: &MetalCluster, event: &Event) -> Result<()> {
        self.events.lock().unwrap().push(RecordedEvent {
            key: Self::key(cluster),
            reason: event.reason.clone(),
            warning: matches!(event.type_, EventType::Warning),
        });
        Ok(())
    }
}
