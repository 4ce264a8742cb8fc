//! Access to the objects the cluster reconciler reads and writes.
//!
//! The reconciler only talks to the store through [`ResourceStore`], so the
//! same state machine runs against the API server in production and against
//! an in-memory store in tests.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use kube::runtime::events::Event;
use kube::{Resource, ResourceExt};

#[cfg(test)]
use mockall::automock;

use crate::api::capi::Cluster;
use crate::api::v1alpha1::{MetalCluster, MetalClusterStatus, MetalMachine};
use crate::util::errors::Result;

mod kube_store;

pub use kube_store::KubeStore;

/// Namespaced identity of an object.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: &str, name: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    /// Key of a namespaced object; `None` when name or namespace is unset.
    pub fn from_resource<K: Resource>(obj: &K) -> Option<Self> {
        Some(Self {
            namespace: obj.namespace()?,
            name: obj.meta().name.clone()?,
        })
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Fields of a MetalCluster that differ from the snapshot a write is based on.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ClusterChanges {
    pub finalizers: Option<Vec<String>>,
    pub status: Option<MetalClusterStatus>,
}

impl ClusterChanges {
    pub fn is_empty(&self) -> bool {
        self.finalizers.is_none() && self.status.is_none()
    }
}

/// Trait abstracting the object store for the cluster reconciler
///
/// Reads may be served from a cache and lag behind writes.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ResourceStore: Send + Sync {
    async fn get_metal_cluster(&self, key: &ObjectKey) -> Result<Option<MetalCluster>>;

    async fn get_cluster(&self, key: &ObjectKey) -> Result<Option<Cluster>>;

    /// List the machines in `namespace` carrying every label in `labels`.
    async fn list_metal_machines(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<MetalMachine>>;

    /// Write `changes` on top of `cluster`, whose resource version is the
    /// expected current version of the stored object.
    ///
    /// Fails with `StdError::Conflict` when the stored object has moved on.
    /// Against the API server, finalizers and status are separate writes: a
    /// conflict on the second one leaves the first committed, and the next
    /// pass recomputes the remainder from the object as stored.
    async fn update_metal_cluster(&self, cluster: &MetalCluster, changes: &ClusterChanges) -> Result<MetalCluster>;

    /// Publish `event` about `cluster`.
    async fn publish_event(&self, cluster: &MetalCluster, event: &Event) -> Result<()>;
}

/// Render labels as an equality-based label selector.
pub fn label_selector(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}
