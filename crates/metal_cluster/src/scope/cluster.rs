use std::sync::Arc;

use kube::ResourceExt;
use tracing::*;

use crate::api::capi::Cluster;
use crate::api::v1alpha1::conditions::{
    ConditionStatus, HasConditions, StatusReason, CLUSTER_READY_CONDITION, READY_CONDITION,
};
use crate::api::v1alpha1::{MetalCluster, MetalClusterStatus, METAL_CLUSTER_FINALIZER};
use crate::store::{ClusterChanges, ResourceStore};
use crate::util::errors::{Result, StdError};
use crate::util::status::{find_status_condition, mark_true, set_summary};

/// Condition types folded into the `Ready` summary.
const TRACKED_CONDITIONS: &[&str] = &[CLUSTER_READY_CONDITION];

/// Parameters for building a [`ClusterScope`]. A missing store, cluster or
/// MetalCluster fails construction with `StdError::InvalidScope`.
#[derive(Default)]
pub struct ClusterScopeParams {
    pub store: Option<Arc<dyn ResourceStore>>,
    pub cluster: Option<Cluster>,
    pub metal_cluster: Option<MetalCluster>,
    pub controller_name: String,
}

/// The owner `Cluster` and the `MetalCluster` of one reconcile pass.
///
/// Mutations are made on an in-memory copy; [`ClusterScope::close`] diffs it
/// against the snapshot taken at construction and writes the difference.
pub struct ClusterScope {
    store: Arc<dyn ResourceStore>,
    cluster: Cluster,
    metal_cluster: MetalCluster,
    baseline: MetalCluster,
    controller_name: String,
}

impl ClusterScope {
    pub fn new(params: ClusterScopeParams) -> Result<Self> {
        let store = params
            .store
            .ok_or_else(|| StdError::InvalidScope("store is required when creating a ClusterScope".to_string()))?;
        let cluster = params
            .cluster
            .ok_or_else(|| StdError::InvalidScope("Cluster is required when creating a ClusterScope".to_string()))?;
        let metal_cluster = params.metal_cluster.ok_or_else(|| {
            StdError::InvalidScope("MetalCluster is required when creating a ClusterScope".to_string())
        })?;
        if metal_cluster.metadata.name.is_none() || metal_cluster.metadata.namespace.is_none() {
            return Err(StdError::InvalidScope("MetalCluster must have a name and a namespace".to_string()).into());
        }

        Ok(Self {
            store,
            cluster,
            baseline: metal_cluster.clone(),
            metal_cluster,
            controller_name: params.controller_name,
        })
    }

    /// Name of the owner cluster.
    pub fn name(&self) -> String {
        self.cluster.name_any()
    }

    /// Namespace of the owner cluster.
    pub fn namespace(&self) -> String {
        self.cluster.namespace().unwrap_or_default()
    }

    pub fn infra_cluster_name(&self) -> String {
        self.metal_cluster.name_any()
    }

    /// Name of the workload cluster, which is the owner cluster's name.
    pub fn kubernetes_cluster_name(&self) -> String {
        self.name()
    }

    pub fn controller_name(&self) -> &str {
        &self.controller_name
    }

    pub fn cluster(&self) -> &Cluster {
        &self.cluster
    }

    pub fn metal_cluster(&self) -> &MetalCluster {
        &self.metal_cluster
    }

    pub fn is_deleting(&self) -> bool {
        self.metal_cluster.metadata.deletion_timestamp.is_some()
    }

    /// Returns whether the finalizer had to be added.
    pub fn add_finalizer(&mut self) -> bool {
        if self.metal_cluster.finalizers().iter().any(|f| f == METAL_CLUSTER_FINALIZER) {
            return false;
        }
        self.metal_cluster
            .finalizers_mut()
            .push(METAL_CLUSTER_FINALIZER.to_string());
        true
    }

    /// Returns whether the finalizer was present.
    pub fn remove_finalizer(&mut self) -> bool {
        let finalizers = self.metal_cluster.finalizers_mut();
        let before = finalizers.len();
        finalizers.retain(|f| f != METAL_CLUSTER_FINALIZER);
        finalizers.len() != before
    }

    pub fn mark_cluster_ready(&mut self) {
        mark_true(
            &mut self.metal_cluster,
            CLUSTER_READY_CONDITION,
            &StatusReason::InfrastructureReady.to_string(),
        );
    }

    pub fn set_ready(&mut self, ready: bool) {
        self.metal_cluster
            .status
            .get_or_insert_with(Default::default)
            .ready = ready;
    }

    /// Differences between the current object and the construction snapshot.
    pub fn changes(&self) -> ClusterChanges {
        let finalizers = (self.metal_cluster.finalizers() != self.baseline.finalizers())
            .then(|| self.metal_cluster.finalizers().to_vec());

        let status = self.metal_cluster.status.clone().unwrap_or_default();
        let baseline_status = self.baseline.status.clone().unwrap_or_default();
        let status = (status != baseline_status).then_some(status);

        ClusterChanges { finalizers, status }
    }

    /// Recompute the summary condition and project it into the legacy fields.
    fn summarize(&mut self) {
        set_summary(&mut self.metal_cluster, READY_CONDITION, TRACKED_CONDITIONS);

        let Some(ready) = find_status_condition(self.metal_cluster.conditions(), READY_CONDITION)
            .map(|c| c.status == ConditionStatus::True)
        else {
            return;
        };
        let status: &mut MetalClusterStatus = self.metal_cluster.status.get_or_insert_with(Default::default);
        status.ready = ready;
        status
            .initialization
            .get_or_insert_with(Default::default)
            .provisioned = Some(ready);
    }

    /// Commit every mutation made through this scope in a single write.
    ///
    /// Nothing is written when nothing changed. The write is based on the
    /// resource version seen at construction, so a concurrent change to the
    /// object makes it fail with `StdError::Conflict`.
    pub async fn close(mut self) -> Result<()> {
        self.summarize();

        let changes = self.changes();
        if changes.is_empty() {
            debug!("no changes to persist for MetalCluster {}", self.infra_cluster_name());
            return Ok(());
        }

        debug!(
            finalizers = changes.finalizers.is_some(),
            status = changes.status.is_some(),
            "persisting MetalCluster {}",
            self.infra_cluster_name()
        );
        self.store.update_metal_cluster(&self.baseline, &changes).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{capi_cluster, metal_cluster, InMemoryStore};
    use crate::store::{MockResourceStore, ObjectKey};
    use crate::util::status::is_status_condition_true;

    fn params(store: Arc<dyn ResourceStore>, metal: MetalCluster) -> ClusterScopeParams {
        let cluster = capi_cluster("capi");
        ClusterScopeParams {
            store: Some(store),
            cluster: Some(cluster),
            metal_cluster: Some(metal),
            controller_name: "metalcluster".to_string(),
        }
    }

    fn stored(store: &InMemoryStore) -> (ObjectKey, MetalCluster) {
        let cluster = capi_cluster("capi");
        let key = store.insert_metal_cluster(metal_cluster("capi", Some(&cluster)));
        let metal = store.metal_cluster(&key).unwrap();
        (key, metal)
    }

    #[test]
    fn construction_requires_every_part() {
        let store: Arc<dyn ResourceStore> = Arc::new(InMemoryStore::new());
        let metal = metal_cluster("capi", None);

        let missing_store = ClusterScopeParams {
            store: None,
            ..params(store.clone(), metal.clone())
        };
        let missing_cluster = ClusterScopeParams {
            cluster: None,
            ..params(store.clone(), metal.clone())
        };
        let missing_metal = ClusterScopeParams {
            metal_cluster: None,
            ..params(store.clone(), metal.clone())
        };
        let mut nameless = metal.clone();
        nameless.metadata.namespace = None;

        let unnamespaced = params(store.clone(), nameless);
        for incomplete in [missing_store, missing_cluster, missing_metal, unnamespaced] {
            assert!(matches!(
                ClusterScope::new(incomplete),
                Err(crate::util::errors::Error::StdError(StdError::InvalidScope(_)))
            ));
        }
    }

    #[test]
    fn accessors_read_owner_and_infra_names() {
        let store: Arc<dyn ResourceStore> = Arc::new(InMemoryStore::new());
        let scope = ClusterScope::new(params(store, metal_cluster("metal", None))).unwrap();

        assert_eq!(scope.name(), "capi");
        assert_eq!(scope.namespace(), "default");
        assert_eq!(scope.infra_cluster_name(), "metal");
        assert_eq!(scope.kubernetes_cluster_name(), "capi");
        assert_eq!(scope.kubernetes_cluster_name(), scope.cluster().name_any());
        assert_eq!(scope.controller_name(), "metalcluster");
    }

    #[test]
    fn finalizer_has_set_semantics() {
        let store: Arc<dyn ResourceStore> = Arc::new(InMemoryStore::new());
        let mut scope = ClusterScope::new(params(store, metal_cluster("capi", None))).unwrap();

        assert!(scope.add_finalizer());
        assert!(!scope.add_finalizer());
        assert_eq!(scope.metal_cluster().finalizers(), &[METAL_CLUSTER_FINALIZER.to_string()]);
        assert!(scope.remove_finalizer());
        assert!(!scope.remove_finalizer());
        assert!(scope.changes().is_empty());
    }

    #[tokio::test]
    async fn close_without_changes_does_not_write() {
        let mut store = MockResourceStore::new();
        store.expect_update_metal_cluster().times(0);
        let scope = ClusterScope::new(params(Arc::new(store), metal_cluster("capi", None))).unwrap();

        scope.close().await.unwrap();
    }

    #[tokio::test]
    async fn close_writes_summary_and_legacy_fields() {
        let mut store = MockResourceStore::new();
        store
            .expect_update_metal_cluster()
            .times(1)
            .withf(|_, changes| {
                let Some(status) = &changes.status else {
                    return false;
                };
                changes.finalizers == Some(vec![METAL_CLUSTER_FINALIZER.to_string()])
                    && status.ready
                    && status.initialization.as_ref().and_then(|i| i.provisioned) == Some(true)
                    && is_status_condition_true(&status.conditions, READY_CONDITION)
                    && is_status_condition_true(&status.conditions, CLUSTER_READY_CONDITION)
            })
            .returning(|metal, _| Ok(metal.clone()));

        let mut scope = ClusterScope::new(params(Arc::new(store), metal_cluster("capi", None))).unwrap();
        scope.add_finalizer();
        scope.mark_cluster_ready();
        scope.close().await.unwrap();
    }

    #[tokio::test]
    async fn close_is_a_noop_once_persisted() {
        let store = Arc::new(InMemoryStore::new());
        let (key, metal) = stored(&store);

        let mut scope = ClusterScope::new(params(store.clone(), metal)).unwrap();
        scope.add_finalizer();
        scope.mark_cluster_ready();
        scope.set_ready(true);
        scope.close().await.unwrap();
        assert_eq!(store.writes(), 1);

        let mut scope = ClusterScope::new(params(store.clone(), store.metal_cluster(&key).unwrap())).unwrap();
        scope.add_finalizer();
        scope.mark_cluster_ready();
        scope.set_ready(true);
        scope.close().await.unwrap();
        assert_eq!(store.writes(), 1);
    }

    #[tokio::test]
    async fn close_on_stale_version_conflicts() {
        let store = Arc::new(InMemoryStore::new());
        let (key, metal) = stored(&store);

        let mut scope = ClusterScope::new(params(store.clone(), metal)).unwrap();
        scope.add_finalizer();
        store.touch_metal_cluster(&key);

        let err = scope.close().await.unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(store.writes(), 0);
        assert!(store.metal_cluster(&key).unwrap().finalizers().is_empty());
    }
}
