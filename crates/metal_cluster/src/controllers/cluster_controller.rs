use std::any::Any;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::{FutureExt, StreamExt};
use kube::{
    api::{Api, ResourceExt},
    client::Client,
    runtime::{
        controller::{Action, Controller},
        events::{Event, EventType},
        reflector::ObjectRef,
        watcher::Config,
    },
    Resource,
};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::*;

use crate::api::capi::{api_group, Cluster, CLUSTER_NAME_LABEL};
use crate::api::scheme::Scheme;
use crate::api::v1alpha1::{MetalCluster, GROUP};
use crate::scope::{ClusterScope, ClusterScopeParams};
use crate::store::{KubeStore, ObjectKey, ResourceStore};
use crate::util::annotations::is_paused;
use crate::util::config::ControllerConfig;
use crate::util::errors::{Error, Result, StdError};
use crate::util::owner::get_owner_cluster;
use crate::util::{metrics, telemetry};

/// Event reason reported while a MetalCluster is deleted ahead of its owner.
pub const DELETION_BLOCKED_REASON: &str = "DeletionBlocked";

/// What a reconcile pass found the MetalCluster in. Only reported, never stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ReconcileState {
    Missing,
    AwaitingOwner,
    Paused,
    Active,
    DeletingBlocked,
    DeletingWaiting,
    DeletingComplete,
}

impl ReconcileState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconcileState::Missing => "missing",
            ReconcileState::AwaitingOwner => "awaitingowner",
            ReconcileState::Paused => "paused",
            ReconcileState::Active => "active",
            ReconcileState::DeletingBlocked => "deletingblocked",
            ReconcileState::DeletingWaiting => "deletingwaiting",
            ReconcileState::DeletingComplete => "deletingcomplete",
        }
    }
}

/// State shared between the controller and the web server
#[derive(Clone, Default)]
pub struct State {
    /// Diagnostics populated by the reconciler
    diagnostics: Arc<RwLock<Diagnostics>>,
    /// Metrics registry
    registry: prometheus::Registry,
}

/// State wrapper around the controller outputs for the web server
impl State {
    /// Metrics getter
    pub fn metrics(&self) -> Vec<prometheus::proto::MetricFamily> {
        self.registry.gather()
    }

    /// State getter
    pub async fn diagnostics(&self) -> Diagnostics {
        self.diagnostics.read().await.clone()
    }

    // Create a Controller Context that can update State
    pub fn to_context(
        &self,
        store: Arc<dyn ResourceStore>,
        config: ControllerConfig,
    ) -> std::result::Result<Arc<Context>, prometheus::Error> {
        Ok(Arc::new(Context {
            store,
            metrics: metrics::Metrics::new()?.register(&self.registry)?,
            diagnostics: self.diagnostics.clone(),
            config,
        }))
    }
}

// Context for our reconciler
#[derive(Clone)]
pub struct Context {
    /// Object store the reconciler reads from and commits to
    pub store: Arc<dyn ResourceStore>,
    /// Diagnostics read by the web server
    pub diagnostics: Arc<RwLock<Diagnostics>>,
    /// Prometheus metrics
    pub metrics: metrics::Metrics,
    pub config: ControllerConfig,
}

/// Diagnostics to be exposed by the web server
#[derive(Clone, Debug, Serialize)]
pub struct Diagnostics {
    pub last_event: DateTime<Utc>,
    pub last_state: Option<ReconcileState>,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self {
            last_event: Utc::now(),
            last_state: None,
        }
    }
}

#[instrument(skip(ctx, metal_cluster), fields(trace_id))]
pub async fn reconcile(metal_cluster: Arc<MetalCluster>, ctx: Arc<Context>) -> Result<Action> {
    let trace_id = telemetry::get_trace_id();
    Span::current().record("trace_id", field::display(&trace_id));
    let _timer = ctx.metrics.count_and_measure(&ctx.config.controller_name);
    ctx.diagnostics.write().await.last_event = Utc::now();

    let key = ObjectKey::from_resource(metal_cluster.as_ref()).ok_or_else(|| {
        StdError::MetadataMissing(format!("namespace of MetalCluster {}", metal_cluster.name_any()))
    })?;
    info!("Reconciling MetalCluster \"{}\" in {}", key.name, key.namespace);

    let (state, action) = reconcile_request(&key, &ctx).await?;
    ctx.metrics.observe_state(state.as_str());
    ctx.diagnostics.write().await.last_state = Some(state);
    Ok(action)
}

/// One reconcile pass for the MetalCluster identified by `key`.
///
/// The object is always read fresh from the store; the copy delivered by the
/// watch is only used for its identity.
pub async fn reconcile_request(key: &ObjectKey, ctx: &Context) -> Result<(ReconcileState, Action)> {
    let Some(metal_cluster) = ctx.store.get_metal_cluster(key).await? else {
        debug!("MetalCluster {key} not found, ignoring");
        return Ok((ReconcileState::Missing, Action::await_change()));
    };

    let Some(cluster) = get_owner_cluster(ctx.store.as_ref(), &metal_cluster.metadata).await? else {
        info!("Waiting for the Cluster controller to set an owner reference on MetalCluster {key}");
        return Ok((ReconcileState::AwaitingOwner, Action::await_change()));
    };

    if is_paused(&cluster, &metal_cluster) {
        info!("MetalCluster {key} or its Cluster {} is paused, skipping", cluster.name_any());
        return Ok((ReconcileState::Paused, Action::await_change()));
    }

    let mut scope = ClusterScope::new(ClusterScopeParams {
        store: Some(ctx.store.clone()),
        cluster: Some(cluster),
        metal_cluster: Some(metal_cluster),
        controller_name: ctx.config.controller_name.clone(),
    })?;

    let outcome = AssertUnwindSafe(reconcile_scope(&mut scope, ctx))
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| {
            error!("reconcile of MetalCluster {key} panicked");
            Err(StdError::ReconcilePanicked(panic_message(panic.as_ref())).into())
        });

    let closed = scope
        .close()
        .await
        .map_err(|e| e.requeue_conflict(ctx.config.conflict_requeue));

    match (outcome, closed) {
        (Ok(done), Ok(())) => Ok(done),
        (Err(e), Ok(())) | (Ok(_), Err(e)) => Err(e),
        (Err(failed), Err(close)) => Err(Error::combine(failed, close)),
    }
}

async fn reconcile_scope(scope: &mut ClusterScope, ctx: &Context) -> Result<(ReconcileState, Action)> {
    if scope.is_deleting() {
        reconcile_delete(scope, ctx).await
    } else {
        Ok(reconcile_normal(scope))
    }
}

fn reconcile_normal(scope: &mut ClusterScope) -> (ReconcileState, Action) {
    if scope.add_finalizer() {
        debug!("added finalizer to MetalCluster {}", scope.infra_cluster_name());
    }
    scope.mark_cluster_ready();
    scope.set_ready(true);
    (ReconcileState::Active, Action::await_change())
}

async fn reconcile_delete(scope: &mut ClusterScope, ctx: &Context) -> Result<(ReconcileState, Action)> {
    info!("Deleting MetalCluster {}", scope.infra_cluster_name());

    if scope.cluster().meta().deletion_timestamp.is_none() {
        error!(
            "MetalCluster {} is being deleted while its Cluster {} is not, keeping the finalizer",
            scope.infra_cluster_name(),
            scope.name()
        );
        let event = Event {
            type_: EventType::Warning,
            reason: DELETION_BLOCKED_REASON.into(),
            note: Some(format!(
                "Cluster `{}` is not being deleted; delete the Cluster instead of its MetalCluster",
                scope.name()
            )),
            action: "Deleting".into(),
            secondary: None,
        };
        // the finalizer is kept either way
        if let Err(e) = ctx.store.publish_event(scope.metal_cluster(), &event).await {
            warn!("failed to publish event for MetalCluster {}: {e}", scope.infra_cluster_name());
        }
        return Ok((ReconcileState::DeletingBlocked, Action::await_change()));
    }

    let labels = BTreeMap::from([(CLUSTER_NAME_LABEL.to_string(), scope.name())]);
    let machines = ctx
        .store
        .list_metal_machines(&scope.namespace(), &labels)
        .await
        .map_err(|e| StdError::ListMachines {
            cluster: scope.name(),
            source: Box::new(e),
        })?;

    if !machines.is_empty() {
        info!(
            "{} MetalMachines of cluster {} still exist, waiting",
            machines.len(),
            scope.name()
        );
        return Ok((
            ReconcileState::DeletingWaiting,
            Action::requeue(ctx.config.machine_wait_requeue),
        ));
    }

    scope.remove_finalizer();
    info!("Released MetalCluster {}", scope.infra_cluster_name());
    Ok((ReconcileState::DeletingComplete, Action::await_change()))
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

fn error_policy(metal_cluster: Arc<MetalCluster>, error: &Error, ctx: Arc<Context>) -> Action {
    warn!("reconcile failed: {:?}", error);
    ctx.metrics.reconcile_failure(&metal_cluster, error);
    Action::requeue(error.requeue_after().unwrap_or(ctx.config.error_requeue))
}

/// Map an owner `Cluster` to the MetalCluster it references as its infrastructure.
pub fn cluster_to_infrastructure(cluster: Cluster) -> Option<ObjectRef<MetalCluster>> {
    let infra = cluster.spec.infrastructure_ref.as_ref()?;
    if infra.kind != MetalCluster::kind(&()) {
        return None;
    }
    if let Some(api_version) = &infra.api_version {
        if api_group(api_version) != GROUP {
            return None;
        }
    }
    let namespace = infra.namespace.clone().or_else(|| cluster.namespace())?;
    Some(ObjectRef::new(&infra.name).within(&namespace))
}

/// Initialize the controller and shared state
pub async fn run(state: State, client: Client, config: ControllerConfig, scheme: &Scheme) -> anyhow::Result<()> {
    if let Err(e) = scheme.verify_installed(&client).await {
        error!("CRDs are not queryable; {e:?}. Are the CRDs installed?");
        info!("Installation: cargo run --bin crdgen | kubectl apply -f -");
        return Err(e.into());
    }

    let reporter = config.controller_name.clone().into();
    let store: Arc<dyn ResourceStore> = Arc::new(KubeStore::new(client.clone(), reporter));
    let context = state.to_context(store, config)?;

    let metal_clusters = Api::<MetalCluster>::all(client.clone());
    let clusters = Api::<Cluster>::all(client);

    Controller::new(metal_clusters, Config::default().any_semantic())
        .watches(clusters, Config::default(), cluster_to_infrastructure)
        .shutdown_on_signal()
        .run(reconcile, error_policy, context)
        .filter_map(|x| async move { std::result::Result::ok(x) })
        .for_each(|_| futures::future::ready(()))
        .await;
    Ok(())
}
