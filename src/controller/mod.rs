//! Replication group controller
//!
//! Hosts the reconcile core inside the kube-runtime controller:
//!
//! - groups are watched directly, so edits to a group reconcile it
//! - claims are watched separately; their events pass the predicate and the
//!   router and land on the same work queue via `reconcile_on`
//! - the work queue deduplicates keys and never runs one key twice at once
//! - the derived state is written back to the group's status when it changed

pub mod claims;
pub mod config;
pub mod metrics;
pub mod retry;
pub mod status;

pub use claims::{forward_claim_events, ClaimEventSource, ClaimPipeline};
pub use config::ControllerConfig;
pub use metrics::Metrics;
pub use retry::RetryTracker;
pub use status::{derive_status, needs_publish};

use futures::channel::mpsc;
use futures::{FutureExt, StreamExt};
use k8s_openapi::api::core::v1::PersistentVolumeClaim;
use kube::api::ListParams;
use kube::runtime::controller::{self, Action, Controller};
use kube::runtime::reflector::ObjectRef;
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Api, Client};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::crd::ReplicationGroup;
use crate::domain::ports::{ObjectStoreRef, ReconcileKey, StatusWriterRef};
use crate::error::{Error, ErrorAction, FailureClass, Result};
use crate::reconcile::{ReconcileOutcome, Reconciler, Router};
use crate::store::KubeStore;

// =============================================================================
// Context
// =============================================================================

/// Shared state handed to every reconcile
pub struct Context {
    reconciler: Reconciler,
    status: Option<StatusWriterRef>,
    retries: RetryTracker,
    metrics: Arc<Metrics>,
    config: ControllerConfig,
    cancel: CancellationToken,
}

impl Context {
    pub fn new(
        store: ObjectStoreRef,
        status: Option<StatusWriterRef>,
        metrics: Arc<Metrics>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            reconciler: Reconciler::new(store),
            status: status.filter(|_| config.publish_status),
            retries: RetryTracker::new(config.backoff_base, config.backoff_max),
            metrics,
            config,
            cancel: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn retries(&self) -> &RetryTracker {
        &self.retries
    }

    /// Cancel in-flight reconciles
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    async fn publish(&self, group: &ReplicationGroup, result: &Result<ReconcileOutcome>) {
        let Some(writer) = &self.status else {
            return;
        };
        let previous = group.status.as_ref();
        let Some(next) = derive_status(result, previous, group.metadata.generation) else {
            return;
        };
        if !needs_publish(previous, &next) {
            debug!(group = %group.key(), "status unchanged");
            return;
        }
        match writer.publish_status(&group.key(), &next).await {
            Ok(()) => {}
            Err(e) if e.class() == FailureClass::NotFound => {
                debug!(group = %group.key(), "group deleted before status was published");
            }
            Err(e) => warn!(group = %group.key(), error = %e, "failed to publish group status"),
        }
    }
}

// =============================================================================
// Reconcile / error policy
// =============================================================================

/// Reconcile one group and turn the outcome into a requeue decision
pub async fn reconcile(group: Arc<ReplicationGroup>, ctx: Arc<Context>) -> Result<Action> {
    let key = group.key();

    let timer = ctx.metrics.reconcile_duration.start_timer();
    let result = ctx.reconciler.reconcile(&key, &ctx.cancel).await;
    timer.observe_duration();

    ctx.metrics.record_reconcile(&result);
    ctx.publish(&group, &result).await;

    match result? {
        ReconcileOutcome::GroupDeleted => {
            ctx.retries.reset(&key);
            Ok(Action::await_change())
        }
        ReconcileOutcome::Aggregated(agg) if agg.is_partial() => {
            // Volume appearance does not trigger the group, so poll for it
            Ok(Action::requeue(ctx.retries.next_delay(&key)))
        }
        ReconcileOutcome::Aggregated(_) => {
            ctx.retries.reset(&key);
            Ok(Action::requeue(ctx.config.resync_period))
        }
    }
}

/// Map a failed pass onto a requeue
pub fn error_policy(group: Arc<ReplicationGroup>, error: &Error, ctx: Arc<Context>) -> Action {
    let key = group.key();
    match error.action() {
        ErrorAction::RequeueWithBackoff => {
            let delay = ctx.retries.next_delay(&key);
            if error.is_transient() {
                debug!(group = %key, error = %error, ?delay, "requeueing with backoff");
            }
            Action::requeue(delay)
        }
        ErrorAction::RequeueAfter(_) => {
            warn!(group = %key, error = %error, "group configuration rejected");
            ctx.retries.reset(&key);
            Action::requeue(ctx.config.invalid_requeue)
        }
        ErrorAction::NoRequeue => {
            ctx.retries.reset(&key);
            Action::await_change()
        }
    }
}

/// Item yielded by the running controller stream
pub type ControllerResult =
    std::result::Result<(ObjectRef<ReplicationGroup>, Action), controller::Error<Error, watcher::Error>>;

/// Log one controller result and drop retry state for groups that are gone
pub fn observe(ctx: &Context, result: &ControllerResult) {
    match result {
        Ok((obj, _)) => debug!(group = %obj.name, "reconciled"),
        Err(controller::Error::ObjectNotFound(obj)) => {
            let namespace = obj.namespace.clone().unwrap_or_default();
            let key = ReconcileKey::new(namespace, obj.name.clone());
            debug!(group = %key, "queued group no longer exists");
            ctx.retries.reset(&key);
        }
        Err(e) => debug!(error = %e, "reconcile failed"),
    }
}

// =============================================================================
// Runner
// =============================================================================

fn scoped<K>(client: &Client, namespace: Option<&str>) -> Api<K>
where
    K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope>,
    <K as kube::Resource>::DynamicType: Default,
{
    match namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    }
}

/// Run the controller until a shutdown signal arrives
pub async fn run(
    client: Client,
    config: ControllerConfig,
    metrics: Arc<Metrics>,
    ready: Arc<AtomicBool>,
) -> Result<()> {
    let groups: Api<ReplicationGroup> = scoped(&client, config.namespace.as_deref());
    let claims: Api<PersistentVolumeClaim> = scoped(&client, config.namespace.as_deref());

    if let Err(e) = groups.list(&ListParams::default().limit(1)).await {
        error!(error = %e, "ReplicationGroup CRD is not queryable, is it installed?");
        return Err(Error::Kube(e));
    }

    let store = Arc::new(KubeStore::new(client));
    let concurrency = config.concurrency;
    let ctx = Arc::new(Context::new(
        store.clone(),
        Some(store.clone() as StatusWriterRef),
        metrics.clone(),
        config,
    ));
    let cancel = ctx.cancel_token();

    // Claim watch -> predicate -> router -> work queue
    let (queue_tx, queue_rx) = mpsc::unbounded();
    let pipeline = ClaimPipeline::new(Router::new(store), metrics);
    let watch_cancel = cancel.clone();
    let claim_watch = tokio::spawn(async move {
        let source = ClaimEventSource::new();
        let stream = watcher(claims, watcher::Config::default())
            .default_backoff()
            .boxed();
        forward_claim_events(stream, &source, &pipeline, &queue_tx, &watch_cancel).await;
    });

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("shutdown signal received"),
            _ = signal_cancel.cancelled() => {}
        }
        signal_cancel.cancel();
        let _ = stop_tx.send(());
    });

    info!(concurrency, "starting replication group controller");
    ready.store(true, Ordering::SeqCst);

    Controller::new(groups, watcher::Config::default())
        .with_config(controller::Config::default().concurrency(concurrency))
        .reconcile_on(queue_rx)
        .graceful_shutdown_on(stop_rx.map(|_| ()))
        .run(reconcile, error_policy, ctx.clone())
        .for_each(|res| {
            observe(&ctx, &res);
            futures::future::ready(())
        })
        .await;

    ready.store(false, Ordering::SeqCst);
    cancel.cancel();
    if let Err(e) = claim_watch.await {
        warn!(error = %e, "claim watch task failed");
    }
    info!("replication group controller stopped");
    Ok(())
}
