//! Claim watch pipeline
//!
//! Turns the raw claim watch into `ClaimEvent`s, filters them through the
//! predicate, routes the survivors to groups and feeds the resulting keys to
//! the controller's work queue.

use dashmap::DashMap;
use futures::channel::mpsc::UnboundedSender;
use futures::{Stream, StreamExt};
use k8s_openapi::api::core::v1::PersistentVolumeClaim;
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher;
use kube::ResourceExt;
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::controller::metrics::Metrics;
use crate::crd::ReplicationGroup;
use crate::domain::ports::ReconcileKey;
use crate::reconcile::{should_propagate, ClaimEvent, Router};

fn claim_key(claim: &PersistentVolumeClaim) -> String {
    format!("{}/{}", claim.namespace().unwrap_or_default(), claim.name_any())
}

// =============================================================================
// Event source
// =============================================================================

/// Remembers the last seen version of every claim so watch events can be
/// told apart as create, update or delete
#[derive(Default)]
pub struct ClaimEventSource {
    seen: DashMap<String, PersistentVolumeClaim>,
}

impl ClaimEventSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of claims currently known
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    fn applied(&self, claim: PersistentVolumeClaim) -> ClaimEvent {
        match self.seen.insert(claim_key(&claim), claim.clone()) {
            Some(old) => ClaimEvent::Updated { old, new: claim },
            None => ClaimEvent::Created(claim),
        }
    }

    /// Translate one watch event
    pub fn observe(&self, event: watcher::Event<PersistentVolumeClaim>) -> Vec<ClaimEvent> {
        match event {
            watcher::Event::Applied(claim) => vec![self.applied(claim)],
            watcher::Event::Deleted(claim) => {
                self.seen.remove(&claim_key(&claim));
                vec![ClaimEvent::Deleted(claim)]
            }
            watcher::Event::Restarted(claims) => {
                let current: HashSet<String> = claims.iter().map(claim_key).collect();

                let mut vanished = Vec::new();
                self.seen.retain(|key, claim| {
                    if current.contains(key) {
                        true
                    } else {
                        vanished.push(ClaimEvent::Deleted(claim.clone()));
                        false
                    }
                });

                debug!(
                    claims = claims.len(),
                    vanished = vanished.len(),
                    "claim watch relisted"
                );
                claims
                    .into_iter()
                    .map(|claim| self.applied(claim))
                    .chain(vanished)
                    .collect()
            }
        }
    }

    /// Translate a watch error; only decode failures become events
    pub fn observe_error(error: &watcher::Error) -> Option<ClaimEvent> {
        match error {
            watcher::Error::WatchFailed(kube::Error::SerdeError(e))
            | watcher::Error::InitialListFailed(kube::Error::SerdeError(e)) => {
                Some(ClaimEvent::Undecodable {
                    reason: e.to_string(),
                })
            }
            _ => None,
        }
    }
}

// =============================================================================
// Pipeline
// =============================================================================

/// Predicate plus router, with metrics
#[derive(Clone)]
pub struct ClaimPipeline {
    router: Router,
    metrics: Arc<Metrics>,
}

impl ClaimPipeline {
    pub fn new(router: Router, metrics: Arc<Metrics>) -> Self {
        Self { router, metrics }
    }

    /// Keys to reconcile for one claim event
    pub async fn handle(&self, event: &ClaimEvent) -> Vec<ReconcileKey> {
        let propagate = should_propagate(event);
        self.metrics.record_claim_event(event.kind(), propagate);
        if !propagate {
            return Vec::new();
        }
        let Some(claim) = event.claim() else {
            return Vec::new();
        };

        let result = self.router.route(claim).await;
        if result.error.is_some() {
            self.metrics.route_errors.inc();
        }
        self.metrics
            .selector_warnings
            .inc_by(result.warnings.len() as u64);
        self.metrics.routed_keys.inc_by(result.keys.len() as u64);
        result.keys
    }
}

/// Drive a claim watch stream into the work queue until it ends, the queue
/// closes or `cancel` fires
pub async fn forward_claim_events<S>(
    mut stream: S,
    source: &ClaimEventSource,
    pipeline: &ClaimPipeline,
    queue: &UnboundedSender<ObjectRef<ReplicationGroup>>,
    cancel: &CancellationToken,
) where
    S: Stream<Item = Result<watcher::Event<PersistentVolumeClaim>, watcher::Error>> + Unpin,
{
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = stream.next() => next,
        };
        let Some(item) = next else {
            break;
        };

        let events = match item {
            Ok(event) => source.observe(event),
            Err(error) => match ClaimEventSource::observe_error(&error) {
                Some(event) => vec![event],
                None => {
                    warn!(%error, "claim watch error");
                    continue;
                }
            },
        };

        for event in &events {
            for key in pipeline.handle(event).await {
                if queue.unbounded_send(ObjectRef::from(&key)).is_err() {
                    info!("work queue closed, stopping claim watch");
                    return;
                }
            }
        }
    }
    info!("claim watch stopped");
}
