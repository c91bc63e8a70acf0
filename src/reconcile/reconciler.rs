//! Group reconciler
//!
//! One pass fetches the group, lists the claims its selector accepts, checks
//! that every claim is bound, resolves each bound volume and sums capacity.
//! Nothing is remembered between passes: the same store contents always
//! produce the same aggregate.

use k8s_openapi::api::core::v1::{PersistentVolume, PersistentVolumeClaim};
use kube::ResourceExt;
use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::crd::VolumeSummary;
use crate::domain::ports::{ObjectStoreRef, ReconcileKey};
use crate::error::{Error, FailureClass, Result};
use crate::quantity::Quantity;
use crate::selector::Selector;

const STORAGE_RESOURCE: &str = "storage";
const PHASE_BOUND: &str = "Bound";

// =============================================================================
// Outcome
// =============================================================================

/// State derived for a group in one pass
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GroupAggregate {
    /// Claims accepted by the selector
    pub claim_count: usize,
    /// Claims whose volume was resolved
    pub bound_volume_count: usize,
    /// Sum of resolved volume capacity
    pub total_capacity: Quantity,
    /// Volume names referenced by claims but absent from the store
    pub missing_volumes: Vec<String>,
    /// Inventory of resolved volumes, in claim listing order
    pub volumes: Vec<VolumeSummary>,
}

impl GroupAggregate {
    /// Whether some referenced volumes could not be resolved
    pub fn is_partial(&self) -> bool {
        !self.missing_volumes.is_empty()
    }

    pub fn failure_class(&self) -> Option<FailureClass> {
        self.is_partial().then_some(FailureClass::PartialResult)
    }
}

/// Successful result of a reconcile pass
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    /// The group no longer exists; nothing to do
    GroupDeleted,
    /// The group's aggregate state
    Aggregated(GroupAggregate),
}

// =============================================================================
// Reconciler
// =============================================================================

/// Derives group state from the object store
#[derive(Clone)]
pub struct Reconciler {
    store: ObjectStoreRef,
}

fn claim_id(claim: &PersistentVolumeClaim) -> String {
    format!("{}/{}", claim.namespace().unwrap_or_default(), claim.name_any())
}

fn bound_volume_name(claim: &PersistentVolumeClaim) -> Option<&str> {
    let bound = claim
        .status
        .as_ref()
        .and_then(|s| s.phase.as_deref())
        .map(|phase| phase == PHASE_BOUND)
        .unwrap_or(false);
    if !bound {
        return None;
    }
    claim
        .spec
        .as_ref()
        .and_then(|s| s.volume_name.as_deref())
        .filter(|name| !name.is_empty())
}

fn volume_claim_ref(volume: &PersistentVolume) -> String {
    volume
        .spec
        .as_ref()
        .and_then(|s| s.claim_ref.as_ref())
        .map(|r| {
            format!(
                "{}/{}",
                r.namespace.as_deref().unwrap_or_default(),
                r.name.as_deref().unwrap_or_default()
            )
        })
        .unwrap_or_default()
}

fn volume_capacity(volume: &PersistentVolume) -> Result<Quantity> {
    match volume
        .spec
        .as_ref()
        .and_then(|s| s.capacity.as_ref())
        .and_then(|c| c.get(STORAGE_RESOURCE))
    {
        Some(q) => Quantity::try_from(q),
        None => Ok(Quantity::zero()),
    }
}

impl Reconciler {
    pub fn new(store: ObjectStoreRef) -> Self {
        Self { store }
    }

    /// Run a store call, giving up as soon as the pass is cancelled
    async fn guarded<T>(
        key: &ReconcileKey,
        cancel: &CancellationToken,
        call: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled { key: key.to_string() }),
            result = call => result,
        }
    }

    /// Reconcile one group
    #[instrument(skip(self, cancel), fields(group = %key))]
    pub async fn reconcile(
        &self,
        key: &ReconcileKey,
        cancel: &CancellationToken,
    ) -> Result<ReconcileOutcome> {
        let group = Self::guarded(
            key,
            cancel,
            self.store.get_group(&key.namespace, &key.name),
        )
        .await?;

        let Some(group) = group else {
            info!("replication group not found, assuming it was deleted");
            return Ok(ReconcileOutcome::GroupDeleted);
        };

        let selector = Selector::from_label_selector(&group.spec.selector).map_err(|e| {
            Error::SelectorInvalid {
                group: key.to_string(),
                reason: e.to_string(),
            }
        })?;
        debug!(selector = %selector, application = %group.spec.application_name, "processing replication group");

        let claims = Self::guarded(
            key,
            cancel,
            self.store.list_claims(&key.namespace, &selector),
        )
        .await?;

        let aggregate = self.aggregate(key, cancel, &claims).await?;

        info!(
            claims = aggregate.claim_count,
            bound_volumes = aggregate.bound_volume_count,
            missing_volumes = aggregate.missing_volumes.len(),
            total_capacity = %aggregate.total_capacity,
            "replication group reconciled"
        );
        Ok(ReconcileOutcome::Aggregated(aggregate))
    }

    async fn aggregate(
        &self,
        key: &ReconcileKey,
        cancel: &CancellationToken,
        claims: &[PersistentVolumeClaim],
    ) -> Result<GroupAggregate> {
        let mut aggregate = GroupAggregate {
            claim_count: claims.len(),
            ..Default::default()
        };

        for (index, claim) in claims.iter().enumerate() {
            let Some(volume_name) = bound_volume_name(claim) else {
                // Stop resolving volumes, but count the rest for the report
                let unbound = 1 + claims[index + 1..]
                    .iter()
                    .filter(|c| bound_volume_name(c).is_none())
                    .count();
                warn!(claim = %claim_id(claim), unbound, total = claims.len(), "claim is not yet bound");
                return Err(Error::ClaimNotBound {
                    claim: claim_id(claim),
                    unbound,
                    total: claims.len(),
                });
            };

            let volume = Self::guarded(key, cancel, self.store.get_volume(volume_name)).await?;
            let Some(volume) = volume else {
                info!(volume = %volume_name, claim = %claim_id(claim),
                    "persistent volume not found, assuming it was deleted");
                aggregate.missing_volumes.push(volume_name.to_string());
                continue;
            };

            let claim_ref = volume_claim_ref(&volume);
            if !claim_ref.is_empty() && claim_ref != claim_id(claim) {
                warn!(volume = %volume_name, %claim_ref, claim = %claim_id(claim),
                    "volume points back at a different claim");
            }

            let capacity = volume_capacity(&volume)?;
            aggregate.total_capacity = aggregate.total_capacity.checked_add(&capacity)?;

            let summary = VolumeSummary {
                name: volume.name_any(),
                claim_ref,
                phase: volume
                    .status
                    .as_ref()
                    .and_then(|s| s.phase.clone())
                    .unwrap_or_default(),
                capacity: capacity.to_string(),
                reclaim_policy: volume
                    .spec
                    .as_ref()
                    .and_then(|s| s.persistent_volume_reclaim_policy.clone())
                    .unwrap_or_default(),
            };
            debug!(
                volume = %summary.name,
                claim_ref = %summary.claim_ref,
                phase = %summary.phase,
                capacity = %summary.capacity,
                reclaim_policy = %summary.reclaim_policy,
                "resolved persistent volume"
            );
            aggregate.volumes.push(summary);
            aggregate.bound_volume_count += 1;
        }

        Ok(aggregate)
    }
}
