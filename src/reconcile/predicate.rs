//! Claim change predicate
//!
//! Decides which claim lifecycle events are worth routing to groups. Creates
//! always pass, deletes never do (their cleanup belongs to the finalizer
//! path), and updates pass only when something that can change membership or
//! binding moved.

use k8s_openapi::api::core::v1::PersistentVolumeClaim;
use kube::ResourceExt;
use tracing::{debug, error, info};

/// A claim lifecycle event as observed by the watch
#[derive(Debug, Clone)]
pub enum ClaimEvent {
    Created(PersistentVolumeClaim),
    Updated {
        old: PersistentVolumeClaim,
        new: PersistentVolumeClaim,
    },
    Deleted(PersistentVolumeClaim),
    /// The watch delivered an object that could not be read as a claim
    Undecodable { reason: String },
}

impl ClaimEvent {
    /// Short event kind for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            ClaimEvent::Created(_) => "create",
            ClaimEvent::Updated { .. } => "update",
            ClaimEvent::Deleted(_) => "delete",
            ClaimEvent::Undecodable { .. } => "undecodable",
        }
    }

    /// The claim to route on: the newest observed version
    pub fn claim(&self) -> Option<&PersistentVolumeClaim> {
        match self {
            ClaimEvent::Created(claim) | ClaimEvent::Deleted(claim) => Some(claim),
            ClaimEvent::Updated { new, .. } => Some(new),
            ClaimEvent::Undecodable { .. } => None,
        }
    }
}

/// Whether the fields that drive membership or binding differ
///
/// Only labels and spec count. Status-only updates are suppressed; a claim
/// still waiting to bind is retried by the group's own backoff.
pub fn binding_changed(old: &PersistentVolumeClaim, new: &PersistentVolumeClaim) -> bool {
    old.labels() != new.labels() || old.spec != new.spec
}

/// Decide whether a claim event should be routed
pub fn should_propagate(event: &ClaimEvent) -> bool {
    match event {
        ClaimEvent::Created(claim) => {
            debug!(claim = %claim.name_any(), "create event from claim");
            true
        }
        ClaimEvent::Updated { old, new } => {
            let changed = binding_changed(old, new);
            debug!(claim = %new.name_any(), changed, "update event from claim");
            changed
        }
        ClaimEvent::Deleted(claim) => {
            info!(claim = %claim.name_any(), "delete event from claim, left to finalizer");
            false
        }
        ClaimEvent::Undecodable { reason } => {
            error!(%reason, "failed to read claim from event, not reconciling");
            false
        }
    }
}
