//! Status derivation
//!
//! Maps the result of a reconcile pass onto the group's status subresource.
//! Transient store failures leave the status alone; everything else that a
//! user can act on becomes a phase plus a condition.

use chrono::Utc;

use crate::crd::{
    GroupCondition, GroupPhase, ReplicationGroupStatus, CONDITION_CAPACITY_VALID,
    CONDITION_CLAIMS_BOUND, CONDITION_SELECTOR_VALID, CONDITION_VOLUMES_RESOLVED,
};
use crate::error::{Error, Result};
use crate::reconcile::{GroupAggregate, ReconcileOutcome};

fn aggregated_status(agg: &GroupAggregate, mut status: ReplicationGroupStatus) -> ReplicationGroupStatus {
    status.phase = GroupPhase::Ready;
    status.claim_count = agg.claim_count as u32;
    status.bound_volume_count = agg.bound_volume_count as u32;
    status.missing_volumes = agg.missing_volumes.clone();
    status.total_capacity = agg.total_capacity.to_string();
    status.volumes = agg.volumes.clone();

    status.set_condition(GroupCondition::new(
        CONDITION_SELECTOR_VALID,
        true,
        "SelectorCompiled",
        "",
    ));
    status.set_condition(GroupCondition::new(
        CONDITION_CLAIMS_BOUND,
        true,
        "AllClaimsBound",
        format!("{} claims bound", agg.claim_count),
    ));
    status.set_condition(GroupCondition::new(
        CONDITION_CAPACITY_VALID,
        true,
        "CapacitySummed",
        "",
    ));
    if agg.is_partial() {
        status.set_condition(GroupCondition::new(
            CONDITION_VOLUMES_RESOLVED,
            false,
            "VolumeNotFound",
            format!("missing volumes: {}", agg.missing_volumes.join(", ")),
        ));
    } else {
        status.set_condition(GroupCondition::new(
            CONDITION_VOLUMES_RESOLVED,
            true,
            "AllVolumesFound",
            "",
        ));
    }
    status
}

/// Derive the status to publish, or `None` when the pass says nothing new
pub fn derive_status(
    result: &Result<ReconcileOutcome>,
    previous: Option<&ReplicationGroupStatus>,
    generation: Option<i64>,
) -> Option<ReplicationGroupStatus> {
    let base = previous.cloned().unwrap_or_default();

    let mut status = match result {
        Ok(ReconcileOutcome::GroupDeleted) => return None,
        Ok(ReconcileOutcome::Aggregated(agg)) => aggregated_status(agg, base),
        Err(err @ Error::ClaimNotBound { .. }) => {
            let mut status = base;
            status.phase = GroupPhase::Stalled;
            status.set_condition(GroupCondition::new(
                CONDITION_SELECTOR_VALID,
                true,
                "SelectorCompiled",
                "",
            ));
            status.set_condition(GroupCondition::new(
                CONDITION_CLAIMS_BOUND,
                false,
                err.reason(),
                err.to_string(),
            ));
            status
        }
        Err(err @ Error::SelectorInvalid { .. }) => {
            let mut status = base;
            status.phase = GroupPhase::Invalid;
            status.set_condition(GroupCondition::new(
                CONDITION_SELECTOR_VALID,
                false,
                err.reason(),
                err.to_string(),
            ));
            status
        }
        Err(err @ (Error::CapacityParse(_) | Error::CapacityUnitMismatch { .. })) => {
            let mut status = base;
            status.phase = GroupPhase::Invalid;
            status.set_condition(GroupCondition::new(
                CONDITION_CAPACITY_VALID,
                false,
                err.reason(),
                err.to_string(),
            ));
            status
        }
        Err(_) => return None,
    };

    status.observed_generation = generation;
    status.last_reconcile_time = Some(Utc::now());
    Some(status)
}

/// Whether `next` differs from what is already on the group
pub fn needs_publish(previous: Option<&ReplicationGroupStatus>, next: &ReplicationGroupStatus) -> bool {
    previous.map(|p| !p.same_content(next)).unwrap_or(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quantity::Quantity;

    fn aggregate(missing: &[&str]) -> GroupAggregate {
        GroupAggregate {
            claim_count: 2,
            bound_volume_count: 2 - missing.len(),
            total_capacity: Quantity::parse("10Gi").unwrap(),
            missing_volumes: missing.iter().map(|s| s.to_string()).collect(),
            volumes: Vec::new(),
        }
    }

    #[test]
    fn test_aggregate_becomes_ready() {
        let result = Ok(ReconcileOutcome::Aggregated(aggregate(&[])));
        let status = derive_status(&result, None, Some(3)).unwrap();

        assert_eq!(status.phase, GroupPhase::Ready);
        assert_eq!(status.claim_count, 2);
        assert_eq!(status.total_capacity, "10Gi");
        assert_eq!(status.observed_generation, Some(3));
        assert_eq!(status.condition(CONDITION_CLAIMS_BOUND).unwrap().status, "True");
        assert_eq!(status.condition(CONDITION_VOLUMES_RESOLVED).unwrap().status, "True");
    }

    #[test]
    fn test_partial_aggregate_reports_missing_volumes() {
        let result = Ok(ReconcileOutcome::Aggregated(aggregate(&["pv-2"])));
        let status = derive_status(&result, None, None).unwrap();

        assert_eq!(status.phase, GroupPhase::Ready);
        assert_eq!(status.missing_volumes, vec!["pv-2".to_string()]);
        let cond = status.condition(CONDITION_VOLUMES_RESOLVED).unwrap();
        assert_eq!(cond.status, "False");
        assert_eq!(cond.reason.as_deref(), Some("VolumeNotFound"));
    }

    #[test]
    fn test_unbound_claim_stalls_and_keeps_last_aggregate() {
        let ready = derive_status(&Ok(ReconcileOutcome::Aggregated(aggregate(&[]))), None, None);
        let result = Err(Error::ClaimNotBound {
            claim: "apps/c3".into(),
            unbound: 1,
            total: 3,
        });
        let status = derive_status(&result, ready.as_ref(), None).unwrap();

        assert_eq!(status.phase, GroupPhase::Stalled);
        assert_eq!(status.total_capacity, "10Gi");
        let cond = status.condition(CONDITION_CLAIMS_BOUND).unwrap();
        assert_eq!(cond.status, "False");
        assert_eq!(cond.reason.as_deref(), Some("ClaimNotBound"));
    }

    #[test]
    fn test_configuration_errors_mark_invalid() {
        let result = Err(Error::SelectorInvalid {
            group: "apps/g1".into(),
            reason: "bad operator".into(),
        });
        let status = derive_status(&result, None, None).unwrap();
        assert_eq!(status.phase, GroupPhase::Invalid);
        assert_eq!(status.condition(CONDITION_SELECTOR_VALID).unwrap().status, "False");

        let result = Err(Error::CapacityUnitMismatch {
            left: "10Gi".into(),
            right: "5G".into(),
        });
        let status = derive_status(&result, None, None).unwrap();
        assert_eq!(status.phase, GroupPhase::Invalid);
        assert_eq!(status.condition(CONDITION_CAPACITY_VALID).unwrap().status, "False");
    }

    #[test]
    fn test_transient_and_deleted_leave_status_alone() {
        assert!(derive_status(&Ok(ReconcileOutcome::GroupDeleted), None, None).is_none());
        assert!(derive_status(&Err(Error::store("list claims", "timeout")), None, None).is_none());
        assert!(derive_status(&Err(Error::Cancelled { key: "apps/g1".into() }), None, None).is_none());
    }

    #[test]
    fn test_needs_publish_ignores_timestamps() {
        let result = Ok(ReconcileOutcome::Aggregated(aggregate(&[])));
        let first = derive_status(&result, None, Some(1)).unwrap();
        let second = derive_status(&result, Some(&first), Some(1)).unwrap();

        assert!(needs_publish(None, &first));
        assert!(!needs_publish(Some(&first), &second));
    }
}
