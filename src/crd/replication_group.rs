//! ReplicationGroup CRD
//!
//! A replication group owns every PersistentVolumeClaim in its namespace
//! whose labels satisfy its selector. Membership is never stored; it is
//! recomputed from the selector on every reconcile.

use chrono::{DateTime, Utc};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::domain::ReconcileKey;

// =============================================================================
// ReplicationGroup CRD
// =============================================================================

/// ReplicationGroup selects the claims of one application for replication.
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "replication.storage.io",
    version = "v1alpha1",
    kind = "ReplicationGroup",
    plural = "replicationgroups",
    shortname = "rg",
    status = "ReplicationGroupStatus",
    namespaced,
    printcolumn = r#"{"name": "Application", "type": "string", "jsonPath": ".spec.applicationName"}"#,
    printcolumn = r#"{"name": "Claims", "type": "integer", "jsonPath": ".status.claimCount"}"#,
    printcolumn = r#"{"name": "Capacity", "type": "string", "jsonPath": ".status.totalCapacity"}"#,
    printcolumn = r#"{"name": "Phase", "type": "string", "jsonPath": ".status.phase"}"#,
    printcolumn = r#"{"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ReplicationGroupSpec {
    /// Name of the protected application
    #[serde(default)]
    pub application_name: String,

    /// Claims in the group's namespace matching this selector belong to the group
    #[serde(default)]
    pub selector: LabelSelector,

    /// Peer clusters the group replicates to
    #[serde(default)]
    pub cluster_peers: Vec<String>,
}

// =============================================================================
// Status
// =============================================================================

/// Status of the ReplicationGroup
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReplicationGroupStatus {
    /// Current phase
    #[serde(default)]
    pub phase: GroupPhase,

    /// Number of claims matched by the selector
    #[serde(default)]
    pub claim_count: u32,

    /// Number of claims whose volume was resolved
    #[serde(default)]
    pub bound_volume_count: u32,

    /// Volumes referenced by bound claims that no longer exist
    #[serde(default)]
    pub missing_volumes: Vec<String>,

    /// Sum of the resolved volumes' capacity
    #[serde(default)]
    pub total_capacity: String,

    /// Per-volume inventory
    #[serde(default)]
    pub volumes: Vec<VolumeSummary>,

    /// Generation of the spec this status was derived from
    #[serde(default)]
    pub observed_generation: Option<i64>,

    /// Last reconcile time
    #[serde(default)]
    #[schemars(with = "Option<String>")]
    pub last_reconcile_time: Option<DateTime<Utc>>,

    /// Conditions
    #[serde(default)]
    pub conditions: Vec<GroupCondition>,
}

/// Group lifecycle phase
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum GroupPhase {
    #[default]
    Pending,
    Ready,
    Stalled,
    Invalid,
}

impl std::fmt::Display for GroupPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GroupPhase::Pending => write!(f, "Pending"),
            GroupPhase::Ready => write!(f, "Ready"),
            GroupPhase::Stalled => write!(f, "Stalled"),
            GroupPhase::Invalid => write!(f, "Invalid"),
        }
    }
}

/// One resolved volume of the group
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VolumeSummary {
    /// Volume name
    pub name: String,
    /// `namespace/name` of the claim the volume points back to, empty if unset
    #[serde(default)]
    pub claim_ref: String,
    /// Volume phase
    #[serde(default)]
    pub phase: String,
    /// Storage capacity as reported by the volume
    #[serde(default)]
    pub capacity: String,
    /// Reclaim policy
    #[serde(default)]
    pub reclaim_policy: String,
}

/// Group condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GroupCondition {
    /// Type of condition
    pub r#type: String,
    /// Status: True, False, Unknown
    pub status: String,
    /// Last transition time
    #[serde(default)]
    #[schemars(with = "Option<String>")]
    pub last_transition_time: Option<DateTime<Utc>>,
    /// Reason
    #[serde(default)]
    pub reason: Option<String>,
    /// Message
    #[serde(default)]
    pub message: Option<String>,
}

/// Condition: every selected claim is bound
pub const CONDITION_CLAIMS_BOUND: &str = "ClaimsBound";
/// Condition: the selector compiles
pub const CONDITION_SELECTOR_VALID: &str = "SelectorValid";
/// Condition: every bound claim's volume was found
pub const CONDITION_VOLUMES_RESOLVED: &str = "VolumesResolved";
/// Condition: volume capacities can be summed
pub const CONDITION_CAPACITY_VALID: &str = "CapacityValid";

// =============================================================================
// Implementations
// =============================================================================

impl ReplicationGroup {
    /// Key under which this group is reconciled
    pub fn key(&self) -> ReconcileKey {
        ReconcileKey::new(self.namespace().unwrap_or_default(), self.name_any())
    }
}

impl ReplicationGroupStatus {
    /// Set a condition, keeping the transition time when the status did not flip
    pub fn set_condition(&mut self, mut condition: GroupCondition) {
        if let Some(existing) = self
            .conditions
            .iter_mut()
            .find(|c| c.r#type == condition.r#type)
        {
            if existing.status == condition.status {
                condition.last_transition_time = existing.last_transition_time;
            }
            *existing = condition;
        } else {
            self.conditions.push(condition);
        }
    }

    /// Look up a condition by type
    pub fn condition(&self, r#type: &str) -> Option<&GroupCondition> {
        self.conditions.iter().find(|c| c.r#type == r#type)
    }

    /// Compare two statuses ignoring timestamps
    pub fn same_content(&self, other: &ReplicationGroupStatus) -> bool {
        let strip = |s: &ReplicationGroupStatus| {
            let mut s = s.clone();
            s.last_reconcile_time = None;
            for c in &mut s.conditions {
                c.last_transition_time = None;
            }
            s
        };
        strip(self) == strip(other)
    }
}

impl GroupCondition {
    /// Build a condition stamped with the current time
    pub fn new(r#type: &str, status: bool, reason: &str, message: impl Into<String>) -> Self {
        Self {
            r#type: r#type.to_string(),
            status: if status { "True" } else { "False" }.to_string(),
            last_transition_time: Some(Utc::now()),
            reason: Some(reason.to_string()),
            message: Some(message.into()),
        }
    }
}
