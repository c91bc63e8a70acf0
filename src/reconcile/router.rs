//! Claim-to-group routing
//!
//! Fans a single claim out to every group in its namespace whose selector
//! accepts the claim's labels. Matching is a pure function over a snapshot of
//! groups; `Router` only adds the one list call that produces the snapshot.

use k8s_openapi::api::core::v1::PersistentVolumeClaim;
use kube::ResourceExt;
use tracing::{debug, info, warn};

use crate::crd::ReplicationGroup;
use crate::domain::ports::{ObjectStoreRef, ReconcileKey};
use crate::error::Error;
use crate::selector::{Selector, SelectorError};

/// A group skipped because its selector does not compile
#[derive(Debug, Clone, PartialEq)]
pub struct SelectorWarning {
    pub group: ReconcileKey,
    pub error: SelectorError,
}

impl std::fmt::Display for SelectorWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "group {} skipped: {}", self.group, self.error)
    }
}

/// Outcome of routing one claim
#[derive(Debug, Default)]
pub struct RouteResult {
    /// One key per matching group, in listing order
    pub keys: Vec<ReconcileKey>,
    /// Groups that could not be evaluated
    pub warnings: Vec<SelectorWarning>,
    /// Set when the group listing failed; `keys` is then empty
    pub error: Option<Error>,
}

impl RouteResult {
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Lazily evaluate every group against the claim
///
/// Yields `Ok(key)` for a match and `Err(warning)` for a group whose selector
/// fails to compile. Groups outside the claim's namespace never match.
pub fn matching_groups<'a>(
    groups: &'a [ReplicationGroup],
    claim: &'a PersistentVolumeClaim,
) -> impl Iterator<Item = Result<ReconcileKey, SelectorWarning>> + 'a {
    let namespace = claim.namespace();
    let labels = claim.labels();

    groups
        .iter()
        .filter(move |group| group.namespace() == namespace)
        .filter_map(move |group| {
            match Selector::from_label_selector(&group.spec.selector) {
                Ok(selector) if selector.matches(labels) => Some(Ok(group.key())),
                Ok(_) => None,
                Err(error) => Some(Err(SelectorWarning {
                    group: group.key(),
                    error,
                })),
            }
        })
}

/// Route a claim against a snapshot of groups
pub fn route_claim(groups: &[ReplicationGroup], claim: &PersistentVolumeClaim) -> RouteResult {
    let mut result = RouteResult::default();
    for item in matching_groups(groups, claim) {
        match item {
            Ok(key) => result.keys.push(key),
            Err(warning) => result.warnings.push(warning),
        }
    }
    result
}

/// Routes claims using a live listing of groups
#[derive(Clone)]
pub struct Router {
    store: ObjectStoreRef,
}

impl Router {
    pub fn new(store: ObjectStoreRef) -> Self {
        Self { store }
    }

    /// List the claim's namespace once and route against it
    ///
    /// A failed listing drops this event: the result is empty and carries the
    /// error. The next event for the claim or a periodic resync recovers it.
    pub async fn route(&self, claim: &PersistentVolumeClaim) -> RouteResult {
        let namespace = claim.namespace().unwrap_or_default();
        let claim_name = claim.name_any();

        let groups = match self.store.list_groups(&namespace).await {
            Ok(groups) => groups,
            Err(error) => {
                warn!(
                    claim = %claim_name,
                    %namespace,
                    %error,
                    "failed to list replication groups, dropping claim event"
                );
                return RouteResult {
                    error: Some(error),
                    ..Default::default()
                };
            }
        };

        let result = route_claim(&groups, claim);

        for warning in &result.warnings {
            warn!(claim = %claim_name, group = %warning.group, error = %warning.error,
                "failed to compile group selector, skipping group");
        }
        for key in &result.keys {
            info!(claim = %claim_name, group = %key, "found replication group with matching labels");
        }
        debug!(
            claim = %claim_name,
            groups = groups.len(),
            matched = result.keys.len(),
            "routed claim"
        );

        result
    }
}
