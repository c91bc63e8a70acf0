//! Reconcile core
//!
//! The three pieces between a claim changing and a group's state being
//! recomputed:
//!
//! ```text
//!   claim event ──► predicate ──► router ──► ReconcileKey ──► reconciler
//!                  (filter)      (fan-out)     (work queue)    (derive)
//! ```
//!
//! All store access goes through the `ObjectStore` port handed in by the
//! caller; none of these components keep state between calls.

pub mod predicate;
pub mod reconciler;
pub mod router;

pub use predicate::{binding_changed, should_propagate, ClaimEvent};
pub use reconciler::{GroupAggregate, ReconcileOutcome, Reconciler};
pub use router::{matching_groups, route_claim, RouteResult, Router, SelectorWarning};
