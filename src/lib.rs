//! Replication Group Operator
//!
//! A level-triggered reconciler that keeps each `ReplicationGroup`'s view of
//! its claims and volumes current. Group membership is never stored: every
//! pass recomputes it from the group's label selector.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                         Host Controller                              │
//! │  ┌───────────────┐   ┌───────────┐   ┌──────────┐   ┌─────────────┐  │
//! │  │  Claim Watch  │──►│ Predicate │──►│  Router  │──►│ Work Queue  │  │
//! │  └───────────────┘   └───────────┘   └──────────┘   └──────┬──────┘  │
//! │  ┌───────────────┐                                         │         │
//! │  │  Group Watch  │─────────────────────────────────────────┤         │
//! │  └───────────────┘                                         ▼         │
//! │                    ┌────────────┐   ┌──────────────────────────────┐ │
//! │                    │   Status   │◄──│         Reconciler           │ │
//! │                    │   Writer   │   │ (group → claims → volumes)   │ │
//! │                    └────────────┘   └──────────────────────────────┘ │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │                 Object Store (Kubernetes API / in-memory)            │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`reconcile`]: Claim predicate, claim-to-group router and group reconciler
//! - [`controller`]: kube-runtime host, status publication, metrics
//! - [`selector`]: Label selector parsing and matching
//! - [`quantity`]: Exact storage capacity arithmetic
//! - [`store`]: Object store adapters
//! - [`crd`]: Custom Resource Definitions
//! - [`domain`]: Reconcile key and store ports
//! - [`error`]: Error types and handling

pub mod controller;
pub mod crd;
pub mod domain;
pub mod error;
pub mod quantity;
pub mod reconcile;
pub mod selector;
pub mod store;

// Re-export commonly used types
pub use controller::{Context, ControllerConfig, Metrics};

pub use crd::{
    GroupCondition, GroupPhase, ReplicationGroup, ReplicationGroupSpec, ReplicationGroupStatus,
    VolumeSummary,
};

pub use domain::ports::{
    ObjectStore, ObjectStoreRef, ReconcileKey, StatusWriter, StatusWriterRef,
};

pub use error::{Error, ErrorAction, FailureClass, Result};

pub use quantity::Quantity;

pub use reconcile::{
    should_propagate, ClaimEvent, GroupAggregate, ReconcileOutcome, Reconciler, RouteResult,
    Router,
};

pub use selector::{Selector, SelectorError};

pub use store::{KubeStore, MemoryStore};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
