//! Error types for the Replication Group Operator
//!
//! Every failure a reconcile pass can surface maps onto one of four classes
//! (not-found, transient, configuration, partial-result) and from there onto
//! the requeue decision handed back to the work queue.

use std::time::Duration;
use thiserror::Error;

/// Unified error type for the operator
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // =========================================================================
    // Object Store Errors
    // =========================================================================
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("Object store unavailable during {operation}: {reason}")]
    StoreUnavailable { operation: String, reason: String },

    #[error("Reconcile cancelled for {key}")]
    Cancelled { key: String },

    // =========================================================================
    // Reconcile Errors
    // =========================================================================
    #[error("Claim {claim} is not yet bound ({unbound} of {total} claims unbound)")]
    ClaimNotBound {
        claim: String,
        unbound: usize,
        total: usize,
    },

    #[error("Invalid selector on group {group}: {reason}")]
    SelectorInvalid { group: String, reason: String },

    // =========================================================================
    // Capacity Errors
    // =========================================================================
    #[error("Capacity parse error: {0}")]
    CapacityParse(String),

    #[error("Capacity unit mismatch: cannot add {left} to {right}")]
    CapacityUnitMismatch { left: String, right: String },
}

/// Broad class of a failure, independent of its requeue policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Benign; the object is gone
    NotFound,
    /// Store unavailability, cancellation or a provisioning race
    Transient,
    /// Something on the group itself needs fixing
    Configuration,
    /// Part of the aggregate could not be resolved
    PartialResult,
}

/// Action to take on error during reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorAction {
    /// Requeue with exponential backoff
    RequeueWithBackoff,
    /// Requeue after specific duration
    RequeueAfter(Duration),
    /// Don't requeue, wait for changes
    NoRequeue,
}

/// Delay before re-checking a group whose configuration was rejected
pub const CONFIGURATION_REQUEUE: Duration = Duration::from_secs(300);

impl Error {
    /// Build a store error from any displayable cause
    pub fn store(operation: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Error::StoreUnavailable {
            operation: operation.into(),
            reason: reason.to_string(),
        }
    }

    /// API-style not-found for `kind` `name`, classified as `NotFound`
    pub fn not_found(kind: &str, name: impl std::fmt::Display) -> Self {
        Error::Kube(kube::Error::Api(kube::error::ErrorResponse {
            status: "Failure".to_string(),
            message: format!("{} {} not found", kind, name),
            reason: "NotFound".to_string(),
            code: 404,
        }))
    }

    /// Classify this error
    pub fn class(&self) -> FailureClass {
        match self {
            Error::Kube(kube::Error::Api(ae)) if ae.code == 404 => FailureClass::NotFound,

            Error::SelectorInvalid { .. }
            | Error::CapacityParse(_)
            | Error::CapacityUnitMismatch { .. }
            | Error::Configuration(_) => FailureClass::Configuration,

            _ => FailureClass::Transient,
        }
    }

    /// Determine what action to take for this error
    pub fn action(&self) -> ErrorAction {
        match self.class() {
            FailureClass::NotFound => ErrorAction::NoRequeue,
            // The user may fix the group, so keep checking, just not eagerly
            FailureClass::Configuration => ErrorAction::RequeueAfter(CONFIGURATION_REQUEUE),
            FailureClass::Transient | FailureClass::PartialResult => {
                ErrorAction::RequeueWithBackoff
            }
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        !matches!(self.action(), ErrorAction::NoRequeue)
    }

    /// Check if this error is transient
    pub fn is_transient(&self) -> bool {
        self.class() == FailureClass::Transient
    }

    /// Short label used for metrics and status reasons
    pub fn reason(&self) -> &'static str {
        match self {
            Error::Internal(_) => "Internal",
            Error::Configuration(_) => "Configuration",
            Error::Kube(_) | Error::StoreUnavailable { .. } => "StoreUnavailable",
            Error::Cancelled { .. } => "Cancelled",
            Error::ClaimNotBound { .. } => "ClaimNotBound",
            Error::SelectorInvalid { .. } => "SelectorInvalid",
            Error::CapacityParse(_) => "CapacityParse",
            Error::CapacityUnitMismatch { .. } => "CapacityUnitMismatch",
        }
    }
}

/// Result type alias for the operator
pub type Result<T> = std::result::Result<T, Error>;
