//! Controller configuration

use std::time::Duration;

use crate::error::CONFIGURATION_REQUEUE;

/// Configuration for the replication group controller
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Namespace to watch; all namespaces when unset
    pub namespace: Option<String>,
    /// Maximum reconciles running at once
    pub concurrency: u16,
    /// Requeue period after a successful pass
    pub resync_period: Duration,
    /// First retry delay after a transient failure
    pub backoff_base: Duration,
    /// Upper bound on the retry delay
    pub backoff_max: Duration,
    /// Retry delay for groups with configuration errors
    pub invalid_requeue: Duration,
    /// Write derived state back onto the group's status
    pub publish_status: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            concurrency: 4,
            resync_period: Duration::from_secs(600),
            backoff_base: Duration::from_millis(500),
            backoff_max: Duration::from_secs(300),
            invalid_requeue: CONFIGURATION_REQUEUE,
            publish_status: true,
        }
    }
}
