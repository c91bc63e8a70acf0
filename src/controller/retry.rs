//! Per-key retry backoff
//!
//! The controller runtime requeues whatever delay `error_policy` hands back;
//! this tracker turns repeated failures of one group into a growing delay and
//! forgets the group once a pass succeeds.

use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use dashmap::DashMap;
use std::time::Duration;

use crate::domain::ReconcileKey;

/// Exponential backoff state per reconcile key
pub struct RetryTracker {
    base: Duration,
    max: Duration,
    attempts: DashMap<ReconcileKey, ExponentialBackoff>,
}

impl RetryTracker {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            attempts: DashMap::new(),
        }
    }

    fn fresh(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.base)
            .with_max_interval(self.max)
            .with_multiplier(2.0)
            .with_randomization_factor(0.0)
            .with_max_elapsed_time(None)
            .build()
    }

    /// Delay before the next attempt for `key`
    pub fn next_delay(&self, key: &ReconcileKey) -> Duration {
        let mut backoff = self
            .attempts
            .entry(key.clone())
            .or_insert_with(|| self.fresh());
        backoff.next_backoff().unwrap_or(self.max)
    }

    /// Forget the failure history of `key`
    pub fn reset(&self, key: &ReconcileKey) {
        self.attempts.remove(key);
    }

    /// Number of keys currently backing off
    pub fn pending(&self) -> usize {
        self.attempts.len()
    }
}
