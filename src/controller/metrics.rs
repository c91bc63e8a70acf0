//! Controller metrics
//!
//! Owned registry, handed to the controller and the metrics server
//! explicitly rather than registered globally.

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

use crate::error::{Error, Result};
use crate::reconcile::ReconcileOutcome;

/// Prometheus metrics for the replication group controller
pub struct Metrics {
    registry: Registry,
    /// Reconcile passes by result
    pub reconcile_total: IntCounterVec,
    /// Reconcile pass duration
    pub reconcile_duration: Histogram,
    /// Claim events by kind and predicate decision
    pub claim_events: IntCounterVec,
    /// Reconcile keys produced by routing
    pub routed_keys: IntCounter,
    /// Claim events dropped because the group listing failed
    pub route_errors: IntCounter,
    /// Groups skipped during routing because of a bad selector
    pub selector_warnings: IntCounter,
}

fn prom(e: prometheus::Error) -> Error {
    Error::Internal(format!("metrics registration failed: {}", e))
}

impl Metrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let reconcile_total = IntCounterVec::new(
            Opts::new("rg_reconcile_total", "Reconcile passes by result"),
            &["result"],
        )
        .map_err(prom)?;
        let reconcile_duration = Histogram::with_opts(HistogramOpts::new(
            "rg_reconcile_duration_seconds",
            "Duration of reconcile passes",
        ))
        .map_err(prom)?;
        let claim_events = IntCounterVec::new(
            Opts::new("rg_claim_events_total", "Claim events by kind and decision"),
            &["kind", "decision"],
        )
        .map_err(prom)?;
        let routed_keys = IntCounter::new("rg_routed_keys_total", "Reconcile keys produced by routing")
            .map_err(prom)?;
        let route_errors = IntCounter::new(
            "rg_route_errors_total",
            "Claim events dropped because groups could not be listed",
        )
        .map_err(prom)?;
        let selector_warnings = IntCounter::new(
            "rg_selector_warnings_total",
            "Groups skipped during routing because their selector is invalid",
        )
        .map_err(prom)?;

        registry.register(Box::new(reconcile_total.clone())).map_err(prom)?;
        registry.register(Box::new(reconcile_duration.clone())).map_err(prom)?;
        registry.register(Box::new(claim_events.clone())).map_err(prom)?;
        registry.register(Box::new(routed_keys.clone())).map_err(prom)?;
        registry.register(Box::new(route_errors.clone())).map_err(prom)?;
        registry.register(Box::new(selector_warnings.clone())).map_err(prom)?;

        Ok(Self {
            registry,
            reconcile_total,
            reconcile_duration,
            claim_events,
            routed_keys,
            route_errors,
            selector_warnings,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Count one reconcile pass
    pub fn record_reconcile(&self, result: &Result<ReconcileOutcome>) {
        let label = match result {
            Ok(ReconcileOutcome::GroupDeleted) => "deleted",
            Ok(ReconcileOutcome::Aggregated(agg)) if agg.is_partial() => "partial",
            Ok(ReconcileOutcome::Aggregated(_)) => "aggregated",
            Err(e) => e.reason(),
        };
        self.reconcile_total.with_label_values(&[label]).inc();
    }

    /// Count one claim event
    pub fn record_claim_event(&self, kind: &str, propagated: bool) {
        let decision = if propagated { "propagate" } else { "suppress" };
        self.claim_events.with_label_values(&[kind, decision]).inc();
    }

    /// Render the registry in the text exposition format
    pub fn encode(&self) -> Result<Vec<u8>> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(prom)?;
        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::GroupAggregate;

    #[test]
    fn test_record_reconcile_labels() {
        let metrics = Metrics::new().unwrap();
        metrics.record_reconcile(&Ok(ReconcileOutcome::GroupDeleted));
        metrics.record_reconcile(&Ok(ReconcileOutcome::Aggregated(GroupAggregate::default())));
        metrics.record_reconcile(&Err(Error::ClaimNotBound {
            claim: "apps/c1".into(),
            unbound: 1,
            total: 1,
        }));

        assert_eq!(metrics.reconcile_total.with_label_values(&["deleted"]).get(), 1);
        assert_eq!(metrics.reconcile_total.with_label_values(&["aggregated"]).get(), 1);
        assert_eq!(metrics.reconcile_total.with_label_values(&["ClaimNotBound"]).get(), 1);
    }

    #[test]
    fn test_encode_exposes_metrics() {
        let metrics = Metrics::new().unwrap();
        metrics.record_claim_event("update", false);
        metrics.routed_keys.inc();

        let text = String::from_utf8(metrics.encode().unwrap()).unwrap();
        assert!(text.contains("rg_claim_events_total{decision=\"suppress\",kind=\"update\"} 1"));
        assert!(text.contains("rg_routed_keys_total 1"));
    }
}
