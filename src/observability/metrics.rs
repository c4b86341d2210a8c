//! # Metrics
//!
//! Prometheus metrics for monitoring the operator.
//!
//! ## Metrics Exposed
//!
//! - `user_management_reconciliations_total` - Total number of reconciliation cycles
//! - `user_management_reconciliation_errors_total` - Aborted cycles by error class
//! - `user_management_reconciliation_duration_seconds` - Duration of reconciliation cycles
//! - `user_management_resources_applied_total` - Upserts by outcome (created, updated)
//! - `user_management_restarts_total` - Component restarts by outcome (ready, timeout, cancelled)
//! - `user_management_requeues_total` - Requeues by reason
//! - `user_management_bootstrap_generated_total` - Bootstrap records created

use anyhow::Result;
use prometheus::{Histogram, IntCounter, IntCounterVec, Registry};
use std::sync::LazyLock;

pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "user_management_reconciliations_total",
        "Total number of reconciliation cycles",
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "user_management_reconciliation_errors_total",
            "Total number of aborted reconciliation cycles by error class",
        ),
        &["class"],
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "user_management_reconciliation_duration_seconds",
            "Duration of reconciliation cycles in seconds",
        )
        .buckets(vec![0.1, 0.5, 1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0]),
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static RESOURCES_APPLIED_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "user_management_resources_applied_total",
            "Total number of resource upserts by outcome",
        ),
        &["outcome"],
    )
    .expect("Failed to create RESOURCES_APPLIED_TOTAL metric - this should never happen")
});

static RESTARTS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "user_management_restarts_total",
            "Total number of component restarts by outcome",
        ),
        &["outcome"],
    )
    .expect("Failed to create RESTARTS_TOTAL metric - this should never happen")
});

static REQUEUES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "user_management_requeues_total",
            "Total number of requeues by reason",
        ),
        &["reason"],
    )
    .expect("Failed to create REQUEUES_TOTAL metric - this should never happen")
});

static BOOTSTRAP_GENERATED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "user_management_bootstrap_generated_total",
        "Total number of bootstrap records created",
    )
    .expect("Failed to create BOOTSTRAP_GENERATED_TOTAL metric - this should never happen")
});

pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(RESOURCES_APPLIED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RESTARTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(REQUEUES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(BOOTSTRAP_GENERATED_TOTAL.clone()))?;

    Ok(())
}

pub fn increment_reconciliations() {
    RECONCILIATIONS_TOTAL.inc();
}

pub fn increment_reconciliation_errors(class: &str) {
    RECONCILIATION_ERRORS_TOTAL.with_label_values(&[class]).inc();
}

pub fn observe_reconciliation_duration(duration: f64) {
    RECONCILIATION_DURATION.observe(duration);
}

pub fn increment_resources_applied(outcome: &str) {
    RESOURCES_APPLIED_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn increment_restarts(outcome: &str) {
    RESTARTS_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn increment_requeues_total(reason: &str) {
    REQUEUES_TOTAL.with_label_values(&[reason]).inc();
}

pub fn increment_bootstrap_generated() {
    BOOTSTRAP_GENERATED_TOTAL.inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_metrics() {
        // Other tests may have registered already; a duplicate registration is the only
        // acceptable failure
        if let Err(e) = register_metrics() {
            assert!(e.to_string().contains("Duplicate"), "unexpected error: {e}");
        }
    }

    #[test]
    fn test_increment_reconciliations() {
        let before = RECONCILIATIONS_TOTAL.get();
        increment_reconciliations();
        assert!(RECONCILIATIONS_TOTAL.get() > before);
    }

    #[test]
    fn test_errors_are_labelled_by_class() {
        let before = RECONCILIATION_ERRORS_TOTAL
            .with_label_values(&["DataIntegrity"])
            .get();
        increment_reconciliation_errors("DataIntegrity");
        let after = RECONCILIATION_ERRORS_TOTAL
            .with_label_values(&["DataIntegrity"])
            .get();
        assert!(after > before);
    }

    #[test]
    fn test_resources_applied_by_outcome() {
        let before = RESOURCES_APPLIED_TOTAL.with_label_values(&["created"]).get();
        increment_resources_applied("created");
        assert!(RESOURCES_APPLIED_TOTAL.with_label_values(&["created"]).get() > before);
    }

    #[test]
    fn test_observe_reconciliation_duration() {
        let before = RECONCILIATION_DURATION.get_sample_count();
        observe_reconciliation_duration(1.5);
        assert!(RECONCILIATION_DURATION.get_sample_count() > before);
    }
}
