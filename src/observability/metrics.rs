//! # Metrics
//!
//! Prometheus metrics for monitoring the controller.
//!
//! ## Metrics Exposed
//!
//! - `ks_serviceaccount_reconciliations_total` - Total number of reconciliations
//! - `ks_serviceaccount_reconciliation_errors_total` - Total number of reconciliation errors
//! - `ks_serviceaccount_reconciliation_duration_seconds` - Duration of reconciliations
//! - `ks_serviceaccount_secrets_created_total` - Token secrets provisioned
//! - `ks_serviceaccount_secrets_deleted_total` - Token secrets deleted during cleanup
//! - `ks_serviceaccount_invalid_secrets_total` - Referenced secrets found missing or invalid
//! - `ks_serviceaccount_workload_restarts_total` - Workload restarts by workload kind

use anyhow::Result;
use prometheus::{Histogram, IntCounter, IntCounterVec, Registry};
use std::sync::LazyLock;

pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "ks_serviceaccount_reconciliations_total",
        "Total number of reconciliations",
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "ks_serviceaccount_reconciliation_errors_total",
        "Total number of reconciliation errors",
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "ks_serviceaccount_reconciliation_duration_seconds",
            "Duration of reconciliation in seconds",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0]),
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static SECRETS_CREATED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "ks_serviceaccount_secrets_created_total",
        "Total number of token secrets created",
    )
    .expect("Failed to create SECRETS_CREATED_TOTAL metric - this should never happen")
});

static SECRETS_DELETED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "ks_serviceaccount_secrets_deleted_total",
        "Total number of token secrets deleted",
    )
    .expect("Failed to create SECRETS_DELETED_TOTAL metric - this should never happen")
});

static INVALID_SECRETS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "ks_serviceaccount_invalid_secrets_total",
        "Total number of referenced secrets found missing or invalid",
    )
    .expect("Failed to create INVALID_SECRETS_TOTAL metric - this should never happen")
});

static WORKLOAD_RESTARTS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "ks_serviceaccount_workload_restarts_total",
            "Total number of workload rollout restarts by workload kind",
        ),
        &["kind"],
    )
    .expect("Failed to create WORKLOAD_RESTARTS_TOTAL metric - this should never happen")
});

#[allow(
    clippy::missing_errors_doc,
    reason = "Fails only when a metric is registered twice"
)]
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(SECRETS_CREATED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(SECRETS_DELETED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(INVALID_SECRETS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(WORKLOAD_RESTARTS_TOTAL.clone()))?;

    Ok(())
}

pub fn increment_reconciliations() {
    RECONCILIATIONS_TOTAL.inc();
}

pub fn increment_reconciliation_errors() {
    RECONCILIATION_ERRORS_TOTAL.inc();
}

pub fn observe_reconciliation_duration(duration: f64) {
    RECONCILIATION_DURATION.observe(duration);
}

pub fn increment_secrets_created() {
    SECRETS_CREATED_TOTAL.inc();
}

pub fn increment_secrets_deleted() {
    SECRETS_DELETED_TOTAL.inc();
}

pub fn increment_invalid_secrets() {
    INVALID_SECRETS_TOTAL.inc();
}

/// Count a rollout restart of a workload of `kind` (Deployment, StatefulSet, DaemonSet)
pub fn increment_workload_restarts(kind: &str) {
    WORKLOAD_RESTARTS_TOTAL.with_label_values(&[kind]).inc();
}
