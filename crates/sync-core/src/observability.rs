//! Observability infrastructure for the sync pipeline
//!
//! Provides:
//! - Prometheus process metrics (reconcile latency, pod results, container outcomes)
//! - Structured logging events with tracing
//! - Subscriber setup for embedding processes

use crate::models::{CheckResult, PodRef};
use crate::reconciler::PodSyncError;
use prometheus::{register_histogram, register_int_counter_vec, Histogram, IntCounterVec};
use std::sync::OnceLock;
use tracing::{debug, error, warn};
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Histogram buckets for reconcile latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<SyncMetricsInner> = OnceLock::new();

struct SyncMetricsInner {
    pods_reconciled: IntCounterVec,
    reconcile_latency_seconds: Histogram,
    container_outcomes: IntCounterVec,
}

impl SyncMetricsInner {
    fn new() -> Self {
        Self {
            pods_reconciled: register_int_counter_vec!(
                "version_sync_pods_reconciled_total",
                "Pods reconciled, by result",
                &["result"]
            )
            .expect("Failed to register pods_reconciled"),

            reconcile_latency_seconds: register_histogram!(
                "version_sync_reconcile_latency_seconds",
                "Time spent reconciling all containers of a pod",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register reconcile_latency_seconds"),

            container_outcomes: register_int_counter_vec!(
                "version_sync_container_outcomes_total",
                "Container reconciliations, by outcome",
                &["outcome"]
            )
            .expect("Failed to register container_outcomes"),
        }
    }
}

/// How a single container reconciliation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerOutcome {
    /// A result was written to the metrics store
    Recorded,
    /// The checker had no result yet
    Pending,
    /// Checking is disabled; any stale entry was removed
    Disabled,
    NoVersionFound,
    ConfigurationError,
    CheckFailed,
}

impl ContainerOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerOutcome::Recorded => "recorded",
            ContainerOutcome::Pending => "pending",
            ContainerOutcome::Disabled => "disabled",
            ContainerOutcome::NoVersionFound => "no_version_found",
            ContainerOutcome::ConfigurationError => "configuration_error",
            ContainerOutcome::CheckFailed => "check_failed",
        }
    }
}

/// Sync metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance; clones share the
/// same underlying metrics.
#[derive(Clone)]
pub struct SyncMetrics {
    _private: (),
}

impl Default for SyncMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(SyncMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &SyncMetricsInner {
        GLOBAL_METRICS.get_or_init(SyncMetricsInner::new)
    }

    /// Record a finished pod reconciliation
    pub fn observe_pod(&self, success: bool, duration_secs: f64) {
        let result = if success { "success" } else { "failure" };
        self.inner()
            .pods_reconciled
            .with_label_values(&[result])
            .inc();
        self.inner().reconcile_latency_seconds.observe(duration_secs);
    }

    /// Record how a container reconciliation ended
    pub fn inc_container_outcome(&self, outcome: ContainerOutcome) {
        self.inner()
            .container_outcomes
            .with_label_values(&[outcome.as_str()])
            .inc();
    }

    /// Current count for an outcome
    pub fn container_outcome_count(&self, outcome: ContainerOutcome) -> u64 {
        self.inner()
            .container_outcomes
            .with_label_values(&[outcome.as_str()])
            .get()
    }

    /// Current count of pod reconciliations with the given result
    pub fn pods_reconciled_count(&self, success: bool) -> u64 {
        let result = if success { "success" } else { "failure" };
        self.inner()
            .pods_reconciled
            .with_label_values(&[result])
            .get()
    }
}

/// Install a global subscriber with an env filter (default `info`)
pub fn init_tracing(json: bool) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .try_init()
    }
}

/// Log the interpreted result of a version check
pub fn log_image_checked(pod: PodRef<'_>, container: &str, result: &CheckResult) {
    if result.is_latest {
        debug!(
            event = "image_checked",
            namespace = %pod.namespace,
            pod = %pod.name,
            container = %container,
            image = %result.image_url,
            current_version = %result.current_version,
            "Image is latest"
        );
    } else {
        debug!(
            event = "image_checked",
            namespace = %pod.namespace,
            pod = %pod.name,
            container = %container,
            image = %result.image_url,
            current_version = %result.current_version,
            latest_version = %result.latest_version,
            "Image is not latest"
        );
    }
}

/// Log a check that found no version matching the configured criteria.
///
/// Emitted at error severity even though the reconciliation succeeds, so
/// log-based alerting keeps seeing it.
pub fn log_no_version_found(pod: PodRef<'_>, container: &str, reason: &dyn std::fmt::Display) {
    error!(
        event = "no_version_found",
        namespace = %pod.namespace,
        pod = %pod.name,
        container = %container,
        reason = %reason,
        "No version found matching search criteria"
    );
}

/// Log a container whose checking is disabled
pub fn log_container_disabled(pod: PodRef<'_>, container: &str) {
    debug!(
        event = "container_disabled",
        namespace = %pod.namespace,
        pod = %pod.name,
        container = %container,
        "Version checking disabled, removing image metrics"
    );
}

/// Log a pod whose reconciliation failed
pub fn log_pod_sync_failed(err: &PodSyncError) {
    warn!(
        event = "pod_sync_failed",
        namespace = %err.namespace,
        pod = %err.name,
        failed_containers = err.failures.len(),
        retryable = err.is_retryable(),
        error = %err,
        "Pod reconciliation failed"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_metrics_creation() {
        // Global registry: registered once per process, shared by every handle.
        let metrics = SyncMetrics::new();
        let clone = metrics.clone();

        metrics.observe_pod(true, 0.01);
        metrics.observe_pod(false, 0.2);
        metrics.inc_container_outcome(ContainerOutcome::Recorded);

        assert!(clone.pods_reconciled_count(true) >= 1);
        assert!(clone.pods_reconciled_count(false) >= 1);
        assert!(clone.container_outcome_count(ContainerOutcome::Recorded) >= 1);
    }

    #[test]
    fn test_container_outcome_labels() {
        assert_eq!(ContainerOutcome::NoVersionFound.as_str(), "no_version_found");
        assert_eq!(
            ContainerOutcome::ConfigurationError.as_str(),
            "configuration_error"
        );
    }
}
