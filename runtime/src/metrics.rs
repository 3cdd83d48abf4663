//! Prometheus metrics for the enrollment engine.
//!
//! # Exported Metrics
//!
//! ## Counters
//! - `enrollment_admissions_total{outcome}` - Admission attempts by outcome
//! - `enrollment_withdrawals_total{outcome}` - Withdrawals by outcome
//! - `enrollment_capacity_changes_total{outcome}` - Capacity edits by outcome
//! - `enrollment_activities_deleted_total` - Cascade deletes
//! - `enrollment_retries_total{operation}` - Conflicts that triggered a retry
//! - `enrollment_event_delivery_failures_total{event_type}` - Dropped notifications
//!
//! ## Histograms
//! - `enrollment_admission_duration_seconds` - Time spent in the Seat Ledger per admission
//!
//! # Example
//!
//! ```rust,no_run
//! use enrollment_runtime::metrics::MetricsServer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//! // Metrics available at http://localhost:9090/metrics
//! # Ok(())
//! # }
//! ```

use enrollment_core::EnrollmentError;
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// Admission attempts by outcome.
pub const ADMISSIONS_TOTAL: &str = "enrollment_admissions_total";
/// Withdrawals by outcome.
pub const WITHDRAWALS_TOTAL: &str = "enrollment_withdrawals_total";
/// Capacity edits by outcome.
pub const CAPACITY_CHANGES_TOTAL: &str = "enrollment_capacity_changes_total";
/// Cascade deletes.
pub const ACTIVITIES_DELETED_TOTAL: &str = "enrollment_activities_deleted_total";
/// Retried conflicts.
pub const RETRIES_TOTAL: &str = "enrollment_retries_total";
/// Dropped notifications.
pub const EVENT_DELIVERY_FAILURES_TOTAL: &str = "enrollment_event_delivery_failures_total";
/// Admission latency.
pub const ADMISSION_DURATION_SECONDS: &str = "enrollment_admission_duration_seconds";

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
}

/// Prometheus metrics server.
///
/// Installs the global recorder and serves `/metrics` on `addr`.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server.
    ///
    /// # Arguments
    ///
    /// * `addr` - Socket address to bind to (e.g., `0.0.0.0:9090`)
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Register metric descriptions, install the recorder and start serving.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or the listener cannot bind.
    ///
    /// # Note
    ///
    /// If a recorder is already installed (e.g., in tests), this logs a warning
    /// and leaves the existing recorder in place.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let (recorder, exporter) = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[
                    0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5,
                ],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?
            .with_http_listener(self.addr)
            .build()
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        let handle = recorder.handle();
        if metrics::set_global_recorder(recorder).is_err() {
            tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
            return Ok(());
        }

        tokio::spawn(async move {
            if exporter.await.is_err() {
                tracing::error!("Metrics exporter stopped");
            }
        });

        self.handle = Some(handle);
        tracing::info!(
            addr = %self.addr,
            "Metrics server started - available at http://{}/metrics",
            self.addr
        );
        Ok(())
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if this server did not install the recorder.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
pub fn register_metrics() {
    describe_counter!(ADMISSIONS_TOTAL, "Admission attempts by outcome");
    describe_counter!(WITHDRAWALS_TOTAL, "Withdrawals by outcome");
    describe_counter!(CAPACITY_CHANGES_TOTAL, "Capacity edits by outcome");
    describe_counter!(
        ACTIVITIES_DELETED_TOTAL,
        "Activities deleted together with their enrollments"
    );
    describe_counter!(
        RETRIES_TOTAL,
        "Storage conflicts that triggered a retry, by operation"
    );
    describe_counter!(
        EVENT_DELIVERY_FAILURES_TOTAL,
        "Domain events the event sink failed to deliver"
    );
    describe_histogram!(
        ADMISSION_DURATION_SECONDS,
        "Time spent deciding and persisting one admission"
    );
}

/// Metric label for an operation result.
#[must_use]
pub const fn outcome<T>(result: &Result<T, EnrollmentError>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(EnrollmentError::SeatsExhausted { .. }) => "seats_exhausted",
        Err(EnrollmentError::AlreadyEnrolled { .. }) => "already_enrolled",
        Err(EnrollmentError::NotEnrolled { .. }) => "not_enrolled",
        Err(EnrollmentError::ActivityNotFound(_) | EnrollmentError::UserNotFound(_)) => {
            "not_found"
        }
        Err(EnrollmentError::CapacityBelowActiveEnrollments { .. }) => "below_active",
        Err(EnrollmentError::TemporaryFailure { .. }) => "temporary_failure",
        Err(EnrollmentError::Validation(_)) => "invalid",
        Err(EnrollmentError::Directory(_) | EnrollmentError::Storage(_)) => "error",
    }
}

/// Seat Ledger metrics recorder.
pub struct LedgerMetrics;

impl LedgerMetrics {
    /// Record an admission attempt.
    pub fn record_admission<T>(result: &Result<T, EnrollmentError>, duration: Duration) {
        counter!(ADMISSIONS_TOTAL, "outcome" => outcome(result)).increment(1);
        histogram!(ADMISSION_DURATION_SECONDS).record(duration.as_secs_f64());
    }

    /// Record a withdrawal.
    pub fn record_withdrawal<T>(result: &Result<T, EnrollmentError>) {
        counter!(WITHDRAWALS_TOTAL, "outcome" => outcome(result)).increment(1);
    }

    /// Record a capacity edit.
    pub fn record_capacity_change<T>(result: &Result<T, EnrollmentError>) {
        counter!(CAPACITY_CHANGES_TOTAL, "outcome" => outcome(result)).increment(1);
    }

    /// Record a cascade delete.
    pub fn record_activity_deleted() {
        counter!(ACTIVITIES_DELETED_TOTAL).increment(1);
    }
}

pub(crate) fn record_retry(operation: &'static str) {
    counter!(RETRIES_TOTAL, "operation" => operation).increment(1);
}

pub(crate) fn record_event_delivery_failure(event_type: &'static str) {
    counter!(EVENT_DELIVERY_FAILURES_TOTAL, "event_type" => event_type).increment(1);
}
