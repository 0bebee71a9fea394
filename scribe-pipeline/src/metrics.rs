//! Pipeline metrics.
//!
//! Counters and histograms are emitted through the `metrics` facade; the
//! embedding application decides which recorder, if any, to install.

use metrics::{counter, gauge, histogram};

// Metric names as constants for consistency
const COMMITS_TOTAL: &str = "scribe_commits_total";
const COMMITS_SKIPPED_TOTAL: &str = "scribe_commits_skipped_total";
const SERVICE_ATTEMPTS_TOTAL: &str = "scribe_service_attempts_total";
const SERVICE_RETRIES_TOTAL: &str = "scribe_service_retries_total";
const SERVICE_FAILURES_TOTAL: &str = "scribe_service_failures_total";
const UPLOAD_ATTEMPTS_TOTAL: &str = "scribe_upload_attempts_total";
const SNAPSHOT_BYTES: &str = "scribe_snapshot_bytes";
const SNAPSHOT_ATTEMPTS: &str = "scribe_snapshot_attempts";
const VALIDATIONS_TOTAL: &str = "scribe_validations_total";
const HINT_LEVEL: &str = "scribe_hint_level";
const PIPELINE_WARNINGS_TOTAL: &str = "scribe_pipeline_warnings_total";
const HYDRATED_STEPS: &str = "scribe_hydrated_steps";

/// Record a step handed to the commit pipeline.
pub fn record_commit() {
    counter!(COMMITS_TOTAL).increment(1);
}

/// Record a `finish_line` call that did nothing.
///
/// # Arguments
///
/// * `reason` - "busy", "nothing_to_commit" or "attempt_solved"
pub fn record_commit_skipped(reason: &str) {
    counter!(COMMITS_SKIPPED_TOTAL, "reason" => reason.to_string()).increment(1);
}

/// Record one request to a remote service.
pub fn record_service_attempt(service: &str) {
    counter!(SERVICE_ATTEMPTS_TOTAL, "service" => service.to_string()).increment(1);
}

/// Record a retry scheduled after a retryable failure.
pub fn record_service_retry(service: &str) {
    counter!(SERVICE_RETRIES_TOTAL, "service" => service.to_string()).increment(1);
}

/// Record a service call that ultimately failed.
pub fn record_service_failure(service: &str) {
    counter!(SERVICE_FAILURES_TOTAL, "service" => service.to_string()).increment(1);
}

/// Record one upload attempt.
///
/// # Arguments
///
/// * `stage` - "storage" or "row"
/// * `success` - Whether the attempt succeeded
pub fn record_upload_attempt(stage: &str, success: bool) {
    counter!(
        UPLOAD_ATTEMPTS_TOTAL,
        "stage" => stage.to_string(),
        "success" => success.to_string()
    )
    .increment(1);
}

/// Record an exported snapshot.
#[allow(clippy::cast_precision_loss)]
pub fn record_snapshot(bytes: usize, attempts: u32) {
    histogram!(SNAPSHOT_BYTES).record(bytes as f64);
    histogram!(SNAPSHOT_ATTEMPTS).record(f64::from(attempts));
}

/// Record a validation verdict.
pub fn record_validation(status: &str) {
    counter!(VALIDATIONS_TOTAL, "status" => status.to_string()).increment(1);
}

/// Update the current hint level.
pub fn set_hint_level(level: u8) {
    gauge!(HINT_LEVEL).set(f64::from(level));
}

/// Record a non-fatal commit failure.
pub fn record_warning(kind: &str) {
    counter!(PIPELINE_WARNINGS_TOTAL, "kind" => kind.to_string()).increment(1);
}

/// Record the number of steps restored on resume.
#[allow(clippy::cast_precision_loss)]
pub fn record_hydration(steps: usize) {
    histogram!(HYDRATED_STEPS).record(steps as f64);
}
