//! Prometheus metrics for the restore engine.
//!
//! This module provides metrics for:
//! - Batch outcomes (records by terminal phase and failure reason)
//! - Retries by operation
//! - Store and mail calls
//! - Restore wait time by retrieval tier

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts};

// =============================================================================
// Record Outcomes
// =============================================================================

/// Records reaching a terminal outcome.
pub static RECORDS_FINISHED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "glacier_restore_records_finished_total",
            "Records reaching a terminal outcome",
        ),
        &["outcome"], // "notified", "failed", "incomplete", "rejected"
    )
    .unwrap()
});

/// Failed records by reason.
pub static RECORD_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "glacier_restore_record_failures_total",
            "Failed records by failure reason",
        ),
        &["reason"],
    )
    .unwrap()
});

// =============================================================================
// Store and Transport Calls
// =============================================================================

/// Retries scheduled by operation.
pub static RETRY_ATTEMPTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "glacier_restore_retry_attempts_total",
            "Retries scheduled after a retryable error",
        ),
        &["operation"], // "lookup", "initiate", "poll", "promote", "notify"
    )
    .unwrap()
});

/// Restore-status polls by result.
pub static STATUS_POLLS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "glacier_restore_status_polls_total",
            "Restore status queries by result",
        ),
        &["result"], // "pending", "ready", "failed", "error"
    )
    .unwrap()
});

/// Time from initiation to the restored copy being available.
pub static RESTORE_WAIT_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "glacier_restore_wait_seconds",
            "Time from restore initiation until the object is readable",
        )
        .buckets(vec![
            60.0, 300.0, 900.0, 3600.0, 3.0 * 3600.0, 6.0 * 3600.0, 12.0 * 3600.0, 48.0 * 3600.0,
        ]),
        &["tier"],
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(RECORDS_FINISHED.clone()),
        Box::new(RECORD_FAILURES.clone()),
        Box::new(RETRY_ATTEMPTS.clone()),
        Box::new(STATUS_POLLS.clone()),
        Box::new(RESTORE_WAIT_DURATION.clone()),
    ]
}
