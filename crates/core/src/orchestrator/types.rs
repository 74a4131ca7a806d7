//! Batch outcome types.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::request::{
    FailureReason, Phase, PhaseChange, RecordAttempts, RequestSpec, RestoreRecord, RetrievalTier,
};

/// Terminal outcome of one input row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordReport {
    /// 1-based position of the row in the batch.
    pub row: usize,
    pub bucket: String,
    /// Object key, if known (resolved by date lookup when no file name was given).
    pub key: Option<String>,
    pub recipient: Option<String>,
    pub tier: Option<RetrievalTier>,
    pub phase: Phase,
    pub failure: Option<FailureReason>,
    pub error: Option<String>,
    pub attempts: RecordAttempts,
    pub history: Vec<PhaseChange>,
    pub initiated_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl RecordReport {
    /// Report for a row that failed validation.
    pub fn rejected(row: usize, spec: &RequestSpec, error: impl Into<String>) -> Self {
        let now = Utc::now();
        let phase = Phase::Failed(FailureReason::InvalidRequestSpec);
        Self {
            row,
            bucket: spec.bucket.clone().unwrap_or_default(),
            key: spec.file_name.as_ref().map(|name| {
                crate::request::join_key(spec.key_prefix.as_deref().unwrap_or_default(), name)
            }),
            recipient: spec.email.clone(),
            tier: spec
                .retrieval_tier
                .as_deref()
                .and_then(|tier| tier.parse().ok()),
            phase,
            failure: Some(FailureReason::InvalidRequestSpec),
            error: Some(error.into()),
            attempts: RecordAttempts::default(),
            history: vec![PhaseChange { phase, at: now }],
            initiated_at: None,
            completed_at: Some(now),
        }
    }

    /// Whether the object reached the standard tier and the requester was told.
    pub fn is_notified(&self) -> bool {
        self.phase == Phase::Notified
    }
}

impl From<RestoreRecord> for RecordReport {
    fn from(record: RestoreRecord) -> Self {
        Self {
            row: record.row(),
            bucket: record.bucket().to_string(),
            key: record.key().map(str::to_string),
            recipient: Some(record.recipient().to_string()),
            tier: Some(record.tier()),
            phase: record.phase(),
            failure: record.failure(),
            error: record.last_error().map(str::to_string),
            attempts: record.attempts.clone(),
            history: record.history().to_vec(),
            initiated_at: record.initiated_at(),
            completed_at: record.completed_at(),
        }
    }
}

/// Summary of one batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub batch_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Whether the batch was cancelled before every record finished.
    pub cancelled: bool,
    pub total: usize,
    pub notified: usize,
    /// Records stopped by cancellation. Safe to resubmit.
    pub incomplete: usize,
    pub failed_by_reason: BTreeMap<FailureReason, usize>,
    /// Failures where the object was not (or not verifiably) restored.
    pub data_failures: usize,
    /// Rows whose object was promoted but whose notification was not delivered.
    pub notification_failures: Vec<usize>,
    /// Every record, ordered by row.
    pub records: Vec<RecordReport>,
}

impl BatchReport {
    /// Aggregate per-record outcomes.
    pub fn new(
        batch_id: impl Into<String>,
        started_at: DateTime<Utc>,
        cancelled: bool,
        mut records: Vec<RecordReport>,
    ) -> Self {
        records.sort_by_key(|r| r.row);

        let mut failed_by_reason = BTreeMap::new();
        let mut notification_failures = Vec::new();
        for reason in records.iter().filter_map(|r| r.failure) {
            *failed_by_reason.entry(reason).or_insert(0) += 1;
        }
        for record in &records {
            if record.failure == Some(FailureReason::NotificationFailed) {
                notification_failures.push(record.row);
            }
        }

        Self {
            batch_id: batch_id.into(),
            started_at,
            finished_at: Utc::now(),
            cancelled,
            total: records.len(),
            notified: records.iter().filter(|r| r.is_notified()).count(),
            incomplete: records
                .iter()
                .filter(|r| r.phase == Phase::Incomplete)
                .count(),
            data_failures: records
                .iter()
                .filter_map(|r| r.failure)
                .filter(FailureReason::is_data_failure)
                .count(),
            failed_by_reason,
            notification_failures,
            records,
        }
    }

    /// Total failed records, across all reasons.
    pub fn failed(&self) -> usize {
        self.failed_by_reason.values().sum()
    }

    /// Number of records that failed for `reason`.
    pub fn failed_with(&self, reason: FailureReason) -> usize {
        self.failed_by_reason.get(&reason).copied().unwrap_or(0)
    }

    /// Whether every record was notified.
    pub fn is_complete_success(&self) -> bool {
        self.notified == self.total
    }

    /// Report for one row.
    pub fn record(&self, row: usize) -> Option<&RecordReport> {
        self.records
            .binary_search_by_key(&row, |r| r.row)
            .ok()
            .map(|idx| &self.records[idx])
    }
}
