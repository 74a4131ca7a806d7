//! Retrieval initiation.

use std::sync::Arc;

use chrono::NaiveDate;
use tokio_util::sync::CancellationToken;

use super::{advance, fail, report_retry};
use crate::events::{EventHandle, RetryOperation};
use crate::orchestrator::OrchestratorConfig;
use crate::request::{FailureReason, Phase, RestoreRecord};
use crate::retry::RetryPolicy;
use crate::store::{ObjectStore, ObjectSummary, StoreError};

/// Outcome of [`RetrievalInitiator::initiate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitiationResult {
    /// The store accepted a new restore request.
    Started,
    /// A restore was already in flight for this object.
    AlreadyRestoring,
    /// The object is already in an accessible storage class.
    NotArchived,
    /// The record failed terminally.
    Failed {
        reason: FailureReason,
        error: String,
    },
    /// The batch was cancelled before the store accepted a request; the
    /// record is `Incomplete`.
    Cancelled,
    /// The record was past `Pending`; nothing was sent to the store.
    Skipped(Phase),
}

/// Result of resolving a key from a date.
enum KeyLookup {
    Found(String),
    Cancelled,
    Failed(FailureReason, String),
}

impl InitiationResult {
    /// Whether the record is now `Restoring`.
    pub fn is_restoring(&self) -> bool {
        matches!(
            self,
            InitiationResult::Started
                | InitiationResult::AlreadyRestoring
                | InitiationResult::NotArchived
        )
    }
}

/// Issues the store's "begin restore" call for a record.
pub struct RetrievalInitiator {
    store: Arc<dyn ObjectStore>,
    policy: RetryPolicy,
    restore_days: u32,
    events: Option<EventHandle>,
}

impl RetrievalInitiator {
    pub fn new(store: Arc<dyn ObjectStore>, config: &OrchestratorConfig) -> Self {
        Self {
            store,
            policy: config.retry_policy(),
            restore_days: config.restore_days,
            events: None,
        }
    }

    /// Report phase changes and retries through `events`.
    pub fn with_events(mut self, events: EventHandle) -> Self {
        self.events = Some(events);
        self
    }

    /// Request the restore of `record`'s object.
    ///
    /// Resolves the key by date first when only `last_modified` is known.
    /// Transient store errors are retried under the policy; a restore
    /// already in progress counts as success. Calling this again on a
    /// record that is already `Restoring` does not touch the store.
    ///
    /// No store call is started once `cancel` is raised; the record then
    /// ends `Incomplete`.
    pub async fn initiate(
        &self,
        record: &mut RestoreRecord,
        cancel: &CancellationToken,
    ) -> InitiationResult {
        match record.phase() {
            Phase::Pending => {}
            Phase::Restoring => return InitiationResult::AlreadyRestoring,
            phase => return InitiationResult::Skipped(phase),
        }
        if cancel.is_cancelled() {
            return self.cancelled(record);
        }

        let key = match record.key() {
            Some(key) => key.to_string(),
            None => match self.resolve_key(record, cancel).await {
                KeyLookup::Found(key) => {
                    tracing::info!("{}: resolved key {}", record.label(), key);
                    record.resolve_key(key.clone());
                    key
                }
                KeyLookup::Cancelled => return self.cancelled(record),
                KeyLookup::Failed(reason, error) => return self.failed(record, reason, error),
            },
        };
        if cancel.is_cancelled() {
            return self.cancelled(record);
        }

        let bucket = record.bucket().to_string();
        let tier = record.tier();
        let row = record.row();
        let events = self.events.as_ref();

        let outcome = self
            .policy
            .run_cancellable(
                cancel,
                || self
                    .store
                    .begin_restore(&bucket, &key, tier, self.restore_days),
                StoreError::is_retryable,
                |attempt, delay, e| {
                    report_retry(events, row, RetryOperation::Initiate, attempt, delay, e)
                },
            )
            .await;
        record.attempts.initiate += outcome.attempts;
        if outcome.cancelled {
            return self.cancelled(record);
        }

        let result = match outcome.result {
            Ok(()) => InitiationResult::Started,
            Err(StoreError::AlreadyRestoring { .. }) => InitiationResult::AlreadyRestoring,
            Err(StoreError::NotArchived { .. }) => InitiationResult::NotArchived,
            Err(e) => return self.failed(record, e.failure_reason(), e.to_string()),
        };

        advance(record, Phase::Restoring, events);
        match result {
            InitiationResult::Started => tracing::info!(
                "{}: restore requested ({} tier, {} day(s))",
                record.label(),
                tier,
                self.restore_days
            ),
            InitiationResult::AlreadyRestoring => {
                tracing::info!("{}: restore already in progress", record.label())
            }
            _ => tracing::info!("{}: object is not archived", record.label()),
        }
        result
    }

    /// Find the single object under the prefix that matches the record's date.
    async fn resolve_key(
        &self,
        record: &mut RestoreRecord,
        cancel: &CancellationToken,
    ) -> KeyLookup {
        let identity = record.identity();
        let Some(date) = identity.last_modified else {
            return KeyLookup::Failed(
                FailureReason::InvalidRequestSpec,
                "neither file name nor last-modified date given".to_string(),
            );
        };
        let bucket = identity.bucket.clone();
        let prefix = match identity.key_prefix.trim_end_matches('/') {
            "" => String::new(),
            p => format!("{}/", p),
        };
        let row = record.row();
        let events = self.events.as_ref();

        let outcome = self
            .policy
            .run_cancellable(
                cancel,
                || self.store.list_objects(&bucket, &prefix),
                StoreError::is_retryable,
                |attempt, delay, e| {
                    report_retry(events, row, RetryOperation::Lookup, attempt, delay, e)
                },
            )
            .await;
        record.attempts.initiate += outcome.attempts;
        if outcome.cancelled {
            return KeyLookup::Cancelled;
        }
        let objects = match outcome.result {
            Ok(objects) => objects,
            Err(e) => return KeyLookup::Failed(e.failure_reason(), e.to_string()),
        };

        match candidates_for(objects, date).as_slice() {
            [only] => KeyLookup::Found(only.key.clone()),
            [] => KeyLookup::Failed(
                FailureReason::ObjectNotFound,
                format!("no object under {}/{} matches {}", bucket, prefix, date),
            ),
            many => KeyLookup::Failed(
                FailureReason::ObjectNotFound,
                format!(
                    "{} objects under {}/{} match {}: {}",
                    many.len(),
                    bucket,
                    prefix,
                    date,
                    many.iter()
                        .map(|o| o.key.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            ),
        }
    }

    fn cancelled(&self, record: &mut RestoreRecord) -> InitiationResult {
        tracing::info!("{}: cancelled before the restore was requested", record.label());
        advance(record, Phase::Incomplete, self.events.as_ref());
        InitiationResult::Cancelled
    }

    fn failed(
        &self,
        record: &mut RestoreRecord,
        reason: FailureReason,
        error: String,
    ) -> InitiationResult {
        fail(record, reason, error.clone(), self.events.as_ref());
        InitiationResult::Failed { reason, error }
    }
}

/// Objects matching `date`.
///
/// File names carrying the `YYYYMMDD` stamp win. The last-modified (UTC) day
/// is only consulted when no name carries the stamp, since backups uploaded
/// shortly after midnight carry the previous day's stamp.
fn candidates_for(objects: Vec<ObjectSummary>, date: NaiveDate) -> Vec<ObjectSummary> {
    let stamp = date.format("%Y%m%d").to_string();
    let (stamped, unstamped): (Vec<_>, Vec<_>) = objects
        .into_iter()
        .filter(|o| !o.key.ends_with('/'))
        .partition(|o| file_name(&o.key).contains(&stamp));
    if !stamped.is_empty() {
        return stamped;
    }
    unstamped
        .into_iter()
        .filter(|o| o.last_modified.date_naive() == date)
        .collect()
}

fn file_name(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}
