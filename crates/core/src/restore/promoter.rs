//! Promotion of restored objects into the standard tier.

use std::sync::Arc;

use super::{advance, fail, report_retry};
use crate::events::{EventHandle, RetryOperation};
use crate::orchestrator::OrchestratorConfig;
use crate::request::{FailureReason, Phase, RestoreRecord};
use crate::retry::RetryPolicy;
use crate::store::{ObjectStore, StorageClass, StoreError};

/// Outcome of [`PromotionHandler::promote`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromotionResult {
    /// The object is verified in the standard tier.
    Promoted,
    /// The record failed terminally.
    Failed {
        reason: FailureReason,
        error: String,
    },
    /// The record was not ready for promotion.
    Skipped(Phase),
}

/// Copies a restored object onto its own key in the standard storage class,
/// then verifies the result.
///
/// The copy is a whole-object server-side replacement, so a failed or
/// unverified attempt leaves either the previous object or a complete copy
/// in place. Re-running after a partial failure is safe.
pub struct PromotionHandler {
    store: Arc<dyn ObjectStore>,
    policy: RetryPolicy,
    events: Option<EventHandle>,
}

impl PromotionHandler {
    pub fn new(store: Arc<dyn ObjectStore>, config: &OrchestratorConfig) -> Self {
        Self {
            store,
            policy: config.retry_policy(),
            events: None,
        }
    }

    /// Report phase changes and retries through `events`.
    pub fn with_events(mut self, events: EventHandle) -> Self {
        self.events = Some(events);
        self
    }

    /// Promote a `Ready` record. A record left in `Promoting` by an earlier
    /// attempt is resumed.
    pub async fn promote(&self, record: &mut RestoreRecord) -> PromotionResult {
        let events = self.events.as_ref();
        match record.phase() {
            Phase::Ready => {
                advance(record, Phase::Promoting, events);
            }
            Phase::Promoting => {}
            Phase::Promoted => return PromotionResult::Promoted,
            phase => return PromotionResult::Skipped(phase),
        }

        let Some(key) = record.key().map(str::to_string) else {
            return self.failed(
                record,
                FailureReason::PromotionVerificationFailed,
                "no resolved key".to_string(),
            );
        };
        let bucket = record.bucket().to_string();
        let row = record.row();

        let source = self
            .policy
            .run(
                || self.store.head_object(&bucket, &key),
                StoreError::is_retryable,
                |attempt, delay, e| {
                    report_retry(events, row, RetryOperation::Promote, attempt, delay, e)
                },
            )
            .await;
        record.attempts.promote += source.attempts;
        let source = match source.result {
            Ok(metadata) => metadata,
            Err(e) => return self.failed(record, e.failure_reason(), e.to_string()),
        };

        if source.storage_class == StorageClass::Standard {
            tracing::info!("{}: already in the standard tier", record.label());
            return self.promoted(record);
        }

        let max_attempts = self.policy.max_attempts();
        let mut last_error = String::new();
        for attempt in 1..=max_attempts {
            record.attempts.promote += 1;
            let copied = self
                .store
                .copy_object(&bucket, &key, &key, StorageClass::Standard)
                .await;

            match copied {
                Ok(()) => match self.verify(&bucket, &key, source.size).await {
                    Ok(()) => {
                        tracing::info!(
                            "{}: promoted to standard tier ({} bytes)",
                            record.label(),
                            source.size
                        );
                        return self.promoted(record);
                    }
                    Err(e) => last_error = e,
                },
                Err(e) if e.is_retryable() => last_error = e.to_string(),
                Err(e @ (StoreError::AccessDenied(_)
                | StoreError::NoSuchBucket { .. }
                | StoreError::NotFound { .. })) => {
                    return self.failed(record, e.failure_reason(), e.to_string());
                }
                Err(e) => {
                    return self.failed(
                        record,
                        FailureReason::PromotionVerificationFailed,
                        e.to_string(),
                    );
                }
            }

            if attempt < max_attempts {
                let delay = self.policy.backoff().delay(attempt);
                report_retry(events, row, RetryOperation::Promote, attempt, delay, &last_error);
                tokio::time::sleep(delay).await;
            }
        }

        self.failed(
            record,
            FailureReason::PromotionVerificationFailed,
            format!("copy not verified after {} attempt(s): {}", max_attempts, last_error),
        )
    }

    /// Check the destination is a complete standard-tier copy.
    async fn verify(&self, bucket: &str, key: &str, expected_size: u64) -> Result<(), String> {
        let metadata = self
            .store
            .head_object(bucket, key)
            .await
            .map_err(|e| e.to_string())?;

        if metadata.storage_class != StorageClass::Standard {
            return Err(format!(
                "{}/{} is still in {}",
                bucket, key, metadata.storage_class
            ));
        }
        if metadata.size != expected_size {
            return Err(format!(
                "{}/{} has {} bytes, expected {}",
                bucket, key, metadata.size, expected_size
            ));
        }
        Ok(())
    }

    fn promoted(&self, record: &mut RestoreRecord) -> PromotionResult {
        advance(record, Phase::Promoted, self.events.as_ref());
        PromotionResult::Promoted
    }

    fn failed(
        &self,
        record: &mut RestoreRecord,
        reason: FailureReason,
        error: String,
    ) -> PromotionResult {
        fail(record, reason, error.clone(), self.events.as_ref());
        PromotionResult::Failed { reason, error }
    }
}
