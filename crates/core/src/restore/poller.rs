//! Restore status polling.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::{advance, fail, report_retry};
use crate::events::{EventHandle, RetryOperation};
use crate::metrics;
use crate::orchestrator::{OrchestratorConfig, TierWaitBudgets};
use crate::request::{FailureReason, Phase, RestoreRecord};
use crate::retry::{Backoff, RetryPolicy};
use crate::store::{ObjectStore, RestoreStatus, StoreError};

/// Result of a single status query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Restoration still in progress.
    Pending,
    /// The restored copy is readable.
    Ready,
    /// The store reports the restore itself failed.
    Failed { reason: String },
}

/// Polls a record's restore status until it is ready.
///
/// Cadence starts at the base interval scaled by the record's tier and
/// doubles up to the maximum interval. The tier's wait budget bounds the
/// whole wait.
pub struct StatusPoller {
    store: Arc<dyn ObjectStore>,
    policy: RetryPolicy,
    base_interval: Duration,
    max_interval: Duration,
    budgets: TierWaitBudgets,
    events: Option<EventHandle>,
}

impl StatusPoller {
    pub fn new(store: Arc<dyn ObjectStore>, config: &OrchestratorConfig) -> Self {
        Self {
            store,
            policy: config.retry_policy(),
            base_interval: config.base_poll_interval(),
            max_interval: config.max_poll_interval(),
            budgets: config.tier_wait_budgets.clone(),
            events: None,
        }
    }

    /// Report phase changes and retries through `events`.
    pub fn with_events(mut self, events: EventHandle) -> Self {
        self.events = Some(events);
        self
    }

    /// Query the store once.
    pub async fn poll(&self, record: &RestoreRecord) -> Result<PollOutcome, StoreError> {
        let key = record
            .key()
            .ok_or_else(|| StoreError::Other(format!("{} has no resolved key", record.label())))?;

        let status = self.store.check_restore_status(record.bucket(), key).await;
        let label = match &status {
            Ok(RestoreStatus::InProgress) => "pending",
            Ok(RestoreStatus::Available) => "ready",
            Ok(RestoreStatus::Failed { .. }) => "failed",
            Err(_) => "error",
        };
        metrics::STATUS_POLLS.with_label_values(&[label]).inc();

        Ok(match status? {
            RestoreStatus::InProgress => PollOutcome::Pending,
            RestoreStatus::Available => PollOutcome::Ready,
            RestoreStatus::Failed { reason } => PollOutcome::Failed { reason },
        })
    }

    /// Poll schedule for `record`'s tier.
    fn cadence(&self, record: &RestoreRecord) -> Backoff {
        let base = self
            .base_interval
            .saturating_mul(record.tier().poll_scale())
            .min(self.max_interval);
        Backoff::new(base, self.max_interval)
    }

    /// Poll until the restore is ready, fails, runs out of budget, or the
    /// batch is cancelled. Returns the record's phase afterwards.
    ///
    /// Cancellation is only observed between polls: a status query already
    /// sent is allowed to finish.
    pub async fn wait_until_ready(
        &self,
        record: &mut RestoreRecord,
        cancel: &CancellationToken,
    ) -> Phase {
        if record.phase() != Phase::Restoring {
            return record.phase();
        }

        let events = self.events.as_ref();
        let tier = record.tier();
        let budget = self.budgets.for_tier(tier);
        let started = Instant::now();
        let deadline = started + budget;
        let cadence = self.cadence(record);
        let mut pending_polls = 0;
        let mut transient_errors = 0;

        loop {
            record.attempts.poll += 1;
            let delay = match self.poll(record).await {
                Ok(PollOutcome::Ready) => {
                    metrics::RESTORE_WAIT_DURATION
                        .with_label_values(&[tier.as_str()])
                        .observe(started.elapsed().as_secs_f64());
                    advance(record, Phase::Ready, events);
                    tracing::info!(
                        "{}: restored copy available after {} poll(s)",
                        record.label(),
                        record.attempts.poll
                    );
                    return record.phase();
                }
                Ok(PollOutcome::Failed { reason }) => {
                    fail(record, FailureReason::RestoreFailed, reason, events);
                    return record.phase();
                }
                Ok(PollOutcome::Pending) => {
                    transient_errors = 0;
                    pending_polls += 1;
                    cadence.delay(pending_polls)
                }
                Err(e) if e.is_retryable() => {
                    transient_errors += 1;
                    if transient_errors >= self.policy.max_attempts() {
                        fail(
                            record,
                            FailureReason::TransientStoreError,
                            e.to_string(),
                            events,
                        );
                        return record.phase();
                    }
                    let delay = self.policy.backoff().delay(transient_errors);
                    report_retry(
                        events,
                        record.row(),
                        RetryOperation::Poll,
                        transient_errors,
                        delay,
                        &e,
                    );
                    delay
                }
                Err(e) => {
                    fail(record, e.failure_reason(), e.to_string(), events);
                    return record.phase();
                }
            };

            let now = Instant::now();
            if now >= deadline {
                fail(
                    record,
                    FailureReason::RestoreTimeout,
                    format!("not restored within the {} tier budget of {:?}", tier, budget),
                    events,
                );
                return record.phase();
            }

            tokio::select! {
                _ = tokio::time::sleep(delay.min(deadline - now)) => {}
                _ = cancel.cancelled() => {
                    tracing::info!("{}: cancelled while waiting for restore", record.label());
                    advance(record, Phase::Incomplete, events);
                    return record.phase();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::RetrievalTier;
    use crate::restore::test_support::{record, BUCKET, KEY};
    use crate::testing::{fixtures, MockObjectStore, MockOperation};

    async fn restoring(store: &MockObjectStore, tier: RetrievalTier) -> RestoreRecord {
        store.add_archived_object(BUCKET, KEY, 100).await;
        store
            .begin_restore(BUCKET, KEY, tier, 1)
            .await
            .unwrap();
        let mut rec = record(tier);
        rec.transition(Phase::Restoring).unwrap();
        rec
    }

    fn poller(store: &MockObjectStore, config: &OrchestratorConfig) -> StatusPoller {
        StatusPoller::new(Arc::new(store.clone()), config)
    }

    #[tokio::test]
    async fn test_poll_reports_pending_then_ready() {
        let store = MockObjectStore::new();
        store.set_polls_until_ready(KEY, 1).await;
        let rec = restoring(&store, RetrievalTier::Expedited).await;
        let poller = poller(&store, &fixtures::fast_config());

        assert_eq!(poller.poll(&rec).await.unwrap(), PollOutcome::Pending);
        assert_eq!(poller.poll(&rec).await.unwrap(), PollOutcome::Ready);
    }

    #[tokio::test]
    async fn test_wait_until_ready() {
        let store = MockObjectStore::new();
        store.set_polls_until_ready(KEY, 3).await;
        let mut rec = restoring(&store, RetrievalTier::Expedited).await;
        let token = CancellationToken::new();

        let phase = poller(&store, &fixtures::fast_config())
            .wait_until_ready(&mut rec, &token)
            .await;

        assert_eq!(phase, Phase::Ready);
        assert_eq!(rec.attempts.poll, 4);
        assert!(rec.ready_at().is_some());
    }

    #[tokio::test]
    async fn test_store_reported_failure() {
        let store = MockObjectStore::new();
        let mut rec = restoring(&store, RetrievalTier::Standard).await;
        store.set_restore_failure(KEY, "object unreadable").await;
        let token = CancellationToken::new();

        let phase = poller(&store, &fixtures::fast_config())
            .wait_until_ready(&mut rec, &token)
            .await;

        assert_eq!(phase, Phase::Failed(FailureReason::RestoreFailed));
        assert_eq!(rec.last_error(), Some("object unreadable"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_ready_times_out() {
        let store = MockObjectStore::new();
        let mut rec = restoring(&store, RetrievalTier::Bulk).await;
        store.set_never_ready(KEY).await;
        let mut config = fixtures::fast_config();
        config.base_poll_interval_ms = 1_000;
        config.max_poll_interval_ms = 60_000;
        config.tier_wait_budgets.bulk_ms = 600_000;
        let token = CancellationToken::new();

        let phase = poller(&store, &config)
            .wait_until_ready(&mut rec, &token)
            .await;

        assert_eq!(phase, Phase::Failed(FailureReason::RestoreTimeout));
        // 10s, 20s, 40s, then 60s steps up to the 600s budget.
        assert!(rec.attempts.poll < 20);
    }

    #[tokio::test]
    async fn test_transient_poll_errors_are_absorbed() {
        let store = MockObjectStore::new();
        let mut rec = restoring(&store, RetrievalTier::Expedited).await;
        store.fail_next(MockOperation::CheckStatus, 2).await;
        let token = CancellationToken::new();

        let phase = poller(&store, &fixtures::fast_config())
            .wait_until_ready(&mut rec, &token)
            .await;

        assert_eq!(phase, Phase::Ready);
    }

    #[tokio::test]
    async fn test_persistent_poll_errors_fail_record() {
        let store = MockObjectStore::new();
        let mut rec = restoring(&store, RetrievalTier::Expedited).await;
        store.fail_next(MockOperation::CheckStatus, 100).await;
        let token = CancellationToken::new();

        let phase = poller(&store, &fixtures::fast_config())
            .wait_until_ready(&mut rec, &token)
            .await;

        assert_eq!(phase, Phase::Failed(FailureReason::TransientStoreError));
        assert_eq!(rec.attempts.poll, fixtures::fast_config().max_retry_attempts);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_wait_leaves_record_incomplete() {
        let store = MockObjectStore::new();
        let mut rec = restoring(&store, RetrievalTier::Bulk).await;
        store.set_never_ready(KEY).await;
        let token = CancellationToken::new();
        let canceller = token.clone();
        let poller = poller(&store, &fixtures::fast_config());

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            canceller.cancel();
        });
        let phase = poller.wait_until_ready(&mut rec, &token).await;

        assert_eq!(phase, Phase::Incomplete);
        assert_eq!(rec.failure(), None);
    }

    #[tokio::test]
    async fn test_skips_records_not_restoring() {
        let store = MockObjectStore::new();
        let mut rec = record(RetrievalTier::Bulk);
        let token = CancellationToken::new();

        let phase = poller(&store, &fixtures::fast_config())
            .wait_until_ready(&mut rec, &token)
            .await;

        assert_eq!(phase, Phase::Pending);
        assert!(store.recorded_calls().await.is_empty());
    }

    #[test]
    fn test_cadence_scales_with_tier() {
        let store = MockObjectStore::new();
        let poller = poller(&store, &fixtures::fast_config());

        let expedited = poller.cadence(&record(RetrievalTier::Expedited));
        let bulk = poller.cadence(&record(RetrievalTier::Bulk));
        assert!(bulk.delay(1) > expedited.delay(1));
        assert!(bulk.delay(10) <= poller.max_interval);
    }
}
