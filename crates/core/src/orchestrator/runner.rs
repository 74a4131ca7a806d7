//! Restore orchestrator implementation.
//!
//! Fans a batch out across a fixed pool of workers. Each worker takes one
//! record at a time from a shared queue and drives it through every phase
//! before taking the next, so a slow restore only ever occupies its own
//! worker.

use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::events::{EventHandle, RestoreEvent};
use crate::mailer::MailTransport;
use crate::metrics;
use crate::request::{FailureReason, Phase, RequestSpec, RestoreRecord};
use crate::restore::{
    advance, fail, Notifier, PromotionHandler, PromotionResult, RetrievalInitiator, StatusPoller,
};
use crate::store::ObjectStore;

use super::config::OrchestratorConfig;
use super::types::{BatchReport, RecordReport};

/// The four phase handlers, shared by all workers of a batch.
struct PhaseHandlers {
    initiator: RetrievalInitiator,
    poller: StatusPoller,
    promoter: PromotionHandler,
    notifier: Notifier,
    events: Option<EventHandle>,
}

impl PhaseHandlers {
    /// Run one record to a terminal phase.
    async fn drive(&self, record: &mut RestoreRecord, cancel: &CancellationToken) {
        if !self.initiator.initiate(record, cancel).await.is_restoring() {
            return;
        }
        if self.poller.wait_until_ready(record, cancel).await != Phase::Ready {
            return;
        }
        if self.promoter.promote(record).await != PromotionResult::Promoted {
            return;
        }
        self.notifier.notify(record).await;
    }
}

/// The restore orchestrator - runs a batch of requests to completion.
pub struct RestoreOrchestrator {
    config: OrchestratorConfig,
    store: Arc<dyn ObjectStore>,
    mailer: Arc<dyn MailTransport>,
    subject: String,
    events: Option<EventHandle>,
    cancel: CancellationToken,
}

impl RestoreOrchestrator {
    /// Create a new orchestrator.
    pub fn new(
        config: OrchestratorConfig,
        store: Arc<dyn ObjectStore>,
        mailer: Arc<dyn MailTransport>,
        subject: impl Into<String>,
    ) -> Self {
        Self {
            config,
            store,
            mailer,
            subject: subject.into(),
            events: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Report progress through `events`.
    pub fn with_events(mut self, events: EventHandle) -> Self {
        self.events = Some(events);
        self
    }

    /// Token that cancels running and future batches once raised.
    pub fn canceller(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    fn handlers(&self) -> PhaseHandlers {
        let mut initiator = RetrievalInitiator::new(Arc::clone(&self.store), &self.config);
        let mut poller = StatusPoller::new(Arc::clone(&self.store), &self.config);
        let mut promoter = PromotionHandler::new(Arc::clone(&self.store), &self.config);
        let mut notifier =
            Notifier::new(Arc::clone(&self.mailer), self.subject.clone(), &self.config);

        if let Some(events) = &self.events {
            initiator = initiator.with_events(events.clone());
            poller = poller.with_events(events.clone());
            promoter = promoter.with_events(events.clone());
            notifier = notifier.with_events(events.clone());
        }

        PhaseHandlers {
            initiator,
            poller,
            promoter,
            notifier,
            events: self.events.clone(),
        }
    }

    /// Run a batch: validate every spec, restore the valid ones concurrently
    /// and report every row's terminal outcome.
    ///
    /// Rows are numbered from 1 in input order. Invalid rows are rejected
    /// individually without affecting the rest of the batch.
    pub async fn run(&self, specs: Vec<RequestSpec>) -> BatchReport {
        let batch_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();
        let events = self.events.as_ref();

        let mut reports = Vec::with_capacity(specs.len());
        let mut records = Vec::with_capacity(specs.len());
        for (idx, spec) in specs.iter().enumerate() {
            let row = idx + 1;
            match spec.validate(row) {
                Ok(record) => records.push(record),
                Err(error) => {
                    warn!("row {}: rejected: {}", row, error);
                    emit(
                        events,
                        RestoreEvent::RecordRejected {
                            row,
                            error: error.clone(),
                        },
                    );
                    reports.push(RecordReport::rejected(row, spec, error));
                }
            }
        }

        let workers = self.config.worker_pool_size.clamp(1, records.len().max(1));
        info!(
            "Batch {}: {} row(s), {} rejected, {} worker(s)",
            batch_id,
            specs.len(),
            reports.len(),
            workers
        );
        emit(
            events,
            RestoreEvent::BatchStarted {
                batch_id: batch_id.clone(),
                total: specs.len(),
                workers,
            },
        );

        // Every record is queued up front; workers pull until the queue drains.
        let (tx, rx) = mpsc::channel(records.len().max(1));
        for record in records {
            if tx.try_send(record).is_err() {
                error!("Restore queue rejected a record");
            }
        }
        drop(tx);

        let queue = Arc::new(Mutex::new(rx));
        let finished = Arc::new(RwLock::new(Vec::new()));
        let handlers = Arc::new(self.handlers());

        // Each worker parks its current record in a slot so the record
        // survives the worker's task if it panics.
        let slots: Vec<WorkerSlot> = (0..workers).map(|_| Arc::default()).collect();
        let handles = slots.iter().enumerate().map(|(id, slot)| {
            let worker = Worker {
                id,
                queue: Arc::clone(&queue),
                slot: Arc::clone(slot),
                finished: Arc::clone(&finished),
                handlers: Arc::clone(&handlers),
                cancel: self.cancel.clone(),
                events: self.events.clone(),
            };
            tokio::spawn(worker.run())
        });

        let mut lost = Vec::new();
        for (slot, result) in slots.iter().zip(join_all(handles).await) {
            if let Err(e) = result {
                error!("Restore worker failed: {}", e);
                if let Some(mut record) = slot.lock().await.take() {
                    abandon(&mut record, &format!("restore worker failed: {}", e), events);
                    lost.push(record);
                }
            }
        }
        // Records still queued when every worker died.
        while let Ok(mut record) = queue.lock().await.try_recv() {
            abandon(&mut record, "no restore worker left to take the record", events);
            lost.push(record);
        }

        let cancelled = self.cancel.is_cancelled();
        if cancelled {
            warn!("Batch {} was cancelled", batch_id);
            emit(
                events,
                RestoreEvent::BatchCancelled {
                    batch_id: batch_id.clone(),
                },
            );
        }

        let finished = std::mem::take(&mut *finished.write().await);
        reports.extend(finished.into_iter().chain(lost).map(RecordReport::from));
        record_outcome_metrics(&reports);

        let report = BatchReport::new(batch_id, started_at, cancelled, reports);
        info!(
            "Batch {} finished: {} notified, {} failed, {} incomplete",
            report.batch_id,
            report.notified,
            report.failed(),
            report.incomplete
        );
        emit(
            events,
            RestoreEvent::BatchCompleted {
                batch_id: report.batch_id.clone(),
                notified: report.notified,
                failed: report.failed(),
                incomplete: report.incomplete,
            },
        );
        report
    }
}

type WorkerSlot = Arc<Mutex<Option<RestoreRecord>>>;

/// One worker: take a record, drive it to a terminal phase, repeat.
struct Worker {
    id: usize,
    queue: Arc<Mutex<mpsc::Receiver<RestoreRecord>>>,
    slot: WorkerSlot,
    finished: Arc<RwLock<Vec<RestoreRecord>>>,
    handlers: Arc<PhaseHandlers>,
    cancel: CancellationToken,
    events: Option<EventHandle>,
}

impl Worker {
    async fn run(self) {
        debug!("Restore worker {} started", self.id);
        loop {
            let next = self.queue.lock().await.recv().await;
            let Some(record) = next else {
                break;
            };

            let mut current = self.slot.lock().await;
            let record = current.insert(record);
            debug!("Worker {} took {}", self.id, record.label());
            self.handlers.drive(record, &self.cancel).await;

            emit(
                self.events.as_ref(),
                RestoreEvent::RecordFinished {
                    row: record.row(),
                    phase: record.phase(),
                    failure: record.failure(),
                    error: record.last_error().map(str::to_string),
                },
            );
            if let Some(record) = current.take() {
                self.finished.write().await.push(record);
            }
        }
        debug!("Restore worker {} stopped", self.id);
    }
}

/// End a record whose worker is gone.
///
/// Records that never got past `Restoring` are resubmittable and end
/// `Incomplete`. Past that point the object state is unknown, unless the
/// copy was already promoted and only the notification is missing.
fn abandon(record: &mut RestoreRecord, error: &str, events: Option<&EventHandle>) {
    match record.phase() {
        Phase::Pending | Phase::Restoring => {
            record.set_last_error(error);
            advance(record, Phase::Incomplete, events);
        }
        Phase::Ready | Phase::Promoting => {
            fail(record, FailureReason::PromotionVerificationFailed, error, events)
        }
        Phase::Promoted => fail(record, FailureReason::NotificationFailed, error, events),
        Phase::Notified | Phase::Failed(_) | Phase::Incomplete => return,
    }
    emit(
        events,
        RestoreEvent::RecordFinished {
            row: record.row(),
            phase: record.phase(),
            failure: record.failure(),
            error: record.last_error().map(str::to_string),
        },
    );
}

fn emit(events: Option<&EventHandle>, event: RestoreEvent) {
    if let Some(events) = events {
        events.try_emit(event);
    }
}

fn record_outcome_metrics(reports: &[RecordReport]) {
    for report in reports {
        let outcome = match report.phase {
            Phase::Failed(reason) => {
                metrics::RECORD_FAILURES
                    .with_label_values(&[reason.as_str()])
                    .inc();
                "failed"
            }
            phase => phase.name(),
        };
        metrics::RECORDS_FINISHED
            .with_label_values(&[outcome])
            .inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::create_event_channel;
    use crate::testing::{fixtures, MockMailer, MockObjectStore};

    fn orchestrator(store: &MockObjectStore, mailer: &MockMailer) -> RestoreOrchestrator {
        RestoreOrchestrator::new(
            fixtures::fast_config(),
            Arc::new(store.clone()),
            Arc::new(mailer.clone()),
            "Restore complete",
        )
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let report = orchestrator(&MockObjectStore::new(), &MockMailer::new())
            .run(Vec::new())
            .await;

        assert_eq!(report.total, 0);
        assert!(report.records.is_empty());
        assert!(!report.cancelled);
    }

    #[tokio::test]
    async fn test_invalid_rows_do_not_abort_batch() {
        let store = MockObjectStore::new();
        store
            .add_archived_object("backups", "sql/db/db.bak", 10)
            .await;
        let mailer = MockMailer::new();
        let mut invalid = fixtures::request_spec("backups", "sql/db", "db.bak", "express");
        invalid.email = Some("not-an-address".to_string());

        let report = orchestrator(&store, &mailer)
            .run(vec![
                invalid,
                fixtures::request_spec("backups", "sql/db", "db.bak", "expedited"),
            ])
            .await;

        assert_eq!(report.total, 2);
        assert_eq!(report.notified, 1);
        assert_eq!(report.failed_with(FailureReason::InvalidRequestSpec), 1);
        assert_eq!(report.records[0].row, 1);
        assert_eq!(report.records[1].phase, Phase::Notified);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_marks_records_incomplete() {
        let store = MockObjectStore::new();
        store.add_archived_object("backups", "sql/db/db.bak", 10).await;
        let orchestrator = orchestrator(&store, &MockMailer::new());
        orchestrator.canceller().cancel();

        let report = orchestrator
            .run(vec![fixtures::request_spec(
                "backups", "sql/db", "db.bak", "bulk",
            )])
            .await;

        assert!(report.cancelled);
        assert_eq!(report.incomplete, 1);
        assert_eq!(report.failed(), 0);
        assert!(store.recorded_calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_events_bracket_the_batch() {
        let store = MockObjectStore::new();
        store.add_archived_object("backups", "sql/db/db.bak", 10).await;
        let (handle, mut rx) = create_event_channel(100);

        let report = orchestrator(&store, &MockMailer::new())
            .with_events(handle)
            .run(vec![fixtures::request_spec(
                "backups", "sql/db", "db.bak", "standard",
            )])
            .await;
        assert_eq!(report.notified, 1);

        let mut kinds = Vec::new();
        while let Ok(envelope) = rx.try_recv() {
            kinds.push(envelope.event);
        }
        assert!(matches!(kinds.first(), Some(RestoreEvent::BatchStarted { total: 1, .. })));
        assert!(matches!(kinds.last(), Some(RestoreEvent::BatchCompleted { notified: 1, .. })));
        assert!(kinds.iter().any(|e| matches!(
            e,
            RestoreEvent::PhaseChanged {
                to: Phase::Notified,
                ..
            }
        )));
        assert!(kinds
            .iter()
            .any(|e| matches!(e, RestoreEvent::RecordFinished { row: 1, .. })));
    }

    #[tokio::test]
    async fn test_panicking_worker_still_reports_its_rows() {
        let store = MockObjectStore::new();
        store.add_archived_object("backups", "sql/db/db.bak", 10).await;
        store.add_archived_object("backups", "sql/db/other.bak", 10).await;
        let mailer = MockMailer::new();
        mailer.panic_on_send().await;
        let mut config = fixtures::fast_config();
        config.worker_pool_size = 1;
        let orchestrator = RestoreOrchestrator::new(
            config,
            Arc::new(store.clone()),
            Arc::new(mailer.clone()),
            "Restore complete",
        );

        let report = orchestrator
            .run(vec![
                fixtures::request_spec("backups", "sql/db", "db.bak", "expedited"),
                fixtures::request_spec("backups", "sql/db", "other.bak", "expedited"),
            ])
            .await;

        assert_eq!(report.total, 2);
        assert_eq!(report.records.len(), 2);
        assert_eq!(
            report.records[0].phase,
            Phase::Failed(FailureReason::NotificationFailed)
        );
        assert!(report.records[0]
            .error
            .as_deref()
            .unwrap()
            .contains("restore worker failed"));
        assert_eq!(report.records[1].phase, Phase::Incomplete);
        assert_eq!(report.notification_failures, vec![1]);
    }
}
