//! Restore lifecycle integration tests.
//!
//! These tests drive whole batches through the orchestrator against the
//! mock store and mailer:
//! pending -> restoring -> ready -> promoting -> promoted -> notified

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};

use glacier_restore_core::{
    create_event_channel,
    orchestrator::RecordReport,
    store::StorageClass,
    testing::{fixtures, MockMailer, MockObjectStore, MockOperation},
    BatchReport, FailureReason, MailError, OrchestratorConfig, Phase, RequestSpec, RestoreEvent,
    RestoreOrchestrator,
};

const BUCKET: &str = "backups";
const PREFIX: &str = "sql/srv01/MSSQLSERVER/Sales";

fn key(file: &str) -> String {
    format!("{}/{}", PREFIX, file)
}

/// Test helper holding the collaborators of one orchestrator.
struct TestHarness {
    store: MockObjectStore,
    mailer: MockMailer,
    config: OrchestratorConfig,
}

impl TestHarness {
    async fn new() -> Self {
        let store = MockObjectStore::new();
        store.add_bucket(BUCKET).await;
        Self {
            store,
            mailer: MockMailer::new(),
            config: fixtures::fast_config(),
        }
    }

    fn orchestrator(&self) -> RestoreOrchestrator {
        RestoreOrchestrator::new(
            self.config.clone(),
            Arc::new(self.store.clone()),
            Arc::new(self.mailer.clone()),
            "S3 Glacier Restore Complete",
        )
    }

    async fn run(&self, specs: Vec<RequestSpec>) -> BatchReport {
        self.orchestrator().run(specs).await
    }
}

/// Every consecutive pair in a record's history is a legal edge.
fn assert_legal_history(record: &RecordReport) {
    assert_eq!(record.history.first().map(|c| c.phase), Some(Phase::Pending));
    for pair in record.history.windows(2) {
        assert!(
            pair[0].phase.can_transition_to(&pair[1].phase),
            "row {}: illegal transition {} -> {}",
            record.row,
            pair[0].phase,
            pair[1].phase
        );
    }
    assert!(record.phase.is_terminal(), "row {} not terminal", record.row);
}

#[tokio::test]
async fn test_mixed_batch_reports_each_outcome() {
    let harness = TestHarness::new().await;
    harness
        .store
        .add_archived_object(BUCKET, &key("Sales_20210721.bak"), 2048)
        .await;
    harness
        .store
        .add_archived_object(BUCKET, &key("Sales_20210720_full.bak"), 10)
        .await;
    harness
        .store
        .add_archived_object(BUCKET, &key("Sales_20210720_diff.bak"), 10)
        .await;

    let report = harness
        .run(vec![
            fixtures::request_spec(BUCKET, PREFIX, "Sales_20210721.bak", "expedited"),
            fixtures::dated_request_spec(BUCKET, PREFIX, "07202021"),
            fixtures::request_spec("no-such-bucket", PREFIX, "Sales.bak", "standard"),
        ])
        .await;

    assert_eq!(report.total, 3);
    assert_eq!(report.notified, 1);
    assert_eq!(report.failed(), 2);
    assert_eq!(report.failed_with(FailureReason::ObjectNotFound), 1);
    assert_eq!(report.failed_with(FailureReason::AccessDenied), 1);
    assert_eq!(report.data_failures, 2);

    assert_eq!(report.records[0].phase, Phase::Notified);
    assert_eq!(
        report.records[1].phase,
        Phase::Failed(FailureReason::ObjectNotFound)
    );
    assert_eq!(
        report.records[2].phase,
        Phase::Failed(FailureReason::AccessDenied)
    );
    for record in &report.records {
        assert_legal_history(record);
    }

    let sent = harness.mailer.sent().await;
    assert_eq!(sent.len(), 1);
    assert!(sent[0].body.contains("Sales_20210721.bak"));
}

#[tokio::test]
async fn test_notification_failure_keeps_promoted_object() {
    let harness = TestHarness::new().await;
    let object = key("Sales_20210721.bak");
    harness.store.add_archived_object(BUCKET, &object, 512).await;
    harness
        .mailer
        .fail_always(MailError::Unreachable("relay down".to_string()))
        .await;

    let report = harness
        .run(vec![fixtures::request_spec(
            BUCKET,
            PREFIX,
            "Sales_20210721.bak",
            "standard",
        )])
        .await;

    let record = &report.records[0];
    assert_eq!(record.phase, Phase::Failed(FailureReason::NotificationFailed));
    assert_eq!(report.notification_failures, vec![1]);
    assert_eq!(report.data_failures, 0);
    assert_eq!(record.attempts.notify, harness.config.max_retry_attempts);
    assert!(record
        .history
        .iter()
        .any(|change| change.phase == Phase::Promoted));
    assert_eq!(
        harness.store.object(BUCKET, &object).await,
        Some((StorageClass::Standard, 512))
    );
}

#[tokio::test]
async fn test_slow_restore_does_not_block_others() {
    let mut harness = TestHarness::new().await;
    harness.config.worker_pool_size = 2;
    harness.config.tier_wait_budgets.bulk_ms = 10_000;

    let slow = key("slow.bak");
    harness.store.add_archived_object(BUCKET, &slow, 1).await;
    harness.store.set_polls_until_ready(&slow, 25).await;
    let mut specs = vec![fixtures::request_spec(BUCKET, PREFIX, "slow.bak", "bulk")];
    for name in ["a.bak", "b.bak", "c.bak"] {
        harness.store.add_archived_object(BUCKET, &key(name), 1).await;
        specs.push(fixtures::request_spec(BUCKET, PREFIX, name, "expedited"));
    }

    let (events, mut rx) = create_event_channel(1000);
    let report = harness.orchestrator().with_events(events).run(specs).await;

    assert_eq!(report.notified, 4);
    let mut finish_order = Vec::new();
    while let Ok(envelope) = rx.try_recv() {
        if let RestoreEvent::RecordFinished { row, .. } = envelope.event {
            finish_order.push(row);
        }
    }
    assert_eq!(finish_order.len(), 4);
    assert_eq!(finish_order.last(), Some(&1), "order: {:?}", finish_order);
}

#[tokio::test]
async fn test_restore_that_never_completes_times_out() {
    let mut harness = TestHarness::new().await;
    harness.config.tier_wait_budgets.expedited_ms = 100;
    let object = key("stuck.bak");
    harness.store.add_archived_object(BUCKET, &object, 1).await;
    harness.store.set_never_ready(&object).await;

    let report = tokio::time::timeout(
        Duration::from_secs(5),
        harness.run(vec![fixtures::request_spec(
            BUCKET,
            PREFIX,
            "stuck.bak",
            "expedited",
        )]),
    )
    .await
    .expect("batch should finish within the wait budget");

    assert_eq!(report.failed_with(FailureReason::RestoreTimeout), 1);
    assert!(harness.mailer.sent().await.is_empty());
}

#[tokio::test]
async fn test_duplicate_rows_are_absorbed() {
    let harness = TestHarness::new().await;
    let object = key("Sales_20210721.bak");
    harness.store.add_archived_object(BUCKET, &object, 64).await;
    harness.store.set_polls_until_ready(&object, 3).await;

    let spec = fixtures::request_spec(BUCKET, PREFIX, "Sales_20210721.bak", "expedited");
    let report = harness.run(vec![spec.clone(), spec]).await;

    assert_eq!(report.notified, 2);
    assert_eq!(harness.mailer.sent().await.len(), 2);
    assert_eq!(
        harness.store.object(BUCKET, &object).await,
        Some((StorageClass::Standard, 64))
    );
    assert!(
        harness
            .store
            .call_count(MockOperation::Copy, &object)
            .await
            <= 2
    );
}

#[tokio::test]
async fn test_rerun_after_promotion_resumes_cleanly() {
    let harness = TestHarness::new().await;
    let object = key("Sales_20210721.bak");
    harness.store.add_archived_object(BUCKET, &object, 64).await;
    let spec = fixtures::request_spec(BUCKET, PREFIX, "Sales_20210721.bak", "bulk");

    let first = harness.run(vec![spec.clone()]).await;
    let second = harness.run(vec![spec]).await;

    assert_eq!(first.notified, 1);
    assert_eq!(second.notified, 1);
    assert_ne!(first.batch_id, second.batch_id);
    assert_eq!(harness.store.call_count(MockOperation::Copy, &object).await, 1);
}

#[tokio::test]
async fn test_cancel_stops_waiting_records() {
    let mut harness = TestHarness::new().await;
    harness.config.worker_pool_size = 2;
    let mut specs = Vec::new();
    for name in ["a.bak", "b.bak", "c.bak"] {
        let object = key(name);
        harness.store.add_archived_object(BUCKET, &object, 1).await;
        harness.store.set_never_ready(&object).await;
        specs.push(fixtures::request_spec(BUCKET, PREFIX, name, "standard"));
    }

    let orchestrator = harness.orchestrator();
    let canceller = orchestrator.canceller();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        canceller.cancel();
    });
    let report = orchestrator.run(specs).await;

    assert!(report.cancelled);
    assert_eq!(report.incomplete, 3);
    assert_eq!(report.failed(), 0);
    // The third record was still queued and never reached the store.
    assert_eq!(
        harness
            .store
            .call_count(MockOperation::BeginRestore, &key("c.bak"))
            .await,
        0
    );
    for record in &report.records {
        assert_legal_history(record);
    }
}

#[tokio::test]
async fn test_transient_store_errors_are_absorbed() {
    let harness = TestHarness::new().await;
    let object = key("Sales_20210721.bak");
    harness.store.add_archived_object(BUCKET, &object, 8).await;
    harness.store.fail_next(MockOperation::BeginRestore, 1).await;
    harness.store.fail_next(MockOperation::CheckStatus, 1).await;
    harness.store.fail_next(MockOperation::Copy, 1).await;

    let report = harness
        .run(vec![fixtures::request_spec(
            BUCKET,
            PREFIX,
            "Sales_20210721.bak",
            "standard",
        )])
        .await;

    let record = &report.records[0];
    assert_eq!(record.phase, Phase::Notified);
    assert_eq!(record.attempts.initiate, 2);
    assert_eq!(record.error, None);
}

#[tokio::test]
async fn test_date_lookup_resolves_key_in_report() {
    let harness = TestHarness::new().await;
    let modified = Utc.with_ymd_and_hms(2021, 7, 2, 4, 0, 0).unwrap();
    let object = key("Sales_full.bak");
    harness
        .store
        .add_object(BUCKET, &object, 99, StorageClass::Glacier, modified)
        .await;

    // Single-digit month written without its leading zero.
    let report = harness
        .run(vec![fixtures::dated_request_spec(BUCKET, PREFIX, "7022021")])
        .await;

    assert_eq!(report.records[0].phase, Phase::Notified);
    assert_eq!(report.records[0].key.as_deref(), Some(object.as_str()));
}

#[tokio::test]
async fn test_report_serializes_to_json() {
    let harness = TestHarness::new().await;
    let report = harness
        .run(vec![RequestSpec {
            bucket: Some(BUCKET.to_string()),
            ..Default::default()
        }])
        .await;

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["failed_by_reason"]["invalid_request_spec"], 1);
    assert_eq!(json["records"][0]["row"], 1);
}
