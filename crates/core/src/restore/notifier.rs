//! Completion notification.

use std::sync::Arc;

use chrono::Utc;

use super::{advance, fail, report_retry};
use crate::events::{EventHandle, RetryOperation};
use crate::mailer::{MailError, MailTransport};
use crate::orchestrator::OrchestratorConfig;
use crate::request::{FailureReason, Phase, RestoreRecord};
use crate::retry::RetryPolicy;

/// Outcome of [`Notifier::notify`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationResult {
    Sent,
    /// Delivery failed after retries. The object itself stays promoted.
    Failed { error: String },
    /// The record was not `Promoted`; nothing was sent.
    Skipped(Phase),
}

/// Sends the completion message for promoted records.
pub struct Notifier {
    mailer: Arc<dyn MailTransport>,
    subject: String,
    policy: RetryPolicy,
    events: Option<EventHandle>,
}

impl Notifier {
    pub fn new(
        mailer: Arc<dyn MailTransport>,
        subject: impl Into<String>,
        config: &OrchestratorConfig,
    ) -> Self {
        Self {
            mailer,
            subject: subject.into(),
            policy: config.retry_policy(),
            events: None,
        }
    }

    /// Report phase changes and retries through `events`.
    pub fn with_events(mut self, events: EventHandle) -> Self {
        self.events = Some(events);
        self
    }

    /// Notify the record's recipient. Only acts on `Promoted` records, so a
    /// record is notified at most once.
    pub async fn notify(&self, record: &mut RestoreRecord) -> NotificationResult {
        if record.phase() != Phase::Promoted {
            return NotificationResult::Skipped(record.phase());
        }

        let events = self.events.as_ref();
        let body = compose_body(record);
        let recipient = record.recipient().to_string();
        let row = record.row();

        let outcome = self
            .policy
            .run(
                || self.mailer.send(&recipient, &self.subject, &body),
                MailError::is_retryable,
                |attempt, delay, e| {
                    report_retry(events, row, RetryOperation::Notify, attempt, delay, e)
                },
            )
            .await;
        record.attempts.notify += outcome.attempts;

        match outcome.result {
            Ok(()) => {
                advance(record, Phase::Notified, events);
                tracing::info!(
                    "{}: notified {} via {}",
                    record.label(),
                    recipient,
                    self.mailer.name()
                );
                NotificationResult::Sent
            }
            Err(e) => {
                let error = e.to_string();
                fail(record, FailureReason::NotificationFailed, error.clone(), events);
                NotificationResult::Failed { error }
            }
        }
    }
}

/// Plain-text completion message for a promoted record.
pub fn compose_body(record: &RestoreRecord) -> String {
    let context = record.context();
    let key = record.key().unwrap_or_default();
    let restored_at = record
        .history()
        .iter()
        .rev()
        .find(|change| change.phase == Phase::Promoted)
        .map(|change| change.at)
        .unwrap_or_else(Utc::now);

    format!(
        "The restore of {file} has completed and the file is available in the standard tier.\n\
         \n\
         Bucket:    {bucket}\n\
         Key:       {key}\n\
         Server:    {server}\n\
         Instance:  {instance}\n\
         Database:  {database}\n\
         Completed: {at}\n",
        file = record.file_name().unwrap_or(key),
        bucket = record.bucket(),
        key = key,
        server = context.server_name,
        instance = context.instance_name,
        database = context.database_name,
        at = restored_at.format("%Y-%m-%d %H:%M:%S UTC"),
    )
}
