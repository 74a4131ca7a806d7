//! Per-record phase handlers.
//!
//! A worker drives one record through the handlers in order:
//!
//! 1. [`RetrievalInitiator`]: `Pending -> Restoring`
//! 2. [`StatusPoller`]: `Restoring -> Ready`
//! 3. [`PromotionHandler`]: `Ready -> Promoting -> Promoted`
//! 4. [`Notifier`]: `Promoted -> Notified`
//!
//! Every handler contains its failures: errors end the record in
//! `Failed(reason)` instead of propagating to the caller.

mod initiator;
mod notifier;
mod poller;
mod promoter;

pub use initiator::{InitiationResult, RetrievalInitiator};
pub use notifier::{compose_body, NotificationResult, Notifier};
pub use poller::{PollOutcome, StatusPoller};
pub use promoter::{PromotionHandler, PromotionResult};

use std::fmt::Display;
use std::time::Duration;

use crate::events::{EventHandle, RestoreEvent, RetryOperation};
use crate::metrics;
use crate::request::{FailureReason, Phase, RestoreRecord};

/// Move `record` to `next` and report the change.
///
/// Returns false when the state machine refuses the edge. Each record has a
/// single owner, so a refusal is a bug in the caller and is logged as such.
pub(crate) fn advance(
    record: &mut RestoreRecord,
    next: Phase,
    events: Option<&EventHandle>,
) -> bool {
    match record.transition(next) {
        Ok(from) => {
            tracing::debug!("{}: {} -> {}", record.label(), from, next);
            if let Some(events) = events {
                events.try_emit(RestoreEvent::PhaseChanged {
                    row: record.row(),
                    bucket: record.bucket().to_string(),
                    key: record.key().map(str::to_string),
                    from,
                    to: next,
                });
            }
            true
        }
        Err(e) => {
            tracing::error!("Phase contract violation: {}", e);
            false
        }
    }
}

/// End `record` in `Failed(reason)`, keeping `error` as its last error.
pub(crate) fn fail(
    record: &mut RestoreRecord,
    reason: FailureReason,
    error: impl Into<String>,
    events: Option<&EventHandle>,
) {
    let error = error.into();
    tracing::warn!("{} failed ({}): {}", record.label(), reason, error);
    record.set_last_error(error);
    advance(record, Phase::Failed(reason), events);
}

/// Count and report a retry about to back off.
pub(crate) fn report_retry(
    events: Option<&EventHandle>,
    row: usize,
    operation: RetryOperation,
    attempt: u32,
    delay: Duration,
    error: &dyn Display,
) {
    metrics::RETRY_ATTEMPTS
        .with_label_values(&[operation.as_str()])
        .inc();
    tracing::debug!(
        "row {}: {} attempt {} failed ({}), retrying in {:?}",
        row,
        operation.as_str(),
        attempt,
        error,
        delay
    );
    if let Some(events) = events {
        events.try_emit(RestoreEvent::RetryScheduled {
            row,
            operation,
            attempt,
            delay_ms: delay.as_millis() as u64,
            error: error.to_string(),
        });
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::NaiveDate;

    use crate::request::{ObjectIdentity, RequestContext, RestoreRecord, RetrievalTier};

    pub const BUCKET: &str = "backups";
    pub const PREFIX: &str = "sql/srv01/MSSQLSERVER/Sales";
    pub const KEY: &str = "sql/srv01/MSSQLSERVER/Sales/Sales_20210721.bak";

    pub fn record(tier: RetrievalTier) -> RestoreRecord {
        RestoreRecord::new(
            0,
            ObjectIdentity {
                bucket: BUCKET.to_string(),
                key_prefix: PREFIX.to_string(),
                file_name: Some("Sales_20210721.bak".to_string()),
                last_modified: None,
            },
            tier,
            context(),
            "dba@example.com",
        )
    }

    pub fn dated_record(date: NaiveDate) -> RestoreRecord {
        RestoreRecord::new(
            0,
            ObjectIdentity {
                bucket: BUCKET.to_string(),
                key_prefix: PREFIX.to_string(),
                file_name: None,
                last_modified: Some(date),
            },
            RetrievalTier::Standard,
            context(),
            "dba@example.com",
        )
    }

    fn context() -> RequestContext {
        RequestContext {
            server_name: "srv01".to_string(),
            instance_name: "MSSQLSERVER".to_string(),
            database_name: "Sales".to_string(),
        }
    }
}
