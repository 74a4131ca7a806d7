//! The mutable per-request record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::types::{FailureReason, ObjectIdentity, Phase, RequestContext, RetrievalTier};

/// An attempted transition that the state machine does not allow.
///
/// Only reachable through a bug: each record is owned by a single worker
/// that drives it forward in order.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid phase transition for row {row}: {from} -> {to}")]
pub struct TransitionError {
    pub row: usize,
    pub from: Phase,
    pub to: Phase,
}

/// One entry of a record's phase history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PhaseChange {
    pub phase: Phase,
    pub at: DateTime<Utc>,
}

/// Number of store or transport calls made per operation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecordAttempts {
    pub initiate: u32,
    pub poll: u32,
    pub promote: u32,
    pub notify: u32,
}

/// A validated restore request and its lifecycle state.
///
/// Identity fields are private and exposed read-only. The record is moved
/// into the worker that processes it, so state changes need no locking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestoreRecord {
    row: usize,
    identity: ObjectIdentity,
    tier: RetrievalTier,
    context: RequestContext,
    recipient: String,

    /// Key resolved at initiation (equals `identity.key()` when the file name was given).
    resolved_key: Option<String>,
    phase: Phase,
    history: Vec<PhaseChange>,
    pub attempts: RecordAttempts,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
    initiated_at: Option<DateTime<Utc>>,
    ready_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

impl RestoreRecord {
    /// Create a record in the `Pending` phase.
    pub fn new(
        row: usize,
        identity: ObjectIdentity,
        tier: RetrievalTier,
        context: RequestContext,
        recipient: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        let resolved_key = identity.key();
        Self {
            row,
            identity,
            tier,
            context,
            recipient: recipient.into(),
            resolved_key,
            phase: Phase::Pending,
            history: vec![PhaseChange {
                phase: Phase::Pending,
                at: now,
            }],
            attempts: RecordAttempts::default(),
            last_error: None,
            created_at: now,
            initiated_at: None,
            ready_at: None,
            completed_at: None,
        }
    }

    pub fn row(&self) -> usize {
        self.row
    }

    pub fn identity(&self) -> &ObjectIdentity {
        &self.identity
    }

    pub fn bucket(&self) -> &str {
        &self.identity.bucket
    }

    pub fn tier(&self) -> RetrievalTier {
        self.tier
    }

    pub fn context(&self) -> &RequestContext {
        &self.context
    }

    pub fn recipient(&self) -> &str {
        &self.recipient
    }

    /// The object key, once known.
    pub fn key(&self) -> Option<&str> {
        self.resolved_key.as_deref()
    }

    /// File name part of the resolved key.
    pub fn file_name(&self) -> Option<&str> {
        self.key().map(|k| k.rsplit('/').next().unwrap_or(k))
    }

    /// Record the key found by a date lookup. Has no effect once a key is set.
    pub fn resolve_key(&mut self, key: impl Into<String>) {
        if self.resolved_key.is_none() {
            self.resolved_key = Some(key.into());
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn history(&self) -> &[PhaseChange] {
        &self.history
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn set_last_error(&mut self, error: impl Into<String>) {
        self.last_error = Some(error.into());
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn initiated_at(&self) -> Option<DateTime<Utc>> {
        self.initiated_at
    }

    pub fn ready_at(&self) -> Option<DateTime<Utc>> {
        self.ready_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// The failure reason, if the record failed.
    pub fn failure(&self) -> Option<FailureReason> {
        match self.phase {
            Phase::Failed(reason) => Some(reason),
            _ => None,
        }
    }

    /// Move to `next`, enforcing the state machine.
    pub fn transition(&mut self, next: Phase) -> Result<Phase, TransitionError> {
        let from = self.phase;
        if !from.can_transition_to(&next) {
            return Err(TransitionError {
                row: self.row,
                from,
                to: next,
            });
        }

        let now = Utc::now();
        match next {
            Phase::Restoring => self.initiated_at = Some(now),
            Phase::Ready => self.ready_at = Some(now),
            _ => {}
        }
        if next.is_terminal() {
            self.completed_at = Some(now);
        }

        self.phase = next;
        self.history.push(PhaseChange { phase: next, at: now });
        Ok(from)
    }

    /// Fail the record with a reason and error message.
    pub fn fail(
        &mut self,
        reason: FailureReason,
        error: impl Into<String>,
    ) -> Result<Phase, TransitionError> {
        self.last_error = Some(error.into());
        self.transition(Phase::Failed(reason))
    }

    /// Human-readable label for logs.
    pub fn label(&self) -> String {
        match self.key() {
            Some(key) => format!("row {} ({}/{})", self.row, self.identity.bucket, key),
            None => format!(
                "row {} ({}/{}/*)",
                self.row, self.identity.bucket, self.identity.key_prefix
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn record() -> RestoreRecord {
        RestoreRecord::new(
            3,
            ObjectIdentity {
                bucket: "backups".to_string(),
                key_prefix: "sql/srv01/inst/db".to_string(),
                file_name: Some("db_20210721.bak".to_string()),
                last_modified: None,
            },
            RetrievalTier::Expedited,
            RequestContext {
                server_name: "srv01".to_string(),
                instance_name: "inst".to_string(),
                database_name: "db".to_string(),
            },
            "dba@example.com",
        )
    }

    #[test]
    fn test_new_record_is_pending_with_history() {
        let record = record();
        assert_eq!(record.phase(), Phase::Pending);
        assert_eq!(record.history().len(), 1);
        assert_eq!(record.key(), Some("sql/srv01/inst/db/db_20210721.bak"));
        assert_eq!(record.file_name(), Some("db_20210721.bak"));
    }

    #[test]
    fn test_full_success_path_sets_timestamps() {
        let mut record = record();
        for phase in [
            Phase::Restoring,
            Phase::Ready,
            Phase::Promoting,
            Phase::Promoted,
            Phase::Notified,
        ] {
            record.transition(phase).unwrap();
        }

        assert_eq!(record.phase(), Phase::Notified);
        assert!(record.initiated_at().is_some());
        assert!(record.ready_at().is_some());
        assert!(record.completed_at().is_some());
        assert_eq!(record.history().len(), 6);
    }

    #[test]
    fn test_invalid_transition_is_rejected_and_state_kept() {
        let mut record = record();
        let err = record.transition(Phase::Promoted).unwrap_err();
        assert_eq!(err.from, Phase::Pending);
        assert_eq!(err.to, Phase::Promoted);
        assert_eq!(record.phase(), Phase::Pending);
        assert_eq!(
            err.to_string(),
            "invalid phase transition for row 3: pending -> promoted"
        );
    }

    #[test]
    fn test_no_transition_out_of_failed() {
        let mut record = record();
        record
            .fail(FailureReason::AccessDenied, "403 Forbidden")
            .unwrap();
        assert_eq!(record.failure(), Some(FailureReason::AccessDenied));
        assert_eq!(record.last_error(), Some("403 Forbidden"));

        assert!(record.transition(Phase::Restoring).is_err());
        assert_eq!(record.phase(), Phase::Failed(FailureReason::AccessDenied));
    }

    #[test]
    fn test_resolve_key_only_once() {
        let mut record = RestoreRecord::new(
            0,
            ObjectIdentity {
                bucket: "backups".to_string(),
                key_prefix: "sql".to_string(),
                file_name: None,
                last_modified: NaiveDate::from_ymd_opt(2021, 7, 21),
            },
            RetrievalTier::Bulk,
            RequestContext {
                server_name: "s".to_string(),
                instance_name: "i".to_string(),
                database_name: "d".to_string(),
            },
            "a@b.co",
        );
        assert!(record.key().is_none());
        assert_eq!(record.label(), "row 0 (backups/sql/*)");

        record.resolve_key("sql/a.bak");
        record.resolve_key("sql/b.bak");
        assert_eq!(record.key(), Some("sql/a.bak"));
        assert_eq!(record.file_name(), Some("a.bak"));
    }
}
