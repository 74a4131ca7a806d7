use serde::{Deserialize, Serialize};

use crate::request::{FailureReason, Phase};

/// Operation a retry belongs to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RetryOperation {
    Lookup,
    Initiate,
    Poll,
    Promote,
    Notify,
}

impl RetryOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetryOperation::Lookup => "lookup",
            RetryOperation::Initiate => "initiate",
            RetryOperation::Poll => "poll",
            RetryOperation::Promote => "promote",
            RetryOperation::Notify => "notify",
        }
    }
}

/// Progress event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RestoreEvent {
    BatchStarted {
        batch_id: String,
        total: usize,
        workers: usize,
    },
    /// Input row failed validation and will not be processed.
    RecordRejected {
        row: usize,
        error: String,
    },
    PhaseChanged {
        row: usize,
        bucket: String,
        key: Option<String>,
        from: Phase,
        to: Phase,
    },
    RetryScheduled {
        row: usize,
        operation: RetryOperation,
        attempt: u32,
        delay_ms: u64,
        error: String,
    },
    RecordFinished {
        row: usize,
        phase: Phase,
        failure: Option<FailureReason>,
        error: Option<String>,
    },
    BatchCancelled {
        batch_id: String,
    },
    BatchCompleted {
        batch_id: String,
        notified: usize,
        failed: usize,
        incomplete: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = RestoreEvent::RetryScheduled {
            row: 2,
            operation: RetryOperation::Notify,
            attempt: 1,
            delay_ms: 500,
            error: "relay busy".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "retry_scheduled");
        assert_eq!(json["operation"], "notify");
    }

    #[test]
    fn test_phase_changed_roundtrip() {
        let event = RestoreEvent::PhaseChanged {
            row: 0,
            bucket: "backups".to_string(),
            key: Some("db.bak".to_string()),
            from: Phase::Restoring,
            to: Phase::Ready,
        };
        let json = serde_json::to_string(&event).unwrap();
        let parsed: RestoreEvent = serde_json::from_str(&json).unwrap();
        assert!(matches!(
            parsed,
            RestoreEvent::PhaseChanged {
                to: Phase::Ready,
                ..
            }
        ));
    }
}
