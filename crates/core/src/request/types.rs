//! Core request data types.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ============================================================================
// Retrieval Tier
// ============================================================================

/// Speed class requested for a restore.
///
/// Determines the expected latency of the storage tier, and therefore how
/// often the record is polled and how long it may wait.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalTier {
    /// Typically 3-5 hours.
    Standard,
    /// Typically 1-5 minutes.
    Expedited,
    /// Typically 5-12 hours.
    Bulk,
}

impl RetrievalTier {
    /// Multiplier applied to the base poll interval.
    ///
    /// Slower tiers are polled less often so that waiting on a bulk restore
    /// does not burn store calls.
    pub fn poll_scale(&self) -> u32 {
        match self {
            RetrievalTier::Expedited => 1,
            RetrievalTier::Standard => 5,
            RetrievalTier::Bulk => 10,
        }
    }

    /// Name as used by the store API.
    pub fn as_str(&self) -> &'static str {
        match self {
            RetrievalTier::Standard => "standard",
            RetrievalTier::Expedited => "expedited",
            RetrievalTier::Bulk => "bulk",
        }
    }
}

impl fmt::Display for RetrievalTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RetrievalTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standard" => Ok(RetrievalTier::Standard),
            "expedited" => Ok(RetrievalTier::Expedited),
            "bulk" => Ok(RetrievalTier::Bulk),
            other => Err(format!(
                "unknown retrieval tier '{}' (expected standard, expedited or bulk)",
                other
            )),
        }
    }
}

// ============================================================================
// Identity and Context
// ============================================================================

/// Where the archived object lives.
///
/// Either `file_name` or `last_modified` is set (validation guarantees it).
/// When only the date is known the key is resolved by a store lookup before
/// the restore is issued.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ObjectIdentity {
    /// Bucket holding the object.
    pub bucket: String,
    /// Key prefix (directory part of the key, no trailing slash).
    pub key_prefix: String,
    /// File name under the prefix, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    /// Last-modified date used to find the object when the name is unknown.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<NaiveDate>,
}

impl ObjectIdentity {
    /// Full object key, if the file name is known.
    pub fn key(&self) -> Option<String> {
        self.file_name
            .as_deref()
            .map(|name| join_key(&self.key_prefix, name))
    }
}

/// Join a prefix and a file name with exactly one slash.
pub(crate) fn join_key(prefix: &str, name: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    let name = name.trim_start_matches('/');
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", prefix, name)
    }
}

/// Context passed through to the notification. Opaque to the engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RequestContext {
    pub server_name: String,
    pub instance_name: String,
    pub database_name: String,
}

// ============================================================================
// Phase State Machine
// ============================================================================

/// Why a record ended in [`Phase::Failed`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// The input row was missing or had malformed fields.
    InvalidRequestSpec,
    /// The key does not exist, or a date lookup was empty or ambiguous.
    ObjectNotFound,
    /// The store refused access (includes unknown buckets).
    AccessDenied,
    /// Transient store errors persisted past the retry budget.
    TransientStoreError,
    /// The tier's wait budget ran out before the restore completed.
    RestoreTimeout,
    /// The store reported that the restore itself failed.
    RestoreFailed,
    /// The promoted copy could not be verified after bounded retries.
    PromotionVerificationFailed,
    /// The object was restored and promoted but the notification was not delivered.
    NotificationFailed,
}

impl FailureReason {
    /// Whether the object data is in an unknown or unrestored state.
    ///
    /// `NotificationFailed` is the only reason where the data side succeeded.
    pub fn is_data_failure(&self) -> bool {
        !matches!(self, FailureReason::NotificationFailed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::InvalidRequestSpec => "invalid_request_spec",
            FailureReason::ObjectNotFound => "object_not_found",
            FailureReason::AccessDenied => "access_denied",
            FailureReason::TransientStoreError => "transient_store_error",
            FailureReason::RestoreTimeout => "restore_timeout",
            FailureReason::RestoreFailed => "restore_failed",
            FailureReason::PromotionVerificationFailed => "promotion_verification_failed",
            FailureReason::NotificationFailed => "notification_failed",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle stage of a record.
///
/// ```text
/// Pending -> Restoring -> Ready -> Promoting -> Promoted -> Notified
///    \           \          \          \            \
///     +-----------+----------+----------+------------+--> Failed(reason)
/// Pending | Restoring --> Incomplete (batch cancelled)
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "phase", content = "reason", rename_all = "snake_case")]
pub enum Phase {
    Pending,
    Restoring,
    Ready,
    Promoting,
    Promoted,
    Notified,
    Failed(FailureReason),
    Incomplete,
}

impl Phase {
    /// Terminal phases accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Notified | Phase::Failed(_) | Phase::Incomplete)
    }

    /// Whether `self -> next` is an edge of the state machine.
    pub fn can_transition_to(&self, next: &Phase) -> bool {
        use Phase::*;
        match (self, next) {
            (from, _) if from.is_terminal() => false,
            (_, Failed(_)) => true,
            (Pending, Restoring)
            | (Restoring, Ready)
            | (Ready, Promoting)
            | (Promoting, Promoted)
            | (Promoted, Notified) => true,
            (Pending, Incomplete) | (Restoring, Incomplete) => true,
            _ => false,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Phase::Pending => "pending",
            Phase::Restoring => "restoring",
            Phase::Ready => "ready",
            Phase::Promoting => "promoting",
            Phase::Promoted => "promoted",
            Phase::Notified => "notified",
            Phase::Failed(_) => "failed",
            Phase::Incomplete => "incomplete",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Failed(reason) => write!(f, "failed({})", reason),
            other => f.write_str(other.name()),
        }
    }
}
