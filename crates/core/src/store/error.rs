//! Error types for object store operations.

use thiserror::Error;

use crate::request::FailureReason;

/// Errors returned by an [`ObjectStore`](super::ObjectStore).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Bucket does not exist (or is not visible to the caller).
    #[error("No such bucket: {bucket}")]
    NoSuchBucket { bucket: String },

    /// Object not found.
    #[error("Object not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },

    /// Access denied by the store.
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// A restore for this object is already in progress.
    #[error("Restore already in progress: {bucket}/{key}")]
    AlreadyRestoring { bucket: String, key: String },

    /// The object is not in an archive storage class.
    #[error("Object is not archived: {bucket}/{key}")]
    NotArchived { bucket: String, key: String },

    /// Throttling, timeouts, 5xx, dispatch failures.
    #[error("Transient store error: {0}")]
    Transient(String),

    /// Anything else the store reported.
    #[error("Store error: {0}")]
    Other(String),
}

impl StoreError {
    /// Whether retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Terminal failure reason for a record that hit this error.
    pub fn failure_reason(&self) -> FailureReason {
        match self {
            Self::NoSuchBucket { .. } | Self::AccessDenied(_) => FailureReason::AccessDenied,
            Self::NotFound { .. } => FailureReason::ObjectNotFound,
            Self::Transient(_) => FailureReason::TransientStoreError,
            Self::AlreadyRestoring { .. } | Self::NotArchived { .. } | Self::Other(_) => {
                FailureReason::RestoreFailed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transient_is_retryable() {
        assert!(StoreError::Transient("SlowDown".to_string()).is_retryable());
        assert!(!StoreError::AccessDenied("nope".to_string()).is_retryable());
        assert!(!StoreError::NoSuchBucket {
            bucket: "b".to_string()
        }
        .is_retryable());
    }

    #[test]
    fn test_missing_bucket_maps_to_access_denied() {
        let err = StoreError::NoSuchBucket {
            bucket: "ghost".to_string(),
        };
        assert_eq!(err.failure_reason(), FailureReason::AccessDenied);
        assert_eq!(err.to_string(), "No such bucket: ghost");
    }

    #[test]
    fn test_not_found_maps_to_object_not_found() {
        let err = StoreError::NotFound {
            bucket: "b".to_string(),
            key: "k".to_string(),
        };
        assert_eq!(err.failure_reason(), FailureReason::ObjectNotFound);
    }
}
