//! Error types for mail transports.

use thiserror::Error;

/// Errors that can occur while handing a message to a transport.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MailError {
    /// Could not reach the relay (connect failure, timeout).
    #[error("Mail relay unreachable: {0}")]
    Unreachable(String),

    /// The relay answered with an error status.
    #[error("Mail relay returned HTTP {status}: {message}")]
    Relay { status: u16, message: String },

    /// The relay rejected the recipient or payload.
    #[error("Message rejected: {0}")]
    Rejected(String),
}

impl MailError {
    /// Whether sending the same message again may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Unreachable(_) => true,
            Self::Relay { status, .. } => *status >= 500 || *status == 429,
            Self::Rejected(_) => false,
        }
    }
}
