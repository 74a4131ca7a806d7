//! Mock mail transport for testing.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::mailer::{MailError, MailTransport};

/// A message accepted by the mock transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMail {
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

/// Mock implementation of the MailTransport trait.
///
/// Records delivered messages and fails on demand.
#[derive(Debug, Clone, Default)]
pub struct MockMailer {
    sent: Arc<RwLock<Vec<SentMail>>>,
    attempts: Arc<RwLock<usize>>,
    /// Remaining failures and the error to fail with (`None` count = forever).
    failure: Arc<RwLock<Option<(Option<u32>, MailError)>>>,
    panics: Arc<RwLock<bool>>,
}

impl MockMailer {
    /// Create a new mock mailer that accepts everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` sends with `error`.
    pub async fn fail_next(&self, count: u32, error: MailError) {
        *self.failure.write().await = Some((Some(count), error));
    }

    /// Fail every send with `error`.
    pub async fn fail_always(&self, error: MailError) {
        *self.failure.write().await = Some((None, error));
    }

    /// Panic inside every send, as a broken transport would.
    pub async fn panic_on_send(&self) {
        *self.panics.write().await = true;
    }

    /// Get all delivered messages.
    pub async fn sent(&self) -> Vec<SentMail> {
        self.sent.read().await.clone()
    }

    /// Number of send calls, including failed ones.
    pub async fn attempt_count(&self) -> usize {
        *self.attempts.read().await
    }

    async fn take_failure(&self) -> Option<MailError> {
        let mut failure = self.failure.write().await;
        match failure.as_mut() {
            Some((None, error)) => Some(error.clone()),
            Some((Some(remaining), error)) if *remaining > 0 => {
                *remaining -= 1;
                Some(error.clone())
            }
            _ => None,
        }
    }
}

#[async_trait]
impl MailTransport for MockMailer {
    fn name(&self) -> &str {
        "mock"
    }

    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<(), MailError> {
        *self.attempts.write().await += 1;
        if *self.panics.read().await {
            panic!("mock mail transport panicked sending to {}", recipient);
        }
        if let Some(error) = self.take_failure().await {
            return Err(error);
        }
        self.sent.write().await.push(SentMail {
            recipient: recipient.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}
