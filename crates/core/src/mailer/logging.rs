//! Transport that only logs messages.

use async_trait::async_trait;
use tracing::info;

use super::error::MailError;
use super::traits::MailTransport;

/// Writes each message to the log instead of sending it.
#[derive(Debug, Default, Clone)]
pub struct LogMailer;

impl LogMailer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MailTransport for LogMailer {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<(), MailError> {
        info!(recipient, subject, "Mail (not sent):\n{}", body);
        Ok(())
    }
}
