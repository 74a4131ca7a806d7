//! Trait definitions for mail transports.

use async_trait::async_trait;

use super::error::MailError;

/// Something that can deliver a plain-text message to one recipient.
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Returns the name of this transport.
    fn name(&self) -> &str;

    /// Send one message.
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<(), MailError>;
}
