use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use super::RestoreEvent;

/// Envelope wrapping a progress event with metadata
#[derive(Debug, Clone)]
pub struct RestoreEventEnvelope {
    pub timestamp: DateTime<Utc>,
    pub event: RestoreEvent,
}

/// Create a bounded event channel.
pub fn create_event_channel(
    buffer_size: usize,
) -> (EventHandle, mpsc::Receiver<RestoreEventEnvelope>) {
    let (tx, rx) = mpsc::channel(buffer_size.max(1));
    (EventHandle::new(tx), rx)
}

/// Handle for emitting progress events
///
/// This is cheaply cloneable and can be shared across workers.
/// Reporting progress never fails or stalls the restore itself.
#[derive(Clone)]
pub struct EventHandle {
    tx: mpsc::Sender<RestoreEventEnvelope>,
}

impl EventHandle {
    /// Create a new event handle from a channel sender
    pub fn new(tx: mpsc::Sender<RestoreEventEnvelope>) -> Self {
        Self { tx }
    }

    /// Emit an event without waiting
    ///
    /// Returns true if the event was queued, false if it was dropped.
    pub fn try_emit(&self, event: RestoreEvent) -> bool {
        let envelope = RestoreEventEnvelope {
            timestamp: Utc::now(),
            event,
        };
        match self.tx.try_send(envelope) {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!("Dropped progress event: {}", e);
                false
            }
        }
    }
}
