pub mod batch;
pub mod config;
pub mod events;
pub mod mailer;
pub mod metrics;
pub mod orchestrator;
pub mod request;
pub mod restore;
pub mod retry;
pub mod store;
pub mod testing;

pub use batch::{load_batch, load_batch_from_reader, BatchError};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, MailBackend,
    SanitizedConfig, StoreBackend,
};
pub use events::{create_event_channel, EventHandle, RestoreEvent, RestoreEventEnvelope};
pub use mailer::{HttpMailer, LogMailer, MailError, MailTransport};
pub use orchestrator::{
    BatchReport, OrchestratorConfig, RecordReport, RestoreOrchestrator, TierWaitBudgets,
};
pub use request::{FailureReason, Phase, RequestSpec, RestoreRecord, RetrievalTier};
pub use retry::{Backoff, RetryPolicy};
#[cfg(feature = "s3")]
pub use store::S3ObjectStore;
pub use store::{ObjectStore, StoreError};
