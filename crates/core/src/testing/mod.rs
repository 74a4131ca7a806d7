//! Testing utilities and mock implementations.
//!
//! This module provides mock implementations of the external collaborator
//! traits, so the whole restore engine can be exercised without a real
//! object store or mail relay.
//!
//! # Example
//!
//! ```rust,ignore
//! use glacier_restore_core::testing::{fixtures, MockMailer, MockObjectStore};
//!
//! let store = MockObjectStore::new();
//! store.add_archived_object("backups", "sql/db/db.bak", 1024).await;
//! let mailer = MockMailer::new();
//!
//! let spec = fixtures::request_spec("backups", "sql/db", "db.bak", "expedited");
//! ```

mod mock_mailer;
mod mock_store;

pub use mock_mailer::{MockMailer, SentMail};
pub use mock_store::{CopyFault, MockObjectStore, MockOperation, RecordedStoreCall};

/// Test fixtures and helper functions.
pub mod fixtures {
    use crate::orchestrator::{OrchestratorConfig, TierWaitBudgets};
    use crate::request::RequestSpec;

    /// A valid request spec with the given location and tier.
    pub fn request_spec(bucket: &str, key_prefix: &str, file_name: &str, tier: &str) -> RequestSpec {
        RequestSpec {
            bucket: Some(bucket.to_string()),
            key_prefix: Some(key_prefix.to_string()),
            file_name: Some(file_name.to_string()),
            last_modified: None,
            retrieval_tier: Some(tier.to_string()),
            server_name: Some("sqlprod01".to_string()),
            instance_name: Some("MSSQLSERVER".to_string()),
            database_name: Some("Sales".to_string()),
            email: Some("dba@example.com".to_string()),
        }
    }

    /// A request spec that identifies its object by last-modified date only.
    pub fn dated_request_spec(bucket: &str, key_prefix: &str, mmddyyyy: &str) -> RequestSpec {
        RequestSpec {
            file_name: None,
            last_modified: Some(mmddyyyy.to_string()),
            ..request_spec(bucket, key_prefix, "", "standard")
        }
    }

    /// Orchestrator config with millisecond-scale timings.
    pub fn fast_config() -> OrchestratorConfig {
        OrchestratorConfig {
            worker_pool_size: 4,
            base_poll_interval_ms: 5,
            max_poll_interval_ms: 20,
            tier_wait_budgets: TierWaitBudgets {
                standard_ms: 2_000,
                expedited_ms: 2_000,
                bulk_ms: 2_000,
            },
            max_retry_attempts: 3,
            retry_base_delay_ms: 1,
            retry_max_delay_ms: 5,
            restore_days: 1,
            event_buffer_size: 1000,
        }
    }
}
