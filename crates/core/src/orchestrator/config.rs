//! Orchestrator configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::request::RetrievalTier;
use crate::retry::RetryPolicy;

/// Configuration for the restore orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Number of concurrent workers.
    /// This is the admission-control knob for store-side rate limits.
    #[serde(default = "default_pool_size")]
    pub worker_pool_size: usize,

    /// First wait between restore-status polls (milliseconds).
    /// Scaled by the retrieval tier and doubled after each pending poll.
    #[serde(default = "default_base_poll")]
    pub base_poll_interval_ms: u64,

    /// Upper bound on the wait between polls (milliseconds).
    #[serde(default = "default_max_poll")]
    pub max_poll_interval_ms: u64,

    /// How long each tier may take to restore before the record times out.
    #[serde(default)]
    pub tier_wait_budgets: TierWaitBudgets,

    /// Attempts per operation for retryable errors.
    #[serde(default = "default_max_retries")]
    pub max_retry_attempts: u32,

    /// First backoff delay between retries (milliseconds).
    #[serde(default = "default_retry_base")]
    pub retry_base_delay_ms: u64,

    /// Upper bound on the backoff delay between retries (milliseconds).
    #[serde(default = "default_retry_max")]
    pub retry_max_delay_ms: u64,

    /// Days the temporary restored copy stays readable.
    /// It only has to outlive the promotion copy.
    #[serde(default = "default_restore_days")]
    pub restore_days: u32,

    /// Capacity of the progress event channel.
    #[serde(default = "default_event_buffer")]
    pub event_buffer_size: usize,
}

/// Maximum wait per retrieval tier (milliseconds).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierWaitBudgets {
    #[serde(default = "default_standard_budget")]
    pub standard_ms: u64,
    #[serde(default = "default_expedited_budget")]
    pub expedited_ms: u64,
    #[serde(default = "default_bulk_budget")]
    pub bulk_ms: u64,
}

const HOUR_MS: u64 = 60 * 60 * 1000;

fn default_pool_size() -> usize {
    4
}

fn default_base_poll() -> u64 {
    30_000 // 30 seconds
}

fn default_max_poll() -> u64 {
    900_000 // 15 minutes
}

fn default_max_retries() -> u32 {
    5
}

fn default_retry_base() -> u64 {
    1_000
}

fn default_retry_max() -> u64 {
    60_000
}

fn default_restore_days() -> u32 {
    1
}

fn default_event_buffer() -> usize {
    1000
}

fn default_standard_budget() -> u64 {
    12 * HOUR_MS
}

fn default_expedited_budget() -> u64 {
    HOUR_MS
}

fn default_bulk_budget() -> u64 {
    48 * HOUR_MS
}

impl Default for TierWaitBudgets {
    fn default() -> Self {
        Self {
            standard_ms: default_standard_budget(),
            expedited_ms: default_expedited_budget(),
            bulk_ms: default_bulk_budget(),
        }
    }
}

impl TierWaitBudgets {
    /// Budget for one tier.
    pub fn for_tier(&self, tier: RetrievalTier) -> Duration {
        let ms = match tier {
            RetrievalTier::Standard => self.standard_ms,
            RetrievalTier::Expedited => self.expedited_ms,
            RetrievalTier::Bulk => self.bulk_ms,
        };
        Duration::from_millis(ms)
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            worker_pool_size: default_pool_size(),
            base_poll_interval_ms: default_base_poll(),
            max_poll_interval_ms: default_max_poll(),
            tier_wait_budgets: TierWaitBudgets::default(),
            max_retry_attempts: default_max_retries(),
            retry_base_delay_ms: default_retry_base(),
            retry_max_delay_ms: default_retry_max(),
            restore_days: default_restore_days(),
            event_buffer_size: default_event_buffer(),
        }
    }
}

impl OrchestratorConfig {
    /// Retry policy shared by every phase handler.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_retry_attempts,
            Duration::from_millis(self.retry_base_delay_ms),
            Duration::from_millis(self.retry_max_delay_ms),
        )
    }

    pub fn base_poll_interval(&self) -> Duration {
        Duration::from_millis(self.base_poll_interval_ms)
    }

    pub fn max_poll_interval(&self) -> Duration {
        Duration::from_millis(self.max_poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.worker_pool_size, 4);
        assert_eq!(config.base_poll_interval_ms, 30_000);
        assert_eq!(config.max_poll_interval_ms, 900_000);
        assert_eq!(config.max_retry_attempts, 5);
        assert_eq!(config.restore_days, 1);
        assert_eq!(
            config.tier_wait_budgets.for_tier(RetrievalTier::Expedited),
            Duration::from_secs(3600)
        );
    }

    #[test]
    fn test_bulk_budget_exceeds_expedited() {
        let budgets = TierWaitBudgets::default();
        assert!(
            budgets.for_tier(RetrievalTier::Bulk) > budgets.for_tier(RetrievalTier::Standard)
        );
        assert!(
            budgets.for_tier(RetrievalTier::Standard)
                > budgets.for_tier(RetrievalTier::Expedited)
        );
    }

    #[test]
    fn test_deserialize_minimal() {
        let toml = r#"
            worker_pool_size = 2
        "#;
        let config: OrchestratorConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.worker_pool_size, 2);
        assert_eq!(config.base_poll_interval_ms, 30_000);
        assert_eq!(config.tier_wait_budgets.bulk_ms, 48 * HOUR_MS);
    }

    #[test]
    fn test_deserialize_full() {
        let toml = r#"
            worker_pool_size = 8
            base_poll_interval_ms = 1000
            max_poll_interval_ms = 60000
            max_retry_attempts = 3
            retry_base_delay_ms = 100
            retry_max_delay_ms = 2000
            restore_days = 2
            event_buffer_size = 64

            [tier_wait_budgets]
            standard_ms = 100
            expedited_ms = 10
            bulk_ms = 1000
        "#;
        let config: OrchestratorConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.worker_pool_size, 8);
        assert_eq!(config.max_poll_interval(), Duration::from_secs(60));
        assert_eq!(config.tier_wait_budgets.expedited_ms, 10);
        assert_eq!(config.restore_days, 2);

        let policy = config.retry_policy();
        assert_eq!(policy.max_attempts(), 3);
    }
}
