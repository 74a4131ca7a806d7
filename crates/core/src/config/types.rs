use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::orchestrator::OrchestratorConfig;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub restore: OrchestratorConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub mail: MailConfig,
    #[serde(default)]
    pub batch: BatchConfig,
}

/// Available object store backends
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    #[default]
    S3,
}

/// Object store configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    /// Region override (default: AWS provider chain)
    #[serde(default)]
    pub region: Option<String>,
    /// Custom endpoint for S3-compatible stores
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Path-style addressing (MinIO, LocalStack)
    #[serde(default)]
    pub force_path_style: bool,
    /// Per-operation timeout in seconds (default: 30)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            region: None,
            endpoint: None,
            force_path_style: false,
            timeout_secs: default_timeout(),
        }
    }
}

fn default_timeout() -> u64 {
    30
}

/// Available mail transports
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MailBackend {
    Http,
    #[default]
    Log,
}

/// Completion notification configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MailConfig {
    #[serde(default)]
    pub backend: MailBackend,
    /// Sender address
    #[serde(default = "default_from")]
    pub from: String,
    /// Subject line of completion messages
    #[serde(default = "default_subject")]
    pub subject: String,
    /// HTTP relay settings (required when backend = "http")
    #[serde(default)]
    pub http: Option<HttpMailConfig>,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            backend: MailBackend::default(),
            from: default_from(),
            subject: default_subject(),
            http: None,
        }
    }
}

fn default_from() -> String {
    "glacier-restore@localhost".to_string()
}

fn default_subject() -> String {
    "S3 Glacier Restore Complete".to_string()
}

/// HTTP mail relay configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpMailConfig {
    /// Relay endpoint URL
    pub url: String,
    /// Bearer token for the relay
    #[serde(default)]
    pub api_key: Option<String>,
    /// Request timeout in seconds (default: 30)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

/// Batch input configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BatchConfig {
    #[serde(default = "default_batch_path")]
    pub path: PathBuf,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            path: default_batch_path(),
        }
    }
}

fn default_batch_path() -> PathBuf {
    PathBuf::from("restore_list.csv")
}

/// Sanitized config for logging (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub restore: OrchestratorConfig,
    pub store: StoreConfig,
    pub mail: SanitizedMailConfig,
    pub batch: BatchConfig,
}

/// Sanitized mail config (relay API key hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedMailConfig {
    pub backend: MailBackend,
    pub from: String,
    pub subject: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relay_url: Option<String>,
    pub api_key_configured: bool,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            restore: config.restore.clone(),
            store: config.store.clone(),
            mail: SanitizedMailConfig {
                backend: config.mail.backend,
                from: config.mail.from.clone(),
                subject: config.mail.subject.clone(),
                relay_url: config.mail.http.as_ref().map(|h| h.url.clone()),
                api_key_configured: config
                    .mail
                    .http
                    .as_ref()
                    .and_then(|h| h.api_key.as_ref())
                    .is_some_and(|k| !k.is_empty()),
            },
            batch: config.batch.clone(),
        }
    }
}
