//! Raw request rows and their validation.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};

use super::record::RestoreRecord;
use super::types::{ObjectIdentity, RequestContext, RetrievalTier};

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern is valid")
});

/// One row of batch input, before validation.
///
/// Every field is optional so that a malformed row can still be carried
/// to the orchestrator and rejected on its own.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RequestSpec {
    #[serde(default)]
    pub bucket: Option<String>,
    #[serde(default)]
    pub key_prefix: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
    /// Last-modified date as `MMDDYYYY`.
    #[serde(default)]
    pub last_modified: Option<String>,
    #[serde(default)]
    pub retrieval_tier: Option<String>,
    #[serde(default)]
    pub server_name: Option<String>,
    #[serde(default)]
    pub instance_name: Option<String>,
    #[serde(default)]
    pub database_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl RequestSpec {
    /// Validate the row and build a `Pending` record for it.
    ///
    /// Returns a message naming the first problem found.
    pub fn validate(&self, row: usize) -> Result<RestoreRecord, String> {
        let bucket = required(&self.bucket, "bucket")?;
        let key_prefix = required(&self.key_prefix, "key_prefix")?;
        let tier: RetrievalTier = required(&self.retrieval_tier, "retrieval_tier")?.parse()?;
        let server_name = required(&self.server_name, "server_name")?;
        let instance_name = required(&self.instance_name, "instance_name")?;
        let database_name = required(&self.database_name, "database_name")?;

        let email = required(&self.email, "email")?;
        if !EMAIL_RE.is_match(&email) {
            return Err(format!("invalid email address '{}'", email));
        }

        let file_name = present(&self.file_name);
        let last_modified = present(&self.last_modified)
            .map(|raw| parse_last_modified(&raw))
            .transpose()?;
        if file_name.is_none() && last_modified.is_none() {
            return Err("either file_name or last_modified is required".to_string());
        }

        Ok(RestoreRecord::new(
            row,
            ObjectIdentity {
                bucket,
                key_prefix: key_prefix.trim_end_matches('/').to_string(),
                file_name,
                last_modified,
            },
            tier,
            RequestContext {
                server_name,
                instance_name,
                database_name,
            },
            email,
        ))
    }
}

fn present(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn required(value: &Option<String>, field: &str) -> Result<String, String> {
    present(value).ok_or_else(|| format!("missing required field '{}'", field))
}

/// Parse an `MMDDYYYY` date. A 7-digit value is a single-digit month
/// without its leading zero.
fn parse_last_modified(raw: &str) -> Result<NaiveDate, String> {
    let padded = if raw.len() == 7 {
        format!("0{}", raw)
    } else {
        raw.to_string()
    };
    NaiveDate::parse_from_str(&padded, "%m%d%Y")
        .map_err(|_| format!("invalid last_modified '{}' (expected MMDDYYYY)", raw))
}
