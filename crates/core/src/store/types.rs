//! Object store data types.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Storage classes the engine distinguishes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageClass {
    /// Standard access tier (the promotion target).
    Standard,
    /// Archive tier requiring a restore (Glacier Flexible Retrieval).
    Glacier,
    /// Deep archive tier.
    DeepArchive,
    /// Any other class, kept verbatim.
    Other(String),
}

impl StorageClass {
    /// Whether objects in this class need a restore before they can be read.
    pub fn is_archived(&self) -> bool {
        matches!(self, StorageClass::Glacier | StorageClass::DeepArchive)
    }
}

impl fmt::Display for StorageClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageClass::Standard => f.write_str("STANDARD"),
            StorageClass::Glacier => f.write_str("GLACIER"),
            StorageClass::DeepArchive => f.write_str("DEEP_ARCHIVE"),
            StorageClass::Other(name) => f.write_str(name),
        }
    }
}

/// Entry returned by a prefix listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectSummary {
    pub key: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
}

/// Result of a metadata lookup on one object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMetadata {
    pub key: String,
    pub size: u64,
    pub storage_class: StorageClass,
    pub last_modified: DateTime<Utc>,
}

/// Restoration state of an archived object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RestoreStatus {
    /// The store is still restoring the object.
    InProgress,
    /// A readable copy is available.
    Available,
    /// The restore will not complete.
    Failed { reason: String },
}
