//! Mock object store for testing.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::request::RetrievalTier;
use crate::store::{
    ObjectMetadata, ObjectStore, ObjectSummary, RestoreStatus, StorageClass, StoreError,
};

/// Store operations, for failure injection and call assertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOperation {
    BeginRestore,
    CheckStatus,
    Copy,
    List,
    Head,
}

/// A recorded store call for test assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedStoreCall {
    pub operation: MockOperation,
    pub bucket: String,
    pub key: String,
}

/// How the next copy of a key misbehaves.
#[derive(Debug, Clone)]
pub enum CopyFault {
    /// Fail with this error; the destination is untouched.
    Error(StoreError),
    /// Report success but leave the destination as it was.
    Unverified,
}

#[derive(Debug, Clone)]
enum RestoreState {
    None,
    InProgress { polls_remaining: u32 },
    Available,
}

#[derive(Debug, Clone)]
struct MockObject {
    size: u64,
    storage_class: StorageClass,
    last_modified: DateTime<Utc>,
    restore: RestoreState,
}

#[derive(Debug, Default)]
struct MockStoreState {
    buckets: HashMap<String, BTreeMap<String, MockObject>>,
    denied_buckets: HashSet<String>,
    default_polls_until_ready: u32,
    polls_until_ready: HashMap<String, u32>,
    never_ready: HashSet<String>,
    restore_failures: HashMap<String, String>,
    transient_failures: HashMap<MockOperation, u32>,
    copy_faults: HashMap<String, Vec<CopyFault>>,
    calls: Vec<RecordedStoreCall>,
}

/// Mock implementation of the ObjectStore trait.
///
/// Provides controllable behavior for testing:
/// - Seed buckets with archived or standard objects
/// - Control how many polls a restore takes, or make it never finish
/// - Inject transient errors per operation and faults per copy
/// - Record every call for assertions
///
/// # Example
///
/// ```rust,ignore
/// use glacier_restore_core::testing::MockObjectStore;
///
/// let store = MockObjectStore::new();
/// store.add_archived_object("backups", "sql/db.bak", 1024).await;
/// store.set_polls_until_ready("sql/db.bak", 3).await;
/// ```
#[derive(Debug, Clone)]
pub struct MockObjectStore {
    state: Arc<RwLock<MockStoreState>>,
}

impl MockObjectStore {
    /// Create an empty mock store. Restores complete on the second poll.
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(MockStoreState {
                default_polls_until_ready: 1,
                ..Default::default()
            })),
        }
    }

    /// Create an empty bucket.
    pub async fn add_bucket(&self, bucket: &str) {
        self.state
            .write()
            .await
            .buckets
            .entry(bucket.to_string())
            .or_default();
    }

    /// Add an object in the archive tier.
    pub async fn add_archived_object(&self, bucket: &str, key: &str, size: u64) {
        self.add_object(bucket, key, size, StorageClass::Glacier, Utc::now())
            .await;
    }

    /// Add an object with explicit class and timestamp.
    pub async fn add_object(
        &self,
        bucket: &str,
        key: &str,
        size: u64,
        storage_class: StorageClass,
        last_modified: DateTime<Utc>,
    ) {
        self.state
            .write()
            .await
            .buckets
            .entry(bucket.to_string())
            .or_default()
            .insert(
                key.to_string(),
                MockObject {
                    size,
                    storage_class,
                    last_modified,
                    restore: RestoreState::None,
                },
            );
    }

    /// Make every call against `bucket` fail with access denied.
    pub async fn deny_bucket(&self, bucket: &str) {
        self.state
            .write()
            .await
            .denied_buckets
            .insert(bucket.to_string());
    }

    /// Number of in-progress polls before restores of `key` complete.
    pub async fn set_polls_until_ready(&self, key: &str, polls: u32) {
        self.state
            .write()
            .await
            .polls_until_ready
            .insert(key.to_string(), polls);
    }

    /// Default number of in-progress polls for keys without an override.
    pub async fn set_default_polls_until_ready(&self, polls: u32) {
        self.state.write().await.default_polls_until_ready = polls;
    }

    /// Restores of `key` stay in progress forever.
    pub async fn set_never_ready(&self, key: &str) {
        self.state.write().await.never_ready.insert(key.to_string());
    }

    /// Status checks of `key` report a failed restore.
    pub async fn set_restore_failure(&self, key: &str, reason: &str) {
        self.state
            .write()
            .await
            .restore_failures
            .insert(key.to_string(), reason.to_string());
    }

    /// The next `count` calls of `operation` fail with a transient error.
    pub async fn fail_next(&self, operation: MockOperation, count: u32) {
        self.state
            .write()
            .await
            .transient_failures
            .insert(operation, count);
    }

    /// Queue a fault for the next copy of `key`.
    pub async fn push_copy_fault(&self, key: &str, fault: CopyFault) {
        self.state
            .write()
            .await
            .copy_faults
            .entry(key.to_string())
            .or_default()
            .push(fault);
    }

    /// Get all recorded calls.
    pub async fn recorded_calls(&self) -> Vec<RecordedStoreCall> {
        self.state.read().await.calls.clone()
    }

    /// Number of calls of `operation` against `key`.
    pub async fn call_count(&self, operation: MockOperation, key: &str) -> usize {
        self.state
            .read()
            .await
            .calls
            .iter()
            .filter(|c| c.operation == operation && c.key == key)
            .count()
    }

    /// Current storage class and size of an object, if present.
    pub async fn object(&self, bucket: &str, key: &str) -> Option<(StorageClass, u64)> {
        self.state
            .read()
            .await
            .buckets
            .get(bucket)
            .and_then(|objects| objects.get(key))
            .map(|o| (o.storage_class.clone(), o.size))
    }
}

impl Default for MockObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MockStoreState {
    /// Record the call, then apply bucket checks and transient injection.
    fn enter(&mut self, operation: MockOperation, bucket: &str, key: &str) -> Result<(), StoreError> {
        self.calls.push(RecordedStoreCall {
            operation,
            bucket: bucket.to_string(),
            key: key.to_string(),
        });

        if let Some(remaining) = self.transient_failures.get_mut(&operation) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(StoreError::Transient(format!(
                    "SlowDown: injected failure for {:?}",
                    operation
                )));
            }
        }
        if self.denied_buckets.contains(bucket) {
            return Err(StoreError::AccessDenied(format!("{}/{}", bucket, key)));
        }
        if !self.buckets.contains_key(bucket) {
            return Err(StoreError::NoSuchBucket {
                bucket: bucket.to_string(),
            });
        }
        Ok(())
    }

    fn object_mut(&mut self, bucket: &str, key: &str) -> Result<&mut MockObject, StoreError> {
        self.buckets
            .get_mut(bucket)
            .and_then(|objects| objects.get_mut(key))
            .ok_or_else(|| StoreError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })
    }
}

#[async_trait]
impl ObjectStore for MockObjectStore {
    fn name(&self) -> &str {
        "mock"
    }

    async fn begin_restore(
        &self,
        bucket: &str,
        key: &str,
        _tier: RetrievalTier,
        _days: u32,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state.enter(MockOperation::BeginRestore, bucket, key)?;

        let polls = state
            .polls_until_ready
            .get(key)
            .copied()
            .unwrap_or(state.default_polls_until_ready);
        let object = state.object_mut(bucket, key)?;

        if !object.storage_class.is_archived() {
            return Err(StoreError::NotArchived {
                bucket: bucket.to_string(),
                key: key.to_string(),
            });
        }
        match object.restore {
            RestoreState::InProgress { .. } => Err(StoreError::AlreadyRestoring {
                bucket: bucket.to_string(),
                key: key.to_string(),
            }),
            RestoreState::Available => Ok(()),
            RestoreState::None => {
                object.restore = RestoreState::InProgress {
                    polls_remaining: polls,
                };
                Ok(())
            }
        }
    }

    async fn check_restore_status(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<RestoreStatus, StoreError> {
        let mut state = self.state.write().await;
        state.enter(MockOperation::CheckStatus, bucket, key)?;

        if let Some(reason) = state.restore_failures.get(key).cloned() {
            return Ok(RestoreStatus::Failed { reason });
        }
        let never_ready = state.never_ready.contains(key);
        let object = state.object_mut(bucket, key)?;

        if !object.storage_class.is_archived() {
            return Ok(RestoreStatus::Available);
        }
        let status = match &mut object.restore {
            RestoreState::None => {
                return Ok(RestoreStatus::Failed {
                    reason: "no restore requested".to_string(),
                })
            }
            RestoreState::Available => RestoreStatus::Available,
            RestoreState::InProgress { .. } if never_ready => RestoreStatus::InProgress,
            RestoreState::InProgress { polls_remaining } if *polls_remaining > 0 => {
                *polls_remaining -= 1;
                RestoreStatus::InProgress
            }
            RestoreState::InProgress { .. } => RestoreStatus::Available,
        };
        if status == RestoreStatus::Available {
            object.restore = RestoreState::Available;
        }
        Ok(status)
    }

    async fn copy_object(
        &self,
        bucket: &str,
        src_key: &str,
        dest_key: &str,
        storage_class: StorageClass,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state.enter(MockOperation::Copy, bucket, src_key)?;

        let fault = state
            .copy_faults
            .get_mut(src_key)
            .filter(|faults| !faults.is_empty())
            .map(|faults| faults.remove(0));

        let source = state.object_mut(bucket, src_key)?.clone();
        if source.storage_class.is_archived() && !matches!(source.restore, RestoreState::Available)
        {
            return Err(StoreError::Other(format!(
                "InvalidObjectState: {}/{} is not restored",
                bucket, src_key
            )));
        }

        match fault {
            Some(CopyFault::Error(e)) => return Err(e),
            Some(CopyFault::Unverified) => return Ok(()),
            None => {}
        }

        // Whole-object replacement under the write lock.
        let copy = MockObject {
            size: source.size,
            storage_class,
            last_modified: Utc::now(),
            restore: RestoreState::None,
        };
        if let Some(objects) = state.buckets.get_mut(bucket) {
            objects.insert(dest_key.to_string(), copy);
        }
        Ok(())
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> Result<Vec<ObjectSummary>, StoreError> {
        let mut state = self.state.write().await;
        state.enter(MockOperation::List, bucket, prefix)?;

        Ok(state
            .buckets
            .get(bucket)
            .map(|objects| {
                objects
                    .iter()
                    .filter(|(key, _)| key.starts_with(prefix))
                    .map(|(key, o)| ObjectSummary {
                        key: key.clone(),
                        size: o.size,
                        last_modified: o.last_modified,
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectMetadata, StoreError> {
        let mut state = self.state.write().await;
        state.enter(MockOperation::Head, bucket, key)?;
        let object = state.object_mut(bucket, key)?;

        Ok(ObjectMetadata {
            key: key.to_string(),
            size: object.size,
            storage_class: object.storage_class.clone(),
            last_modified: object.last_modified,
        })
    }
}
