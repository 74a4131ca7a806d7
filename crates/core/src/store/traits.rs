//! Trait definitions for the object store.

use async_trait::async_trait;

use super::error::StoreError;
use super::types::{ObjectMetadata, ObjectSummary, RestoreStatus, StorageClass};
use crate::request::RetrievalTier;

/// A tiered object store that can restore archived objects.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Returns the name of this store implementation.
    fn name(&self) -> &str;

    /// Ask the store to begin restoring an archived object.
    ///
    /// `days` is how long the temporary restored copy stays readable.
    async fn begin_restore(
        &self,
        bucket: &str,
        key: &str,
        tier: RetrievalTier,
        days: u32,
    ) -> Result<(), StoreError>;

    /// Query the restoration state of an object.
    async fn check_restore_status(&self, bucket: &str, key: &str)
        -> Result<RestoreStatus, StoreError>;

    /// Server-side copy of `src_key` onto `dest_key` in `storage_class`.
    ///
    /// Implementations must replace the destination atomically: readers see
    /// either the previous object or the complete new one.
    async fn copy_object(
        &self,
        bucket: &str,
        src_key: &str,
        dest_key: &str,
        storage_class: StorageClass,
    ) -> Result<(), StoreError>;

    /// List objects under a key prefix.
    async fn list_objects(&self, bucket: &str, prefix: &str)
        -> Result<Vec<ObjectSummary>, StoreError>;

    /// Fetch metadata for one object.
    async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectMetadata, StoreError>;
}
