//! Object store collaborator.
//!
//! The restore engine only talks to the [`ObjectStore`] capability trait.
//! Backends:
//!
//! - `S3ObjectStore`: Amazon S3 via `aws-sdk-s3` (feature `s3`)
//!
//! Test doubles live in [`crate::testing`].

mod error;
#[cfg(feature = "s3")]
mod s3;
mod traits;
mod types;

pub use error::StoreError;
#[cfg(feature = "s3")]
pub use s3::S3ObjectStore;
pub use traits::ObjectStore;
pub use types::{ObjectMetadata, ObjectSummary, RestoreStatus, StorageClass};
