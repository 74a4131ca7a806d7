//! Amazon S3 object store backend.

use std::time::Duration;

use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::operation::head_object::HeadObjectOutput;
use aws_sdk_s3::types::{
    CompletedMultipartUpload, CompletedPart, GlacierJobParameters, MetadataDirective,
    RestoreRequest, StorageClass as AwsStorageClass, Tier,
};
use aws_sdk_s3::Client as AwsS3Client;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::error::StoreError;
use super::traits::ObjectStore;
use super::types::{ObjectMetadata, ObjectSummary, RestoreStatus, StorageClass};
use crate::config::StoreConfig;
use crate::request::RetrievalTier;

/// S3 error codes worth retrying.
const TRANSIENT_CODES: &[&str] = &[
    "RequestTimeout",
    "ServiceUnavailable",
    "InternalError",
    "SlowDown",
    "Throttling",
    "RequestTimeTooSkewed",
];

/// Largest source a single CopyObject request accepts (5 GiB).
const MAX_SINGLE_COPY_BYTES: u64 = 5 * 1024 * 1024 * 1024;

/// Part size for multipart copies, raised when needed to stay within the part limit.
const COPY_PART_BYTES: u64 = 512 * 1024 * 1024;

/// Most parts a multipart upload may have.
const MAX_PARTS: u64 = 10_000;

/// How an object of a given size is copied.
#[derive(Debug, PartialEq, Eq)]
enum CopyPlan {
    /// One CopyObject request.
    Single,
    /// UploadPartCopy over these inclusive byte ranges.
    Multipart(Vec<(u64, u64)>),
}

fn plan_copy(size: u64) -> CopyPlan {
    if size <= MAX_SINGLE_COPY_BYTES {
        return CopyPlan::Single;
    }
    let part = COPY_PART_BYTES.max(size.div_ceil(MAX_PARTS));
    let mut ranges = Vec::new();
    let mut start = 0;
    while start < size {
        let end = (start + part).min(size);
        ranges.push((start, end - 1));
        start = end;
    }
    CopyPlan::Multipart(ranges)
}

/// Object store backed by Amazon S3 (or an S3-compatible endpoint).
pub struct S3ObjectStore {
    client: AwsS3Client,
}

impl S3ObjectStore {
    /// Build a client from configuration and the default AWS credential chain.
    pub async fn new(config: &StoreConfig) -> Self {
        let region_provider = match &config.region {
            Some(region) => RegionProviderChain::first_try(Region::new(region.clone())),
            None => RegionProviderChain::default_provider(),
        };
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(region_provider)
            .load()
            .await;

        let mut builder = aws_sdk_s3::config::Builder::from(&aws_config);
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }
        if config.force_path_style {
            builder = builder.force_path_style(true);
        }
        let timeout_config = aws_sdk_s3::config::timeout::TimeoutConfig::builder()
            .operation_timeout(Duration::from_secs(config.timeout_secs))
            .build();
        builder = builder.timeout_config(timeout_config);

        Self {
            client: AwsS3Client::from_conf(builder.build()),
        }
    }

    /// Wrap an existing SDK client.
    pub fn from_client(client: AwsS3Client) -> Self {
        Self { client }
    }

    /// Copy a large object part by part. Nothing is visible at `dest_key`
    /// until the upload completes; a failed copy aborts the upload.
    async fn multipart_copy(
        &self,
        bucket: &str,
        src_key: &str,
        dest_key: &str,
        storage_class: &StorageClass,
        source: &HeadObjectOutput,
        ranges: &[(u64, u64)],
    ) -> Result<(), StoreError> {
        let upload = self
            .client
            .create_multipart_upload()
            .bucket(bucket)
            .key(dest_key)
            .storage_class(to_aws_class(storage_class))
            .set_content_type(source.content_type().map(str::to_string))
            .set_metadata(source.metadata().cloned())
            .send()
            .await
            .map_err(|e| map_sdk_error(e, bucket, dest_key))?;
        let upload_id = upload
            .upload_id()
            .ok_or_else(|| StoreError::Other("no upload ID returned".to_string()))?
            .to_string();

        let result = self
            .copy_parts(bucket, src_key, dest_key, &upload_id, ranges)
            .await;
        if result.is_err() {
            if let Err(e) = self
                .client
                .abort_multipart_upload()
                .bucket(bucket)
                .key(dest_key)
                .upload_id(&upload_id)
                .send()
                .await
            {
                warn!(
                    "Failed to abort multipart copy of {}/{}: {}",
                    bucket,
                    dest_key,
                    DisplayErrorContext(&e)
                );
            }
        }
        result
    }

    async fn copy_parts(
        &self,
        bucket: &str,
        src_key: &str,
        dest_key: &str,
        upload_id: &str,
        ranges: &[(u64, u64)],
    ) -> Result<(), StoreError> {
        let source = format!("{}/{}", bucket, urlencoding::encode(src_key));
        let mut parts = Vec::with_capacity(ranges.len());
        for (idx, (start, end)) in ranges.iter().enumerate() {
            let part_number = idx as i32 + 1;
            let response = self
                .client
                .upload_part_copy()
                .bucket(bucket)
                .key(dest_key)
                .upload_id(upload_id)
                .part_number(part_number)
                .copy_source(&source)
                .copy_source_range(format!("bytes={}-{}", start, end))
                .send()
                .await
                .map_err(|e| map_sdk_error(e, bucket, src_key))?;
            let etag = response
                .copy_part_result()
                .and_then(|r| r.e_tag())
                .ok_or_else(|| {
                    StoreError::Other(format!("no ETag returned for part {}", part_number))
                })?;
            parts.push(
                CompletedPart::builder()
                    .part_number(part_number)
                    .e_tag(etag)
                    .build(),
            );
        }

        self.client
            .complete_multipart_upload()
            .bucket(bucket)
            .key(dest_key)
            .upload_id(upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(parts))
                    .build(),
            )
            .send()
            .await
            .map_err(|e| map_sdk_error(e, bucket, dest_key))?;
        debug!(
            "S3 multipart copy of {}/{} finished in {} part(s)",
            bucket,
            src_key,
            ranges.len()
        );
        Ok(())
    }
}

fn to_aws_tier(tier: RetrievalTier) -> Tier {
    match tier {
        RetrievalTier::Standard => Tier::Standard,
        RetrievalTier::Expedited => Tier::Expedited,
        RetrievalTier::Bulk => Tier::Bulk,
    }
}

fn from_aws_class(class: Option<&AwsStorageClass>) -> StorageClass {
    match class {
        // S3 omits the header for STANDARD objects.
        None | Some(AwsStorageClass::Standard) => StorageClass::Standard,
        Some(AwsStorageClass::Glacier) => StorageClass::Glacier,
        Some(AwsStorageClass::DeepArchive) => StorageClass::DeepArchive,
        Some(other) => StorageClass::Other(other.as_str().to_string()),
    }
}

fn to_aws_class(class: &StorageClass) -> AwsStorageClass {
    match class {
        StorageClass::Standard => AwsStorageClass::Standard,
        StorageClass::Glacier => AwsStorageClass::Glacier,
        StorageClass::DeepArchive => AwsStorageClass::DeepArchive,
        StorageClass::Other(name) => AwsStorageClass::from(name.as_str()),
    }
}

fn to_chrono(dt: Option<&aws_sdk_s3::primitives::DateTime>) -> DateTime<Utc> {
    dt.and_then(|dt| DateTime::from_timestamp(dt.secs(), dt.subsec_nanos()))
        .unwrap_or_default()
}

/// Interpret the `x-amz-restore` header.
fn parse_restore_header(header: Option<&str>, class: &StorageClass) -> RestoreStatus {
    match header {
        Some(h) if h.contains(r#"ongoing-request="true""#) => RestoreStatus::InProgress,
        Some(h) if h.contains(r#"ongoing-request="false""#) => RestoreStatus::Available,
        Some(h) => RestoreStatus::Failed {
            reason: format!("unrecognised restore header: {}", h),
        },
        None if class.is_archived() => RestoreStatus::Failed {
            reason: "no restore in progress and no restored copy present".to_string(),
        },
        None => RestoreStatus::Available,
    }
}

/// Classify an SDK error for `bucket/key`.
fn map_sdk_error<E>(error: SdkError<E>, bucket: &str, key: &str) -> StoreError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    match &error {
        SdkError::ServiceError(ctx) => {
            let code = ctx.err().code().unwrap_or_default();
            let status = ctx.raw().status().as_u16();
            match code {
                "RestoreAlreadyInProgress" => StoreError::AlreadyRestoring {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                },
                "ObjectAlreadyInActiveTierError" | "InvalidObjectState" => {
                    StoreError::NotArchived {
                        bucket: bucket.to_string(),
                        key: key.to_string(),
                    }
                }
                "NoSuchBucket" => StoreError::NoSuchBucket {
                    bucket: bucket.to_string(),
                },
                "NoSuchKey" | "NotFound" => StoreError::NotFound {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                },
                "AccessDenied" | "Forbidden" | "AllAccessDisabled" => {
                    StoreError::AccessDenied(format!("{}/{}", bucket, key))
                }
                code if TRANSIENT_CODES.contains(&code) => {
                    StoreError::Transient(DisplayErrorContext(&error).to_string())
                }
                _ if status == 404 => StoreError::NotFound {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                },
                _ if status == 403 => StoreError::AccessDenied(format!("{}/{}", bucket, key)),
                _ if status >= 500 || status == 429 => {
                    StoreError::Transient(DisplayErrorContext(&error).to_string())
                }
                _ => StoreError::Other(DisplayErrorContext(&error).to_string()),
            }
        }
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            StoreError::Transient(DisplayErrorContext(&error).to_string())
        }
        _ => StoreError::Other(DisplayErrorContext(&error).to_string()),
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    fn name(&self) -> &str {
        "s3"
    }

    async fn begin_restore(
        &self,
        bucket: &str,
        key: &str,
        tier: RetrievalTier,
        days: u32,
    ) -> Result<(), StoreError> {
        let job = GlacierJobParameters::builder()
            .tier(to_aws_tier(tier))
            .build()
            .map_err(|e| StoreError::Other(e.to_string()))?;
        let request = RestoreRequest::builder()
            .days(days as i32)
            .glacier_job_parameters(job)
            .build();

        self.client
            .restore_object()
            .bucket(bucket)
            .key(key)
            .restore_request(request)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, bucket, key))?;

        debug!("S3 restore requested for {}/{} ({})", bucket, key, tier);
        Ok(())
    }

    async fn check_restore_status(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<RestoreStatus, StoreError> {
        let head = self
            .client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, bucket, key))?;

        let class = from_aws_class(head.storage_class());
        Ok(parse_restore_header(head.restore(), &class))
    }

    async fn copy_object(
        &self,
        bucket: &str,
        src_key: &str,
        dest_key: &str,
        storage_class: StorageClass,
    ) -> Result<(), StoreError> {
        let head = self
            .client
            .head_object()
            .bucket(bucket)
            .key(src_key)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, bucket, src_key))?;
        let size = head.content_length().unwrap_or(0).max(0) as u64;
        if let CopyPlan::Multipart(ranges) = plan_copy(size) {
            return self
                .multipart_copy(bucket, src_key, dest_key, &storage_class, &head, &ranges)
                .await;
        }

        let source = format!("{}/{}", bucket, urlencoding::encode(src_key));
        self.client
            .copy_object()
            .bucket(bucket)
            .copy_source(source)
            .key(dest_key)
            .storage_class(to_aws_class(&storage_class))
            .metadata_directive(MetadataDirective::Copy)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, bucket, src_key))?;
        Ok(())
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> Result<Vec<ObjectSummary>, StoreError> {
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .prefix(prefix)
            .into_paginator()
            .send();

        let mut objects = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| map_sdk_error(e, bucket, prefix))?;
            for object in page.contents() {
                let Some(key) = object.key() else { continue };
                objects.push(ObjectSummary {
                    key: key.to_string(),
                    size: object.size().unwrap_or(0).max(0) as u64,
                    last_modified: to_chrono(object.last_modified()),
                });
            }
        }
        Ok(objects)
    }

    async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectMetadata, StoreError> {
        let head = self
            .client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, bucket, key))?;

        Ok(ObjectMetadata {
            key: key.to_string(),
            size: head.content_length().unwrap_or(0).max(0) as u64,
            storage_class: from_aws_class(head.storage_class()),
            last_modified: to_chrono(head.last_modified()),
        })
    }
}
