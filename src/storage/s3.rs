use std::collections::HashMap;
use std::time::Duration;

use aws_sdk_s3::config::timeout::TimeoutConfig;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::primitives::{ByteStream, DateTime as S3DateTime};
use aws_sdk_s3::types::ObjectCannedAcl;
use aws_sdk_s3::Client;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::core::config::StorageConfig;
use crate::core::error::StorageError;
use crate::core::redact::redact_access_key;
use crate::observability::metrics as obs;

use super::{
    GetObjectOutput, ObjectInfo, ObjectMeta, ObjectStore, PutOptions, Visibility, WriteOutcome,
    WritePrecondition,
};

// ---------------------------------------------------------------------------
// Retry constants
// ---------------------------------------------------------------------------

const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 100;

/// HEAD requests in flight while filling in listing metadata.
const HEAD_CONCURRENCY: usize = 16;

// ---------------------------------------------------------------------------
// S3ObjectStore
// ---------------------------------------------------------------------------

/// Production object store wrapping `aws-sdk-s3`.
///
/// Works against AWS S3 and S3-compatible stores (MinIO, R2, Spaces) via a
/// configurable endpoint and path-style addressing.
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
}

impl S3ObjectStore {
    pub async fn new(config: &StorageConfig) -> Result<Self, StorageError> {
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "subvault-config",
        );

        let timeouts = TimeoutConfig::builder()
            .operation_timeout(Duration::from_secs(config.request_timeout_secs))
            .build();

        let mut s3_config_builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials)
            .timeout_config(timeouts)
            .force_path_style(config.path_style);

        if !config.endpoint.is_empty() {
            s3_config_builder = s3_config_builder.endpoint_url(&config.endpoint);
        }

        let client = Client::from_conf(s3_config_builder.build());

        info!(
            bucket = %config.bucket,
            endpoint = %config.endpoint,
            access_key_id = %redact_access_key(&config.access_key_id),
            "S3 object store configured"
        );

        Ok(Self {
            client,
            bucket: config.bucket.clone(),
        })
    }

    /// Execute a PUT with retry logic. 403 and 412 are never retried.
    async fn put_with_retry(
        &self,
        key: &str,
        body: Bytes,
        options: &PutOptions,
        precondition: WritePrecondition,
    ) -> Result<WriteOutcome, StorageError> {
        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                let backoff = Duration::from_millis(INITIAL_BACKOFF_MS * (1 << (attempt - 1)));
                debug!(
                    key,
                    attempt,
                    backoff_ms = backoff.as_millis(),
                    "retrying S3 PUT"
                );
                obs::inc_storage_retries("put");
                tokio::time::sleep(backoff).await;
            }

            let mut req = self
                .client
                .put_object()
                .bucket(&self.bucket)
                .key(key)
                .body(ByteStream::from(body.clone()))
                .content_type(&options.content_type)
                .set_metadata(Some(options.metadata.clone()));

            if options.visibility == Visibility::Public {
                req = req.acl(ObjectCannedAcl::PublicRead);
            }
            if precondition == WritePrecondition::DoesNotExist {
                req = req.if_none_match("*");
            }

            match req.send().await {
                Ok(_) => return Ok(WriteOutcome::Written),
                Err(e) => {
                    let status = e.raw_response().map(|r| r.status().as_u16());
                    let err_str = e.to_string();
                    if status == Some(412) || err_str.contains("PreconditionFailed") {
                        return Ok(WriteOutcome::PreconditionFailed);
                    }
                    if status == Some(403) || err_str.contains("Forbidden") {
                        return Err(StorageError::PutFailed {
                            path: key.to_string(),
                            reason: format!("forbidden (credentials issue): {}", err_str),
                        });
                    }
                    warn!(key, attempt, error = %err_str, "S3 PUT failed");
                }
            }
        }

        Err(StorageError::RetriesExhausted {
            path: key.to_string(),
        })
    }

    /// Execute a GET with retry logic. 403 and 404 are never retried.
    async fn get_with_retry(&self, key: &str) -> Result<GetObjectOutput, StorageError> {
        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                let backoff = Duration::from_millis(INITIAL_BACKOFF_MS * (1 << (attempt - 1)));
                obs::inc_storage_retries("get");
                tokio::time::sleep(backoff).await;
            }

            match self
                .client
                .get_object()
                .bucket(&self.bucket)
                .key(key)
                .send()
                .await
            {
                Ok(output) => {
                    let content_type = output
                        .content_type
                        .unwrap_or_else(|| "application/octet-stream".to_string());
                    let etag = output.e_tag.unwrap_or_default();
                    let last_modified = to_chrono(output.last_modified);
                    let metadata = output.metadata.unwrap_or_default();

                    let body_bytes = output
                        .body
                        .collect()
                        .await
                        .map_err(|e| StorageError::GetFailed {
                            path: key.to_string(),
                            reason: e.to_string(),
                        })?
                        .into_bytes();

                    return Ok(GetObjectOutput {
                        body: body_bytes,
                        content_type,
                        last_modified,
                        metadata,
                        etag,
                    });
                }
                Err(e) => {
                    if e.as_service_error().is_some_and(|se| se.is_no_such_key()) {
                        return Err(StorageError::NotFound {
                            path: key.to_string(),
                        });
                    }
                    let err_str = e.to_string();
                    if err_str.contains("403") || err_str.contains("Forbidden") {
                        return Err(StorageError::GetFailed {
                            path: key.to_string(),
                            reason: format!("forbidden: {}", err_str),
                        });
                    }
                    warn!(key, attempt, error = %err_str, "S3 GET failed");
                }
            }
        }

        Err(StorageError::RetriesExhausted {
            path: key.to_string(),
        })
    }
}

fn to_chrono(t: Option<S3DateTime>) -> DateTime<Utc> {
    t.and_then(|t| DateTime::from_timestamp(t.secs(), t.subsec_nanos()))
        .unwrap_or_else(Utc::now)
}

impl ObjectStore for S3ObjectStore {
    async fn list_objects(&self, prefix: &str) -> Result<Vec<ObjectInfo>, StorageError> {
        let mut objects = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut req = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix);

            if let Some(token) = &continuation_token {
                req = req.continuation_token(token);
            }

            let output = req.send().await.map_err(|e| StorageError::ListFailed {
                prefix: prefix.to_string(),
                reason: e.to_string(),
            })?;

            for obj in output.contents.unwrap_or_default() {
                let Some(key) = obj.key else { continue };
                objects.push(ObjectInfo {
                    key,
                    size: obj.size.unwrap_or(0).max(0) as u64,
                    last_modified: to_chrono(obj.last_modified),
                    metadata: HashMap::new(),
                });
            }

            if output.is_truncated.unwrap_or(false) {
                continuation_token = output.next_continuation_token;
            } else {
                break;
            }
        }

        objects.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(objects)
    }

    async fn list_objects_with_metadata(
        &self,
        prefix: &str,
    ) -> Result<Vec<ObjectInfo>, StorageError> {
        let objects = self.list_objects(prefix).await?;

        // ListObjectsV2 does not carry user metadata; HEAD each object.
        // `buffered` keeps the listing order.
        let objects = stream::iter(objects)
            .map(|mut info| async move {
                match self.head_object(&info.key).await {
                    Ok(Some(meta)) => info.metadata = meta.metadata,
                    Ok(None) => {}
                    Err(e) => warn!(
                        key = %info.key,
                        error = %e,
                        "HEAD failed, listing object without custom metadata"
                    ),
                }
                info
            })
            .buffered(HEAD_CONCURRENCY)
            .collect::<Vec<_>>()
            .await;

        Ok(objects)
    }

    async fn get_object(&self, key: &str) -> Result<GetObjectOutput, StorageError> {
        self.get_with_retry(key).await
    }

    async fn put_object(
        &self,
        key: &str,
        data: Bytes,
        options: PutOptions,
        precondition: WritePrecondition,
    ) -> Result<WriteOutcome, StorageError> {
        self.put_with_retry(key, data, &options, precondition).await
    }

    async fn delete_object(&self, key: &str) -> Result<(), StorageError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::DeleteFailed {
                path: key.to_string(),
                reason: e.to_string(),
            })?;
        Ok(())
    }

    async fn head_object(&self, key: &str) -> Result<Option<ObjectMeta>, StorageError> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(output) => Ok(Some(ObjectMeta {
                content_length: output.content_length.unwrap_or(0).max(0) as u64,
                content_type: output
                    .content_type
                    .unwrap_or_else(|| "application/octet-stream".to_string()),
                last_modified: to_chrono(output.last_modified),
                metadata: output.metadata.unwrap_or_default(),
                etag: output.e_tag.unwrap_or_default(),
            })),
            Err(e) => {
                if e.as_service_error().is_some_and(|se| se.is_not_found()) {
                    return Ok(None);
                }
                Err(StorageError::GetFailed {
                    path: key.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }
}
