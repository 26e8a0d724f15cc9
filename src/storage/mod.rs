pub mod memory;
#[cfg(feature = "s3")]
pub mod s3;

use std::collections::HashMap;
use std::time::Instant;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::config::StorageConfig;
use crate::core::error::StorageError;
use crate::observability::metrics as obs;

use memory::InMemoryObjectStore;

/// Custom metadata key holding the free-text source tag.
pub const META_SOURCE: &str = "source";

/// Custom metadata key holding the RFC 3339 upload timestamp.
pub const META_UPLOADED_AT: &str = "uploaded-at";

/// Percent-encode a free-text metadata value. S3 user metadata is ASCII only
/// and rewrites anything else as RFC 2047 on the way back.
pub fn encode_metadata_value(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

/// Reverse `encode_metadata_value`. Values that do not decode to UTF-8 are
/// returned as stored.
pub fn decode_metadata_value(value: &str) -> String {
    urlencoding::decode(value)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| value.to_string())
}

// ---------------------------------------------------------------------------
// ObjectStore trait
// ---------------------------------------------------------------------------

/// Abstraction over a flat key-addressed blob store.
///
/// The library never talks to a concrete backend: production wraps
/// `aws-sdk-s3` (`S3ObjectStore`, feature `s3`), tests and local development
/// use `InMemoryObjectStore`.
pub trait ObjectStore: Send + Sync {
    /// List every object whose key starts with `prefix`, sorted by key.
    ///
    /// Backends whose listing API does not carry custom metadata may leave
    /// `ObjectInfo::metadata` empty.
    fn list_objects(
        &self,
        prefix: &str,
    ) -> impl std::future::Future<Output = Result<Vec<ObjectInfo>, StorageError>> + Send;

    /// Like `list_objects`, with each object's custom metadata filled in
    /// where the backend can supply it.
    fn list_objects_with_metadata(
        &self,
        prefix: &str,
    ) -> impl std::future::Future<Output = Result<Vec<ObjectInfo>, StorageError>> + Send {
        async move { self.list_objects(prefix).await }
    }

    /// Read an object. Missing keys yield `StorageError::NotFound`.
    fn get_object(
        &self,
        key: &str,
    ) -> impl std::future::Future<Output = Result<GetObjectOutput, StorageError>> + Send;

    /// Write an object with content type, visibility and custom metadata.
    ///
    /// A failed precondition is a normal outcome, not an error.
    fn put_object(
        &self,
        key: &str,
        data: Bytes,
        options: PutOptions,
        precondition: WritePrecondition,
    ) -> impl std::future::Future<Output = Result<WriteOutcome, StorageError>> + Send;

    /// Delete a single object. Deleting a missing key succeeds.
    fn delete_object(
        &self,
        key: &str,
    ) -> impl std::future::Future<Output = Result<(), StorageError>> + Send;

    /// HEAD an object to get metadata without downloading the body.
    fn head_object(
        &self,
        key: &str,
    ) -> impl std::future::Future<Output = Result<Option<ObjectMeta>, StorageError>> + Send;

    /// Whether an object exists under exactly this key.
    fn exists(
        &self,
        key: &str,
    ) -> impl std::future::Future<Output = Result<bool, StorageError>> + Send {
        async move { Ok(self.head_object(key).await?.is_some()) }
    }
}

// ---------------------------------------------------------------------------
// Storage types
// ---------------------------------------------------------------------------

/// Output from a GET object operation.
#[derive(Debug, Clone)]
pub struct GetObjectOutput {
    pub body: Bytes,
    pub content_type: String,
    pub last_modified: DateTime<Utc>,
    pub metadata: HashMap<String, String>,
    pub etag: String,
}

/// Information about an object from a LIST operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectInfo {
    pub key: String,
    pub size: u64,
    /// Store-assigned timestamp, used when custom metadata lacks one.
    pub last_modified: DateTime<Utc>,
    pub metadata: HashMap<String, String>,
}

/// Metadata returned by a HEAD object operation.
#[derive(Debug, Clone)]
pub struct ObjectMeta {
    pub content_length: u64,
    pub content_type: String,
    pub last_modified: DateTime<Utc>,
    pub metadata: HashMap<String, String>,
    pub etag: String,
}

/// Whether an object should be publicly readable at the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Private,
    Public,
}

/// Options attached to a PUT.
#[derive(Debug, Clone, Default)]
pub struct PutOptions {
    pub content_type: String,
    pub visibility: Visibility,
    pub metadata: HashMap<String, String>,
}

/// Precondition for a conditional write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritePrecondition {
    /// Write only if no object exists under the key.
    DoesNotExist,
    /// Write unconditionally (last write wins).
    None,
}

/// Outcome of a PUT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    PreconditionFailed,
}

// ---------------------------------------------------------------------------
// Runtime-selected backend
// ---------------------------------------------------------------------------

/// The store the server runs against, chosen from `storage.backend`.
pub enum StoreBackend {
    Memory(InMemoryObjectStore),
    #[cfg(feature = "s3")]
    S3(s3::S3ObjectStore),
}

impl StoreBackend {
    pub async fn from_config(config: &StorageConfig) -> Result<Self, StorageError> {
        match config.backend.as_str() {
            #[cfg(feature = "s3")]
            "s3" => Ok(StoreBackend::S3(s3::S3ObjectStore::new(config).await?)),
            "memory" => Ok(StoreBackend::Memory(InMemoryObjectStore::new())),
            other => Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("unsupported storage backend '{}' (is the feature enabled?)", other),
            ))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            StoreBackend::Memory(_) => "memory",
            #[cfg(feature = "s3")]
            StoreBackend::S3(_) => "s3",
        }
    }
}

impl ObjectStore for StoreBackend {
    async fn list_objects(&self, prefix: &str) -> Result<Vec<ObjectInfo>, StorageError> {
        let start = Instant::now();
        let result = match self {
            StoreBackend::Memory(s) => s.list_objects(prefix).await,
            #[cfg(feature = "s3")]
            StoreBackend::S3(s) => s.list_objects(prefix).await,
        };
        observe("list", start, &result);
        result
    }

    async fn list_objects_with_metadata(
        &self,
        prefix: &str,
    ) -> Result<Vec<ObjectInfo>, StorageError> {
        let start = Instant::now();
        let result = match self {
            StoreBackend::Memory(s) => s.list_objects_with_metadata(prefix).await,
            #[cfg(feature = "s3")]
            StoreBackend::S3(s) => s.list_objects_with_metadata(prefix).await,
        };
        observe("list_metadata", start, &result);
        result
    }

    async fn get_object(&self, key: &str) -> Result<GetObjectOutput, StorageError> {
        let start = Instant::now();
        let result = match self {
            StoreBackend::Memory(s) => s.get_object(key).await,
            #[cfg(feature = "s3")]
            StoreBackend::S3(s) => s.get_object(key).await,
        };
        // A missing key is an answer, not a store failure.
        if !matches!(&result, Err(e) if e.is_not_found()) {
            observe("get", start, &result);
        }
        result
    }

    async fn put_object(
        &self,
        key: &str,
        data: Bytes,
        options: PutOptions,
        precondition: WritePrecondition,
    ) -> Result<WriteOutcome, StorageError> {
        let start = Instant::now();
        let result = match self {
            StoreBackend::Memory(s) => s.put_object(key, data, options, precondition).await,
            #[cfg(feature = "s3")]
            StoreBackend::S3(s) => s.put_object(key, data, options, precondition).await,
        };
        observe("put", start, &result);
        result
    }

    async fn delete_object(&self, key: &str) -> Result<(), StorageError> {
        let start = Instant::now();
        let result = match self {
            StoreBackend::Memory(s) => s.delete_object(key).await,
            #[cfg(feature = "s3")]
            StoreBackend::S3(s) => s.delete_object(key).await,
        };
        observe("delete", start, &result);
        result
    }

    async fn head_object(&self, key: &str) -> Result<Option<ObjectMeta>, StorageError> {
        let start = Instant::now();
        let result = match self {
            StoreBackend::Memory(s) => s.head_object(key).await,
            #[cfg(feature = "s3")]
            StoreBackend::S3(s) => s.head_object(key).await,
        };
        observe("head", start, &result);
        result
    }
}

fn observe<T>(operation: &str, start: Instant, result: &Result<T, StorageError>) {
    obs::record_storage_duration(operation, start.elapsed().as_secs_f64());
    if result.is_err() {
        obs::inc_storage_error(operation);
    }
}
