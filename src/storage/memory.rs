use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::core::error::StorageError;

use super::{
    GetObjectOutput, ObjectInfo, ObjectMeta, ObjectStore, PutOptions, WriteOutcome,
    WritePrecondition,
};

// ---------------------------------------------------------------------------
// InMemoryObjectStore
// ---------------------------------------------------------------------------

/// In-memory object store for tests and local development.
///
/// Stores all objects in a `HashMap<String, StoredObject>` behind a `RwLock`.
/// Conditional writes are checked under the write lock, so `DoesNotExist` is
/// atomic with respect to other writers. Visibility has no meaning here and is
/// dropped.
#[derive(Clone)]
pub struct InMemoryObjectStore {
    objects: Arc<RwLock<HashMap<String, StoredObject>>>,
    /// Key prefixes whose deletes fail.
    delete_failures: Arc<RwLock<Vec<String>>>,
}

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    content_type: String,
    metadata: HashMap<String, String>,
    created_at: DateTime<Utc>,
}

impl StoredObject {
    fn etag(&self) -> String {
        format!("\"{}-{}\"", self.data.len(), self.created_at.timestamp_micros())
    }
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self {
            objects: Arc::new(RwLock::new(HashMap::new())),
            delete_failures: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Make every later delete of a key under `prefix` fail. Clones share the
    /// setting.
    pub async fn inject_delete_failure(&self, prefix: impl Into<String>) {
        self.delete_failures.write().await.push(prefix.into());
    }

    /// Insert raw bytes under an arbitrary key with no custom metadata.
    ///
    /// Lets tests seed legacy or malformed keys that the library itself would
    /// never write.
    pub async fn insert_raw(&self, key: &str, data: impl Into<Bytes>) {
        self.objects.write().await.insert(
            key.to_string(),
            StoredObject {
                data: data.into(),
                content_type: "application/octet-stream".to_string(),
                metadata: HashMap::new(),
                created_at: Utc::now(),
            },
        );
    }

    /// All keys currently stored, sorted.
    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectStore for InMemoryObjectStore {
    async fn list_objects(&self, prefix: &str) -> Result<Vec<ObjectInfo>, StorageError> {
        let objects = self.objects.read().await;
        let mut result: Vec<ObjectInfo> = objects
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| ObjectInfo {
                key: k.clone(),
                size: v.data.len() as u64,
                last_modified: v.created_at,
                metadata: v.metadata.clone(),
            })
            .collect();
        result.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(result)
    }

    async fn get_object(&self, key: &str) -> Result<GetObjectOutput, StorageError> {
        let objects = self.objects.read().await;
        let obj = objects.get(key).ok_or_else(|| StorageError::NotFound {
            path: key.to_string(),
        })?;

        Ok(GetObjectOutput {
            body: obj.data.clone(),
            content_type: obj.content_type.clone(),
            last_modified: obj.created_at,
            metadata: obj.metadata.clone(),
            etag: obj.etag(),
        })
    }

    async fn put_object(
        &self,
        key: &str,
        data: Bytes,
        options: PutOptions,
        precondition: WritePrecondition,
    ) -> Result<WriteOutcome, StorageError> {
        let mut objects = self.objects.write().await;
        if precondition == WritePrecondition::DoesNotExist && objects.contains_key(key) {
            return Ok(WriteOutcome::PreconditionFailed);
        }
        objects.insert(
            key.to_string(),
            StoredObject {
                data,
                content_type: options.content_type,
                metadata: options.metadata,
                created_at: Utc::now(),
            },
        );
        Ok(WriteOutcome::Written)
    }

    async fn delete_object(&self, key: &str) -> Result<(), StorageError> {
        let failing = self.delete_failures.read().await;
        if failing.iter().any(|p| key.starts_with(p.as_str())) {
            return Err(StorageError::DeleteFailed {
                path: key.to_string(),
                reason: "injected failure".to_string(),
            });
        }
        drop(failing);
        self.objects.write().await.remove(key);
        Ok(())
    }

    async fn head_object(&self, key: &str) -> Result<Option<ObjectMeta>, StorageError> {
        let objects = self.objects.read().await;
        Ok(objects.get(key).map(|obj| ObjectMeta {
            content_length: obj.data.len() as u64,
            content_type: obj.content_type.clone(),
            last_modified: obj.created_at,
            metadata: obj.metadata.clone(),
            etag: obj.etag(),
        }))
    }
}
