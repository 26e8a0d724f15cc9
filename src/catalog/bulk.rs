use serde::Serialize;
use tracing::{debug, warn};

use crate::core::error::StorageError;
use crate::storage::ObjectStore;

/// A key that could not be deleted, with the store's reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedKey {
    pub key: String,
    pub error: String,
}

/// Outcome of a delete over a prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BulkDeleteReport {
    pub deleted: Vec<String>,
    pub failed: Vec<FailedKey>,
}

impl BulkDeleteReport {
    /// Number of objects actually removed.
    pub fn count(&self) -> usize {
        self.deleted.len()
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Delete every object under `prefix`.
///
/// Not transactional. Individual delete failures are collected and the scan
/// continues; only a failed listing aborts the operation. An empty prefix
/// scope is a successful report with nothing in it.
pub async fn delete_by_prefix<S: ObjectStore>(
    store: &S,
    prefix: &str,
) -> Result<BulkDeleteReport, StorageError> {
    let listing = store.list_objects(prefix).await?;
    delete_keys(store, listing.into_iter().map(|o| o.key)).await
}

/// Delete an explicit set of keys with the same reporting as
/// [`delete_by_prefix`].
pub async fn delete_keys<S, I>(store: &S, keys: I) -> Result<BulkDeleteReport, StorageError>
where
    S: ObjectStore,
    I: IntoIterator<Item = String>,
{
    let mut report = BulkDeleteReport::default();

    for key in keys {
        match store.delete_object(&key).await {
            Ok(()) => {
                debug!(key = %key, "deleted object");
                report.deleted.push(key);
            }
            Err(e) => {
                warn!(key = %key, error = %e, "failed to delete object, continuing");
                report.failed.push(FailedKey {
                    key,
                    error: e.to_string(),
                });
            }
        }
    }

    Ok(report)
}
