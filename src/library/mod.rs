//! The subtitle library: the naming and versioning engine composed over an
//! [`ObjectStore`].

pub mod archive;
pub mod lock;

use std::collections::HashMap;
use std::time::Instant;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::catalog::allocator::allocate;
use crate::catalog::builder::{
    build_catalog, metadata_timestamp, sort_versions, version_entry, BuiltCatalog,
};
use crate::catalog::bulk::{delete_by_prefix, delete_keys, BulkDeleteReport};
use crate::catalog::episode::derive_episode;
use crate::catalog::key::{decode, encode, season_slug, show_segment};
use crate::catalog::scope::CatalogScope;
use crate::core::config::{AppConfig, StorageConfig, UploadConfig};
use crate::core::error::LibraryError;
use crate::core::security::{validate_length, MAX_NAME_LENGTH, MAX_SOURCE_LENGTH};
use crate::core::types::{LogicalAddress, StoredVersion, VersionInfo};
use crate::observability::metrics as obs;
use crate::storage::{
    decode_metadata_value, encode_metadata_value, ObjectStore, PutOptions, Visibility,
    WriteOutcome, WritePrecondition, META_SOURCE, META_UPLOADED_AT,
};

use self::archive::{read_archive, ArchiveLimits};
use self::lock::EpisodeLocks;

/// Conditional-create attempts before an upload gives up with a conflict.
pub const MAX_ALLOCATION_ATTEMPTS: u32 = 5;

// ---------------------------------------------------------------------------
// Settings and request/response types
// ---------------------------------------------------------------------------

/// Upload behavior taken from configuration.
#[derive(Debug, Clone)]
pub struct LibrarySettings {
    pub default_source: String,
    pub content_type: String,
    pub visibility: Visibility,
    pub max_upload_size_bytes: u64,
    pub archive_limits: ArchiveLimits,
}

impl LibrarySettings {
    pub fn from_config(upload: &UploadConfig, storage: &StorageConfig) -> Self {
        Self {
            default_source: upload.default_source.clone(),
            content_type: upload.content_type.clone(),
            visibility: if storage.public_objects {
                Visibility::Public
            } else {
                Visibility::Private
            },
            max_upload_size_bytes: upload.max_upload_size_bytes,
            archive_limits: ArchiveLimits {
                max_entries: upload.max_archive_entries,
                max_entry_size_bytes: upload.max_entry_size_bytes,
            },
        }
    }
}

impl Default for LibrarySettings {
    fn default() -> Self {
        let config = AppConfig::default();
        Self::from_config(&config.upload, &config.storage)
    }
}

/// A single subtitle file to store.
#[derive(Debug, Clone)]
pub struct SubtitleUpload {
    pub show: String,
    pub season: Option<String>,
    /// Derived from `filename` when absent.
    pub episode: Option<u32>,
    pub source: Option<String>,
    pub filename: String,
    pub data: Bytes,
}

/// A zip archive of subtitle files for one show (and season).
#[derive(Debug, Clone)]
pub struct ArchiveUpload {
    pub show: String,
    pub season: Option<String>,
    pub source: Option<String>,
    pub data: Bytes,
}

/// What an archive upload stored and what it passed over.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ArchiveReport {
    pub uploaded: Vec<StoredVersion>,
    /// Entries whose file name did not yield an episode number.
    pub skipped: Vec<String>,
}

/// Content and metadata of one stored version.
#[derive(Debug, Clone)]
pub struct FetchedSubtitle {
    pub key: String,
    pub version: u32,
    pub source: String,
    pub content_type: String,
    pub uploaded_at: DateTime<Utc>,
    pub etag: String,
    pub body: Bytes,
}

// ---------------------------------------------------------------------------
// SubtitleLibrary
// ---------------------------------------------------------------------------

/// Upload, fetch, list and delete versioned subtitles.
pub struct SubtitleLibrary<S: ObjectStore> {
    store: S,
    locks: EpisodeLocks,
    settings: LibrarySettings,
}

impl<S: ObjectStore> SubtitleLibrary<S> {
    pub fn new(store: S, settings: LibrarySettings) -> Self {
        Self {
            store,
            locks: EpisodeLocks::new(),
            settings,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn settings(&self) -> &LibrarySettings {
        &self.settings
    }

    // -- Upload --

    /// Store one subtitle file as the next version of its episode.
    pub async fn upload_subtitle(&self, upload: SubtitleUpload) -> Result<StoredVersion, LibraryError> {
        self.check_size(upload.data.len())?;
        let episode = match upload.episode {
            Some(episode) => episode,
            None => derive_episode(&upload.filename).ok_or_else(|| {
                LibraryError::invalid(format!(
                    "no episode given and none found in file name '{}'",
                    upload.filename
                ))
            })?,
        };
        let source = self.resolve_source(upload.source.as_deref())?;

        let stored = self
            .store_version(
                &upload.show,
                upload.season.as_deref(),
                episode,
                &source,
                &upload.filename,
                upload.data,
            )
            .await?;
        obs::inc_uploads("single");
        Ok(stored)
    }

    /// Store every subtitle in a zip archive, one version per entry.
    ///
    /// Episodes are derived from entry names; entries that yield none are
    /// reported as skipped. A store failure part way through aborts with the
    /// error and leaves the versions already written in place.
    pub async fn upload_archive(&self, upload: ArchiveUpload) -> Result<ArchiveReport, LibraryError> {
        self.check_size(upload.data.len())?;
        let source = self.resolve_source(upload.source.as_deref())?;
        // Validate the target before decompressing anything.
        validate_target(&upload.show, upload.season.as_deref())?;

        let limits = self.settings.archive_limits;
        let data = upload.data;
        let entries = tokio::task::spawn_blocking(move || read_archive(&data, limits))
            .await
            .map_err(|e| LibraryError::Archive {
                reason: format!("archive reader task failed: {}", e),
            })??;
        if entries.is_empty() {
            return Err(LibraryError::Archive {
                reason: "archive contains no .srt files".to_string(),
            });
        }

        let mut report = ArchiveReport::default();
        for entry in entries {
            let Some(episode) = derive_episode(&entry.name) else {
                debug!(entry = %entry.name, "no episode number in archive entry name");
                report.skipped.push(entry.name);
                continue;
            };
            let stored = self
                .store_version(
                    &upload.show,
                    upload.season.as_deref(),
                    episode,
                    &source,
                    &entry.name,
                    entry.data,
                )
                .await?;
            obs::inc_uploads("archive");
            report.uploaded.push(stored);
        }

        obs::add_archive_entries_skipped(report.skipped.len() as u64);
        info!(
            show = %upload.show,
            uploaded = report.uploaded.len(),
            skipped = report.skipped.len(),
            "archive upload complete"
        );
        Ok(report)
    }

    /// Allocate the next version under the episode lock and write it with a
    /// conditional create, re-scanning when another writer got there first.
    async fn store_version(
        &self,
        show: &str,
        season: Option<&str>,
        episode: u32,
        source: &str,
        original_name: &str,
        data: Bytes,
    ) -> Result<StoredVersion, LibraryError> {
        let (show_slug, season_slug) = validate_target(show, season)?;
        let scope = CatalogScope::Episode {
            show: show.to_string(),
            season: season.map(str::to_string),
            episode,
        };
        let prefix = scope.prefix()?;

        let _guard = self.locks.acquire(&prefix).await;

        let uploaded = Utc::now();
        let size_bytes = data.len() as u64;
        let mut metadata = HashMap::new();
        metadata.insert(META_SOURCE.to_string(), encode_metadata_value(source));
        metadata.insert(META_UPLOADED_AT.to_string(), uploaded.to_rfc3339());
        let options = PutOptions {
            content_type: self.settings.content_type.clone(),
            visibility: self.settings.visibility,
            metadata,
        };

        for attempt in 1..=MAX_ALLOCATION_ATTEMPTS {
            let version = allocate(&self.store, &prefix, episode).await?;
            let address = LogicalAddress::episode(show, season.map(str::to_string), episode)
                .with_version(version)
                .with_source(source);
            let key = encode(&address)?;

            match self
                .store
                .put_object(
                    key.as_str(),
                    data.clone(),
                    options.clone(),
                    WritePrecondition::DoesNotExist,
                )
                .await?
            {
                WriteOutcome::Written => {
                    obs::record_allocated_version(version);
                    obs::record_upload_size(size_bytes as f64);
                    info!(
                        key = %key,
                        show = %show_slug,
                        episode,
                        version,
                        original_name,
                        "stored subtitle version"
                    );
                    return Ok(StoredVersion {
                        filename: key.leaf().to_string(),
                        key: key.into_string(),
                        show: show_slug,
                        season: season_slug,
                        episode,
                        version,
                        source: source.to_string(),
                        uploaded_at: uploaded,
                        size_bytes,
                    });
                }
                WriteOutcome::PreconditionFailed => {
                    obs::inc_allocation_conflicts();
                    warn!(
                        key = %key,
                        attempt,
                        "version already taken by another writer, re-scanning"
                    );
                }
            }
        }

        Err(LibraryError::VersionConflict {
            prefix,
            attempts: MAX_ALLOCATION_ATTEMPTS,
        })
    }

    fn check_size(&self, size: usize) -> Result<(), LibraryError> {
        let size = size as u64;
        if size > self.settings.max_upload_size_bytes {
            return Err(LibraryError::PayloadTooLarge {
                size_bytes: size,
                max_bytes: self.settings.max_upload_size_bytes,
            });
        }
        if size == 0 {
            return Err(LibraryError::invalid("uploaded file is empty"));
        }
        Ok(())
    }

    fn resolve_source(&self, source: Option<&str>) -> Result<String, LibraryError> {
        let source = source
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(&self.settings.default_source);
        validate_length("source", source, MAX_SOURCE_LENGTH).map_err(LibraryError::invalid)?;
        Ok(source.to_string())
    }

    // -- Read --

    /// Content of one exact version.
    ///
    /// Two objects can share a version number when writers in different
    /// processes raced with different sources; the first key wins here.
    pub async fn fetch(
        &self,
        show: &str,
        season: Option<&str>,
        episode: u32,
        version: u32,
    ) -> Result<FetchedSubtitle, LibraryError> {
        let scope = CatalogScope::Version {
            show: show.to_string(),
            season: season.map(str::to_string),
            episode,
            version,
        };
        let prefix = scope.prefix()?;
        let mut keys: Vec<String> = self
            .store
            .list_objects(&prefix)
            .await?
            .into_iter()
            .map(|o| o.key)
            .filter(|k| decode(k).is_some())
            .collect();
        keys.sort();

        let Some(key) = keys.first() else {
            return Err(LibraryError::not_found(scope.to_string()));
        };
        if keys.len() > 1 {
            warn!(prefix = %prefix, matches = keys.len(), chosen = %key, "duplicate version objects");
        }

        let object = self.store.get_object(key).await?;
        let source = object
            .metadata
            .get(META_SOURCE)
            .map(|s| decode_metadata_value(s))
            .or_else(|| decode(key).and_then(|a| a.source))
            .unwrap_or_default();
        let uploaded_at = metadata_timestamp(&object.metadata, object.last_modified);

        Ok(FetchedSubtitle {
            key: key.clone(),
            version,
            source,
            content_type: object.content_type,
            uploaded_at,
            etag: object.etag,
            body: object.body,
        })
    }

    /// Whether any version of the episode exists.
    pub async fn exists(
        &self,
        show: &str,
        season: Option<&str>,
        episode: u32,
    ) -> Result<bool, LibraryError> {
        let prefix = CatalogScope::Episode {
            show: show.to_string(),
            season: season.map(str::to_string),
            episode,
        }
        .prefix()?;
        let listing = self.store.list_objects(&prefix).await?;
        Ok(listing.iter().any(|o| decode(&o.key).is_some()))
    }

    /// All stored versions of an episode, ascending. Empty when none exist.
    pub async fn list_versions(
        &self,
        show: &str,
        season: Option<&str>,
        episode: u32,
    ) -> Result<Vec<VersionInfo>, LibraryError> {
        let prefix = CatalogScope::Episode {
            show: show.to_string(),
            season: season.map(str::to_string),
            episode,
        }
        .prefix()?;
        let listing = self.store.list_objects_with_metadata(&prefix).await?;

        let mut versions: Vec<VersionInfo> = listing
            .iter()
            .filter_map(version_entry)
            .filter(|(address, _)| address.episode == episode)
            .map(|(_, info)| info)
            .collect();
        sort_versions(&mut versions);
        Ok(versions)
    }

    /// The full nested catalog, rebuilt from a listing of every key.
    pub async fn catalog(&self) -> Result<BuiltCatalog, LibraryError> {
        let start = Instant::now();
        let prefix = CatalogScope::All.prefix()?;
        let listing = self.store.list_objects_with_metadata(&prefix).await?;
        let built = build_catalog(&listing);

        obs::record_catalog_build_duration(start.elapsed().as_secs_f64());
        if built.skipped > 0 {
            obs::add_malformed_keys(built.skipped as u64);
            debug!(skipped = built.skipped, "catalog skipped non-versioned keys");
        }
        Ok(built)
    }

    // -- Delete --

    /// Delete everything under a scope.
    ///
    /// Episode and version scopes only touch keys that decode as versioned
    /// subtitles of that episode, the same set `fetch` and `list_versions`
    /// see. An exact-version scope that matches nothing is `NotFound`; any
    /// other empty scope is a successful, empty report.
    pub async fn delete(&self, scope: &CatalogScope) -> Result<BulkDeleteReport, LibraryError> {
        let prefix = scope.prefix()?;
        let report = match scope {
            CatalogScope::Episode { episode, .. } | CatalogScope::Version { episode, .. } => {
                let keys: Vec<String> = self
                    .store
                    .list_objects(&prefix)
                    .await?
                    .into_iter()
                    .map(|o| o.key)
                    .filter(|k| decode(k).is_some_and(|a| a.episode == *episode))
                    .collect();
                delete_keys(&self.store, keys).await?
            }
            _ => delete_by_prefix(&self.store, &prefix).await?,
        };

        if matches!(scope, CatalogScope::Version { .. })
            && report.deleted.is_empty()
            && report.failed.is_empty()
        {
            return Err(LibraryError::not_found(scope.to_string()));
        }

        obs::add_objects_deleted(scope.kind(), report.count() as u64);
        if !report.is_complete() {
            obs::add_delete_failures(report.failed.len() as u64);
            warn!(
                scope = %scope,
                deleted = report.count(),
                failed = report.failed.len(),
                "scoped delete finished with failures"
            );
        } else {
            info!(scope = %scope, deleted = report.count(), "scoped delete complete");
        }
        Ok(report)
    }
}

/// Check lengths and slugs of an upload target, returning the canonical
/// show and season segments.
fn validate_target(
    show: &str,
    season: Option<&str>,
) -> Result<(String, Option<String>), LibraryError> {
    validate_length("title", show, MAX_NAME_LENGTH).map_err(LibraryError::invalid)?;
    let show_slug = show_segment(show)?;
    let season_slug = match season {
        Some(season) => {
            validate_length("season", season, MAX_NAME_LENGTH).map_err(LibraryError::invalid)?;
            Some(season_slug(season)?)
        }
        None => None,
    };
    Ok((show_slug, season_slug))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    use crate::storage::memory::InMemoryObjectStore;

    fn library() -> SubtitleLibrary<InMemoryObjectStore> {
        SubtitleLibrary::new(InMemoryObjectStore::new(), LibrarySettings::default())
    }

    fn upload(show: &str, season: Option<&str>, episode: u32, source: &str) -> SubtitleUpload {
        SubtitleUpload {
            show: show.to_string(),
            season: season.map(str::to_string),
            episode: Some(episode),
            source: Some(source.to_string()),
            filename: format!("{}.srt", episode),
            data: Bytes::from(format!("1\n00:00:01,000 --> 00:00:02,000\n{}\n", source)),
        }
    }

    fn version_scope(show: &str, episode: u32, version: u32) -> CatalogScope {
        CatalogScope::Version {
            show: show.to_string(),
            season: None,
            episode,
            version,
        }
    }

    #[tokio::test]
    async fn test_versions_are_monotonic() {
        let lib = library();
        for expected in 1..=3 {
            let stored = lib.upload_subtitle(upload("Foo", None, 1, "x")).await.unwrap();
            assert_eq!(stored.version, expected);
        }
        let versions: Vec<u32> = lib
            .list_versions("Foo", None, 1)
            .await
            .unwrap()
            .iter()
            .map(|v| v.version)
            .collect();
        assert_eq!(versions, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_total_deletion_restarts_at_one() {
        let lib = library();
        lib.upload_subtitle(upload("foo", None, 1, "x")).await.unwrap();
        lib.upload_subtitle(upload("foo", None, 1, "x")).await.unwrap();

        let scope = CatalogScope::from_parts(Some("foo"), None, Some(1), None, false).unwrap();
        assert_eq!(lib.delete(&scope).await.unwrap().count(), 2);

        let stored = lib.upload_subtitle(upload("foo", None, 1, "x")).await.unwrap();
        assert_eq!(stored.version, 1);
    }

    #[tokio::test]
    async fn test_partial_deletion_never_reuses_below_max() {
        let lib = library();
        for _ in 0..3 {
            lib.upload_subtitle(upload("foo", None, 1, "x")).await.unwrap();
        }
        lib.delete(&version_scope("foo", 1, 2)).await.unwrap();
        let stored = lib.upload_subtitle(upload("foo", None, 1, "x")).await.unwrap();
        assert_eq!(stored.version, 4);
    }

    #[tokio::test]
    async fn test_deleting_highest_frees_its_number() {
        let lib = library();
        for _ in 0..3 {
            lib.upload_subtitle(upload("foo", None, 1, "x")).await.unwrap();
        }
        lib.delete(&version_scope("foo", 1, 3)).await.unwrap();
        let stored = lib.upload_subtitle(upload("foo", None, 1, "x")).await.unwrap();
        assert_eq!(stored.version, 3);
    }

    #[tokio::test]
    async fn test_season_delete_is_scoped() {
        let lib = library();
        lib.upload_subtitle(upload("foo", Some("1"), 1, "x")).await.unwrap();
        lib.upload_subtitle(upload("foo", Some("1"), 2, "x")).await.unwrap();
        lib.upload_subtitle(upload("foo", None, 2, "x")).await.unwrap();

        let scope = CatalogScope::from_parts(Some("foo"), Some("1"), None, None, false).unwrap();
        assert_eq!(lib.delete(&scope).await.unwrap().count(), 2);
        assert_eq!(lib.store().keys().await, vec!["shows/foo/2_v1_x.srt".to_string()]);
    }

    #[tokio::test]
    async fn test_exact_version_delete_of_nothing_is_not_found() {
        let lib = library();
        let err = lib.delete(&version_scope("foo", 1, 1)).await.unwrap_err();
        assert_eq!(err.status_code(), 404);

        // Wider scopes succeed with an empty report.
        let scope = CatalogScope::from_parts(Some("foo"), None, None, None, false).unwrap();
        assert_eq!(lib.delete(&scope).await.unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_fetch_exact_version() {
        let lib = library();
        let err = lib.fetch("foo", None, 1, 1).await.unwrap_err();
        assert!(matches!(err, LibraryError::NotFound { .. }));

        lib.upload_subtitle(upload("foo", None, 1, "alpha")).await.unwrap();
        lib.upload_subtitle(upload("foo", None, 1, "beta")).await.unwrap();

        let fetched = lib.fetch("foo", None, 1, 2).await.unwrap();
        assert_eq!(fetched.key, "shows/foo/1_v2_beta.srt");
        assert_eq!(fetched.source, "beta");
        assert!(String::from_utf8_lossy(&fetched.body).contains("beta"));
        assert_eq!(fetched.content_type, "application/x-subrip");
    }

    #[tokio::test]
    async fn test_fetch_prefers_first_of_duplicates() {
        let lib = library();
        lib.store().insert_raw("shows/foo/1_v1_zeta.srt", "z").await;
        lib.store().insert_raw("shows/foo/1_v1_alpha.srt", "a").await;
        let fetched = lib.fetch("foo", None, 1, 1).await.unwrap();
        assert_eq!(fetched.key, "shows/foo/1_v1_alpha.srt");

        lib.delete(&version_scope("foo", 1, 1)).await.unwrap();
        assert!(lib.store().keys().await.is_empty());
    }

    #[tokio::test]
    async fn test_exists() {
        let lib = library();
        assert!(!lib.exists("foo", None, 1).await.unwrap());
        lib.upload_subtitle(upload("foo", None, 1, "x")).await.unwrap();
        assert!(lib.exists("foo", None, 1).await.unwrap());
        assert!(!lib.exists("foo", None, 11).await.unwrap());
        assert!(!lib.exists("foo", Some("1"), 1).await.unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_uploads_get_distinct_versions() {
        let lib = Arc::new(library());
        let mut handles = Vec::new();
        for i in 0..8 {
            let lib = Arc::clone(&lib);
            handles.push(tokio::spawn(async move {
                lib.upload_subtitle(upload("foo", None, 5, &format!("src{}", i)))
                    .await
                    .unwrap()
                    .version
            }));
        }
        let mut versions = Vec::new();
        for h in handles {
            versions.push(h.await.unwrap());
        }
        versions.sort();
        assert_eq!(versions, (1..=8).collect::<Vec<u32>>());
    }

    /// Store whose first conditional write loses to a simulated writer in
    /// another process.
    struct RacingStore {
        inner: InMemoryObjectStore,
        raced: AtomicBool,
    }

    impl ObjectStore for RacingStore {
        async fn list_objects(
            &self,
            prefix: &str,
        ) -> Result<Vec<crate::storage::ObjectInfo>, crate::core::error::StorageError> {
            self.inner.list_objects(prefix).await
        }

        async fn get_object(
            &self,
            key: &str,
        ) -> Result<crate::storage::GetObjectOutput, crate::core::error::StorageError> {
            self.inner.get_object(key).await
        }

        async fn put_object(
            &self,
            key: &str,
            data: Bytes,
            options: PutOptions,
            precondition: WritePrecondition,
        ) -> Result<WriteOutcome, crate::core::error::StorageError> {
            if !self.raced.swap(true, Ordering::SeqCst) {
                self.inner.insert_raw(key, "other process").await;
            }
            self.inner.put_object(key, data, options, precondition).await
        }

        async fn delete_object(&self, key: &str) -> Result<(), crate::core::error::StorageError> {
            self.inner.delete_object(key).await
        }

        async fn head_object(
            &self,
            key: &str,
        ) -> Result<Option<crate::storage::ObjectMeta>, crate::core::error::StorageError> {
            self.inner.head_object(key).await
        }
    }

    #[tokio::test]
    async fn test_conflict_from_outside_writer_is_retried() {
        let lib = SubtitleLibrary::new(
            RacingStore {
                inner: InMemoryObjectStore::new(),
                raced: AtomicBool::new(false),
            },
            LibrarySettings::default(),
        );
        let stored = lib.upload_subtitle(upload("foo", None, 1, "x")).await.unwrap();
        assert_eq!(stored.version, 2);
        let body = lib.store().inner.get_object("shows/foo/1_v1_x.srt").await.unwrap();
        assert_eq!(body.body, Bytes::from_static(b"other process"));
    }

    #[tokio::test]
    async fn test_episode_derived_from_filename() {
        let lib = library();
        let mut u = upload("foo", None, 0, "x");
        u.episode = None;
        u.filename = "Foo.S01E07.srt".to_string();
        assert_eq!(lib.upload_subtitle(u).await.unwrap().episode, 7);

        let mut u = upload("foo", None, 0, "x");
        u.episode = None;
        u.filename = "notes.srt".to_string();
        assert!(matches!(
            lib.upload_subtitle(u).await,
            Err(LibraryError::InvalidAddress { .. })
        ));
    }

    #[tokio::test]
    async fn test_default_source_and_metadata() {
        let lib = library();
        let mut u = upload("foo", None, 1, "x");
        u.source = None;
        let stored = lib.upload_subtitle(u).await.unwrap();
        assert_eq!(stored.key, "shows/foo/1_v1_unknown.srt");

        let versions = lib.list_versions("foo", None, 1).await.unwrap();
        assert_eq!(versions[0].source, "unknown");
        assert_eq!(versions[0].uploaded_at, stored.uploaded_at);
    }

    #[tokio::test]
    async fn test_source_keeps_original_spelling_in_listing() {
        let lib = library();
        let stored = lib
            .upload_subtitle(upload("foo", None, 1, "Fan Sub"))
            .await
            .unwrap();
        assert_eq!(stored.filename, "1_v1_Fan-Sub.srt");
        let versions = lib.list_versions("foo", None, 1).await.unwrap();
        assert_eq!(versions[0].source, "Fan Sub");
    }

    #[tokio::test]
    async fn test_rejects_bad_uploads() {
        let lib = SubtitleLibrary::new(
            InMemoryObjectStore::new(),
            LibrarySettings {
                max_upload_size_bytes: 8,
                ..LibrarySettings::default()
            },
        );
        let err = lib.upload_subtitle(upload("foo", None, 1, "x")).await.unwrap_err();
        assert_eq!(err.status_code(), 413);

        let mut u = upload("???", None, 1, "x");
        u.data = Bytes::from_static(b"1");
        assert_eq!(lib.upload_subtitle(u).await.unwrap_err().status_code(), 400);

        let mut u = upload("foo", None, 1, "x");
        u.data = Bytes::new();
        assert_eq!(lib.upload_subtitle(u).await.unwrap_err().status_code(), 400);
    }

    #[tokio::test]
    async fn test_catalog_counts_skipped_keys() {
        let lib = library();
        lib.upload_subtitle(upload("foo", Some("1"), 2, "gamma")).await.unwrap();
        lib.upload_subtitle(upload("foo", None, 1, "alpha")).await.unwrap();
        lib.store().insert_raw("shows/foo/legacy.srt", "old").await;

        let built = lib.catalog().await.unwrap();
        assert_eq!(built.skipped, 1);
        let json = serde_json::to_value(&built.catalog).unwrap();
        assert_eq!(json["foo"]["no-season"][0]["episode"], 1);
        assert_eq!(json["foo"]["season-1"][0]["versions"][0]["source"], "gamma");
    }

    #[tokio::test]
    async fn test_large_episode_numbers_are_addressable() {
        let lib = library();
        let stored = lib
            .upload_subtitle(upload("foo", None, 100_000, "x"))
            .await
            .unwrap();
        assert_eq!(stored.key, "shows/foo/100000_v1_x.srt");

        let fetched = lib.fetch("foo", None, 100_000, 1).await.unwrap();
        assert_eq!(fetched.key, stored.key);
        assert!(lib.exists("foo", None, 100_000).await.unwrap());

        let scope = CatalogScope::Episode {
            show: "foo".to_string(),
            season: None,
            episode: 100_000,
        };
        assert_eq!(lib.delete(&scope).await.unwrap().count(), 1);
        assert!(lib.store().keys().await.is_empty());
    }

    #[tokio::test]
    async fn test_scoped_delete_skips_undecodable_keys() {
        let lib = library();
        lib.store().insert_raw("shows/foo/1_v1_notes.txt", "notes").await;
        lib.upload_subtitle(upload("foo", None, 1, "x")).await.unwrap();

        let err = lib.delete(&version_scope("foo", 1, 2)).await.unwrap_err();
        assert!(matches!(err, LibraryError::NotFound { .. }));

        let report = lib.delete(&version_scope("foo", 1, 1)).await.unwrap();
        assert_eq!(report.deleted, vec!["shows/foo/1_v1_x.srt".to_string()]);

        // Only the foreign file is left, and it is invisible to reads.
        let err = lib.delete(&version_scope("foo", 1, 1)).await.unwrap_err();
        assert!(matches!(err, LibraryError::NotFound { .. }));
        assert_eq!(lib.store().keys().await, vec!["shows/foo/1_v1_notes.txt".to_string()]);
    }

    #[tokio::test]
    async fn test_non_ascii_source_is_stored_as_ascii_metadata() {
        let lib = library();
        let stored = lib
            .upload_subtitle(upload("foo", None, 1, "Sous-titres Français"))
            .await
            .unwrap();

        let raw = lib.store().get_object(&stored.key).await.unwrap();
        assert!(raw.metadata.values().all(|v| v.is_ascii()));

        let fetched = lib.fetch("foo", None, 1, 1).await.unwrap();
        assert_eq!(fetched.source, "Sous-titres Français");
        let versions = lib.list_versions("foo", None, 1).await.unwrap();
        assert_eq!(versions[0].source, "Sous-titres Français");
    }

    /// Store whose plain listing carries no metadata, counting how often the
    /// metadata listing is requested.
    struct KeyOnlyListingStore {
        inner: InMemoryObjectStore,
        metadata_listings: AtomicUsize,
    }

    impl ObjectStore for KeyOnlyListingStore {
        async fn list_objects(
            &self,
            prefix: &str,
        ) -> Result<Vec<crate::storage::ObjectInfo>, crate::core::error::StorageError> {
            let mut listing = self.inner.list_objects(prefix).await?;
            for info in listing.iter_mut() {
                info.metadata.clear();
            }
            Ok(listing)
        }

        async fn list_objects_with_metadata(
            &self,
            prefix: &str,
        ) -> Result<Vec<crate::storage::ObjectInfo>, crate::core::error::StorageError> {
            self.metadata_listings.fetch_add(1, Ordering::SeqCst);
            self.inner.list_objects(prefix).await
        }

        async fn get_object(
            &self,
            key: &str,
        ) -> Result<crate::storage::GetObjectOutput, crate::core::error::StorageError> {
            self.inner.get_object(key).await
        }

        async fn put_object(
            &self,
            key: &str,
            data: Bytes,
            options: PutOptions,
            precondition: WritePrecondition,
        ) -> Result<WriteOutcome, crate::core::error::StorageError> {
            self.inner.put_object(key, data, options, precondition).await
        }

        async fn delete_object(&self, key: &str) -> Result<(), crate::core::error::StorageError> {
            self.inner.delete_object(key).await
        }

        async fn head_object(
            &self,
            key: &str,
        ) -> Result<Option<crate::storage::ObjectMeta>, crate::core::error::StorageError> {
            self.inner.head_object(key).await
        }
    }

    #[tokio::test]
    async fn test_only_catalog_reads_list_metadata() {
        let lib = SubtitleLibrary::new(
            KeyOnlyListingStore {
                inner: InMemoryObjectStore::new(),
                metadata_listings: AtomicUsize::new(0),
            },
            LibrarySettings::default(),
        );
        lib.upload_subtitle(upload("foo", None, 1, "Fan Sub")).await.unwrap();
        lib.upload_subtitle(upload("foo", None, 1, "Fan Sub")).await.unwrap();
        assert!(lib.exists("foo", None, 1).await.unwrap());
        assert_eq!(lib.fetch("foo", None, 1, 1).await.unwrap().source, "Fan Sub");
        lib.delete(&version_scope("foo", 1, 2)).await.unwrap();
        assert_eq!(lib.store().metadata_listings.load(Ordering::SeqCst), 0);

        let versions = lib.list_versions("foo", None, 1).await.unwrap();
        assert_eq!(versions[0].source, "Fan Sub");
        let built = lib.catalog().await.unwrap();
        assert_eq!(built.skipped, 0);
        assert_eq!(lib.store().metadata_listings.load(Ordering::SeqCst), 2);
    }
}
