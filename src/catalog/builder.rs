//! Rebuilds the nested show → season → episode → version view from a flat
//! listing. The result is a per-request value; nothing here is cached.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::core::types::{Episode, LogicalAddress, VersionInfo};
use crate::storage::{decode_metadata_value, ObjectInfo, META_SOURCE, META_UPLOADED_AT};

use super::key::{decode, SEASON_PREFIX};

/// Label under which season-less episodes are filed when the show also has
/// seasons. It cannot collide with a real label, which always starts with
/// `season-`.
pub const NO_SEASON_LABEL: &str = "no-season";

/// Episodes of one show.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ShowEntry {
    /// The show has no season segments at all.
    Episodes(Vec<Episode>),
    /// Season label (`season-1`, or [`NO_SEASON_LABEL`]) to episodes.
    Seasons(BTreeMap<String, Vec<Episode>>),
}

/// Show slug to its episodes, sorted by name.
pub type Catalog = BTreeMap<String, ShowEntry>;

/// A built catalog plus the number of keys that were not versioned subtitles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltCatalog {
    pub catalog: Catalog,
    pub skipped: usize,
}

type EpisodeMap = BTreeMap<u32, Vec<VersionInfo>>;

#[derive(Default)]
struct ShowAccumulator {
    unseasoned: EpisodeMap,
    seasons: BTreeMap<String, EpisodeMap>,
}

/// Group a listing into the catalog tree.
///
/// Keys that fail to decode are skipped and counted. The output is sorted at
/// every level, so it does not depend on listing order.
pub fn build_catalog(objects: &[ObjectInfo]) -> BuiltCatalog {
    let mut shows: BTreeMap<String, ShowAccumulator> = BTreeMap::new();
    let mut skipped = 0usize;

    for object in objects {
        let Some((address, info)) = version_entry(object) else {
            debug!(key = %object.key, "skipping key outside the versioned layout");
            skipped += 1;
            continue;
        };

        let show = shows.entry(address.show).or_default();
        let episodes = match address.season {
            Some(season) => show
                .seasons
                .entry(format!("{}{}", SEASON_PREFIX, season))
                .or_default(),
            None => &mut show.unseasoned,
        };
        episodes.entry(address.episode).or_default().push(info);
    }

    let catalog = shows
        .into_iter()
        .map(|(name, acc)| {
            let entry = if acc.seasons.is_empty() {
                ShowEntry::Episodes(finish(acc.unseasoned))
            } else {
                let mut seasons: BTreeMap<String, Vec<Episode>> = acc
                    .seasons
                    .into_iter()
                    .map(|(label, eps)| (label, finish(eps)))
                    .collect();
                if !acc.unseasoned.is_empty() {
                    seasons.insert(NO_SEASON_LABEL.to_string(), finish(acc.unseasoned));
                }
                ShowEntry::Seasons(seasons)
            };
            (name, entry)
        })
        .collect();

    BuiltCatalog { catalog, skipped }
}

/// Sort the versions of each episode and emit episodes in ascending order.
fn finish(episodes: EpisodeMap) -> Vec<Episode> {
    episodes
        .into_iter()
        .map(|(episode, mut versions)| {
            sort_versions(&mut versions);
            Episode { episode, versions }
        })
        .collect()
}

/// Ascending by version; duplicates of one version ordered by file name.
pub fn sort_versions(versions: &mut [VersionInfo]) {
    versions.sort_by(|a, b| {
        a.version
            .cmp(&b.version)
            .then_with(|| a.filename.cmp(&b.filename))
    });
}

/// Decode one listed object into its address and catalog entry.
///
/// The source comes from custom metadata when present (it keeps the
/// client's original spelling), otherwise from the key leaf.
pub fn version_entry(object: &ObjectInfo) -> Option<(LogicalAddress, VersionInfo)> {
    let address = decode(&object.key)?;
    let version = address.version?;
    let leaf_source = address.source.clone()?;

    let info = VersionInfo {
        version,
        source: object
            .metadata
            .get(META_SOURCE)
            .filter(|s| !s.is_empty())
            .map(|s| decode_metadata_value(s))
            .unwrap_or(leaf_source),
        filename: object
            .key
            .rsplit('/')
            .next()
            .unwrap_or(&object.key)
            .to_string(),
        uploaded_at: uploaded_at(object),
    };
    Some((address, info))
}

/// Upload time from custom metadata, falling back to the store timestamp.
pub fn uploaded_at(object: &ObjectInfo) -> DateTime<Utc> {
    metadata_timestamp(&object.metadata, object.last_modified)
}

/// The RFC 3339 `uploaded-at` metadata value, or `fallback` when it is
/// absent or unparsable.
pub fn metadata_timestamp(
    metadata: &HashMap<String, String>,
    fallback: DateTime<Utc>,
) -> DateTime<Utc> {
    metadata
        .get(META_UPLOADED_AT)
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or(fallback)
}
