//! Mapping between logical addresses and flat storage keys.
//!
//! Key layout:
//!
//! ```text
//! shows/<show-slug>/<episode>_v<version>_<source>.srt
//! shows/<show-slug>/season-<season-slug>/<episode>_v<version>_<source>.srt
//! ```
//!
//! The leaf grammar `^(\d+)_v(\d+)_(.+)\.srt$` is the only schema the stored
//! data has. Keys that do not follow it (legacy uploads, stray files) decode
//! to `None` and are ignored by the catalog and the version allocator.

use std::sync::OnceLock;

use regex::Regex;

use crate::core::error::LibraryError;
use crate::core::security::validate_episode;
use crate::core::types::{LogicalAddress, StorageKey};

use super::slug::{normalise_source, sanitise};

/// First segment of every subtitle key.
pub const ROOT: &str = "shows";

/// Prefix of the season segment.
pub const SEASON_PREFIX: &str = "season-";

/// Extension of every versioned subtitle leaf.
pub const LEAF_EXTENSION: &str = ".srt";

fn leaf_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(\d+)_v(\d+)_(.+)\.srt$").expect("leaf pattern is a valid regex")
    })
}

/// Slug of a show name, rejecting names that sanitize to nothing.
pub fn show_segment(show: &str) -> Result<String, LibraryError> {
    let slug = sanitise(show);
    if slug.is_empty() {
        return Err(LibraryError::invalid(format!(
            "show '{}' has no usable characters",
            show
        )));
    }
    Ok(slug)
}

/// Slug of a season name, rejecting names that sanitize to nothing.
pub fn season_slug(season: &str) -> Result<String, LibraryError> {
    let slug = sanitise(season);
    if slug.is_empty() {
        return Err(LibraryError::invalid(format!(
            "season '{}' has no usable characters",
            season
        )));
    }
    Ok(slug)
}

/// Directory part of a key: `shows/<show>/` or `shows/<show>/season-<s>/`.
pub(crate) fn directory(show: &str, season: Option<&str>) -> Result<String, LibraryError> {
    let show = show_segment(show)?;
    match season {
        Some(season) => Ok(format!(
            "{}/{}/{}{}/",
            ROOT,
            show,
            SEASON_PREFIX,
            season_slug(season)?
        )),
        None => Ok(format!("{}/{}/", ROOT, show)),
    }
}

/// Build the leaf segment `<episode>_v<version>_<source>.srt`.
pub fn encode_leaf(episode: u32, version: u32, source: &str) -> String {
    format!("{}_v{}_{}{}", episode, version, source, LEAF_EXTENSION)
}

/// Parse a leaf segment back into `(episode, version, source)`.
///
/// Returns `None` for anything outside the grammar, including zero, zero-padded
/// or overflowing episode/version numbers.
pub fn decode_leaf(leaf: &str) -> Option<(u32, u32, String)> {
    let caps = leaf_pattern().captures(leaf)?;
    // `encode_leaf` never writes leading zeros.
    if caps[1].starts_with('0') || caps[2].starts_with('0') {
        return None;
    }
    let episode: u32 = caps[1].parse().ok()?;
    let version: u32 = caps[2].parse().ok()?;
    if episode == 0 || version == 0 {
        return None;
    }
    Some((episode, version, caps[3].to_string()))
}

/// Encode a full address into its storage key.
///
/// Show, season and source are normalized on the way in, so the key is safe
/// for any input that survives sanitization.
pub fn encode(address: &LogicalAddress) -> Result<StorageKey, LibraryError> {
    if address.show.trim().is_empty() {
        return Err(LibraryError::invalid("show is required"));
    }
    validate_episode(address.episode).map_err(LibraryError::invalid)?;

    let version = match address.version {
        Some(v) if v > 0 => v,
        Some(_) => return Err(LibraryError::invalid("version must be a positive integer")),
        None => return Err(LibraryError::invalid("version is required to build a key")),
    };
    let source = address
        .source
        .as_deref()
        .map(normalise_source)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| LibraryError::invalid("source is required to build a key"))?;

    let dir = directory(&address.show, address.season.as_deref())?;
    Ok(StorageKey::from_encoded(format!(
        "{}{}",
        dir,
        encode_leaf(address.episode, version, &source)
    )))
}

/// Decode a storage key into its address, or `None` if the key is not a
/// versioned subtitle.
pub fn decode(key: &str) -> Option<LogicalAddress> {
    let segments: Vec<&str> = key.split('/').collect();
    let (show, season, leaf) = match segments.as_slice() {
        [root, show, leaf] if *root == ROOT => (*show, None, *leaf),
        [root, show, season, leaf] if *root == ROOT => {
            let season = season.strip_prefix(SEASON_PREFIX)?;
            if season.is_empty() {
                return None;
            }
            (*show, Some(season.to_string()), *leaf)
        }
        _ => return None,
    };
    // Only keys that `encode` could have produced decode.
    if show.is_empty() || sanitise(show) != show {
        return None;
    }
    if season.as_deref().is_some_and(|s| sanitise(s) != s) {
        return None;
    }

    let (episode, version, source) = decode_leaf(leaf)?;
    if normalise_source(&source) != source {
        return None;
    }
    Some(LogicalAddress {
        show: show.to_string(),
        season,
        episode,
        version: Some(version),
        source: Some(source),
    })
}
