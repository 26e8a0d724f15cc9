use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Addresses and keys
// ---------------------------------------------------------------------------

/// Hierarchical address of a subtitle (or a scope of subtitles).
///
/// `show` and `season` hold slugs once the address has passed through the key
/// codec; `version` and `source` are only required to build a full key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LogicalAddress {
    pub show: String,
    pub season: Option<String>,
    pub episode: u32,
    pub version: Option<u32>,
    pub source: Option<String>,
}

impl LogicalAddress {
    /// Address of an episode, without version or source.
    pub fn episode(show: impl Into<String>, season: Option<String>, episode: u32) -> Self {
        Self {
            show: show.into(),
            season,
            episode,
            version: None,
            source: None,
        }
    }

    pub fn with_version(mut self, version: u32) -> Self {
        self.version = Some(version);
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl fmt::Display for LogicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.show)?;
        if let Some(season) = &self.season {
            write!(f, "/season-{}", season)?;
        }
        write!(f, "/e{}", self.episode)?;
        if let Some(version) = self.version {
            write!(f, "/v{}", version)?;
        }
        Ok(())
    }
}

/// A flat object-store key produced by the key codec.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StorageKey(String);

impl StorageKey {
    pub(crate) fn from_encoded(key: String) -> Self {
        Self(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The final path segment (`<episode>_v<version>_<source>.srt`).
    pub fn leaf(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for StorageKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// Catalog view types
// ---------------------------------------------------------------------------

/// One stored version of an episode's subtitle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    pub version: u32,
    pub source: String,
    pub filename: String,
    pub uploaded_at: DateTime<Utc>,
}

/// All stored versions of one episode, ascending by version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Episode {
    pub episode: u32,
    pub versions: Vec<VersionInfo>,
}

/// Result of storing one subtitle version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredVersion {
    pub key: String,
    pub show: String,
    pub season: Option<String>,
    pub episode: u32,
    pub version: u32,
    pub source: String,
    pub filename: String,
    pub uploaded_at: DateTime<Utc>,
    pub size_bytes: u64,
}
