//! Key prefixes that cover exactly one logical scope of the catalog.

use std::fmt;

use crate::core::error::LibraryError;
use crate::core::security::validate_episode;

use super::key::{directory, ROOT};

/// A region of the show/season/episode/version hierarchy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogScope {
    All,
    Show {
        show: String,
    },
    Season {
        show: String,
        season: String,
    },
    Episode {
        show: String,
        season: Option<String>,
        episode: u32,
    },
    Version {
        show: String,
        season: Option<String>,
        episode: u32,
        version: u32,
    },
}

impl CatalogScope {
    /// Build a scope from the optional parts of a request.
    ///
    /// The whole catalog is only selected when `all` is set and nothing else
    /// is given; an empty request is rejected rather than read as "everything".
    pub fn from_parts(
        show: Option<&str>,
        season: Option<&str>,
        episode: Option<u32>,
        version: Option<u32>,
        all: bool,
    ) -> Result<Self, LibraryError> {
        let show = show.map(str::trim).filter(|s| !s.is_empty());
        let season = season
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        let Some(show) = show else {
            if season.is_some() || episode.is_some() || version.is_some() {
                return Err(LibraryError::invalid("title is required for this scope"));
            }
            if all {
                return Ok(CatalogScope::All);
            }
            return Err(LibraryError::invalid(
                "no scope given; pass a title or all=true",
            ));
        };
        let show = show.to_string();

        match (episode, version) {
            (None, Some(_)) => Err(LibraryError::invalid("version requires an episode")),
            (None, None) => Ok(match season {
                Some(season) => CatalogScope::Season { show, season },
                None => CatalogScope::Show { show },
            }),
            (Some(episode), None) => Ok(CatalogScope::Episode {
                show,
                season,
                episode,
            }),
            (Some(episode), Some(version)) => Ok(CatalogScope::Version {
                show,
                season,
                episode,
                version,
            }),
        }
    }

    /// The minimal key prefix matching this scope and nothing else.
    ///
    /// | scope   | prefix                                         |
    /// |---------|------------------------------------------------|
    /// | all     | `shows/`                                       |
    /// | show    | `shows/<show>/`                                |
    /// | season  | `shows/<show>/season-<season>/`                |
    /// | episode | `shows/<show>/[season-<season>/]<episode>_v`   |
    /// | version | `shows/<show>/[season-<season>/]<ep>_v<ver>_`  |
    ///
    /// The version prefix leaves the source open. The trailing `_v` and `_`
    /// keep episode 1 from matching episode 12 and version 1 from version 10.
    pub fn prefix(&self) -> Result<String, LibraryError> {
        match self {
            CatalogScope::All => Ok(format!("{}/", ROOT)),
            CatalogScope::Show { show } => directory(show, None),
            CatalogScope::Season { show, season } => directory(show, Some(season)),
            CatalogScope::Episode {
                show,
                season,
                episode,
            } => {
                validate_episode(*episode).map_err(LibraryError::invalid)?;
                Ok(format!(
                    "{}{}_v",
                    directory(show, season.as_deref())?,
                    episode
                ))
            }
            CatalogScope::Version {
                show,
                season,
                episode,
                version,
            } => {
                validate_episode(*episode).map_err(LibraryError::invalid)?;
                if *version == 0 {
                    return Err(LibraryError::invalid("version must be a positive integer"));
                }
                Ok(format!(
                    "{}{}_v{}_",
                    directory(show, season.as_deref())?,
                    episode,
                    version
                ))
            }
        }
    }

    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            CatalogScope::All => "all",
            CatalogScope::Show { .. } => "show",
            CatalogScope::Season { .. } => "season",
            CatalogScope::Episode { .. } => "episode",
            CatalogScope::Version { .. } => "version",
        }
    }
}

impl fmt::Display for CatalogScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogScope::All => write!(f, "entire catalog"),
            CatalogScope::Show { show } => write!(f, "show '{}'", show),
            CatalogScope::Season { show, season } => {
                write!(f, "season '{}' of '{}'", season, show)
            }
            CatalogScope::Episode {
                show,
                season,
                episode,
            } => match season {
                Some(s) => write!(f, "episode {} of '{}' season '{}'", episode, show, s),
                None => write!(f, "episode {} of '{}'", episode, show),
            },
            CatalogScope::Version {
                show,
                season,
                episode,
                version,
            } => match season {
                Some(s) => write!(
                    f,
                    "version {} of episode {} of '{}' season '{}'",
                    version, episode, show, s
                ),
                None => write!(f, "version {} of episode {} of '{}'", version, episode, show),
            },
        }
    }
}
