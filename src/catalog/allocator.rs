//! Next-version computation for an episode.
//!
//! Allocation looks only at the versions currently present under the episode
//! prefix. Deleting a middle version never frees its number (the maximum
//! is still present), but once every version of an episode is gone the next
//! upload starts again at 1.

use tracing::debug;

use crate::core::error::StorageError;
use crate::core::types::LogicalAddress;
use crate::storage::ObjectStore;

use super::key::decode;

/// `max(existing) + 1`, or 1 when nothing exists.
pub fn next_version<I>(existing: I) -> u32
where
    I: IntoIterator<Item = u32>,
{
    existing.into_iter().max().map_or(1, |v| v.saturating_add(1))
}

/// Versions present in a listing that decode to the given episode.
///
/// The episode prefix `.../<n>_v` already pins the episode, so the episode
/// check only guards against keys a backend returned that do not match it.
pub fn versions_in<'a, I>(keys: I, episode: u32) -> Vec<u32>
where
    I: IntoIterator<Item = &'a str>,
{
    keys.into_iter()
        .filter_map(|key| match decode(key) {
            Some(LogicalAddress {
                episode: e,
                version: Some(v),
                ..
            }) if e == episode => Some(v),
            Some(_) => None,
            None => {
                debug!(key, "skipping undecodable key during version scan");
                None
            }
        })
        .collect()
}

/// Scan the episode prefix and compute the next version.
pub async fn allocate<S: ObjectStore>(
    store: &S,
    episode_prefix: &str,
    episode: u32,
) -> Result<u32, StorageError> {
    let listing = store.list_objects(episode_prefix).await?;
    let present = versions_in(listing.iter().map(|o| o.key.as_str()), episode);
    Ok(next_version(present))
}
