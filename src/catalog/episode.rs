//! Episode numbers recovered from uploaded file names, for uploads that do
//! not state one.

use std::sync::OnceLock;

use regex::Regex;

fn episode_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)(?:^|\D)(\d{1,3})(?:\.srt|$)").expect("episode pattern is a valid regex")
    })
}

/// Derive an episode number from an uploaded file name.
///
/// Only the base name is inspected. The number is the one to three digit run
/// that ends the name or sits right before `.srt`, so `Show.S01E07.srt` gives
/// 7 and `ep12` gives 12. Runs longer than three digits (years, resolutions)
/// never match. Zero is not an episode.
pub fn derive_episode(filename: &str) -> Option<u32> {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    let caps = episode_pattern().captures(base)?;
    let episode: u32 = caps[1].parse().ok()?;
    (episode > 0).then_some(episode)
}
