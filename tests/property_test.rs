//! Property-based tests for the key codec, normalizers and catalog builder.
//!
//! Tests invariants that must hold for all inputs.

use std::collections::HashMap;

use chrono::Utc;
use proptest::prelude::*;
use subvault::catalog::allocator::next_version;
use subvault::catalog::builder::{build_catalog, ShowEntry};
use subvault::catalog::key::{decode, decode_leaf, encode};
use subvault::catalog::slug::{normalise_source, sanitise};
use subvault::core::types::LogicalAddress;
use subvault::storage::ObjectInfo;

fn object(key: String) -> ObjectInfo {
    ObjectInfo {
        key,
        size: 1,
        last_modified: Utc::now(),
        metadata: HashMap::new(),
    }
}

// ============================================================================
// Normalizers
// ============================================================================

proptest! {
    /// Property: sanitizing twice gives the same slug
    #[test]
    fn prop_sanitise_idempotent(text in "\\PC{0,40}") {
        let once = sanitise(&text);
        prop_assert_eq!(sanitise(&once), once.clone());
        prop_assert!(!once.contains('/'));
        prop_assert!(!once.starts_with('-') && !once.ends_with('-'));
        prop_assert!(!once.contains("--"));
    }
}

proptest! {
    /// Property: source normalization is idempotent and path-safe
    #[test]
    fn prop_normalise_source_idempotent(text in "\\PC{0,40}") {
        let once = normalise_source(&text);
        prop_assert_eq!(normalise_source(&once), once.clone());
        prop_assert!(!once.contains('/'));
        prop_assert!(!once.contains('\\'));
    }
}

// ============================================================================
// Key codec
// ============================================================================

proptest! {
    /// Property: any canonical address survives encode then decode
    #[test]
    fn prop_canonical_address_roundtrip(
        show in "[a-z0-9]{1,8}(-[a-z0-9]{1,8}){0,2}",
        season in proptest::option::of("[a-z0-9]{1,6}"),
        episode in 1u32..=u32::MAX,
        version in 1u32..=u32::MAX,
        source in "[A-Za-z0-9._-]{1,12}",
    ) {
        let address = LogicalAddress::episode(show, season, episode)
            .with_version(version)
            .with_source(source);

        let key = encode(&address).unwrap();
        let decoded = decode(key.as_str());
        prop_assert_eq!(decoded, Some(address));
    }
}

proptest! {
    /// Property: keys built from free text always decode to the slugged parts
    #[test]
    fn prop_free_text_keys_decode(
        show in "[A-Za-z][A-Za-z0-9 '!.]{0,20}",
        episode in 1u32..500,
        version in 1u32..50,
        source in "[A-Za-z][A-Za-z0-9 /]{0,12}",
    ) {
        let address = LogicalAddress::episode(show.clone(), None, episode)
            .with_version(version)
            .with_source(source.clone());

        let key = encode(&address).unwrap();
        let decoded = decode(key.as_str()).unwrap();
        prop_assert_eq!(decoded.show, sanitise(&show));
        prop_assert_eq!(decoded.episode, episode);
        prop_assert_eq!(decoded.version, Some(version));
        prop_assert_eq!(decoded.source, Some(normalise_source(&source)));
    }
}

proptest! {
    /// Property: every key that decodes re-encodes to itself
    #[test]
    fn prop_decoded_keys_reencode(
        show in "[A-Za-z0-9 -]{1,10}",
        season in proptest::option::of("[A-Za-z0-9 -]{1,6}"),
        episode in "[0-9]{1,11}",
        version in "[0-9]{1,11}",
        source in "[A-Za-z0-9 ._-]{1,10}",
    ) {
        let key = match &season {
            Some(season) => format!("shows/{}/season-{}/{}_v{}_{}.srt", show, season, episode, version, source),
            None => format!("shows/{}/{}_v{}_{}.srt", show, episode, version, source),
        };
        if let Some(address) = decode(&key) {
            let reencoded = encode(&address);
            prop_assert!(reencoded.is_ok(), "decoded {} but encode failed", key);
            let reencoded = reencoded.unwrap();
            prop_assert_eq!(reencoded.as_str(), key.as_str());
        }
    }
}

proptest! {
    /// Property: decoding arbitrary leaves never panics and never yields zero
    #[test]
    fn prop_decode_leaf_never_panics(leaf in "\\PC{0,40}") {
        if let Some((episode, version, source)) = decode_leaf(&leaf) {
            prop_assert!(episode > 0);
            prop_assert!(version > 0);
            prop_assert!(!source.is_empty());
        }
    }
}

proptest! {
    /// Property: leaves shaped like versioned keys but out of u32 range are rejected
    #[test]
    fn prop_overflowing_numbers_rejected(extra in 0u64..1_000_000) {
        let big = u64::from(u32::MAX) + 1 + extra;
        let leaf = format!("{}_v1_src.srt", big);
        prop_assert!(decode_leaf(&leaf).is_none());
    }
}

// ============================================================================
// Allocation and catalog
// ============================================================================

proptest! {
    /// Property: the next version is strictly above every existing one
    #[test]
    fn prop_next_version_above_existing(existing in proptest::collection::vec(1u32..1000, 0..20)) {
        let next = next_version(existing.iter().copied());
        prop_assert!(existing.iter().all(|v| *v < next));
        if existing.is_empty() {
            prop_assert_eq!(next, 1);
        }
    }
}

proptest! {
    /// Property: junk keys are skipped, valid ones all land in the catalog
    #[test]
    fn prop_catalog_tolerates_junk(
        junk in proptest::collection::vec("\\PC{0,30}", 0..10),
        episodes in proptest::collection::vec((1u32..20, 1u32..5), 1..10),
    ) {
        let mut objects: Vec<ObjectInfo> = junk
            .iter()
            .filter(|k| decode(k).is_none())
            .cloned()
            .map(object)
            .collect();
        let junk_count = objects.len();

        let mut valid = std::collections::BTreeSet::new();
        for (episode, version) in &episodes {
            let key = format!("shows/prop-show/{}_v{}_src.srt", episode, version);
            valid.insert(key.clone());
        }
        objects.extend(valid.iter().cloned().map(object));

        let built = build_catalog(&objects);
        prop_assert_eq!(built.skipped, junk_count);

        let entry = built.catalog.get("prop-show");
        let Some(ShowEntry::Episodes(eps)) = entry else {
            return Err(TestCaseError::fail("expected a season-less show"));
        };
        let total: usize = eps.iter().map(|e| e.versions.len()).sum();
        prop_assert_eq!(total, valid.len());
        prop_assert!(eps.windows(2).all(|w| w[0].episode < w[1].episode));
        for ep in eps {
            prop_assert!(ep.versions.windows(2).all(|w| w[0].version <= w[1].version));
        }
    }
}
