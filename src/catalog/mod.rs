//! Naming and versioning engine: key codec, slugs, version allocation, scope
//! prefixes, catalog reconstruction and bulk deletion.

pub mod allocator;
pub mod builder;
pub mod bulk;
pub mod episode;
pub mod key;
pub mod scope;
pub mod slug;
