pub mod catalog;
pub mod core;
pub mod delivery;
pub mod library;
pub mod observability;
pub mod storage;
