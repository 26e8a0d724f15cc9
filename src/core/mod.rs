pub mod auth;
pub mod config;
pub mod error;
pub mod redact;
pub mod security;
pub mod shutdown;
pub mod types;
