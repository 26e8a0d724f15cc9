use std::sync::RwLock;

use tracing::warn;

use super::config::AuthConfig;

/// Bcrypt cost factor for hashing write secrets.
const BCRYPT_COST: u32 = 10;

/// Shared-secret gate for mutating requests (upload, delete).
///
/// Secrets are hashed with bcrypt at startup and on reload; comparison uses
/// `bcrypt::verify`, which is constant-time. Read routes never consult the gate.
#[derive(Debug)]
pub struct WriteGate {
    secret_hashes: RwLock<Vec<String>>,
}

/// Result of checking a presented secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenStatus {
    Valid,
    Missing,
    Forbidden,
}

impl WriteGate {
    pub fn new(config: &AuthConfig) -> Self {
        let gate = Self {
            secret_hashes: RwLock::new(hash_all(&config.write_secrets)),
        };
        if gate.is_open_mode() {
            warn!("no write secrets configured, write gate is open");
        }
        gate
    }

    /// Check a secret taken from the `Authorization: Bearer` header.
    ///
    /// - Missing → `Missing` (401)
    /// - Not matching any configured secret → `Forbidden` (403)
    /// - Open mode (no secrets) → always `Valid`
    pub fn check(&self, secret: Option<&str>) -> TokenStatus {
        let hashes = self.secret_hashes.read().unwrap_or_else(|e| e.into_inner());
        if hashes.is_empty() {
            return TokenStatus::Valid;
        }
        match secret {
            None => TokenStatus::Missing,
            Some(s) if hashes.iter().any(|h| bcrypt::verify(s, h).unwrap_or(false)) => {
                TokenStatus::Valid
            }
            Some(_) => TokenStatus::Forbidden,
        }
    }

    /// Replace the accepted secrets at runtime (SIGHUP reload).
    pub fn update_secrets(&self, secrets: Vec<String>) {
        let hashes = hash_all(&secrets);
        let mut current = self.secret_hashes.write().unwrap_or_else(|e| e.into_inner());
        *current = hashes;
    }

    pub fn is_open_mode(&self) -> bool {
        self.secret_hashes
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_empty()
    }
}

fn hash_all(secrets: &[String]) -> Vec<String> {
    secrets
        .iter()
        .filter(|s| !s.is_empty())
        .filter_map(|s| bcrypt::hash(s, BCRYPT_COST).ok())
        .collect()
}
