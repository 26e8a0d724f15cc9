use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub auth: AuthConfig,
    pub upload: UploadConfig,
    pub delivery: DeliveryConfig,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// `memory` or `s3`.
    pub backend: String,
    pub endpoint: String,
    pub bucket: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub region: String,
    #[serde(default)]
    pub path_style: bool,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Upload subtitle objects with public-read visibility.
    #[serde(default)]
    pub public_objects: bool,
}

fn default_request_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Shared secrets accepted by the write gate. Empty means open mode.
    pub write_secrets: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    pub max_upload_size_bytes: u64,
    pub max_archive_entries: usize,
    pub max_entry_size_bytes: u64,
    pub default_source: String,
    pub content_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    pub cors_allowed_origins: Vec<String>,
    pub cache_control: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub log_format: String,
    pub metrics_enabled: bool,
}

impl AppConfig {
    /// Load configuration with layered overrides:
    /// 1. config/default.toml
    /// 2. config/{env}.toml (based on SUBVAULT_ENV), merged key by key
    /// 3. Environment variables (SUBVAULT_* prefix)
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from_dir(Path::new("config"))
    }

    pub fn load_from_dir(dir: &Path) -> anyhow::Result<Self> {
        let default_path = dir.join("default.toml");
        let default_content = std::fs::read_to_string(&default_path)
            .map_err(|e| anyhow::anyhow!("failed to read {}: {}", default_path.display(), e))?;

        let mut table: toml::Table = toml::from_str(&default_content)
            .map_err(|e| anyhow::anyhow!("failed to parse {}: {}", default_path.display(), e))?;

        // Layer 2: environment-specific overrides
        let env_name = std::env::var("SUBVAULT_ENV").unwrap_or_else(|_| "development".to_string());
        let env_path = dir.join(format!("{}.toml", env_name));
        if let Ok(env_content) = std::fs::read_to_string(&env_path) {
            let env_table: toml::Table = toml::from_str(&env_content)
                .map_err(|e| anyhow::anyhow!("failed to parse {}: {}", env_path.display(), e))?;
            merge_tables(&mut table, env_table);
        }

        let mut config: AppConfig = toml::Value::Table(table)
            .try_into()
            .map_err(|e| anyhow::anyhow!("invalid configuration: {}", e))?;

        // Layer 3: environment variable overrides (selected keys)
        Self::apply_env_overrides(&mut config);

        Ok(config)
    }

    fn apply_env_overrides(config: &mut AppConfig) {
        if let Ok(v) = std::env::var("SUBVAULT_SERVER_HOST") {
            config.server.host = v;
        }
        if let Ok(v) = std::env::var("SUBVAULT_SERVER_PORT") {
            if let Ok(port) = v.parse() {
                config.server.port = port;
            }
        }
        if let Ok(v) = std::env::var("SUBVAULT_STORAGE_BACKEND") {
            config.storage.backend = v;
        }
        if let Ok(v) = std::env::var("SUBVAULT_STORAGE_ENDPOINT") {
            config.storage.endpoint = v;
        }
        if let Ok(v) = std::env::var("SUBVAULT_STORAGE_BUCKET") {
            config.storage.bucket = v;
        }
        if let Ok(v) = std::env::var("SUBVAULT_STORAGE_ACCESS_KEY_ID") {
            config.storage.access_key_id = v;
        }
        if let Ok(v) = std::env::var("SUBVAULT_STORAGE_SECRET_ACCESS_KEY") {
            config.storage.secret_access_key = v;
        }
        if let Ok(v) = std::env::var("SUBVAULT_STORAGE_REGION") {
            config.storage.region = v;
        }
        if let Ok(v) = std::env::var("SUBVAULT_AUTH_WRITE_SECRETS") {
            config.auth.write_secrets = split_list(&v);
        }
        if let Ok(v) = std::env::var("SUBVAULT_OBSERVABILITY_LOG_LEVEL") {
            config.observability.log_level = v;
        }
    }
}

/// Recursively merge `overlay` into `base`. Nested tables merge; any other
/// value in `overlay` replaces the one in `base`.
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        if let toml::Value::Table(incoming) = value {
            if let Some(toml::Value::Table(existing)) = base.get_mut(&key) {
                merge_tables(existing, incoming);
                continue;
            }
            base.insert(key, toml::Value::Table(incoming));
        } else {
            base.insert(key, value);
        }
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            storage: StorageConfig {
                backend: "memory".to_string(),
                endpoint: "http://localhost:9000".to_string(),
                bucket: "subtitles".to_string(),
                access_key_id: String::new(),
                secret_access_key: String::new(),
                region: "us-east-1".to_string(),
                path_style: true,
                request_timeout_secs: 30,
                public_objects: false,
            },
            auth: AuthConfig {
                write_secrets: Vec::new(),
            },
            upload: UploadConfig {
                max_upload_size_bytes: 52_428_800, // 50 MB
                max_archive_entries: 500,
                max_entry_size_bytes: 5_242_880, // 5 MB
                default_source: "unknown".to_string(),
                content_type: "application/x-subrip".to_string(),
            },
            delivery: DeliveryConfig {
                cors_allowed_origins: vec!["*".to_string()],
                cache_control: "no-cache".to_string(),
            },
            observability: ObservabilityConfig {
                log_level: "info".to_string(),
                log_format: "json".to_string(),
                metrics_enabled: true,
            },
        }
    }
}
