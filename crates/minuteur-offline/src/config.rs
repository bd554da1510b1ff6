//! Configuration loading

use anyhow::{Context, Result};
use minuteur_core::OfflineConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;
use url::Url;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub origin: OriginConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    /// Offline cache settings; the scope is taken from `[origin]`
    #[serde(default)]
    pub offline: OfflineConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

/// Origin serving the application
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OriginConfig {
    /// Application root, e.g. `http://localhost:8080/minuteur/`
    #[serde(default = "default_origin_url")]
    pub url: Url,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub skip_tls_verify: bool,
}

impl Default for OriginConfig {
    fn default() -> Self {
        Self {
            url: default_origin_url(),
            username: None,
            password: None,
            skip_tls_verify: false,
        }
    }
}

/// Where cache partitions are kept
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackendKind {
    /// Process memory; the cache is lost on restart
    Memory,
    #[default]
    Local,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackendKind,
    #[serde(default)]
    pub local: LocalStorageConfig,
}

/// Local storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalStorageConfig {
    #[serde(default = "default_local_path")]
    pub path: String,
}

impl Default for LocalStorageConfig {
    fn default() -> Self {
        Self {
            path: default_local_path(),
        }
    }
}

/// Periodic refresh of the critical assets
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshConfig {
    #[serde(default = "default_refresh_enabled")]
    pub enabled: bool,
    #[serde(default = "default_refresh_interval_hours")]
    pub interval_hours: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            enabled: default_refresh_enabled(),
            interval_hours: default_refresh_interval_hours(),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::Pretty,
        }
    }
}

// Default value functions
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_origin_url() -> Url {
    OfflineConfig::default().scope
}

fn default_local_path() -> String {
    "./data/offline-cache".to_string()
}

fn default_refresh_enabled() -> bool {
    true
}

fn default_refresh_interval_hours() -> u64 {
    24
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &str) -> Result<Self> {
        let config_path = Path::new(path);

        if !config_path.exists() {
            info!("Config file not found at {}, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path))?;

        info!("Loaded configuration from {}", path);
        Ok(config)
    }

    /// Offline cache configuration scoped to the configured origin
    pub fn offline_config(&self) -> OfflineConfig {
        OfflineConfig {
            scope: self.origin.url.clone(),
            ..self.offline.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = Config::load("/nonexistent/minuteur.toml").unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.storage.backend, StorageBackendKind::Local);
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert!(config.refresh.enabled);
        assert_eq!(config.offline.primary_cache_name, "minuteur-cuisine-v4");
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[server]
port = 8081

[origin]
url = "https://timer.example.org/app/"

[storage]
backend = "memory"

[offline]
static_cache_name = "static-v5"
critical_assets = ["./index.html"]

[offline.notification]
title = "Kitchen Timer"

[logging]
format = "json"
"#
        )
        .unwrap();

        let config = Config::load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.server.port, 8081);
        assert_eq!(config.server.bind_address, "0.0.0.0");
        assert_eq!(config.storage.backend, StorageBackendKind::Memory);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.logging.level, "info");

        let offline = config.offline_config();
        assert_eq!(offline.scope.as_str(), "https://timer.example.org/app/");
        assert_eq!(offline.static_cache_name, "static-v5");
        assert_eq!(offline.primary_cache_name, "minuteur-cuisine-v4");
        assert_eq!(offline.critical_assets, vec!["./index.html"]);
        assert_eq!(offline.notification.title, "Kitchen Timer");
        assert_eq!(offline.notification.default_body, "Minuteur terminé !");
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[storage]\nbackend = \"s3\"\n").unwrap();
        assert!(Config::load(file.path().to_str().unwrap()).is_err());
    }
}
