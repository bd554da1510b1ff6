//! Offline cache configuration
//!
//! The configuration is immutable once handed to the manager. Every field
//! has a default matching the kitchen-timer deployment, so an empty TOML
//! table is a valid configuration.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::CoreError;

/// Configuration of the offline cache manager
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfflineConfig {
    /// URL relative asset paths are resolved against (the app root)
    #[serde(default = "default_scope")]
    pub scope: Url,
    /// Full cache mirroring the static assets
    #[serde(default = "default_primary_cache_name")]
    pub primary_cache_name: String,
    /// Static asset cache
    #[serde(default = "default_static_cache_name")]
    pub static_cache_name: String,
    /// Cache populated at runtime from successful fetches
    #[serde(default = "default_dynamic_cache_name")]
    pub dynamic_cache_name: String,
    /// App shell, loaded at install into the primary and static caches
    #[serde(default = "default_static_assets")]
    pub static_assets: Vec<String>,
    /// Subset refreshed into the primary cache by periodic sync
    #[serde(default = "default_critical_assets")]
    pub critical_assets: Vec<String>,
    /// Served when a document request fails at the network
    #[serde(default = "default_offline_document")]
    pub offline_document: String,
    /// Served when an icon request fails at the network
    #[serde(default = "default_fallback_icon")]
    pub fallback_icon: String,
    /// URL substring identifying icon requests
    #[serde(default = "default_icon_marker")]
    pub icon_marker: String,
    /// URL substring identifying application windows
    #[serde(default = "default_client_url_marker")]
    pub client_url_marker: String,
    #[serde(default = "default_sync_tag")]
    pub sync_tag: String,
    #[serde(default = "default_periodic_sync_tag")]
    pub periodic_sync_tag: String,
    /// Version reported to clients
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub notification: NotificationConfig,
}

/// Content of notifications shown on push
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    #[serde(default = "default_notification_title")]
    pub title: String,
    /// Body used when the push carries no payload
    #[serde(default = "default_notification_body")]
    pub default_body: String,
    #[serde(default = "default_notification_icon")]
    pub icon: String,
    #[serde(default = "default_notification_badge")]
    pub badge: String,
    /// Vibration pattern in milliseconds
    #[serde(default = "default_vibrate")]
    pub vibrate: Vec<u32>,
    /// URL attached to the notification data
    #[serde(default = "default_notification_url")]
    pub url: String,
    #[serde(default = "default_open_action")]
    pub open_action: String,
    #[serde(default = "default_open_action_title")]
    pub open_action_title: String,
    #[serde(default = "default_open_action_icon")]
    pub open_action_icon: String,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            title: default_notification_title(),
            default_body: default_notification_body(),
            icon: default_notification_icon(),
            badge: default_notification_badge(),
            vibrate: default_vibrate(),
            url: default_notification_url(),
            open_action: default_open_action(),
            open_action_title: default_open_action_title(),
            open_action_icon: default_open_action_icon(),
        }
    }
}

impl Default for OfflineConfig {
    fn default() -> Self {
        Self {
            scope: default_scope(),
            primary_cache_name: default_primary_cache_name(),
            static_cache_name: default_static_cache_name(),
            dynamic_cache_name: default_dynamic_cache_name(),
            static_assets: default_static_assets(),
            critical_assets: default_critical_assets(),
            offline_document: default_offline_document(),
            fallback_icon: default_fallback_icon(),
            icon_marker: default_icon_marker(),
            client_url_marker: default_client_url_marker(),
            sync_tag: default_sync_tag(),
            periodic_sync_tag: default_periodic_sync_tag(),
            version: default_version(),
            notification: NotificationConfig::default(),
        }
    }
}

impl OfflineConfig {
    /// Default configuration with partition names stamped for another
    /// version: `<app>-v<N>`, `static-v<N>`, `dynamic-v<N>`
    pub fn versioned(app: &str, version: u32) -> Self {
        Self {
            primary_cache_name: format!("{}-v{}", app, version),
            static_cache_name: format!("static-v{}", version),
            dynamic_cache_name: format!("dynamic-v{}", version),
            version: format!("{}.0", version),
            ..Self::default()
        }
    }

    /// Current partitions, in lookup order
    pub fn partition_names(&self) -> [&str; 3] {
        [
            &self.primary_cache_name,
            &self.static_cache_name,
            &self.dynamic_cache_name,
        ]
    }

    /// Whether a partition belongs to the current version
    pub fn is_current_partition(&self, name: &str) -> bool {
        self.partition_names().contains(&name)
    }

    /// Resolve a relative asset path against the scope
    pub fn resolve(&self, asset: &str) -> Result<Url, CoreError> {
        self.scope
            .join(asset)
            .map_err(|e| CoreError::InvalidConfig(format!("cannot resolve {}: {}", asset, e)))
    }

    pub fn static_asset_urls(&self) -> Result<Vec<Url>, CoreError> {
        self.static_assets.iter().map(|a| self.resolve(a)).collect()
    }

    /// Check the configuration before handing it to the manager
    pub fn validate(&self) -> Result<(), CoreError> {
        if !matches!(self.scope.scheme(), "http" | "https") {
            return Err(CoreError::InvalidConfig(format!(
                "scope must be an http(s) URL: {}",
                self.scope
            )));
        }

        let names = self.partition_names();
        if names.iter().any(|n| n.trim().is_empty()) {
            return Err(CoreError::InvalidConfig(
                "cache names must not be empty".to_string(),
            ));
        }
        if names[0] == names[1] || names[0] == names[2] || names[1] == names[2] {
            return Err(CoreError::InvalidConfig(format!(
                "cache names must be distinct: {:?}",
                names
            )));
        }

        if self.icon_marker.is_empty() || self.client_url_marker.is_empty() {
            return Err(CoreError::InvalidConfig(
                "URL markers must not be empty".to_string(),
            ));
        }

        self.static_asset_urls()?;
        for asset in self
            .critical_assets
            .iter()
            .chain([&self.offline_document, &self.fallback_icon])
        {
            self.resolve(asset)?;
        }

        Ok(())
    }
}

// Default value functions
fn default_scope() -> Url {
    Url::parse("http://localhost:8080/").expect("static URL is valid")
}

fn default_primary_cache_name() -> String {
    "minuteur-cuisine-v4".to_string()
}

fn default_static_cache_name() -> String {
    "static-v4".to_string()
}

fn default_dynamic_cache_name() -> String {
    "dynamic-v4".to_string()
}

fn default_static_assets() -> Vec<String> {
    [
        "./",
        "./index.html",
        "./manifest.json",
        "./icon-72.png",
        "./icon-96.png",
        "./icon-128.png",
        "./icon-144.png",
        "./icon-152.png",
        "./icon-192.png",
        "./icon-384.png",
        "./icon-512.png",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_critical_assets() -> Vec<String> {
    ["./", "./index.html", "./manifest.json"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_offline_document() -> String {
    "./index.html".to_string()
}

fn default_fallback_icon() -> String {
    "./icon-192.png".to_string()
}

fn default_icon_marker() -> String {
    "icon-".to_string()
}

fn default_client_url_marker() -> String {
    "minuteur".to_string()
}

fn default_sync_tag() -> String {
    "background-sync".to_string()
}

fn default_periodic_sync_tag() -> String {
    "update-cache".to_string()
}

fn default_version() -> String {
    "4.0".to_string()
}

fn default_notification_title() -> String {
    "Minuteur Cuisine".to_string()
}

fn default_notification_body() -> String {
    "Minuteur terminé !".to_string()
}

fn default_notification_icon() -> String {
    "./icon-192.png".to_string()
}

fn default_notification_badge() -> String {
    "./icon-72.png".to_string()
}

fn default_vibrate() -> Vec<u32> {
    vec![300, 100, 300]
}

fn default_notification_url() -> String {
    "./".to_string()
}

fn default_open_action() -> String {
    "open".to_string()
}

fn default_open_action_title() -> String {
    "Ouvrir l'app".to_string()
}

fn default_open_action_icon() -> String {
    "./icon-72.png".to_string()
}
