//! Core error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Storage error: {0}")]
    Storage(#[from] minuteur_storage::StorageError),

    #[error("Network error: {0}")]
    Proxy(#[from] minuteur_proxy::ProxyError),

    #[error("Asset unavailable: {url} returned {status}")]
    AssetUnavailable { url: String, status: u16 },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
