//! Proxy error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unsupported scheme: {0}")]
    UnsupportedScheme(String),

    /// The origin refused the connection or did not answer in time
    #[error("Network unreachable: {0}")]
    Unreachable(String),
}
