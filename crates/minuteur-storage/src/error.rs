//! Storage error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid partition name: {0}")]
    InvalidPartition(String),

    #[error("Invalid digest: {0}")]
    InvalidDigest(String),

    #[error("Corrupt cache entry: {0}")]
    Corrupt(String),
}
