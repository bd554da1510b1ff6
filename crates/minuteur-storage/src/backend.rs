//! Cache store trait and the request/response types it persists

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

use crate::error::StorageError;

/// Normalized request identity used as the key of a partition entry
///
/// The method is upper-cased and the URL fragment is dropped, so
/// `get http://host/a#top` and `GET http://host/a` address the same entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey {
    method: String,
    url: String,
}

impl CacheKey {
    /// Create a key for an arbitrary method
    pub fn new(method: &str, url: &Url) -> Self {
        let mut url = url.clone();
        url.set_fragment(None);
        Self {
            method: method.to_ascii_uppercase(),
            url: url.to_string(),
        }
    }

    /// Create a key for a GET request
    pub fn get(url: &Url) -> Self {
        Self::new("GET", url)
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Content digest of the key, used by stores that need a file-safe name
    pub fn digest(&self) -> String {
        compute_sha256(format!("{} {}", self.method, self.url).as_bytes())
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

/// A captured response held in a partition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    pub cached_at: DateTime<Utc>,
}

impl StoredResponse {
    /// Capture a response now
    pub fn new(status: u16, headers: Vec<(String, String)>, body: Bytes) -> Self {
        Self {
            status,
            headers,
            body,
            cached_at: Utc::now(),
        }
    }

    /// Look up a header value, case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Partitioned response store
///
/// A store holds any number of named partitions, each mapping a
/// [`CacheKey`] to a [`StoredResponse`]. Implementations must be safe for
/// concurrent reads and writes from several in-flight requests.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Open a partition, creating it when it does not exist yet
    async fn open(&self, partition: &str) -> Result<(), StorageError>;

    /// Look up an entry. A missing partition is a miss, not an error.
    async fn get(
        &self,
        partition: &str,
        key: &CacheKey,
    ) -> Result<Option<StoredResponse>, StorageError>;

    /// Store an entry, replacing any previous one with the same key
    async fn put(
        &self,
        partition: &str,
        key: CacheKey,
        response: StoredResponse,
    ) -> Result<(), StorageError>;

    /// Store several entries; either all of them land or none do
    async fn put_all(
        &self,
        partition: &str,
        entries: Vec<(CacheKey, StoredResponse)>,
    ) -> Result<(), StorageError>;

    /// Delete one entry. Returns false when there was nothing to delete.
    async fn delete(&self, partition: &str, key: &CacheKey) -> Result<bool, StorageError>;

    /// Delete a whole partition. Returns false when it did not exist.
    async fn delete_partition(&self, partition: &str) -> Result<bool, StorageError>;

    /// Names of all existing partitions
    async fn partitions(&self) -> Result<Vec<String>, StorageError>;

    /// Keys held by a partition
    async fn keys(&self, partition: &str) -> Result<Vec<CacheKey>, StorageError>;
}

/// Reject partition names that cannot be stored
pub fn validate_partition_name(name: &str) -> Result<(), StorageError> {
    if name.trim().is_empty() {
        return Err(StorageError::InvalidPartition(
            "partition name must not be empty".to_string(),
        ));
    }
    if name.chars().any(char::is_control) {
        return Err(StorageError::InvalidPartition(format!(
            "partition name contains control characters: {:?}",
            name
        )));
    }
    Ok(())
}

/// Parse a digest string (e.g., "sha256:abc123...")
pub fn parse_digest(digest: &str) -> Result<(&str, &str), StorageError> {
    match digest.split_once(':') {
        Some((algorithm, hash)) if !algorithm.is_empty() && hash.len() >= 2 => {
            Ok((algorithm, hash))
        }
        _ => Err(StorageError::InvalidDigest(format!(
            "Invalid digest format: {}",
            digest
        ))),
    }
}

/// Compute SHA256 digest of data
pub fn compute_sha256(data: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("sha256:{}", hex::encode(hasher.finalize()))
}
