//! In-memory cache store

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use crate::backend::{CacheKey, CacheStore, StoredResponse, validate_partition_name};
use crate::error::StorageError;

type Partition = HashMap<CacheKey, StoredResponse>;

/// Cache store kept entirely in process memory
///
/// Used by tests and by hosts that do not need the cache to outlive the
/// process.
#[derive(Default)]
pub struct MemoryStore {
    partitions: RwLock<BTreeMap<String, Partition>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries in a partition (0 when it does not exist)
    pub fn len(&self, partition: &str) -> usize {
        self.partitions
            .read()
            .get(partition)
            .map(HashMap::len)
            .unwrap_or(0)
    }

    pub fn is_empty(&self, partition: &str) -> bool {
        self.len(partition) == 0
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn open(&self, partition: &str) -> Result<(), StorageError> {
        validate_partition_name(partition)?;
        self.partitions
            .write()
            .entry(partition.to_string())
            .or_default();
        Ok(())
    }

    async fn get(
        &self,
        partition: &str,
        key: &CacheKey,
    ) -> Result<Option<StoredResponse>, StorageError> {
        Ok(self
            .partitions
            .read()
            .get(partition)
            .and_then(|entries| entries.get(key))
            .cloned())
    }

    async fn put(
        &self,
        partition: &str,
        key: CacheKey,
        response: StoredResponse,
    ) -> Result<(), StorageError> {
        validate_partition_name(partition)?;
        debug!("Storing {} in {}", key, partition);
        self.partitions
            .write()
            .entry(partition.to_string())
            .or_default()
            .insert(key, response);
        Ok(())
    }

    async fn put_all(
        &self,
        partition: &str,
        entries: Vec<(CacheKey, StoredResponse)>,
    ) -> Result<(), StorageError> {
        validate_partition_name(partition)?;
        debug!("Storing {} entries in {}", entries.len(), partition);
        // A single write guard makes the batch atomic for readers
        let mut partitions = self.partitions.write();
        let target = partitions.entry(partition.to_string()).or_default();
        target.extend(entries);
        Ok(())
    }

    async fn delete(&self, partition: &str, key: &CacheKey) -> Result<bool, StorageError> {
        Ok(self
            .partitions
            .write()
            .get_mut(partition)
            .is_some_and(|entries| entries.remove(key).is_some()))
    }

    async fn delete_partition(&self, partition: &str) -> Result<bool, StorageError> {
        Ok(self.partitions.write().remove(partition).is_some())
    }

    async fn partitions(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.partitions.read().keys().cloned().collect())
    }

    async fn keys(&self, partition: &str) -> Result<Vec<CacheKey>, StorageError> {
        let mut keys: Vec<CacheKey> = self
            .partitions
            .read()
            .get(partition)
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use url::Url;

    fn key(path: &str) -> CacheKey {
        CacheKey::get(&Url::parse("http://localhost:8080/").unwrap().join(path).unwrap())
    }

    fn response(body: &'static str) -> StoredResponse {
        StoredResponse::new(200, vec![], Bytes::from_static(body.as_bytes()))
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let store = MemoryStore::new();
        store.put("static-v4", key("index.html"), response("shell")).await.unwrap();

        let hit = store.get("static-v4", &key("index.html")).await.unwrap().unwrap();
        assert_eq!(hit.body, Bytes::from_static(b"shell"));

        assert!(store.get("static-v4", &key("other.html")).await.unwrap().is_none());
        assert!(store.get("dynamic-v4", &key("index.html")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_open_creates_empty_partition() {
        let store = MemoryStore::new();
        store.open("dynamic-v4").await.unwrap();
        assert_eq!(store.partitions().await.unwrap(), vec!["dynamic-v4"]);
        assert!(store.is_empty("dynamic-v4"));
        assert!(store.open("").await.is_err());
    }

    #[tokio::test]
    async fn test_put_all_and_keys() {
        let store = MemoryStore::new();
        store
            .put_all(
                "primary",
                vec![(key("b.png"), response("b")), (key("a.png"), response("a"))],
            )
            .await
            .unwrap();

        let keys = store.keys("primary").await.unwrap();
        assert_eq!(keys, vec![key("a.png"), key("b.png")]);
        assert_eq!(store.len("primary"), 2);
    }

    #[tokio::test]
    async fn test_delete_entry() {
        let store = MemoryStore::new();
        store.put("static-v4", key("index.html"), response("shell")).await.unwrap();

        assert!(store.delete("static-v4", &key("index.html")).await.unwrap());
        assert!(!store.delete("static-v4", &key("index.html")).await.unwrap());
        assert!(!store.delete("dynamic-v4", &key("index.html")).await.unwrap());
        assert!(store.is_empty("static-v4"));
    }

    #[tokio::test]
    async fn test_delete_partition() {
        let store = MemoryStore::new();
        store.put("static-v3", key("index.html"), response("old")).await.unwrap();

        assert!(store.delete_partition("static-v3").await.unwrap());
        assert!(!store.delete_partition("static-v3").await.unwrap());
        assert!(store.partitions().await.unwrap().is_empty());
    }
}
