//! Local disk cache store

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tracing::{debug, error, info, warn};

use crate::backend::{
    CacheKey, CacheStore, StoredResponse, parse_digest, validate_partition_name,
};
use crate::error::StorageError;

/// Metadata written next to each cached body
#[derive(Debug, Serialize, Deserialize)]
struct EntryMeta {
    key: CacheKey,
    status: u16,
    headers: Vec<(String, String)>,
    cached_at: DateTime<Utc>,
    size: u64,
}

/// Local disk cache store
///
/// Partitions live in hex-encoded directories and entries are sharded by
/// the digest of their key:
/// `<base_path>/partitions/<hex(name)>/<algorithm>/<first 2 chars>/<hash>.{json,body}`
pub struct LocalStore {
    base_path: PathBuf,
}

impl LocalStore {
    /// Create a new local store rooted at `base_path`
    pub async fn new(base_path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let base_path = base_path.as_ref().to_path_buf();
        fs::create_dir_all(base_path.join("partitions")).await?;

        info!("Initialized local cache store at {:?}", base_path);

        Ok(Self { base_path })
    }

    fn partitions_root(&self) -> PathBuf {
        self.base_path.join("partitions")
    }

    fn partition_path(&self, partition: &str) -> PathBuf {
        self.partitions_root().join(hex::encode(partition.as_bytes()))
    }

    /// Base path (without extension) of the files for one entry
    fn entry_path(&self, partition: &str, key: &CacheKey) -> Result<PathBuf, StorageError> {
        let digest = key.digest();
        let (algorithm, hash) = parse_digest(&digest)?;

        // Use first 2 characters for sharding
        let shard = &hash[..2];
        Ok(self
            .partition_path(partition)
            .join(algorithm)
            .join(shard)
            .join(hash))
    }

    /// Write both files of an entry under temporary names
    ///
    /// Nothing is visible until the returned files are committed, body
    /// first and metadata last.
    async fn stage_entry(
        &self,
        partition: &str,
        key: &CacheKey,
        response: &StoredResponse,
    ) -> Result<Vec<StagedFile>, StorageError> {
        let path = self.entry_path(partition, key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let meta = EntryMeta {
            key: key.clone(),
            status: response.status,
            headers: response.headers.clone(),
            cached_at: response.cached_at,
            size: response.body.len() as u64,
        };

        let body = StagedFile::write(path.with_extension("body"), &response.body).await?;
        let meta = match serde_json::to_vec(&meta) {
            Ok(data) => StagedFile::write(path.with_extension("json"), &data).await,
            Err(e) => Err(e.into()),
        };
        match meta {
            Ok(meta) => Ok(vec![body, meta]),
            Err(e) => {
                body.discard().await;
                Err(e)
            }
        }
    }

    async fn remove_entry(path: &Path) {
        for ext in ["json", "body"] {
            if let Err(e) = fs::remove_file(path.with_extension(ext)).await
                && e.kind() != std::io::ErrorKind::NotFound
            {
                warn!("Failed to remove {:?}: {}", path.with_extension(ext), e);
            }
        }
    }

    async fn read_meta(path: &Path) -> Result<Option<EntryMeta>, StorageError> {
        match fs::read(path).await {
            Ok(data) => Ok(Some(serde_json::from_slice(&data)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    /// Collect every metadata file below a partition directory
    async fn meta_files(root: &Path) -> Result<Vec<PathBuf>, StorageError> {
        let mut found = Vec::new();
        let mut pending = vec![root.to_path_buf()];

        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(StorageError::Io(e)),
            };

            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                } else if path.extension().is_some_and(|ext| ext == "json") {
                    found.push(path);
                }
            }
        }

        Ok(found)
    }
}

/// A file written next to its target under a temporary name
struct StagedFile {
    temp: PathBuf,
    target: PathBuf,
}

impl StagedFile {
    async fn write(target: PathBuf, data: &[u8]) -> Result<Self, StorageError> {
        static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

        let file_name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let temp = target.with_file_name(format!(
            "{}.{}.tmp",
            file_name,
            TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));

        if let Err(e) = fs::write(&temp, data).await {
            let _ = fs::remove_file(&temp).await;
            return Err(e.into());
        }
        Ok(Self { temp, target })
    }

    /// Move the file into place
    async fn commit(self) -> Result<(), StorageError> {
        if let Err(e) = fs::rename(&self.temp, &self.target).await {
            self.discard().await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn discard(self) {
        if let Err(e) = fs::remove_file(&self.temp).await
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!("Failed to remove {:?}: {}", self.temp, e);
        }
    }
}

/// Commit staged files in order; the ones after a failure are discarded
async fn commit_all(files: Vec<StagedFile>) -> Result<(), StorageError> {
    let mut files = files.into_iter();
    while let Some(file) = files.next() {
        if let Err(e) = file.commit().await {
            for rest in files.by_ref() {
                rest.discard().await;
            }
            return Err(e);
        }
    }
    Ok(())
}

#[async_trait]
impl CacheStore for LocalStore {
    async fn open(&self, partition: &str) -> Result<(), StorageError> {
        validate_partition_name(partition)?;
        fs::create_dir_all(self.partition_path(partition)).await?;
        Ok(())
    }

    async fn get(
        &self,
        partition: &str,
        key: &CacheKey,
    ) -> Result<Option<StoredResponse>, StorageError> {
        let path = self.entry_path(partition, key)?;

        let Some(meta) = Self::read_meta(&path.with_extension("json")).await? else {
            return Ok(None);
        };

        if &meta.key != key {
            return Err(StorageError::Corrupt(format!(
                "entry at {:?} holds {} instead of {}",
                path, meta.key, key
            )));
        }

        let body = match fs::read(path.with_extension("body")).await {
            Ok(data) => Bytes::from(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Cache metadata without body, dropping entry: {}", key);
                Self::remove_entry(&path).await;
                return Ok(None);
            }
            Err(e) => return Err(StorageError::Io(e)),
        };

        debug!("Read {} ({} bytes) from {}", key, body.len(), partition);

        Ok(Some(StoredResponse {
            status: meta.status,
            headers: meta.headers,
            body,
            cached_at: meta.cached_at,
        }))
    }

    async fn put(
        &self,
        partition: &str,
        key: CacheKey,
        response: StoredResponse,
    ) -> Result<(), StorageError> {
        validate_partition_name(partition)?;
        commit_all(self.stage_entry(partition, &key, &response).await?).await?;
        debug!("Stored {} in {}", key, partition);
        Ok(())
    }

    /// Every entry is staged before any of them is moved into place, so a
    /// failed batch leaves the previous entries untouched.
    async fn put_all(
        &self,
        partition: &str,
        entries: Vec<(CacheKey, StoredResponse)>,
    ) -> Result<(), StorageError> {
        validate_partition_name(partition)?;

        let mut staged = Vec::with_capacity(entries.len() * 2);
        for (key, response) in &entries {
            match self.stage_entry(partition, key, response).await {
                Ok(files) => staged.extend(files),
                Err(e) => {
                    warn!(
                        "Bulk store into {} failed at {}, discarding the batch: {}",
                        partition, key, e
                    );
                    for file in staged {
                        file.discard().await;
                    }
                    return Err(e);
                }
            }
        }

        if let Err(e) = commit_all(staged).await {
            error!("Bulk store into {} failed while committing: {}", partition, e);
            return Err(e);
        }

        debug!("Stored {} entries in {}", entries.len(), partition);
        Ok(())
    }

    async fn delete(&self, partition: &str, key: &CacheKey) -> Result<bool, StorageError> {
        let path = self.entry_path(partition, key)?;
        let existed = fs::try_exists(path.with_extension("json")).await?;
        Self::remove_entry(&path).await;
        Ok(existed)
    }

    async fn delete_partition(&self, partition: &str) -> Result<bool, StorageError> {
        let path = self.partition_path(partition);
        debug!("Deleting partition {} at {:?}", partition, path);

        match fs::remove_dir_all(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    async fn partitions(&self) -> Result<Vec<String>, StorageError> {
        let mut names = Vec::new();
        let mut entries = fs::read_dir(self.partitions_root()).await?;

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let dir_name = entry.file_name().to_string_lossy().to_string();
            match hex::decode(&dir_name)
                .ok()
                .and_then(|raw| String::from_utf8(raw).ok())
            {
                Some(name) => names.push(name),
                None => warn!("Ignoring unexpected directory in cache store: {}", dir_name),
            }
        }

        names.sort();
        Ok(names)
    }

    async fn keys(&self, partition: &str) -> Result<Vec<CacheKey>, StorageError> {
        let mut keys = Vec::new();
        for path in Self::meta_files(&self.partition_path(partition)).await? {
            if let Some(meta) = Self::read_meta(&path).await? {
                keys.push(meta.key);
            }
        }
        keys.sort();
        Ok(keys)
    }
}
