//! Time-bounded cache of extracted tables
//!
//! Entries are keyed by a hash of the canonical locator plus any read options
//! that change the extracted content. Each entry records the TTL it was
//! written under; it is served only while `now < cached_at + ttl`, where `ttl`
//! is the smaller of that and the cache's current TTL. Older entries are
//! evicted on lookup.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::{PipelineError, Result};
use crate::table::Table;

/// A cached extraction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub cached_at: DateTime<Utc>,
    pub ttl_secs: u64,
    pub table: Table,
}

/// Storage backend for cache entries
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn load(&self, key: &str) -> Result<Option<CacheEntry>>;
    async fn save(&self, entry: &CacheEntry) -> Result<()>;
    async fn remove(&self, key: &str) -> Result<()>;
}

/// Process-local store, lost when the process exits
#[derive(Debug, Default, Clone)]
pub struct MemoryCache {
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn load(&self, key: &str) -> Result<Option<CacheEntry>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn save(&self, entry: &CacheEntry) -> Result<()> {
        self.entries
            .write()
            .await
            .insert(entry.key.clone(), entry.clone());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

/// One JSON file per entry under a cache directory
#[derive(Debug, Clone)]
pub struct FileCache {
    dir: PathBuf,
}

impl FileCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

#[async_trait]
impl CacheStore for FileCache {
    async fn load(&self, key: &str) -> Result<Option<CacheEntry>> {
        let path = self.entry_path(key);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(PipelineError::Cache(format!(
                    "Failed to read {}: {}",
                    path.display(),
                    e
                )))
            },
        };

        match serde_json::from_slice(&bytes) {
            Ok(entry) => Ok(Some(entry)),
            Err(e) => {
                // A corrupt entry is a miss, never a run failure
                warn!(path = %path.display(), error = %e, "Discarding unreadable cache entry");
                Ok(None)
            },
        }
    }

    async fn save(&self, entry: &CacheEntry) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| PipelineError::Cache(format!("Failed to create cache directory: {}", e)))?;

        let bytes = serde_json::to_vec(entry)
            .map_err(|e| PipelineError::Cache(format!("Failed to serialize entry: {}", e)))?;

        // Write then rename so readers never observe a partial file
        let path = self.entry_path(&entry.key);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| PipelineError::Cache(format!("Failed to write {}: {}", tmp.display(), e)))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| PipelineError::Cache(format!("Failed to move {}: {}", path.display(), e)))?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        match tokio::fs::remove_file(self.entry_path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PipelineError::Cache(format!("Failed to remove entry: {}", e))),
        }
    }
}

/// TTL policy over a [`CacheStore`]
#[derive(Clone)]
pub struct TableCache {
    store: Arc<dyn CacheStore>,
    ttl: Duration,
}

impl std::fmt::Debug for TableCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableCache").field("ttl", &self.ttl).finish()
    }
}

impl TableCache {
    pub fn new(store: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub fn in_memory(ttl: Duration) -> Self {
        Self::new(Arc::new(MemoryCache::new()), ttl)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Fresh entry for `key`, if any
    pub async fn get(&self, key: &str) -> Result<Option<Table>> {
        self.get_at(key, Utc::now()).await
    }

    /// Lookup evaluated at an explicit instant
    pub async fn get_at(&self, key: &str, now: DateTime<Utc>) -> Result<Option<Table>> {
        let Some(entry) = self.store.load(key).await? else {
            return Ok(None);
        };

        if self.is_fresh(&entry, now) {
            debug!(key = %key, cached_at = %entry.cached_at, "Cache hit");
            return Ok(Some(entry.table));
        }

        debug!(key = %key, cached_at = %entry.cached_at, "Cache entry expired");
        self.store.remove(key).await?;
        Ok(None)
    }

    pub async fn put(&self, key: &str, table: &Table) -> Result<()> {
        self.put_at(key, table, Utc::now()).await
    }

    pub async fn put_at(&self, key: &str, table: &Table, cached_at: DateTime<Utc>) -> Result<()> {
        let entry = CacheEntry {
            key: key.to_string(),
            cached_at,
            ttl_secs: self.ttl.as_secs(),
            table: table.clone(),
        };
        self.store.save(&entry).await
    }

    fn is_fresh(&self, entry: &CacheEntry, now: DateTime<Utc>) -> bool {
        let ttl = Duration::from_secs(entry.ttl_secs).min(self.ttl);
        match chrono::Duration::from_std(ttl) {
            Ok(ttl) => entry
                .cached_at
                .checked_add_signed(ttl)
                .map(|expires| now < expires)
                .unwrap_or(true),
            // TTL too large to represent never expires
            Err(_) => true,
        }
    }
}
