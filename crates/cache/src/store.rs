//! Result cache store and backend contract
//!
//! [`ResultCache`] implements the read/write policy: derive the key, filter
//! expired entries on read, pick the newest survivor. Backends only persist
//! and enumerate entries. There is no capacity eviction; size management is
//! sweep-based only. No per-key mutual exclusion is taken, so two
//! concurrent identical requests may both miss and both fetch; last write
//! wins.

use crate::entry::CacheEntry;
use crate::keys::cache_key;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gridfeed_core::{OperationId, ParameterMap, Result, ResultRow};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Persistence contract for cached entries.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// All entries stored under the cache key, in insertion order.
    async fn entries(&self, operation_id: &OperationId, key: &str) -> Result<Vec<CacheEntry>>;

    /// Append an entry under the cache key.
    async fn append(&self, operation_id: &OperationId, key: &str, entry: CacheEntry) -> Result<()>;

    /// Drop every expired entry. Returns the number removed.
    async fn sweep(&self, now: DateTime<Utc>) -> Result<usize>;

    /// Remove everything.
    async fn clear(&self) -> Result<()>;
}

/// In-memory backend keyed by the derived cache key.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: RwLock<HashMap<String, Vec<CacheEntry>>>,
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn entries(&self, _operation_id: &OperationId, key: &str) -> Result<Vec<CacheEntry>> {
        Ok(self.entries.read().get(key).cloned().unwrap_or_default())
    }

    async fn append(&self, _operation_id: &OperationId, key: &str, entry: CacheEntry) -> Result<()> {
        self.entries
            .write()
            .entry(key.to_string())
            .or_default()
            .push(entry);
        Ok(())
    }

    async fn sweep(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut map = self.entries.write();
        let mut removed = 0;
        map.retain(|_, entries| {
            let before = entries.len();
            entries.retain(|entry| !entry.is_expired(now));
            removed += before - entries.len();
            !entries.is_empty()
        });
        Ok(removed)
    }

    async fn clear(&self) -> Result<()> {
        self.entries.write().clear();
        Ok(())
    }
}

/// Keyed result cache with TTL semantics.
#[derive(Clone)]
pub struct ResultCache {
    backend: Arc<dyn CacheBackend>,
}

impl ResultCache {
    /// Cache backed by an in-memory map; contents die with the session.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            backend: Arc::new(MemoryBackend::new()),
        }
    }

    #[must_use]
    pub fn with_backend(backend: Arc<dyn CacheBackend>) -> Self {
        Self { backend }
    }

    /// Newest non-expired rows for the operation and parameters, if any.
    /// Expired entries are skipped, never removed here.
    pub async fn get(
        &self,
        operation_id: &OperationId,
        params: &ParameterMap,
    ) -> Result<Option<Vec<ResultRow>>> {
        let key = cache_key(operation_id, params)?;
        let now = Utc::now();
        let entries = self.backend.entries(operation_id, &key).await?;
        Ok(entries
            .into_iter()
            .filter(|entry| !entry.is_expired(now))
            .max_by_key(|entry| entry.created_at)
            .map(|entry| entry.rows))
    }

    /// Store rows under the derived key with the given TTL.
    pub async fn put(
        &self,
        operation_id: &OperationId,
        params: &ParameterMap,
        rows: Vec<ResultRow>,
        ttl: Duration,
    ) -> Result<CacheEntry> {
        let key = cache_key(operation_id, params)?;
        let entry = CacheEntry::new(operation_id.clone(), rows, ttl);
        self.backend.append(operation_id, &key, entry.clone()).await?;
        Ok(entry)
    }

    /// Remove every expired entry from the backend.
    pub async fn sweep_expired(&self) -> Result<usize> {
        self.backend.sweep(Utc::now()).await
    }

    /// Drop all cached results.
    pub async fn clear_all(&self) -> Result<()> {
        self.backend.clear().await
    }
}
