//! File-backed cache persistence
//!
//! One JSON file per operation id under the cache directory, each holding a
//! map of cache key to entry list. Unreadable or corrupt files are treated
//! as absent and logged at warn; a damaged cache must never fail a fetch.

use crate::entry::CacheEntry;
use crate::store::CacheBackend;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gridfeed_core::{Error, OperationId, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::warn;

type KeyedEntries = BTreeMap<String, Vec<CacheEntry>>;

/// JSON-file cache backend.
#[derive(Debug, Clone)]
pub struct JsonFileBackend {
    dir: PathBuf,
}

impl JsonFileBackend {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn file_for(&self, operation_id: &OperationId) -> PathBuf {
        let sanitized: String = operation_id
            .as_str()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{sanitized}.json"))
    }

    async fn read_file(path: &Path) -> KeyedEntries {
        match tokio::fs::read(path).await {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!("corrupt cache file {} ignored: {e}", path.display());
                    KeyedEntries::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => KeyedEntries::new(),
            Err(e) => {
                warn!("unreadable cache file {} ignored: {e}", path.display());
                KeyedEntries::new()
            }
        }
    }

    async fn write_file(&self, path: &Path, entries: &KeyedEntries) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| Error::file_system(&self.dir, "create_dir", e))?;
        let bytes = serde_json::to_vec(entries)?;
        tokio::fs::write(path, bytes)
            .await
            .map_err(|e| Error::file_system(path, "write", e))
    }
}

#[async_trait]
impl CacheBackend for JsonFileBackend {
    async fn entries(&self, operation_id: &OperationId, key: &str) -> Result<Vec<CacheEntry>> {
        let file = self.file_for(operation_id);
        let mut keyed = Self::read_file(&file).await;
        Ok(keyed.remove(key).unwrap_or_default())
    }

    async fn append(&self, operation_id: &OperationId, key: &str, entry: CacheEntry) -> Result<()> {
        let file = self.file_for(operation_id);
        let mut keyed = Self::read_file(&file).await;
        keyed.entry(key.to_string()).or_default().push(entry);
        self.write_file(&file, &keyed).await
    }

    async fn sweep(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut removed = 0;
        let mut dir = match tokio::fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(Error::file_system(&self.dir, "read_dir", e)),
        };

        while let Some(item) = dir
            .next_entry()
            .await
            .map_err(|e| Error::file_system(&self.dir, "read_dir", e))?
        {
            let path = item.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }

            let mut keyed = Self::read_file(&path).await;
            let before: usize = keyed.values().map(Vec::len).sum();
            keyed.retain(|_, entries| {
                entries.retain(|entry| !entry.is_expired(now));
                !entries.is_empty()
            });
            let after: usize = keyed.values().map(Vec::len).sum();
            if before == after {
                continue;
            }
            removed += before - after;

            if keyed.is_empty() {
                if let Err(e) = tokio::fs::remove_file(&path).await {
                    warn!("failed to remove swept cache file {}: {e}", path.display());
                }
            } else {
                self.write_file(&path, &keyed).await?;
            }
        }
        Ok(removed)
    }

    async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_dir_all(&self.dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::file_system(&self.dir, "remove_dir", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ResultCache;
    use gridfeed_core::{ParameterMap, ResultRow, Scalar};
    use std::sync::Arc;
    use std::time::Duration;

    fn params() -> ParameterMap {
        [("region".to_string(), Scalar::from("emea"))].into_iter().collect()
    }

    fn row(value: i64) -> ResultRow {
        [("value".to_string(), Scalar::Int(value))].into_iter().collect()
    }

    #[tokio::test]
    async fn entries_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResultCache::with_backend(Arc::new(JsonFileBackend::new(dir.path())));
        let op = OperationId::from("sales-summary");

        cache
            .put(&op, &params(), vec![row(1), row(2)], Duration::from_secs(60))
            .await
            .unwrap();

        // Read through a fresh backend instance to prove persistence.
        let reopened = ResultCache::with_backend(Arc::new(JsonFileBackend::new(dir.path())));
        let hit = reopened.get(&op, &params()).await.unwrap();
        assert_eq!(hit, Some(vec![row(1), row(2)]));
    }

    #[tokio::test]
    async fn corrupt_file_is_treated_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("sales-summary.json"), b"{garbage")
            .await
            .unwrap();

        let cache = ResultCache::with_backend(Arc::new(JsonFileBackend::new(dir.path())));
        let hit = cache
            .get(&OperationId::from("sales-summary"), &params())
            .await
            .unwrap();
        assert!(hit.is_none());
    }

    #[tokio::test]
    async fn sweep_drops_expired_entries_and_empty_files() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(JsonFileBackend::new(dir.path()));
        let cache = ResultCache::with_backend(backend);
        let op = OperationId::from("op");

        cache
            .put(&op, &params(), vec![row(1)], Duration::from_millis(0))
            .await
            .unwrap();

        let removed = cache.sweep_expired().await.unwrap();
        assert_eq!(removed, 1);
        assert!(!dir.path().join("op.json").exists());
    }

    #[tokio::test]
    async fn operation_ids_with_path_characters_are_sanitized() {
        let dir = tempfile::tempdir().unwrap();
        let backend = JsonFileBackend::new(dir.path());
        let file = backend.file_for(&OperationId::from("a/b:c"));
        assert_eq!(file.file_name().unwrap(), "a_b_c.json");
    }
}
