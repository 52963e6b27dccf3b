use gridfeed_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Immutable pipeline settings.
///
/// Knobs are consumed verbatim by the components they configure; this struct
/// does not interpret them beyond range validation. `Clone + Send + Sync`
/// for safe sharing across async tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    /// Hard cap on rows returned per operation; 0 disables the cap.
    pub max_rows_per_query: usize,

    /// Soft threshold that logs a warning without truncating. Only
    /// consulted when `max_rows_per_query` is 0.
    pub warn_at_row_count: usize,

    /// Rows written to the host per chunk on the overwrite path.
    pub chunk_size: usize,

    /// Pause between consecutive chunk writes, milliseconds.
    pub chunk_backoff_ms: u64,

    /// Deadline for a single logical fetch, milliseconds.
    pub fetch_timeout_ms: u64,

    /// Process-wide bound on concurrently executing fetches.
    pub max_concurrent_requests: usize,

    /// Clear the data body of a partially-written table when a chunk fails.
    pub cleanup_on_partial_failure: bool,

    /// Default TTL for cached results, milliseconds. Individual operations
    /// can override this via their catalog definition.
    pub cache_ttl_ms: u64,

    /// Directory for the file-backed result cache; `None` keeps the cache
    /// in memory only.
    pub cache_directory: Option<PathBuf>,

    /// Interval between statement status polls, milliseconds.
    pub poll_interval_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_rows_per_query: 0,
            warn_at_row_count: 100_000,
            chunk_size: 1_000,
            chunk_backoff_ms: 250,
            fetch_timeout_ms: 30_000,
            max_concurrent_requests: 4,
            cleanup_on_partial_failure: false,
            cache_ttl_ms: 300_000,
            cache_directory: None,
            poll_interval_ms: 1_000,
        }
    }
}

impl Settings {
    #[must_use]
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    #[must_use]
    pub fn chunk_backoff(&self) -> Duration {
        Duration::from_millis(self.chunk_backoff_ms)
    }

    #[must_use]
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Validate knob ranges. Zero means "disabled" only where documented;
    /// structural knobs must be positive.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::configuration("chunkSize must be greater than 0"));
        }
        if self.max_concurrent_requests == 0 {
            return Err(Error::configuration(
                "maxConcurrentRequests must be greater than 0",
            ));
        }
        if self.fetch_timeout_ms == 0 {
            return Err(Error::configuration("fetchTimeoutMs must be greater than 0"));
        }
        if self.poll_interval_ms == 0 {
            return Err(Error::configuration("pollIntervalMs must be greater than 0"));
        }
        Ok(())
    }
}
