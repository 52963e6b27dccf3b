//! Settings loader
//!
//! Loads [`Settings`] from an optional JSON file, then applies
//! `GRIDFEED_*` environment overrides, then validates. Missing file and
//! missing variables fall back to defaults; a malformed file or an
//! unparseable override is an error rather than a silent default.

use crate::settings::Settings;
use gridfeed_core::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable prefix for overrides.
const ENV_PREFIX: &str = "GRIDFEED_";

/// Builder-style loader for [`Settings`].
pub struct SettingsLoader {
    path: Option<PathBuf>,
    apply_env: bool,
}

impl Default for SettingsLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl SettingsLoader {
    #[must_use]
    pub fn new() -> Self {
        Self {
            path: None,
            apply_env: true,
        }
    }

    /// Set the settings file to load. A missing file is not an error.
    #[must_use]
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Disable `GRIDFEED_*` environment overrides.
    #[must_use]
    pub fn without_env_overrides(mut self) -> Self {
        self.apply_env = false;
        self
    }

    /// Load, override, validate.
    pub async fn load(self) -> Result<Settings> {
        let mut settings = match &self.path {
            Some(path) => Self::read_file(path).await?,
            None => Settings::default(),
        };

        if self.apply_env {
            apply_env_overrides(&mut settings)?;
        }

        settings.validate()?;
        Ok(settings)
    }

    async fn read_file(path: &Path) -> Result<Settings> {
        match tokio::fs::read_to_string(path).await {
            Ok(contents) => serde_json::from_str(&contents).map_err(|e| {
                Error::configuration(format!(
                    "invalid settings file '{}': {e}",
                    path.display()
                ))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("settings file {} not found, using defaults", path.display());
                Ok(Settings::default())
            }
            Err(e) => Err(Error::file_system(path, "read", e)),
        }
    }
}

fn apply_env_overrides(settings: &mut Settings) -> Result<()> {
    override_usize(&mut settings.max_rows_per_query, "MAX_ROWS_PER_QUERY")?;
    override_usize(&mut settings.warn_at_row_count, "WARN_AT_ROW_COUNT")?;
    override_usize(&mut settings.chunk_size, "CHUNK_SIZE")?;
    override_u64(&mut settings.chunk_backoff_ms, "CHUNK_BACKOFF_MS")?;
    override_u64(&mut settings.fetch_timeout_ms, "FETCH_TIMEOUT_MS")?;
    override_usize(&mut settings.max_concurrent_requests, "MAX_CONCURRENT_REQUESTS")?;
    override_bool(
        &mut settings.cleanup_on_partial_failure,
        "CLEANUP_ON_PARTIAL_FAILURE",
    )?;
    override_u64(&mut settings.cache_ttl_ms, "CACHE_TTL_MS")?;
    override_u64(&mut settings.poll_interval_ms, "POLL_INTERVAL_MS")?;

    if let Ok(dir) = std::env::var(format!("{ENV_PREFIX}CACHE_DIRECTORY")) {
        settings.cache_directory = Some(PathBuf::from(dir));
    }
    Ok(())
}

fn override_usize(target: &mut usize, name: &str) -> Result<()> {
    if let Ok(raw) = std::env::var(format!("{ENV_PREFIX}{name}")) {
        *target = raw.parse().map_err(|_| {
            Error::configuration(format!("{ENV_PREFIX}{name} must be an integer, got '{raw}'"))
        })?;
    }
    Ok(())
}

fn override_u64(target: &mut u64, name: &str) -> Result<()> {
    if let Ok(raw) = std::env::var(format!("{ENV_PREFIX}{name}")) {
        *target = raw.parse().map_err(|_| {
            Error::configuration(format!("{ENV_PREFIX}{name} must be an integer, got '{raw}'"))
        })?;
    }
    Ok(())
}

fn override_bool(target: &mut bool, name: &str) -> Result<()> {
    if let Ok(raw) = std::env::var(format!("{ENV_PREFIX}{name}")) {
        *target = match raw.as_str() {
            "1" | "true" | "yes" => true,
            "0" | "false" | "no" => false,
            other => {
                return Err(Error::configuration(format!(
                    "{ENV_PREFIX}{name} must be a boolean, got '{other}'"
                )))
            }
        };
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_falls_back_to_defaults() {
        let settings = SettingsLoader::new()
            .path("/nonexistent/gridfeed-settings.json")
            .without_env_overrides()
            .load()
            .await
            .unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[tokio::test]
    async fn file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        tokio::fs::write(&path, r#"{"chunkSize": 200, "maxConcurrentRequests": 2}"#)
            .await
            .unwrap();

        let settings = SettingsLoader::new()
            .path(&path)
            .without_env_overrides()
            .load()
            .await
            .unwrap();
        assert_eq!(settings.chunk_size, 200);
        assert_eq!(settings.max_concurrent_requests, 2);
        assert_eq!(settings.chunk_backoff_ms, 250);
    }

    #[tokio::test]
    async fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        tokio::fs::write(&path, "{not json").await.unwrap();

        let err = SettingsLoader::new()
            .path(&path)
            .without_env_overrides()
            .load()
            .await
            .unwrap_err();
        assert!(err.to_string().contains("invalid settings file"));
    }
}
