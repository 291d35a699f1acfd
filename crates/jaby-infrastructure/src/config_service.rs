//! Configuration service implementation.
//!
//! Loads the root configuration from `config.toml` (by default
//! `~/.config/jaby/config.toml`), writing a default file when none exists.

use crate::paths::JabyPaths;
use jaby_core::config::JabyConfig;
use jaby_core::error::{JabyError, Result};
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

/// Configuration service that loads and caches the root configuration.
#[derive(Debug, Clone)]
pub struct ConfigService {
    path: Option<PathBuf>,
    /// Cached configuration loaded from file.
    config: Arc<RwLock<Option<JabyConfig>>>,
}

impl ConfigService {
    /// Creates a service for the default config location.
    pub fn new() -> Self {
        Self::with_path(None)
    }

    /// Creates a service for an explicit config file, or the default location
    /// when `path` is `None`.
    pub fn with_path(path: Option<PathBuf>) -> Self {
        Self {
            path,
            config: Arc::new(RwLock::new(None)),
        }
    }

    pub fn config_path(&self) -> Result<PathBuf> {
        match &self.path {
            Some(path) => Ok(path.clone()),
            None => Ok(JabyPaths::config_file()?),
        }
    }

    /// Loads the configuration, bypassing and refreshing the cache.
    ///
    /// # Errors
    ///
    /// Fails if the file exists but cannot be read or parsed, or if a missing
    /// file cannot be created.
    pub fn load(&self) -> Result<JabyConfig> {
        let path = self.config_path()?;

        let config = if path.exists() {
            let content = fs::read_to_string(&path)?;
            toml::from_str::<JabyConfig>(&content).map_err(|e| {
                JabyError::config(format!("invalid config file {}: {}", path.display(), e))
            })?
        } else {
            let config = JabyConfig::default();
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, toml::to_string_pretty(&config)?)?;
            tracing::info!(path = %path.display(), "default config written");
            config
        };

        *self.config.write().unwrap_or_else(|e| e.into_inner()) = Some(config.clone());
        Ok(config)
    }

    /// Gets the root configuration, loading from file if not cached.
    ///
    /// Falls back to defaults when the file cannot be loaded.
    pub fn get_config(&self) -> JabyConfig {
        if let Some(cached) = self
            .config
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
        {
            return cached.clone();
        }

        match self.load() {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(error = %e, "failed to load config, using defaults");
                JabyConfig::default()
            }
        }
    }

    /// Invalidates the cache, forcing a reload on next access.
    pub fn invalidate_cache(&self) {
        *self.config.write().unwrap_or_else(|e| e.into_inner()) = None;
    }
}

impl Default for ConfigService {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_writes_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("jaby/config.toml");
        let service = ConfigService::with_path(Some(path.clone()));

        let config = service.load().unwrap();
        assert_eq!(config, JabyConfig::default());
        assert!(path.exists());

        let written: JabyConfig = toml::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written, config);
    }

    #[test]
    fn test_reads_existing_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(&path, "[session]\ngrace_window_secs = 5\n").unwrap();

        let service = ConfigService::with_path(Some(path));
        assert_eq!(service.get_config().session.grace_window_secs, 5);
    }

    #[test]
    fn test_cache_until_invalidated() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(&path, "[context]\nttl_secs = 10\n").unwrap();
        let service = ConfigService::with_path(Some(path.clone()));
        assert_eq!(service.get_config().context.ttl_secs, 10);

        fs::write(&path, "[context]\nttl_secs = 20\n").unwrap();
        assert_eq!(service.get_config().context.ttl_secs, 10);

        service.invalidate_cache();
        assert_eq!(service.get_config().context.ttl_secs, 20);
    }

    #[test]
    fn test_invalid_file_is_config_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(&path, "[session]\ngrace_window_secs = \"soon\"\n").unwrap();

        let service = ConfigService::with_path(Some(path));
        assert!(matches!(service.load(), Err(JabyError::Config(_))));
        assert_eq!(service.get_config(), JabyConfig::default());
    }
}
