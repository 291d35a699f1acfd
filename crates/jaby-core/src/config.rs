//! Root configuration model (`config.toml`).

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct JabyConfig {
    #[serde(default)]
    pub session: SessionSettings,
    #[serde(default)]
    pub context: ContextSettings,
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Session lifecycle settings.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct SessionSettings {
    /// Seconds a session stays resumable after its last connection closes.
    /// Zero retires immediately.
    #[serde(default = "default_grace_window_secs")]
    pub grace_window_secs: u64,
    /// Upper bound on rule firings in one match cycle.
    #[serde(default = "default_max_firings_per_match")]
    pub max_firings_per_match: usize,
}

impl SessionSettings {
    pub fn grace_window(&self) -> Duration {
        Duration::from_secs(self.grace_window_secs)
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            grace_window_secs: default_grace_window_secs(),
            max_firings_per_match: default_max_firings_per_match(),
        }
    }
}

fn default_grace_window_secs() -> u64 {
    30
}

fn default_max_firings_per_match() -> usize {
    crate::engine::DEFAULT_MAX_FIRINGS
}

/// Liveness context settings.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct ContextSettings {
    /// Seconds a stored context snapshot lives before it expires.
    #[serde(default = "default_context_ttl_secs")]
    pub ttl_secs: u64,
}

impl ContextSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self {
            ttl_secs: default_context_ttl_secs(),
        }
    }
}

fn default_context_ttl_secs() -> u64 {
    3600
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct StorageSettings {
    /// Overrides the platform data directory for facts and context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct LoggingSettings {
    /// Filter used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON lines instead of human-readable logs.
    #[serde(default)]
    pub json: bool,
    /// Also write logs to a daily-rotated file at this path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config: JabyConfig = toml::from_str("").unwrap();
        assert_eq!(config, JabyConfig::default());
        assert_eq!(config.session.grace_window(), Duration::from_secs(30));
        assert_eq!(config.context.ttl(), Duration::from_secs(3600));
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config: JabyConfig = toml::from_str(
            r#"
            [session]
            grace_window_secs = 0

            [storage]
            data_dir = "/tmp/jaby"
            "#,
        )
        .unwrap();
        assert_eq!(config.session.grace_window_secs, 0);
        assert_eq!(
            config.session.max_firings_per_match,
            crate::engine::DEFAULT_MAX_FIRINGS
        );
        assert_eq!(config.storage.data_dir, Some(PathBuf::from("/tmp/jaby")));
    }

    #[test]
    fn test_round_trips_through_toml() {
        let config = JabyConfig::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: JabyConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }
}
