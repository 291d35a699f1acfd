//! Unified path management for jaby configuration and data files.
//!
//! Platform directories are resolved through `dirs` (XDG on Linux,
//! the usual locations on macOS and Windows).

use std::path::{Path, PathBuf};

const APP_NAME: &str = "jaby";

/// Errors that can occur during path resolution.
#[derive(Debug)]
pub enum PathError {
    /// Home directory could not be determined.
    HomeDirNotFound,
}

impl std::fmt::Display for PathError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathError::HomeDirNotFound => write!(f, "Cannot find home directory"),
        }
    }
}

impl std::error::Error for PathError {}

impl From<PathError> for jaby_core::JabyError {
    fn from(e: PathError) -> Self {
        jaby_core::JabyError::config(e.to_string())
    }
}

/// Unified path management for jaby.
///
/// # Directory Structure
///
/// ```text
/// ~/.config/jaby/              # Config directory
/// ├── config.toml              # Application configuration
/// └── logs/                    # Rolling log files
///
/// ~/.local/share/jaby/         # Data directory (or storage.data_dir)
/// ├── facts/<user>.json        # Persisted facts, one document per user
/// └── context/<user>.json      # Liveness context with expiry
/// ```
pub struct JabyPaths;

impl JabyPaths {
    /// Returns the jaby configuration directory (e.g. `~/.config/jaby/`).
    pub fn config_dir() -> Result<PathBuf, PathError> {
        dirs::config_dir()
            .map(|dir| dir.join(APP_NAME))
            .ok_or(PathError::HomeDirNotFound)
    }

    /// Returns the jaby data directory (e.g. `~/.local/share/jaby/`).
    pub fn data_dir() -> Result<PathBuf, PathError> {
        dirs::data_dir()
            .map(|dir| dir.join(APP_NAME))
            .ok_or(PathError::HomeDirNotFound)
    }

    /// Returns the path to the main configuration file.
    pub fn config_file() -> Result<PathBuf, PathError> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    pub fn logs_dir() -> Result<PathBuf, PathError> {
        Ok(Self::config_dir()?.join("logs"))
    }

    /// Resolves the data directory, honouring an explicit override.
    pub fn resolve_data_dir(overridden: Option<&Path>) -> Result<PathBuf, PathError> {
        match overridden {
            Some(dir) => Ok(dir.to_path_buf()),
            None => Self::data_dir(),
        }
    }

    pub fn facts_dir(data_dir: &Path) -> PathBuf {
        data_dir.join("facts")
    }

    pub fn context_dir(data_dir: &Path) -> PathBuf {
        data_dir.join("context")
    }
}

/// Turns a user id into a safe file stem.
///
/// ASCII alphanumerics, `-` and `_` pass through; every other byte is
/// written as `%XX`, so distinct ids never collide.
pub fn file_stem_for(user_id: &str) -> String {
    let mut stem = String::with_capacity(user_id.len());
    for byte in user_id.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            stem.push(byte as char);
        } else {
            stem.push_str(&format!("%{:02X}", byte));
        }
    }
    if stem.is_empty() {
        stem.push('%');
    }
    stem
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_file_is_under_config_dir() {
        let config_file = JabyPaths::config_file().unwrap();
        assert!(config_file.ends_with("config.toml"));
        assert!(config_file.starts_with(JabyPaths::config_dir().unwrap()));
    }

    #[test]
    fn test_config_dir_ends_with_app_name() {
        assert!(JabyPaths::config_dir().unwrap().ends_with("jaby"));
        assert!(JabyPaths::data_dir().unwrap().ends_with("jaby"));
    }

    #[test]
    fn test_data_dir_override() {
        let dir = JabyPaths::resolve_data_dir(Some(Path::new("/srv/jaby"))).unwrap();
        assert_eq!(dir, PathBuf::from("/srv/jaby"));
        assert_eq!(JabyPaths::facts_dir(&dir), PathBuf::from("/srv/jaby/facts"));
    }

    #[test]
    fn test_file_stem_escapes_path_characters() {
        assert_eq!(file_stem_for("user-42_a"), "user-42_a");
        assert_eq!(file_stem_for("../etc/passwd"), "%2E%2E%2Fetc%2Fpasswd");
        assert_eq!(file_stem_for("a b"), "a%20b");
        assert_ne!(file_stem_for("a/b"), file_stem_for("a_b"));
        assert_eq!(file_stem_for(""), "%");
    }
}
