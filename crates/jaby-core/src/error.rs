//! Error types for Jaby.

use thiserror::Error;

/// A shared error type for the whole Jaby workspace.
///
/// Typed, structured variants with `From` conversions for the error types
/// the storage and protocol layers run into.
#[derive(Error, Debug, Clone)]
pub enum JabyError {
    /// IO error (file system operations)
    #[error("IO error: {message}")]
    Io { message: String },

    /// Data access error (repository/storage layer)
    #[error("Data access error: {0}")]
    DataAccess(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {format} - {message}")]
    Serialization {
        format: String, // "TOML", "JSON", etc.
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A rule set could not be compiled into a flow
    #[error("Compilation error: {0}")]
    Compilation(String),

    /// Rule engine operation failed (assert/retract/modify/match)
    #[error("Engine error: {0}")]
    Engine(String),

    /// Malformed inbound protocol event
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl JabyError {
    /// Creates a Config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Creates a DataAccess error
    pub fn data_access(message: impl Into<String>) -> Self {
        Self::DataAccess(message.into())
    }

    /// Creates a Protocol error
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    /// Creates an Internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Check if this is a serialization error
    pub fn is_serialization(&self) -> bool {
        matches!(self, Self::Serialization { .. })
    }

    /// Check if this is a protocol error
    pub fn is_protocol(&self) -> bool {
        matches!(self, Self::Protocol(_))
    }
}

// ============================================================================
// From implementations for automatic conversion
// ============================================================================

impl From<std::io::Error> for JabyError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: format!("{} (kind: {:?})", err, err.kind()),
        }
    }
}

impl From<serde_json::Error> for JabyError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            format: "JSON".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<toml::de::Error> for JabyError {
    fn from(err: toml::de::Error) -> Self {
        Self::Serialization {
            format: "TOML".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<toml::ser::Error> for JabyError {
    fn from(err: toml::ser::Error) -> Self {
        Self::Serialization {
            format: "TOML".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<crate::engine::EngineError> for JabyError {
    fn from(err: crate::engine::EngineError) -> Self {
        use crate::engine::EngineError;

        match err {
            EngineError::Compilation(message) => Self::Compilation(message),
            other => Self::Engine(other.to_string()),
        }
    }
}

/// Conversion from anyhow::Error (infrastructure internals attach context with anyhow)
impl From<anyhow::Error> for JabyError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(format!("{:#}", err))
    }
}

/// Conversion from String (for error messages)
impl From<String> for JabyError {
    fn from(err: String) -> Self {
        Self::Internal(err)
    }
}

/// A type alias for `Result<T, JabyError>`.
pub type Result<T> = std::result::Result<T, JabyError>;
