//! Error types for alertengine

use thiserror::Error;

/// Result type alias using alertengine's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for alerting operations
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid channel configuration or command input
    #[error("Validation error: {0}")]
    Validation(String),

    /// State write rejected because the alert is paused
    #[error("Cannot change state on paused alert {0}")]
    PausedAlert(i64),

    /// Not found error
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Outbound notification failed
    #[error("Delivery to {target} failed: {reason}")]
    Delivery { target: String, reason: String },

    /// Storage unavailable or write failed
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Create a not found error
    pub fn not_found(entity: impl Into<String>, id: impl ToString) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a delivery error
    pub fn delivery(target: impl Into<String>, reason: impl ToString) -> Self {
        Self::Delivery {
            target: target.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether the error was caused by the pause gate
    pub fn is_paused(&self) -> bool {
        matches!(self, Self::PausedAlert(_))
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}
