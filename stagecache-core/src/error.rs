//! Error types for cache operations

use thiserror::Error;

/// Byte store and envelope errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Byte store {operation} failed: {reason}")]
    Backend { operation: String, reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,

    #[error("Serialization failed: {reason}")]
    Serialization { reason: String },
}

impl StorageError {
    /// Shorthand for a backend failure during `operation`.
    pub fn backend(operation: impl Into<String>, reason: impl ToString) -> Self {
        StorageError::Backend {
            operation: operation.into(),
            reason: reason.to_string(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all cache errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;
