//! Core error types for catat-core.
//!
//! Nothing in this core is fatal: invariant collisions are resolved by
//! precedence rules and no-op conditions return without mutation, so the
//! error hierarchy only covers storage, configuration and sync transport.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for catat-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Storage-related errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Sync transport errors
    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic errors with context
    #[error("{0}")]
    Custom(String),
}

/// Storage-specific errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Failed to open database connection
    #[error("Failed to open store at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Schema creation failed
    #[error("Store migration failed: {0}")]
    MigrationFailed(String),

    /// Database is locked
    #[error("Store is locked")]
    Locked,

    /// Record payload could not be decoded
    #[error("Corrupt record {id} in {table}: {message}")]
    CorruptRecord {
        table: String,
        id: String,
        message: String,
    },
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },
}

/// Sync transport errors.
///
/// A sync failure never rolls back a local mutation; affected records simply
/// stay pending and are retried on the next triggering event.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Remote backend unreachable
    #[error("Remote store unavailable")]
    Unavailable,

    /// Remote store reachable but the write was rejected
    #[error("Remote write rejected for {id}: {message}")]
    WriteRejected { id: String, message: String },

    /// Serialization error while encoding a record for transport
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Local store error during push/pull
    #[error("Store error during sync: {0}")]
    Store(#[from] StoreError),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(err, _msg) => {
                if err.code == rusqlite::ErrorCode::DatabaseLocked {
                    StoreError::Locked
                } else {
                    StoreError::QueryFailed(err.to_string())
                }
            }
            _ => StoreError::QueryFailed(err.to_string()),
        }
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
