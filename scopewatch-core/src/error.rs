//! Error types for scopewatch-core

use std::time::Duration;

use thiserror::Error;

/// Main error type for the scopewatch-core library
#[derive(Error, Debug)]
pub enum Error {
    /// State store (SQLite) error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding/decoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// A custom page that cannot be watched (not an absolute http/https URL)
    #[error("invalid page: {0}")]
    InvalidPage(String),

    /// Delivery to the collector process failed
    #[error("delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    /// State store rejected a read or write
    #[error("state store error: {0}")]
    Store(String),

    /// The sync worker is no longer accepting commands
    #[error("sync worker stopped")]
    WorkerStopped,
}

/// Why a single delivery attempt did not produce a matching response.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// The collector process is unknown or could not be started
    #[error("collector unreachable: {0}")]
    Unreachable(String),

    /// The channel closed before a matching response arrived
    #[error("collector disconnected: {0}")]
    Disconnected(String),

    /// No matching response within the configured bound
    #[error("no response within {0:?}")]
    TimedOut(Duration),

    /// A frame could not be encoded or decoded
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Reading from or writing to the channel failed
    #[error("channel IO error: {0}")]
    Io(String),
}

/// Result type alias for scopewatch-core
pub type Result<T> = std::result::Result<T, Error>;
