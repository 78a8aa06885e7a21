//! Error types for the keypulse daemon.

use std::io;

/// Errors that can occur in the daemon
#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    /// `start()` was called while the server is already running
    #[error("server already running")]
    AlreadyRunning,

    /// The bind address could not be parsed
    #[error("invalid bind address {addr}: {source}")]
    InvalidAddr {
        addr: String,
        source: std::net::AddrParseError,
    },

    /// The listening socket could not be created, bound, or put to listen
    #[error("failed to bind {addr}: {source}")]
    Bind { addr: String, source: io::Error },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Host telemetry could not be read
    #[error("telemetry sampling failed: {0}")]
    Sample(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DaemonError>;
