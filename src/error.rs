//! Error types for the chat relay
//!
//! Defines application-level errors, configuration errors and
//! per-client send errors. Uses thiserror for ergonomic error definitions.

use std::path::PathBuf;

use thiserror::Error;

/// Application-level errors
///
/// Bind failures are fatal at startup. Everything else is resolved by the
/// component that observes it, which logs and carries on.
#[derive(Debug, Error)]
pub enum AppError {
    /// IO error (bind failure, fatal at startup)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Channel send error (a relay task has stopped)
    #[error("Channel send error")]
    ChannelSend,
}

/// Configuration and word-list loading errors
///
/// Callers log these and fall back to defaults.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The JSON content could not be parsed
    #[error("failed to parse config JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Message send errors
///
/// Occurs when a client's outbox cannot accept a message.
#[derive(Debug, Error)]
pub enum SendError {
    /// The connection writer has gone away
    #[error("Channel closed")]
    ChannelClosed,

    /// The outbox is at capacity
    #[error("Outbox full")]
    OutboxFull,
}
