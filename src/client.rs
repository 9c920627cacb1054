//! Client struct definition
//!
//! Represents a connected client with its session state and the outbox
//! used to write to its connection.

use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::error::SendError;
use crate::types::ClientId;

/// Handle for writing text to one client's connection
///
/// Cloneable; the connection writer task owns the receiving end and the
/// socket's write half.
#[derive(Debug, Clone)]
pub struct Outbox {
    sender: mpsc::Sender<String>,
}

impl Outbox {
    /// Wrap the sending end of a client's outbound queue
    pub fn new(sender: mpsc::Sender<String>) -> Self {
        Self { sender }
    }

    /// Queue text without waiting
    ///
    /// Every write goes through here, so a client that stops reading
    /// loses messages instead of stalling the task writing to it.
    pub fn try_send(&self, text: impl Into<String>) -> Result<(), SendError> {
        self.sender.try_send(text.into()).map_err(|e| match e {
            TrySendError::Full(_) => SendError::OutboxFull,
            TrySendError::Closed(_) => SendError::ChannelClosed,
        })
    }
}

/// Connected client information
///
/// Owned by the Dispatcher. Created when a connection is handed off and
/// never dropped once a name has been claimed, so `/stats` keeps working
/// after the client leaves.
#[derive(Debug)]
pub struct Client {
    /// Unique identifier for this connection
    pub id: ClientId,
    /// Display name (None until the handshake completes)
    pub name: Option<String>,
    /// Server → Client text channel
    pub outbox: Outbox,
    /// Whether the connection is still open
    pub online: bool,
    /// When the connection was accepted
    pub connected_at: Instant,
    /// When the connection ended
    pub disconnected_at: Option<Instant>,
}

impl Client {
    /// Create a new online client awaiting its name
    ///
    /// `connected_at` is when the Acceptor accepted the connection.
    pub fn new(id: ClientId, outbox: Outbox, connected_at: Instant) -> Self {
        Self {
            id,
            name: None,
            outbox,
            online: true,
            connected_at,
            disconnected_at: None,
        }
    }

    /// Send text to this client only
    ///
    /// Returns an error if the outbox is full or the writer has gone away.
    pub fn reply(&self, text: impl Into<String>) -> Result<(), SendError> {
        self.outbox.try_send(text)
    }

    /// True until the first accepted name
    pub fn awaiting_name(&self) -> bool {
        self.name.is_none()
    }

    /// Get the display name for this client
    ///
    /// Returns the claimed name if set, otherwise an empty string.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("")
    }

    /// Complete the handshake with the given name
    pub fn set_name(&mut self, name: String) {
        self.name = Some(name);
    }

    /// Record the end of the session
    ///
    /// Only the first call has any effect.
    pub fn mark_offline(&mut self, at: Instant) {
        if !self.online {
            return;
        }
        self.online = false;
        self.disconnected_at = Some(at);
    }

    /// Session length as of `now`
    ///
    /// Grows while online; frozen at `disconnected_at - connected_at` after.
    pub fn session_duration(&self, now: Instant) -> Duration {
        match (self.online, self.disconnected_at) {
            (false, Some(at)) => at.saturating_duration_since(self.connected_at),
            _ => now.saturating_duration_since(self.connected_at),
        }
    }
}
