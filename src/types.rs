//! Basic type definitions for the chat relay
//!
//! Provides newtype wrappers and shared constants:
//! - `ClientId`: UUID-based identifier for a single connection
//! - queue capacities shared by the acceptor, dispatcher and broadcaster

use uuid::Uuid;

/// Capacity of every cross-task queue (new-connection, content, broadcast)
pub const QUEUE_CAPACITY: usize = 10_000;

/// Capacity of a single client's outbound message queue
pub const OUTBOX_CAPACITY: usize = 256;

/// Maximum number of bytes read from a socket per receive
pub const READ_BUFFER_SIZE: usize = 128;

/// Unique connection identifier (newtype pattern)
///
/// Wraps a UUID v4. A client is known by this id from the moment it
/// connects, long before it has claimed a display name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(pub Uuid);

impl ClientId {
    /// Create a new random client ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
