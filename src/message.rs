//! Message protocol definitions
//!
//! The wire protocol is plain text with no framing. `ServerMessage`
//! renders every server → client literal; `SessionEvent` and
//! `BroadcastEvent` are the payloads of the internal queues.

use std::fmt;
use std::time::{Duration, Instant};

use tokio::net::TcpStream;

use crate::client::Outbox;
use crate::types::ClientId;

/// Server → Client message
///
/// `Display` produces the exact bytes written to the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// Requested display name is already registered
    NameTaken,
    /// A client completed the handshake
    Joined { name: String },
    /// A chat line from an active client
    Chat { name: String, content: String },
    /// A registered client closed its connection
    Left { name: String },
    /// Recent chat lines replayed to a newly joined client
    Replay { lines: Vec<String> },
    /// Reply to `/stats <name>`
    SessionLength(Duration),
}

impl fmt::Display for ServerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerMessage::NameTaken => f.write_str("this name is already in use"),
            ServerMessage::Joined { name } => write!(f, "[{}] entered the chat room", name),
            ServerMessage::Chat { name, content } => write!(f, "[{}] said: {}", name, content),
            ServerMessage::Left { name } => write!(f, "{} left the chat room", name),
            ServerMessage::Replay { lines } => {
                for line in lines {
                    writeln!(f, "{}", line)?;
                }
                Ok(())
            }
            ServerMessage::SessionLength(duration) => f.write_str(&format_duration(*duration)),
        }
    }
}

/// Acceptor → Dispatcher hand-off (the new-connection queue)
#[derive(Debug)]
pub struct NewConnection {
    /// The greeted connection
    pub stream: TcpStream,
    /// When the listener accepted it; the start of the session
    pub accepted_at: Instant,
}

/// Session Reader → Dispatcher event (the content queue)
#[derive(Debug)]
pub enum SessionEvent {
    /// One receive worth of text from a client
    Content { client_id: ClientId, content: String },
    /// The client's stream ended; `clean` is true for an orderly close
    Closed {
        client_id: ClientId,
        clean: bool,
        at: Instant,
    },
}

/// Dispatcher → Broadcaster event (the broadcast queue)
///
/// Roster changes travel on the same queue as the messages that depend
/// on them, so the Broadcaster sees them in the Dispatcher's order.
#[derive(Debug)]
pub enum BroadcastEvent {
    /// A client claimed `name` and may now receive fan-out
    Enroll { name: String, outbox: Outbox },
    /// The client holding `name` is no longer online
    Offline { name: String },
    /// Deliver `content` to every online client except `sender`
    Message { content: String, sender: String },
}

/// Format a duration the way Go's `time.Duration` prints
///
/// Whole durations of a second or more print as `1h2m3.5s`; shorter ones
/// use the largest fitting unit (`250ms`, `1.5µs`, `40ns`). Zero is `0s`.
pub fn format_duration(duration: Duration) -> String {
    let nanos = duration.as_nanos();
    if nanos == 0 {
        return "0s".to_string();
    }

    if nanos < 1_000 {
        return format!("{}ns", nanos);
    }
    if nanos < 1_000_000 {
        return format!("{}µs", fraction(nanos, 1_000));
    }
    if nanos < 1_000_000_000 {
        return format!("{}ms", fraction(nanos, 1_000_000));
    }

    let total_secs = nanos / 1_000_000_000;
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = fraction(nanos % 60_000_000_000, 1_000_000_000);

    let mut out = String::new();
    if hours > 0 {
        out.push_str(&format!("{}h", hours));
    }
    if hours > 0 || minutes > 0 {
        out.push_str(&format!("{}m", minutes));
    }
    out.push_str(&seconds);
    out.push('s');
    out
}

/// Render `value / unit` with trailing fractional zeros removed
fn fraction(value: u128, unit: u128) -> String {
    let whole = value / unit;
    let rem = value % unit;
    if rem == 0 {
        return whole.to_string();
    }

    let width = (unit.ilog10()) as usize;
    let digits = format!("{:0width$}", rem, width = width);
    format!("{}.{}", whole, digits.trim_end_matches('0'))
}
