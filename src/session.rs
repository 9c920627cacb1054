//! Per-connection session tasks
//!
//! Each accepted connection is split into two tasks:
//! - the Session Reader, which turns socket reads into `SessionEvent`s
//!   on the content queue
//! - the connection writer, which drains the client's outbox to the socket
//!
//! The reader owns the session's lifetime: when its stream fails it reports
//! the close to the Dispatcher and cancels the session token, which stops
//! the writer and closes the socket.

use std::time::Instant;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::Outbox;
use crate::message::SessionEvent;
use crate::types::{ClientId, OUTBOX_CAPACITY, READ_BUFFER_SIZE};

/// Start the reader and writer tasks for a connection
///
/// Returns the outbox used to write to the client. Both tasks stop when
/// `shutdown` is cancelled.
pub fn spawn_session(
    stream: TcpStream,
    client_id: ClientId,
    events: mpsc::Sender<SessionEvent>,
    shutdown: &CancellationToken,
) -> Outbox {
    let (read_half, write_half) = stream.into_split();
    let (out_tx, out_rx) = mpsc::channel::<String>(OUTBOX_CAPACITY);
    let session = shutdown.child_token();

    tokio::spawn(write_loop(client_id, write_half, out_rx, session.clone()));
    tokio::spawn(read_loop(client_id, read_half, events, session));

    Outbox::new(out_tx)
}

/// Session Reader: socket → content queue
///
/// Each successful read becomes one content event. There are no retries:
/// the first read error or EOF ends the session for good.
async fn read_loop(
    client_id: ClientId,
    mut reader: OwnedReadHalf,
    events: mpsc::Sender<SessionEvent>,
    session: CancellationToken,
) {
    let mut buf = [0u8; READ_BUFFER_SIZE];

    let clean = loop {
        let read = tokio::select! {
            _ = session.cancelled() => {
                debug!("Read task cancelled for {}", client_id);
                return;
            }
            read = reader.read(&mut buf) => read,
        };

        let count = match read {
            Ok(0) => {
                debug!("Client {} closed the connection", client_id);
                break true;
            }
            Ok(count) => count,
            Err(e) => {
                warn!("Read error for {}: {}", client_id, e);
                break false;
            }
        };

        let content = normalize(&buf[..count]);
        debug!("Received from {}: {:?}", client_id, content);

        let event = SessionEvent::Content { client_id, content };
        tokio::select! {
            _ = session.cancelled() => return,
            sent = events.send(event) => {
                if sent.is_err() {
                    debug!("Dispatcher closed, ending read task for {}", client_id);
                    session.cancel();
                    return;
                }
            }
        }
    };

    let closed = SessionEvent::Closed {
        client_id,
        clean,
        at: Instant::now(),
    };
    tokio::select! {
        _ = session.cancelled() => {}
        _ = events.send(closed) => {}
    }

    // Stops the writer, which drops the write half and closes the socket
    session.cancel();
    info!("Session {} ended", client_id);
}

/// Connection writer: outbox → socket
async fn write_loop(
    client_id: ClientId,
    mut writer: OwnedWriteHalf,
    mut outbox: mpsc::Receiver<String>,
    session: CancellationToken,
) {
    loop {
        let text = tokio::select! {
            _ = session.cancelled() => break,
            text = outbox.recv() => match text {
                Some(text) => text,
                None => break,
            },
        };

        if text.is_empty() {
            continue;
        }

        if let Err(e) = writer.write_all(text.as_bytes()).await {
            warn!("Write to {} failed: {}", client_id, e);
            break;
        }
    }

    let _ = writer.shutdown().await;
    debug!("Write task ended for {}", client_id);
}

/// Decode one receive as text
///
/// Invalid UTF-8 is replaced, and a single trailing `\n` or `\r\n` is
/// dropped so line-oriented clients send the same names as raw ones.
pub fn normalize(bytes: &[u8]) -> String {
    let decoded = String::from_utf8_lossy(bytes);
    let text: &str = decoded.as_ref();
    match text.strip_suffix('\n') {
        Some(line) => line.strip_suffix('\r').unwrap_or(line).to_string(),
        None => text.to_string(),
    }
}
