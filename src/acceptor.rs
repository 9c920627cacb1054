//! Acceptor: listening socket → new-connection queue
//!
//! Greets every inbound connection and hands it to the Dispatcher. The
//! hand-off never waits: when the queue is full the connection is dropped.

use std::time::Instant;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::message::NewConnection;

/// Accept connections until shutdown or a listener failure
///
/// An accept error is fatal for this loop only; sessions already handed
/// off keep running.
pub async fn accept_loop(
    listener: TcpListener,
    greeting: String,
    new_conns: mpsc::Sender<NewConnection>,
    shutdown: CancellationToken,
) {
    loop {
        let accepted = tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Acceptor shutting down");
                return;
            }
            accepted = listener.accept() => accepted,
        };

        let (mut stream, addr) = match accepted {
            Ok(accepted) => accepted,
            Err(e) => {
                error!("Listener failed, no longer accepting connections: {}", e);
                return;
            }
        };
        let accepted_at = Instant::now();
        info!("New connection from {}", addr);

        if let Err(e) = stream.write_all(greeting.as_bytes()).await {
            warn!("Failed to greet {}: {}", addr, e);
            continue;
        }

        match new_conns.try_send(NewConnection {
            stream,
            accepted_at,
        }) {
            Ok(()) => debug!("Queued connection from {}", addr),
            Err(TrySendError::Full(_)) => {
                warn!("New-connection queue full, dropping {}", addr);
            }
            Err(TrySendError::Closed(_)) => {
                info!("Dispatcher gone, acceptor exiting");
                return;
            }
        }
    }
}
