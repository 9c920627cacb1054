//! Relay wiring
//!
//! Creates the queues and runs the Acceptor, Dispatcher and Broadcaster
//! until the shutdown token is cancelled.

use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::acceptor::accept_loop;
use crate::broadcast::Broadcaster;
use crate::command::{ChatAnalytics, NoopAnalytics};
use crate::config::ServerConfig;
use crate::dispatcher::Dispatcher;
use crate::error::AppError;
use crate::filter::WordFilter;
use crate::types::QUEUE_CAPACITY;

/// Bind the loopback listener for `config`
pub async fn bind(config: &ServerConfig) -> Result<TcpListener, AppError> {
    let addr = config.listen_addr();
    let listener = TcpListener::bind(addr).await?;
    info!("Chat relay listening on {}", listener.local_addr()?);
    Ok(listener)
}

/// A configured, not yet running relay
pub struct Relay {
    greeting: String,
    filter: WordFilter,
    analytics: Box<dyn ChatAnalytics>,
}

impl Relay {
    /// Create a relay that greets with `greeting` and masks with `filter`
    pub fn new(greeting: impl Into<String>, filter: WordFilter) -> Self {
        Self {
            greeting: greeting.into(),
            filter,
            analytics: Box::new(NoopAnalytics),
        }
    }

    /// Replace the default no-op analytics
    pub fn with_analytics(mut self, analytics: impl ChatAnalytics + 'static) -> Self {
        self.analytics = Box::new(analytics);
        self
    }

    /// Serve `listener` until `shutdown` is cancelled
    ///
    /// Returns once the Acceptor, Dispatcher and Broadcaster have all
    /// stopped. Session tasks observe the same token.
    pub async fn serve(self, listener: TcpListener, shutdown: CancellationToken) {
        let (conn_tx, conn_rx) = mpsc::channel(QUEUE_CAPACITY);
        let (broadcast_tx, broadcast_rx) = mpsc::channel(QUEUE_CAPACITY);

        let broadcaster = Broadcaster::new(broadcast_rx);
        let dispatcher = Dispatcher::new(
            self.filter,
            self.analytics,
            conn_rx,
            broadcast_tx,
            shutdown.clone(),
        );

        let acceptor = tokio::spawn(accept_loop(
            listener,
            self.greeting,
            conn_tx,
            shutdown.clone(),
        ));
        let dispatcher = tokio::spawn(dispatcher.run());
        let broadcaster = tokio::spawn(broadcaster.run(shutdown.clone()));

        let (acceptor, dispatcher, broadcaster) = tokio::join!(acceptor, dispatcher, broadcaster);
        for (task, result) in [
            ("acceptor", acceptor),
            ("dispatcher", dispatcher),
            ("broadcaster", broadcaster),
        ] {
            if let Err(e) = result {
                error!("{} task failed: {}", task, e);
            }
        }

        info!("Chat relay stopped");
    }
}
