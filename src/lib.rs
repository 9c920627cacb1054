//! Line-Oriented TCP Chat Relay Library
//!
//! Clients connect over plain TCP, pick a display name, and exchange
//! messages that are broadcast to every other connected client.
//!
//! # Features
//! - Nickname handshake with collision rejection
//! - Broadcast to everyone but the sender
//! - Replay of the last 50 chat lines to newcomers
//! - `/stats <name>` session length, including for departed clients
//! - Banned-word masking
//! - Cooperative shutdown via a cancellation token
//!
//! # Architecture
//! Uses the Actor pattern with bounded `mpsc` queues:
//! - the Acceptor greets connections and queues them for the Dispatcher
//! - each connection has a Session Reader task and a writer task
//! - the `Dispatcher` is the only owner of client state and the name registry
//! - the `Broadcaster` fans messages out from its own roster
//! - No locks needed - all state access goes through message passing
//!
//! # Example
//! ```ignore
//! use tokio_util::sync::CancellationToken;
//! use chat_relay::{bind, Relay, ServerConfig, WordFilter};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ServerConfig::default();
//!     let listener = bind(&config).await.unwrap();
//!
//!     Relay::new(config.greeting, WordFilter::default())
//!         .serve(listener, CancellationToken::new())
//!         .await;
//! }
//! ```

pub mod acceptor;
pub mod broadcast;
pub mod cache;
pub mod client;
pub mod command;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod filter;
pub mod message;
pub mod server;
pub mod session;
pub mod types;

// Re-export main types for convenience
pub use broadcast::Broadcaster;
pub use cache::RecentCache;
pub use client::{Client, Outbox};
pub use command::{ChatAnalytics, Command, CommandOutcome, NoopAnalytics};
pub use config::ServerConfig;
pub use dispatcher::Dispatcher;
pub use error::{AppError, ConfigError, SendError};
pub use filter::WordFilter;
pub use message::{BroadcastEvent, NewConnection, ServerMessage, SessionEvent};
pub use server::{bind, Relay};
pub use types::ClientId;
