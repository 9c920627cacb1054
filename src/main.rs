//! Chat Relay - Entry Point
//!
//! Loads configuration and the moderation word list, binds the loopback
//! listener and runs the relay until Ctrl-C.

use std::env;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use chat_relay::config::DEFAULT_CONFIG_PATH;
use chat_relay::{bind, Relay, ServerConfig, WordFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=chat_relay=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("chat_relay=info")),
        )
        .init();

    // Get config path from command line or use default
    let config_path = env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

    let config = ServerConfig::load_or_default(&config_path);
    let filter = WordFilter::load_or_empty(&config.word_list);

    let listener = bind(&config).await?;

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl-C received, shutting down");
                signal.cancel();
            }
            Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
        }
    });

    Relay::new(config.greeting, filter)
        .serve(listener, shutdown)
        .await;

    Ok(())
}
