//! Process configuration
//!
//! Loaded from a JSON file (`conf.json` by default):
//!
//! ```json
//! { "Port": 8888, "WordList": "list.txt", "Greeting": "please set your nickname:" }
//! ```
//!
//! Every key is optional. A missing or malformed file is logged and the
//! defaults are used; configuration problems never stop startup.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::warn;

use crate::error::ConfigError;

/// Default configuration file path
pub const DEFAULT_CONFIG_PATH: &str = "conf.json";

/// Default listening port
pub const DEFAULT_PORT: u16 = 8888;

/// Relay configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServerConfig {
    /// Loopback port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// Newline-delimited banned substrings
    #[serde(default = "default_word_list")]
    pub word_list: PathBuf,
    /// Prompt written to every new connection
    #[serde(default = "default_greeting")]
    pub greeting: String,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_word_list() -> PathBuf {
    PathBuf::from("list.txt")
}

fn default_greeting() -> String {
    "please set your nickname:".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            word_list: default_word_list(),
            greeting: default_greeting(),
        }
    }
}

impl ServerConfig {
    /// Read and parse the configuration file at `path`
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&data)?)
    }

    /// Like [`ServerConfig::load`], but falls back to defaults on any error
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!("Using default configuration: {}", e);
                Self::default()
            }
        }
    }

    /// Loopback address the relay binds to
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::LOCALHOST, self.port))
    }
}
