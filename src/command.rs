//! Slash-command layer
//!
//! Active clients can send `/`-prefixed content instead of chat:
//! - `/stats <name>`: session length of a registered client, replied privately
//! - `/popular <args>`: reserved; answered by [`ChatAnalytics::popular`]
//!
//! Any other `/` content is swallowed without a reply.

use std::time::Instant;

use tracing::debug;

use crate::client::Client;
use crate::message::ServerMessage;

/// Extension point for content statistics
///
/// Both methods default to doing nothing, so `/popular` is acknowledged
/// without a reply until an implementation provides rankings.
pub trait ChatAnalytics: Send + Sync {
    /// Observe one chat line before it is masked and broadcast
    fn record(&mut self, _content: &str) {}

    /// Reply text for `/popular <args>`, if any
    fn popular(&self, _args: &[&str]) -> Option<String> {
        None
    }
}

/// Default analytics: records nothing, replies nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAnalytics;

impl ChatAnalytics for NoopAnalytics {}

/// A parsed slash command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command<'a> {
    /// `/stats [name]`
    Stats { name: Option<&'a str> },
    /// `/popular [args...]`
    Popular { args: Vec<&'a str> },
    /// Any other `/` token
    Unknown { name: &'a str },
}

impl<'a> Command<'a> {
    /// Parse content beginning with `/`
    ///
    /// Returns None for ordinary chat content.
    pub fn parse(content: &'a str) -> Option<Self> {
        if !content.starts_with('/') {
            return None;
        }

        let mut tokens = content.split_whitespace();
        let head = tokens.next()?;
        let command = match head {
            "/stats" => Command::Stats {
                name: tokens.next(),
            },
            "/popular" => Command::Popular {
                args: tokens.collect(),
            },
            _ => Command::Unknown { name: head },
        };
        Some(command)
    }
}

/// Result of running a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Handled; send this text back to the requester only
    Reply(String),
    /// Handled with nothing to say
    Handled,
    /// Not a valid invocation; the content is treated as ordinary chat
    Unhandled,
}

/// Run a parsed command
///
/// `lookup` resolves a registered name to its client.
pub fn execute<'c, F>(
    command: &Command<'_>,
    lookup: F,
    analytics: &dyn ChatAnalytics,
    now: Instant,
) -> CommandOutcome
where
    F: Fn(&str) -> Option<&'c Client>,
{
    debug!("Command: {:?}", command);

    match command {
        Command::Stats { name: None } => CommandOutcome::Unhandled,
        Command::Stats { name: Some(name) } => match lookup(*name) {
            Some(client) => CommandOutcome::Reply(
                ServerMessage::SessionLength(client.session_duration(now)).to_string(),
            ),
            None => CommandOutcome::Unhandled,
        },
        Command::Popular { args } if args.is_empty() => CommandOutcome::Unhandled,
        Command::Popular { args } => match analytics.popular(args) {
            Some(reply) => CommandOutcome::Reply(reply),
            None => CommandOutcome::Handled,
        },
        Command::Unknown { .. } => CommandOutcome::Handled,
    }
}
