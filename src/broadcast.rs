//! Broadcaster: broadcast queue → every online client but the sender
//!
//! The Broadcaster never touches the Dispatcher's registry. It keeps its
//! own delivery roster, updated by `Enroll`/`Offline` events that arrive
//! on the broadcast queue in the same order the Dispatcher made the
//! corresponding registry changes.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::Outbox;
use crate::message::BroadcastEvent;

/// Delivery entry for one registered name
#[derive(Debug)]
struct Recipient {
    outbox: Outbox,
    online: bool,
}

/// The fan-out actor
pub struct Broadcaster {
    /// Registered name -> recipient
    roster: HashMap<String, Recipient>,
    /// Broadcast queue receiver
    receiver: mpsc::Receiver<BroadcastEvent>,
}

impl Broadcaster {
    /// Create a Broadcaster with the given queue receiver
    pub fn new(receiver: mpsc::Receiver<BroadcastEvent>) -> Self {
        Self {
            roster: HashMap::new(),
            receiver,
        }
    }

    /// Run the Broadcaster event loop
    ///
    /// Runs until shutdown or until every sender is dropped.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!("Broadcaster started");

        loop {
            let event = tokio::select! {
                _ = shutdown.cancelled() => break,
                event = self.receiver.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };
            self.handle_event(event);
        }

        info!("Broadcaster shutting down");
    }

    /// Process a single event
    fn handle_event(&mut self, event: BroadcastEvent) {
        match event {
            BroadcastEvent::Enroll { name, outbox } => {
                debug!("Enrolled '{}'", name);
                self.roster.insert(
                    name,
                    Recipient {
                        outbox,
                        online: true,
                    },
                );
            }
            BroadcastEvent::Offline { name } => {
                if let Some(recipient) = self.roster.get_mut(&name) {
                    recipient.online = false;
                }
            }
            BroadcastEvent::Message { content, sender } => {
                self.fan_out(&content, &sender);
            }
        }
    }

    /// Write `content` to every online recipient except `sender`
    ///
    /// A failed delivery is logged and skipped; the recipient stays enrolled.
    fn fan_out(&self, content: &str, sender: &str) {
        for (name, recipient) in &self.roster {
            if name == sender || !recipient.online {
                continue;
            }

            debug!("Send message to {}", name);
            if let Err(e) = recipient.outbox.try_send(content) {
                warn!("Delivery to '{}' failed: {}", name, e);
            }
        }
    }
}
