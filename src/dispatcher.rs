//! Dispatcher actor implementation
//!
//! The single owner of client state: the client table, the name registry
//! and the recent-message cache. Consumes the new-connection and content
//! queues, drives the name handshake, runs slash commands, filters chat
//! and feeds the broadcast queue.
//!
//! Nothing else reads or writes the registry, so no locks are needed.

use std::collections::HashMap;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::RecentCache;
use crate::client::{Client, Outbox};
use crate::command::{self, ChatAnalytics, Command, CommandOutcome};
use crate::error::AppError;
use crate::filter::WordFilter;
use crate::message::{BroadcastEvent, NewConnection, ServerMessage, SessionEvent};
use crate::session::spawn_session;
use crate::types::{ClientId, QUEUE_CAPACITY};

/// The Dispatcher actor
pub struct Dispatcher {
    /// Every known connection: ClientId -> Client
    clients: HashMap<ClientId, Client>,
    /// Claimed display names: name -> ClientId. Entries are never removed.
    registry: HashMap<String, ClientId>,
    /// Last chat lines, replayed to newcomers
    recent: RecentCache,
    filter: WordFilter,
    analytics: Box<dyn ChatAnalytics>,
    /// New-connection queue receiver
    new_conns: mpsc::Receiver<NewConnection>,
    /// Content queue; the sender is cloned into every Session Reader
    events_tx: mpsc::Sender<SessionEvent>,
    events_rx: mpsc::Receiver<SessionEvent>,
    /// Broadcast queue sender
    broadcast: mpsc::Sender<BroadcastEvent>,
    shutdown: CancellationToken,
}

impl Dispatcher {
    /// Create a Dispatcher reading from `new_conns` and feeding `broadcast`
    pub fn new(
        filter: WordFilter,
        analytics: Box<dyn ChatAnalytics>,
        new_conns: mpsc::Receiver<NewConnection>,
        broadcast: mpsc::Sender<BroadcastEvent>,
        shutdown: CancellationToken,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel(QUEUE_CAPACITY);
        Self {
            clients: HashMap::new(),
            registry: HashMap::new(),
            recent: RecentCache::new(),
            filter,
            analytics,
            new_conns,
            events_tx,
            events_rx,
            broadcast,
            shutdown,
        }
    }

    /// Run the Dispatcher event loop until shutdown
    ///
    /// Losing the Acceptor only stops new connections; existing sessions
    /// keep being served.
    pub async fn run(mut self) {
        info!("Dispatcher started");
        let mut accepting = true;

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                conn = self.new_conns.recv(), if accepting => match conn {
                    Some(conn) => self.handle_new_connection(conn),
                    None => {
                        warn!("New-connection queue closed, serving existing sessions only");
                        accepting = false;
                    }
                },
                event = self.events_rx.recv() => match event {
                    Some(event) => self.handle_session_event(event).await,
                    None => break,
                },
            }
        }

        info!("Dispatcher shutting down");
    }

    /// Handle a connection handed off by the Acceptor
    fn handle_new_connection(&mut self, conn: NewConnection) {
        let client_id = ClientId::new();
        let outbox = spawn_session(
            conn.stream,
            client_id,
            self.events_tx.clone(),
            &self.shutdown,
        );
        self.admit(client_id, outbox, conn.accepted_at);
    }

    /// Track a new client awaiting its name
    ///
    /// The session is timed from `accepted_at`, not from when the
    /// connection reached the front of the queue.
    fn admit(&mut self, client_id: ClientId, outbox: Outbox, accepted_at: Instant) {
        info!("Client {} connected", client_id);
        self.clients
            .insert(client_id, Client::new(client_id, outbox, accepted_at));
        debug!(
            "Total clients: {}, registered names: {}",
            self.clients.len(),
            self.registry.len()
        );
    }

    /// Process a single event from the content queue
    async fn handle_session_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Content { client_id, content } => {
                self.handle_content(client_id, content).await;
            }
            SessionEvent::Closed {
                client_id,
                clean,
                at,
            } => {
                self.handle_closed(client_id, clean, at).await;
            }
        }
    }

    /// Handle one receive from a client
    async fn handle_content(&mut self, client_id: ClientId, content: String) {
        if content.is_empty() {
            return;
        }

        let Some(client) = self.clients.get(&client_id) else {
            return;
        };

        if client.awaiting_name() {
            self.handle_claim_name(client_id, content).await;
            return;
        }

        if let Some(command) = Command::parse(&content) {
            let outcome = command::execute(
                &command,
                |name| self.registry.get(name).and_then(|id| self.clients.get(id)),
                self.analytics.as_ref(),
                Instant::now(),
            );
            match outcome {
                CommandOutcome::Reply(text) => {
                    reply(client, text);
                    return;
                }
                CommandOutcome::Handled => return,
                CommandOutcome::Unhandled => {}
            }
        }

        self.handle_chat(client_id, content).await;
    }

    /// Handle the first message of a client: its requested name
    async fn handle_claim_name(&mut self, client_id: ClientId, name: String) {
        if self.registry.contains_key(&name) {
            info!("Client {} asked for taken name '{}'", client_id, name);
            if let Some(client) = self.clients.get(&client_id) {
                reply(client, ServerMessage::NameTaken.to_string());
            }
            return;
        }

        let Some(client) = self.clients.get_mut(&client_id) else {
            return;
        };
        client.set_name(name.clone());
        let outbox = client.outbox.clone();
        self.registry.insert(name.clone(), client_id);
        info!("Client {} is now '{}'", client_id, name);

        self.enqueue(BroadcastEvent::Enroll {
            name: name.clone(),
            outbox,
        })
        .await;
        self.enqueue(BroadcastEvent::Message {
            content: ServerMessage::Joined { name: name.clone() }.to_string(),
            sender: name,
        })
        .await;

        let replay = ServerMessage::Replay {
            lines: self.recent.snapshot(),
        };
        if let Some(client) = self.clients.get(&client_id) {
            reply(client, replay.to_string());
        }
    }

    /// Handle a chat line from an active client
    async fn handle_chat(&mut self, client_id: ClientId, content: String) {
        let Some(client) = self.clients.get(&client_id) else {
            return;
        };
        let name = client.display_name().to_string();

        self.analytics.record(&content);
        let line = ServerMessage::Chat {
            name: name.clone(),
            content: self.filter.mask(&content),
        }
        .to_string();

        self.recent.push(line.clone());
        self.enqueue(BroadcastEvent::Message {
            content: line,
            sender: name,
        })
        .await;
    }

    /// Handle the end of a client's session
    ///
    /// Named clients stay in the registry with their session frozen so
    /// `/stats` can still answer for them.
    async fn handle_closed(&mut self, client_id: ClientId, clean: bool, at: Instant) {
        let Some(client) = self.clients.get_mut(&client_id) else {
            return;
        };
        client.mark_offline(at);

        let Some(name) = client.name.clone() else {
            info!("Client {} left before choosing a name", client_id);
            self.clients.remove(&client_id);
            return;
        };
        info!("Client {} ('{}') disconnected", client_id, name);

        self.enqueue(BroadcastEvent::Offline { name: name.clone() })
            .await;
        if clean {
            self.enqueue(BroadcastEvent::Message {
                content: ServerMessage::Left { name: name.clone() }.to_string(),
                sender: name,
            })
            .await;
        }
    }

    /// Push onto the broadcast queue, waiting while it is full
    ///
    /// Gives up on shutdown so a stuck Broadcaster cannot hold the
    /// Dispatcher.
    async fn enqueue(&self, event: BroadcastEvent) {
        if let Err(e) = self.try_enqueue(event).await {
            warn!("Broadcast dropped: {}", e);
        }
    }

    async fn try_enqueue(&self, event: BroadcastEvent) -> Result<(), AppError> {
        tokio::select! {
            _ = self.shutdown.cancelled() => Ok(()),
            sent = self.broadcast.send(event) => sent.map_err(|_| AppError::ChannelSend),
        }
    }
}

/// Write to one client without waiting on its outbox
fn reply(client: &Client, text: String) {
    if let Err(e) = client.reply(text) {
        warn!("Reply to {} dropped: {}", client.id, e);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::cache::RECENT_CAPACITY;
    use crate::command::NoopAnalytics;

    struct Harness {
        dispatcher: Dispatcher,
        broadcast_rx: mpsc::Receiver<BroadcastEvent>,
        shutdown: CancellationToken,
        _new_conns: mpsc::Sender<NewConnection>,
    }

    fn harness(words: &[&str]) -> Harness {
        let (conn_tx, conn_rx) = mpsc::channel(1);
        let (broadcast_tx, broadcast_rx) = mpsc::channel(QUEUE_CAPACITY);
        let shutdown = CancellationToken::new();
        let dispatcher = Dispatcher::new(
            WordFilter::new(words.iter().copied()),
            Box::new(NoopAnalytics),
            conn_rx,
            broadcast_tx,
            shutdown.clone(),
        );
        Harness {
            dispatcher,
            broadcast_rx,
            shutdown,
            _new_conns: conn_tx,
        }
    }

    impl Harness {
        fn connect(&mut self) -> (ClientId, mpsc::Receiver<String>) {
            self.connect_with(64, Instant::now())
        }

        fn connect_with(
            &mut self,
            capacity: usize,
            accepted_at: Instant,
        ) -> (ClientId, mpsc::Receiver<String>) {
            let (tx, rx) = mpsc::channel(capacity);
            let id = ClientId::new();
            self.dispatcher.admit(id, Outbox::new(tx), accepted_at);
            (id, rx)
        }

        async fn say(&mut self, id: ClientId, content: &str) {
            self.dispatcher
                .handle_session_event(SessionEvent::Content {
                    client_id: id,
                    content: content.to_string(),
                })
                .await;
        }

        async fn close(&mut self, id: ClientId, clean: bool, at: Instant) {
            self.dispatcher
                .handle_session_event(SessionEvent::Closed {
                    client_id: id,
                    clean,
                    at,
                })
                .await;
        }

        /// Drain broadcast messages, dropping roster events
        fn broadcasts(&mut self) -> Vec<(String, String)> {
            let mut out = Vec::new();
            while let Ok(event) = self.broadcast_rx.try_recv() {
                if let BroadcastEvent::Message { content, sender } = event {
                    out.push((content, sender));
                }
            }
            out
        }
    }

    #[tokio::test]
    async fn test_first_message_claims_name() {
        let mut h = harness(&[]);
        let (alice, mut alice_rx) = h.connect();

        h.say(alice, "alice").await;

        assert_eq!(h.dispatcher.registry.get("alice"), Some(&alice));
        assert!(!h.dispatcher.clients[&alice].awaiting_name());
        assert_eq!(
            h.broadcasts(),
            vec![(
                "[alice] entered the chat room".to_string(),
                "alice".to_string()
            )]
        );
        // Empty replay for the first client
        assert_eq!(alice_rx.try_recv().unwrap(), "");
    }

    #[tokio::test]
    async fn test_duplicate_name_rejected_then_retry() {
        let mut h = harness(&[]);
        let (alice, _alice_rx) = h.connect();
        let (other, mut other_rx) = h.connect();

        h.say(alice, "alice").await;
        h.broadcasts();

        h.say(other, "alice").await;
        assert_eq!(other_rx.try_recv().unwrap(), "this name is already in use");
        assert!(h.dispatcher.clients[&other].awaiting_name());
        assert_eq!(h.dispatcher.registry.get("alice"), Some(&alice));
        assert!(h.broadcasts().is_empty());

        h.say(other, "carol").await;
        assert_eq!(h.dispatcher.registry.get("carol"), Some(&other));
    }

    #[tokio::test]
    async fn test_chat_is_filtered_cached_and_broadcast() {
        let mut h = harness(&["badword"]);
        let (alice, _rx) = h.connect();
        h.say(alice, "alice").await;
        h.broadcasts();

        h.say(alice, "this is a badword").await;

        assert_eq!(
            h.broadcasts(),
            vec![(
                "[alice] said: this is a ***".to_string(),
                "alice".to_string()
            )]
        );
        assert_eq!(
            h.dispatcher.recent.snapshot(),
            vec!["[alice] said: this is a ***".to_string()]
        );
    }

    #[tokio::test]
    async fn test_newcomer_gets_replay() {
        let mut h = harness(&[]);
        let (alice, _rx) = h.connect();
        h.say(alice, "alice").await;
        h.say(alice, "one").await;
        h.say(alice, "two").await;

        let (bob, mut bob_rx) = h.connect();
        h.say(bob, "bob").await;

        assert_eq!(
            bob_rx.try_recv().unwrap(),
            "[alice] said: one\n[alice] said: two\n"
        );
    }

    #[tokio::test]
    async fn test_cache_is_bounded() {
        let mut h = harness(&[]);
        let (alice, _rx) = h.connect();
        h.say(alice, "alice").await;
        for i in 0..RECENT_CAPACITY + 3 {
            h.say(alice, &format!("m{}", i)).await;
        }

        let recent = h.dispatcher.recent.snapshot();
        assert_eq!(recent.len(), RECENT_CAPACITY);
        assert_eq!(recent[0], "[alice] said: m3");
    }

    #[tokio::test]
    async fn test_commands_are_not_broadcast() {
        let mut h = harness(&[]);
        let (alice, mut alice_rx) = h.connect();
        h.say(alice, "alice").await;
        alice_rx.try_recv().unwrap();
        h.broadcasts();

        h.say(alice, "/stats alice").await;
        let reply = alice_rx.try_recv().unwrap();
        assert!(reply.ends_with('s'), "unexpected stats reply {:?}", reply);

        h.say(alice, "/dance").await;
        h.say(alice, "/popular 3").await;

        assert!(h.broadcasts().is_empty());
        assert!(h.dispatcher.recent.is_empty());
        assert!(alice_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unhandled_command_falls_through_to_chat() {
        let mut h = harness(&[]);
        let (alice, mut alice_rx) = h.connect();
        h.say(alice, "alice").await;
        alice_rx.try_recv().unwrap();
        h.broadcasts();

        h.say(alice, "/stats nobody").await;

        assert!(alice_rx.try_recv().is_err());
        assert_eq!(
            h.broadcasts(),
            vec![(
                "[alice] said: /stats nobody".to_string(),
                "alice".to_string()
            )]
        );
    }

    #[tokio::test]
    async fn test_empty_content_is_ignored() {
        let mut h = harness(&[]);
        let (alice, _rx) = h.connect();

        h.say(alice, "").await;

        assert!(h.dispatcher.clients[&alice].awaiting_name());
        assert!(h.dispatcher.registry.is_empty());
    }

    #[tokio::test]
    async fn test_clean_close_announces_departure_once() {
        let mut h = harness(&[]);
        let (bob, _rx) = h.connect();
        h.say(bob, "bob").await;
        h.broadcasts();

        let at = Instant::now();
        h.close(bob, true, at).await;

        let mut offline = 0;
        let mut departures = Vec::new();
        while let Ok(event) = h.broadcast_rx.try_recv() {
            match event {
                BroadcastEvent::Offline { name } => {
                    assert_eq!(name, "bob");
                    offline += 1;
                }
                BroadcastEvent::Message { content, .. } => departures.push(content),
                BroadcastEvent::Enroll { .. } => panic!("unexpected enroll"),
            }
        }
        assert_eq!(offline, 1);
        assert_eq!(departures, vec!["bob left the chat room".to_string()]);

        let client = &h.dispatcher.clients[&bob];
        assert!(!client.online);
        assert_eq!(client.disconnected_at, Some(at));
        assert_eq!(h.dispatcher.registry.get("bob"), Some(&bob));
    }

    #[tokio::test]
    async fn test_error_close_is_silent() {
        let mut h = harness(&[]);
        let (bob, _rx) = h.connect();
        h.say(bob, "bob").await;
        h.broadcasts();

        h.close(bob, false, Instant::now()).await;

        assert!(h.broadcasts().is_empty());
        assert!(!h.dispatcher.clients[&bob].online);
    }

    #[tokio::test]
    async fn test_stats_frozen_after_disconnect() {
        let mut h = harness(&[]);
        let (alice, mut alice_rx) = h.connect();
        let (bob, _bob_rx) = h.connect();
        h.say(alice, "alice").await;
        h.say(bob, "bob").await;
        alice_rx.try_recv().unwrap();

        let connected_at = h.dispatcher.clients[&bob].connected_at;
        h.close(bob, true, connected_at + Duration::from_secs(2))
            .await;

        h.say(alice, "/stats bob").await;
        assert_eq!(alice_rx.try_recv().unwrap(), "2s");
        h.say(alice, "/stats bob").await;
        assert_eq!(alice_rx.try_recv().unwrap(), "2s");
    }

    #[tokio::test]
    async fn test_session_timed_from_acceptance() {
        let mut h = harness(&[]);
        let (alice, mut alice_rx) = h.connect();
        let accepted = Instant::now()
            .checked_sub(Duration::from_secs(3))
            .unwrap();
        let (bob, _bob_rx) = h.connect_with(64, accepted);
        h.say(alice, "alice").await;
        h.say(bob, "bob").await;
        alice_rx.try_recv().unwrap();

        h.close(bob, true, accepted + Duration::from_secs(5)).await;

        h.say(alice, "/stats bob").await;
        assert_eq!(alice_rx.try_recv().unwrap(), "5s");
    }

    #[tokio::test]
    async fn test_stalled_client_does_not_block_dispatcher() {
        let mut h = harness(&[]);
        // One slot, never drained: the replay fills it
        let (alice, _alice_rx) = h.connect_with(1, Instant::now());
        let (bob, mut bob_rx) = h.connect();

        let events = h.dispatcher.events_tx.clone();
        for content in ["alice", "/stats alice", "/stats alice"] {
            events
                .send(SessionEvent::Content {
                    client_id: alice,
                    content: content.to_string(),
                })
                .await
                .unwrap();
        }
        events
            .send(SessionEvent::Content {
                client_id: bob,
                content: "bob".to_string(),
            })
            .await
            .unwrap();

        let Harness {
            dispatcher,
            broadcast_rx: _broadcast_rx,
            shutdown,
            ..
        } = h;
        let handle = tokio::spawn(dispatcher.run());

        // bob's replay arrives only if alice's replies did not block
        let replay = tokio::time::timeout(Duration::from_secs(5), bob_rx.recv())
            .await
            .unwrap();
        assert_eq!(replay.as_deref(), Some(""));

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_enqueue_gives_up_on_shutdown() {
        let (conn_tx, conn_rx) = mpsc::channel(1);
        let (broadcast_tx, _broadcast_rx) = mpsc::channel(1);
        let shutdown = CancellationToken::new();
        let mut dispatcher = Dispatcher::new(
            WordFilter::default(),
            Box::new(NoopAnalytics),
            conn_rx,
            broadcast_tx,
            shutdown.clone(),
        );
        let (tx, _rx) = mpsc::channel(8);
        let alice = ClientId::new();
        dispatcher.admit(alice, Outbox::new(tx), Instant::now());
        drop(conn_tx);

        shutdown.cancel();
        // Enroll fills the queue; the join message would wait forever
        let claimed = dispatcher.handle_content(alice, "alice".to_string());
        tokio::time::timeout(Duration::from_secs(5), claimed)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_unnamed_client_forgotten_on_close() {
        let mut h = harness(&[]);
        let (ghost, _rx) = h.connect();

        h.close(ghost, true, Instant::now()).await;

        assert!(!h.dispatcher.clients.contains_key(&ghost));
        assert!(h.broadcasts().is_empty());
    }
}
