//! Session hub: one task that owns the player registry.
//!
//! Registrations, departures and broadcasts all arrive as [`HubEvent`]s on a
//! bounded queue and are handled strictly in order by a single consumer, so
//! the registry is never mutated concurrently. [`SessionHub`] is the cheap,
//! cloneable handle the rest of the server talks to.

use crate::config::ServerConfig;
use crate::game::{Game, SnapshotSink};
use crate::sessions::{ClientId, Frame, Session, SessionRegistry, SlotCell};
use log::{debug, error, info, warn};
use shared::{GameState, ServerMessage, MAX_PLAYERS};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Work items processed by the hub loop.
#[derive(Debug)]
pub enum HubEvent {
    Register { session: Session },
    Unregister { id: ClientId },
    Broadcast { frame: Frame },
    Slots { reply: oneshot::Sender<Vec<(ClientId, u8)>> },
    Shutdown { done: oneshot::Sender<()> },
}

/// What a connection gets back from [`SessionHub::register`].
pub struct ClientLink {
    /// Identity to pass back to [`SessionHub::unregister`].
    pub id: ClientId,
    /// Current seat; `0` until seated and again once removed.
    pub slot: SlotCell,
    /// Frames to write to the socket. Closed when the hub lets go of the
    /// client: refused at capacity, dropped as too slow, or shut down.
    pub outbound: mpsc::Receiver<Frame>,
}

/// Cloneable handle to the hub loop
///
/// Every method is a message to the loop; the registry itself is never
/// touched from the caller's task. Client ids are handed out here so a
/// connection knows its id before the hub has processed the registration.
#[derive(Clone)]
pub struct SessionHub {
    events: mpsc::Sender<HubEvent>,
    game: Arc<Game>,
    next_id: Arc<AtomicU64>,
    outbound_capacity: usize,
}

impl SessionHub {
    /// Spawns the hub loop and returns a handle to it. The loop runs until
    /// [`SessionHub::shutdown`] is called or every handle is dropped.
    pub fn start(game: Arc<Game>, config: &ServerConfig) -> (Self, JoinHandle<()>) {
        let (events, events_rx) = mpsc::channel(config.hub_capacity.max(1));
        let hub_loop = HubLoop {
            registry: SessionRegistry::new(MAX_PLAYERS),
            game: Arc::clone(&game),
            sink: snapshot_sink(events.downgrade()),
            events: events_rx,
        };
        let handle = tokio::spawn(hub_loop.run());

        let hub = Self {
            events,
            game,
            next_id: Arc::new(AtomicU64::new(1)),
            outbound_capacity: config.outbound_capacity.max(1),
        };
        (hub, handle)
    }

    /// The engine this hub drives
    pub fn game(&self) -> &Arc<Game> {
        &self.game
    }

    /// Asks the hub to seat a new client. The returned link's outbound
    /// queue closes straight away if the hub refuses it.
    pub async fn register(&self) -> ClientLink {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let slot = SlotCell::new();
        let (tx, outbound) = mpsc::channel(self.outbound_capacity);

        let session = Session::new(id, slot.clone(), tx);
        if self.events.send(HubEvent::Register { session }).await.is_err() {
            warn!("Hub is not running; refusing client {}", id);
        }

        ClientLink { id, slot, outbound }
    }

    /// Tells the hub a connection has ended
    ///
    /// The session is removed, the player count updated and the remaining
    /// seats renumbered. Unknown or already dropped ids are ignored.
    pub async fn unregister(&self, id: ClientId) {
        if self.events.send(HubEvent::Unregister { id }).await.is_err() {
            debug!("Hub is not running; client {} already released", id);
        }
    }

    /// Queues a frame for every client without waiting. The frame is shed
    /// if the hub is backed up.
    pub fn broadcast(&self, frame: Frame) {
        queue_broadcast(&self.events, frame);
    }

    /// `(client, slot)` pairs in registration order.
    pub async fn slots(&self) -> Vec<(ClientId, u8)> {
        let (reply, rx) = oneshot::channel();
        if self.events.send(HubEvent::Slots { reply }).await.is_err() {
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }

    /// Number of seated players
    pub async fn client_count(&self) -> usize {
        self.slots().await.len()
    }

    /// Stops the tick task, disconnects every client and ends the hub loop.
    pub async fn shutdown(&self) {
        let (done, rx) = oneshot::channel();
        if self.events.send(HubEvent::Shutdown { done }).await.is_ok() {
            let _ = rx.await;
        } else {
            // Loop already gone; make sure the engine is not left ticking.
            self.game.stop().await;
        }
    }
}

fn encode_snapshot(snapshot: GameState) -> Option<Frame> {
    match ServerMessage::GameState(snapshot).encode() {
        Ok(text) => Some(Arc::from(text)),
        Err(e) => {
            error!("Error marshaling game state: {}", e);
            None
        }
    }
}

fn queue_broadcast(events: &mpsc::Sender<HubEvent>, frame: Frame) {
    match events.try_send(HubEvent::Broadcast { frame }) {
        Ok(()) => {}
        Err(TrySendError::Full(_)) => warn!("Hub queue full, dropping snapshot"),
        Err(TrySendError::Closed(_)) => debug!("Hub closed, dropping snapshot"),
    }
}

/// Broadcaster: turns engine snapshots into `game_state` frames and hands
/// them to the hub. Holds only a weak sender so a running tick task does not
/// keep the hub alive.
fn snapshot_sink(events: mpsc::WeakSender<HubEvent>) -> SnapshotSink {
    Arc::new(move |snapshot: GameState| {
        let Some(events) = events.upgrade() else {
            return;
        };
        if let Some(frame) = encode_snapshot(snapshot) {
            queue_broadcast(&events, frame);
        }
    })
}

struct HubLoop {
    registry: SessionRegistry,
    game: Arc<Game>,
    sink: SnapshotSink,
    events: mpsc::Receiver<HubEvent>,
}

impl HubLoop {
    async fn run(mut self) {
        debug!("Hub loop started");
        while let Some(event) = self.events.recv().await {
            match event {
                HubEvent::Register { session } => self.register(session).await,
                HubEvent::Unregister { id } => self.unregister(id).await,
                HubEvent::Broadcast { frame } => self.broadcast(frame).await,
                HubEvent::Slots { reply } => {
                    let _ = reply.send(self.registry.slots());
                }
                HubEvent::Shutdown { done } => {
                    self.shutdown().await;
                    let _ = done.send(());
                    break;
                }
            }
        }
        debug!("Hub loop exited");
    }

    async fn register(&mut self, session: Session) {
        let id = session.id;
        if let Err(session) = self.registry.add(session) {
            warn!(
                "Client {} rejected: game is full ({} players)",
                session.id, MAX_PLAYERS
            );
            // Dropping the session closes its queue and with it the connection.
            return;
        }

        let count = self.registry.len();
        self.game.set_session_count(count).await;

        if count == 1 && self.game.start(Arc::clone(&self.sink)).await {
            info!("Starting game loop (first client connected)");
        }
        info!("Total clients: {}", count);

        // Late joiners get the board right away instead of at the next snapshot.
        let Some(frame) = encode_snapshot(self.game.snapshot().await) else {
            return;
        };
        if let Some(session) = self.registry.get(id) {
            if let Err(e) = session.try_send(&frame) {
                warn!("Failed to send game state to client {}: {}", id, e);
            }
        }
    }

    async fn unregister(&mut self, id: ClientId) {
        if let Some(session) = self.registry.remove(id) {
            info!("Client {} disconnected", session.id);
            self.game.set_session_count(self.registry.len()).await;
        }
        info!("Client unregistered. Total clients: {}", self.registry.len());
    }

    async fn broadcast(&mut self, frame: Frame) {
        let dropped = self.registry.broadcast(&frame);
        if !dropped.is_empty() {
            self.game.set_session_count(self.registry.len()).await;
        }
    }

    async fn shutdown(&mut self) {
        info!("Shutting down hub");
        self.game.stop().await;
        self.registry.clear();
        self.game.set_session_count(0).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::MatchPhase;
    use std::time::Duration;
    use tokio::time::timeout;

    fn test_hub() -> (SessionHub, JoinHandle<()>) {
        let config = ServerConfig::default();
        let game = Arc::new(Game::new(&config));
        SessionHub::start(game, &config)
    }

    async fn next_state(link: &mut ClientLink) -> GameState {
        let frame = timeout(Duration::from_secs(1), link.outbound.recv())
            .await
            .expect("timed out waiting for frame")
            .expect("outbound queue closed");
        match ServerMessage::decode(frame.as_bytes()).unwrap() {
            ServerMessage::GameState(state) => state,
            other => panic!("Unexpected message: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_joiner_receives_snapshot() {
        let (hub, _loop) = test_hub();
        let mut link = hub.register().await;

        let state = next_state(&mut link).await;
        assert_eq!(state.session_count, 1);
        assert_eq!(state.phase, MatchPhase::Waiting);
        assert_eq!(link.slot.get(), 1);
    }

    #[tokio::test]
    async fn test_first_registration_starts_engine() {
        let (hub, _loop) = test_hub();
        assert!(!hub.game().is_running().await);

        let _link = hub.register().await;
        assert_eq!(hub.client_count().await, 1);
        assert!(hub.game().is_running().await);

        hub.shutdown().await;
        assert!(!hub.game().is_running().await);
    }

    #[tokio::test]
    async fn test_third_client_is_refused() {
        let (hub, _loop) = test_hub();
        let _a = hub.register().await;
        let _b = hub.register().await;
        let mut c = hub.register().await;

        assert_eq!(hub.client_count().await, 2);
        assert_eq!(c.slot.get(), 0);
        // Closed with nothing queued.
        assert!(c.outbound.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_departure_renumbers_slots() {
        let (hub, _loop) = test_hub();
        let a = hub.register().await;
        let b = hub.register().await;
        assert_eq!(hub.slots().await, vec![(a.id, 1), (b.id, 2)]);

        hub.unregister(a.id).await;

        assert_eq!(hub.slots().await, vec![(b.id, 1)]);
        assert_eq!(b.slot.get(), 1);
        assert_eq!(hub.game().snapshot().await.session_count, 1);
    }

    #[tokio::test]
    async fn test_broadcast_reaches_clients() {
        let (hub, _loop) = test_hub();
        let mut a = hub.register().await;
        next_state(&mut a).await;

        hub.broadcast(Arc::from("{\"type\":\"error\",\"data\":{\"message\":\"x\"}}"));

        // Tick snapshots may interleave; look for ours.
        loop {
            let frame = timeout(Duration::from_secs(1), a.outbound.recv())
                .await
                .unwrap()
                .unwrap();
            if frame.contains("\"error\"") {
                break;
            }
        }
    }

    #[tokio::test]
    async fn test_slow_client_is_dropped_like_a_departure() {
        // Tick snapshots at 1/s so only the explicit broadcasts fill queues.
        let config = ServerConfig {
            outbound_capacity: 2,
            snapshot_rate: 1,
            ..ServerConfig::default()
        };
        let game = Arc::new(Game::new(&config));
        let (hub, _loop) = SessionHub::start(game, &config);

        let slow = hub.register().await;
        let mut fast = hub.register().await;
        assert_eq!(hub.slots().await, vec![(slow.id, 1), (fast.id, 2)]);

        // The slow client never reads; the fast one drains between broadcasts.
        for _ in 0..10 {
            while fast.outbound.try_recv().is_ok() {}
            hub.broadcast(Arc::from("{\"type\":\"error\",\"data\":{\"message\":\"x\"}}"));
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert_eq!(hub.slots().await, vec![(fast.id, 1)]);
        assert_eq!(fast.slot.get(), 1);
        assert_eq!(slow.slot.get(), 0);
        assert_eq!(hub.game().snapshot().await.session_count, 1);
        hub.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_closes_clients() {
        let (hub, hub_loop) = test_hub();
        let mut a = hub.register().await;
        next_state(&mut a).await;

        hub.shutdown().await;

        // Whatever the tick task queued before shutdown drains, then the queue closes.
        while timeout(Duration::from_secs(1), a.outbound.recv())
            .await
            .unwrap()
            .is_some()
        {}
        assert!(hub_loop.await.is_ok());
        assert_eq!(hub.client_count().await, 0);
    }
}
