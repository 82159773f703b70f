//! Registry of connected players and their seats.
//!
//! This module tracks who is connected and which paddle each player drives:
//! - Capacity enforcement (two seats)
//! - Slot assignment in registration order
//! - Contiguous renumbering after a departure
//! - Non-blocking fan-out onto each player's outbound queue
//!
//! The registry is owned by the hub's event loop and is never shared, so
//! none of it needs locking. Slots are published to the connection tasks
//! through [`SlotCell`]s.

use log::{debug, info, warn};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Server-assigned identity of one connection.
pub type ClientId = u64;

/// An encoded frame, shared between every client it is sent to.
pub type Frame = Arc<str>;

/// Slot value meaning "not seated".
pub const NO_SLOT: u8 = 0;

/// A slot number readable from the connection task and written only by the hub.
#[derive(Debug, Clone, Default)]
pub struct SlotCell(Arc<AtomicU8>);

impl SlotCell {
    /// Creates an unseated cell
    pub fn new() -> Self {
        Self::default()
    }

    /// Current slot, or [`NO_SLOT`] when not seated
    pub fn get(&self) -> u8 {
        self.0.load(Ordering::Acquire)
    }

    pub(crate) fn set(&self, slot: u8) {
        self.0.store(slot, Ordering::Release);
    }
}

/// A seated player.
#[derive(Debug)]
pub struct Session {
    /// Identity assigned by the hub handle
    pub id: ClientId,
    /// Seat shared with the connection task
    pub slot: SlotCell,
    /// Bounded queue drained by the connection's writer
    pub outbound: mpsc::Sender<Frame>,
}

impl Session {
    /// Creates an unseated session; [`SessionRegistry::add`] gives it a slot
    pub fn new(id: ClientId, slot: SlotCell, outbound: mpsc::Sender<Frame>) -> Self {
        Self {
            id,
            slot,
            outbound,
        }
    }

    /// Queues a frame without waiting. Fails if the queue is full or the
    /// connection has gone away.
    pub fn try_send(&self, frame: &Frame) -> Result<(), TrySendError<Frame>> {
        self.outbound.try_send(Arc::clone(frame))
    }
}

/// Ordered set of seated players, oldest first.
pub struct SessionRegistry {
    sessions: Vec<Session>,
    max_sessions: usize,
}

impl SessionRegistry {
    /// Creates an empty registry that seats at most `max_sessions` players
    pub fn new(max_sessions: usize) -> Self {
        Self {
            sessions: Vec::with_capacity(max_sessions),
            max_sessions,
        }
    }

    /// Seats a new session in the next free slot (`len + 1`).
    ///
    /// At capacity the session is handed back unseated so the caller can
    /// close it.
    pub fn add(&mut self, session: Session) -> Result<u8, Session> {
        if self.sessions.len() >= self.max_sessions {
            return Err(session);
        }

        let slot = (self.sessions.len() + 1) as u8;
        session.slot.set(slot);
        info!("Client {} registered as Player {}", session.id, slot);
        self.sessions.push(session);
        Ok(slot)
    }

    /// Removes a session and renumbers the rest. Dropping the returned
    /// session closes its outbound queue.
    pub fn remove(&mut self, id: ClientId) -> Option<Session> {
        let index = self.sessions.iter().position(|s| s.id == id)?;
        let session = self.sessions.remove(index);
        session.slot.set(NO_SLOT);
        self.renumber();
        Some(session)
    }

    /// Reassigns slots `1..=len` in registration order.
    fn renumber(&mut self) {
        for (index, session) in self.sessions.iter().enumerate() {
            let slot = (index + 1) as u8;
            if session.slot.get() != slot {
                info!("Client {} is now Player {}", session.id, slot);
                session.slot.set(slot);
            }
        }
    }

    /// Offers `frame` to every session without blocking. Sessions whose
    /// queue is full or closed are removed; their ids are returned.
    pub fn broadcast(&mut self, frame: &Frame) -> Vec<ClientId> {
        let mut dropped = Vec::new();
        for session in &self.sessions {
            match session.try_send(frame) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    warn!("Client {} cannot keep up, disconnecting", session.id);
                    dropped.push(session.id);
                }
                Err(TrySendError::Closed(_)) => {
                    debug!("Client {} outbound queue already closed", session.id);
                    dropped.push(session.id);
                }
            }
        }

        for id in &dropped {
            self.remove(*id);
        }
        dropped
    }

    /// Looks up a seated session by id
    pub fn get(&self, id: ClientId) -> Option<&Session> {
        self.sessions.iter().find(|s| s.id == id)
    }

    /// `(client, slot)` pairs in registration order.
    pub fn slots(&self) -> Vec<(ClientId, u8)> {
        self.sessions.iter().map(|s| (s.id, s.slot.get())).collect()
    }

    /// Removes every session, closing all outbound queues.
    pub fn clear(&mut self) {
        for session in self.sessions.drain(..) {
            session.slot.set(NO_SLOT);
        }
    }

    /// Number of seated players
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
