//! Inbound message dispatch.
//!
//! Input is always applied to the sender's own seat; whatever player id a
//! payload claims is ignored, so a client can only ever steer its own paddle.

use crate::game::Game;
use crate::sessions::NO_SLOT;
use log::{debug, info, warn};
use shared::{ClientMessage, ProtocolError};
use std::sync::Arc;

#[derive(Clone)]
pub struct MessageRouter {
    game: Arc<Game>,
}

impl MessageRouter {
    /// Creates a router that applies messages to `game`
    pub fn new(game: Arc<Game>) -> Self {
        Self { game }
    }

    /// Decodes and applies one inbound frame from the client in `slot`.
    /// Bad frames are logged and dropped; the connection stays up.
    pub async fn handle(&self, slot: u8, bytes: &[u8]) -> Result<(), ProtocolError> {
        match ClientMessage::decode(bytes) {
            Ok(message) => {
                self.dispatch(slot, message).await;
                Ok(())
            }
            Err(e) => {
                warn!("Dropping message from slot {}: {}", slot, e);
                Err(e)
            }
        }
    }

    /// Applies a decoded message on behalf of the client in `slot`.
    ///
    /// A client without a seat (refused, or dropped by the hub while its
    /// socket is still draining) cannot affect the match at all.
    pub async fn dispatch(&self, slot: u8, message: ClientMessage) {
        if slot == NO_SLOT {
            debug!("Ignoring {} from unseated client", message.kind());
            return;
        }

        match message {
            ClientMessage::PlayerInput(input) => {
                self.game.apply_input(slot, input.direction).await;
            }
            ClientMessage::StartGame => {
                if self.game.start_match().await {
                    info!("Game started by player {}", slot);
                }
            }
            ClientMessage::ResetGame => {
                self.game.reset_match().await;
                info!("Game reset by player {}", slot);
            }
        }
    }
}
