//! # Pong Game Server Library
//!
//! Authoritative server for a two-player, real-time pong match. Clients
//! connect over WebSocket, send paddle directions, and receive periodic
//! snapshots of the full match state.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Simulation
//! The server runs the only copy of the match. Paddles, ball, scoring and
//! the `waiting → playing → gameover` state machine all advance here on a
//! fixed 60 Hz timestep, and clients render whatever the server sends.
//!
//! ### Session Management
//! At most two players are seated. The first connection becomes player 1,
//! the second player 2, and a third is turned away by closing its socket.
//! When a player leaves, the remaining one is renumbered so the seats stay
//! contiguous from 1.
//!
//! ### State Broadcasting
//! Every third tick the current state is encoded once and offered to every
//! client's bounded outbound queue. A client whose queue is full is
//! disconnected rather than allowed to stall everyone else.
//!
//! ## Architecture Design
//!
//! ### Two Tasks
//! - **Tick task** (`game`): owns write access to the match for the length
//!   of one tick and hands snapshots to the broadcaster.
//! - **Hub loop** (`hub`): a single consumer that handles register,
//!   unregister and broadcast events strictly in arrival order, so the
//!   player registry never needs a lock.
//!
//! Everything between them is a bounded, non-blocking handoff.
//!
//! ## Module Organization
//!
//! ### Config Module (`config`)
//! Tick and snapshot rates, queue sizes and the bind address.
//!
//! ### Game Module (`game`)
//! The match rules, the locked simulation and its tick task.
//!
//! ### Sessions Module (`sessions`)
//! The registry of seated players and slot bookkeeping.
//!
//! ### Hub Module (`hub`)
//! The event loop that owns the registry and fans snapshots out.
//!
//! ### Router Module (`router`)
//! Decodes inbound envelopes and applies them to the game.
//!
//! ### Network Module (`network`)
//! TCP accept loop, health check, WebSocket upgrade and per-connection pumps.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::game::Game;
//! use server::hub::SessionHub;
//! use server::network::NetworkServer;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::default();
//!     let game = Arc::new(Game::new(&config));
//!     let (hub, _hub_loop) = SessionHub::start(game, &config);
//!
//!     let server = NetworkServer::bind(&config.bind_addr, hub.clone()).await?;
//!     tokio::select! {
//!         _ = server.run() => {}
//!         _ = tokio::signal::ctrl_c() => {}
//!     }
//!
//!     hub.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod game;
pub mod hub;
pub mod network;
pub mod router;
pub mod sessions;
