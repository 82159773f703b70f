//! Headless bot: connects to the game server, asks for a match to start and
//! steers its paddle towards the ball until the time runs out.

use clap::Parser;
use futures::{SinkExt, StreamExt};
use log::{info, warn};
use shared::protocol::InputData;
use shared::{ClientMessage, GameState, MatchPhase, ServerMessage};
use std::time::Duration;
use tokio::time::{sleep_until, Instant};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// WebSocket URL of the game endpoint
    #[arg(short = 's', long, default_value = "ws://127.0.0.1:8080/ws/game")]
    server: String,

    /// Seconds to stay connected
    #[arg(short = 'd', long, default_value = "30")]
    duration: u64,
}

/// Direction that moves `paddle_center` towards `target_y`, with a dead zone
/// so the paddle does not jitter around the ball.
fn chase(paddle_center: f64, target_y: f64) -> f64 {
    const DEAD_ZONE: f64 = 10.0;
    if target_y < paddle_center - DEAD_ZONE {
        -1.0
    } else if target_y > paddle_center + DEAD_ZONE {
        1.0
    } else {
        0.0
    }
}

/// Paddle centre for our seat: player 1 is left, player 2 right.
fn own_center(state: &GameState, seat: u8) -> f64 {
    if seat == 2 {
        state.right.center_y()
    } else {
        state.left.center_y()
    }
}

/// Works out our seat from the player count. We join as the last seat, and
/// when someone leaves the server packs the remaining seats down from 1.
fn track_seat(seat: u8, last_count: usize, count: usize) -> u8 {
    if seat == 0 {
        count.clamp(1, 2) as u8
    } else if count < last_count {
        seat.min(count.max(1) as u8)
    } else {
        seat
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    info!("Connecting to {}", args.server);
    let (ws, _) = connect_async(args.server.as_str()).await?;
    let (mut sink, mut stream) = ws.split();

    let deadline = Instant::now() + Duration::from_secs(args.duration);
    let mut seat = 0u8;
    let mut last_count = 0usize;
    let mut last_direction = 0.0;
    let mut last_phase = None;
    let mut start_requested = false;

    loop {
        let message = tokio::select! {
            message = stream.next() => message,
            _ = sleep_until(deadline) => {
                info!("Test client finished");
                break;
            }
        };

        let text = match message {
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Close(_))) | None => {
                warn!("Server closed the connection (game full?)");
                break;
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                warn!("Connection error: {}", e);
                break;
            }
        };

        let state = match ServerMessage::decode(text.as_bytes()) {
            Ok(ServerMessage::GameState(state)) => state,
            Ok(ServerMessage::Error(error)) => {
                warn!("Server error: {}", error.message);
                continue;
            }
            Err(e) => {
                warn!("Failed to decode server message: {}", e);
                continue;
            }
        };

        let new_seat = track_seat(seat, last_count, state.session_count);
        if new_seat != seat {
            info!("Playing as player {}", new_seat);
            seat = new_seat;
        }

        if last_phase != Some(state.phase) || last_count != state.session_count {
            info!(
                "Match is {:?}: {} - {} ({} players)",
                state.phase, state.left_score, state.right_score, state.session_count
            );
            last_phase = Some(state.phase);
            start_requested = false;
        }
        last_count = state.session_count;

        if state.phase != MatchPhase::Playing {
            if state.session_count == 2 && !start_requested {
                sink.send(Message::Text(ClientMessage::StartGame.encode()?)).await?;
                start_requested = true;
            }
            continue;
        }

        let direction = chase(own_center(&state, seat), state.ball.y);
        if direction != last_direction {
            let input = ClientMessage::PlayerInput(InputData { direction });
            sink.send(Message::Text(input.encode()?)).await?;
            last_direction = direction;
        }
    }

    let _ = sink.close().await;
    Ok(())
}
