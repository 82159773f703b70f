//! Server network layer: TCP accept loop, health check and WebSocket sessions.
//!
//! Each upgraded connection is registered with the hub and then runs two
//! halves side by side: a writer draining the hub-owned outbound queue into
//! the socket, and a reader feeding inbound frames to the router under the
//! connection's current slot. Whichever half finishes first ends the
//! connection, and the hub is told exactly once.

use crate::hub::{ClientLink, SessionHub};
use crate::router::MessageRouter;
use futures::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

/// The only path that is upgraded to a game session.
pub const GAME_PATH: &str = "/ws/game";
const HEALTH_REQUEST: &[u8] = b"GET /health";
const HEALTH_PEEK_ATTEMPTS: usize = 100;
const HEALTH_PEEK_INTERVAL: Duration = Duration::from_millis(5);
const HEALTH_RESPONSE: &[u8] =
    b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 2\r\nConnection: close\r\n\r\nOK";

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("websocket handshake with {addr} failed: {source}")]
    Handshake {
        addr: SocketAddr,
        #[source]
        source: tokio_tungstenite::tungstenite::Error,
    },
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// TCP listener that serves the health check and game sessions
///
/// Every accepted connection runs on its own task; nothing one client does
/// can hold up the accept loop or another client.
pub struct NetworkServer {
    listener: TcpListener,
    hub: SessionHub,
    router: MessageRouter,
}

impl NetworkServer {
    /// Binds the listener. Sessions are registered with `hub` and their
    /// messages routed to the hub's engine.
    pub async fn bind(addr: &str, hub: SessionHub) -> Result<Self, NetworkError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| NetworkError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        let router = MessageRouter::new(std::sync::Arc::clone(hub.game()));

        Ok(Self {
            listener,
            hub,
            router,
        })
    }

    /// Address actually bound, useful when binding to port 0.
    pub fn local_addr(&self) -> Result<SocketAddr, NetworkError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts connections until the task is dropped.
    pub async fn run(self) {
        if let Ok(addr) = self.listener.local_addr() {
            info!("Game server listening on {}", addr);
            info!("WebSocket endpoint: ws://{}{}", addr, GAME_PATH);
        }

        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    let hub = self.hub.clone();
                    let router = self.router.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, addr, hub, router).await {
                            warn!("Connection from {} failed: {}", addr, e);
                        }
                    });
                }
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            }
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    hub: SessionHub,
    router: MessageRouter,
) -> Result<(), NetworkError> {
    if is_health_check(&stream).await? {
        return serve_health(stream).await;
    }

    let ws = tokio_tungstenite::accept_hdr_async(stream, check_path)
        .await
        .map_err(|source| NetworkError::Handshake { addr, source })?;
    info!("Client connected from {}", addr);

    let link = hub.register().await;
    let id = link.id;
    run_session(ws, link, &router).await;
    hub.unregister(id).await;

    info!("Client disconnected from {}", addr);
    Ok(())
}

fn check_path(request: &Request, response: Response) -> Result<Response, ErrorResponse> {
    if request.uri().path() == GAME_PATH {
        return Ok(response);
    }

    debug!("Refusing upgrade for {}", request.uri().path());
    let mut refusal = ErrorResponse::new(Some("Not Found".to_string()));
    *refusal.status_mut() = StatusCode::NOT_FOUND;
    Err(refusal)
}

/// Looks at the start of the request without consuming it. Waits for the
/// request line to arrive in full before deciding, but gives up as soon as
/// the bytes seen so far cannot be `GET /health`.
async fn is_health_check(stream: &TcpStream) -> Result<bool, NetworkError> {
    let needed = HEALTH_REQUEST.len() + 1;
    let mut buf = [0u8; 16];

    for _ in 0..HEALTH_PEEK_ATTEMPTS {
        let len = stream.peek(&mut buf).await?;
        if len == 0 {
            return Ok(false);
        }

        let peeked = &buf[..len];
        let prefix = len.min(HEALTH_REQUEST.len());
        if peeked[..prefix] != HEALTH_REQUEST[..prefix] {
            return Ok(false);
        }
        if len >= needed {
            return Ok(matches!(peeked[HEALTH_REQUEST.len()], b' ' | b'?'));
        }

        // Partial request line; peek returns straight away until more arrives.
        tokio::time::sleep(HEALTH_PEEK_INTERVAL).await;
    }

    debug!("Request line never completed");
    Ok(false)
}

async fn serve_health(mut stream: TcpStream) -> Result<(), NetworkError> {
    // Consume the request head so closing does not reset the connection.
    let mut request = Vec::with_capacity(256);
    let mut buf = [0u8; 256];
    while !request.windows(4).any(|w| w == b"\r\n\r\n") && request.len() < 4096 {
        let read = stream.read(&mut buf).await?;
        if read == 0 {
            break;
        }
        request.extend_from_slice(&buf[..read]);
    }

    stream.write_all(HEALTH_RESPONSE).await?;
    stream.shutdown().await?;
    Ok(())
}

async fn run_session(ws: WebSocketStream<TcpStream>, link: ClientLink, router: &MessageRouter) {
    let ClientLink {
        id,
        slot,
        mut outbound,
    } = link;
    let (mut sink, mut stream) = ws.split();

    let writer = async move {
        while let Some(frame) = outbound.recv().await {
            if let Err(e) = sink.send(Message::Text(frame.to_string())).await {
                debug!("Write to client {} failed: {}", id, e);
                return;
            }
        }
        // The hub let go of this client; close without a payload.
        debug!("Closing client {}", id);
        let _ = sink.close().await;
    };

    let reader = async move {
        while let Some(message) = stream.next().await {
            let frame = match message {
                Ok(Message::Text(text)) => text.into_bytes(),
                Ok(Message::Binary(bytes)) => bytes,
                Ok(Message::Close(_)) => break,
                Ok(_) => continue,
                Err(e) => {
                    debug!("Read from client {} failed: {}", id, e);
                    break;
                }
            };
            // Protocol faults are logged by the router and leave the connection open.
            let _ = router.handle(slot.get(), &frame).await;
        }
    };

    tokio::select! {
        _ = writer => {}
        _ = reader => {}
    }
}
