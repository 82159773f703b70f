//! JSON envelopes exchanged over the game socket.
//!
//! Every frame is `{"type": <kind>, "data": <payload>}`. Inbound kinds are
//! decoded into [`ClientMessage`], outbound ones encoded from [`ServerMessage`].

use crate::GameState;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const PLAYER_INPUT: &str = "player_input";
pub const START_GAME: &str = "start_game";
pub const RESET_GAME: &str = "reset_game";

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed envelope: {0}")]
    Malformed(#[source] serde_json::Error),
    #[error("unknown message type `{0}`")]
    UnknownKind(String),
    #[error("invalid payload for `{kind}`: {source}")]
    InvalidPayload {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Payload of a `player_input` message.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InputData {
    /// -1 up, 0 stop, 1 down. Other values are quantised by the server.
    pub direction: f64,
}

/// Messages a client may send.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    PlayerInput(InputData),
    StartGame,
    ResetGame,
}

#[derive(Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Option<serde_json::Value>,
}

#[derive(Serialize)]
struct OutEnvelope<'a, T: Serialize> {
    #[serde(rename = "type")]
    kind: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
}

impl ClientMessage {
    /// Wire name of the message, as carried in `type`.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::PlayerInput(_) => PLAYER_INPUT,
            ClientMessage::StartGame => START_GAME,
            ClientMessage::ResetGame => RESET_GAME,
        }
    }

    /// Decodes one inbound frame. Any `playerId` carried by an input payload
    /// is discarded; the server attributes input by connection.
    pub fn decode(bytes: &[u8]) -> Result<ClientMessage, ProtocolError> {
        let raw: RawEnvelope = serde_json::from_slice(bytes).map_err(ProtocolError::Malformed)?;

        match raw.kind.as_str() {
            PLAYER_INPUT => {
                let data = raw.data.unwrap_or(serde_json::Value::Null);
                let input = serde_json::from_value(data).map_err(|source| {
                    ProtocolError::InvalidPayload {
                        kind: PLAYER_INPUT,
                        source,
                    }
                })?;
                Ok(ClientMessage::PlayerInput(input))
            }
            START_GAME => Ok(ClientMessage::StartGame),
            RESET_GAME => Ok(ClientMessage::ResetGame),
            _ => Err(ProtocolError::UnknownKind(raw.kind)),
        }
    }

    /// Encodes the message the way a client would send it.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        let envelope = OutEnvelope {
            kind: self.kind(),
            data: match self {
                ClientMessage::PlayerInput(input) => Some(*input),
                ClientMessage::StartGame | ClientMessage::ResetGame => None,
            },
        };
        serde_json::to_string(&envelope).map_err(ProtocolError::Encode)
    }
}

/// Payload of an `error` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorData {
    pub message: String,
}

/// Messages the server sends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    GameState(GameState),
    Error(ErrorData),
}

impl ServerMessage {
    /// Encodes the message as one text frame.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::Encode)
    }

    pub fn decode(bytes: &[u8]) -> Result<ServerMessage, ProtocolError> {
        serde_json::from_slice(bytes).map_err(ProtocolError::Malformed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MatchPhase;

    #[test]
    fn test_decode_player_input() {
        let msg = ClientMessage::decode(br#"{"type":"player_input","data":{"direction":-1}}"#)
            .unwrap();
        assert_eq!(msg, ClientMessage::PlayerInput(InputData { direction: -1.0 }));
    }

    #[test]
    fn test_decode_ignores_player_id() {
        let msg = ClientMessage::decode(
            br#"{"type":"player_input","data":{"direction":0.7,"playerId":2}}"#,
        )
        .unwrap();
        assert_eq!(msg, ClientMessage::PlayerInput(InputData { direction: 0.7 }));
    }

    #[test]
    fn test_decode_commands_without_payload() {
        assert_eq!(
            ClientMessage::decode(br#"{"type":"start_game"}"#).unwrap(),
            ClientMessage::StartGame
        );
        assert_eq!(
            ClientMessage::decode(br#"{"type":"reset_game","data":{"anything":true}}"#).unwrap(),
            ClientMessage::ResetGame
        );
    }

    #[test]
    fn test_decode_unknown_kind() {
        match ClientMessage::decode(br#"{"type":"teleport","data":{}}"#) {
            Err(ProtocolError::UnknownKind(kind)) => assert_eq!(kind, "teleport"),
            other => panic!("Expected unknown kind, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_invalid_payload() {
        let result = ClientMessage::decode(br#"{"type":"player_input","data":{"direction":"up"}}"#);
        assert!(matches!(
            result,
            Err(ProtocolError::InvalidPayload { kind: PLAYER_INPUT, .. })
        ));

        let missing = ClientMessage::decode(br#"{"type":"player_input"}"#);
        assert!(matches!(missing, Err(ProtocolError::InvalidPayload { .. })));
    }

    #[test]
    fn test_decode_malformed() {
        assert!(matches!(
            ClientMessage::decode(b"not json"),
            Err(ProtocolError::Malformed(_))
        ));
        assert!(matches!(
            ClientMessage::decode(br#"{"data":{}}"#),
            Err(ProtocolError::Malformed(_))
        ));
        assert!(matches!(ClientMessage::decode(b""), Err(ProtocolError::Malformed(_))));
    }

    #[test]
    fn test_client_encoding_matches_wire_shape() {
        let input = ClientMessage::PlayerInput(InputData { direction: 1.0 })
            .encode()
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&input).unwrap();
        assert_eq!(value["type"], "player_input");
        assert_eq!(value["data"]["direction"], 1.0);

        let start = ClientMessage::StartGame.encode().unwrap();
        assert_eq!(start, r#"{"type":"start_game"}"#);
    }

    #[test]
    fn test_game_state_envelope() {
        let encoded = ServerMessage::GameState(GameState::new()).encode().unwrap();
        let value: serde_json::Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(value["type"], "game_state");
        assert_eq!(value["data"]["state"], "waiting");
        assert_eq!(value["data"]["player1Score"], 0);

        match ServerMessage::decode(encoded.as_bytes()).unwrap() {
            ServerMessage::GameState(state) => assert_eq!(state.phase, MatchPhase::Waiting),
            other => panic!("Unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_error_envelope() {
        let encoded = ServerMessage::Error(ErrorData {
            message: "bad".to_string(),
        })
        .encode()
        .unwrap();
        assert_eq!(encoded, r#"{"type":"error","data":{"message":"bad"}}"#);
    }
}
