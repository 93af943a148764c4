//! Drawroom wire protocol.
//!
//! Every message is a JSON text frame with a `type` discriminator. Clients
//! send [`ClientFrame`]s; the gateway answers with [`ServerFrame`]s. Draw
//! payloads are opaque JSON values that the relay forwards untouched.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{ConnectionId, RoomId};

/// Client -> Server envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Enter a room (or switch to it).
    #[serde(rename_all = "camelCase")]
    Join { room_id: RoomId, name: String },

    /// Drawing operation to relay to the rest of the room.
    #[serde(rename_all = "camelCase")]
    Draw { draw_data: serde_json::Value },

    /// Chat line to relay to the rest of the room.
    Chat { name: String, message: String },
}

/// `type` values understood by [`ClientFrame::decode`].
const CLIENT_KINDS: &[&str] = &["join", "draw", "chat"];

/// Server -> Client envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Sent only to a joiner: everyone already in the room.
    CurrentParticipants { participants: Vec<ConnectionId> },

    #[serde(rename_all = "camelCase")]
    ParticipantJoined { user_id: ConnectionId, name: String },

    #[serde(rename_all = "camelCase")]
    ParticipantLeft { user_id: ConnectionId },

    #[serde(rename_all = "camelCase")]
    Draw {
        user_id: ConnectionId,
        draw_data: serde_json::Value,
    },

    #[serde(rename_all = "camelCase")]
    Chat {
        user_id: ConnectionId,
        name: String,
        message: String,
    },
}

impl ServerFrame {
    /// The wire `type` of this frame.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CurrentParticipants { .. } => "current_participants",
            Self::ParticipantJoined { .. } => "participant_joined",
            Self::ParticipantLeft { .. } => "participant_left",
            Self::Draw { .. } => "draw",
            Self::Chat { .. } => "chat",
        }
    }
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),

    #[error("missing or non-string `type` field")]
    MissingType,

    #[error("malformed `{kind}` frame: {source}")]
    Malformed {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

impl ClientFrame {
    /// Decode a text frame.
    ///
    /// Returns `Ok(None)` for a well-formed record whose `type` is not one we
    /// understand, so newer clients can send kinds this gateway ignores.
    pub fn decode(text: &str) -> Result<Option<Self>, ProtocolError> {
        let value: serde_json::Value =
            serde_json::from_str(text).map_err(ProtocolError::InvalidJson)?;

        let kind = value
            .get("type")
            .and_then(|t| t.as_str())
            .ok_or(ProtocolError::MissingType)?
            .to_string();

        if !CLIENT_KINDS.contains(&kind.as_str()) {
            return Ok(None);
        }

        serde_json::from_value(value)
            .map(Some)
            .map_err(|source| ProtocolError::Malformed { kind, source })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Join { .. } => "join",
            Self::Draw { .. } => "draw",
            Self::Chat { .. } => "chat",
        }
    }
}
