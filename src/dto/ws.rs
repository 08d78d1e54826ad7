use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::dto::room::{PlayerSummary, RoomSnapshot, RoomSummary};

#[derive(Debug, Deserialize, Serialize, ToSchema)]
/// Messages accepted from player WebSocket clients.
#[serde(tag = "type")]
pub enum PlayerInboundMessage {
    /// First frame of every connection.
    #[serde(rename = "identification")]
    Identification {
        /// Stable identifier the client stores locally.
        device_id: String,
    },
    /// The player's own score/streak/answer write.
    #[serde(rename = "answer")]
    Answer {
        /// Total score after this answer.
        score: i64,
        /// Consecutive correct answers.
        streak: u32,
        /// Raw answer value, if any.
        #[serde(default)]
        last_answer: Option<String>,
    },
    /// Any frame with an unrecognised `type`.
    #[serde(other)]
    Unknown,
}

impl PlayerInboundMessage {
    /// Parse one text frame.
    pub fn from_json_str(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// Messages pushed to player WebSocket clients.
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlayerOutboundMessage {
    /// Sent once after identification.
    Welcome {
        /// Row bound to this connection.
        player_id: uuid::Uuid,
        /// Room and roster at identification time.
        snapshot: RoomSnapshot,
    },
    /// The room row changed.
    RoomUpdated {
        /// New state of the room.
        room: RoomSummary,
    },
    /// Someone joined the lobby.
    PlayerJoined {
        /// The new player.
        player: PlayerSummary,
    },
    /// A player's score or streak changed.
    PlayerUpdated {
        /// The player after the write.
        player: PlayerSummary,
    },
    /// Devices currently connected to the room.
    Presence {
        /// Connected device ids.
        device_ids: Vec<String>,
    },
    /// The last frame could not be handled.
    Error {
        /// Human readable reason.
        message: String,
    },
}
