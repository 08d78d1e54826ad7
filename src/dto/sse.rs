use serde::Serialize;
use utoipa::ToSchema;

use crate::dto::room::{PlayerSummary, RoomSummary};

#[derive(Clone, Debug)]
/// Dispatched payload carried across SSE channels.
pub struct ServerEvent {
    /// SSE event name; `None` sends an unnamed message.
    pub event: Option<String>,
    /// Serialised JSON payload.
    pub data: String,
}

impl ServerEvent {
    /// Convenience wrapper that serialises `payload` into the SSE data field.
    pub fn json<E, T>(event: E, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self {
            event: event.into(),
            data: serde_json::to_string(payload)?,
        })
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when a player row is inserted or replaced.
pub struct PlayerChangedEvent {
    /// Player after the write.
    pub player: PlayerSummary,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when the room row is replaced.
pub struct RoomChangedEvent {
    /// Room after the write.
    pub room: RoomSummary,
}

#[derive(Debug, Serialize, ToSchema)]
/// Devices currently attached to the room.
pub struct PresenceEvent {
    /// Attached device ids.
    pub device_ids: Vec<String>,
}

#[derive(Debug, Serialize, ToSchema)]
/// Emitted when a host session is torn down; the host stream ends after it.
pub struct SessionClosedEvent {
    /// Room whose session closed.
    pub room_id: uuid::Uuid,
}
