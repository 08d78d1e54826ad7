use serde::Serialize;
use tracing::warn;

use crate::{
    dao::models::{PlayerEntity, RoomEntity},
    dto::{
        room::RoomSnapshot,
        sse::{PlayerChangedEvent, PresenceEvent, RoomChangedEvent, ServerEvent},
    },
    state::bus::ChangeEvent,
};

/// Full room record plus players, sent first on every stream.
pub const EVENT_ROOM_SNAPSHOT: &str = "room.snapshot";

/// SSE rendition of a bus event.
pub fn change_event(event: &ChangeEvent) -> Option<ServerEvent> {
    let name = event.kind();
    match event {
        ChangeEvent::PlayerJoined(player) | ChangeEvent::PlayerUpdated(player) => to_event(
            name,
            &PlayerChangedEvent {
                player: player.into(),
            },
        ),
        ChangeEvent::RoomUpdated(room) => to_event(name, &RoomChangedEvent { room: room.into() }),
        ChangeEvent::PresenceSync { device_ids } => to_event(
            name,
            &PresenceEvent {
                device_ids: device_ids.clone(),
            },
        ),
    }
}

/// Room snapshot event sent first on every room stream.
pub fn room_snapshot(room: &RoomEntity, players: &[PlayerEntity]) -> Option<ServerEvent> {
    to_event(EVENT_ROOM_SNAPSHOT, &RoomSnapshot::new(room, players))
}

fn to_event<T: Serialize>(name: &str, payload: &T) -> Option<ServerEvent> {
    match ServerEvent::json(Some(name.to_owned()), payload) {
        Ok(event) => Some(event),
        Err(err) => {
            warn!(event = name, error = %err, "failed to serialise SSE payload");
            None
        }
    }
}
