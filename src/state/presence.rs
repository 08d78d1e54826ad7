use std::sync::Arc;

use dashmap::DashMap;
use indexmap::IndexMap;
use tracing::debug;
use uuid::Uuid;

use crate::state::bus::{ChangeBus, ChangeEvent};

/// Ephemeral registry of devices attached to each room.
///
/// A device may hold several sockets at once; it stays present until the last
/// one goes away. Presence is informational and never drives transitions.
pub struct PresenceRegistry {
    rooms: DashMap<Uuid, IndexMap<String, usize>>,
    bus: Arc<ChangeBus>,
}

impl PresenceRegistry {
    /// Registry publishing presence changes on `bus`.
    pub fn new(bus: Arc<ChangeBus>) -> Arc<Self> {
        Arc::new(Self {
            rooms: DashMap::new(),
            bus,
        })
    }

    /// Register `device_id` on `room_id` for as long as the returned guard lives.
    pub fn track(self: &Arc<Self>, room_id: Uuid, device_id: String) -> PresenceGuard {
        {
            let mut devices = self.rooms.entry(room_id).or_default();
            *devices.entry(device_id.clone()).or_insert(0) += 1;
        }
        debug!(room_id = %room_id, device_id = %device_id, "presence tracked");
        self.sync(room_id);

        PresenceGuard {
            registry: Arc::clone(self),
            room_id,
            device_id,
        }
    }

    /// Device ids currently present in `room_id`, in arrival order.
    pub fn devices(&self, room_id: Uuid) -> Vec<String> {
        self.rooms
            .get(&room_id)
            .map(|devices| devices.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn untrack(&self, room_id: Uuid, device_id: &str) {
        if let Some(mut devices) = self.rooms.get_mut(&room_id) {
            if let Some(count) = devices.get_mut(device_id) {
                *count -= 1;
                if *count == 0 {
                    devices.shift_remove(device_id);
                }
            }
        }
        self.rooms.remove_if(&room_id, |_, devices| devices.is_empty());
        debug!(room_id = %room_id, device_id = %device_id, "presence untracked");
        self.sync(room_id);
    }

    fn sync(&self, room_id: Uuid) {
        let device_ids = self.devices(room_id);
        self.bus
            .publish(room_id, ChangeEvent::PresenceSync { device_ids });
    }
}

/// Keeps a device present until dropped.
pub struct PresenceGuard {
    registry: Arc<PresenceRegistry>,
    room_id: Uuid,
    device_id: String,
}

impl Drop for PresenceGuard {
    fn drop(&mut self) {
        self.registry.untrack(self.room_id, &self.device_id);
    }
}
