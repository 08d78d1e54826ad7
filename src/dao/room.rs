use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use crate::{
    dao::{
        models::{PlayerEntity, RoomEntity},
        room_store::RoomStore,
        storage::StorageResult,
    },
    state::bus::{ChangeBus, ChangeEvent},
};

/// Store access that publishes every successful write on the change bus.
#[derive(Clone)]
pub struct RoomRepository {
    store: Arc<dyn RoomStore>,
    bus: Arc<ChangeBus>,
}

impl RoomRepository {
    /// Wrap a store; writes are published on `bus`.
    pub fn new(store: Arc<dyn RoomStore>, bus: Arc<ChangeBus>) -> Self {
        Self { store, bus }
    }

    /// Underlying store, for reads that need no publication.
    pub fn store(&self) -> &Arc<dyn RoomStore> {
        &self.store
    }

    /// Insert a new room and publish it.
    pub async fn insert_room(&self, room: RoomEntity) -> StorageResult<()> {
        self.store.insert_room(room.clone()).await?;
        self.publish(room.id, ChangeEvent::RoomUpdated(room));
        Ok(())
    }

    /// Replace a room and publish it.
    pub async fn save_room(&self, room: RoomEntity) -> StorageResult<()> {
        self.store.save_room(room.clone()).await?;
        self.publish(room.id, ChangeEvent::RoomUpdated(room));
        Ok(())
    }

    /// Room by id.
    pub async fn find_room(&self, id: Uuid) -> StorageResult<Option<RoomEntity>> {
        self.store.find_room(id).await
    }

    /// Rooms carrying `pin`, most recent first.
    pub async fn find_rooms_by_pin(&self, pin: &str) -> StorageResult<Vec<RoomEntity>> {
        self.store.find_rooms_by_pin(pin.to_owned()).await
    }

    /// Whether a non-finished room already uses `pin`.
    pub async fn pin_in_use(&self, pin: &str) -> StorageResult<bool> {
        self.store.pin_in_use(pin.to_owned()).await
    }

    /// Rooms owned by `host_id`.
    pub async fn list_rooms(&self, host_id: &str) -> StorageResult<Vec<RoomEntity>> {
        self.store.list_rooms(host_id.to_owned()).await
    }

    /// Delete a room. Returns `false` when it did not exist.
    pub async fn delete_room(&self, id: Uuid) -> StorageResult<bool> {
        self.store.delete_room(id).await
    }

    /// Insert a new player and publish the join.
    pub async fn insert_player(&self, player: PlayerEntity) -> StorageResult<()> {
        self.store.insert_player(player.clone()).await?;
        self.publish(player.room_id, ChangeEvent::PlayerJoined(player));
        Ok(())
    }

    /// Replace an existing player. Nothing is published when the row is gone.
    pub async fn save_player(&self, player: PlayerEntity) -> StorageResult<bool> {
        let saved = self.store.save_player(player.clone()).await?;
        if saved {
            self.publish(player.room_id, ChangeEvent::PlayerUpdated(player));
        }
        Ok(saved)
    }

    /// Player of `room_id` by id.
    pub async fn find_player(
        &self,
        room_id: Uuid,
        player_id: Uuid,
    ) -> StorageResult<Option<PlayerEntity>> {
        self.store.find_player(room_id, player_id).await
    }

    /// Seat held by a device in the room.
    pub async fn find_player_by_device(
        &self,
        room_id: Uuid,
        device_id: &str,
    ) -> StorageResult<Option<PlayerEntity>> {
        self.store
            .find_player_by_device(room_id, device_id.to_owned())
            .await
    }

    /// Player using `nickname`, case-insensitive.
    pub async fn find_player_by_nickname(
        &self,
        room_id: Uuid,
        nickname: &str,
    ) -> StorageResult<Option<PlayerEntity>> {
        self.store
            .find_player_by_nickname(room_id, nickname.to_owned())
            .await
    }

    /// Players of the room in join order.
    pub async fn list_players(&self, room_id: Uuid) -> StorageResult<Vec<PlayerEntity>> {
        self.store.list_players(room_id).await
    }

    /// Wipe all players of the room. Nothing is published.
    pub async fn delete_players(&self, room_id: Uuid) -> StorageResult<u64> {
        self.store.delete_players(room_id).await
    }

    fn publish(&self, room_id: Uuid, event: ChangeEvent) {
        debug!(room_id = %room_id, kind = event.kind(), "publishing change");
        self.bus.publish(room_id, event);
    }
}
