/// In-process store used by tests and when no database is configured.
pub mod memory;
/// MongoDB backend.
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use crate::dao::models::{PlayerEntity, RoomEntity};
use crate::dao::storage::StorageResult;
use futures::future::BoxFuture;
use uuid::Uuid;

pub use memory::InMemoryRoomStore;

/// Abstraction over the shared room store.
///
/// Writes replace whole rows; there is no row level locking, the last write wins.
pub trait RoomStore: Send + Sync {
    /// Insert a new room.
    fn insert_room(&self, room: RoomEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Replace a room row.
    fn save_room(&self, room: RoomEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Room by id.
    fn find_room(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<RoomEntity>>>;
    /// Rooms holding `pin`, most recently created first.
    fn find_rooms_by_pin(&self, pin: String) -> BoxFuture<'static, StorageResult<Vec<RoomEntity>>>;
    /// Whether a non finished room already holds `pin`.
    fn pin_in_use(&self, pin: String) -> BoxFuture<'static, StorageResult<bool>>;
    /// Rooms owned by `host_id`.
    fn list_rooms(&self, host_id: String) -> BoxFuture<'static, StorageResult<Vec<RoomEntity>>>;
    /// Delete a room together with its players.
    fn delete_room(&self, id: Uuid) -> BoxFuture<'static, StorageResult<bool>>;

    /// Insert a player, failing with `StorageError::Conflict` when the device already has a seat.
    fn insert_player(&self, player: PlayerEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Replace an existing player row. Returns `false` without writing when
    /// the row is gone, so a late write never brings a deleted player back.
    fn save_player(&self, player: PlayerEntity) -> BoxFuture<'static, StorageResult<bool>>;
    /// Player of a room by id.
    fn find_player(
        &self,
        room_id: Uuid,
        player_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<PlayerEntity>>>;
    /// Seat held by `device_id` in the room.
    fn find_player_by_device(
        &self,
        room_id: Uuid,
        device_id: String,
    ) -> BoxFuture<'static, StorageResult<Option<PlayerEntity>>>;
    /// Player whose nickname matches, ignoring case.
    fn find_player_by_nickname(
        &self,
        room_id: Uuid,
        nickname: String,
    ) -> BoxFuture<'static, StorageResult<Option<PlayerEntity>>>;
    /// Players of a room in insertion order.
    fn list_players(&self, room_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<PlayerEntity>>>;
    /// Delete every player of a room, returning how many were removed.
    fn delete_players(&self, room_id: Uuid) -> BoxFuture<'static, StorageResult<u64>>;

    /// Increment the answer counters of a question.
    fn record_answer(
        &self,
        room_id: Uuid,
        question_id: String,
        correct: bool,
    ) -> BoxFuture<'static, StorageResult<()>>;

    /// Ping the backend.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    /// Drop the current connection and open a new one.
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
