/// Connection settings.
pub mod config;
mod connection;
mod error;
mod models;
/// [`RoomStore`](super::RoomStore) implementation.
pub mod store;

pub use config::MongoConfig;
pub use error::MongoDaoError;
pub use store::MongoRoomStore;

use crate::dao::storage::StorageError;

impl From<MongoDaoError> for StorageError {
    fn from(err: MongoDaoError) -> Self {
        match err {
            MongoDaoError::DuplicatePlayer { room_id, device_id } => StorageError::Conflict(
                format!("device `{device_id}` already joined room `{room_id}`"),
            ),
            other => StorageError::unavailable(other.to_string(), other),
        }
    }
}
