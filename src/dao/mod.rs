/// Database model definitions.
pub mod models;
/// Bus-publishing access to the room store.
pub mod room;
/// Room store abstraction and its backends.
pub mod room_store;
/// Storage abstraction layer for database operations.
pub mod storage;
