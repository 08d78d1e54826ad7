use mongodb::error::Error as MongoError;
use thiserror::Error;
use uuid::Uuid;

/// Result alias for MongoDB operations.
pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

/// Failures of the MongoDB backend.
#[derive(Debug, Error)]
pub enum MongoDaoError {
    /// The connection string could not be parsed.
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        /// Rejected URI.
        uri: String,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// The driver refused the client options.
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// The server never answered the startup ping.
    #[error("MongoDB ping failed during initial connection after {attempts} attempt(s)")]
    InitialPing {
        /// Pings sent before giving up.
        attempts: u32,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// A periodic ping failed.
    #[error("MongoDB ping health check failed")]
    HealthPing {
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// Index creation failed at startup.
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        /// Collection name.
        collection: &'static str,
        /// Index name.
        index: &'static str,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// Writing a room failed.
    #[error("failed to save room `{id}`")]
    SaveRoom {
        /// Room id.
        id: Uuid,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// Reading a room failed.
    #[error("failed to load room `{id}`")]
    LoadRoom {
        /// Room id.
        id: Uuid,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// Deleting a room failed.
    #[error("failed to delete room `{id}`")]
    DeleteRoom {
        /// Room id.
        id: Uuid,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// A room query failed.
    #[error("failed to query rooms")]
    QueryRooms {
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// Writing a player failed.
    #[error("failed to save player `{id}`")]
    SavePlayer {
        /// Player id.
        id: Uuid,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// A player query failed.
    #[error("failed to query players of room `{room_id}`")]
    QueryPlayers {
        /// Room id.
        room_id: Uuid,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// The unique `(room_id, device_id)` index rejected an insert.
    #[error("device `{device_id}` already joined room `{room_id}`")]
    DuplicatePlayer {
        /// Room id.
        room_id: Uuid,
        /// Device that already holds a seat.
        device_id: String,
    },
    /// A stored `_id` is not a UUID.
    #[error("stored document `{id}` carries an invalid identifier")]
    CorruptDocument {
        /// Raw identifier.
        id: String,
        /// Parse error.
        #[source]
        source: uuid::Error,
    },
    /// Updating answer counters failed.
    #[error("failed to record answer stats for question `{question_id}`")]
    RecordAnswer {
        /// Question id.
        question_id: String,
        /// Driver error.
        #[source]
        source: MongoError,
    },
}
