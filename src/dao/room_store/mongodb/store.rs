use std::sync::Arc;

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Client, Collection, Database,
    bson::doc,
    error::{Error as MongoError, ErrorKind, WriteFailure},
    options::IndexOptions,
};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    config::MongoConfig,
    connection::open_database,
    error::{MongoDaoError, MongoResult},
    models::{MongoPlayerDocument, MongoRoomDocument, doc_id, now, room_filter},
};
use crate::dao::{
    models::{PlayerEntity, RoomEntity, RoomStatus},
    room_store::RoomStore,
    storage::StorageResult,
};

const ROOM_COLLECTION_NAME: &str = "rooms";
const PLAYER_COLLECTION_NAME: &str = "players";
const STATS_COLLECTION_NAME: &str = "question_stats";
const DUPLICATE_KEY_CODE: i32 = 11000;

/// Room store backed by a MongoDB database.
#[derive(Clone)]
pub struct MongoRoomStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    #[allow(dead_code)]
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = {
            let guard = self.state.read().await;
            guard.database.clone()
        };

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) = open_database(&self.config).await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }
}

fn is_duplicate_key(err: &MongoError) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write_error))
            if write_error.code == DUPLICATE_KEY_CODE
    )
}

impl MongoRoomStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) = open_database(&config).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let database = self.database().await;

        let rooms = database.collection::<mongodb::bson::Document>(ROOM_COLLECTION_NAME);
        let pin_index = mongodb::IndexModel::builder()
            .keys(doc! {"pin_code": 1, "created_at": -1})
            .options(
                IndexOptions::builder()
                    .name(Some("room_pin_idx".to_owned()))
                    .build(),
            )
            .build();
        rooms
            .create_index(pin_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: ROOM_COLLECTION_NAME,
                index: "pin_code,created_at",
                source,
            })?;

        // One seat per device and room.
        let players = database.collection::<mongodb::bson::Document>(PLAYER_COLLECTION_NAME);
        let seat_index = mongodb::IndexModel::builder()
            .keys(doc! {"room_id": 1, "device_id": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("player_seat_idx".to_owned()))
                    .unique(Some(true))
                    .build(),
            )
            .build();
        players
            .create_index(seat_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: PLAYER_COLLECTION_NAME,
                index: "room_id,device_id",
                source,
            })?;

        Ok(())
    }

    async fn database(&self) -> Database {
        let guard = self.inner.state.read().await;
        guard.database.clone()
    }

    async fn rooms(&self) -> Collection<MongoRoomDocument> {
        let guard = self.inner.state.read().await;
        guard
            .database
            .collection::<MongoRoomDocument>(ROOM_COLLECTION_NAME)
    }

    async fn players(&self) -> Collection<MongoPlayerDocument> {
        let guard = self.inner.state.read().await;
        guard
            .database
            .collection::<MongoPlayerDocument>(PLAYER_COLLECTION_NAME)
    }

    async fn insert_room(&self, room: RoomEntity) -> MongoResult<()> {
        let id = room.id;
        let document: MongoRoomDocument = room.into();
        self.rooms()
            .await
            .insert_one(&document)
            .await
            .map_err(|source| MongoDaoError::SaveRoom { id, source })?;
        Ok(())
    }

    async fn save_room(&self, room: RoomEntity) -> MongoResult<()> {
        let id = room.id;
        let document: MongoRoomDocument = room.into();
        self.rooms()
            .await
            .replace_one(doc_id(id), &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::SaveRoom { id, source })?;
        Ok(())
    }

    async fn find_room(&self, id: Uuid) -> MongoResult<Option<RoomEntity>> {
        let document = self
            .rooms()
            .await
            .find_one(doc_id(id))
            .await
            .map_err(|source| MongoDaoError::LoadRoom { id, source })?;

        document.map(RoomEntity::try_from).transpose()
    }

    async fn query_rooms(&self, filter: mongodb::bson::Document) -> MongoResult<Vec<RoomEntity>> {
        let documents: Vec<MongoRoomDocument> = self
            .rooms()
            .await
            .find(filter)
            .sort(doc! {"created_at": -1})
            .await
            .map_err(|source| MongoDaoError::QueryRooms { source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::QueryRooms { source })?;

        documents.into_iter().map(RoomEntity::try_from).collect()
    }

    async fn pin_in_use(&self, pin: String) -> MongoResult<bool> {
        let count = self
            .rooms()
            .await
            .count_documents(doc! {
                "pin_code": pin,
                "status": {"$ne": RoomStatus::Finished.as_str()},
            })
            .await
            .map_err(|source| MongoDaoError::QueryRooms { source })?;
        Ok(count > 0)
    }

    async fn delete_room(&self, id: Uuid) -> MongoResult<bool> {
        let result = self
            .rooms()
            .await
            .delete_one(doc_id(id))
            .await
            .map_err(|source| MongoDaoError::DeleteRoom { id, source })?;

        self.delete_players(id).await?;

        let database = self.database().await;
        database
            .collection::<mongodb::bson::Document>(STATS_COLLECTION_NAME)
            .delete_many(room_filter(id))
            .await
            .map_err(|source| MongoDaoError::DeleteRoom { id, source })?;

        Ok(result.deleted_count > 0)
    }

    async fn insert_player(&self, player: PlayerEntity) -> MongoResult<()> {
        let id = player.id;
        let room_id = player.room_id;
        let device_id = player.device_id.clone();
        let document: MongoPlayerDocument = player.into();
        self.players()
            .await
            .insert_one(&document)
            .await
            .map_err(|source| {
                if is_duplicate_key(&source) {
                    MongoDaoError::DuplicatePlayer { room_id, device_id }
                } else {
                    MongoDaoError::SavePlayer { id, source }
                }
            })?;
        Ok(())
    }

    async fn save_player(&self, player: PlayerEntity) -> MongoResult<bool> {
        let id = player.id;
        let document: MongoPlayerDocument = player.into();
        let result = self
            .players()
            .await
            .replace_one(doc_id(id), &document)
            .await
            .map_err(|source| MongoDaoError::SavePlayer { id, source })?;
        Ok(result.matched_count > 0)
    }

    async fn find_one_player(
        &self,
        room_id: Uuid,
        filter: mongodb::bson::Document,
    ) -> MongoResult<Option<PlayerEntity>> {
        let document = self
            .players()
            .await
            .find_one(filter)
            .await
            .map_err(|source| MongoDaoError::QueryPlayers { room_id, source })?;

        document.map(PlayerEntity::try_from).transpose()
    }

    async fn list_players(&self, room_id: Uuid) -> MongoResult<Vec<PlayerEntity>> {
        let documents: Vec<MongoPlayerDocument> = self
            .players()
            .await
            .find(room_filter(room_id))
            .sort(doc! {"joined_seq": 1})
            .await
            .map_err(|source| MongoDaoError::QueryPlayers { room_id, source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::QueryPlayers { room_id, source })?;

        documents.into_iter().map(PlayerEntity::try_from).collect()
    }

    async fn delete_players(&self, room_id: Uuid) -> MongoResult<u64> {
        let result = self
            .players()
            .await
            .delete_many(room_filter(room_id))
            .await
            .map_err(|source| MongoDaoError::QueryPlayers { room_id, source })?;
        Ok(result.deleted_count)
    }

    async fn record_answer(
        &self,
        room_id: Uuid,
        question_id: String,
        correct: bool,
    ) -> MongoResult<()> {
        let database = self.database().await;
        database
            .collection::<mongodb::bson::Document>(STATS_COLLECTION_NAME)
            .update_one(
                doc! {"room_id": room_id.to_string(), "question_id": &question_id},
                doc! {
                    "$inc": {"answers": 1_i64, "correct": if correct { 1_i64 } else { 0_i64 }},
                    "$set": {"updated_at": now()},
                },
            )
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::RecordAnswer {
                question_id,
                source,
            })?;
        Ok(())
    }
}

impl RoomStore for MongoRoomStore {
    fn insert_room(&self, room: RoomEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.insert_room(room).await.map_err(Into::into) })
    }

    fn save_room(&self, room: RoomEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.save_room(room).await.map_err(Into::into) })
    }

    fn find_room(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<RoomEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_room(id).await.map_err(Into::into) })
    }

    fn find_rooms_by_pin(&self, pin: String) -> BoxFuture<'static, StorageResult<Vec<RoomEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .query_rooms(doc! {"pin_code": pin})
                .await
                .map_err(Into::into)
        })
    }

    fn pin_in_use(&self, pin: String) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.pin_in_use(pin).await.map_err(Into::into) })
    }

    fn list_rooms(&self, host_id: String) -> BoxFuture<'static, StorageResult<Vec<RoomEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .query_rooms(doc! {"host_id": host_id})
                .await
                .map_err(Into::into)
        })
    }

    fn delete_room(&self, id: Uuid) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.delete_room(id).await.map_err(Into::into) })
    }

    fn insert_player(&self, player: PlayerEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.insert_player(player).await.map_err(Into::into) })
    }

    fn save_player(&self, player: PlayerEntity) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.save_player(player).await.map_err(Into::into) })
    }

    fn find_player(
        &self,
        room_id: Uuid,
        player_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<PlayerEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .find_one_player(
                    room_id,
                    doc! {"_id": player_id.to_string(), "room_id": room_id.to_string()},
                )
                .await
                .map_err(Into::into)
        })
    }

    fn find_player_by_device(
        &self,
        room_id: Uuid,
        device_id: String,
    ) -> BoxFuture<'static, StorageResult<Option<PlayerEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .find_one_player(
                    room_id,
                    doc! {"room_id": room_id.to_string(), "device_id": device_id},
                )
                .await
                .map_err(Into::into)
        })
    }

    fn find_player_by_nickname(
        &self,
        room_id: Uuid,
        nickname: String,
    ) -> BoxFuture<'static, StorageResult<Option<PlayerEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .find_one_player(
                    room_id,
                    doc! {"room_id": room_id.to_string(), "nickname": nickname},
                )
                .await
                .map_err(Into::into)
        })
    }

    fn list_players(&self, room_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<PlayerEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_players(room_id).await.map_err(Into::into) })
    }

    fn delete_players(&self, room_id: Uuid) -> BoxFuture<'static, StorageResult<u64>> {
        let store = self.clone();
        Box::pin(async move { store.delete_players(room_id).await.map_err(Into::into) })
    }

    fn record_answer(
        &self,
        room_id: Uuid,
        question_id: String,
        correct: bool,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .record_answer(room_id, question_id, correct)
                .await
                .map_err(Into::into)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}
