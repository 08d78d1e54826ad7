use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use futures::future::BoxFuture;
use indexmap::IndexMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::dao::{
    models::{PlayerEntity, QuestionStatsEntity, RoomEntity, RoomStatus},
    room_store::RoomStore,
    storage::{StorageError, StorageResult},
};

/// Process-local room store backed by insertion ordered maps.
#[derive(Clone, Default)]
pub struct InMemoryRoomStore {
    inner: Arc<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    tables: RwLock<Tables>,
    fail_writes: AtomicBool,
}

#[derive(Default)]
struct Tables {
    rooms: IndexMap<Uuid, RoomEntity>,
    players: IndexMap<Uuid, PlayerEntity>,
    stats: HashMap<(Uuid, String), QuestionStatsEntity>,
}

impl InMemoryRoomStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail, simulating an unreachable backend.
    #[cfg(test)]
    pub fn set_fail_writes(&self, fail: bool) {
        self.inner.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Current answer counters of a question, if any were recorded.
    pub async fn question_stats(
        &self,
        room_id: Uuid,
        question_id: &str,
    ) -> Option<QuestionStatsEntity> {
        let tables = self.inner.tables.read().await;
        tables
            .stats
            .get(&(room_id, question_id.to_owned()))
            .cloned()
    }

    fn check_writable(&self) -> StorageResult<()> {
        if self.inner.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::unavailable_msg("in-memory store rejected the write"));
        }
        Ok(())
    }
}

impl RoomStore for InMemoryRoomStore {
    fn insert_room(&self, room: RoomEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.check_writable()?;
            let mut tables = store.inner.tables.write().await;
            if tables.rooms.contains_key(&room.id) {
                return Err(StorageError::Conflict(format!("room `{}` already exists", room.id)));
            }
            tables.rooms.insert(room.id, room);
            Ok(())
        })
    }

    fn save_room(&self, room: RoomEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.check_writable()?;
            let mut tables = store.inner.tables.write().await;
            tables.rooms.insert(room.id, room);
            Ok(())
        })
    }

    fn find_room(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<RoomEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let tables = store.inner.tables.read().await;
            Ok(tables.rooms.get(&id).cloned())
        })
    }

    fn find_rooms_by_pin(&self, pin: String) -> BoxFuture<'static, StorageResult<Vec<RoomEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let tables = store.inner.tables.read().await;
            let mut rooms: Vec<RoomEntity> = tables
                .rooms
                .values()
                .filter(|room| room.pin_code == pin)
                .cloned()
                .collect();
            rooms.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(rooms)
        })
    }

    fn pin_in_use(&self, pin: String) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            let tables = store.inner.tables.read().await;
            Ok(tables
                .rooms
                .values()
                .any(|room| room.pin_code == pin && room.status != RoomStatus::Finished))
        })
    }

    fn list_rooms(&self, host_id: String) -> BoxFuture<'static, StorageResult<Vec<RoomEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let tables = store.inner.tables.read().await;
            let mut rooms: Vec<RoomEntity> = tables
                .rooms
                .values()
                .filter(|room| room.host_id == host_id)
                .cloned()
                .collect();
            rooms.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(rooms)
        })
    }

    fn delete_room(&self, id: Uuid) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            store.check_writable()?;
            let mut tables = store.inner.tables.write().await;
            let removed = tables.rooms.shift_remove(&id).is_some();
            tables.players.retain(|_, player| player.room_id != id);
            tables.stats.retain(|(room_id, _), _| *room_id != id);
            Ok(removed)
        })
    }

    fn insert_player(&self, player: PlayerEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.check_writable()?;
            let mut tables = store.inner.tables.write().await;
            let seated = tables.players.values().any(|existing| {
                existing.room_id == player.room_id && existing.device_id == player.device_id
            });
            if seated {
                return Err(StorageError::Conflict(format!(
                    "device `{}` already joined room `{}`",
                    player.device_id, player.room_id
                )));
            }
            tables.players.insert(player.id, player);
            Ok(())
        })
    }

    fn save_player(&self, player: PlayerEntity) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            store.check_writable()?;
            let mut tables = store.inner.tables.write().await;
            match tables.players.get_mut(&player.id) {
                Some(row) if row.room_id == player.room_id => {
                    *row = player;
                    Ok(true)
                }
                _ => Ok(false),
            }
        })
    }

    fn find_player(
        &self,
        room_id: Uuid,
        player_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<PlayerEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let tables = store.inner.tables.read().await;
            Ok(tables
                .players
                .get(&player_id)
                .filter(|player| player.room_id == room_id)
                .cloned())
        })
    }

    fn find_player_by_device(
        &self,
        room_id: Uuid,
        device_id: String,
    ) -> BoxFuture<'static, StorageResult<Option<PlayerEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let tables = store.inner.tables.read().await;
            Ok(tables
                .players
                .values()
                .find(|player| player.room_id == room_id && player.device_id == device_id)
                .cloned())
        })
    }

    fn find_player_by_nickname(
        &self,
        room_id: Uuid,
        nickname: String,
    ) -> BoxFuture<'static, StorageResult<Option<PlayerEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let tables = store.inner.tables.read().await;
            Ok(tables
                .players
                .values()
                .find(|player| player.room_id == room_id && player.nickname == nickname)
                .cloned())
        })
    }

    fn list_players(&self, room_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<PlayerEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let tables = store.inner.tables.read().await;
            Ok(tables
                .players
                .values()
                .filter(|player| player.room_id == room_id)
                .cloned()
                .collect())
        })
    }

    fn delete_players(&self, room_id: Uuid) -> BoxFuture<'static, StorageResult<u64>> {
        let store = self.clone();
        Box::pin(async move {
            store.check_writable()?;
            let mut tables = store.inner.tables.write().await;
            let before = tables.players.len();
            tables.players.retain(|_, player| player.room_id != room_id);
            Ok((before - tables.players.len()) as u64)
        })
    }

    fn record_answer(
        &self,
        room_id: Uuid,
        question_id: String,
        correct: bool,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.check_writable()?;
            let mut tables = store.inner.tables.write().await;
            let stats = tables
                .stats
                .entry((room_id, question_id.clone()))
                .or_insert_with(|| QuestionStatsEntity {
                    room_id,
                    question_id,
                    ..Default::default()
                });
            stats.answers += 1;
            if correct {
                stats.correct += 1;
            }
            Ok(())
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime};

    use super::*;
    use crate::dao::models::RoomConfig;

    fn room(pin: &str, status: RoomStatus, created_at: SystemTime) -> RoomEntity {
        RoomEntity {
            id: Uuid::new_v4(),
            pin_code: pin.into(),
            host_id: "host".into(),
            title: "Quiz".into(),
            config: RoomConfig::default(),
            status,
            current_question_index: -1,
            question_start_at: None,
            is_showing_results: false,
            game_data: vec![],
            created_at,
            updated_at: created_at,
        }
    }

    fn player(room_id: Uuid, nickname: &str, device_id: &str) -> PlayerEntity {
        PlayerEntity {
            id: Uuid::new_v4(),
            room_id,
            nickname: nickname.into(),
            device_id: device_id.into(),
            score: 0,
            streak: 0,
            last_answer: None,
            joined_at: SystemTime::now(),
        }
    }

    #[tokio::test]
    async fn second_seat_for_same_device_conflicts() {
        let store = InMemoryRoomStore::new();
        let room_id = Uuid::new_v4();
        store.insert_player(player(room_id, "ana", "dev-1")).await.unwrap();

        let err = store
            .insert_player(player(room_id, "other", "dev-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Conflict(_)));

        // Same device in another room is fine.
        store
            .insert_player(player(Uuid::new_v4(), "ana", "dev-1"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn players_keep_insertion_order_across_updates() {
        let store = InMemoryRoomStore::new();
        let room_id = Uuid::new_v4();
        let first = player(room_id, "a", "d1");
        let second = player(room_id, "b", "d2");
        store.insert_player(first.clone()).await.unwrap();
        store.insert_player(second.clone()).await.unwrap();

        let mut updated = first.clone();
        updated.score = 500;
        store.save_player(updated).await.unwrap();

        let players = store.list_players(room_id).await.unwrap();
        let ids: Vec<Uuid> = players.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![first.id, second.id]);
        assert_eq!(players[0].score, 500);
    }

    #[tokio::test]
    async fn save_never_recreates_a_deleted_player() {
        let store = InMemoryRoomStore::new();
        let room_id = Uuid::new_v4();
        let ana = player(room_id, "ana", "dev-1");
        store.insert_player(ana.clone()).await.unwrap();
        store.delete_players(room_id).await.unwrap();

        let mut late = ana.clone();
        late.score = 700;
        assert!(!store.save_player(late).await.unwrap());
        assert!(store.list_players(room_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn pin_lookup_prefers_recent_rooms_and_ignores_finished_for_uniqueness() {
        let store = InMemoryRoomStore::new();
        let now = SystemTime::now();
        let old = room("123456", RoomStatus::Finished, now - Duration::from_secs(60));
        let new = room("123456", RoomStatus::Waiting, now);
        store.insert_room(old.clone()).await.unwrap();
        store.insert_room(new.clone()).await.unwrap();

        let rooms = store.find_rooms_by_pin("123456".into()).await.unwrap();
        assert_eq!(rooms[0].id, new.id);
        assert!(store.pin_in_use("123456".into()).await.unwrap());

        let mut finished = new.clone();
        finished.status = RoomStatus::Finished;
        store.save_room(finished).await.unwrap();
        assert!(!store.pin_in_use("123456".into()).await.unwrap());
    }

    #[tokio::test]
    async fn delete_players_only_touches_one_room() {
        let store = InMemoryRoomStore::new();
        let room_a = Uuid::new_v4();
        let room_b = Uuid::new_v4();
        store.insert_player(player(room_a, "a", "d1")).await.unwrap();
        store.insert_player(player(room_a, "b", "d2")).await.unwrap();
        store.insert_player(player(room_b, "c", "d3")).await.unwrap();

        assert_eq!(store.delete_players(room_a).await.unwrap(), 2);
        assert!(store.list_players(room_a).await.unwrap().is_empty());
        assert_eq!(store.list_players(room_b).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failing_writes_report_unavailable() {
        let store = InMemoryRoomStore::new();
        store.set_fail_writes(true);
        let err = store
            .save_room(room("111111", RoomStatus::Draft, SystemTime::now()))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Unavailable { .. }));
    }

    #[tokio::test]
    async fn record_answer_accumulates() {
        let store = InMemoryRoomStore::new();
        let room_id = Uuid::new_v4();
        store.record_answer(room_id, "q1".into(), true).await.unwrap();
        store.record_answer(room_id, "q1".into(), false).await.unwrap();

        let stats = store.question_stats(room_id, "q1").await.unwrap();
        assert_eq!(stats.answers, 2);
        assert_eq!(stats.correct, 1);
    }
}
