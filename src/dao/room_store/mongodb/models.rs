use std::time::{SystemTime, UNIX_EPOCH};

use mongodb::bson::{DateTime, Document, doc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::MongoDaoError;
use crate::dao::models::{PlayerEntity, Question, RoomConfig, RoomEntity, RoomStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoRoomDocument {
    #[serde(rename = "_id")]
    id: String,
    pin_code: String,
    host_id: String,
    title: String,
    config: RoomConfig,
    status: RoomStatus,
    current_question_index: i32,
    question_start_at: Option<DateTime>,
    is_showing_results: bool,
    game_data: Vec<Question>,
    created_at: DateTime,
    updated_at: DateTime,
}

impl From<RoomEntity> for MongoRoomDocument {
    fn from(value: RoomEntity) -> Self {
        Self {
            id: value.id.to_string(),
            pin_code: value.pin_code,
            host_id: value.host_id,
            title: value.title,
            config: value.config,
            status: value.status,
            current_question_index: value.current_question_index,
            question_start_at: value.question_start_at.map(DateTime::from_system_time),
            is_showing_results: value.is_showing_results,
            game_data: value.game_data,
            created_at: DateTime::from_system_time(value.created_at),
            updated_at: DateTime::from_system_time(value.updated_at),
        }
    }
}

impl TryFrom<MongoRoomDocument> for RoomEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoRoomDocument) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_id(&value.id)?,
            pin_code: value.pin_code,
            host_id: value.host_id,
            title: value.title,
            config: value.config,
            status: value.status,
            current_question_index: value.current_question_index,
            question_start_at: value.question_start_at.map(DateTime::to_system_time),
            is_showing_results: value.is_showing_results,
            game_data: value.game_data,
            created_at: value.created_at.to_system_time(),
            updated_at: value.updated_at.to_system_time(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoPlayerDocument {
    #[serde(rename = "_id")]
    id: String,
    room_id: String,
    nickname: String,
    device_id: String,
    score: i64,
    streak: i64,
    last_answer: Option<String>,
    joined_at: DateTime,
    /// Nanosecond insertion key; `joined_at` alone only has millisecond precision.
    joined_seq: i64,
}

impl From<PlayerEntity> for MongoPlayerDocument {
    fn from(value: PlayerEntity) -> Self {
        let joined_seq = value
            .joined_at
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| i64::try_from(elapsed.as_nanos()).unwrap_or(i64::MAX))
            .unwrap_or_default();
        Self {
            id: value.id.to_string(),
            room_id: value.room_id.to_string(),
            nickname: value.nickname,
            device_id: value.device_id,
            score: value.score,
            streak: i64::from(value.streak),
            last_answer: value.last_answer,
            joined_at: DateTime::from_system_time(value.joined_at),
            joined_seq,
        }
    }
}

impl TryFrom<MongoPlayerDocument> for PlayerEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoPlayerDocument) -> Result<Self, Self::Error> {
        let joined_at = u64::try_from(value.joined_seq)
            .ok()
            .filter(|nanos| *nanos > 0)
            .map(|nanos| UNIX_EPOCH + std::time::Duration::from_nanos(nanos))
            .unwrap_or_else(|| value.joined_at.to_system_time());
        Ok(Self {
            id: parse_id(&value.id)?,
            room_id: parse_id(&value.room_id)?,
            nickname: value.nickname,
            device_id: value.device_id,
            score: value.score,
            streak: u32::try_from(value.streak.max(0)).unwrap_or(u32::MAX),
            last_answer: value.last_answer,
            joined_at,
        })
    }
}

fn parse_id(raw: &str) -> Result<Uuid, MongoDaoError> {
    Uuid::parse_str(raw).map_err(|source| MongoDaoError::CorruptDocument {
        id: raw.to_owned(),
        source,
    })
}

pub fn doc_id(id: Uuid) -> Document {
    doc! {"_id": id.to_string()}
}

pub fn room_filter(room_id: Uuid) -> Document {
    doc! {"room_id": room_id.to_string()}
}

pub fn now() -> DateTime {
    DateTime::from_system_time(SystemTime::now())
}
