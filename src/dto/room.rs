//! DTO definitions for room authoring and read models.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dao::models::{PlayerEntity, Question, RoomConfig, RoomEntity, RoomStatus},
    dto::format_system_time,
};

/// Payload used to create a new draft room.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct CreateRoomRequest {
    /// Owner of the new room.
    #[validate(length(min = 1, max = 128))]
    pub host_id: String,
    /// Display title.
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    /// Falls back to the server defaults when omitted.
    #[serde(default)]
    pub config: Option<RoomConfig>,
}

/// Replace the authored questions of a room.
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateContentRequest {
    /// New question list, replacing the old one.
    pub game_data: Vec<Question>,
}

/// Publish a draft room, optionally saving content in the same write.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct PublishRequest {
    /// Questions to save before publishing.
    #[serde(default)]
    pub game_data: Option<Vec<Question>>,
}

/// Query string of the room listing.
#[derive(Debug, Deserialize, IntoParams, Validate)]
#[into_params(parameter_in = Query)]
pub struct ListRoomsQuery {
    /// Owner whose rooms are listed.
    #[validate(length(min = 1, max = 128))]
    pub host_id: String,
}

/// Full room record as exposed to clients.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RoomSummary {
    /// Room id.
    pub id: Uuid,
    /// Six digit join code.
    pub pin_code: String,
    /// Owner.
    pub host_id: String,
    /// Display title.
    pub title: String,
    /// Gameplay settings.
    pub config: RoomConfig,
    /// Lifecycle status.
    pub status: RoomStatus,
    /// Current question, `-1` before the first one.
    pub current_question_index: i32,
    /// RFC 3339 start time of the current question.
    pub question_start_at: Option<String>,
    /// Results of the current question are on screen.
    pub is_showing_results: bool,
    /// Authored questions.
    pub game_data: Vec<Question>,
    /// RFC 3339 creation time.
    pub created_at: String,
    /// RFC 3339 time of the last write.
    pub updated_at: String,
}

impl From<RoomEntity> for RoomSummary {
    fn from(room: RoomEntity) -> Self {
        Self {
            id: room.id,
            pin_code: room.pin_code,
            host_id: room.host_id,
            title: room.title,
            config: room.config,
            status: room.status,
            current_question_index: room.current_question_index,
            question_start_at: room.question_start_at.map(format_system_time),
            is_showing_results: room.is_showing_results,
            game_data: room.game_data,
            created_at: format_system_time(room.created_at),
            updated_at: format_system_time(room.updated_at),
        }
    }
}

impl From<&RoomEntity> for RoomSummary {
    fn from(room: &RoomEntity) -> Self {
        room.clone().into()
    }
}

/// Player row as exposed to clients; the device id stays server side.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PlayerSummary {
    /// Player id.
    pub id: Uuid,
    /// Room the player joined.
    pub room_id: Uuid,
    /// Display name.
    pub nickname: String,
    /// Total score.
    pub score: i64,
    /// Consecutive correct answers.
    pub streak: u32,
    /// Option id of the last answer.
    pub last_answer: Option<String>,
    /// RFC 3339 join time.
    pub joined_at: String,
}

impl From<&PlayerEntity> for PlayerSummary {
    fn from(player: &PlayerEntity) -> Self {
        Self {
            id: player.id,
            room_id: player.room_id,
            nickname: player.nickname.clone(),
            score: player.score,
            streak: player.streak,
            last_answer: player.last_answer.clone(),
            joined_at: format_system_time(player.joined_at),
        }
    }
}

/// Successful mutation of a room.
#[derive(Debug, Serialize, ToSchema)]
pub struct RoomActionResponse {
    /// Always `true`.
    pub success: bool,
    /// Room after the mutation.
    pub room: RoomSummary,
}

impl RoomActionResponse {
    /// Wrap a stored room.
    pub fn ok(room: RoomEntity) -> Self {
        Self {
            success: true,
            room: room.into(),
        }
    }
}

/// Bare acknowledgement.
#[derive(Debug, Serialize, ToSchema)]
pub struct ActionResponse {
    /// Always `true`.
    pub success: bool,
}

impl ActionResponse {
    /// Successful acknowledgement.
    pub fn ok() -> Self {
        Self { success: true }
    }
}

/// Room record plus its players, in insertion order.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RoomSnapshot {
    /// Room row.
    pub room: RoomSummary,
    /// Players in join order.
    pub players: Vec<PlayerSummary>,
}

impl RoomSnapshot {
    /// Build a snapshot from stored rows.
    pub fn new(room: &RoomEntity, players: &[PlayerEntity]) -> Self {
        Self {
            room: room.into(),
            players: players.iter().map(PlayerSummary::from).collect(),
        }
    }
}
