use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::dto::room::PlayerSummary;

/// Score/streak/answer write a player makes on its own row. Values are stored as sent.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct PlayerWriteRequest {
    /// New total score.
    pub score: i64,
    /// New streak.
    pub streak: u32,
    /// Option id of the submitted answer.
    #[serde(default)]
    pub last_answer: Option<String>,
}

/// Player row after a successful write.
#[derive(Debug, Serialize, ToSchema)]
pub struct PlayerResponse {
    /// Always `true`.
    pub success: bool,
    /// Stored row.
    pub player: PlayerSummary,
}
