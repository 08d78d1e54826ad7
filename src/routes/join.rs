use axum::{Json, Router, extract::State, routing::post};

use crate::{
    dto::join::{JoinRequest, JoinResponse},
    error::AppError,
    services::join_service,
    state::SharedState,
};

/// Join a room by PIN, or recover this device's seat.
#[utoipa::path(
    post,
    path = "/join",
    tag = "players",
    request_body = JoinRequest,
    responses(
        (status = 200, description = "Seat granted", body = JoinResponse),
        (status = 403, description = "Game already in progress"),
        (status = 404, description = "No room for this PIN"),
        (status = 409, description = "Nickname taken")
    )
)]
pub async fn join_room(
    State(state): State<SharedState>,
    Json(payload): Json<JoinRequest>,
) -> Result<Json<JoinResponse>, AppError> {
    let outcome = join_service::join(&state, payload).await?;
    Ok(Json(JoinResponse {
        success: true,
        player_id: outcome.player_id,
        room_id: outcome.room_id,
        reconnected: outcome.reconnected,
    }))
}

/// Player join route.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/join", post(join_room))
}
