use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, patch, post, put},
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::{
        player::{PlayerResponse, PlayerWriteRequest},
        room::{
            ActionResponse, CreateRoomRequest, ListRoomsQuery, PublishRequest, RoomActionResponse,
            RoomSummary, UpdateContentRequest,
        },
    },
    error::AppError,
    services::{player_service, room_service},
    state::SharedState,
};

/// Room authoring endpoints and the player write endpoint.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new()
        .route("/rooms", get(list_rooms).post(create_room))
        .route("/rooms/{id}", get(get_room).delete(delete_room))
        .route("/rooms/{id}/content", put(update_content))
        .route("/rooms/{id}/publish", post(publish_room))
        .route("/rooms/{id}/players/{player_id}", patch(write_player))
}

/// Create a draft room with a fresh PIN.
#[utoipa::path(
    post,
    path = "/rooms",
    tag = "rooms",
    request_body = CreateRoomRequest,
    responses(
        (status = 200, description = "Room created", body = RoomActionResponse),
        (status = 400, description = "Invalid payload"),
        (status = 503, description = "Storage unavailable")
    )
)]
pub async fn create_room(
    State(state): State<SharedState>,
    Json(payload): Json<CreateRoomRequest>,
) -> Result<Json<RoomActionResponse>, AppError> {
    let room = room_service::create_room(&state, payload).await?;
    Ok(Json(RoomActionResponse::ok(room)))
}

/// Rooms owned by a host, newest first.
#[utoipa::path(
    get,
    path = "/rooms",
    tag = "rooms",
    params(ListRoomsQuery),
    responses((status = 200, description = "Rooms of the host", body = [RoomSummary]))
)]
pub async fn list_rooms(
    State(state): State<SharedState>,
    Query(query): Query<ListRoomsQuery>,
) -> Result<Json<Vec<RoomSummary>>, AppError> {
    query.validate()?;
    let rooms = room_service::list_rooms(&state, &query.host_id).await?;
    Ok(Json(rooms.into_iter().map(RoomSummary::from).collect()))
}

/// Fetch one room.
#[utoipa::path(
    get,
    path = "/rooms/{id}",
    tag = "rooms",
    params(("id" = String, Path, description = "Identifier of the room")),
    responses(
        (status = 200, description = "Room", body = RoomSummary),
        (status = 404, description = "Unknown room")
    )
)]
pub async fn get_room(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<RoomSummary>, AppError> {
    Ok(Json(room_service::get_room(&state, id).await?.into()))
}

/// Delete a room with its players.
#[utoipa::path(
    delete,
    path = "/rooms/{id}",
    tag = "rooms",
    params(("id" = String, Path, description = "Identifier of the room")),
    responses((status = 200, description = "Room deleted", body = ActionResponse))
)]
pub async fn delete_room(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ActionResponse>, AppError> {
    room_service::delete_room(&state, id).await?;
    Ok(Json(ActionResponse::ok()))
}

/// Replace the questions of a room that has not started.
#[utoipa::path(
    put,
    path = "/rooms/{id}/content",
    tag = "rooms",
    params(("id" = String, Path, description = "Identifier of the room")),
    request_body = UpdateContentRequest,
    responses(
        (status = 200, description = "Content saved", body = RoomActionResponse),
        (status = 409, description = "Room already running")
    )
)]
pub async fn update_content(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateContentRequest>,
) -> Result<Json<RoomActionResponse>, AppError> {
    let room = room_service::update_content(&state, id, payload).await?;
    Ok(Json(RoomActionResponse::ok(room)))
}

/// Open the lobby of a draft room.
#[utoipa::path(
    post,
    path = "/rooms/{id}/publish",
    tag = "rooms",
    params(("id" = String, Path, description = "Identifier of the room")),
    request_body = PublishRequest,
    responses(
        (status = 200, description = "Room published", body = RoomActionResponse),
        (status = 409, description = "Room is not a draft")
    )
)]
pub async fn publish_room(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    payload: Option<Json<PublishRequest>>,
) -> Result<Json<RoomActionResponse>, AppError> {
    let request = payload.map(|Json(request)| request).unwrap_or_default();
    let room = room_service::publish(&state, id, request).await?;
    Ok(Json(RoomActionResponse::ok(room)))
}

/// A player's own score, streak and answer.
#[utoipa::path(
    patch,
    path = "/rooms/{id}/players/{player_id}",
    tag = "players",
    params(
        ("id" = String, Path, description = "Identifier of the room"),
        ("player_id" = String, Path, description = "Identifier of the player")
    ),
    request_body = PlayerWriteRequest,
    responses(
        (status = 200, description = "Write stored", body = PlayerResponse),
        (status = 404, description = "Unknown player")
    )
)]
pub async fn write_player(
    State(state): State<SharedState>,
    Path((room_id, player_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<PlayerWriteRequest>,
) -> Result<Json<PlayerResponse>, AppError> {
    let player = player_service::submit_answer(&state, room_id, player_id, payload).await?;
    Ok(Json(PlayerResponse {
        success: true,
        player: (&player).into(),
    }))
}
