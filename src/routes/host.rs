use std::convert::Infallible;

use axum::{
    Json, Router,
    body::Body,
    extract::{Path, State},
    http::Request,
    middleware::{self, Next},
    response::{Response, sse::Sse},
    routing::{get, post},
};
use futures::Stream;
use uuid::Uuid;

use crate::{
    dto::{
        host::{HostSnapshot, StartQuestionRequest},
        room::{ActionResponse, RoomActionResponse},
    },
    error::AppError,
    services::{host_service, sse_service},
    state::SharedState,
};

const HOST_ID_HEADER: &str = "x-host-id";

/// Host endpoints driving a mounted session. Every route checks room ownership.
pub fn router(state: SharedState) -> Router<SharedState> {
    Router::new()
        .route(
            "/host/rooms/{id}",
            get(host_snapshot).delete(unmount_session),
        )
        .route("/host/rooms/{id}/mount", post(mount_session))
        .route("/host/rooms/{id}/start", post(start_question))
        .route("/host/rooms/{id}/end", post(end_question))
        .route("/host/rooms/{id}/leaderboard", post(show_leaderboard))
        .route("/host/rooms/{id}/next", post(next_question))
        .route("/host/rooms/{id}/reset", post(reset_room))
        .route("/host/rooms/{id}/sse", get(host_stream))
        .route_layer(middleware::from_fn_with_state(state, require_host_id))
}

/// Mount the host session: reset the room, wipe players, then start listening.
#[utoipa::path(
    post,
    path = "/host/rooms/{id}/mount",
    tag = "host",
    params(("X-Host-Id" = String, Header, description = "Owner of the room"),
    ("id" = String, Path, description = "Identifier of the room")),
    responses((status = 200, description = "Session mounted and ready", body = HostSnapshot))
)]
pub async fn mount_session(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<HostSnapshot>, AppError> {
    Ok(Json(host_service::mount(&state, id).await?))
}

/// Tear the host session down. The game stops advancing.
#[utoipa::path(
    delete,
    path = "/host/rooms/{id}",
    tag = "host",
    params(("X-Host-Id" = String, Header, description = "Owner of the room"),
    ("id" = String, Path, description = "Identifier of the room")),
    responses((status = 200, description = "Session closed", body = ActionResponse))
)]
pub async fn unmount_session(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ActionResponse>, AppError> {
    host_service::unmount(&state, id).await?;
    Ok(Json(ActionResponse::ok()))
}

/// Current host view.
#[utoipa::path(
    get,
    path = "/host/rooms/{id}",
    tag = "host",
    params(("X-Host-Id" = String, Header, description = "Owner of the room"),
    ("id" = String, Path, description = "Identifier of the room")),
    responses((status = 200, description = "Host snapshot", body = HostSnapshot))
)]
pub async fn host_snapshot(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<HostSnapshot>, AppError> {
    Ok(Json(host_service::snapshot(&state, id).await?))
}

/// Start a question; the body is optional and defaults to the first question.
#[utoipa::path(
    post,
    path = "/host/rooms/{id}/start",
    tag = "host",
    params(("X-Host-Id" = String, Header, description = "Owner of the room"),
    ("id" = String, Path, description = "Identifier of the room")),
    request_body = StartQuestionRequest,
    responses(
        (status = 200, description = "Question started", body = RoomActionResponse),
        (status = 409, description = "Not allowed in the current phase")
    )
)]
pub async fn start_question(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    payload: Option<Json<StartQuestionRequest>>,
) -> Result<Json<RoomActionResponse>, AppError> {
    let index = payload
        .and_then(|Json(request)| request.index)
        .unwrap_or(0);
    let room = host_service::start_question(&state, id, index).await?;
    Ok(Json(RoomActionResponse::ok(room)))
}

/// Close answers for the current question and reveal the correct one.
#[utoipa::path(
    post,
    path = "/host/rooms/{id}/end",
    tag = "host",
    params(("X-Host-Id" = String, Header, description = "Owner of the room"),
    ("id" = String, Path, description = "Identifier of the room")),
    responses((status = 200, description = "Question ended", body = RoomActionResponse))
)]
pub async fn end_question(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<RoomActionResponse>, AppError> {
    let room = host_service::end_question(&state, id).await?;
    Ok(Json(RoomActionResponse::ok(room)))
}

/// Show the standings between questions.
#[utoipa::path(
    post,
    path = "/host/rooms/{id}/leaderboard",
    tag = "host",
    params(("X-Host-Id" = String, Header, description = "Owner of the room"),
    ("id" = String, Path, description = "Identifier of the room")),
    responses((status = 200, description = "Leaderboard shown", body = RoomActionResponse))
)]
pub async fn show_leaderboard(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<RoomActionResponse>, AppError> {
    let room = host_service::show_leaderboard(&state, id).await?;
    Ok(Json(RoomActionResponse::ok(room)))
}

/// Next question, or the podium after the last one.
#[utoipa::path(
    post,
    path = "/host/rooms/{id}/next",
    tag = "host",
    params(("X-Host-Id" = String, Header, description = "Owner of the room"),
    ("id" = String, Path, description = "Identifier of the room")),
    responses((status = 200, description = "Advanced", body = RoomActionResponse))
)]
pub async fn next_question(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<RoomActionResponse>, AppError> {
    let room = host_service::next_question(&state, id).await?;
    Ok(Json(RoomActionResponse::ok(room)))
}

/// Wipe players and return to the lobby.
#[utoipa::path(
    post,
    path = "/host/rooms/{id}/reset",
    tag = "host",
    params(("X-Host-Id" = String, Header, description = "Owner of the room"),
    ("id" = String, Path, description = "Identifier of the room")),
    responses((status = 200, description = "Room reset", body = RoomActionResponse))
)]
pub async fn reset_room(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<RoomActionResponse>, AppError> {
    let room = host_service::reset(&state, id).await?;
    Ok(Json(RoomActionResponse::ok(room)))
}

#[utoipa::path(
    get,
    path = "/host/rooms/{id}/sse",
    tag = "host",
    params(("X-Host-Id" = String, Header, description = "Owner of the room"),
    ("id" = String, Path, description = "Identifier of the room")),
    responses((status = 200, description = "Host snapshot stream", content_type = "text/event-stream", body = String))
)]
/// Stream host snapshots and timer ticks of the mounted session.
pub async fn host_stream(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<axum::response::sse::Event, Infallible>>>, AppError> {
    let session = host_service::session(&state, id)?;
    Ok(sse_service::host_stream(session).await)
}

async fn require_host_id(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let provided = req
        .headers()
        .get(HOST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_owned())
        .ok_or_else(|| AppError::Unauthorized("missing host header `X-Host-Id`".into()))?;

    host_service::authorize(&state, id, &provided).await?;
    Ok(next.run(req).await)
}
