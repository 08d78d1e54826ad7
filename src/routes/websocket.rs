use axum::{
    Router,
    extract::{Path, State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use uuid::Uuid;

use crate::{services::websocket_service, state::SharedState};

#[utoipa::path(
    get,
    path = "/ws/rooms/{id}",
    tag = "players",
    params(("id" = String, Path, description = "Identifier of the room")),
    responses((status = 101, description = "Switching protocols to WebSocket"))
)]
/// Upgrade the HTTP connection into a player session for the room.
pub async fn ws_handler(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| websocket_service::handle_socket(state, id, socket))
}

/// Configure the WebSocket endpoint.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/ws/rooms/{id}", get(ws_handler))
}
