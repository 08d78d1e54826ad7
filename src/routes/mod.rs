use axum::Router;

use crate::state::SharedState;

/// Swagger UI and the OpenAPI document.
pub mod docs;
/// Health check.
pub mod health;
/// Host session control.
pub mod host;
/// Player join.
pub mod join;
/// Room authoring and player writes.
pub mod rooms;
/// Room and host event streams.
pub mod sse;
/// Player WebSocket.
pub mod websocket;

/// Compose the room, join, host, stream and documentation routes over the shared state.
pub fn router(state: SharedState) -> Router<()> {
    let api_router = health::router()
        .merge(rooms::router())
        .merge(join::router())
        .merge(host::router(state.clone()))
        .merge(sse::router())
        .merge(websocket::router())
        .merge(docs::router());

    api_router.with_state(state)
}
