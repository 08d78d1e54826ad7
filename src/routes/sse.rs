use std::convert::Infallible;

use axum::{
    Router,
    extract::{Path, State},
    response::sse::Sse,
    routing::get,
};
use futures::Stream;
use uuid::Uuid;

use crate::{error::AppError, services::sse_service, state::SharedState};

#[utoipa::path(
    get,
    path = "/rooms/{id}/sse",
    tag = "sse",
    params(("id" = String, Path, description = "Identifier of the room")),
    responses(
        (status = 200, description = "Room change stream", content_type = "text/event-stream", body = String),
        (status = 404, description = "Unknown room")
    )
)]
/// Stream the public changes of a room: a snapshot first, then room and player events.
pub async fn room_stream(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<axum::response::sse::Event, Infallible>>>, AppError> {
    Ok(sse_service::room_stream(&state, id).await?)
}

/// Configure the SSE endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/rooms/{id}/sse", get(room_stream))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{Request, StatusCode, header},
    };
    use futures::StreamExt;
    use tower::ServiceExt;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::room_store::InMemoryRoomStore,
        dto::room::CreateRoomRequest,
        services::{room_service, sse_events::EVENT_ROOM_SNAPSHOT},
        state::AppState,
    };

    async fn app() -> (Router, Uuid) {
        let state = AppState::new(AppConfig::default());
        state
            .install_room_store(Arc::new(InMemoryRoomStore::new()))
            .await;
        let room = room_service::create_room(
            &state,
            CreateRoomRequest {
                host_id: "host-1".into(),
                title: "Quiz".into(),
                config: None,
            },
        )
        .await
        .unwrap();
        (router().with_state(state), room.id)
    }

    fn get(uri: String) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn room_stream_opens_with_a_snapshot() {
        let (app, room_id) = app().await;

        let response = app.oneshot(get(format!("/rooms/{room_id}/sse"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap();
        assert!(content_type.starts_with("text/event-stream"));

        let mut body = response.into_body().into_data_stream();
        let first = body.next().await.unwrap().unwrap();
        let first = String::from_utf8(first.to_vec()).unwrap();
        assert!(first.contains(&format!("event: {EVENT_ROOM_SNAPSHOT}")));
        assert!(first.contains(&room_id.to_string()));
    }

    #[tokio::test]
    async fn unknown_room_is_not_found() {
        let (app, _) = app().await;

        let response = app
            .oneshot(get(format!("/rooms/{}/sse", Uuid::new_v4())))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
