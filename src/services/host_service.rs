use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::{
    dao::models::RoomEntity,
    dto::host::HostSnapshot,
    error::ServiceError,
    state::{SharedState, session::HostSession},
};

/// Check that `host_id` owns the room.
pub async fn authorize(state: &SharedState, room_id: Uuid, host_id: &str) -> Result<(), ServiceError> {
    let repo = state.repository().await?;
    let room = repo
        .find_room(room_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("room `{room_id}` not found")))?;
    if room.host_id != host_id {
        return Err(ServiceError::Unauthorized(
            "host id does not own this room".into(),
        ));
    }
    Ok(())
}

/// Mount the host session; the returned snapshot is taken after the barrier completed.
pub async fn mount(state: &SharedState, room_id: Uuid) -> Result<HostSnapshot, ServiceError> {
    let session = state.mount_session(room_id).await?;
    info!(room_id = %room_id, "host session mounted");
    Ok(session.snapshot().await)
}

/// Close the session mounted on `room_id`.
pub async fn unmount(state: &SharedState, room_id: Uuid) -> Result<(), ServiceError> {
    if state.unmount_session(room_id).await {
        Ok(())
    } else {
        Err(no_session(room_id))
    }
}

/// Session mounted on `room_id`.
pub fn session(state: &SharedState, room_id: Uuid) -> Result<Arc<HostSession>, ServiceError> {
    state.session(room_id).ok_or_else(|| no_session(room_id))
}

/// Current host snapshot.
pub async fn snapshot(state: &SharedState, room_id: Uuid) -> Result<HostSnapshot, ServiceError> {
    Ok(session(state, room_id)?.snapshot().await)
}

/// Start the question at `index`.
pub async fn start_question(
    state: &SharedState,
    room_id: Uuid,
    index: usize,
) -> Result<RoomEntity, ServiceError> {
    session(state, room_id)?.start_question(index).await
}

/// End the running question.
pub async fn end_question(state: &SharedState, room_id: Uuid) -> Result<RoomEntity, ServiceError> {
    session(state, room_id)?.end_question().await
}

/// Show the leaderboard of the last question.
pub async fn show_leaderboard(
    state: &SharedState,
    room_id: Uuid,
) -> Result<RoomEntity, ServiceError> {
    session(state, room_id)?.show_leaderboard().await
}

/// Next question, or the podium after the last one.
pub async fn next_question(state: &SharedState, room_id: Uuid) -> Result<RoomEntity, ServiceError> {
    session(state, room_id)?.advance().await
}

/// Wipe players and return to the lobby.
pub async fn reset(state: &SharedState, room_id: Uuid) -> Result<RoomEntity, ServiceError> {
    session(state, room_id)?.reset().await
}

fn no_session(room_id: Uuid) -> ServiceError {
    ServiceError::InvalidState(format!("no host session is mounted on room `{room_id}`"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::AppConfig,
        dao::{models::RoomStatus, room_store::InMemoryRoomStore},
        dto::{
            join::JoinRequest,
            room::{CreateRoomRequest, PublishRequest},
        },
        services::{join_service, room_service},
        state::AppState,
    };

    async fn lobby() -> (SharedState, RoomEntity) {
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
        let room = room_service::publish(&state, room.id, PublishRequest::default())
            .await
            .unwrap();
        (state, room)
    }

    #[tokio::test]
    async fn only_the_owner_is_authorized() {
        let (state, room) = lobby().await;
        authorize(&state, room.id, "host-1").await.unwrap();
        assert!(matches!(
            authorize(&state, room.id, "intruder").await,
            Err(ServiceError::Unauthorized(_))
        ));
        assert!(matches!(
            authorize(&state, Uuid::new_v4(), "host-1").await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn commands_need_a_mounted_session() {
        let (state, room) = lobby().await;
        assert!(matches!(
            end_question(&state, room.id).await,
            Err(ServiceError::InvalidState(_))
        ));
        assert!(unmount(&state, room.id).await.is_err());
    }

    #[tokio::test]
    async fn remount_wipes_players_joined_earlier() {
        let (state, room) = lobby().await;
        mount(&state, room.id).await.unwrap();
        join_service::join(
            &state,
            JoinRequest {
                pin: room.pin_code.clone(),
                nickname: "Ana".into(),
                device_id: "dev-a".into(),
            },
        )
        .await
        .unwrap();

        let first = session(&state, room.id).unwrap();
        let snapshot = mount(&state, room.id).await.unwrap();
        assert!(snapshot.ready);
        assert!(snapshot.players.is_empty());
        assert!(!first.is_ready());

        let repo = state.repository().await.unwrap();
        assert!(repo.list_players(room.id).await.unwrap().is_empty());
        assert_eq!(
            repo.find_room(room.id).await.unwrap().unwrap().status,
            RoomStatus::Waiting
        );

        unmount(&state, room.id).await.unwrap();
        assert!(state.session(room.id).is_none());
    }
}
