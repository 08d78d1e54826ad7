//! Join and reconnection gate: resolves a PIN to a room and grants or recovers a seat.

use std::time::SystemTime;

use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dao::{
        models::{PlayerEntity, RoomEntity, RoomStatus},
        room::RoomRepository,
        storage::StorageError,
    },
    dto::join::JoinRequest,
    error::{JoinError, ServiceError},
    state::SharedState,
};

/// Seat handed back to the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinOutcome {
    /// Seat id.
    pub player_id: Uuid,
    /// Room the PIN resolved to.
    pub room_id: Uuid,
    /// The device already held this seat.
    pub reconnected: bool,
}

/// Resolve the PIN and hand out a seat, reusing the device's seat when it exists.
pub async fn join(state: &SharedState, request: JoinRequest) -> Result<JoinOutcome, ServiceError> {
    request.validate()?;
    let repo = state.repository().await?;
    join_with(&repo, &request).await
}

async fn join_with(repo: &RoomRepository, request: &JoinRequest) -> Result<JoinOutcome, ServiceError> {
    let room = resolve_room(repo, &request.pin).await?;
    let device_id = request.device_id.as_str();

    if room.status == RoomStatus::Waiting {
        let nickname = request.trimmed_nickname();
        if let Some(holder) = repo.find_player_by_nickname(room.id, nickname).await? {
            if holder.device_id != device_id {
                return Err(JoinError::NicknameTaken.into());
            }
        }

        if let Some(seat) = repo.find_player_by_device(room.id, device_id).await? {
            return Ok(outcome(&seat, true));
        }

        let player = PlayerEntity {
            id: Uuid::new_v4(),
            room_id: room.id,
            nickname: nickname.to_owned(),
            device_id: device_id.to_owned(),
            score: 0,
            streak: 0,
            last_answer: None,
            joined_at: SystemTime::now(),
        };

        return match repo.insert_player(player.clone()).await {
            Ok(()) => {
                info!(room_id = %room.id, player_id = %player.id, nickname = %player.nickname, "player joined");
                Ok(outcome(&player, false))
            }
            Err(StorageError::Conflict(message)) => {
                // Same device joined concurrently; hand back the seat that won.
                warn!(room_id = %room.id, %message, "duplicate seat insert");
                repo.find_player_by_device(room.id, device_id)
                    .await?
                    .map(|seat| outcome(&seat, true))
                    .ok_or(ServiceError::InvalidState(message))
            }
            Err(err) => Err(err.into()),
        };
    }

    match repo.find_player_by_device(room.id, device_id).await? {
        Some(seat) => {
            info!(room_id = %room.id, player_id = %seat.id, status = %room.status, "player reconnected");
            Ok(outcome(&seat, true))
        }
        None => Err(JoinError::RoomLocked.into()),
    }
}

/// Most recent unfinished room holding `pin`, else the most recent one.
/// Draft rooms are not joinable.
async fn resolve_room(repo: &RoomRepository, pin: &str) -> Result<RoomEntity, ServiceError> {
    let rooms = repo.find_rooms_by_pin(pin).await?;
    let room = rooms
        .iter()
        .find(|room| room.status != RoomStatus::Finished)
        .or_else(|| rooms.first())
        .cloned()
        .ok_or(JoinError::RoomNotFound)?;

    if room.status == RoomStatus::Draft {
        return Err(JoinError::RoomNotFound.into());
    }
    Ok(room)
}

fn outcome(player: &PlayerEntity, reconnected: bool) -> JoinOutcome {
    JoinOutcome {
        player_id: player.id,
        room_id: player.room_id,
        reconnected,
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use super::*;
    use crate::{
        dao::{models::RoomConfig, room_store::InMemoryRoomStore},
        state::bus::ChangeBus,
    };

    fn repo() -> RoomRepository {
        RoomRepository::new(Arc::new(InMemoryRoomStore::new()), ChangeBus::new(16))
    }

    async fn room(repo: &RoomRepository, pin: &str, status: RoomStatus, age_secs: u64) -> RoomEntity {
        let created_at = SystemTime::now() - Duration::from_secs(age_secs);
        let room = RoomEntity {
            id: Uuid::new_v4(),
            pin_code: pin.into(),
            host_id: "host".into(),
            title: "Quiz".into(),
            config: RoomConfig::default(),
            status,
            current_question_index: if status == RoomStatus::Waiting { -1 } else { 0 },
            question_start_at: None,
            is_showing_results: false,
            game_data: Vec::new(),
            created_at,
            updated_at: created_at,
        };
        repo.insert_room(room.clone()).await.unwrap();
        room
    }

    fn request(pin: &str, nickname: &str, device_id: &str) -> JoinRequest {
        JoinRequest {
            pin: pin.into(),
            nickname: nickname.into(),
            device_id: device_id.into(),
        }
    }

    async fn set_status(repo: &RoomRepository, room_id: Uuid, status: RoomStatus) {
        let mut room = repo.find_room(room_id).await.unwrap().unwrap();
        room.status = status;
        repo.save_room(room).await.unwrap();
    }

    #[tokio::test]
    async fn lobby_join_creates_a_fresh_seat() {
        let repo = repo();
        let lobby = room(&repo, "111111", RoomStatus::Waiting, 0).await;

        let seat = join_with(&repo, &request("111111", " Ana ", "dev-a")).await.unwrap();
        assert_eq!(seat.room_id, lobby.id);
        assert!(!seat.reconnected);

        let player = repo.find_player(lobby.id, seat.player_id).await.unwrap().unwrap();
        assert_eq!(player.nickname, "Ana");
        assert_eq!(player.score, 0);
        assert_eq!(player.streak, 0);
    }

    #[tokio::test]
    async fn nickname_held_by_another_device_is_refused() {
        let repo = repo();
        room(&repo, "111111", RoomStatus::Waiting, 0).await;
        join_with(&repo, &request("111111", "Ana", "dev-a")).await.unwrap();

        let err = join_with(&repo, &request("111111", "Ana", "dev-b")).await.unwrap_err();
        assert!(matches!(err, ServiceError::Join(JoinError::NicknameTaken)));
    }

    #[tokio::test]
    async fn lobby_refresh_returns_the_same_seat() {
        let repo = repo();
        let lobby = room(&repo, "111111", RoomStatus::Waiting, 0).await;
        let first = join_with(&repo, &request("111111", "Ana", "dev-a")).await.unwrap();
        let again = join_with(&repo, &request("111111", "Ana", "dev-a")).await.unwrap();

        assert_eq!(first.player_id, again.player_id);
        assert!(again.reconnected);
        assert_eq!(repo.list_players(lobby.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn running_game_only_admits_known_devices() {
        let repo = repo();
        let game = room(&repo, "222222", RoomStatus::Waiting, 0).await;
        let seat = join_with(&repo, &request("222222", "Ana", "dev-a")).await.unwrap();

        let mut player = repo.find_player(game.id, seat.player_id).await.unwrap().unwrap();
        player.score = 1500;
        player.streak = 3;
        repo.save_player(player).await.unwrap();
        set_status(&repo, game.id, RoomStatus::Active).await;

        let err = join_with(&repo, &request("222222", "Bob", "dev-b")).await.unwrap_err();
        assert!(matches!(err, ServiceError::Join(JoinError::RoomLocked)));

        let back = join_with(&repo, &request("222222", "whatever", "dev-a")).await.unwrap();
        assert_eq!(back.player_id, seat.player_id);
        assert!(back.reconnected);
        let player = repo.find_player(game.id, back.player_id).await.unwrap().unwrap();
        assert_eq!((player.score, player.streak), (1500, 3));
    }

    #[tokio::test]
    async fn unknown_pin_and_draft_rooms_are_not_found() {
        let repo = repo();
        room(&repo, "333333", RoomStatus::Draft, 0).await;

        for pin in ["333333", "999999"] {
            let err = join_with(&repo, &request(pin, "Ana", "dev-a")).await.unwrap_err();
            assert!(matches!(err, ServiceError::Join(JoinError::RoomNotFound)));
        }
    }

    #[tokio::test]
    async fn pin_prefers_the_unfinished_room() {
        let repo = repo();
        room(&repo, "444444", RoomStatus::Finished, 0).await;
        let live = room(&repo, "444444", RoomStatus::Waiting, 60).await;

        let seat = join_with(&repo, &request("444444", "Ana", "dev-a")).await.unwrap();
        assert_eq!(seat.room_id, live.id);
    }

    #[tokio::test]
    async fn finished_room_still_reconnects_its_players() {
        let repo = repo();
        let game = room(&repo, "555555", RoomStatus::Waiting, 0).await;
        let seat = join_with(&repo, &request("555555", "Ana", "dev-a")).await.unwrap();
        set_status(&repo, game.id, RoomStatus::Finished).await;

        let back = join_with(&repo, &request("555555", "Ana", "dev-a")).await.unwrap();
        assert_eq!(back.player_id, seat.player_id);
    }
}
