use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dao::{
        models::{PlayerEntity, RoomStatus},
        room::RoomRepository,
        room_store::RoomStore,
    },
    dto::player::PlayerWriteRequest,
    error::ServiceError,
    state::SharedState,
};

/// Store a player's own score, streak and answer. Values are taken as sent.
///
/// Question statistics are updated by a detached task; its failures are only logged.
pub async fn submit_answer(
    state: &SharedState,
    room_id: Uuid,
    player_id: Uuid,
    request: PlayerWriteRequest,
) -> Result<PlayerEntity, ServiceError> {
    let repo = state.repository().await?;
    let (player, _stats) = write_player(&repo, room_id, player_id, request).await?;
    Ok(player)
}

async fn write_player(
    repo: &RoomRepository,
    room_id: Uuid,
    player_id: Uuid,
    request: PlayerWriteRequest,
) -> Result<(PlayerEntity, Option<JoinHandle<()>>), ServiceError> {
    let mut player = repo
        .find_player(room_id, player_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("player `{player_id}` not found")))?;

    let answered = request.last_answer.clone().filter(|answer| {
        player.last_answer.as_deref() != Some(answer.as_str())
    });

    player.score = request.score;
    player.streak = request.streak;
    player.last_answer = request.last_answer;
    if !repo.save_player(player.clone()).await? {
        // Deleted by a reset between the read and the write.
        return Err(ServiceError::NotFound(format!("player `{player_id}` not found")));
    }
    debug!(room_id = %room_id, player_id = %player_id, score = player.score, "player write stored");

    let stats = answered.map(|answer| {
        let store = repo.store().clone();
        tokio::spawn(record_stats(store, room_id, player_id, answer))
    });
    Ok((player, stats))
}

async fn record_stats(store: Arc<dyn RoomStore>, room_id: Uuid, player_id: Uuid, answer: String) {
    let room = match store.find_room(room_id).await {
        Ok(Some(room)) => room,
        Ok(None) => return,
        Err(err) => {
            warn!(room_id = %room_id, error = %err, "question stats skipped: room lookup failed");
            return;
        }
    };
    if room.status != RoomStatus::Active {
        return;
    }
    let Some(question) = room.current_question() else {
        return;
    };

    let correct = question.is_correct(&answer);
    match store
        .record_answer(room_id, question.id.clone(), correct)
        .await
    {
        Ok(()) => info!(room_id = %room_id, player_id = %player_id, question_id = %question.id, correct, "question stats updated"),
        Err(err) => {
            warn!(room_id = %room_id, question_id = %question.id, error = %err, "failed to update question stats")
        }
    }
}
