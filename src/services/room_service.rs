use std::{collections::HashSet, time::SystemTime};

use rand::Rng;
use tracing::{debug, info};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dao::{
        models::{Question, RoomEntity, RoomStatus},
        room::RoomRepository,
        storage::StorageError,
    },
    dto::room::{CreateRoomRequest, PublishRequest, UpdateContentRequest},
    error::ServiceError,
    state::{
        SharedState,
        state_machine::{
            NOT_STARTED, SessionEvent, SessionPhase, SessionStateMachine, TransitionContext,
        },
    },
};

/// Create a draft room owned by `host_id` with a fresh PIN.
pub async fn create_room(
    state: &SharedState,
    request: CreateRoomRequest,
) -> Result<RoomEntity, ServiceError> {
    request.validate()?;
    let repo = state.repository().await?;
    let pin_code = allocate_pin(&repo, state.config().pin_attempts()).await?;

    let now = SystemTime::now();
    let room = RoomEntity {
        id: Uuid::new_v4(),
        pin_code,
        host_id: request.host_id,
        title: request.title.trim().to_owned(),
        config: request
            .config
            .unwrap_or_else(|| state.config().default_room_config().clone()),
        status: RoomStatus::Draft,
        current_question_index: NOT_STARTED,
        question_start_at: None,
        is_showing_results: false,
        game_data: Vec::new(),
        created_at: now,
        updated_at: now,
    };

    repo.insert_room(room.clone()).await?;
    info!(room_id = %room.id, pin = %room.pin_code, "room created");
    Ok(room)
}

/// Pick a PIN no unfinished room holds, giving up after `attempts` collisions.
async fn allocate_pin(repo: &RoomRepository, attempts: u32) -> Result<String, ServiceError> {
    for attempt in 0..attempts {
        let candidate = generate_pin();
        if !repo.pin_in_use(&candidate).await? {
            return Ok(candidate);
        }
        debug!(attempt, "pin collision; retrying");
    }
    Err(StorageError::unavailable_msg(format!(
        "could not allocate a unique PIN after {attempts} attempts"
    ))
    .into())
}

fn generate_pin() -> String {
    rand::rng().random_range(100_000..=999_999).to_string()
}

/// Room by id.
pub async fn get_room(state: &SharedState, room_id: Uuid) -> Result<RoomEntity, ServiceError> {
    let repo = state.repository().await?;
    load_room(&repo, room_id).await
}

/// Rooms owned by `host_id`.
pub async fn list_rooms(state: &SharedState, host_id: &str) -> Result<Vec<RoomEntity>, ServiceError> {
    let repo = state.repository().await?;
    Ok(repo.list_rooms(host_id).await?)
}

/// Delete a room and its players, closing any host session mounted on it.
pub async fn delete_room(state: &SharedState, room_id: Uuid) -> Result<(), ServiceError> {
    let repo = state.repository().await?;
    state.unmount_session(room_id).await;
    if !repo.delete_room(room_id).await? {
        return Err(not_found(room_id));
    }
    info!(room_id = %room_id, "room deleted");
    Ok(())
}

/// Replace the authored questions. Only allowed before the game starts.
pub async fn update_content(
    state: &SharedState,
    room_id: Uuid,
    request: UpdateContentRequest,
) -> Result<RoomEntity, ServiceError> {
    validate_game_data(&request.game_data)?;
    let repo = state.repository().await?;
    let mut room = load_room(&repo, room_id).await?;

    if !matches!(room.status, RoomStatus::Draft | RoomStatus::Waiting) {
        return Err(ServiceError::InvalidState(format!(
            "content cannot change while the room is {}",
            room.status
        )));
    }

    room.game_data = request.game_data;
    room.updated_at = SystemTime::now();
    repo.save_room(room.clone()).await?;
    info!(room_id = %room_id, questions = room.game_data.len(), "room content saved");
    Ok(room)
}

/// Open the lobby of a draft room, saving content in the same write when given.
pub async fn publish(
    state: &SharedState,
    room_id: Uuid,
    request: PublishRequest,
) -> Result<RoomEntity, ServiceError> {
    if let Some(game_data) = request.game_data.as_deref() {
        validate_game_data(game_data)?;
    }
    let repo = state.repository().await?;
    let mut room = load_room(&repo, room_id).await?;
    if let Some(game_data) = request.game_data {
        room.game_data = game_data;
    }

    let mut machine = SessionStateMachine::new(SessionPhase::of(&room));
    let context = TransitionContext {
        question_count: room.game_data.len(),
        player_count: 0,
    };
    let plan = machine.plan(SessionEvent::Publish, context)?;
    let room = plan.apply_to(room, SystemTime::now());

    if let Err(err) = repo.save_room(room.clone()).await {
        machine.abort(plan.id)?;
        return Err(err.into());
    }
    machine.apply(plan.id)?;
    info!(room_id = %room_id, questions = room.game_data.len(), "room published");
    Ok(room)
}

async fn load_room(repo: &RoomRepository, room_id: Uuid) -> Result<RoomEntity, ServiceError> {
    repo.find_room(room_id)
        .await?
        .ok_or_else(|| not_found(room_id))
}

fn not_found(room_id: Uuid) -> ServiceError {
    ServiceError::NotFound(format!("room `{room_id}` not found"))
}

/// Question ids must be unique, and choice questions need options.
fn validate_game_data(questions: &[Question]) -> Result<(), ServiceError> {
    let mut seen = HashSet::new();
    for question in questions {
        if !seen.insert(question.id.as_str()) {
            return Err(ServiceError::InvalidInput(format!(
                "duplicate question id `{}`",
                question.id
            )));
        }
        if question.option_ids().is_empty() {
            return Err(ServiceError::InvalidInput(format!(
                "question `{}` has no options",
                question.id
            )));
        }
    }
    Ok(())
}
