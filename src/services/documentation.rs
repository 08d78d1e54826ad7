use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI document for the live quiz backend.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::rooms::create_room,
        crate::routes::rooms::list_rooms,
        crate::routes::rooms::get_room,
        crate::routes::rooms::delete_room,
        crate::routes::rooms::update_content,
        crate::routes::rooms::publish_room,
        crate::routes::rooms::write_player,
        crate::routes::join::join_room,
        crate::routes::host::mount_session,
        crate::routes::host::unmount_session,
        crate::routes::host::host_snapshot,
        crate::routes::host::start_question,
        crate::routes::host::end_question,
        crate::routes::host::show_leaderboard,
        crate::routes::host::next_question,
        crate::routes::host::reset_room,
        crate::routes::host::host_stream,
        crate::routes::sse::room_stream,
        crate::routes::websocket::ws_handler,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::health::HealthStatus,
            crate::dto::room::CreateRoomRequest,
            crate::dto::room::UpdateContentRequest,
            crate::dto::room::PublishRequest,
            crate::dto::room::RoomSummary,
            crate::dto::room::PlayerSummary,
            crate::dto::room::RoomActionResponse,
            crate::dto::room::ActionResponse,
            crate::dto::room::RoomSnapshot,
            crate::dto::join::JoinRequest,
            crate::dto::join::JoinResponse,
            crate::dto::player::PlayerWriteRequest,
            crate::dto::player::PlayerResponse,
            crate::dto::host::StartQuestionRequest,
            crate::dto::host::HostSnapshot,
            crate::dto::host::HostPlayer,
            crate::dto::host::VoteCount,
            crate::dto::host::LeaderboardEntry,
            crate::dto::host::TimerTick,
            crate::dto::sse::PlayerChangedEvent,
            crate::dto::sse::RoomChangedEvent,
            crate::dto::sse::PresenceEvent,
            crate::dto::sse::SessionClosedEvent,
            crate::dto::ws::PlayerInboundMessage,
            crate::dto::ws::PlayerOutboundMessage,
            crate::dao::models::RoomStatus,
            crate::dao::models::RoomConfig,
            crate::dao::models::Difficulty,
            crate::dao::models::Question,
            crate::dao::models::QuestionContent,
            crate::dao::models::ChoiceOption,
            crate::dao::models::TruthOption,
            crate::dao::models::TruthValue,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "rooms", description = "Room authoring"),
        (name = "players", description = "Join, answers and the player WebSocket"),
        (name = "host", description = "Host session control, guarded by X-Host-Id"),
        (name = "sse", description = "Server-sent events streams"),
    )
)]
pub struct ApiDoc;
