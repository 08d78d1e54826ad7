/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Host session commands and ownership checks.
pub mod host_service;
/// Join and reconnection gate.
pub mod join_service;
/// Vote tally, leaderboard and podium aggregation.
pub mod leaderboard;
/// Player score, streak and answer writes.
pub mod player_service;
/// Room authoring: create, content, publish, list, delete.
pub mod room_service;
/// Server-Sent Events message generation.
pub mod sse_events;
/// Server-Sent Events streaming service.
pub mod sse_service;
/// Storage connection supervision and degraded mode.
pub mod storage_supervisor;
/// Player WebSocket connection handling.
pub mod websocket_service;
