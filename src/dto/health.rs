use serde::Serialize;
use utoipa::ToSchema;

/// Storage reachability as reported by `/healthcheck`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// Storage is reachable.
    Ok,
    /// No store installed or the last ping failed; writes are refused.
    Degraded,
}

/// Body of the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Storage reachability.
    pub status: HealthStatus,
    /// Host sessions mounted in this process.
    pub sessions: usize,
}

impl HealthResponse {
    /// Build a response body.
    pub fn new(status: HealthStatus, sessions: usize) -> Self {
        Self { status, sessions }
    }
}
