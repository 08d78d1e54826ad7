use tracing::warn;

use crate::{
    dto::health::{HealthResponse, HealthStatus},
    state::SharedState,
};

/// Report whether storage is reachable, logging connectivity issues.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    let status = match state.room_store().await {
        Some(store) => match store.health_check().await {
            Ok(()) if !state.is_degraded() => HealthStatus::Ok,
            Ok(()) => HealthStatus::Degraded,
            Err(err) => {
                warn!(error = %err, "storage health check failed");
                HealthStatus::Degraded
            }
        },
        None => {
            warn!("storage unavailable (degraded mode)");
            HealthStatus::Degraded
        }
    };

    HealthResponse::new(status, state.session_count())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{config::AppConfig, dao::room_store::InMemoryRoomStore, state::AppState};

    #[tokio::test]
    async fn reports_degraded_without_store() {
        let state = AppState::new(AppConfig::default());
        assert_eq!(health_status(&state).await.status, HealthStatus::Degraded);

        state
            .install_room_store(Arc::new(InMemoryRoomStore::new()))
            .await;
        let health = health_status(&state).await;
        assert_eq!(health.status, HealthStatus::Ok);
        assert_eq!(health.sessions, 0);
    }

    #[tokio::test]
    async fn degraded_flag_wins_over_a_live_store() {
        let state = AppState::new(AppConfig::default());
        state
            .install_room_store(Arc::new(InMemoryRoomStore::new()))
            .await;
        state.update_degraded(true);

        assert_eq!(health_status(&state).await.status, HealthStatus::Degraded);
    }
}
