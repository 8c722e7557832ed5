use tracing::warn;

use crate::{dto::health::HealthResponse, services::match_service, state::SharedState};

/// Report whether storage answers, with the stored match phase when it does.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    match state.require_match_store().await {
        Ok(store) => {
            if let Err(err) = store.health_check().await {
                warn!(error = %err, "storage health check failed");
            }
        }
        Err(_) => warn!("storage unavailable (degraded mode)"),
    }

    if state.is_degraded().await {
        return HealthResponse::degraded();
    }

    match match_service::snapshot(state).await {
        Ok(current) => HealthResponse::ok(Some(current.phase)),
        Err(err) => {
            warn!(error = %err, "could not read match for health report");
            HealthResponse::ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::match_store::memory::InMemoryMatchStore,
        services::{
            enrichment::{Enrichment, NoopOracle},
            track_supply::CatalogTrackSource,
        },
        state::{AppState, state_machine::MatchPhase},
    };

    fn app_state() -> SharedState {
        let config = AppConfig::default();
        let enrichment = Enrichment::new(Arc::new(NoopOracle), config.enrichment.clone());
        AppState::new(config, Arc::new(CatalogTrackSource::new("catalog")), enrichment)
    }

    #[tokio::test]
    async fn degraded_without_store() {
        let state = app_state();
        let health = health_status(&state).await;
        assert_eq!(health.status, "degraded");
        assert!(health.phase.is_none());
    }

    #[tokio::test]
    async fn reports_lobby_on_empty_store() {
        let state = app_state();
        state
            .set_match_store(Arc::new(InMemoryMatchStore::new()))
            .await;
        let health = health_status(&state).await;
        assert_eq!(health.status, "ok");
        assert_eq!(health.phase, Some(MatchPhase::Lobby));
    }
}
