use serde::Serialize;
use utoipa::ToSchema;

use crate::state::state_machine::MatchPhase;

/// Health response returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Health status ("ok" or "degraded").
    pub status: String,
    /// Phase of the stored match, when storage answered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<MatchPhase>,
}

impl HealthResponse {
    /// Create a health response indicating the system is operational.
    pub fn ok(phase: Option<MatchPhase>) -> Self {
        Self {
            status: "ok".to_string(),
            phase,
        }
    }

    /// Create a health response indicating the system is in degraded mode.
    pub fn degraded() -> Self {
        Self {
            status: "degraded".to_string(),
            phase: None,
        }
    }
}
