use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for the Hitster backend.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::matches::get_match,
        crate::routes::matches::get_player_view,
        crate::routes::matches::add_player,
        crate::routes::matches::start_match,
        crate::routes::matches::submit_guess,
        crate::routes::matches::trigger_reveal,
        crate::routes::matches::advance_turn,
        crate::routes::matches::reset_match,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::matches::AddPlayerRequest,
            crate::dto::matches::StartMatchRequest,
            crate::dto::matches::GuessRequest,
            crate::dto::matches::ResetRequest,
            crate::dto::matches::MatchView,
            crate::dto::matches::PlayerView,
            crate::dto::matches::PlayerSummary,
            crate::dto::matches::CardView,
            crate::dto::matches::GuessResultView,
            crate::state::state_machine::MatchPhase,
            crate::state::match_state::EndReason,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "match", description = "Shared match driven by the TV and player controllers"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_match_route() {
        let doc = ApiDoc::openapi();
        for path in [
            "/healthcheck",
            "/match",
            "/match/players",
            "/match/players/{name}",
            "/match/start",
            "/match/guess",
            "/match/reveal",
            "/match/advance",
            "/match/reset",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
