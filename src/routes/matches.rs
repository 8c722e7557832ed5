use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use axum_valid::Valid;

use crate::{
    dto::matches::{
        AddPlayerRequest, GuessRequest, MatchView, PlayerView, ResetRequest, StartMatchRequest,
    },
    error::{AppError, ServiceError},
    services::match_service,
    state::{SharedState, match_state::MatchState},
};

/// Routes for the shared match: the TV and player controllers both drive it.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/match", get(get_match))
        .route("/match/players", post(add_player))
        .route("/match/players/{name}", get(get_player_view))
        .route("/match/start", post(start_match))
        .route("/match/guess", post(submit_guess))
        .route("/match/reveal", post(trigger_reveal))
        .route("/match/advance", post(advance_turn))
        .route("/match/reset", post(reset_match))
}

async fn match_view(state: &SharedState, current: &MatchState) -> MatchView {
    MatchView::build(current, state.config().join_url(), state.is_degraded().await)
}

/// Full match state for the shared screen.
#[utoipa::path(
    get,
    path = "/match",
    tag = "match",
    responses(
        (status = 200, description = "Current match", body = MatchView),
        (status = 503, description = "Storage unavailable")
    )
)]
pub async fn get_match(State(state): State<SharedState>) -> Result<Json<MatchView>, AppError> {
    let current = match_service::snapshot(&state).await?;
    Ok(Json(match_view(&state, &current).await))
}

/// Match as seen from one player's controller.
#[utoipa::path(
    get,
    path = "/match/players/{name}",
    tag = "match",
    params(("name" = String, Path, description = "Player name")),
    responses(
        (status = 200, description = "Player view", body = PlayerView),
        (status = 404, description = "Unknown player")
    )
)]
pub async fn get_player_view(
    State(state): State<SharedState>,
    Path(name): Path<String>,
) -> Result<Json<PlayerView>, AppError> {
    let current = match_service::snapshot(&state).await?;
    let view = PlayerView::build(&current, &name)
        .ok_or_else(|| ServiceError::NotFound(format!("player {name}")))?;
    Ok(Json(view))
}

/// Join the lobby.
#[utoipa::path(
    post,
    path = "/match/players",
    tag = "match",
    request_body = AddPlayerRequest,
    responses(
        (status = 200, description = "Player added", body = MatchView),
        (status = 400, description = "Invalid or duplicate name"),
        (status = 409, description = "Match already started")
    )
)]
pub async fn add_player(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<AddPlayerRequest>>,
) -> Result<Json<MatchView>, AppError> {
    let current = match_service::add_player(&state, &payload.name).await?;
    Ok(Json(match_view(&state, &current).await))
}

/// Deal the cards and open the first round.
#[utoipa::path(
    post,
    path = "/match/start",
    tag = "match",
    request_body = StartMatchRequest,
    responses(
        (status = 200, description = "Match started", body = MatchView),
        (status = 400, description = "Not enough players or tracks"),
        (status = 409, description = "Match already started")
    )
)]
pub async fn start_match(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<StartMatchRequest>>,
) -> Result<Json<MatchView>, AppError> {
    let current = match_service::start_match(&state, payload.target_score, payload.source).await?;
    Ok(Json(match_view(&state, &current).await))
}

/// Place the current card in the active player's timeline.
#[utoipa::path(
    post,
    path = "/match/guess",
    tag = "match",
    request_body = GuessRequest,
    responses(
        (status = 200, description = "Guess recorded", body = PlayerView),
        (status = 400, description = "Position out of range or unknown player"),
        (status = 409, description = "Not this player's turn or state changed")
    )
)]
pub async fn submit_guess(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<GuessRequest>>,
) -> Result<Json<PlayerView>, AppError> {
    let player = payload.player.trim();
    let current =
        match_service::submit_guess(&state, player, payload.position, payload.observed_version)
            .await?;
    let view = PlayerView::build(&current, player)
        .ok_or_else(|| ServiceError::NotFound(format!("player {player}")))?;
    Ok(Json(view))
}

/// Reveal the pending guess. Repeated calls are harmless.
#[utoipa::path(
    post,
    path = "/match/reveal",
    tag = "match",
    responses(
        (status = 200, description = "Guess revealed", body = MatchView),
        (status = 409, description = "No guess to reveal")
    )
)]
pub async fn trigger_reveal(State(state): State<SharedState>) -> Result<Json<MatchView>, AppError> {
    let current = match_service::trigger_reveal(&state).await?;
    Ok(Json(match_view(&state, &current).await))
}

/// Move to the next player after a reveal.
#[utoipa::path(
    post,
    path = "/match/advance",
    tag = "match",
    responses(
        (status = 200, description = "Turn advanced", body = MatchView),
        (status = 409, description = "Nothing to advance")
    )
)]
pub async fn advance_turn(State(state): State<SharedState>) -> Result<Json<MatchView>, AppError> {
    let current = match_service::advance_turn(&state).await?;
    Ok(Json(match_view(&state, &current).await))
}

/// Start over from a fresh lobby once the match has ended.
#[utoipa::path(
    post,
    path = "/match/reset",
    tag = "match",
    request_body = ResetRequest,
    responses(
        (status = 200, description = "New lobby", body = MatchView),
        (status = 409, description = "Match still running")
    )
)]
pub async fn reset_match(
    State(state): State<SharedState>,
    Json(payload): Json<ResetRequest>,
) -> Result<Json<MatchView>, AppError> {
    let current = match_service::reset_match(&state, payload.keep_players).await?;
    Ok(Json(match_view(&state, &current).await))
}
