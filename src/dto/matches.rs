//! Request payloads and the two read projections of the match: the shared TV
//! screen and a single player's controller.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::{format_system_time, validation::validate_player_name},
    state::{
        match_state::{Card, EndReason, GuessResult, MatchState},
        state_machine::MatchPhase,
    },
};

/// Request to join the lobby.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct AddPlayerRequest {
    /// Display name, unique within the match.
    #[validate(custom(function = "validate_player_name"))]
    pub name: String,
}

/// Request to deal cards and start the match.
#[derive(Debug, Default, Deserialize, ToSchema, Validate)]
pub struct StartMatchRequest {
    /// Timeline length that wins; the configured default when omitted.
    #[serde(default)]
    #[validate(range(min = 2, max = 100))]
    pub target_score: Option<usize>,
    /// Track source: `builtin` or the name of a catalog file.
    #[serde(default)]
    #[validate(length(min = 1, max = 64))]
    pub source: Option<String>,
}

/// Request placing the current card on the active player's timeline.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct GuessRequest {
    /// Player submitting the guess; must be the active player.
    #[validate(custom(function = "validate_player_name"))]
    pub player: String,
    /// Slot in the timeline, `0..=len`.
    pub position: usize,
    /// Version the controller was looking at; stale guesses are refused.
    #[serde(default)]
    pub observed_version: Option<u64>,
}

/// Request replacing a finished match with a new lobby.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ResetRequest {
    /// Carry the current players over to the new lobby.
    #[serde(default = "keep_players_default")]
    pub keep_players: bool,
}

impl Default for ResetRequest {
    fn default() -> Self {
        Self {
            keep_players: keep_players_default(),
        }
    }
}

fn keep_players_default() -> bool {
    true
}

/// Card as shown to clients. `year` is withheld while the card is being guessed.
#[derive(Debug, Serialize, ToSchema)]
pub struct CardView {
    pub artist: String,
    pub title: String,
    pub year: Option<i32>,
    pub media_ref: String,
    pub image_ref: String,
    pub ai_corrected: bool,
}

impl CardView {
    fn of(card: &Card, hide_year: bool) -> Self {
        Self {
            artist: card.artist.clone(),
            title: card.title.clone(),
            year: (!hide_year).then_some(card.year),
            media_ref: card.media_ref.clone(),
            image_ref: card.image_ref.clone(),
            ai_corrected: card.ai_corrected,
        }
    }
}

/// Outcome of the last revealed guess.
#[derive(Debug, Serialize, ToSchema)]
pub struct GuessResultView {
    pub player: String,
    pub card: CardView,
    pub position: usize,
    pub success: bool,
    pub timeline_before: Vec<CardView>,
}

impl From<&GuessResult> for GuessResultView {
    fn from(result: &GuessResult) -> Self {
        Self {
            player: result.player.clone(),
            card: CardView::of(&result.card, false),
            position: result.position,
            success: result.success,
            timeline_before: result
                .timeline_before
                .iter()
                .map(|card| CardView::of(card, false))
                .collect(),
        }
    }
}

/// Player row on the shared screen.
#[derive(Debug, Serialize, ToSchema)]
pub struct PlayerSummary {
    pub name: String,
    pub lives: u8,
    pub score: usize,
    pub is_active: bool,
    pub timeline: Vec<CardView>,
}

/// Full projection for the shared TV screen.
#[derive(Debug, Serialize, ToSchema)]
pub struct MatchView {
    pub id: Uuid,
    pub version: u64,
    pub phase: MatchPhase,
    pub players: Vec<PlayerSummary>,
    pub active_player: Option<String>,
    pub current_card: Option<CardView>,
    pub deck_remaining: usize,
    pub guess_pending: bool,
    pub pending_position: Option<usize>,
    pub trivia: Option<String>,
    pub last_result: Option<GuessResultView>,
    pub winner: Option<String>,
    pub end_reason: Option<EndReason>,
    pub target_score: usize,
    /// URL the TV renders as a QR code for players to join.
    pub join_url: String,
    pub degraded: bool,
    pub updated_at: String,
}

/// Projection for one player's controller.
#[derive(Debug, Serialize, ToSchema)]
pub struct PlayerView {
    pub name: String,
    pub version: u64,
    pub phase: MatchPhase,
    pub lives: u8,
    pub score: usize,
    pub is_active: bool,
    /// True when this player may submit a guess right now.
    pub can_guess: bool,
    /// Number of slots the current card can go into.
    pub slots: usize,
    pub timeline: Vec<CardView>,
    pub current_card: Option<CardView>,
    pub active_player: Option<String>,
    pub last_result: Option<GuessResultView>,
    pub winner: Option<String>,
    pub end_reason: Option<EndReason>,
    pub updated_at: String,
}

/// Whether `card` is the one currently being guessed and must stay hidden.
fn is_hidden(state: &MatchState, card: &Card) -> bool {
    state.phase == MatchPhase::Guessing
        && state
            .current_card
            .as_ref()
            .is_some_and(|current| current.media_ref == card.media_ref)
}

fn timeline_view(state: &MatchState, player: &str) -> Vec<CardView> {
    state
        .timeline(player)
        .iter()
        .map(|card| CardView::of(card, is_hidden(state, card)))
        .collect()
}

impl MatchView {
    /// Project the match for the shared screen.
    pub fn build(state: &MatchState, join_url: String, degraded: bool) -> Self {
        let active = state.active_player();
        let players = state
            .players
            .iter()
            .map(|name| PlayerSummary {
                name: name.clone(),
                lives: state.lives_of(name),
                score: state.score(name),
                is_active: active == Some(name.as_str()),
                timeline: timeline_view(state, name),
            })
            .collect();

        Self {
            id: state.id,
            version: state.version,
            phase: state.phase,
            players,
            active_player: active.map(str::to_owned),
            current_card: state
                .current_card
                .as_ref()
                .map(|card| CardView::of(card, is_hidden(state, card))),
            deck_remaining: state.deck.len(),
            guess_pending: state.pending_guess.is_some(),
            pending_position: state.pending_guess.as_ref().map(|guess| guess.position),
            trivia: state.trivia.clone(),
            last_result: state.last_result.as_ref().map(Into::into),
            winner: state.winner.clone(),
            end_reason: state.end_reason,
            target_score: state.target_score,
            join_url,
            degraded,
            updated_at: format_system_time(state.updated_at),
        }
    }
}

impl PlayerView {
    /// Project the match for `name`, or `None` when the player is unknown.
    pub fn build(state: &MatchState, name: &str) -> Option<Self> {
        let name = state.players.iter().find(|player| *player == name)?;
        let active = state.active_player();
        let is_active = active == Some(name.as_str());
        let can_guess = is_active
            && state.phase == MatchPhase::Guessing
            && state.current_card.is_some()
            && state.pending_guess.is_none();

        Some(Self {
            name: name.clone(),
            version: state.version,
            phase: state.phase,
            lives: state.lives_of(name),
            score: state.score(name),
            is_active,
            can_guess,
            slots: if can_guess { state.score(name) + 1 } else { 0 },
            timeline: timeline_view(state, name),
            current_card: state
                .current_card
                .as_ref()
                .map(|card| CardView::of(card, is_hidden(state, card))),
            active_player: active.map(str::to_owned),
            last_result: state.last_result.as_ref().map(Into::into),
            winner: state.winner.clone(),
            end_reason: state.end_reason,
            updated_at: format_system_time(state.updated_at),
        })
    }
}
