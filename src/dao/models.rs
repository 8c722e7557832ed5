use std::time::SystemTime;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state::{
    match_state::{
        Card, DEFAULT_TARGET_SCORE, EndReason, GuessResult, MatchState, PendingGuess,
        STARTING_LIVES,
    },
    state_machine::MatchPhase,
};

/// Card as stored in persistence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CardEntity {
    /// Performing artist.
    pub artist: String,
    /// Track title.
    pub title: String,
    /// Release year used for placement.
    pub year: i32,
    /// Media reference, unique within a match.
    pub media_ref: String,
    /// Cover image reference.
    #[serde(default)]
    pub image_ref: String,
    /// Whether the year was corrected by enrichment.
    #[serde(default)]
    pub ai_corrected: bool,
}

/// Guess waiting for its reveal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PendingGuessEntity {
    /// Player who guessed.
    pub player: String,
    /// Slot chosen in the timeline.
    pub position: usize,
    /// Whether the placement was correct.
    pub outcome: bool,
}

/// Last revealed guess.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GuessResultEntity {
    /// Player who guessed.
    pub player: String,
    /// Card that was placed.
    pub card: CardEntity,
    /// Slot the player picked.
    #[serde(default)]
    pub position: usize,
    /// Whether the guess was right.
    pub success: bool,
    /// Timeline before the guess.
    #[serde(default)]
    pub timeline_before: Vec<CardEntity>,
}

/// The single match record shared by every view.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MatchEntity {
    /// Match identifier.
    pub id: Uuid,
    /// Current phase.
    #[serde(default)]
    pub phase: MatchPhase,
    /// Players in turn order.
    #[serde(default)]
    pub players: Vec<String>,
    /// Timeline per player.
    #[serde(default)]
    pub timelines: IndexMap<String, Vec<CardEntity>>,
    /// Lives per player.
    #[serde(default)]
    pub lives: IndexMap<String, u8>,
    /// Remaining deck, top last.
    #[serde(default)]
    pub deck: Vec<CardEntity>,
    /// Card in flight.
    #[serde(default)]
    pub current_card: Option<CardEntity>,
    /// Turn counter.
    #[serde(default)]
    pub turn_index: u64,
    /// Guess waiting for the reveal.
    #[serde(default)]
    pub pending_guess: Option<PendingGuessEntity>,
    /// Whether the pending guess was revealed.
    #[serde(default)]
    pub reveal_consumed: bool,
    /// Trivia for the revealed card.
    #[serde(default)]
    pub trivia: Option<String>,
    /// Last revealed guess.
    #[serde(default)]
    pub last_result: Option<GuessResultEntity>,
    /// Winner, once decided.
    #[serde(default)]
    pub winner: Option<String>,
    /// Why the match ended.
    #[serde(default)]
    pub end_reason: Option<EndReason>,
    /// Timeline length that wins.
    #[serde(default = "default_target_score")]
    pub target_score: usize,
    /// Cards in play since the deal.
    #[serde(default)]
    pub total_cards: usize,
    /// Wrongly placed cards that left play.
    #[serde(default)]
    pub discarded: usize,
    /// Write version, bumped on every commit.
    #[serde(default)]
    pub version: u64,
    /// Creation time.
    pub created_at: SystemTime,
    /// Last write time.
    pub updated_at: SystemTime,
}

fn default_target_score() -> usize {
    DEFAULT_TARGET_SCORE
}

impl From<Card> for CardEntity {
    fn from(card: Card) -> Self {
        Self {
            artist: card.artist,
            title: card.title,
            year: card.year,
            media_ref: card.media_ref,
            image_ref: card.image_ref,
            ai_corrected: card.ai_corrected,
        }
    }
}

impl From<CardEntity> for Card {
    fn from(entity: CardEntity) -> Self {
        Self {
            artist: entity.artist,
            title: entity.title,
            year: entity.year,
            media_ref: entity.media_ref,
            image_ref: entity.image_ref,
            ai_corrected: entity.ai_corrected,
        }
    }
}

fn cards_into<T, U: From<T>>(cards: Vec<T>) -> Vec<U> {
    cards.into_iter().map(Into::into).collect()
}

impl From<MatchState> for MatchEntity {
    fn from(state: MatchState) -> Self {
        Self {
            id: state.id,
            phase: state.phase,
            players: state.players,
            timelines: state
                .timelines
                .into_iter()
                .map(|(name, cards)| (name, cards_into(cards)))
                .collect(),
            lives: state.lives,
            deck: cards_into(state.deck),
            current_card: state.current_card.map(Into::into),
            turn_index: state.turn_index,
            pending_guess: state.pending_guess.map(|guess| PendingGuessEntity {
                player: guess.player,
                position: guess.position,
                outcome: guess.outcome,
            }),
            reveal_consumed: state.reveal_consumed,
            trivia: state.trivia,
            last_result: state.last_result.map(|result| GuessResultEntity {
                player: result.player,
                card: result.card.into(),
                position: result.position,
                success: result.success,
                timeline_before: cards_into(result.timeline_before),
            }),
            winner: state.winner,
            end_reason: state.end_reason,
            target_score: state.target_score,
            total_cards: state.total_cards,
            discarded: state.discarded,
            version: state.version,
            created_at: state.created_at,
            updated_at: state.updated_at,
        }
    }
}

impl From<MatchEntity> for MatchState {
    /// Every listed player gets a timeline and a lives entry; stored lives
    /// above the starting allowance are clamped.
    fn from(entity: MatchEntity) -> Self {
        let mut timelines: IndexMap<String, Vec<Card>> = entity
            .timelines
            .into_iter()
            .map(|(name, cards)| (name, cards_into(cards)))
            .collect();
        let mut lives = entity.lives;
        for name in &entity.players {
            timelines.entry(name.clone()).or_default();
            let entry = lives.entry(name.clone()).or_insert(STARTING_LIVES);
            *entry = (*entry).min(STARTING_LIVES);
        }

        Self {
            id: entity.id,
            phase: entity.phase,
            players: entity.players,
            timelines,
            lives,
            deck: cards_into(entity.deck),
            current_card: entity.current_card.map(Into::into),
            turn_index: entity.turn_index,
            pending_guess: entity.pending_guess.map(|guess| PendingGuess {
                player: guess.player,
                position: guess.position,
                outcome: guess.outcome,
            }),
            reveal_consumed: entity.reveal_consumed,
            trivia: entity.trivia,
            last_result: entity.last_result.map(|result| GuessResult {
                player: result.player,
                card: result.card.into(),
                position: result.position,
                success: result.success,
                timeline_before: cards_into(result.timeline_before),
            }),
            winner: entity.winner,
            end_reason: entity.end_reason,
            target_score: entity.target_score,
            total_cards: entity.total_cards,
            discarded: entity.discarded,
            version: entity.version,
            created_at: entity.created_at,
            updated_at: entity.updated_at,
        }
    }
}
