use std::time::SystemTime;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::state::state_machine::MatchPhase;

/// Lives every player starts a match with.
pub const STARTING_LIVES: u8 = 3;
/// Target score used when nothing else is configured.
pub const DEFAULT_TARGET_SCORE: usize = 10;

/// A playable track. The year is only ever rewritten by enrichment before the
/// card enters play.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Card {
    /// Performing artist.
    pub artist: String,
    /// Track title.
    pub title: String,
    /// Release year used for placement.
    pub year: i32,
    /// Reference to the playable media; also the card identity.
    pub media_ref: String,
    /// Cover image reference.
    pub image_ref: String,
    /// Whether the year was corrected by the enrichment service.
    pub ai_corrected: bool,
}

/// Guess recorded by a player and waiting to be revealed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingGuess {
    /// Player who placed the card.
    pub player: String,
    /// Slot chosen in the player's timeline.
    pub position: usize,
    /// Whether the placement kept the timeline sorted.
    pub outcome: bool,
}

/// Summary of the last revealed guess, used by the shared screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuessResult {
    /// Player who guessed.
    pub player: String,
    /// Card that was placed.
    pub card: Card,
    /// Slot the player picked.
    pub position: usize,
    /// Whether the guess was right.
    pub success: bool,
    /// The player's timeline as it looked before the guess.
    pub timeline_before: Vec<Card>,
}

/// Why a match ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// A player reached the target score.
    TargetReached,
    /// The active player lost their last life.
    OutOfLives,
    /// No cards were left to draw.
    DeckExhausted,
}

/// The whole shared match, read and written as a single record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchState {
    /// Identifier of this match; a reset allocates a new one.
    pub id: Uuid,
    /// Current phase.
    pub phase: MatchPhase,
    /// Player names in turn order.
    pub players: Vec<String>,
    /// Sorted timeline per player.
    pub timelines: IndexMap<String, Vec<Card>>,
    /// Remaining lives per player.
    pub lives: IndexMap<String, u8>,
    /// Undrawn cards; the top of the deck is the end of the vector.
    pub deck: Vec<Card>,
    /// Card currently being guessed.
    pub current_card: Option<Card>,
    /// Monotonic turn counter; the active player is `players[turn_index % len]`.
    pub turn_index: u64,
    /// Guess waiting for the reveal.
    pub pending_guess: Option<PendingGuess>,
    /// Set once the pending guess has been revealed.
    pub reveal_consumed: bool,
    /// Trivia attached to the current card after the reveal.
    pub trivia: Option<String>,
    /// Last revealed guess.
    pub last_result: Option<GuessResult>,
    /// Winner, once decided.
    pub winner: Option<String>,
    /// Why the match ended, once it did.
    pub end_reason: Option<EndReason>,
    /// Timeline length that wins the match.
    pub target_score: usize,
    /// Cards put into play when the match started.
    pub total_cards: usize,
    /// Wrongly placed cards that left play.
    pub discarded: usize,
    /// Store version this state was read at (or written with).
    pub version: u64,
    /// When the match was created.
    pub created_at: SystemTime,
    /// Last write time.
    pub updated_at: SystemTime,
}

impl MatchState {
    /// Build an empty lobby for the provided players.
    pub fn lobby(players: Vec<String>, target_score: usize) -> Self {
        let timestamp = SystemTime::now();
        let timelines = players
            .iter()
            .map(|name| (name.clone(), Vec::new()))
            .collect();
        let lives = players
            .iter()
            .map(|name| (name.clone(), STARTING_LIVES))
            .collect();

        Self {
            id: Uuid::new_v4(),
            phase: MatchPhase::Lobby,
            players,
            timelines,
            lives,
            deck: Vec::new(),
            current_card: None,
            turn_index: 0,
            pending_guess: None,
            reveal_consumed: false,
            trivia: None,
            last_result: None,
            winner: None,
            end_reason: None,
            target_score,
            total_cards: 0,
            discarded: 0,
            version: 0,
            created_at: timestamp,
            updated_at: timestamp,
        }
    }

    /// Name of the player whose turn it is.
    pub fn active_player(&self) -> Option<&str> {
        if self.players.is_empty() {
            return None;
        }
        let index = (self.turn_index % self.players.len() as u64) as usize;
        self.players.get(index).map(String::as_str)
    }

    /// Timeline of `player`, empty when unknown.
    pub fn timeline(&self, player: &str) -> &[Card] {
        self.timelines.get(player).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Score of `player`, i.e. the length of their timeline.
    pub fn score(&self, player: &str) -> usize {
        self.timeline(player).len()
    }

    /// Remaining lives of `player`.
    pub fn lives_of(&self, player: &str) -> u8 {
        self.lives.get(player).copied().unwrap_or(0)
    }

    /// True when the current card has already been inserted into a timeline.
    pub fn current_card_placed(&self) -> bool {
        matches!(self.pending_guess, Some(PendingGuess { outcome: true, .. }))
    }

    /// True when a guess is waiting and nobody has revealed it yet.
    pub fn reveal_pending(&self) -> bool {
        self.phase == MatchPhase::Guessing && self.pending_guess.is_some() && !self.reveal_consumed
    }

    /// Count every card the match knows about: timelines, deck, the card in
    /// flight (unless already placed) and discarded cards.
    pub fn cards_in_play(&self) -> usize {
        let on_timelines: usize = self.timelines.values().map(Vec::len).sum();
        let in_flight = usize::from(self.current_card.is_some() && !self.current_card_placed());
        on_timelines + self.deck.len() + in_flight + self.discarded
    }

    /// Player with the longest timeline; earlier players win ties.
    pub fn leader(&self) -> Option<&str> {
        let mut best: Option<(&str, usize)> = None;
        for name in &self.players {
            let score = self.score(name);
            if best.is_none_or(|(_, top)| score > top) {
                best = Some((name.as_str(), score));
            }
        }
        best.map(|(name, _)| name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card(year: i32, id: &str) -> Card {
        Card {
            artist: format!("artist {id}"),
            title: format!("title {id}"),
            year,
            media_ref: id.into(),
            image_ref: String::new(),
            ai_corrected: false,
        }
    }

    #[test]
    fn active_player_cycles_through_turn_order() {
        let mut state = MatchState::lobby(vec!["ann".into(), "bob".into()], 3);
        assert_eq!(state.active_player(), Some("ann"));
        state.turn_index = 1;
        assert_eq!(state.active_player(), Some("bob"));
        state.turn_index = 4;
        assert_eq!(state.active_player(), Some("ann"));
    }

    #[test]
    fn empty_lobby_has_no_active_player() {
        let state = MatchState::lobby(Vec::new(), 3);
        assert_eq!(state.active_player(), None);
        assert_eq!(state.leader(), None);
    }

    #[test]
    fn leader_prefers_earlier_player_on_ties() {
        let mut state = MatchState::lobby(vec!["ann".into(), "bob".into(), "cid".into()], 3);
        state.timelines.insert("bob".into(), vec![card(1990, "a"), card(2000, "b")]);
        state.timelines.insert("cid".into(), vec![card(1980, "c"), card(1985, "d")]);
        assert_eq!(state.leader(), Some("bob"));
    }

    #[test]
    fn placed_card_is_not_counted_twice() {
        let mut state = MatchState::lobby(vec!["ann".into()], 3);
        let flying = card(1999, "x");
        state.current_card = Some(flying.clone());
        state.deck = vec![card(1970, "y")];
        assert_eq!(state.cards_in_play(), 2);

        state.timelines.insert("ann".into(), vec![flying]);
        state.pending_guess = Some(PendingGuess {
            player: "ann".into(),
            position: 0,
            outcome: true,
        });
        assert_eq!(state.cards_in_play(), 2);
    }
}
