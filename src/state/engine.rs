//! Pure match rules. Every function takes the current state by reference and
//! returns the next state, or a [`Rejection`] that leaves the caller's state
//! untouched. Nothing here performs I/O or touches the store version.

use std::collections::HashSet;

use rand::{Rng, seq::SliceRandom};
use thiserror::Error;
use uuid::Uuid;

use crate::state::{
    match_state::{Card, EndReason, GuessResult, MatchState, PendingGuess, STARTING_LIVES},
    state_machine::{InvalidTransition, MatchEvent, MatchPhase, RevealOutcome, next_phase},
};

/// Smallest target score: every player starts with one dealt card.
pub const MIN_TARGET_SCORE: usize = 2;

/// Reasons an action is refused. A rejection never mutates state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    /// The action does not fit the current phase.
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
    /// Someone other than the active player tried to act.
    #[error("it is `{active}`'s turn, not `{player}`'s")]
    NotYourTurn {
        /// Player who attempted the action.
        player: String,
        /// Player whose turn it actually is.
        active: String,
    },
    /// The named player is not part of the match.
    #[error("unknown player `{0}`")]
    UnknownPlayer(String),
    /// No card is in flight.
    #[error("no card is currently in play")]
    NoCurrentCard,
    /// The current card was already placed.
    #[error("a guess is already pending for the current card")]
    GuessAlreadyPending,
    /// The chosen slot does not exist.
    #[error("position {position} is outside 0..={len}")]
    PositionOutOfRange {
        /// Requested slot.
        position: usize,
        /// Timeline length.
        len: usize,
    },
    /// The card is already on the player's timeline.
    #[error("card `{0}` is already on this timeline")]
    DuplicateCard(String),
    /// There is nothing to reveal.
    #[error("no guess is waiting to be revealed")]
    NoPendingGuess,
    /// The pending guess was already revealed.
    #[error("the pending guess has already been revealed")]
    RevealAlreadyConsumed,
    /// Trivia was already stored for the revealed card.
    #[error("trivia already attached to the revealed card")]
    TriviaAlreadyAttached,
    /// Trivia does not belong to the revealed card.
    #[error("trivia does not belong to the revealed card")]
    TriviaMismatch,
    /// Player name is blank.
    #[error("player name must not be empty")]
    EmptyName,
    /// Player name is too long.
    #[error("player name exceeds {max} characters")]
    NameTooLong {
        /// Configured limit.
        max: usize,
    },
    /// Player name already taken.
    #[error("player `{0}` already joined")]
    DuplicateName(String),
    /// Nobody joined yet.
    #[error("a match requires at least one player")]
    NoPlayers,
    /// Not enough cards to deal.
    #[error("deck holds {available} cards but {required} are needed to deal")]
    DeckTooSmall {
        /// Cards needed.
        required: usize,
        /// Cards supplied.
        available: usize,
    },
    /// Target score of zero.
    #[error("target score must be at least {MIN_TARGET_SCORE}")]
    InvalidTargetScore,
    /// The drawn card is not the top of the deck any more.
    #[error("drawn card does not match the top of the deck")]
    StaleDraw,
    /// The player list changed after the cards were dealt.
    #[error("the deal does not match the current player list")]
    DealMismatch,
}

impl Rejection {
    /// True when the client sent a malformed request rather than a request
    /// that raced with another device.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Rejection::PositionOutOfRange { .. }
                | Rejection::EmptyName
                | Rejection::NameTooLong { .. }
                | Rejection::DuplicateName(_)
                | Rejection::UnknownPlayer(_)
                | Rejection::InvalidTargetScore
                | Rejection::NoPlayers
                | Rejection::DeckTooSmall { .. }
        )
    }
}

/// Cards split for a new match: one starting card per player (in player
/// order), the reshuffled remaining deck and the first card to guess.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deal {
    /// Starting card for each player, same order as the player list.
    pub starting: Vec<Card>,
    /// Remaining deck after dealing.
    pub deck: Vec<Card>,
    /// First card in flight.
    pub first: Card,
}

impl Deal {
    /// Every card of the deal, in no particular order.
    pub fn cards(&self) -> impl Iterator<Item = &Card> {
        self.starting
            .iter()
            .chain(self.deck.iter())
            .chain(std::iter::once(&self.first))
    }
}

/// Whether inserting `card` at `position` keeps `timeline` sorted by year.
/// Same-year neighbours are accepted on either side.
pub fn validate_placement(timeline: &[Card], card: &Card, position: usize) -> bool {
    if position > timeline.len() {
        return false;
    }
    let prev_ok = position == 0 || timeline[position - 1].year <= card.year;
    let next_ok = position == timeline.len() || timeline[position].year >= card.year;
    prev_ok && next_ok
}

/// Append a player to the lobby with full lives and an empty timeline.
pub fn add_player(state: &MatchState, name: &str, max_len: usize) -> Result<MatchState, Rejection> {
    let phase = next_phase(state.phase, MatchEvent::Join)?;
    let name = name.trim();

    if name.is_empty() {
        return Err(Rejection::EmptyName);
    }
    if name.chars().count() > max_len {
        return Err(Rejection::NameTooLong { max: max_len });
    }
    if state.players.iter().any(|existing| existing == name) {
        return Err(Rejection::DuplicateName(name.to_owned()));
    }

    let mut next = state.clone();
    next.players.push(name.to_owned());
    next.timelines.insert(name.to_owned(), Vec::new());
    next.lives.insert(name.to_owned(), STARTING_LIVES);
    next.phase = phase;
    Ok(next)
}

/// Shuffle `deck`, deal one card per player, reshuffle the rest and draw the
/// first card in flight.
pub fn deal<R>(player_count: usize, mut deck: Vec<Card>, rng: &mut R) -> Result<Deal, Rejection>
where
    R: Rng + ?Sized,
{
    if player_count == 0 {
        return Err(Rejection::NoPlayers);
    }
    let required = player_count + 1;
    if deck.len() < required {
        return Err(Rejection::DeckTooSmall {
            required,
            available: deck.len(),
        });
    }

    deck.shuffle(rng);
    let starting = deck.split_off(deck.len() - player_count);
    deck.shuffle(rng);
    let first = deck.pop().ok_or(Rejection::DeckTooSmall {
        required,
        available: player_count,
    })?;

    Ok(Deal {
        starting,
        deck,
        first,
    })
}

/// Install a deal and open the first round.
pub fn start_match(
    state: &MatchState,
    deal: Deal,
    target_score: usize,
) -> Result<MatchState, Rejection> {
    let phase = next_phase(state.phase, MatchEvent::Start)?;

    if state.players.is_empty() {
        return Err(Rejection::NoPlayers);
    }
    if target_score < MIN_TARGET_SCORE {
        return Err(Rejection::InvalidTargetScore);
    }
    if deal.starting.len() != state.players.len() {
        return Err(Rejection::DealMismatch);
    }

    if let Some(duplicate) = first_duplicate(&deal) {
        return Err(Rejection::DuplicateCard(duplicate));
    }

    let mut next = MatchState::lobby(state.players.clone(), target_score);
    next.id = state.id;
    next.version = state.version;
    next.created_at = state.created_at;
    next.total_cards = deal.starting.len() + deal.deck.len() + 1;
    for (name, card) in state.players.iter().zip(deal.starting) {
        next.timelines.insert(name.clone(), vec![card]);
    }
    next.deck = deal.deck;
    next.current_card = Some(deal.first);
    next.phase = phase;
    Ok(next)
}

fn first_duplicate(deal: &Deal) -> Option<String> {
    let mut seen = HashSet::new();
    deal.cards()
        .find(|card| !seen.insert(card.media_ref.as_str()))
        .map(|card| card.media_ref.clone())
}

/// Place the current card for `player` at `position`.
///
/// A correct placement inserts the card right away; lives and end conditions
/// are only settled by [`finalize_reveal`].
pub fn apply_guess(
    state: &MatchState,
    player: &str,
    position: usize,
) -> Result<MatchState, Rejection> {
    let phase = next_phase(state.phase, MatchEvent::Guess)?;
    let active = state.active_player().ok_or(Rejection::NoPlayers)?;

    if active != player {
        if !state.players.iter().any(|name| name == player) {
            return Err(Rejection::UnknownPlayer(player.to_owned()));
        }
        return Err(Rejection::NotYourTurn {
            player: player.to_owned(),
            active: active.to_owned(),
        });
    }

    let card = state.current_card.as_ref().ok_or(Rejection::NoCurrentCard)?;
    if state.pending_guess.is_some() {
        return Err(Rejection::GuessAlreadyPending);
    }

    let timeline = state.timeline(active);
    if position > timeline.len() {
        return Err(Rejection::PositionOutOfRange {
            position,
            len: timeline.len(),
        });
    }
    if timeline.iter().any(|placed| placed.media_ref == card.media_ref) {
        return Err(Rejection::DuplicateCard(card.media_ref.clone()));
    }

    let outcome = validate_placement(timeline, card, position);
    let mut next = state.clone();
    if outcome {
        next.timelines
            .entry(active.to_owned())
            .or_default()
            .insert(position, card.clone());
    }
    next.pending_guess = Some(PendingGuess {
        player: active.to_owned(),
        position,
        outcome,
    });
    next.phase = phase;
    Ok(next)
}

/// Settle the pending guess exactly once: lives, end conditions and the result
/// banner. Calling it again on the returned state is rejected.
pub fn finalize_reveal(state: &MatchState) -> Result<MatchState, Rejection> {
    if state.reveal_consumed {
        return Err(Rejection::RevealAlreadyConsumed);
    }
    let pending = state
        .pending_guess
        .clone()
        .ok_or(Rejection::NoPendingGuess)?;
    let card = state.current_card.clone().ok_or(Rejection::NoCurrentCard)?;

    let mut next = state.clone();
    next.reveal_consumed = true;

    let lives = next
        .lives
        .entry(pending.player.clone())
        .or_insert(STARTING_LIVES);
    if !pending.outcome {
        *lives = lives.saturating_sub(1);
    }
    let lives_left = *lives;
    let score = next.score(&pending.player);

    // Only a successful placement can win; a failed one may still cost the last life.
    let outcome = if pending.outcome && score >= state.target_score {
        RevealOutcome::TargetReached
    } else if lives_left == 0 {
        RevealOutcome::OutOfLives
    } else {
        RevealOutcome::Continue
    };
    next.phase = next_phase(state.phase, MatchEvent::Reveal(outcome))?;

    match outcome {
        RevealOutcome::TargetReached => {
            next.winner = Some(pending.player.clone());
            next.end_reason = Some(EndReason::TargetReached);
        }
        RevealOutcome::OutOfLives => {
            next.end_reason = Some(EndReason::OutOfLives);
        }
        RevealOutcome::Continue => {}
    }

    let mut timeline_before = state.timeline(&pending.player).to_vec();
    if pending.outcome && pending.position < timeline_before.len() {
        timeline_before.remove(pending.position);
    }
    next.last_result = Some(GuessResult {
        player: pending.player,
        card,
        position: pending.position,
        success: pending.outcome,
        timeline_before,
    });

    Ok(next)
}

/// Store trivia for the card whose reveal has been consumed.
pub fn attach_trivia(
    state: &MatchState,
    media_ref: &str,
    text: &str,
) -> Result<MatchState, Rejection> {
    if !state.reveal_consumed {
        return Err(Rejection::NoPendingGuess);
    }
    let card = state.current_card.as_ref().ok_or(Rejection::NoCurrentCard)?;
    if card.media_ref != media_ref {
        return Err(Rejection::TriviaMismatch);
    }
    if state.trivia.is_some() {
        return Err(Rejection::TriviaAlreadyAttached);
    }

    let mut next = state.clone();
    next.trivia = Some(text.to_owned());
    Ok(next)
}

/// Move to the next player and draw a new card.
///
/// `drawn` is the enriched copy of the top of the deck; it must match the top
/// card by identity. When the deck is empty the match ends and the longest
/// timeline wins.
pub fn advance_turn(state: &MatchState, drawn: Option<Card>) -> Result<MatchState, Rejection> {
    let deck_exhausted = state.deck.is_empty();
    let phase = next_phase(state.phase, MatchEvent::Advance { deck_exhausted })?;

    let mut next = state.clone();
    next.turn_index += 1;
    if next.current_card.is_some() && !next.current_card_placed() {
        next.discarded += 1;
    }
    next.pending_guess = None;
    next.reveal_consumed = false;
    next.trivia = None;
    next.phase = phase;

    if deck_exhausted {
        next.current_card = None;
        next.winner = next.leader().map(str::to_owned);
        next.end_reason = Some(EndReason::DeckExhausted);
        return Ok(next);
    }

    let drawn = drawn.ok_or(Rejection::StaleDraw)?;
    match next.deck.pop() {
        Some(top) if top.media_ref == drawn.media_ref => {
            next.current_card = Some(drawn);
            Ok(next)
        }
        _ => Err(Rejection::StaleDraw),
    }
}

/// Replace a finished match (or the lobby) with a fresh lobby, optionally
/// keeping the player names.
pub fn reset(state: &MatchState, keep_players: bool) -> Result<MatchState, Rejection> {
    let phase = next_phase(state.phase, MatchEvent::Reset)?;
    let players = if keep_players {
        state.players.clone()
    } else {
        Vec::new()
    };

    let mut next = MatchState::lobby(players, state.target_score);
    next.id = Uuid::new_v4();
    next.version = state.version;
    next.phase = phase;
    Ok(next)
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    fn card(year: i32, id: &str) -> Card {
        Card {
            artist: format!("artist {id}"),
            title: format!("title {id}"),
            year,
            media_ref: id.into(),
            image_ref: format!("https://img.example/{id}.jpg"),
            ai_corrected: false,
        }
    }

    fn lobby(names: &[&str]) -> MatchState {
        names
            .iter()
            .fold(MatchState::lobby(Vec::new(), 3), |state, name| {
                add_player(&state, name, 20).unwrap()
            })
    }

    /// Two players, explicit post-deal layout: ann holds 2005, bob holds 1975,
    /// 1990 is in flight and the deck top is the end of the vector.
    fn two_player_match(target_score: usize) -> MatchState {
        let deal = Deal {
            starting: vec![card(2005, "ann-start"), card(1975, "bob-start")],
            deck: vec![
                card(2010, "D"),
                card(2000, "C"),
                card(1980, "A"),
            ],
            first: card(1990, "B"),
        };
        start_match(&lobby(&["ann", "bob"]), deal, target_score).unwrap()
    }

    fn assert_sorted(timeline: &[Card]) {
        assert!(
            timeline.windows(2).all(|pair| pair[0].year <= pair[1].year),
            "timeline not sorted: {:?}",
            timeline.iter().map(|c| c.year).collect::<Vec<_>>()
        );
    }

    #[test]
    fn placement_boundaries() {
        let timeline = vec![card(1975, "a"), card(1999, "b")];
        assert!(validate_placement(&timeline, &card(1960, "x"), 0));
        assert!(!validate_placement(&timeline, &card(1980, "x"), 0));
        assert!(validate_placement(&timeline, &card(1980, "x"), 1));
        assert!(validate_placement(&timeline, &card(2020, "x"), 2));
        assert!(!validate_placement(&timeline, &card(1980, "x"), 2));
        assert!(!validate_placement(&timeline, &card(1980, "x"), 3));
    }

    #[test]
    fn placement_accepts_same_year_on_either_side() {
        let timeline = vec![card(1975, "a"), card(1999, "b")];
        let tie = card(1999, "x");
        assert!(validate_placement(&timeline, &tie, 1));
        assert!(validate_placement(&timeline, &tie, 2));
    }

    #[test]
    fn placement_between_two_cards_of_the_same_year() {
        let timeline = vec![card(1984, "a"), card(1984, "b")];
        let tie = card(1984, "x");
        for position in 0..=2 {
            assert!(validate_placement(&timeline, &tie, position));
        }
    }

    #[test]
    fn placement_into_empty_timeline() {
        assert!(validate_placement(&[], &card(1999, "x"), 0));
        assert!(!validate_placement(&[], &card(1999, "x"), 1));
    }

    #[test]
    fn add_player_validates_names() {
        let state = lobby(&["ann"]);
        assert_eq!(add_player(&state, "   ", 20), Err(Rejection::EmptyName));
        assert_eq!(
            add_player(&state, "a-very-long-player-name", 10),
            Err(Rejection::NameTooLong { max: 10 })
        );
        assert_eq!(
            add_player(&state, " ann ", 20),
            Err(Rejection::DuplicateName("ann".into()))
        );

        let next = add_player(&state, "bob", 20).unwrap();
        assert_eq!(next.players, vec!["ann".to_string(), "bob".to_string()]);
        assert_eq!(next.lives_of("bob"), STARTING_LIVES);
        assert!(next.timeline("bob").is_empty());
    }

    #[test]
    fn players_cannot_join_after_start() {
        let state = two_player_match(3);
        assert!(matches!(
            add_player(&state, "cid", 20),
            Err(Rejection::InvalidTransition(_))
        ));
    }

    #[test]
    fn deal_gives_one_card_per_player_and_a_first_card() {
        let deck: Vec<Card> = (0..10).map(|i| card(1950 + i, &format!("c{i}"))).collect();
        let mut rng = StdRng::seed_from_u64(7);
        let deal = deal(3, deck, &mut rng).unwrap();
        assert_eq!(deal.starting.len(), 3);
        assert_eq!(deal.deck.len(), 6);
        let ids: HashSet<_> = deal.cards().map(|c| c.media_ref.clone()).collect();
        assert_eq!(ids.len(), 10);
    }

    #[test]
    fn deal_requires_enough_cards() {
        let mut rng = StdRng::seed_from_u64(1);
        let deck = vec![card(1990, "a"), card(1991, "b")];
        assert_eq!(
            deal(2, deck, &mut rng),
            Err(Rejection::DeckTooSmall {
                required: 3,
                available: 2
            })
        );
        assert_eq!(deal(0, Vec::new(), &mut rng), Err(Rejection::NoPlayers));
    }

    #[test]
    fn start_match_requires_players() {
        let deal = Deal {
            starting: Vec::new(),
            deck: Vec::new(),
            first: card(1990, "x"),
        };
        assert_eq!(
            start_match(&MatchState::lobby(Vec::new(), 3), deal, 3),
            Err(Rejection::NoPlayers)
        );
    }

    #[test]
    fn start_match_rejects_a_deal_for_other_players() {
        let deal = Deal {
            starting: vec![card(1990, "x")],
            deck: vec![card(1991, "y")],
            first: card(1992, "z"),
        };
        assert_eq!(
            start_match(&lobby(&["ann", "bob"]), deal, 3),
            Err(Rejection::DealMismatch)
        );
    }

    #[test]
    fn start_match_rejects_duplicate_cards() {
        let deal = Deal {
            starting: vec![card(1990, "x")],
            deck: vec![card(1991, "x")],
            first: card(1992, "y"),
        };
        assert_eq!(
            start_match(&lobby(&["ann"]), deal, 3),
            Err(Rejection::DuplicateCard("x".into()))
        );
    }

    #[test]
    fn start_match_deals_in_player_order() {
        let state = two_player_match(3);
        assert_eq!(state.phase, MatchPhase::Guessing);
        assert_eq!(state.turn_index, 0);
        assert_eq!(state.timeline("ann")[0].media_ref, "ann-start");
        assert_eq!(state.timeline("bob")[0].media_ref, "bob-start");
        assert_eq!(state.current_card.as_ref().unwrap().media_ref, "B");
        assert_eq!(state.total_cards, 6);
        assert_eq!(state.cards_in_play(), state.total_cards);
    }

    #[test]
    fn end_to_end_two_player_round() {
        let state = two_player_match(3);
        assert_eq!(state.active_player(), Some("ann"));

        let guessed = apply_guess(&state, "ann", 0).unwrap();
        let years: Vec<i32> = guessed.timeline("ann").iter().map(|c| c.year).collect();
        assert_eq!(years, vec![1990, 2005]);
        assert_eq!(
            guessed.pending_guess,
            Some(PendingGuess {
                player: "ann".into(),
                position: 0,
                outcome: true
            })
        );
        assert_eq!(guessed.phase, MatchPhase::Guessing);

        let revealed = finalize_reveal(&guessed).unwrap();
        assert_eq!(revealed.phase, MatchPhase::Reveal);
        assert_eq!(revealed.lives_of("ann"), 3);
        assert_eq!(revealed.score("ann"), 2);
        let result = revealed.last_result.as_ref().unwrap();
        assert!(result.success);
        assert_eq!(result.timeline_before.len(), 1);

        let advanced = advance_turn(&revealed, revealed.deck.last().cloned()).unwrap();
        assert_eq!(advanced.phase, MatchPhase::Guessing);
        assert_eq!(advanced.active_player(), Some("bob"));
        assert_eq!(advanced.current_card.as_ref().unwrap().media_ref, "A");
        assert!(advanced.pending_guess.is_none());
        assert!(!advanced.reveal_consumed);
    }

    #[test]
    fn failed_guess_leaves_timeline_untouched() {
        let state = two_player_match(3);
        let guessed = apply_guess(&state, "ann", 1).unwrap();
        assert_eq!(guessed.timeline("ann"), state.timeline("ann"));
        assert!(!guessed.pending_guess.as_ref().unwrap().outcome);

        let revealed = finalize_reveal(&guessed).unwrap();
        assert_eq!(revealed.lives_of("ann"), 2);
        assert_eq!(revealed.phase, MatchPhase::Reveal);
        assert!(!revealed.last_result.as_ref().unwrap().success);
    }

    #[test]
    fn guess_from_wrong_player_is_rejected() {
        let state = two_player_match(3);
        assert_eq!(
            apply_guess(&state, "bob", 0),
            Err(Rejection::NotYourTurn {
                player: "bob".into(),
                active: "ann".into()
            })
        );
        assert_eq!(
            apply_guess(&state, "zed", 0),
            Err(Rejection::UnknownPlayer("zed".into()))
        );
    }

    #[test]
    fn guess_position_out_of_range_is_rejected() {
        let state = two_player_match(3);
        assert_eq!(
            apply_guess(&state, "ann", 2),
            Err(Rejection::PositionOutOfRange { position: 2, len: 1 })
        );
    }

    #[test]
    fn repeated_guess_is_rejected() {
        let state = two_player_match(3);
        let guessed = apply_guess(&state, "ann", 0).unwrap();
        assert_eq!(
            apply_guess(&guessed, "ann", 1),
            Err(Rejection::GuessAlreadyPending)
        );
    }

    #[test]
    fn card_already_on_timeline_cannot_be_inserted_again() {
        let mut state = two_player_match(3);
        let current = state.current_card.clone().unwrap();
        state.timelines.insert("ann".into(), vec![current.clone()]);
        for position in 0..=1 {
            assert_eq!(
                apply_guess(&state, "ann", position),
                Err(Rejection::DuplicateCard(current.media_ref.clone()))
            );
        }
    }

    #[test]
    fn finalize_reveal_is_idempotent() {
        let state = two_player_match(3);
        let guessed = apply_guess(&state, "ann", 1).unwrap();
        let once = finalize_reveal(&guessed).unwrap();
        let twice = finalize_reveal(&once).unwrap_or_else(|_| once.clone());
        assert_eq!(once, twice);
        assert_eq!(twice.lives_of("ann"), 2);
        assert_eq!(finalize_reveal(&once), Err(Rejection::RevealAlreadyConsumed));
    }

    #[test]
    fn finalize_reveal_requires_a_pending_guess() {
        let state = two_player_match(3);
        assert_eq!(finalize_reveal(&state), Err(Rejection::NoPendingGuess));
    }

    #[test]
    fn last_life_lost_ends_the_match() {
        let mut state = two_player_match(3);
        state.lives.insert("ann".into(), 1);
        state.timelines.insert("bob".into(), vec![card(1960, "b1"), card(1961, "b2")]);

        let guessed = apply_guess(&state, "ann", 1).unwrap();
        let revealed = finalize_reveal(&guessed).unwrap();
        assert_eq!(revealed.phase, MatchPhase::GameOver);
        assert_eq!(revealed.end_reason, Some(EndReason::OutOfLives));
        assert_eq!(revealed.lives_of("ann"), 0);
        assert!(revealed.winner.is_none());
    }

    #[test]
    fn reaching_target_on_last_life_is_victory_not_game_over() {
        let mut state = two_player_match(2);
        state.lives.insert("ann".into(), 1);

        let guessed = apply_guess(&state, "ann", 0).unwrap();
        let revealed = finalize_reveal(&guessed).unwrap();
        assert_eq!(revealed.phase, MatchPhase::Victory);
        assert_eq!(revealed.winner.as_deref(), Some("ann"));
        assert_eq!(revealed.end_reason, Some(EndReason::TargetReached));
        // Success never costs a life, so the out-of-lives branch cannot fire.
        assert_eq!(revealed.lives_of("ann"), 1);

        let mut failing = two_player_match(2);
        failing.lives.insert("ann".into(), 1);
        let revealed = finalize_reveal(&apply_guess(&failing, "ann", 1).unwrap()).unwrap();
        assert_eq!(revealed.phase, MatchPhase::GameOver);
        assert!(revealed.score("ann") < revealed.target_score);
    }

    #[test]
    fn failed_guess_on_a_met_target_is_game_over() {
        let mut state = two_player_match(2);
        state.target_score = 1;
        state.lives.insert("ann".into(), 1);

        let revealed = finalize_reveal(&apply_guess(&state, "ann", 1).unwrap()).unwrap();
        assert_eq!(revealed.phase, MatchPhase::GameOver);
        assert_eq!(revealed.end_reason, Some(EndReason::OutOfLives));
        assert!(revealed.winner.is_none());
        assert!(!revealed.last_result.unwrap().success);
    }

    #[test]
    fn target_must_exceed_the_dealt_card() {
        let deal = Deal {
            starting: vec![card(2005, "s")],
            deck: Vec::new(),
            first: card(1990, "f"),
        };
        assert_eq!(
            start_match(&lobby(&["ann"]), deal.clone(), 1),
            Err(Rejection::InvalidTargetScore)
        );
        assert!(start_match(&lobby(&["ann"]), deal, MIN_TARGET_SCORE).is_ok());
    }

    #[test]
    fn trivia_attaches_once_to_the_revealed_card() {
        let state = two_player_match(3);
        let guessed = apply_guess(&state, "ann", 0).unwrap();
        assert_eq!(
            attach_trivia(&guessed, "B", "fun fact"),
            Err(Rejection::NoPendingGuess)
        );

        let revealed = finalize_reveal(&guessed).unwrap();
        assert_eq!(
            attach_trivia(&revealed, "A", "fun fact"),
            Err(Rejection::TriviaMismatch)
        );
        let with_trivia = attach_trivia(&revealed, "B", "fun fact").unwrap();
        assert_eq!(with_trivia.trivia.as_deref(), Some("fun fact"));
        assert_eq!(
            attach_trivia(&with_trivia, "B", "other"),
            Err(Rejection::TriviaAlreadyAttached)
        );
    }

    #[test]
    fn advance_turn_requires_reveal_phase() {
        let state = two_player_match(3);
        assert!(matches!(
            advance_turn(&state, state.deck.last().cloned()),
            Err(Rejection::InvalidTransition(_))
        ));
    }

    #[test]
    fn advance_turn_rejects_a_stale_draw() {
        let state = two_player_match(3);
        let revealed = finalize_reveal(&apply_guess(&state, "ann", 0).unwrap()).unwrap();
        assert_eq!(
            advance_turn(&revealed, Some(card(2000, "C"))),
            Err(Rejection::StaleDraw)
        );
        assert_eq!(advance_turn(&revealed, None), Err(Rejection::StaleDraw));
    }

    #[test]
    fn advance_turn_keeps_the_enriched_year() {
        let state = two_player_match(3);
        let revealed = finalize_reveal(&apply_guess(&state, "ann", 0).unwrap()).unwrap();
        let mut enriched = revealed.deck.last().cloned().unwrap();
        enriched.year = 1981;
        enriched.ai_corrected = true;

        let advanced = advance_turn(&revealed, Some(enriched.clone())).unwrap();
        assert_eq!(advanced.current_card, Some(enriched));
        assert_eq!(advanced.deck.len(), revealed.deck.len() - 1);
    }

    #[test]
    fn exhausted_deck_ends_with_the_longest_timeline() {
        let mut state = two_player_match(10);
        state.deck.clear();
        state.total_cards = 3;
        let revealed = finalize_reveal(&apply_guess(&state, "ann", 0).unwrap()).unwrap();
        let finished = advance_turn(&revealed, None).unwrap();
        assert_eq!(finished.phase, MatchPhase::GameOver);
        assert_eq!(finished.end_reason, Some(EndReason::DeckExhausted));
        assert_eq!(finished.winner.as_deref(), Some("ann"));
        assert!(finished.current_card.is_none());
        assert_eq!(finished.cards_in_play(), finished.total_cards);
    }

    #[test]
    fn cards_are_conserved_and_timelines_stay_sorted() {
        let mut state = two_player_match(10);
        let total = state.total_cards;
        let positions = [0usize, 2, 1, 0, 3, 1];

        for position in positions {
            if state.phase != MatchPhase::Guessing {
                break;
            }
            let player = state.active_player().unwrap().to_owned();
            let slot = position.min(state.timeline(&player).len());
            state = apply_guess(&state, &player, slot).unwrap();
            assert_eq!(state.cards_in_play(), total);
            assert_sorted(state.timeline(&player));

            state = finalize_reveal(&state).unwrap();
            assert_eq!(state.cards_in_play(), total);

            if state.phase == MatchPhase::Reveal {
                let drawn = state.deck.last().cloned();
                state = advance_turn(&state, drawn).unwrap();
                assert_eq!(state.cards_in_play(), total);
            }
        }

        for name in &state.players {
            assert_sorted(state.timeline(name));
        }
    }

    #[test]
    fn reset_keeps_players_on_request() {
        let mut state = two_player_match(2);
        state = finalize_reveal(&apply_guess(&state, "ann", 0).unwrap()).unwrap();
        assert_eq!(state.phase, MatchPhase::Victory);

        let kept = reset(&state, true).unwrap();
        assert_eq!(kept.phase, MatchPhase::Lobby);
        assert_eq!(kept.players, state.players);
        assert!(kept.timeline("ann").is_empty());
        assert_eq!(kept.lives_of("ann"), STARTING_LIVES);
        assert_ne!(kept.id, state.id);
        assert!(kept.winner.is_none());

        let cleared = reset(&state, false).unwrap();
        assert!(cleared.players.is_empty());
    }

    #[test]
    fn running_match_cannot_be_reset() {
        let state = two_player_match(3);
        assert!(matches!(
            reset(&state, true),
            Err(Rejection::InvalidTransition(_))
        ));
    }
}
