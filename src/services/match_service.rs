//! Read-verify-write cycles against the match store.
//!
//! Every mutation fetches the record, runs a pure engine function and writes
//! the result back fenced on the version it read. A lost race is retried once
//! against the fresh record.

use std::time::SystemTime;

use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::{
    dao::match_store::MatchStore,
    error::{STALE_STATE_MESSAGE, ServiceError},
    state::{
        SharedState,
        engine::{self, Deal, Rejection},
        match_state::MatchState,
        state_machine::MatchPhase,
    },
};

/// Attempts made by [`commit`] before giving up on a contended record.
const MAX_COMMIT_ATTEMPTS: usize = 2;

/// What an engine step decided to do with the record.
enum Change {
    Write(MatchState),
    Unchanged,
}

/// Load the stored match, or a fresh unsaved lobby when nothing exists yet.
/// The flag tells whether the record exists in the store.
async fn load(
    state: &SharedState,
    store: &dyn MatchStore,
) -> Result<(MatchState, bool), ServiceError> {
    match store.fetch_match().await? {
        Some(entity) => Ok((entity.into(), true)),
        None => Ok((
            MatchState::lobby(Vec::new(), state.config().default_target_score),
            false,
        )),
    }
}

async fn commit<F>(
    state: &SharedState,
    observed_version: Option<u64>,
    operation: &'static str,
    mut step: F,
) -> Result<MatchState, ServiceError>
where
    F: FnMut(&MatchState) -> Result<Change, Rejection>,
{
    let store = state.require_match_store().await?;

    for attempt in 1..=MAX_COMMIT_ATTEMPTS {
        let (current, stored) = load(state, store.as_ref()).await?;

        if let Some(observed) = observed_version
            && observed != current.version
        {
            debug!(operation, observed, actual = current.version, "request based on stale state");
            return Err(ServiceError::Conflict(STALE_STATE_MESSAGE.into()));
        }

        let mut next = match step(&current) {
            Ok(Change::Write(next)) => next,
            Ok(Change::Unchanged) => return Ok(current),
            Err(rejection) => {
                debug!(operation, phase = ?current.phase, %rejection, "engine rejected operation");
                return Err(rejection.into());
            }
        };

        next.version = current.version + 1;
        next.updated_at = SystemTime::now();
        let expected = stored.then_some(current.version);

        match store.compare_and_swap(expected, next.clone().into()).await {
            Ok(()) => {
                info!(
                    operation,
                    version = next.version,
                    phase = ?next.phase,
                    "match state committed"
                );
                return Ok(next);
            }
            Err(err) if err.is_conflict() => {
                warn!(operation, attempt, error = %err, "match state changed underneath; retrying");
            }
            Err(err) => return Err(err.into()),
        }
    }

    Err(ServiceError::Conflict(STALE_STATE_MESSAGE.into()))
}

/// Current match, without writing anything.
pub async fn snapshot(state: &SharedState) -> Result<MatchState, ServiceError> {
    let store = state.require_match_store().await?;
    let (current, _) = load(state, store.as_ref()).await?;
    Ok(current)
}

/// Add a player to the lobby.
pub async fn add_player(state: &SharedState, name: &str) -> Result<MatchState, ServiceError> {
    let max_len = state.config().max_name_len;
    commit(state, None, "add_player", |current| {
        engine::add_player(current, name, max_len).map(Change::Write)
    })
    .await
}

/// Fetch tracks, deal them, enrich the cards that enter play and open the
/// first round. Any failure before the commit leaves the lobby untouched.
pub async fn start_match(
    state: &SharedState,
    target_score: Option<usize>,
    source: Option<String>,
) -> Result<MatchState, ServiceError> {
    let target_score = target_score.unwrap_or(state.config().default_target_score);
    if target_score < engine::MIN_TARGET_SCORE {
        return Err(Rejection::InvalidTargetScore.into());
    }

    let current = snapshot(state).await?;
    if current.phase != MatchPhase::Lobby {
        return Err(ServiceError::InvalidState(format!(
            "match already running (phase {:?})",
            current.phase
        )));
    }
    if current.players.is_empty() {
        return Err(Rejection::NoPlayers.into());
    }

    let source = source
        .filter(|source| !source.trim().is_empty())
        .unwrap_or_else(|| state.config().default_source.clone());
    let tracks = state.tracks().fetch_tracks(&source).await?;
    info!(source = %source, count = tracks.len(), players = current.players.len(), "dealing match");

    let deal = {
        let mut rng = rand::rng();
        engine::deal(current.players.len(), tracks, &mut rng)?
    };
    let deal = enrich_deal(state, deal).await;

    commit(state, None, "start_match", |current| {
        engine::start_match(current, deal.clone(), target_score).map(Change::Write)
    })
    .await
}

/// Correct the years of the cards that are in play from the first turn.
async fn enrich_deal(state: &SharedState, deal: Deal) -> Deal {
    let enrichment = state.enrichment();
    let Deal {
        starting,
        deck,
        first,
    } = deal;

    let (starting, first) = futures::join!(
        join_all(starting.into_iter().map(|card| enrichment.enrich_card(card))),
        enrichment.enrich_card(first),
    );

    Deal {
        starting,
        deck,
        first,
    }
}

/// Place the current card for `player`. The name is trimmed the same way
/// it was when the player joined.
pub async fn submit_guess(
    state: &SharedState,
    player: &str,
    position: usize,
    observed_version: Option<u64>,
) -> Result<MatchState, ServiceError> {
    let player = player.trim();
    let next = commit(state, observed_version, "submit_guess", |current| {
        engine::apply_guess(current, player, position).map(Change::Write)
    })
    .await?;

    if let Some(guess) = &next.pending_guess {
        info!(player = %guess.player, position = guess.position, "guess recorded");
    }
    Ok(next)
}

/// Reveal the pending guess and attach trivia for the revealed card.
///
/// Safe to call repeatedly: once the reveal is consumed, later calls return
/// the stored state unchanged.
pub async fn trigger_reveal(state: &SharedState) -> Result<MatchState, ServiceError> {
    let revealed = commit(state, None, "reveal", |current| {
        match engine::finalize_reveal(current) {
            Ok(next) => Ok(Change::Write(next)),
            Err(Rejection::RevealAlreadyConsumed) => Ok(Change::Unchanged),
            Err(rejection) => Err(rejection),
        }
    })
    .await?;

    if let Some(result) = &revealed.last_result {
        debug!(player = %result.player, success = result.success, phase = ?revealed.phase, "reveal finalized");
    }

    if revealed.trivia.is_some() {
        return Ok(revealed);
    }
    let Some(card) = revealed.current_card.clone() else {
        return Ok(revealed);
    };

    let text = state.enrichment().trivia(&card.artist, &card.title).await;
    let attached = commit(state, None, "attach_trivia", |current| {
        match engine::attach_trivia(current, &card.media_ref, &text) {
            Ok(next) => Ok(Change::Write(next)),
            Err(Rejection::TriviaAlreadyAttached | Rejection::TriviaMismatch) => {
                Ok(Change::Unchanged)
            }
            Err(rejection) => Err(rejection),
        }
    })
    .await;

    match attached {
        Ok(next) => Ok(next),
        Err(err) => {
            warn!(media_ref = %card.media_ref, error = %err, "failed to attach trivia");
            Ok(revealed)
        }
    }
}

/// Move to the next player, drawing and enriching the top card.
pub async fn advance_turn(state: &SharedState) -> Result<MatchState, ServiceError> {
    let current = snapshot(state).await?;
    if current.phase.is_terminal() {
        return Err(ServiceError::InvalidState(
            "match is over; reset to play again".into(),
        ));
    }
    let drawn = match (current.phase, current.deck.last()) {
        (MatchPhase::Reveal, Some(top)) => Some(state.enrichment().enrich_card(top.clone()).await),
        _ => None,
    };

    let next = commit(state, None, "advance_turn", |current| {
        engine::advance_turn(current, drawn.clone()).map(Change::Write)
    })
    .await?;

    if let Some(reason) = next.end_reason {
        info!(?reason, winner = ?next.winner, "match finished");
    }
    Ok(next)
}

/// Replace a finished match with a fresh lobby.
pub async fn reset_match(
    state: &SharedState,
    keep_players: bool,
) -> Result<MatchState, ServiceError> {
    commit(state, None, "reset", |current| {
        engine::reset(current, keep_players).map(Change::Write)
    })
    .await
}
