use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// High-level phases a match can be in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MatchPhase {
    /// Players are joining; nothing has been dealt yet.
    #[default]
    Lobby,
    /// A card is in flight and the active player has to place it.
    Guessing,
    /// The last guess has been revealed and the shared screen may advance.
    Reveal,
    /// A player reached the target score.
    Victory,
    /// The match ended without a target-score winner (lives or deck ran out).
    GameOver,
}

impl MatchPhase {
    /// Terminal phases only accept a reset.
    pub fn is_terminal(self) -> bool {
        matches!(self, MatchPhase::Victory | MatchPhase::GameOver)
    }
}

/// Result of finalizing a reveal, deciding which phase comes next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevealOutcome {
    /// Nobody won or lost; wait for the shared screen to advance.
    Continue,
    /// The active player's timeline reached the target score.
    TargetReached,
    /// The active player lost their last life.
    OutOfLives,
}

/// Events that can be applied to the match state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchEvent {
    /// A player joins the lobby.
    Join,
    /// Cards are dealt and the first round begins.
    Start,
    /// The active player places the current card.
    Guess,
    /// The pending guess is revealed.
    Reveal(RevealOutcome),
    /// The shared screen moves to the next turn.
    Advance {
        /// Whether the deck ran out before a new card could be drawn.
        deck_exhausted: bool,
    },
    /// The finished match is replaced by a fresh lobby.
    Reset,
}

/// Error returned when attempting to apply an invalid transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// The phase the match was in when the invalid event was received.
    pub from: MatchPhase,
    /// The event that cannot be applied from this phase.
    pub event: MatchEvent,
}

/// Compute the phase reached by applying `event` from `from`.
pub fn next_phase(from: MatchPhase, event: MatchEvent) -> Result<MatchPhase, InvalidTransition> {
    let next = match (from, event) {
        (MatchPhase::Lobby, MatchEvent::Join) => MatchPhase::Lobby,
        (MatchPhase::Lobby, MatchEvent::Start) => MatchPhase::Guessing,
        (MatchPhase::Guessing, MatchEvent::Guess) => MatchPhase::Guessing,
        (MatchPhase::Guessing, MatchEvent::Reveal(outcome)) => match outcome {
            RevealOutcome::Continue => MatchPhase::Reveal,
            RevealOutcome::TargetReached => MatchPhase::Victory,
            RevealOutcome::OutOfLives => MatchPhase::GameOver,
        },
        (MatchPhase::Reveal, MatchEvent::Advance { deck_exhausted }) => {
            if deck_exhausted {
                MatchPhase::GameOver
            } else {
                MatchPhase::Guessing
            }
        }
        (MatchPhase::Lobby | MatchPhase::Victory | MatchPhase::GameOver, MatchEvent::Reset) => {
            MatchPhase::Lobby
        }
        (from, event) => return Err(InvalidTransition { from, event }),
    };

    Ok(next)
}
