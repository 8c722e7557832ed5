use std::time::Duration;

use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use crate::{error::ServiceError, services::match_service, state::SharedState};

/// Poll the store and reveal pending guesses as soon as they show up.
///
/// Several watchers may run against the same store; a reveal fired twice is
/// absorbed by the reveal being idempotent.
pub async fn run(state: SharedState, every: Duration) {
    info!(interval_ms = every.as_millis() as u64, "reveal watcher started");
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        match poll_once(&state).await {
            Ok(_) => {}
            Err(ServiceError::Degraded) => debug!("reveal watcher idle: storage unavailable"),
            Err(err) => warn!(error = %err, "reveal watcher poll failed"),
        }
    }
}

/// One watcher pass. Returns whether a reveal was triggered.
pub async fn poll_once(state: &SharedState) -> Result<bool, ServiceError> {
    let current = match_service::snapshot(state).await?;
    if !current.reveal_pending() {
        return Ok(false);
    }

    debug!(version = current.version, "pending guess detected; revealing");
    match match_service::trigger_reveal(state).await {
        Ok(_) => Ok(true),
        // Another device advanced the match between the read and the reveal.
        Err(ServiceError::InvalidState(message)) => {
            debug!(%message, "reveal no longer applicable");
            Ok(false)
        }
        Err(err) => Err(err),
    }
}
