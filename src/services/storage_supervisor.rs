use std::{future::Future, sync::Arc, time::Duration};

use tokio::time::sleep;
use tracing::{info, warn};

use crate::{
    dao::{match_store::MatchStore, storage::StorageError},
    state::SharedState,
};

const INITIAL_DELAY: Duration = Duration::from_millis(1_000);
const MAX_DELAY: Duration = Duration::from_secs(10);
const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(5);
const MAX_RECONNECT_ATTEMPTS: u32 = 3;

/// Delays used by the supervisor loop.
#[derive(Debug, Clone, Copy)]
pub struct SupervisorTiming {
    /// First backoff after a failed connection.
    pub initial_delay: Duration,
    /// Backoff ceiling.
    pub max_delay: Duration,
    /// Pause between health checks of a live store.
    pub poll_interval: Duration,
    /// Reconnect attempts before the store is dropped and rebuilt.
    pub reconnect_attempts: u32,
}

impl Default for SupervisorTiming {
    fn default() -> Self {
        Self {
            initial_delay: INITIAL_DELAY,
            max_delay: MAX_DELAY,
            poll_interval: HEALTH_POLL_INTERVAL,
            reconnect_attempts: MAX_RECONNECT_ATTEMPTS,
        }
    }
}

/// Connect to the match store and keep the shared state in degraded mode while
/// it is unreachable. Never returns.
pub async fn run<F, Fut>(state: SharedState, connect: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Arc<dyn MatchStore>, StorageError>> + Send,
{
    run_with(state, connect, SupervisorTiming::default()).await
}

/// [`run`] with explicit timing.
pub async fn run_with<F, Fut>(state: SharedState, mut connect: F, timing: SupervisorTiming)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Arc<dyn MatchStore>, StorageError>> + Send,
{
    let mut delay = timing.initial_delay;

    loop {
        match connect().await {
            Ok(store) => {
                state.set_match_store(store.clone()).await;
                info!("match store connected; leaving degraded mode");
                delay = timing.initial_delay;

                watch_store(&state, store.as_ref(), &timing).await;

                state.clear_match_store().await;
                warn!("match store dropped; rebuilding the connection");
            }
            Err(err) => warn!(error = %err, "match store connection attempt failed"),
        }

        sleep(delay).await;
        delay = (delay * 2).min(timing.max_delay);
    }
}

/// Poll a connected store until it stays unreachable through every reconnect attempt.
async fn watch_store(state: &SharedState, store: &dyn MatchStore, timing: &SupervisorTiming) {
    loop {
        match store.health_check().await {
            Ok(()) => {
                if state.is_degraded().await {
                    info!("match store healthy again; leaving degraded mode");
                    state.update_degraded(false).await;
                }
            }
            Err(err) => {
                warn!(error = %err, "match store health check failed; entering degraded mode");
                state.update_degraded(true).await;
                if !reconnect(store, timing).await {
                    warn!(
                        attempts = timing.reconnect_attempts,
                        "exhausted match store reconnect attempts"
                    );
                    return;
                }
                state.update_degraded(false).await;
            }
        }
        sleep(timing.poll_interval).await;
    }
}

async fn reconnect(store: &dyn MatchStore, timing: &SupervisorTiming) -> bool {
    let mut backoff = timing.initial_delay;
    for attempt in 0..timing.reconnect_attempts {
        match store.try_reconnect().await {
            Ok(()) => {
                info!(attempt, "match store reconnected");
                return true;
            }
            Err(err) => {
                warn!(attempt, error = %err, "match store reconnect attempt failed");
                sleep(backoff).await;
                backoff = (backoff * 2).min(timing.max_delay);
            }
        }
    }
    false
}
