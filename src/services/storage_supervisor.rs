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

/// Exponential retry delay capped at [`MAX_DELAY`].
#[derive(Debug, Clone, Copy)]
struct Backoff {
    delay: Duration,
}

impl Backoff {
    fn new() -> Self {
        Self {
            delay: INITIAL_DELAY,
        }
    }

    async fn wait(&mut self) {
        sleep(self.delay).await;
        self.delay = (self.delay * 2).min(MAX_DELAY);
    }

    fn reset(&mut self) {
        self.delay = INITIAL_DELAY;
    }
}

/// Connect the match store, poll its health and keep the shared state in degraded
/// mode while it is unreachable.
pub async fn run<F, Fut>(state: SharedState, mut connect: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Arc<dyn MatchStore>, StorageError>> + Send,
{
    let mut backoff = Backoff::new();

    loop {
        match connect().await {
            Ok(store) => {
                state.set_match_store(store.clone()).await;
                info!("match store connected; leaving degraded mode");
                backoff.reset();

                watch_store(&state, store.as_ref()).await;
                warn!("match store lost; reconnecting from scratch");
            }
            Err(err) => warn!(error = %err, "match store connection attempt failed"),
        }
        backoff.wait().await;
    }
}

/// Poll an installed store until it fails and cannot be revived in place.
async fn watch_store(state: &SharedState, store: &dyn MatchStore) {
    loop {
        match store.health_check().await {
            Ok(()) => {
                if state.is_degraded() {
                    info!("match store healthy again; leaving degraded mode");
                    state.update_degraded(false);
                }
                sleep(HEALTH_POLL_INTERVAL).await;
            }
            Err(err) => {
                warn!(error = %err, "match store health check failed; entering degraded mode");
                state.update_degraded(true);
                if !revive(store).await {
                    warn!("exhausted match store reconnect attempts; staying in degraded mode");
                    return;
                }
                state.update_degraded(false);
            }
        }
    }
}

async fn revive(store: &dyn MatchStore) -> bool {
    let mut backoff = Backoff::new();
    for attempt in 0..MAX_RECONNECT_ATTEMPTS {
        match store.try_reconnect().await {
            Ok(()) => {
                info!(attempt, "match store reconnected after health check failure");
                return true;
            }
            Err(err) => {
                warn!(attempt, error = %err, "match store reconnect attempt failed");
                backoff.wait().await;
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::AppConfig, dao::match_store::memory::MemoryMatchStore, state::AppState};

    #[tokio::test]
    async fn successful_connection_leaves_degraded_mode() {
        let state = AppState::new(AppConfig::default());
        let mut watcher = state.degraded_watcher();
        assert!(state.is_degraded());

        let supervisor = tokio::spawn(run(state.clone(), || async {
            Ok(Arc::new(MemoryMatchStore::default()) as Arc<dyn MatchStore>)
        }));

        tokio::time::timeout(Duration::from_secs(2), watcher.wait_for(|degraded| !*degraded))
            .await
            .expect("degraded flag cleared")
            .unwrap();
        assert!(state.match_store().await.is_some());
        supervisor.abort();
    }
}
