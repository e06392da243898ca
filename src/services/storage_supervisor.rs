use std::{future::Future, sync::Arc, time::Duration};

use tokio::time::sleep;
use tracing::{info, warn};

use crate::{
    dao::{session_store::SessionStore, storage::StorageError},
    state::SharedState,
};

const INITIAL_DELAY: Duration = Duration::from_millis(1_000);
const MAX_DELAY: Duration = Duration::from_secs(10);
const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(5);
const MAX_RECONNECT_ATTEMPTS: u32 = 3;

fn backoff(delay: Duration) -> Duration {
    (delay * 2).min(MAX_DELAY)
}

/// Keep a session store installed, connecting with `connect` and reconnecting with backoff.
///
/// While no healthy store is reachable the shared state stays in degraded mode and
/// services answer with [`ServiceError::Degraded`](crate::error::ServiceError::Degraded).
pub async fn run<F, Fut>(state: SharedState, mut connect: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Arc<dyn SessionStore>, StorageError>> + Send,
{
    let mut delay = INITIAL_DELAY;

    loop {
        match connect().await {
            Ok(store) => {
                state.set_session_store(store.clone()).await;
                info!("session store connected; leaving degraded mode");
                delay = INITIAL_DELAY;

                watch_store(&state, store.as_ref()).await;

                warn!("session store lost; dropping it until a new connection succeeds");
                state.clear_session_store().await;
            }
            Err(err) => {
                warn!(error = %err, "session store connection attempt failed");
            }
        }
        sleep(delay).await;
        delay = backoff(delay);
    }
}

/// Poll the store's health until it fails and cannot be revived.
async fn watch_store(state: &SharedState, store: &dyn SessionStore) {
    loop {
        if store.health_check().await.is_ok() {
            if state.is_degraded().await {
                info!("session store healthy again; leaving degraded mode");
                state.update_degraded(false).await;
            }
            sleep(HEALTH_POLL_INTERVAL).await;
            continue;
        }

        if !revive(state, store).await {
            return;
        }
        state.update_degraded(false).await;
        sleep(HEALTH_POLL_INTERVAL).await;
    }
}

/// Try to reconnect in place, entering degraded mode after the first failure.
async fn revive(state: &SharedState, store: &dyn SessionStore) -> bool {
    let mut delay = INITIAL_DELAY;
    for attempt in 0..MAX_RECONNECT_ATTEMPTS {
        match store.try_reconnect().await {
            Ok(()) => {
                info!(attempt, "session store reconnected after a failed health check");
                return true;
            }
            Err(err) => {
                warn!(attempt, error = %err, "session store reconnect attempt failed");
                if attempt == 0 {
                    state.update_degraded(true).await;
                }
                sleep(delay).await;
                delay = backoff(delay);
            }
        }
    }
    warn!("exhausted session store reconnect attempts");
    false
}
