/// Pure session transition table.
pub mod session_machine;

use std::{future::Future, sync::Arc, time::Duration};

use dashmap::DashMap;
use tokio::sync::{Mutex, RwLock, watch};
use tokio::time::timeout;
use tracing::warn;
use uuid::Uuid;

use crate::{config::AppConfig, dao::session_store::SessionStore, error::ServiceError};

pub use self::session_machine::{InvalidTransition, Plan, QuestionCursor, SessionEvent};

/// Handle shared by handlers, services and clients.
pub type SharedState = Arc<AppState>;

/// Central application state holding the store handle, configuration and transition gates.
pub struct AppState {
    session_store: RwLock<Option<Arc<dyn SessionStore>>>,
    degraded: watch::Sender<bool>,
    config: AppConfig,
    transition_gates: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            session_store: RwLock::new(None),
            degraded: degraded_tx,
            config,
            transition_gates: DashMap::new(),
        })
    }

    /// Construct a state with `store` already installed.
    pub async fn with_store(config: AppConfig, store: Arc<dyn SessionStore>) -> SharedState {
        let state = Self::new(config);
        state.set_session_store(store).await;
        state
    }

    /// Runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Obtain a handle to the current session store, if one is installed.
    pub async fn session_store(&self) -> Option<Arc<dyn SessionStore>> {
        let guard = self.session_store.read().await;
        guard.as_ref().cloned()
    }

    /// Obtain the session store or fail with [`ServiceError::Degraded`].
    pub async fn require_session_store(&self) -> Result<Arc<dyn SessionStore>, ServiceError> {
        self.session_store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new session store implementation and leave degraded mode.
    pub async fn set_session_store(&self, store: Arc<dyn SessionStore>) {
        {
            let mut guard = self.session_store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false).await;
    }

    /// Remove the current session store and enter degraded mode.
    pub async fn clear_session_store(&self) {
        {
            let mut guard = self.session_store.write().await;
            guard.take();
        }
        self.update_degraded(true).await;
    }

    /// Current degraded flag.
    pub async fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub async fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        });
    }

    fn transition_gate(&self, session_id: Uuid) -> Arc<Mutex<()>> {
        self.transition_gates
            .entry(session_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop the gate of a session once no caller holds or waits on it.
    fn release_idle_gate(&self, session_id: Uuid) {
        self.transition_gates
            .remove_if(&session_id, |_, gate| Arc::strong_count(gate) == 1);
    }

    /// Number of sessions with a live transition gate.
    pub fn transition_gate_count(&self) -> usize {
        self.transition_gates.len()
    }

    /// Run controller work for one session under its gate and the configured timeout.
    ///
    /// Transitions on different sessions never wait on each other.
    pub async fn run_transition<F, Fut, T>(
        &self,
        session_id: Uuid,
        work: F,
    ) -> Result<T, ServiceError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        let gate = self.transition_gate(session_id);
        let outcome = {
            let _guard = gate.lock().await;
            let limit: Duration = self.config.sessions.transition_timeout;
            match timeout(limit, work()).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!(%session_id, timeout_ms = limit.as_millis() as u64, "session transition timed out");
                    Err(ServiceError::Timeout)
                }
            }
        };
        drop(gate);
        self.release_idle_gate(session_id);
        outcome
    }
}
