pub mod channel;
pub mod scores;
pub mod session;
pub mod sport;
pub mod state_machine;
pub mod store;
pub mod tickets;

use std::sync::Arc;

use tokio::sync::{RwLock, watch};

use crate::{
    config::AppConfig,
    dao::score_store::ScoreStore,
    error::ServiceError,
    services::authorization::Authorizer,
    state::{
        sport::{Baseball, Golf, Sport},
        store::SessionStore,
        tickets::TicketBook,
    },
};

pub type SharedState = Arc<AppState>;

/// Central application state: live sessions, connection tickets and the storage handle.
pub struct AppState {
    config: AppConfig,
    score_store: RwLock<Option<Arc<dyn ScoreStore>>>,
    degraded: watch::Sender<bool>,
    tickets: TicketBook,
    authorizer: Authorizer,
    baseball: SessionStore<Baseball>,
    golf: SessionStore<Golf>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        let capacity = config.live.channel_capacity;
        Arc::new(Self {
            tickets: TicketBook::new(config.live.ticket_ttl),
            authorizer: Authorizer::new(),
            baseball: SessionStore::new(capacity),
            golf: SessionStore::new(capacity),
            score_store: RwLock::new(None),
            degraded: degraded_tx,
            config,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// One-time connection tickets for the live streams.
    pub fn tickets(&self) -> &TicketBook {
        &self.tickets
    }

    /// Capability check for tickets and commands.
    pub fn authorizer(&self) -> &Authorizer {
        &self.authorizer
    }

    pub fn baseball_sessions(&self) -> &SessionStore<Baseball> {
        &self.baseball
    }

    pub fn golf_sessions(&self) -> &SessionStore<Golf> {
        &self.golf
    }

    /// Session registry of sport `S`.
    pub fn sessions<S: Sport>(&self) -> &SessionStore<S> {
        S::sessions(self)
    }

    /// Obtain a handle to the current score store, if one is installed.
    pub async fn score_store(&self) -> Option<Arc<dyn ScoreStore>> {
        let guard = self.score_store.read().await;
        guard.as_ref().cloned()
    }

    /// Current score store, or [`ServiceError::Degraded`] when none is installed.
    pub async fn require_score_store(&self) -> Result<Arc<dyn ScoreStore>, ServiceError> {
        self.score_store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new score store implementation and leave degraded mode.
    pub async fn set_score_store(&self, store: Arc<dyn ScoreStore>) {
        {
            let mut guard = self.score_store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false);
    }

    /// Remove the current score store and enter degraded mode.
    pub async fn clear_score_store(&self) {
        {
            let mut guard = self.score_store.write().await;
            guard.take();
        }
        self.update_degraded(true);
    }

    /// Current degraded flag.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::score_store::memory::MemoryScoreStore;

    #[tokio::test]
    async fn starts_degraded_until_a_store_is_installed() {
        let state = AppState::new(AppConfig::default());
        let mut watcher = state.degraded_watcher();
        assert!(state.is_degraded());
        assert!(matches!(
            state.require_score_store().await,
            Err(ServiceError::Degraded)
        ));

        state
            .set_score_store(Arc::new(MemoryScoreStore::new()))
            .await;
        assert!(!state.is_degraded());
        assert!(watcher.has_changed().unwrap());
        assert!(!*watcher.borrow_and_update());

        state.clear_score_store().await;
        assert!(*watcher.borrow_and_update());
    }

    #[tokio::test]
    async fn clearing_twice_notifies_once() {
        let state = AppState::new(AppConfig::default());
        let mut watcher = state.degraded_watcher();
        state.clear_score_store().await;
        assert!(!watcher.has_changed().unwrap());
        assert!(state.is_degraded());
    }

    #[test]
    fn registries_are_per_sport() {
        let state = AppState::new(AppConfig::default());
        assert!(std::ptr::eq(
            state.sessions::<Baseball>(),
            state.baseball_sessions()
        ));
        assert!(std::ptr::eq(state.sessions::<Golf>(), state.golf_sessions()));
    }
}
