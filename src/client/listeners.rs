//! Typed callback registry of the session controller.

use std::sync::{
    Arc, Weak,
    atomic::{AtomicU64, Ordering},
};

use dashmap::DashMap;

use crate::{
    client::{controller::ConnectionState, error::ClientError},
    dto::sse::{PositionUpdate, ScoreUpdate, SessionEnded, SessionStartedEvent},
    state::{session::SessionId, sport::Sport, store::FinalizedOf},
};

/// Viewer and scorer counts after a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountsChanged {
    pub session_id: SessionId,
    /// Open watcher connections.
    pub viewer_count: u32,
    /// Open scorer connections.
    pub scorer_count: u32,
}

/// Connection state transition, with the error that caused it if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionChanged {
    /// State entered.
    pub state: ConnectionState,
    /// Cause of a move to `reconnecting` or `closed`.
    pub error: Option<ClientError>,
}

/// Everything a controller reports to its listeners.
#[derive(Debug, Clone)]
pub enum Notification<S: Sport> {
    /// A session started while the stream waited for one.
    SessionStarted(SessionStartedEvent),
    /// A score entry changed the mirrored session.
    ScoreUpdated(ScoreUpdate<S::Participant>),
    PositionAdvanced(PositionUpdate),
    CountsChanged(CountsChanged),
    /// Final state of a finalized session.
    SessionFinalized(FinalizedOf<S>),
    SessionStopped(SessionEnded),
    ConnectionChanged(ConnectionChanged),
}

type Callback<S> = Arc<dyn Fn(&Notification<S>) + Send + Sync>;

trait Unregister: Send + Sync {
    fn unregister(&self, id: u64);
}

struct Registry<S: Sport> {
    next_id: AtomicU64,
    callbacks: DashMap<u64, Callback<S>>,
}

impl<S: Sport> Unregister for Registry<S> {
    fn unregister(&self, id: u64) {
        self.callbacks.remove(&id);
    }
}

/// Removes its listener when dropped.
#[must_use = "dropping the handle removes the listener"]
pub struct ListenerHandle {
    id: u64,
    registry: Weak<dyn Unregister>,
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.unregister(self.id);
        }
    }
}

impl std::fmt::Debug for ListenerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerHandle").field("id", &self.id).finish()
    }
}

/// Set of callbacks interested in controller notifications.
pub struct Listeners<S: Sport> {
    registry: Arc<Registry<S>>,
}

impl<S: Sport> Default for Listeners<S> {
    fn default() -> Self {
        Self {
            registry: Arc::new(Registry {
                next_id: AtomicU64::new(0),
                callbacks: DashMap::new(),
            }),
        }
    }
}

impl<S: Sport> Listeners<S> {
    /// Register a callback receiving every notification.
    pub fn on_any<F>(&self, callback: F) -> ListenerHandle
    where
        F: Fn(&Notification<S>) + Send + Sync + 'static,
    {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        self.registry.callbacks.insert(id, Arc::new(callback));
        let registry: Arc<dyn Unregister> = self.registry.clone();
        ListenerHandle {
            id,
            registry: Arc::downgrade(&registry),
        }
    }

    pub fn on_session_started<F>(&self, callback: F) -> ListenerHandle
    where
        F: Fn(&SessionStartedEvent) + Send + Sync + 'static,
    {
        self.on_any(move |notification| {
            if let Notification::SessionStarted(event) = notification {
                callback(event);
            }
        })
    }

    pub fn on_score_updated<F>(&self, callback: F) -> ListenerHandle
    where
        F: Fn(&ScoreUpdate<S::Participant>) + Send + Sync + 'static,
    {
        self.on_any(move |notification| {
            if let Notification::ScoreUpdated(update) = notification {
                callback(update);
            }
        })
    }

    pub fn on_position_advanced<F>(&self, callback: F) -> ListenerHandle
    where
        F: Fn(&PositionUpdate) + Send + Sync + 'static,
    {
        self.on_any(move |notification| {
            if let Notification::PositionAdvanced(update) = notification {
                callback(update);
            }
        })
    }

    pub fn on_counts_changed<F>(&self, callback: F) -> ListenerHandle
    where
        F: Fn(&CountsChanged) + Send + Sync + 'static,
    {
        self.on_any(move |notification| {
            if let Notification::CountsChanged(counts) = notification {
                callback(counts);
            }
        })
    }

    pub fn on_session_finalized<F>(&self, callback: F) -> ListenerHandle
    where
        F: Fn(&FinalizedOf<S>) + Send + Sync + 'static,
    {
        self.on_any(move |notification| {
            if let Notification::SessionFinalized(event) = notification {
                callback(event);
            }
        })
    }

    pub fn on_session_stopped<F>(&self, callback: F) -> ListenerHandle
    where
        F: Fn(&SessionEnded) + Send + Sync + 'static,
    {
        self.on_any(move |notification| {
            if let Notification::SessionStopped(event) = notification {
                callback(event);
            }
        })
    }

    pub fn on_connection_changed<F>(&self, callback: F) -> ListenerHandle
    where
        F: Fn(&ConnectionChanged) + Send + Sync + 'static,
    {
        self.on_any(move |notification| {
            if let Notification::ConnectionChanged(change) = notification {
                callback(change);
            }
        })
    }

    /// Deliver a notification to every registered callback.
    ///
    /// Callbacks run outside the registry lock and may drop their own handles.
    pub fn emit(&self, notification: &Notification<S>) {
        let callbacks: Vec<Callback<S>> = self
            .registry
            .callbacks
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        for callback in callbacks {
            callback(notification);
        }
    }

    /// Number of registered callbacks.
    pub fn len(&self) -> usize {
        self.registry.callbacks.len()
    }

    /// Whether no callback is registered.
    pub fn is_empty(&self) -> bool {
        self.registry.callbacks.is_empty()
    }
}
