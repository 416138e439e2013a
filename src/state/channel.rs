use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::dto::sse::ServerEvent;

/// Identifier of one subscribed push connection.
pub type ConnectionId = Uuid;

/// Role a connection was admitted with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionRole {
    /// May mutate the session.
    Scorer,
    /// Read-only observer.
    Watcher,
}

/// Live connection counts of a session channel, by role.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ConnectionCounts {
    pub viewers: u32,
    pub scorers: u32,
    /// Membership revision the counts were read at.
    pub seq: u64,
}

impl ConnectionCounts {
    /// Count for one role.
    pub fn for_role(&self, role: ConnectionRole) -> u32 {
        match role {
            ConnectionRole::Scorer => self.scorers,
            ConnectionRole::Watcher => self.viewers,
        }
    }
}

/// Bookkeeping kept for each admitted connection.
#[derive(Debug, Clone)]
pub struct ConnectionRecord {
    pub role: ConnectionRole,
    pub connected_at: OffsetDateTime,
    cancel: CancellationToken,
}

/// Handle returned to a freshly admitted connection.
#[derive(Debug)]
pub struct Subscription {
    pub id: ConnectionId,
    pub role: ConnectionRole,
    /// Events published after the admission.
    pub receiver: broadcast::Receiver<ServerEvent>,
    /// Cancelled when the server disconnects this connection or closes the channel.
    pub cancel: CancellationToken,
}

/// Fan-out channel of one live session.
///
/// Counts are derived from the connection records, so they always match the fan-out set.
/// Every join and leave bumps a membership revision that orders count reports.
pub struct SessionChannel {
    sender: broadcast::Sender<ServerEvent>,
    connections: DashMap<ConnectionId, ConnectionRecord>,
    membership: AtomicU64,
    closed: CancellationToken,
}

impl SessionChannel {
    /// Create a channel whose subscribers may lag at most `capacity` events behind.
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            connections: DashMap::new(),
            membership: AtomicU64::new(0),
            closed: CancellationToken::new(),
        }
    }

    /// Admit a connection into the fan-out set.
    pub fn subscribe(&self, role: ConnectionRole) -> Subscription {
        let id = Uuid::new_v4();
        let cancel = self.closed.child_token();
        self.connections.insert(
            id,
            ConnectionRecord {
                role,
                connected_at: OffsetDateTime::now_utc(),
                cancel: cancel.clone(),
            },
        );
        self.membership.fetch_add(1, Ordering::AcqRel);
        Subscription {
            id,
            role,
            receiver: self.sender.subscribe(),
            cancel,
        }
    }

    /// Forget a connection, returning its record when it was still registered.
    pub fn unsubscribe(&self, id: ConnectionId) -> Option<ConnectionRecord> {
        let (_, record) = self.connections.remove(&id)?;
        self.membership.fetch_add(1, Ordering::AcqRel);
        Some(record)
    }

    /// Remove a connection and close its stream.
    pub fn disconnect(&self, id: ConnectionId) -> Option<ConnectionRecord> {
        let record = self.unsubscribe(id)?;
        record.cancel.cancel();
        Some(record)
    }

    /// Send an event to every subscriber, ignoring delivery errors.
    pub fn publish(&self, event: ServerEvent) {
        let _ = self.sender.send(event);
    }

    /// Current counts by role.
    pub fn counts(&self) -> ConnectionCounts {
        let mut counts = ConnectionCounts {
            seq: self.membership.load(Ordering::Acquire),
            ..ConnectionCounts::default()
        };
        for record in self.connections.iter() {
            match record.role {
                ConnectionRole::Scorer => counts.scorers += 1,
                ConnectionRole::Watcher => counts.viewers += 1,
            }
        }
        counts
    }

    /// Close every connection. Events already published stay readable by the forwarders.
    pub fn close(&self) {
        self.closed.cancel();
        self.connections.clear();
        self.membership.fetch_add(1, Ordering::AcqRel);
    }

    /// Whether [`SessionChannel::close`] was called.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}
