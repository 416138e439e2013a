use std::{future::Future, sync::Arc, time::Duration};

use dashmap::{DashMap, mapref::entry::Entry};
use tokio::{
    sync::{Mutex, broadcast},
    time::Instant,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dto::{
        session::{ActiveSessionSummary, SnapshotOf},
        sse::{
            PositionUpdate, ScoreUpdate, ServerEvent, SessionEnded, SessionFinalizedEvent,
            SessionStartedEvent,
        },
    },
    services::sse_events::{
        broadcast_count, broadcast_position_advanced, broadcast_score_update,
        broadcast_session_finalized, broadcast_session_stopped, session_started_event,
    },
    state::{
        channel::{ConnectionId, ConnectionRole, SessionChannel, Subscription},
        scores::PositionUnit,
        session::{ScoreSubmission, Session, SessionError, SessionId, SubjectKey},
        sport::Sport,
        state_machine::SessionStatus,
    },
};

const START_NOTICE_CAPACITY: usize = 64;

/// Final state handed to the persistence step of a finalize.
pub type FinalizedOf<S> =
    SessionFinalizedEvent<<S as Sport>::Participant, <S as Sport>::Aggregates>;

/// One active session together with its fan-out channel.
pub struct LiveSession<S: Sport> {
    id: SessionId,
    key: SubjectKey,
    state: Mutex<Session<S>>,
    channel: SessionChannel,
}

impl<S: Sport> LiveSession<S> {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn channel(&self) -> &SessionChannel {
        &self.channel
    }

    /// Full state as seen right now.
    pub async fn snapshot(&self) -> SnapshotOf<S> {
        let session = self.state.lock().await;
        session.snapshot(self.channel.counts())
    }

    async fn summary(&self) -> ActiveSessionSummary {
        let session = self.state.lock().await;
        let counts = self.channel.counts();
        ActiveSessionSummary {
            session_id: self.id,
            subject_id: self.key.subject_id,
            sport: S::KIND,
            status: session.status(),
            current_position: session.current_position(),
            viewer_count: counts.viewers,
            scorer_count: counts.scorers,
            version: session.version(),
            started_by: session.started_by().to_string(),
        }
    }

    /// Remove a connection from the fan-out set and broadcast the new count.
    ///
    /// Returns `false` when the connection was already gone.
    pub async fn leave(&self, connection: ConnectionId) -> bool {
        let session = self.state.lock().await;
        let Some(record) = self.channel.unsubscribe(connection) else {
            return false;
        };
        if !self.channel.is_closed() {
            broadcast_count(
                &self.channel,
                self.id,
                record.role,
                self.channel.counts(),
                session.version(),
            );
        }
        true
    }
}

/// Outcome of a subscription: the connection handle and the state it starts from.
pub struct Admission<S: Sport> {
    pub session: Arc<LiveSession<S>>,
    pub subscription: Subscription,
    /// State at the version right before the first event the receiver will yield.
    pub snapshot: SnapshotOf<S>,
}

/// Outcome of a start command.
pub struct Started<S: Sport> {
    pub snapshot: SnapshotOf<S>,
    /// `false` when an active session already existed.
    pub created: bool,
}

impl<S: Sport> std::fmt::Debug for Started<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Started")
            .field("snapshot", &self.snapshot)
            .field("created", &self.created)
            .finish()
    }
}

/// Notification that a session started, for connections waiting on its subject.
#[derive(Debug, Clone)]
pub struct StartNotice {
    pub key: SubjectKey,
    pub event: ServerEvent,
}

#[derive(Debug, Clone, Copy)]
struct Tombstone {
    key: SubjectKey,
    status: SessionStatus,
    ended_at: Instant,
}

/// Authoritative registry of one sport's live sessions.
///
/// At most one session is active per subject. Ended sessions leave a tombstone so late
/// commands are told the session ended instead of that it never existed.
pub struct SessionStore<S: Sport> {
    active: DashMap<SubjectKey, Arc<LiveSession<S>>>,
    ids: DashMap<SessionId, SubjectKey>,
    ended: DashMap<SessionId, Tombstone>,
    ended_subjects: DashMap<SubjectKey, SessionId>,
    starts: broadcast::Sender<StartNotice>,
    channel_capacity: usize,
}

impl<S: Sport> SessionStore<S> {
    /// Create an empty registry whose channels buffer `channel_capacity` events.
    pub fn new(channel_capacity: usize) -> Self {
        let (starts, _receiver) = broadcast::channel(START_NOTICE_CAPACITY);
        Self {
            active: DashMap::new(),
            ids: DashMap::new(),
            ended: DashMap::new(),
            ended_subjects: DashMap::new(),
            starts,
            channel_capacity,
        }
    }

    /// Start a session for `key`, or return the one already active.
    pub async fn start(
        &self,
        key: SubjectKey,
        starting_position: PositionUnit,
        actor: &str,
    ) -> Result<Started<S>, SessionError> {
        self.ensure_not_ended(key)?;

        let (live, created) = match self.active.entry(key) {
            Entry::Occupied(entry) => (entry.get().clone(), false),
            Entry::Vacant(entry) => {
                let session = Session::<S>::start(key, starting_position, actor.to_string());
                let live = Arc::new(LiveSession {
                    id: session.id(),
                    key,
                    state: Mutex::new(session),
                    channel: SessionChannel::new(self.channel_capacity),
                });
                self.ids.insert(live.id, key);
                entry.insert(live.clone());
                (live, true)
            }
        };

        let session = live.state.lock().await;
        if session.status().is_terminal() {
            return Err(SessionError::Terminal {
                session_id: live.id,
                status: session.status(),
            });
        }
        let snapshot = session.snapshot(live.channel.counts());

        if created {
            info!(
                session_id = %live.id,
                subject_id = %key.subject_id,
                sport = ?S::KIND,
                actor,
                "live session started"
            );
            let payload = SessionStartedEvent {
                session_id: live.id,
                subject_id: key.subject_id,
                current_position: snapshot.current_position,
                started_by: actor.to_string(),
                version: snapshot.version,
            };
            if let Some(event) = session_started_event(&payload) {
                let _ = self.starts.send(StartNotice { key, event });
            }
        }
        drop(session);

        Ok(Started { snapshot, created })
    }

    /// Find the session a command for `key` applies to.
    ///
    /// With a `target`, the session must belong to `key`; without one, the subject's active
    /// session is used.
    pub fn resolve(
        &self,
        key: SubjectKey,
        target: Option<SessionId>,
    ) -> Result<SessionId, SessionError> {
        match target {
            Some(id) => {
                let owner = self
                    .ids
                    .get(&id)
                    .map(|entry| *entry.value())
                    .or_else(|| self.ended.get(&id).map(|tombstone| tombstone.key));
                if owner != Some(key) {
                    return Err(SessionError::NotFound(id));
                }
                self.live(id).map(|live| live.id)
            }
            None => {
                if let Some(live) = self.active.get(&key) {
                    return Ok(live.id);
                }
                self.ensure_not_ended(key)?;
                Err(SessionError::NoActiveSession(key))
            }
        }
    }

    /// Look up an active session by id.
    pub fn live(&self, id: SessionId) -> Result<Arc<LiveSession<S>>, SessionError> {
        let live = self
            .ids
            .get(&id)
            .map(|entry| *entry.value())
            .and_then(|key| self.active.get(&key).map(|entry| entry.value().clone()))
            .filter(|live| live.id == id);

        live.ok_or_else(|| self.missing(id))
    }

    /// Current state of the subject's active session.
    pub async fn current_state(&self, key: SubjectKey) -> Result<SnapshotOf<S>, SessionError> {
        let id = self.resolve(key, None)?;
        let live = self.live(id)?;
        Ok(live.snapshot().await)
    }

    /// Upsert a score and broadcast it to every subscriber, the submitter included.
    pub async fn submit_score(
        &self,
        id: SessionId,
        submission: ScoreSubmission<S::Participant>,
        submitter: &str,
    ) -> Result<ScoreUpdate<S::Participant>, SessionError> {
        let live = self.live(id)?;
        let mut session = live.state.lock().await;
        let recorded = session.submit_score(submission, submitter)?;

        let update = ScoreUpdate {
            session_id: id,
            version: recorded.version,
            entry: recorded.entry,
        };
        broadcast_score_update(&live.channel, &update);
        debug!(
            session_id = %id,
            position = update.entry.position,
            version = update.version,
            submitter,
            "score recorded"
        );
        Ok(update)
    }

    /// Move the current position and broadcast the change.
    pub async fn advance_position(
        &self,
        id: SessionId,
        position: PositionUnit,
        actor: &str,
    ) -> Result<PositionUpdate, SessionError> {
        let live = self.live(id)?;
        let mut session = live.state.lock().await;
        let change = session.advance_position(position, actor)?;

        let update = PositionUpdate {
            session_id: id,
            version: change.version,
            previous: change.previous,
            position: change.position,
            actor: change.actor,
        };
        broadcast_position_advanced(&live.channel, &update);
        debug!(session_id = %id, position, version = update.version, "position advanced");
        Ok(update)
    }

    /// Finalize a session: plan, hand the final state to `persist`, then apply.
    ///
    /// Mutations are rejected while `persist` runs. When it fails the plan is aborted and the
    /// session stays active.
    pub async fn finalize<F, Fut, E>(
        &self,
        id: SessionId,
        actor: &str,
        persist: F,
    ) -> Result<FinalizedOf<S>, E>
    where
        F: FnOnce(SnapshotOf<S>) -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: From<SessionError>,
    {
        let live = self.live(id)?;
        let (plan_id, pending) = {
            let mut session = live.state.lock().await;
            let plan = session.plan_finalize()?;
            let mut snapshot = session.snapshot(live.channel.counts());
            snapshot.status = plan.to;
            snapshot.version = plan.version_next;
            (plan.id, snapshot)
        };

        let outcome = persist(pending.clone()).await;

        let mut session = live.state.lock().await;
        if let Err(err) = outcome {
            if let Err(abort_err) = session.abort_plan(plan_id) {
                warn!(
                    session_id = %id,
                    plan_id = %plan_id,
                    error = %abort_err,
                    "failed to abort finalize after persistence error"
                );
            }
            return Err(err);
        }
        session.apply_plan(plan_id)?;

        let payload = SessionFinalizedEvent {
            snapshot: pending,
            finalized_by: actor.to_string(),
        };
        broadcast_session_finalized(&live.channel, &payload);
        self.retire(&live, SessionStatus::Finalized);
        drop(session);

        info!(session_id = %id, actor, "live session finalized");
        Ok(payload)
    }

    /// Discard a session without persisting anything.
    pub async fn stop(&self, id: SessionId, actor: &str) -> Result<SessionEnded, SessionError> {
        let live = self.live(id)?;
        let mut session = live.state.lock().await;
        let version = session.stop()?;

        let payload = SessionEnded {
            session_id: id,
            status: SessionStatus::Stopped,
            version,
            ended_by: actor.to_string(),
        };
        broadcast_session_stopped(&live.channel, &payload);
        self.retire(&live, SessionStatus::Stopped);
        drop(session);

        info!(session_id = %id, actor, "live session stopped");
        Ok(payload)
    }

    /// Admit a connection to the subject's active session.
    ///
    /// The snapshot and the subscription are taken under the session lock, so the receiver
    /// yields exactly the events published after the snapshot.
    pub async fn subscribe(&self, key: SubjectKey, role: ConnectionRole) -> Option<Admission<S>> {
        let live = self.active.get(&key).map(|entry| entry.value().clone())?;
        let session = live.state.lock().await;
        if session.status().is_terminal() || live.channel.is_closed() {
            return None;
        }

        let subscription = live.channel.subscribe(role);
        let counts = live.channel.counts();
        let snapshot = session.snapshot(counts);
        broadcast_count(&live.channel, live.id, role, counts, session.version());
        drop(session);

        Some(Admission {
            session: live,
            subscription,
            snapshot,
        })
    }

    /// Server-side removal of one connection; its stream is closed.
    pub async fn disconnect(
        &self,
        id: SessionId,
        connection: ConnectionId,
    ) -> Result<bool, SessionError> {
        let live = self.live(id)?;
        let session = live.state.lock().await;
        let Some(record) = live.channel.disconnect(connection) else {
            return Ok(false);
        };
        broadcast_count(
            &live.channel,
            id,
            record.role,
            live.channel.counts(),
            session.version(),
        );
        Ok(true)
    }

    /// Receive a notice every time a session starts.
    pub fn watch_starts(&self) -> broadcast::Receiver<StartNotice> {
        self.starts.subscribe()
    }

    /// Summaries of the active sessions of one account, ordered by subject.
    pub async fn active_sessions(&self, account_id: Uuid) -> Vec<ActiveSessionSummary> {
        let sessions: Vec<_> = self
            .active
            .iter()
            .filter(|entry| entry.key().account_id == account_id)
            .map(|entry| entry.value().clone())
            .collect();

        let mut summaries = Vec::with_capacity(sessions.len());
        for live in sessions {
            summaries.push(live.summary().await);
        }
        summaries.sort_by_key(|summary| summary.subject_id);
        summaries
    }

    /// Drop tombstones older than `retention`, returning how many were removed.
    pub fn prune_ended(&self, retention: Duration) -> usize {
        let now = Instant::now();
        let expired: Vec<(SessionId, SubjectKey)> = self
            .ended
            .iter()
            .filter(|entry| now.duration_since(entry.ended_at) >= retention)
            .map(|entry| (*entry.key(), entry.key))
            .collect();

        for (id, key) in &expired {
            self.ended.remove(id);
            self.ended_subjects.remove_if(key, |_, current| current == id);
        }
        expired.len()
    }

    /// Number of active sessions.
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    fn ensure_not_ended(&self, key: SubjectKey) -> Result<(), SessionError> {
        let Some(id) = self.ended_subjects.get(&key).map(|entry| *entry.value()) else {
            return Ok(());
        };
        match self.ended.get(&id) {
            Some(tombstone) => Err(SessionError::Terminal {
                session_id: id,
                status: tombstone.status,
            }),
            None => Ok(()),
        }
    }

    fn missing(&self, id: SessionId) -> SessionError {
        match self.ended.get(&id) {
            Some(tombstone) => SessionError::Terminal {
                session_id: id,
                status: tombstone.status,
            },
            None => SessionError::NotFound(id),
        }
    }

    fn retire(&self, live: &LiveSession<S>, status: SessionStatus) {
        self.ended.insert(
            live.id,
            Tombstone {
                key: live.key,
                status,
                ended_at: Instant::now(),
            },
        );
        self.ended_subjects.insert(live.key, live.id);
        live.channel.close();
        self.active
            .remove_if(&live.key, |_, current| current.id == live.id);
        self.ids.remove(&live.id);
    }
}

#[cfg(test)]
mod tests {
    use thiserror::Error;
    use tokio::sync::broadcast::error::TryRecvError;

    use super::*;
    use crate::{
        dto::sse::{EVENT_SCORE_UPDATE, EVENT_SESSION_STOPPED, EVENT_VIEWER_COUNT},
        state::sport::{Baseball, TeamSide},
    };

    #[derive(Debug, Error)]
    enum PersistError {
        #[error("disk on fire")]
        Failed,
        #[error(transparent)]
        Session(#[from] SessionError),
    }

    fn key() -> SubjectKey {
        SubjectKey {
            account_id: Uuid::new_v4(),
            subject_id: Uuid::new_v4(),
        }
    }

    fn runs(position: u32, side: TeamSide, value: i32) -> ScoreSubmission<TeamSide> {
        ScoreSubmission {
            position,
            participant: side,
            value,
        }
    }

    async fn persist_ok(_snapshot: SnapshotOf<Baseball>) -> Result<(), PersistError> {
        Ok(())
    }

    #[tokio::test]
    async fn start_is_idempotent_and_keeps_scores() {
        let store = SessionStore::<Baseball>::new(16);
        let key = key();
        let first = store.start(key, 1, "alice").await.unwrap();
        assert!(first.created);
        let id = first.snapshot.session_id;
        store
            .submit_score(id, runs(1, TeamSide::Home, 2), "alice")
            .await
            .unwrap();

        let second = store.start(key, 4, "bob").await.unwrap();
        assert!(!second.created);
        assert_eq!(second.snapshot.session_id, id);
        assert_eq!(second.snapshot.current_position, 1);
        assert_eq!(second.snapshot.entries.len(), 1);
        assert_eq!(store.active_count(), 1);
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let store = SessionStore::<Baseball>::new(16);
        let id = Uuid::new_v4();
        assert!(matches!(
            store.submit_score(id, runs(1, TeamSide::Home, 1), "a").await,
            Err(SessionError::NotFound(missing)) if missing == id
        ));
        assert!(matches!(
            store.resolve(key(), None),
            Err(SessionError::NoActiveSession(_))
        ));
    }

    #[tokio::test]
    async fn finalize_then_stop_is_terminal() {
        let store = SessionStore::<Baseball>::new(16);
        let key = key();
        let id = store.start(key, 1, "alice").await.unwrap().snapshot.session_id;
        store
            .submit_score(id, runs(1, TeamSide::Visitor, 3), "alice")
            .await
            .unwrap();

        let finalized = store.finalize(id, "alice", persist_ok).await.unwrap();
        assert_eq!(finalized.snapshot.status, SessionStatus::Finalized);
        assert_eq!(finalized.snapshot.aggregates.visitor_total, 3);
        assert_eq!(finalized.snapshot.version, 3);

        let terminal = SessionError::Terminal {
            session_id: id,
            status: SessionStatus::Finalized,
        };
        assert_eq!(store.stop(id, "alice").await.unwrap_err(), terminal);
        assert_eq!(
            store
                .submit_score(id, runs(2, TeamSide::Home, 1), "bob")
                .await
                .unwrap_err(),
            terminal
        );
        assert_eq!(
            store.advance_position(id, 2, "bob").await.unwrap_err(),
            terminal
        );
        assert_eq!(store.start(key, 1, "bob").await.err(), Some(terminal.clone()));
        assert_eq!(store.resolve(key, Some(id)).unwrap_err(), terminal);
        assert_eq!(store.active_count(), 0);
    }

    #[tokio::test]
    async fn failed_persistence_keeps_session_active() {
        let store = SessionStore::<Baseball>::new(16);
        let id = store.start(key(), 1, "alice").await.unwrap().snapshot.session_id;

        let result = store
            .finalize(id, "alice", |_snapshot| async { Err(PersistError::Failed) })
            .await;
        assert!(matches!(result, Err(PersistError::Failed)));

        let update = store
            .submit_score(id, runs(1, TeamSide::Home, 1), "alice")
            .await
            .unwrap();
        assert_eq!(update.version, 2);
        assert!(store.finalize(id, "alice", persist_ok).await.is_ok());
    }

    #[tokio::test]
    async fn subscriber_gets_snapshot_then_later_events() {
        let store = SessionStore::<Baseball>::new(16);
        let key = key();
        let id = store.start(key, 1, "alice").await.unwrap().snapshot.session_id;
        store
            .submit_score(id, runs(1, TeamSide::Home, 2), "alice")
            .await
            .unwrap();

        let mut admission = store.subscribe(key, ConnectionRole::Watcher).await.unwrap();
        assert_eq!(admission.snapshot.version, 2);
        assert_eq!(admission.snapshot.viewer_count, 1);
        assert_eq!(admission.snapshot.aggregates.home_total, 2);

        let count = admission.subscription.receiver.recv().await.unwrap();
        assert_eq!(count.event.as_deref(), Some(EVENT_VIEWER_COUNT));

        store
            .submit_score(id, runs(1, TeamSide::Visitor, 1), "bob")
            .await
            .unwrap();
        let update = admission.subscription.receiver.recv().await.unwrap();
        assert_eq!(update.event.as_deref(), Some(EVENT_SCORE_UPDATE));
        assert_eq!(update.id, Some(3));
        assert!(matches!(
            admission.subscription.receiver.try_recv(),
            Err(TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn stop_notifies_then_closes() {
        let store = SessionStore::<Baseball>::new(16);
        let key = key();
        let id = store.start(key, 1, "alice").await.unwrap().snapshot.session_id;
        let mut admission = store.subscribe(key, ConnectionRole::Scorer).await.unwrap();
        let _count = admission.subscription.receiver.recv().await.unwrap();

        store.stop(id, "alice").await.unwrap();
        let ended = admission.subscription.receiver.recv().await.unwrap();
        assert_eq!(ended.event.as_deref(), Some(EVENT_SESSION_STOPPED));
        assert!(admission.subscription.cancel.is_cancelled());
        assert!(store.subscribe(key, ConnectionRole::Watcher).await.is_none());
    }

    #[tokio::test]
    async fn leave_and_disconnect_update_counts() {
        let store = SessionStore::<Baseball>::new(16);
        let key = key();
        let id = store.start(key, 1, "alice").await.unwrap().snapshot.session_id;
        let first = store.subscribe(key, ConnectionRole::Watcher).await.unwrap();
        let second = store.subscribe(key, ConnectionRole::Watcher).await.unwrap();
        assert_eq!(second.snapshot.viewer_count, 2);

        assert!(first.session.leave(first.subscription.id).await);
        assert!(!first.session.leave(first.subscription.id).await);
        assert!(store.disconnect(id, second.subscription.id).await.unwrap());
        assert!(second.subscription.cancel.is_cancelled());

        let state = store.current_state(key).await.unwrap();
        assert_eq!(state.viewer_count, 0);
    }

    #[tokio::test]
    async fn target_must_belong_to_subject() {
        let store = SessionStore::<Baseball>::new(16);
        let mine = key();
        let id = store.start(key(), 1, "alice").await.unwrap().snapshot.session_id;
        assert_eq!(
            store.resolve(mine, Some(id)).unwrap_err(),
            SessionError::NotFound(id)
        );
    }

    #[tokio::test]
    async fn waiting_connections_hear_about_starts() {
        let store = SessionStore::<Baseball>::new(16);
        let mut starts = store.watch_starts();
        let key = key();
        store.start(key, 3, "alice").await.unwrap();
        store.start(key, 3, "alice").await.unwrap();

        let notice = starts.recv().await.unwrap();
        assert_eq!(notice.key, key);
        assert!(matches!(starts.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn active_sessions_are_scoped_by_account() {
        let store = SessionStore::<Baseball>::new(16);
        let account = Uuid::new_v4();
        for _ in 0..2 {
            let key = SubjectKey {
                account_id: account,
                subject_id: Uuid::new_v4(),
            };
            store.start(key, 1, "alice").await.unwrap();
        }
        store.start(key(), 1, "mallory").await.unwrap();

        let sessions = store.active_sessions(account).await;
        assert_eq!(sessions.len(), 2);
        assert!(sessions.iter().all(|s| s.status == SessionStatus::Active));
    }

    #[tokio::test(start_paused = true)]
    async fn tombstones_expire_after_retention() {
        let store = SessionStore::<Baseball>::new(16);
        let key = key();
        let id = store.start(key, 1, "alice").await.unwrap().snapshot.session_id;
        store.stop(id, "alice").await.unwrap();

        let retention = Duration::from_secs(600);
        assert_eq!(store.prune_ended(retention), 0);
        tokio::time::advance(retention).await;
        assert_eq!(store.prune_ended(retention), 1);

        assert_eq!(
            store.submit_score(id, runs(1, TeamSide::Home, 1), "a").await.unwrap_err(),
            SessionError::NotFound(id)
        );
        let restarted = store.start(key, 1, "alice").await.unwrap();
        assert!(restarted.created);
        assert_ne!(restarted.snapshot.session_id, id);
    }
}
