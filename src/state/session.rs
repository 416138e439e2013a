use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dto::session::{SessionSnapshot, SnapshotOf},
    state::{
        channel::ConnectionCounts,
        scores::{PositionUnit, ScoreBook, ScoreEntry},
        sport::Sport,
        state_machine::{
            AbortError, ApplyError, LifecycleEvent, Plan, PlanError, PlanId, SessionLifecycle,
            SessionStatus,
        },
    },
};

/// Opaque identifier of a live session, allocated on start.
pub type SessionId = Uuid;

/// Tenant-scoped identity of the match or game a session scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub struct SubjectKey {
    pub account_id: Uuid,
    pub subject_id: Uuid,
}

/// Rejections raised by the session store and its state machine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// No session with this identifier ever existed, or its record was already cleaned up.
    #[error("live session `{0}` not found")]
    NotFound(SessionId),
    /// No session is active for the subject.
    #[error("no live session for subject `{}`", .0.subject_id)]
    NoActiveSession(SubjectKey),
    /// The session already reached a terminal status.
    #[error("live session `{session_id}` already ended ({status:?})")]
    Terminal {
        session_id: SessionId,
        status: SessionStatus,
    },
    /// Another terminal transition is in flight.
    #[error("a lifecycle transition is already pending for session `{0}`")]
    TransitionPending(SessionId),
    /// Applying a planned transition failed.
    #[error(transparent)]
    Apply(#[from] ApplyError),
    /// Aborting a planned transition failed.
    #[error(transparent)]
    Abort(#[from] AbortError),
}

/// A score as requested by a scorer, before the store stamps it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreSubmission<P> {
    pub position: PositionUnit,
    pub participant: P,
    pub value: i32,
}

/// Outcome of an accepted score submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedScore<P> {
    /// Stored entry, including attribution.
    pub entry: ScoreEntry<P>,
    /// Session version produced by this mutation.
    pub version: u64,
}

/// Outcome of an accepted position change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PositionChange {
    pub previous: PositionUnit,
    pub position: PositionUnit,
    pub actor: String,
    pub version: u64,
}

/// Authoritative mutable record of one live session.
///
/// Totals are never stored: [`Session::aggregates`] derives them from the score entries on
/// every call so they cannot drift.
pub struct Session<S: Sport> {
    id: SessionId,
    key: SubjectKey,
    lifecycle: SessionLifecycle,
    current_position: PositionUnit,
    entries: ScoreBook<S::Participant>,
    started_by: String,
    started_at: OffsetDateTime,
}

impl<S: Sport> Session<S> {
    /// Start a new active session at `starting_position`.
    pub fn start(key: SubjectKey, starting_position: PositionUnit, started_by: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            key,
            lifecycle: SessionLifecycle::started(),
            current_position: starting_position,
            entries: ScoreBook::new(),
            started_by,
            started_at: OffsetDateTime::now_utc(),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn status(&self) -> SessionStatus {
        self.lifecycle.status()
    }

    pub fn version(&self) -> u64 {
        self.lifecycle.version()
    }

    pub fn current_position(&self) -> PositionUnit {
        self.current_position
    }

    pub fn started_by(&self) -> &str {
        &self.started_by
    }

    pub fn entries(&self) -> &ScoreBook<S::Participant> {
        &self.entries
    }

    /// Totals recomputed from the current entries.
    pub fn aggregates(&self) -> S::Aggregates {
        S::aggregate(&self.entries)
    }

    /// Upsert a score by `(position, participant)`; the last arrival wins.
    pub fn submit_score(
        &mut self,
        submission: ScoreSubmission<S::Participant>,
        submitter: &str,
    ) -> Result<RecordedScore<S::Participant>, SessionError> {
        let version = self
            .lifecycle
            .record(LifecycleEvent::SubmitScore)
            .map_err(|err| self.rejection(err))?;

        let entry = ScoreEntry::now(
            submission.position,
            submission.participant,
            submission.value,
            submitter.to_owned(),
        );
        self.entries.upsert(entry.clone());
        Ok(RecordedScore { entry, version })
    }

    /// Move the current position, forwards or backwards.
    pub fn advance_position(
        &mut self,
        position: PositionUnit,
        actor: &str,
    ) -> Result<PositionChange, SessionError> {
        let version = self
            .lifecycle
            .record(LifecycleEvent::AdvancePosition)
            .map_err(|err| self.rejection(err))?;

        let previous = std::mem::replace(&mut self.current_position, position);
        Ok(PositionChange {
            previous,
            position,
            actor: actor.to_owned(),
            version,
        })
    }

    /// Plan the finalize transition; scores stay mutable-locked until applied or aborted.
    pub fn plan_finalize(&mut self) -> Result<Plan, SessionError> {
        self.lifecycle
            .plan(LifecycleEvent::Finalize)
            .map_err(|err| self.rejection(err))
    }

    /// Apply a previously planned transition, returning the new version.
    pub fn apply_plan(&mut self, plan_id: PlanId) -> Result<u64, SessionError> {
        self.lifecycle.apply(plan_id)?;
        Ok(self.lifecycle.version())
    }

    /// Abort a previously planned transition.
    pub fn abort_plan(&mut self, plan_id: PlanId) -> Result<(), SessionError> {
        self.lifecycle.abort(plan_id)?;
        Ok(())
    }

    /// Discard the session, returning the new version.
    pub fn stop(&mut self) -> Result<u64, SessionError> {
        self.lifecycle
            .record(LifecycleEvent::Stop)
            .map_err(|err| self.rejection(err))
    }

    /// Full-state view of the session.
    pub fn snapshot(&self, counts: ConnectionCounts) -> SnapshotOf<S> {
        SessionSnapshot {
            session_id: self.id,
            account_id: self.key.account_id,
            subject_id: self.key.subject_id,
            sport: S::KIND,
            status: self.status(),
            current_position: self.current_position,
            entries: self.entries.to_vec(),
            aggregates: self.aggregates(),
            viewer_count: counts.viewers,
            scorer_count: counts.scorers,
            count_seq: counts.seq,
            version: self.version(),
            started_by: self.started_by.clone(),
            started_at: self.started_at,
        }
    }

    fn rejection(&self, err: PlanError) -> SessionError {
        match err {
            PlanError::AlreadyPending => SessionError::TransitionPending(self.id),
            PlanError::InvalidTransition(invalid) => SessionError::Terminal {
                session_id: self.id,
                status: invalid.from,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::sport::{Baseball, TeamSide};

    fn key() -> SubjectKey {
        SubjectKey {
            account_id: Uuid::new_v4(),
            subject_id: Uuid::new_v4(),
        }
    }

    fn submission(position: u32, side: TeamSide, value: i32) -> ScoreSubmission<TeamSide> {
        ScoreSubmission {
            position,
            participant: side,
            value,
        }
    }

    #[test]
    fn last_write_wins_with_attribution() {
        let mut session = Session::<Baseball>::start(key(), 1, "alice".into());
        session
            .submit_score(submission(1, TeamSide::Home, 2), "alice")
            .unwrap();
        let recorded = session
            .submit_score(submission(1, TeamSide::Home, 3), "bob")
            .unwrap();

        assert_eq!(recorded.version, 3);
        assert_eq!(session.entries().len(), 1);
        let entry = session.entries().get(1, &TeamSide::Home).unwrap();
        assert_eq!(entry.value, 3);
        assert_eq!(entry.submitted_by, "bob");
        assert_eq!(session.aggregates().home_total, 3);
    }

    #[test]
    fn position_can_move_backwards_while_active() {
        let mut session = Session::<Baseball>::start(key(), 5, "alice".into());
        let change = session.advance_position(3, "bob").unwrap();
        assert_eq!(change.previous, 5);
        assert_eq!(change.position, 3);
        assert_eq!(session.current_position(), 3);
    }

    #[test]
    fn stopped_session_rejects_mutations_without_changes() {
        let mut session = Session::<Baseball>::start(key(), 1, "alice".into());
        session
            .submit_score(submission(1, TeamSide::Visitor, 1), "alice")
            .unwrap();
        session.stop().unwrap();
        let before = session.snapshot(ConnectionCounts::default());

        let err = session
            .submit_score(submission(1, TeamSide::Visitor, 9), "bob")
            .unwrap_err();
        assert_eq!(
            err,
            SessionError::Terminal {
                session_id: session.id(),
                status: SessionStatus::Stopped
            }
        );
        assert!(session.advance_position(2, "bob").is_err());

        let after = session.snapshot(ConnectionCounts::default());
        assert_eq!(before.entries, after.entries);
        assert_eq!(before.aggregates, after.aggregates);
        assert_eq!(before.current_position, after.current_position);
        assert_eq!(before.version, after.version);
    }

    #[test]
    fn pending_finalize_rejects_submissions() {
        let mut session = Session::<Baseball>::start(key(), 1, "alice".into());
        let plan = session.plan_finalize().unwrap();
        assert_eq!(
            session.submit_score(submission(1, TeamSide::Home, 1), "alice"),
            Err(SessionError::TransitionPending(session.id()))
        );
        session.abort_plan(plan.id).unwrap();
        assert!(
            session
                .submit_score(submission(1, TeamSide::Home, 1), "alice")
                .is_ok()
        );
    }

    #[test]
    fn snapshot_carries_counts_and_totals() {
        let mut session = Session::<Baseball>::start(key(), 1, "alice".into());
        session
            .submit_score(submission(1, TeamSide::Home, 4), "alice")
            .unwrap();
        let snapshot = session.snapshot(ConnectionCounts {
            viewers: 3,
            scorers: 1,
            seq: 4,
        });
        assert_eq!(snapshot.viewer_count, 3);
        assert_eq!(snapshot.scorer_count, 1);
        assert_eq!(snapshot.aggregates.home_total, 4);
        assert_eq!(snapshot.version, 2);
        assert_eq!(snapshot.status, SessionStatus::Active);
    }
}
