//! Client-side replica of a live session, kept current from stream events.

use crate::{
    dto::{
        session::SnapshotOf,
        sse::{LiveEvent, LiveEventOf},
    },
    state::{scores::ScoreBook, sport::Sport, state_machine::SessionStatus},
};

/// What applying one event changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// Nothing: a duplicate, stale or unrelated event.
    Ignored,
    /// The whole state was replaced.
    Replaced,
    /// Scores or totals changed.
    Scores,
    /// The current position changed.
    Position,
    /// Connection counts changed.
    Counts,
    /// The session ended.
    Ended,
}

/// Replica of a session, updated with the same upsert rule and total recomputation as the
/// server.
#[derive(Debug, Clone)]
pub struct LocalSession<S: Sport> {
    snapshot: SnapshotOf<S>,
    book: ScoreBook<S::Participant>,
}

impl<S: Sport> LocalSession<S> {
    /// Seed the replica from a `state` snapshot.
    pub fn from_snapshot(snapshot: SnapshotOf<S>) -> Self {
        let book = ScoreBook::from_entries(snapshot.entries.iter().cloned());
        Self { snapshot, book }
    }

    /// Current view of the session.
    pub fn snapshot(&self) -> &SnapshotOf<S> {
        &self.snapshot
    }

    /// Fold one stream event into the replica.
    ///
    /// Versioned events at or below the local version were already applied and are skipped.
    /// Count events are ordered by their membership revision instead.
    pub fn apply(&mut self, event: &LiveEventOf<S>) -> Applied {
        match event {
            LiveEvent::State(snapshot) => {
                if snapshot.session_id == self.snapshot.session_id
                    && snapshot.version < self.snapshot.version
                {
                    return Applied::Ignored;
                }
                *self = Self::from_snapshot(snapshot.clone());
                Applied::Replaced
            }
            LiveEvent::ScoreUpdate(update) => {
                if !self.accepts(update.session_id, update.version) {
                    return Applied::Ignored;
                }
                self.book.upsert(update.entry.clone());
                self.snapshot.entries = self.book.to_vec();
                self.snapshot.aggregates = S::aggregate(&self.book);
                self.snapshot.version = update.version;
                Applied::Scores
            }
            LiveEvent::PositionAdvanced(update) => {
                if !self.accepts(update.session_id, update.version) {
                    return Applied::Ignored;
                }
                self.snapshot.current_position = update.position;
                self.snapshot.version = update.version;
                Applied::Position
            }
            LiveEvent::ViewerCount(count) | LiveEvent::ScorerCount(count) => {
                if count.session_id != self.snapshot.session_id
                    || count.seq <= self.snapshot.count_seq
                {
                    return Applied::Ignored;
                }
                if matches!(event, LiveEvent::ViewerCount(_)) {
                    self.snapshot.viewer_count = count.count;
                } else {
                    self.snapshot.scorer_count = count.count;
                }
                self.snapshot.count_seq = count.seq;
                Applied::Counts
            }
            LiveEvent::SessionFinalized(finalized) => {
                if finalized.snapshot.session_id != self.snapshot.session_id {
                    return Applied::Ignored;
                }
                *self = Self::from_snapshot(finalized.snapshot.clone());
                Applied::Ended
            }
            LiveEvent::SessionStopped(ended) => {
                if ended.session_id != self.snapshot.session_id {
                    return Applied::Ignored;
                }
                self.snapshot.status = ended.status;
                self.snapshot.version = self.snapshot.version.max(ended.version);
                Applied::Ended
            }
            LiveEvent::Connected(_)
            | LiveEvent::SessionStarted(_)
            | LiveEvent::Ping(_)
            | LiveEvent::NoSession(_) => Applied::Ignored,
        }
    }

    /// Whether the session ended.
    pub fn is_ended(&self) -> bool {
        self.snapshot.status != SessionStatus::Active
    }

    fn accepts(&self, session_id: uuid::Uuid, version: u64) -> bool {
        session_id == self.snapshot.session_id
            && version > self.snapshot.version
            && !self.is_ended()
    }
}

#[cfg(test)]
mod tests {
    use time::OffsetDateTime;
    use uuid::Uuid;

    use super::*;
    use crate::{
        dto::{
            session::SessionSnapshot,
            sse::{CountEvent, ScoreUpdate, SessionEnded},
        },
        state::{
            scores::ScoreEntry,
            sport::{Baseball, BaseballTotals, TeamSide},
            state_machine::SessionStatus,
        },
    };

    fn empty_snapshot() -> SnapshotOf<Baseball> {
        SessionSnapshot {
            session_id: Uuid::new_v4(),
            account_id: Uuid::new_v4(),
            subject_id: Uuid::new_v4(),
            sport: crate::state::sport::SportKind::Baseball,
            status: SessionStatus::Active,
            current_position: 1,
            entries: Vec::new(),
            aggregates: BaseballTotals::default(),
            viewer_count: 1,
            scorer_count: 0,
            count_seq: 1,
            version: 1,
            started_by: "alice".into(),
            started_at: OffsetDateTime::now_utc(),
        }
    }

    fn score(
        session_id: Uuid,
        version: u64,
        side: TeamSide,
        value: i32,
    ) -> LiveEventOf<Baseball> {
        LiveEvent::ScoreUpdate(ScoreUpdate {
            session_id,
            version,
            entry: ScoreEntry::now(1, side, value, "alice".into()),
        })
    }

    #[test]
    fn scores_recompute_totals_and_skip_replays() {
        let snapshot = empty_snapshot();
        let id = snapshot.session_id;
        let mut local = LocalSession::<Baseball>::from_snapshot(snapshot);

        assert_eq!(local.apply(&score(id, 2, TeamSide::Home, 2)), Applied::Scores);
        assert_eq!(local.apply(&score(id, 3, TeamSide::Visitor, 1)), Applied::Scores);
        assert_eq!(local.apply(&score(id, 3, TeamSide::Visitor, 1)), Applied::Ignored);
        assert_eq!(local.apply(&score(id, 4, TeamSide::Home, 3)), Applied::Scores);

        let totals = &local.snapshot().aggregates;
        assert_eq!((totals.home_total, totals.visitor_total), (3, 1));
        assert_eq!(totals.leader, Some(TeamSide::Home));
        assert_eq!(local.snapshot().entries.len(), 2);
        assert_eq!(local.snapshot().version, 4);
    }

    #[test]
    fn counts_do_not_move_the_version() {
        let snapshot = empty_snapshot();
        let id = snapshot.session_id;
        let mut local = LocalSession::<Baseball>::from_snapshot(snapshot);

        let count = LiveEvent::ViewerCount(CountEvent {
            session_id: id,
            count: 4,
            version: 1,
            seq: 2,
        });
        assert_eq!(local.apply(&count), Applied::Counts);
        assert_eq!(local.snapshot().viewer_count, 4);
        assert_eq!(local.snapshot().version, 1);
        assert_eq!(local.snapshot().count_seq, 2);
    }

    #[test]
    fn counts_older_than_the_snapshot_are_ignored() {
        let mut snapshot = empty_snapshot();
        snapshot.viewer_count = 2;
        snapshot.count_seq = 5;
        let id = snapshot.session_id;
        let mut local = LocalSession::<Baseball>::from_snapshot(snapshot);

        // Reported before the snapshot was taken, delivered after it.
        let stale = LiveEvent::ViewerCount(CountEvent {
            session_id: id,
            count: 1,
            version: 1,
            seq: 4,
        });
        assert_eq!(local.apply(&stale), Applied::Ignored);
        let same = LiveEvent::ViewerCount(CountEvent {
            session_id: id,
            count: 2,
            version: 1,
            seq: 5,
        });
        assert_eq!(local.apply(&same), Applied::Ignored);
        assert_eq!(local.snapshot().viewer_count, 2);

        let newer = LiveEvent::ScorerCount(CountEvent {
            session_id: id,
            count: 1,
            version: 1,
            seq: 6,
        });
        assert_eq!(local.apply(&newer), Applied::Counts);
        assert_eq!(local.snapshot().scorer_count, 1);
        assert_eq!(local.snapshot().viewer_count, 2);
    }

    #[test]
    fn nothing_applies_after_the_session_ended() {
        let snapshot = empty_snapshot();
        let id = snapshot.session_id;
        let mut local = LocalSession::<Baseball>::from_snapshot(snapshot);

        let stopped = LiveEvent::SessionStopped(SessionEnded {
            session_id: id,
            status: SessionStatus::Stopped,
            version: 2,
            ended_by: "alice".into(),
        });
        assert_eq!(local.apply(&stopped), Applied::Ended);
        assert!(local.is_ended());
        assert_eq!(local.apply(&score(id, 3, TeamSide::Home, 1)), Applied::Ignored);
        assert!(local.snapshot().entries.is_empty());
    }

    #[test]
    fn events_of_other_sessions_are_ignored() {
        let mut local = LocalSession::<Baseball>::from_snapshot(empty_snapshot());
        assert_eq!(
            local.apply(&score(Uuid::new_v4(), 9, TeamSide::Home, 1)),
            Applied::Ignored
        );
    }
}
