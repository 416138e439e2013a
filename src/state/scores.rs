use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Sequential scoring subdivision: an inning number or a hole number.
pub type PositionUnit = u32;

/// A single recorded score, attributed to the scorer who entered it last.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreEntry<P> {
    /// Inning or hole the score belongs to.
    pub position: PositionUnit,
    /// Team side or golfer the score is attributed to.
    pub participant: P,
    /// Runs or strokes.
    pub value: i32,
    /// Identity of the scorer who submitted this value.
    pub submitted_by: String,
    /// When the store applied the submission.
    #[serde(with = "time::serde::rfc3339")]
    pub submitted_at: OffsetDateTime,
}

impl<P> ScoreEntry<P> {
    /// Build an entry stamped with the current time.
    pub fn now(position: PositionUnit, participant: P, value: i32, submitted_by: String) -> Self {
        Self {
            position,
            participant,
            value,
            submitted_by,
            submitted_at: OffsetDateTime::now_utc(),
        }
    }
}

/// Score entries keyed by `(position, participant)`, iterated in key order.
///
/// Writing a key that already exists replaces the previous entry in place, so the book never
/// holds two entries for the same key and the last write always wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreBook<P: Ord> {
    entries: BTreeMap<(PositionUnit, P), ScoreEntry<P>>,
}

impl<P: Ord> Default for ScoreBook<P> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<P: Ord + Clone> ScoreBook<P> {
    /// Create an empty book.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a book from a list of entries, later duplicates replacing earlier ones.
    pub fn from_entries(entries: impl IntoIterator<Item = ScoreEntry<P>>) -> Self {
        let mut book = Self::new();
        for entry in entries {
            book.upsert(entry);
        }
        book
    }

    /// Insert or replace the entry for its key, returning the replaced entry if any.
    pub fn upsert(&mut self, entry: ScoreEntry<P>) -> Option<ScoreEntry<P>> {
        let key = (entry.position, entry.participant.clone());
        self.entries.insert(key, entry)
    }

    /// Look up the entry for a key.
    pub fn get(&self, position: PositionUnit, participant: &P) -> Option<&ScoreEntry<P>> {
        self.entries.get(&(position, participant.clone()))
    }

    /// Iterate entries ordered by position, then participant.
    pub fn iter(&self) -> impl Iterator<Item = &ScoreEntry<P>> {
        self.entries.values()
    }

    /// Number of distinct keys recorded.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no score has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Clone the entries into a list ordered by key.
    pub fn to_vec(&self) -> Vec<ScoreEntry<P>> {
        self.entries.values().cloned().collect()
    }
}
