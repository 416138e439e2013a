//! Sport-specific parameters of the live scoring engine.
//!
//! The session protocol is the same for every sport; what differs is the participant a score
//! is attributed to and how totals are derived from the recorded entries.

use std::{fmt::Debug, hash::Hash};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::state::{
    AppState,
    scores::{PositionUnit, ScoreBook},
    store::SessionStore,
};

/// Sports supported by the live scoring engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SportKind {
    /// Baseball games scored inning by inning.
    Baseball,
    /// Golf matches scored hole by hole.
    Golf,
}

impl SportKind {
    /// Path segment under which the sport's subjects are addressed.
    pub fn route_segment(self) -> &'static str {
        match self {
            SportKind::Baseball => "baseball/games",
            SportKind::Golf => "golf/matches",
        }
    }
}

/// Parameters of one sport plugged into the generic session engine.
pub trait Sport: Send + Sync + Sized + 'static {
    /// Discriminant used in tickets, routes and persisted records.
    const KIND: SportKind;

    /// Entity a score is attributed to within a position unit.
    type Participant: Clone
        + Debug
        + Eq
        + Ord
        + Hash
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static;

    /// Totals derived from the score entries.
    type Aggregates: Clone
        + Debug
        + PartialEq
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static;

    /// Recompute the totals from scratch. Must be a pure function of `book`.
    fn aggregate(book: &ScoreBook<Self::Participant>) -> Self::Aggregates;

    /// Registry holding this sport's live sessions.
    fn sessions(state: &AppState) -> &SessionStore<Self>;
}

/// Baseball: runs per inning per team side.
#[derive(Debug, Clone, Copy, Default)]
pub struct Baseball;

/// Side of a baseball game a run is credited to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum TeamSide {
    /// Home team (bats in the bottom half).
    Home,
    /// Visiting team (bats in the top half).
    Visitor,
}

/// Running totals of a baseball game.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct BaseballTotals {
    pub home_total: i32,
    pub visitor_total: i32,
    /// Number of distinct innings with at least one recorded half.
    pub innings_recorded: u32,
    /// Side currently ahead, `None` when tied.
    pub leader: Option<TeamSide>,
}

impl Sport for Baseball {
    const KIND: SportKind = SportKind::Baseball;
    type Participant = TeamSide;
    type Aggregates = BaseballTotals;

    fn aggregate(book: &ScoreBook<TeamSide>) -> BaseballTotals {
        let mut totals = BaseballTotals::default();
        let mut last_inning: Option<PositionUnit> = None;

        for entry in book.iter() {
            match entry.participant {
                TeamSide::Home => totals.home_total += entry.value,
                TeamSide::Visitor => totals.visitor_total += entry.value,
            }
            if last_inning != Some(entry.position) {
                totals.innings_recorded += 1;
                last_inning = Some(entry.position);
            }
        }

        totals.leader = match totals.home_total.cmp(&totals.visitor_total) {
            std::cmp::Ordering::Greater => Some(TeamSide::Home),
            std::cmp::Ordering::Less => Some(TeamSide::Visitor),
            std::cmp::Ordering::Equal => None,
        };
        totals
    }

    fn sessions(state: &AppState) -> &SessionStore<Self> {
        state.baseball_sessions()
    }
}

/// Golf: strokes per hole per golfer.
#[derive(Debug, Clone, Copy, Default)]
pub struct Golf;

/// Identifier of a golfer taking part in a match.
pub type GolferId = Uuid;

/// Per-golfer running totals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct GolferTotal {
    pub strokes: i32,
    pub holes_played: u32,
    /// Holes where this golfer posted the unique lowest score.
    pub holes_won: u32,
}

/// Running totals of a golf match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct GolfTotals {
    /// Totals per golfer, in order of first appearance on the card.
    #[schema(value_type = Object)]
    pub golfers: IndexMap<GolferId, GolferTotal>,
    /// Golfer with the most holes won, `None` while nobody leads outright.
    #[schema(value_type = Option<Uuid>)]
    pub leader: Option<GolferId>,
}

impl Sport for Golf {
    const KIND: SportKind = SportKind::Golf;
    type Participant = GolferId;
    type Aggregates = GolfTotals;

    fn aggregate(book: &ScoreBook<GolferId>) -> GolfTotals {
        let mut totals = GolfTotals::default();
        let mut hole: Option<PositionUnit> = None;
        let mut hole_scores: Vec<(GolferId, i32)> = Vec::new();

        for entry in book.iter() {
            if hole != Some(entry.position) {
                award_hole(&mut totals, &hole_scores);
                hole_scores.clear();
                hole = Some(entry.position);
            }

            let golfer = totals.golfers.entry(entry.participant).or_default();
            golfer.strokes += entry.value;
            golfer.holes_played += 1;
            hole_scores.push((entry.participant, entry.value));
        }
        award_hole(&mut totals, &hole_scores);

        let best = totals.golfers.values().map(|g| g.holes_won).max().unwrap_or(0);
        if best > 0 {
            let mut leaders = totals
                .golfers
                .iter()
                .filter(|(_, g)| g.holes_won == best)
                .map(|(id, _)| *id);
            totals.leader = match (leaders.next(), leaders.next()) {
                (Some(id), None) => Some(id),
                _ => None,
            };
        }
        totals
    }

    fn sessions(state: &AppState) -> &SessionStore<Self> {
        state.golf_sessions()
    }
}

/// Credit the hole to the golfer with the unique lowest score, if at least two golfers played it.
fn award_hole(totals: &mut GolfTotals, scores: &[(GolferId, i32)]) {
    if scores.len() < 2 {
        return;
    }
    let Some(low) = scores.iter().map(|(_, value)| *value).min() else {
        return;
    };
    let mut lowest = scores.iter().filter(|(_, value)| *value == low);
    if let (Some((winner, _)), None) = (lowest.next(), lowest.next()) {
        if let Some(golfer) = totals.golfers.get_mut(winner) {
            golfer.holes_won += 1;
        }
    }
}
