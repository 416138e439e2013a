use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::state::{
    channel::ConnectionRole,
    scores::{PositionUnit, ScoreEntry},
    session::SessionId,
    sport::{Sport, SportKind},
    state_machine::SessionStatus,
};

/// Full state of a live session, sent as the `state` event and by the state endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot<P, A> {
    pub session_id: SessionId,
    pub account_id: Uuid,
    pub subject_id: Uuid,
    pub sport: SportKind,
    pub status: SessionStatus,
    pub current_position: PositionUnit,
    /// Score entries ordered by position, then participant.
    pub entries: Vec<ScoreEntry<P>>,
    /// Totals derived from `entries`.
    pub aggregates: A,
    pub viewer_count: u32,
    pub scorer_count: u32,
    /// Membership revision of the counts; `viewer_count`/`scorer_count` events at or
    /// below it are already reflected.
    pub count_seq: u64,
    pub version: u64,
    pub started_by: String,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
}

/// Snapshot type of one sport.
pub type SnapshotOf<S> = SessionSnapshot<<S as Sport>::Participant, <S as Sport>::Aggregates>;

fn default_starting_position() -> PositionUnit {
    1
}

/// Body of the start command.
#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
pub struct StartSessionRequest {
    /// Inning or hole the session starts at.
    #[serde(default = "default_starting_position")]
    #[validate(range(min = 1))]
    pub starting_position: PositionUnit,
}

/// Body of the submit-score command.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct SubmitScoreRequest<P> {
    #[validate(range(min = 1))]
    pub position: PositionUnit,
    pub participant: P,
    #[validate(range(min = 0, max = 999))]
    pub value: i32,
}

/// Body of the advance-position command.
#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
pub struct AdvancePositionRequest {
    #[validate(range(min = 1))]
    pub position: PositionUnit,
}

/// Optional guard naming the session a command is meant for.
///
/// When present and the subject's session has been replaced or ended, the command is
/// rejected instead of acting on whatever session is current.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, IntoParams)]
pub struct SessionTarget {
    #[param(value_type = Option<Uuid>)]
    pub session_id: Option<SessionId>,
}

/// Body of the ticket request.
#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
pub struct TicketRequest {
    pub role: ConnectionRole,
}

/// Ticket handed to a caller that may open a live stream.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, ToSchema)]
pub struct TicketGrant {
    pub ticket: String,
    pub role: ConnectionRole,
    #[serde(with = "time::serde::rfc3339")]
    #[schema(value_type = String, format = DateTime)]
    pub expires_at: OffsetDateTime,
    /// Path of the stream endpoint, ticket included.
    pub stream_path: String,
}

/// Query string of the stream endpoint.
#[derive(Debug, Clone, Deserialize, Serialize, IntoParams)]
pub struct StreamQuery {
    pub ticket: String,
    /// Keep the stream open after `no_session` until the subject's session starts.
    #[serde(default)]
    pub await_start: bool,
}

/// One active session of an account.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, ToSchema)]
pub struct ActiveSessionSummary {
    #[schema(value_type = Uuid)]
    pub session_id: SessionId,
    pub subject_id: Uuid,
    pub sport: SportKind,
    pub status: SessionStatus,
    pub current_position: PositionUnit,
    pub viewer_count: u32,
    pub scorer_count: u32,
    pub version: u64,
    pub started_by: String,
}

/// Active sessions of an account, across sports.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, ToSchema)]
pub struct AccountSessions {
    pub account_id: Uuid,
    pub sessions: Vec<ActiveSessionSummary>,
}
