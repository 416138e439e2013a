use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;
use time::OffsetDateTime;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dto::session::SessionSnapshot,
    state::{
        channel::ConnectionRole,
        scores::{PositionUnit, ScoreEntry},
        session::SessionId,
        sport::{Sport, SportKind},
        state_machine::SessionStatus,
    },
};

pub const EVENT_CONNECTED: &str = "connected";
pub const EVENT_STATE: &str = "state";
pub const EVENT_SCORE_UPDATE: &str = "score_update";
pub const EVENT_POSITION_ADVANCED: &str = "position_advanced";
pub const EVENT_SESSION_STARTED: &str = "session_started";
pub const EVENT_SESSION_FINALIZED: &str = "session_finalized";
pub const EVENT_SESSION_STOPPED: &str = "session_stopped";
pub const EVENT_VIEWER_COUNT: &str = "viewer_count";
pub const EVENT_SCORER_COUNT: &str = "scorer_count";
pub const EVENT_PING: &str = "ping";
pub const EVENT_NO_SESSION: &str = "no_session";

#[derive(Clone, Debug, PartialEq, Eq)]
/// Dispatched payload carried across SSE channels.
pub struct ServerEvent {
    /// Session version the event was produced at, emitted as the SSE `id`.
    pub id: Option<u64>,
    pub event: Option<String>,
    pub data: String,
}

impl ServerEvent {
    /// Wrap an already encoded payload.
    pub fn new(event: Option<String>, data: String) -> Self {
        Self {
            id: None,
            event,
            data,
        }
    }

    /// Convenience wrapper that serialises `payload` into the SSE data field.
    pub fn json<E, T>(event: E, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self {
            id: None,
            event: event.into(),
            data: serde_json::to_string(payload)?,
        })
    }

    /// Attach the session version.
    pub fn with_id(mut self, version: u64) -> Self {
        self.id = Some(version);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
/// First event of every stream, confirming the admission.
pub struct ConnectedEvent {
    /// Absent when no session runs for the subject.
    pub connection_id: Option<Uuid>,
    pub role: ConnectionRole,
    pub sport: SportKind,
    pub subject_id: Uuid,
    /// Whether the backend is running without a storage backend connection.
    pub degraded: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// A score was recorded. Also returned to the submitter.
pub struct ScoreUpdate<P> {
    pub session_id: SessionId,
    pub version: u64,
    pub entry: ScoreEntry<P>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
/// The current inning or hole changed. Also returned to the actor.
pub struct PositionUpdate {
    #[schema(value_type = Uuid)]
    pub session_id: SessionId,
    pub version: u64,
    pub previous: PositionUnit,
    pub position: PositionUnit,
    pub actor: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
/// A session started for the subject a waiting connection asked for.
pub struct SessionStartedEvent {
    #[schema(value_type = Uuid)]
    pub session_id: SessionId,
    pub subject_id: Uuid,
    pub current_position: PositionUnit,
    pub started_by: String,
    pub version: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Terminal event carrying the final state.
pub struct SessionFinalizedEvent<P, A> {
    pub snapshot: SessionSnapshot<P, A>,
    pub finalized_by: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
/// Terminal event of a discarded session. Also returned by the stop command.
pub struct SessionEnded {
    #[schema(value_type = Uuid)]
    pub session_id: SessionId,
    pub status: SessionStatus,
    pub version: u64,
    pub ended_by: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
/// Emitted as `viewer_count` or `scorer_count` when connections come and go.
pub struct CountEvent {
    #[schema(value_type = Uuid)]
    pub session_id: SessionId,
    pub count: u32,
    /// Session version at the time of the change; counts do not bump it.
    pub version: u64,
    /// Membership revision of the channel after the change.
    pub seq: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
/// Periodic keep-alive.
pub struct PingEvent {
    #[serde(with = "time::serde::rfc3339")]
    #[schema(value_type = String, format = DateTime)]
    pub at: OffsetDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
/// No session is active for the requested subject yet.
pub struct NoSessionEvent {
    pub subject_id: Uuid,
}

/// Typed view of one event received on a live stream.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveEvent<P, A> {
    Connected(ConnectedEvent),
    State(SessionSnapshot<P, A>),
    ScoreUpdate(ScoreUpdate<P>),
    PositionAdvanced(PositionUpdate),
    SessionStarted(SessionStartedEvent),
    SessionFinalized(SessionFinalizedEvent<P, A>),
    SessionStopped(SessionEnded),
    ViewerCount(CountEvent),
    ScorerCount(CountEvent),
    Ping(PingEvent),
    NoSession(NoSessionEvent),
}

/// Live event decoded for one sport.
pub type LiveEventOf<S> = LiveEvent<<S as Sport>::Participant, <S as Sport>::Aggregates>;

/// A stream event that could not be turned into a [`LiveEvent`].
#[derive(Debug, Error)]
pub enum EventDecodeError {
    #[error("unknown event `{0}`")]
    UnknownEvent(String),
    #[error("malformed `{event}` payload")]
    Malformed {
        event: String,
        #[source]
        source: serde_json::Error,
    },
}

impl<P, A> LiveEvent<P, A>
where
    P: DeserializeOwned,
    A: DeserializeOwned,
{
    /// Decode an event from its SSE name and data.
    pub fn decode(name: &str, data: &str) -> Result<Self, EventDecodeError> {
        fn parse<T: DeserializeOwned>(name: &str, data: &str) -> Result<T, EventDecodeError> {
            serde_json::from_str(data).map_err(|source| EventDecodeError::Malformed {
                event: name.to_string(),
                source,
            })
        }

        let event = match name {
            EVENT_CONNECTED => Self::Connected(parse(name, data)?),
            EVENT_STATE => Self::State(parse(name, data)?),
            EVENT_SCORE_UPDATE => Self::ScoreUpdate(parse(name, data)?),
            EVENT_POSITION_ADVANCED => Self::PositionAdvanced(parse(name, data)?),
            EVENT_SESSION_STARTED => Self::SessionStarted(parse(name, data)?),
            EVENT_SESSION_FINALIZED => Self::SessionFinalized(parse(name, data)?),
            EVENT_SESSION_STOPPED => Self::SessionStopped(parse(name, data)?),
            EVENT_VIEWER_COUNT => Self::ViewerCount(parse(name, data)?),
            EVENT_SCORER_COUNT => Self::ScorerCount(parse(name, data)?),
            EVENT_PING => Self::Ping(parse(name, data)?),
            EVENT_NO_SESSION => Self::NoSession(parse(name, data)?),
            other => return Err(EventDecodeError::UnknownEvent(other.to_string())),
        };
        Ok(event)
    }
}

impl<P, A> LiveEvent<P, A> {
    /// Whether the server closes the stream after this event.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LiveEvent::SessionFinalized(_) | LiveEvent::SessionStopped(_)
        )
    }
}
