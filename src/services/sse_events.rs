use serde::Serialize;
use time::OffsetDateTime;
use tracing::warn;

use crate::{
    dto::{
        session::SessionSnapshot,
        sse::{
            ConnectedEvent, CountEvent, EVENT_CONNECTED, EVENT_NO_SESSION, EVENT_PING,
            EVENT_POSITION_ADVANCED, EVENT_SCORE_UPDATE, EVENT_SCORER_COUNT,
            EVENT_SESSION_FINALIZED, EVENT_SESSION_STARTED, EVENT_SESSION_STOPPED, EVENT_STATE,
            EVENT_VIEWER_COUNT, NoSessionEvent, PingEvent, PositionUpdate, ScoreUpdate,
            ServerEvent, SessionEnded, SessionFinalizedEvent, SessionStartedEvent,
        },
    },
    state::{
        channel::{ConnectionCounts, ConnectionRole, SessionChannel},
        session::SessionId,
    },
};

/// Broadcast a recorded score to the session channel.
pub fn broadcast_score_update<P: Serialize>(channel: &SessionChannel, update: &ScoreUpdate<P>) {
    send_session_event(channel, EVENT_SCORE_UPDATE, update.version, update);
}

/// Broadcast a position change to the session channel.
pub fn broadcast_position_advanced(channel: &SessionChannel, update: &PositionUpdate) {
    send_session_event(channel, EVENT_POSITION_ADVANCED, update.version, update);
}

/// Broadcast the connection count of `role` after it changed.
pub fn broadcast_count(
    channel: &SessionChannel,
    session_id: SessionId,
    role: ConnectionRole,
    counts: ConnectionCounts,
    version: u64,
) {
    let payload = CountEvent {
        session_id,
        count: counts.for_role(role),
        version,
        seq: counts.seq,
    };
    let name = match role {
        ConnectionRole::Scorer => EVENT_SCORER_COUNT,
        ConnectionRole::Watcher => EVENT_VIEWER_COUNT,
    };
    send_session_event(channel, name, version, &payload);
}

/// Broadcast the final state of a finalized session.
pub fn broadcast_session_finalized<P: Serialize, A: Serialize>(
    channel: &SessionChannel,
    payload: &SessionFinalizedEvent<P, A>,
) {
    send_session_event(
        channel,
        EVENT_SESSION_FINALIZED,
        payload.snapshot.version,
        payload,
    );
}

/// Broadcast that a session was stopped.
pub fn broadcast_session_stopped(channel: &SessionChannel, payload: &SessionEnded) {
    send_session_event(channel, EVENT_SESSION_STOPPED, payload.version, payload);
}

/// Event announcing a new session to connections waiting on its subject.
pub fn session_started_event(payload: &SessionStartedEvent) -> Option<ServerEvent> {
    encode(EVENT_SESSION_STARTED, Some(payload.version), payload)
}

/// Full snapshot event.
pub fn state_event<P: Serialize, A: Serialize>(
    snapshot: &SessionSnapshot<P, A>,
) -> Option<ServerEvent> {
    encode(EVENT_STATE, Some(snapshot.version), snapshot)
}

/// Admission confirmation.
pub fn connected_event(payload: &ConnectedEvent) -> Option<ServerEvent> {
    encode(EVENT_CONNECTED, None, payload)
}

/// Keep-alive stamped with the current time.
pub fn ping_event() -> Option<ServerEvent> {
    encode(
        EVENT_PING,
        None,
        &PingEvent {
            at: OffsetDateTime::now_utc(),
        },
    )
}

/// Tells a connection that its subject has no active session.
pub fn no_session_event(payload: &NoSessionEvent) -> Option<ServerEvent> {
    encode(EVENT_NO_SESSION, None, payload)
}

fn send_session_event(
    channel: &SessionChannel,
    event: &str,
    version: u64,
    payload: &impl Serialize,
) {
    if let Some(event) = encode(event, Some(version), payload) {
        channel.publish(event);
    }
}

fn encode(event: &str, version: Option<u64>, payload: &impl Serialize) -> Option<ServerEvent> {
    match ServerEvent::json(Some(event.to_string()), payload) {
        Ok(encoded) => Some(match version {
            Some(version) => encoded.with_id(version),
            None => encoded,
        }),
        Err(err) => {
            warn!(event, error = %err, "failed to serialize live SSE payload");
            None
        }
    }
}
