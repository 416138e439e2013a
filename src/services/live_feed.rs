use std::{convert::Infallible, time::Duration};

use axum::response::sse::{Event, Sse};
use futures::{Stream, StreamExt};
use tokio::{
    sync::{
        broadcast::{
            self,
            error::{RecvError, TryRecvError},
        },
        mpsc,
    },
    time::{Instant, MissedTickBehavior, interval_at},
};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use crate::{
    dto::sse::{
        ConnectedEvent, EVENT_SESSION_FINALIZED, EVENT_SESSION_STOPPED, NoSessionEvent,
        ServerEvent,
    },
    error::ServiceError,
    services::sse_events::{connected_event, no_session_event, ping_event, state_event},
    state::{
        SharedState,
        channel::Subscription,
        session::SubjectKey,
        sport::Sport,
        store::{Admission, LiveSession, StartNotice},
        tickets::Ticket,
    },
};

/// Redeem `token` and open the live stream of `key` as an SSE response.
pub fn open_stream<S: Sport>(
    state: &SharedState,
    key: SubjectKey,
    token: &str,
    await_start: bool,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>> + use<S>>, ServiceError> {
    let ticket = state.tickets().redeem(token, S::KIND, key)?;
    Ok(into_sse(spawn_feed::<S>(state.clone(), ticket, await_start)))
}

/// Start the forwarder of one admitted ticket and return the events it produces.
///
/// The feed starts with `connected` and a `state` snapshot, then relays the session events
/// and pings. It ends after the terminal event of the session, or when the receiver is
/// dropped. Without a live session it sends `connected` and `no_session` and ends, unless
/// `await_start` asks it to stay open until the subject's session starts.
pub fn spawn_feed<S: Sport>(
    state: SharedState,
    ticket: Ticket,
    await_start: bool,
) -> mpsc::Receiver<ServerEvent> {
    let (tx, rx) = mpsc::channel(state.config().live.feed_buffer);
    tokio::spawn(run_feed::<S>(state, ticket, await_start, tx));
    rx
}

/// Convert forwarded events into an SSE response body.
pub fn into_sse(
    receiver: mpsc::Receiver<ServerEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    Sse::new(ReceiverStream::new(receiver).map(|payload| Ok(to_sse_event(payload))))
}

fn to_sse_event(payload: ServerEvent) -> Event {
    let mut event = Event::default().data(payload.data);
    if let Some(name) = payload.event {
        event = event.event(name);
    }
    if let Some(version) = payload.id {
        event = event.id(version.to_string());
    }
    event
}

async fn run_feed<S: Sport>(
    state: SharedState,
    ticket: Ticket,
    await_start: bool,
    tx: mpsc::Sender<ServerEvent>,
) {
    let sessions = state.sessions::<S>();
    let keep_alive = state.config().live.keep_alive;
    let key = ticket.key;

    // Subscribe to starts first so a start between the lookup and the wait is not missed.
    let mut starts = sessions.watch_starts();
    let mut waiting = false;
    let admission = loop {
        if let Some(admission) = sessions.subscribe(key, ticket.role).await {
            break admission;
        }
        if !waiting {
            waiting = true;
            let connected = connected_event(&ConnectedEvent {
                connection_id: None,
                role: ticket.role,
                sport: S::KIND,
                subject_id: key.subject_id,
                degraded: state.is_degraded(),
            });
            let no_session = no_session_event(&NoSessionEvent {
                subject_id: key.subject_id,
            });
            for event in [connected, no_session].into_iter().flatten() {
                if tx.send(event).await.is_err() {
                    return;
                }
            }
            if !await_start {
                debug!(subject_id = %key.subject_id, role = ?ticket.role, "no live session; closing");
                return;
            }
            debug!(subject_id = %key.subject_id, role = ?ticket.role, "waiting for a live session");
        }
        if !wait_for_start(&mut starts, &tx, key, keep_alive).await {
            return;
        }
    };
    drop(starts);

    let Admission {
        session,
        subscription,
        snapshot,
    } = admission;
    let connection_id = subscription.id;
    info!(
        session_id = %session.id(),
        connection_id = %connection_id,
        role = ?subscription.role,
        identity = %ticket.issued_to,
        "live connection admitted"
    );

    let opening = [
        connected_event(&ConnectedEvent {
            connection_id: Some(connection_id),
            role: subscription.role,
            sport: S::KIND,
            subject_id: key.subject_id,
            degraded: state.is_degraded(),
        }),
        state_event(&snapshot),
    ];
    let mut open = true;
    for event in opening.into_iter().flatten() {
        if tx.send(event).await.is_err() {
            open = false;
            break;
        }
    }
    if open {
        forward(&session, subscription, &tx, keep_alive).await;
    }

    session.leave(connection_id).await;
    info!(
        session_id = %session.id(),
        connection_id = %connection_id,
        "live connection closed"
    );
}

/// Relay session events until the session ends, the server drops the connection or the
/// client goes away.
async fn forward<S: Sport>(
    session: &LiveSession<S>,
    subscription: Subscription,
    tx: &mpsc::Sender<ServerEvent>,
    keep_alive: Duration,
) {
    let Subscription {
        id: connection_id,
        mut receiver,
        cancel,
        ..
    } = subscription;
    let mut ping = keep_alive_timer(keep_alive);

    loop {
        tokio::select! {
            biased;
            _ = tx.closed() => return,
            _ = cancel.cancelled() => {
                drain(&mut receiver, tx).await;
                return;
            }
            received = receiver.recv() => match received {
                Ok(event) => {
                    let terminal = ends_stream(&event);
                    if tx.send(event).await.is_err() || terminal {
                        return;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(
                        session_id = %session.id(),
                        connection_id = %connection_id,
                        skipped,
                        "live connection lagged; sending a fresh snapshot"
                    );
                    let snapshot = session.snapshot().await;
                    if let Some(event) = state_event(&snapshot) {
                        if tx.send(event).await.is_err() {
                            return;
                        }
                    }
                }
                Err(RecvError::Closed) => return,
            },
            _ = ping.tick() => {
                if let Some(event) = ping_event() {
                    if tx.send(event).await.is_err() {
                        return;
                    }
                }
            }
        }
    }
}

/// Deliver what was published before the channel closed, up to the terminal event.
async fn drain(receiver: &mut broadcast::Receiver<ServerEvent>, tx: &mpsc::Sender<ServerEvent>) {
    loop {
        match receiver.try_recv() {
            Ok(event) => {
                let terminal = ends_stream(&event);
                if tx.send(event).await.is_err() || terminal {
                    return;
                }
            }
            Err(TryRecvError::Lagged(_)) => continue,
            Err(TryRecvError::Empty | TryRecvError::Closed) => return,
        }
    }
}

/// Wait for the session of `key` to start, relaying pings meanwhile.
///
/// Returns `false` when the client went away.
async fn wait_for_start(
    starts: &mut broadcast::Receiver<StartNotice>,
    tx: &mpsc::Sender<ServerEvent>,
    key: SubjectKey,
    keep_alive: Duration,
) -> bool {
    let mut ping = keep_alive_timer(keep_alive);
    loop {
        tokio::select! {
            _ = tx.closed() => return false,
            notice = starts.recv() => match notice {
                Ok(notice) if notice.key == key => return tx.send(notice.event).await.is_ok(),
                Ok(_) => {}
                // Missed notices: look the session up again.
                Err(RecvError::Lagged(_)) => return true,
                Err(RecvError::Closed) => return false,
            },
            _ = ping.tick() => {
                if let Some(event) = ping_event() {
                    if tx.send(event).await.is_err() {
                        return false;
                    }
                }
            }
        }
    }
}

fn keep_alive_timer(period: Duration) -> tokio::time::Interval {
    let mut timer = interval_at(Instant::now() + period, period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    timer
}

fn ends_stream(event: &ServerEvent) -> bool {
    matches!(
        event.event.as_deref(),
        Some(EVENT_SESSION_FINALIZED | EVENT_SESSION_STOPPED)
    )
}
