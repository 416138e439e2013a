//! Connection manager keeping one subject's live session mirrored on the client.
//!
//! The controller walks `idle → ticketing → connecting → connected`, falls back to
//! `reconnecting` with exponential backoff when the stream drops, and ends in `closed` after
//! a terminal event, an explicit disconnect or too many failed attempts.

use std::{future::Future, sync::Arc, time::Duration};

use futures::StreamExt;
use tokio::{
    sync::{Mutex, watch},
    task::JoinHandle,
    time::{sleep, timeout},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    client::{
        backoff::Backoff,
        error::{ClientError, ClientResult},
        listeners::{ConnectionChanged, CountsChanged, Listeners, Notification},
        local::{Applied, LocalSession},
        transport::{EventStream, LiveApi},
    },
    dto::{
        session::{
            AdvancePositionRequest, SessionTarget, SnapshotOf, StartSessionRequest,
            SubmitScoreRequest,
        },
        sse::{LiveEvent, LiveEventOf, PositionUpdate, ScoreUpdate, SessionEnded},
    },
    state::{
        channel::{ConnectionId, ConnectionRole},
        scores::PositionUnit,
        session::SubjectKey,
        sport::Sport,
        store::FinalizedOf,
    },
};

/// Lifecycle of the controller's connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Not connected yet.
    Idle,
    /// Waiting for a stream ticket.
    Ticketing,
    /// Opening the stream with a ticket.
    Connecting,
    /// Receiving live events.
    Connected,
    /// Waiting out the backoff after a drop.
    Reconnecting,
    /// Stopped; `connect` starts over.
    Closed,
}

/// Tuning of the reconnect and liveness behavior.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Delay before the first reconnect attempt; doubled for each further attempt.
    pub backoff_base: Duration,
    /// Upper bound of a single backoff delay.
    pub backoff_max: Duration,
    /// Reconnect attempts after a drop before giving up.
    pub max_attempts: u32,
    /// Deadline of the ticket request and of opening the stream.
    pub connect_timeout: Duration,
    /// Expected keep-alive period of the server.
    pub keep_alive_interval: Duration,
    /// Keep-alives that may be missed before the stream is considered dead.
    pub missed_keep_alives: u32,
    /// Randomize backoff delays.
    pub jitter: bool,
    /// Keep the stream open when no session runs yet and pick the session up once it
    /// starts. When unset, `no_session` closes the controller.
    pub await_start: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            backoff_base: Duration::from_millis(500),
            backoff_max: Duration::from_secs(10),
            max_attempts: 5,
            connect_timeout: Duration::from_secs(10),
            keep_alive_interval: Duration::from_secs(15),
            missed_keep_alives: 3,
            jitter: true,
            await_start: false,
        }
    }
}

impl ControllerConfig {
    fn liveness_deadline(&self) -> Duration {
        self.keep_alive_interval * self.missed_keep_alives.max(1)
    }
}

struct Shared<S: Sport> {
    state: watch::Sender<ConnectionState>,
    session: watch::Sender<Option<SnapshotOf<S>>>,
    error: watch::Sender<Option<ClientError>>,
    connection_id: watch::Sender<Option<ConnectionId>>,
    listeners: Listeners<S>,
}

impl<S: Sport> Shared<S> {
    fn transition(&self, state: ConnectionState, error: Option<ClientError>) {
        let changed = self.state.send_if_modified(|current| {
            let changed = *current != state;
            *current = state;
            changed
        });
        match (&error, state) {
            (Some(_), _) => {
                self.error.send_replace(error.clone());
            }
            (None, ConnectionState::Connected) => {
                self.error.send_replace(None);
            }
            _ => {}
        }
        if changed {
            debug!(?state, "live connection state changed");
            self.listeners
                .emit(&Notification::ConnectionChanged(ConnectionChanged { state, error }));
        }
    }

    fn publish(&self, local: &LocalSession<S>) {
        self.session.send_replace(Some(local.snapshot().clone()));
    }
}

struct Attachment {
    key: SubjectKey,
    role: ConnectionRole,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Client-side manager of one live connection.
pub struct LiveSessionController<S: Sport> {
    api: Arc<dyn LiveApi<S>>,
    config: ControllerConfig,
    shared: Arc<Shared<S>>,
    attachment: Mutex<Option<Attachment>>,
    root: CancellationToken,
}

enum StreamEnd {
    Terminal,
    /// No session ran for the subject and the stream was not asked to wait for one.
    NoSession,
    Cancelled,
    Dropped(ClientError),
}

impl<S: Sport> LiveSessionController<S> {
    /// Create an idle controller over `api`.
    pub fn new(api: Arc<dyn LiveApi<S>>, config: ControllerConfig) -> Self {
        Self {
            api,
            config,
            shared: Arc::new(Shared {
                state: watch::Sender::new(ConnectionState::Idle),
                session: watch::Sender::new(None),
                error: watch::Sender::new(None),
                connection_id: watch::Sender::new(None),
                listeners: Listeners::default(),
            }),
            attachment: Mutex::new(None),
            root: CancellationToken::new(),
        }
    }

    /// Attach to `key` with `role`.
    ///
    /// Does nothing when already connected or connecting to the same subject with the same
    /// role; any other attachment is torn down first.
    pub async fn connect(&self, key: SubjectKey, role: ConnectionRole) {
        let mut attachment = self.attachment.lock().await;
        if let Some(current) = attachment.as_ref() {
            let live = !matches!(self.state(), ConnectionState::Closed | ConnectionState::Idle);
            if current.key == key && current.role == role && live {
                return;
            }
        }
        if let Some(previous) = attachment.take() {
            previous.cancel.cancel();
            let _ = previous.task.await;
        }

        self.shared.session.send_replace(None);
        self.shared.connection_id.send_replace(None);
        self.shared.error.send_replace(None);
        self.shared.transition(ConnectionState::Ticketing, None);

        let cancel = self.root.child_token();
        let task = tokio::spawn(run::<S>(
            self.api.clone(),
            self.config.clone(),
            self.shared.clone(),
            key,
            role,
            cancel.clone(),
        ));
        *attachment = Some(Attachment {
            key,
            role,
            cancel,
            task,
        });
    }

    /// Drop the connection and stop reconnecting.
    pub async fn disconnect(&self) {
        let previous = self.attachment.lock().await.take();
        if let Some(previous) = previous {
            previous.cancel.cancel();
            let _ = previous.task.await;
            info!(subject_id = %previous.key.subject_id, "live connection closed by client");
        }
        self.shared.connection_id.send_replace(None);
        self.shared.error.send_replace(None);
        self.shared.transition(ConnectionState::Closed, None);
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Latest mirrored session, `None` until a snapshot arrived or while no session runs.
    pub fn session(&self) -> Option<SnapshotOf<S>> {
        self.shared.session.borrow().clone()
    }

    pub fn watch_session(&self) -> watch::Receiver<Option<SnapshotOf<S>>> {
        self.shared.session.subscribe()
    }

    /// Error behind the last transition to `reconnecting` or `closed`.
    pub fn last_error(&self) -> Option<ClientError> {
        self.shared.error.borrow().clone()
    }

    /// Server-side id of the current connection.
    pub fn connection_id(&self) -> Option<ConnectionId> {
        *self.shared.connection_id.borrow()
    }

    /// Callback registry for session and connection notifications.
    pub fn listeners(&self) -> &Listeners<S> {
        &self.shared.listeners
    }

    /// Start the session of the attached subject.
    pub async fn start(&self, starting_position: PositionUnit) -> ClientResult<SnapshotOf<S>> {
        let key = self.subject().await?;
        self.api
            .start(key, StartSessionRequest { starting_position })
            .await
    }

    /// Record a score; the mirrored state follows once the broadcast arrives.
    pub async fn submit_score(
        &self,
        position: PositionUnit,
        participant: S::Participant,
        value: i32,
    ) -> ClientResult<ScoreUpdate<S::Participant>> {
        let key = self.subject().await?;
        let request = SubmitScoreRequest {
            position,
            participant,
            value,
        };
        self.api.submit_score(key, self.target(), request).await
    }

    pub async fn advance_position(&self, position: PositionUnit) -> ClientResult<PositionUpdate> {
        let key = self.subject().await?;
        self.api
            .advance_position(key, self.target(), AdvancePositionRequest { position })
            .await
    }

    pub async fn finalize(&self) -> ClientResult<FinalizedOf<S>> {
        let key = self.subject().await?;
        self.api.finalize(key, self.target()).await
    }

    pub async fn stop(&self) -> ClientResult<SessionEnded> {
        let key = self.subject().await?;
        self.api.stop(key, self.target()).await
    }

    async fn subject(&self) -> ClientResult<SubjectKey> {
        self.attachment
            .lock()
            .await
            .as_ref()
            .map(|attachment| attachment.key)
            .ok_or(ClientError::NotConnected)
    }

    /// Commands are guarded by the mirrored session so they never hit a replacement.
    fn target(&self) -> SessionTarget {
        SessionTarget {
            session_id: self
                .shared
                .session
                .borrow()
                .as_ref()
                .map(|snapshot| snapshot.session_id),
        }
    }
}

impl<S: Sport> Drop for LiveSessionController<S> {
    fn drop(&mut self) {
        self.root.cancel();
    }
}

async fn run<S: Sport>(
    api: Arc<dyn LiveApi<S>>,
    config: ControllerConfig,
    shared: Arc<Shared<S>>,
    key: SubjectKey,
    role: ConnectionRole,
    cancel: CancellationToken,
) {
    let backoff = Backoff::new(config.backoff_base, config.backoff_max, config.jitter);
    let mut attempt: u32 = 0;
    let mut reticketed = false;
    let mut last_error: Option<ClientError> = None;

    loop {
        if attempt > 0 {
            if attempt > config.max_attempts {
                warn!(attempt, subject_id = %key.subject_id, "giving up on the live connection");
                shared.transition(ConnectionState::Closed, last_error);
                return;
            }
            shared.transition(ConnectionState::Reconnecting, last_error.clone());
            let delay = backoff.delay(attempt);
            debug!(attempt, ?delay, "waiting before reconnecting");
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = sleep(delay) => {}
            }
        }

        let opened = match open(api.as_ref(), &config, &shared, key, role, &cancel).await {
            Some(opened) => opened,
            None => return,
        };
        let stream = match opened {
            Ok(stream) => stream,
            Err(ClientError::TicketRejected(reason)) if !reticketed => {
                debug!(%reason, "ticket refused; requesting a fresh one");
                reticketed = true;
                continue;
            }
            Err(err) if err.is_terminal() => {
                shared.transition(ConnectionState::Closed, Some(err));
                return;
            }
            Err(err) => {
                last_error = Some(err);
                attempt += 1;
                continue;
            }
        };

        reticketed = false;
        shared.transition(ConnectionState::Connected, None);
        info!(subject_id = %key.subject_id, ?role, "live connection established");

        match pump(stream, &config, &shared, &cancel).await {
            StreamEnd::Terminal => {
                shared.connection_id.send_replace(None);
                shared.transition(ConnectionState::Closed, None);
                return;
            }
            StreamEnd::NoSession => {
                info!(subject_id = %key.subject_id, "no live session for the subject");
                shared.connection_id.send_replace(None);
                shared.transition(ConnectionState::Closed, None);
                return;
            }
            StreamEnd::Cancelled => return,
            StreamEnd::Dropped(err) => {
                warn!(error = %err, subject_id = %key.subject_id, "live connection dropped");
                shared.connection_id.send_replace(None);
                last_error = Some(err);
                attempt = 1;
            }
        }
    }
}

/// Ticket then channel. `None` when cancelled.
async fn open<S: Sport>(
    api: &dyn LiveApi<S>,
    config: &ControllerConfig,
    shared: &Shared<S>,
    key: SubjectKey,
    role: ConnectionRole,
    cancel: &CancellationToken,
) -> Option<ClientResult<EventStream>> {
    shared.transition(ConnectionState::Ticketing, None);
    let ticket = api.request_ticket(key, role);
    let grant = match bounded(config.connect_timeout, cancel, ticket).await? {
        Ok(grant) => grant,
        Err(err) => return Some(Err(err)),
    };

    shared.transition(ConnectionState::Connecting, None);
    let channel = api.open_channel(key, grant, config.await_start);
    Some(bounded(config.connect_timeout, cancel, channel).await?)
}

async fn bounded<T>(
    limit: Duration,
    cancel: &CancellationToken,
    call: impl Future<Output = ClientResult<T>>,
) -> Option<ClientResult<T>> {
    tokio::select! {
        _ = cancel.cancelled() => None,
        result = timeout(limit, call) => Some(result.unwrap_or_else(|_| {
            Err(ClientError::Timeout("connecting to the live stream".into()))
        })),
    }
}

async fn pump<S: Sport>(
    mut stream: EventStream,
    config: &ControllerConfig,
    shared: &Shared<S>,
    cancel: &CancellationToken,
) -> StreamEnd {
    let deadline = config.liveness_deadline();
    let mut local: Option<LocalSession<S>> = None;

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return StreamEnd::Cancelled,
            next = timeout(deadline, stream.next()) => next,
        };

        let raw = match next {
            Err(_) => {
                return StreamEnd::Dropped(ClientError::Timeout("missed keep-alives".into()));
            }
            Ok(None) => {
                return StreamEnd::Dropped(ClientError::Transport("stream closed".into()));
            }
            Ok(Some(Err(err))) => return StreamEnd::Dropped(err),
            Ok(Some(Ok(raw))) => raw,
        };

        let Some(name) = raw.event.as_deref() else {
            debug!("ignoring unnamed live event");
            continue;
        };
        let event = match LiveEventOf::<S>::decode(name, &raw.data) {
            Ok(event) => event,
            Err(err) => {
                warn!(error = %err, "dropping undecodable live event");
                continue;
            }
        };

        let no_session = matches!(event, LiveEvent::NoSession(_));
        if handle_event(event, shared, &mut local) {
            return StreamEnd::Terminal;
        }
        if no_session && !config.await_start {
            return StreamEnd::NoSession;
        }
    }
}

/// Apply one event and notify listeners. Returns whether the stream is over.
fn handle_event<S: Sport>(
    event: LiveEventOf<S>,
    shared: &Shared<S>,
    local: &mut Option<LocalSession<S>>,
) -> bool {
    let applied = match local.as_mut() {
        Some(session) => session.apply(&event),
        None => Applied::Ignored,
    };

    match event {
        LiveEvent::Connected(connected) => {
            shared.connection_id.send_replace(connected.connection_id);
        }
        LiveEvent::State(snapshot) => {
            if applied == Applied::Ignored && local.is_some() {
                return false;
            }
            let session = LocalSession::from_snapshot(snapshot);
            shared.publish(&session);
            *local = Some(session);
        }
        LiveEvent::NoSession(_) => {
            *local = None;
            shared.session.send_replace(None);
        }
        LiveEvent::SessionStarted(started) => {
            shared
                .listeners
                .emit(&Notification::SessionStarted(started));
        }
        LiveEvent::ScoreUpdate(update) => {
            if applied == Applied::Scores {
                publish_local(shared, local);
                shared.listeners.emit(&Notification::ScoreUpdated(update));
            }
        }
        LiveEvent::PositionAdvanced(update) => {
            if applied == Applied::Position {
                publish_local(shared, local);
                shared
                    .listeners
                    .emit(&Notification::PositionAdvanced(update));
            }
        }
        LiveEvent::ViewerCount(_) | LiveEvent::ScorerCount(_) => {
            if applied != Applied::Counts {
                return false;
            }
            if let Some(session) = local.as_ref() {
                shared.publish(session);
                let snapshot = session.snapshot();
                shared
                    .listeners
                    .emit(&Notification::CountsChanged(CountsChanged {
                        session_id: snapshot.session_id,
                        viewer_count: snapshot.viewer_count,
                        scorer_count: snapshot.scorer_count,
                    }));
            }
        }
        LiveEvent::SessionFinalized(finalized) => {
            if applied == Applied::Ended {
                publish_local(shared, local);
            }
            shared
                .listeners
                .emit(&Notification::SessionFinalized(finalized));
            return true;
        }
        LiveEvent::SessionStopped(ended) => {
            if applied == Applied::Ended {
                publish_local(shared, local);
            }
            shared.listeners.emit(&Notification::SessionStopped(ended));
            return true;
        }
        LiveEvent::Ping(_) => {}
    }
    false
}

fn publish_local<S: Sport>(shared: &Shared<S>, local: &Option<LocalSession<S>>) {
    if let Some(session) = local {
        shared.publish(session);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use futures::{FutureExt, future::BoxFuture, stream};
    use tokio::sync::mpsc;
    use tokio_stream::wrappers::UnboundedReceiverStream;
    use uuid::Uuid;

    use super::*;
    use crate::{
        dto::{
            session::{AccountSessions, TicketGrant},
            sse::{EVENT_CONNECTED, EVENT_NO_SESSION, ServerEvent},
        },
        state::sport::Golf,
    };

    /// Scripted transport: each `open_channel` hands out the next prepared outcome.
    struct Scripted {
        tickets: StdMutex<Vec<ClientResult<()>>>,
        channels: StdMutex<Vec<ClientResult<EventStream>>>,
        opened: StdMutex<u32>,
    }

    impl Scripted {
        fn new(
            tickets: Vec<ClientResult<()>>,
            channels: Vec<ClientResult<EventStream>>,
        ) -> Arc<Self> {
            Arc::new(Self {
                tickets: StdMutex::new(tickets),
                channels: StdMutex::new(channels),
                opened: StdMutex::new(0),
            })
        }
    }

    fn grant() -> TicketGrant {
        TicketGrant {
            ticket: "t".into(),
            role: ConnectionRole::Watcher,
            expires_at: time::OffsetDateTime::now_utc(),
            stream_path: String::new(),
        }
    }

    impl LiveApi<Golf> for Scripted {
        fn request_ticket(
            &self,
            _key: SubjectKey,
            _role: ConnectionRole,
        ) -> BoxFuture<'_, ClientResult<TicketGrant>> {
            let next = {
                let mut tickets = self.tickets.lock().unwrap();
                if tickets.is_empty() { Ok(()) } else { tickets.remove(0) }
            };
            async move { next.map(|_| grant()) }.boxed()
        }

        fn open_channel(
            &self,
            _key: SubjectKey,
            _grant: TicketGrant,
            _await_start: bool,
        ) -> BoxFuture<'_, ClientResult<EventStream>> {
            *self.opened.lock().unwrap() += 1;
            let next = {
                let mut channels = self.channels.lock().unwrap();
                if channels.is_empty() {
                    Err(ClientError::Transport("no more channels".into()))
                } else {
                    channels.remove(0)
                }
            };
            async move { next }.boxed()
        }

        fn start(
            &self,
            _key: SubjectKey,
            _request: StartSessionRequest,
        ) -> BoxFuture<'_, ClientResult<SnapshotOf<Golf>>> {
            async { Err(ClientError::NotConnected) }.boxed()
        }

        fn submit_score(
            &self,
            _key: SubjectKey,
            _target: SessionTarget,
            _request: SubmitScoreRequest<Uuid>,
        ) -> BoxFuture<'_, ClientResult<ScoreUpdate<Uuid>>> {
            async { Err(ClientError::NotConnected) }.boxed()
        }

        fn advance_position(
            &self,
            _key: SubjectKey,
            _target: SessionTarget,
            _request: AdvancePositionRequest,
        ) -> BoxFuture<'_, ClientResult<PositionUpdate>> {
            async { Err(ClientError::NotConnected) }.boxed()
        }

        fn finalize(
            &self,
            _key: SubjectKey,
            _target: SessionTarget,
        ) -> BoxFuture<'_, ClientResult<FinalizedOf<Golf>>> {
            async { Err(ClientError::NotConnected) }.boxed()
        }

        fn stop(
            &self,
            _key: SubjectKey,
            _target: SessionTarget,
        ) -> BoxFuture<'_, ClientResult<SessionEnded>> {
            async { Err(ClientError::NotConnected) }.boxed()
        }

        fn current_state(&self, _key: SubjectKey) -> BoxFuture<'_, ClientResult<SnapshotOf<Golf>>> {
            async { Err(ClientError::NotConnected) }.boxed()
        }

        fn active_sessions(
            &self,
            _account_id: Uuid,
        ) -> BoxFuture<'_, ClientResult<AccountSessions>> {
            async { Err(ClientError::NotConnected) }.boxed()
        }
    }

    fn key() -> SubjectKey {
        SubjectKey {
            account_id: Uuid::new_v4(),
            subject_id: Uuid::new_v4(),
        }
    }

    fn fast_config() -> ControllerConfig {
        ControllerConfig {
            backoff_base: Duration::from_millis(10),
            backoff_max: Duration::from_millis(40),
            max_attempts: 2,
            connect_timeout: Duration::from_secs(1),
            keep_alive_interval: Duration::from_secs(1),
            missed_keep_alives: 2,
            jitter: false,
            await_start: false,
        }
    }

    fn connected_event() -> ServerEvent {
        ServerEvent::new(
            Some(EVENT_CONNECTED.into()),
            r#"{"connection_id":null,"role":"watcher","sport":"golf","subject_id":"00000000-0000-0000-0000-000000000000","degraded":false}"#.into(),
        )
    }

    fn no_session_event() -> ServerEvent {
        ServerEvent::new(
            Some(EVENT_NO_SESSION.into()),
            r#"{"subject_id":"00000000-0000-0000-0000-000000000000"}"#.into(),
        )
    }

    async fn wait_for(
        states: &mut watch::Receiver<ConnectionState>,
        target: ConnectionState,
    ) {
        timeout(Duration::from_secs(5), states.wait_for(|state| *state == target))
            .await
            .expect("state reached in time")
            .expect("controller alive");
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_the_attempt_cap() {
        let api = Scripted::new(Vec::new(), Vec::new());
        let controller = LiveSessionController::<Golf>::new(api.clone(), fast_config());
        let mut states = controller.watch_state();

        controller.connect(key(), ConnectionRole::Watcher).await;
        wait_for(&mut states, ConnectionState::Closed).await;

        assert_eq!(*api.opened.lock().unwrap(), 3);
        assert!(matches!(controller.last_error(), Some(ClientError::Transport(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn authorization_errors_close_without_retrying() {
        let api = Scripted::new(vec![Err(ClientError::Authorization("no".into()))], Vec::new());
        let controller = LiveSessionController::<Golf>::new(api.clone(), fast_config());
        let mut states = controller.watch_state();

        controller.connect(key(), ConnectionRole::Watcher).await;
        wait_for(&mut states, ConnectionState::Closed).await;

        assert_eq!(*api.opened.lock().unwrap(), 0);
        assert_eq!(
            controller.last_error(),
            Some(ClientError::Authorization("no".into()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn a_refused_ticket_is_retried_once_silently() {
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(Ok(connected_event())).unwrap();
        let api = Scripted::new(
            Vec::new(),
            vec![
                Err(ClientError::TicketRejected("expired".into())),
                Ok(UnboundedReceiverStream::new(rx).boxed()),
            ],
        );
        let controller = LiveSessionController::<Golf>::new(api.clone(), fast_config());
        let mut states = controller.watch_state();
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let _handle = {
            let seen = seen.clone();
            controller
                .listeners()
                .on_connection_changed(move |change| seen.lock().unwrap().push(change.state))
        };

        controller.connect(key(), ConnectionRole::Watcher).await;
        wait_for(&mut states, ConnectionState::Connected).await;

        assert!(!seen.lock().unwrap().contains(&ConnectionState::Reconnecting));
        assert_eq!(*api.opened.lock().unwrap(), 2);
        drop(tx);
    }

    #[tokio::test(start_paused = true)]
    async fn silence_beyond_the_keep_alive_deadline_reconnects() {
        let silent: EventStream = stream::pending().boxed();
        let api = Scripted::new(Vec::new(), vec![Ok(silent)]);
        let controller = LiveSessionController::<Golf>::new(api.clone(), fast_config());
        let mut states = controller.watch_state();

        controller.connect(key(), ConnectionRole::Watcher).await;
        wait_for(&mut states, ConnectionState::Connected).await;
        wait_for(&mut states, ConnectionState::Reconnecting).await;

        assert!(matches!(controller.last_error(), Some(ClientError::Timeout(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn connecting_twice_to_the_same_subject_is_a_no_op() {
        let api = Scripted::new(Vec::new(), vec![Ok(stream::pending().boxed())]);
        let controller = LiveSessionController::<Golf>::new(api.clone(), fast_config());
        let mut states = controller.watch_state();
        let subject = key();

        controller.connect(subject, ConnectionRole::Watcher).await;
        wait_for(&mut states, ConnectionState::Connected).await;
        controller.connect(subject, ConnectionRole::Watcher).await;

        assert_eq!(controller.state(), ConnectionState::Connected);
        assert_eq!(*api.opened.lock().unwrap(), 1);

        controller.disconnect().await;
        assert_eq!(controller.state(), ConnectionState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn no_session_closes_without_reconnecting() {
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(Ok(connected_event())).unwrap();
        tx.send(Ok(no_session_event())).unwrap();
        let api = Scripted::new(Vec::new(), vec![Ok(UnboundedReceiverStream::new(rx).boxed())]);
        let controller = LiveSessionController::<Golf>::new(api.clone(), fast_config());
        let mut states = controller.watch_state();

        controller.connect(key(), ConnectionRole::Watcher).await;
        wait_for(&mut states, ConnectionState::Closed).await;

        assert_eq!(controller.last_error(), None);
        assert_eq!(controller.session(), None);
        assert_eq!(*api.opened.lock().unwrap(), 1);
        drop(tx);
    }

    #[tokio::test(start_paused = true)]
    async fn awaiting_controller_stays_connected_after_no_session() {
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(Ok(connected_event())).unwrap();
        tx.send(Ok(no_session_event())).unwrap();
        let api = Scripted::new(Vec::new(), vec![Ok(UnboundedReceiverStream::new(rx).boxed())]);
        let config = ControllerConfig {
            await_start: true,
            keep_alive_interval: Duration::from_secs(60),
            ..fast_config()
        };
        let controller = LiveSessionController::<Golf>::new(api.clone(), config);
        let mut states = controller.watch_state();

        controller.connect(key(), ConnectionRole::Watcher).await;
        wait_for(&mut states, ConnectionState::Connected).await;
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(controller.state(), ConnectionState::Connected);
        assert_eq!(*api.opened.lock().unwrap(), 1);
        drop(tx);
    }

    #[tokio::test]
    async fn commands_need_a_subject() {
        let api = Scripted::new(Vec::new(), Vec::new());
        let controller = LiveSessionController::<Golf>::new(api, fast_config());
        assert_eq!(controller.stop().await.unwrap_err(), ClientError::NotConnected);
    }
}
