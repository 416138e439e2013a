use std::{marker::PhantomData, sync::Arc, time::Duration};

use futures::{FutureExt, StreamExt, future::BoxFuture};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::{Serialize, de::DeserializeOwned};
use uuid::Uuid;

use crate::{
    client::{
        error::{ClientError, ClientResult},
        sse_decoder::SseDecoder,
        transport::{EventStream, LiveApi},
    },
    dto::{
        session::{
            AccountSessions, AdvancePositionRequest, SessionTarget, SnapshotOf,
            StartSessionRequest, SubmitScoreRequest, TicketGrant, TicketRequest,
        },
        sse::{PositionUpdate, ScoreUpdate, SessionEnded},
    },
    error::ErrorBody,
    routes::identity::IDENTITY_HEADER,
    state::{channel::ConnectionRole, session::SubjectKey, sport::Sport, store::FinalizedOf},
};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Live API spoken over HTTP to a remote backend.
pub struct HttpApi<S> {
    client: Client,
    base_url: Arc<str>,
    identity: Arc<str>,
    request_timeout: Duration,
    _sport: PhantomData<fn() -> S>,
}

impl<S: Sport> HttpApi<S> {
    /// Talk to the backend at `base_url` as `identity`.
    pub fn new(base_url: &str, identity: impl Into<String>) -> ClientResult<Self> {
        let client = Client::builder()
            .connect_timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()
            .map_err(|err| ClientError::Transport(err.to_string()))?;
        Ok(Self::with_client(client, base_url, identity))
    }

    /// Reuse an existing client.
    pub fn with_client(client: Client, base_url: &str, identity: impl Into<String>) -> Self {
        Self {
            client,
            base_url: Arc::from(base_url.trim_end_matches('/')),
            identity: Arc::from(identity.into()),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            _sport: PhantomData,
        }
    }

    /// Deadline of request/response calls. Streams are not bound by it.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    fn live_url(&self, key: SubjectKey, suffix: &str) -> String {
        format!(
            "{}/accounts/{}/{}/{}/live{}",
            self.base_url,
            key.account_id,
            S::KIND.route_segment(),
            key.subject_id,
            suffix
        )
    }

    fn request(&self, method: Method, url: String) -> RequestBuilder {
        self.client
            .request(method, url)
            .header(IDENTITY_HEADER, self.identity.as_ref())
            .timeout(self.request_timeout)
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> ClientResult<T> {
        let response = builder.send().await.map_err(transport_error)?;
        let response = check_status(response).await?;
        response
            .json::<T>()
            .await
            .map_err(|err| ClientError::Decode(err.to_string()))
    }

    async fn command<B, T>(
        &self,
        key: SubjectKey,
        suffix: &str,
        target: Option<SessionTarget>,
        body: Option<&B>,
    ) -> ClientResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let mut builder = self.request(Method::POST, self.live_url(key, suffix));
        if let Some(target) = target {
            builder = builder.query(&target);
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }
        self.send(builder).await
    }
}

impl<S: Sport> LiveApi<S> for HttpApi<S> {
    fn request_ticket(
        &self,
        key: SubjectKey,
        role: ConnectionRole,
    ) -> BoxFuture<'_, ClientResult<TicketGrant>> {
        async move {
            self.command(key, "/tickets", None, Some(&TicketRequest { role }))
                .await
        }
        .boxed()
    }

    fn open_channel(
        &self,
        _key: SubjectKey,
        grant: TicketGrant,
        await_start: bool,
    ) -> BoxFuture<'_, ClientResult<EventStream>> {
        async move {
            let url = format!("{}{}", self.base_url, grant.stream_path);
            let mut builder = self
                .client
                .get(url)
                .header(reqwest::header::ACCEPT, "text/event-stream");
            if await_start {
                builder = builder.query(&[("await_start", "true")]);
            }
            let response = builder
                .send()
                .await
                .map_err(transport_error)?;
            let response = check_status(response).await?;
            Ok(decode_events(response))
        }
        .boxed()
    }

    fn start(
        &self,
        key: SubjectKey,
        request: StartSessionRequest,
    ) -> BoxFuture<'_, ClientResult<SnapshotOf<S>>> {
        async move { self.command(key, "/start", None, Some(&request)).await }.boxed()
    }

    fn submit_score(
        &self,
        key: SubjectKey,
        target: SessionTarget,
        request: SubmitScoreRequest<S::Participant>,
    ) -> BoxFuture<'_, ClientResult<ScoreUpdate<S::Participant>>> {
        async move {
            self.command(key, "/scores", Some(target), Some(&request))
                .await
        }
        .boxed()
    }

    fn advance_position(
        &self,
        key: SubjectKey,
        target: SessionTarget,
        request: AdvancePositionRequest,
    ) -> BoxFuture<'_, ClientResult<PositionUpdate>> {
        async move {
            self.command(key, "/position", Some(target), Some(&request))
                .await
        }
        .boxed()
    }

    fn finalize(
        &self,
        key: SubjectKey,
        target: SessionTarget,
    ) -> BoxFuture<'_, ClientResult<FinalizedOf<S>>> {
        async move {
            self.command::<(), _>(key, "/finalize", Some(target), None)
                .await
        }
        .boxed()
    }

    fn stop(
        &self,
        key: SubjectKey,
        target: SessionTarget,
    ) -> BoxFuture<'_, ClientResult<SessionEnded>> {
        async move { self.command::<(), _>(key, "/stop", Some(target), None).await }.boxed()
    }

    fn current_state(&self, key: SubjectKey) -> BoxFuture<'_, ClientResult<SnapshotOf<S>>> {
        async move {
            let builder = self.request(Method::GET, self.live_url(key, ""));
            self.send(builder).await
        }
        .boxed()
    }

    fn active_sessions(&self, account_id: Uuid) -> BoxFuture<'_, ClientResult<AccountSessions>> {
        async move {
            let url = format!("{}/accounts/{}/live/sessions", self.base_url, account_id);
            let builder = self.request(Method::GET, url);
            self.send(builder).await
        }
        .boxed()
    }
}

fn transport_error(err: reqwest::Error) -> ClientError {
    if err.is_timeout() {
        ClientError::Timeout(err.to_string())
    } else {
        ClientError::Transport(err.to_string())
    }
}

/// Turn an error response into the client error named by its `code`.
async fn check_status(response: Response) -> ClientResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    Err(match serde_json::from_str::<ErrorBody>(&text) {
        Ok(body) => ClientError::from_code(body.code, body.message),
        Err(_) => ClientError::Transport(format!("unexpected status {status}")),
    })
}

fn decode_events(response: Response) -> EventStream {
    let mut body = response.bytes_stream();
    async_stream::stream! {
        let mut decoder = SseDecoder::new();
        while let Some(chunk) = body.next().await {
            match chunk {
                Ok(bytes) => {
                    for event in decoder.push(&bytes) {
                        yield Ok(event);
                    }
                }
                Err(err) => {
                    yield Err(transport_error(err));
                    break;
                }
            }
        }
    }
    .boxed()
}

#[cfg(test)]
mod tests {
    use axum::{Router, http::StatusCode};
    use tokio::{net::TcpListener, time::timeout};

    use super::*;
    use crate::{
        config::{AppConfig, LiveConfig},
        dao::{
            models::{AccountEntity, MemberEntity, MemberRole, SubjectEntity},
            score_store::memory::MemoryScoreStore,
        },
        dto::sse::{
            EVENT_CONNECTED, EVENT_NO_SESSION, EVENT_PING, EVENT_SCORE_UPDATE,
            EVENT_SESSION_STARTED, EVENT_SESSION_STOPPED, EVENT_STATE, LiveEvent, LiveEventOf,
            ServerEvent,
        },
        routes,
        state::{
            AppState, SharedState,
            sport::{Baseball, SportKind, TeamSide},
        },
    };

    const SCORER: &str = "alice";

    async fn serve(app: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{addr}")
    }

    /// Backend with one account and one game, served on a loopback port.
    async fn backend() -> (HttpApi<Baseball>, SubjectKey) {
        let state: SharedState = AppState::new(AppConfig {
            live: LiveConfig {
                keep_alive: Duration::from_secs(1),
                ..LiveConfig::default()
            },
        });
        let store = MemoryScoreStore::new();
        let key = SubjectKey {
            account_id: Uuid::new_v4(),
            subject_id: Uuid::new_v4(),
        };
        store.insert_account(AccountEntity {
            id: key.account_id,
            name: "Harbor League".into(),
            public_live_scores: false,
            members: vec![MemberEntity {
                user_id: SCORER.into(),
                role: MemberRole::Scorer,
            }],
        });
        store.insert_subject(SubjectEntity {
            id: key.subject_id,
            account_id: key.account_id,
            sport: SportKind::Baseball,
            name: "Night game".into(),
        });
        state.set_score_store(Arc::new(store)).await;

        let base_url = serve(routes::router(state)).await;
        (HttpApi::new(&base_url, SCORER).unwrap(), key)
    }

    async fn next_named(stream: &mut EventStream) -> ServerEvent {
        loop {
            let event = timeout(Duration::from_secs(5), stream.next())
                .await
                .expect("event in time")
                .expect("stream open")
                .expect("event decoded");
            if event.event.as_deref().is_some_and(|name| name != EVENT_PING) {
                return event;
            }
        }
    }

    fn name(event: &ServerEvent) -> &str {
        event.event.as_deref().unwrap_or_default()
    }

    #[tokio::test]
    async fn stream_delivers_snapshot_then_updates_over_sse() {
        let (api, key) = backend().await;
        let any = SessionTarget::default();
        api.start(key, StartSessionRequest { starting_position: 1 })
            .await
            .unwrap();

        let grant = api.request_ticket(key, ConnectionRole::Watcher).await.unwrap();
        assert!(grant.stream_path.contains(&grant.ticket));
        let mut stream = api.open_channel(key, grant, false).await.unwrap();

        assert_eq!(name(&next_named(&mut stream).await), EVENT_CONNECTED);
        let state = next_named(&mut stream).await;
        assert_eq!(name(&state), EVENT_STATE);
        assert!(matches!(
            LiveEventOf::<Baseball>::decode(EVENT_STATE, &state.data),
            Ok(LiveEvent::State(snapshot)) if snapshot.current_position == 1
        ));

        api.submit_score(
            key,
            any,
            SubmitScoreRequest {
                position: 1,
                participant: TeamSide::Home,
                value: 3,
            },
        )
        .await
        .unwrap();
        let update = loop {
            let event = next_named(&mut stream).await;
            if name(&event) == EVENT_SCORE_UPDATE {
                break event;
            }
        };
        assert_eq!(update.id, Some(2));

        api.stop(key, any).await.unwrap();
        let mut last = None;
        while let Ok(Some(event)) = timeout(Duration::from_secs(5), stream.next()).await {
            last = Some(event.unwrap());
        }
        assert_eq!(last.as_ref().map(name), Some(EVENT_SESSION_STOPPED));
    }

    #[tokio::test]
    async fn a_redeemed_ticket_is_rejected_with_its_code() {
        let (api, key) = backend().await;
        let grant = api.request_ticket(key, ConnectionRole::Watcher).await.unwrap();

        let mut first = api.open_channel(key, grant.clone(), false).await.unwrap();
        assert_eq!(name(&next_named(&mut first).await), EVENT_CONNECTED);
        assert_eq!(name(&next_named(&mut first).await), EVENT_NO_SESSION);
        assert!(
            timeout(Duration::from_secs(5), first.next())
                .await
                .unwrap()
                .is_none()
        );

        let err = api.open_channel(key, grant, false).await.err().unwrap();
        assert!(matches!(err, ClientError::TicketRejected(_)));
        assert!(!err.is_terminal());
    }

    #[tokio::test]
    async fn awaiting_stream_picks_up_the_session_once_started() {
        let (api, key) = backend().await;
        let grant = api.request_ticket(key, ConnectionRole::Watcher).await.unwrap();
        let mut stream = api.open_channel(key, grant, true).await.unwrap();
        assert_eq!(name(&next_named(&mut stream).await), EVENT_CONNECTED);
        assert_eq!(name(&next_named(&mut stream).await), EVENT_NO_SESSION);

        api.start(key, StartSessionRequest { starting_position: 4 })
            .await
            .unwrap();
        assert_eq!(name(&next_named(&mut stream).await), EVENT_SESSION_STARTED);
        assert_eq!(name(&next_named(&mut stream).await), EVENT_CONNECTED);
        assert_eq!(name(&next_named(&mut stream).await), EVENT_STATE);
    }

    #[tokio::test]
    async fn commands_after_the_end_are_terminal() {
        let (api, key) = backend().await;
        let any = SessionTarget::default();
        api.start(key, StartSessionRequest { starting_position: 1 })
            .await
            .unwrap();
        api.stop(key, any).await.unwrap();

        let err = api
            .advance_position(key, any, AdvancePositionRequest { position: 2 })
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::TerminalState(_)));
        assert!(err.is_terminal());
    }

    #[tokio::test]
    async fn error_bodies_map_to_client_errors() {
        let (api, key) = backend().await;
        let stranger = HttpApi::<Baseball>::new(&api.base_url, "stranger").unwrap();

        let err = stranger
            .request_ticket(key, ConnectionRole::Watcher)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Authorization(_)));

        let err = api.current_state(key).await.unwrap_err();
        assert!(matches!(err, ClientError::NotFound(_)));
    }

    #[tokio::test]
    async fn non_json_errors_are_transport_failures() {
        let app = Router::new().fallback(|| async { (StatusCode::BAD_GATEWAY, "upstream down") });
        let base_url = serve(app).await;
        let api = HttpApi::<Baseball>::new(&base_url, SCORER).unwrap();
        let key = SubjectKey {
            account_id: Uuid::new_v4(),
            subject_id: Uuid::new_v4(),
        };

        let err = api.current_state(key).await.unwrap_err();
        assert_eq!(err, ClientError::Transport("unexpected status 502 Bad Gateway".into()));
        assert!(!err.is_terminal());
    }
}
