mod common;

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicU32, Ordering},
    },
    time::Duration,
};

use futures::{FutureExt, StreamExt, future::BoxFuture};
use live_scoring_back::{
    client::{
        ClientResult, ConnectionState, ControllerConfig, EventStream, InProcessApi, LiveApi,
        LiveSessionController,
    },
    dto::{
        session::{
            AccountSessions, AdvancePositionRequest, SessionTarget, SnapshotOf,
            StartSessionRequest, SubmitScoreRequest, TicketGrant,
        },
        sse::{PositionUpdate, ScoreUpdate, SessionEnded},
    },
    state::{
        channel::ConnectionRole,
        session::SubjectKey,
        sport::{Baseball, TeamSide},
        store::FinalizedOf,
    },
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use common::{FAN, SCORER_A, eventually, harness};

/// In-process transport whose open channel can be cut on demand.
struct Flaky {
    inner: InProcessApi<Baseball>,
    current: Mutex<CancellationToken>,
    tickets: AtomicU32,
}

impl Flaky {
    fn new(inner: InProcessApi<Baseball>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            current: Mutex::new(CancellationToken::new()),
            tickets: AtomicU32::new(0),
        })
    }

    fn cut(&self) {
        self.current.lock().unwrap().cancel();
    }
}

impl LiveApi<Baseball> for Flaky {
    fn request_ticket(
        &self,
        key: SubjectKey,
        role: ConnectionRole,
    ) -> BoxFuture<'_, ClientResult<TicketGrant>> {
        self.tickets.fetch_add(1, Ordering::SeqCst);
        self.inner.request_ticket(key, role)
    }

    fn open_channel(
        &self,
        key: SubjectKey,
        grant: TicketGrant,
        await_start: bool,
    ) -> BoxFuture<'_, ClientResult<EventStream>> {
        let token = CancellationToken::new();
        *self.current.lock().unwrap() = token.clone();
        async move {
            let stream = self.inner.open_channel(key, grant, await_start).await?;
            Ok(stream.take_until(token.cancelled_owned()).boxed())
        }
        .boxed()
    }

    fn start(
        &self,
        key: SubjectKey,
        request: StartSessionRequest,
    ) -> BoxFuture<'_, ClientResult<SnapshotOf<Baseball>>> {
        self.inner.start(key, request)
    }

    fn submit_score(
        &self,
        key: SubjectKey,
        target: SessionTarget,
        request: SubmitScoreRequest<TeamSide>,
    ) -> BoxFuture<'_, ClientResult<ScoreUpdate<TeamSide>>> {
        self.inner.submit_score(key, target, request)
    }

    fn advance_position(
        &self,
        key: SubjectKey,
        target: SessionTarget,
        request: AdvancePositionRequest,
    ) -> BoxFuture<'_, ClientResult<PositionUpdate>> {
        self.inner.advance_position(key, target, request)
    }

    fn finalize(
        &self,
        key: SubjectKey,
        target: SessionTarget,
    ) -> BoxFuture<'_, ClientResult<FinalizedOf<Baseball>>> {
        self.inner.finalize(key, target)
    }

    fn stop(
        &self,
        key: SubjectKey,
        target: SessionTarget,
    ) -> BoxFuture<'_, ClientResult<SessionEnded>> {
        self.inner.stop(key, target)
    }

    fn current_state(&self, key: SubjectKey) -> BoxFuture<'_, ClientResult<SnapshotOf<Baseball>>> {
        self.inner.current_state(key)
    }

    fn active_sessions(&self, account_id: Uuid) -> BoxFuture<'_, ClientResult<AccountSessions>> {
        self.inner.active_sessions(account_id)
    }
}

fn quick_reconnects() -> ControllerConfig {
    ControllerConfig {
        backoff_base: Duration::from_millis(100),
        backoff_max: Duration::from_millis(400),
        jitter: false,
        await_start: true,
        ..ControllerConfig::default()
    }
}

#[tokio::test]
async fn dropped_stream_reconnects_with_a_fresh_ticket_and_snapshot() {
    let h = harness().await;
    let scorer = LiveSessionController::<Baseball>::new(
        Arc::new(InProcessApi::<Baseball>::new(h.state.clone(), SCORER_A)),
        quick_reconnects(),
    );
    scorer.connect(h.game, ConnectionRole::Scorer).await;
    scorer.start(1).await.unwrap();

    let flaky = Flaky::new(InProcessApi::new(h.state.clone(), FAN));
    let watcher = LiveSessionController::<Baseball>::new(flaky.clone(), quick_reconnects());
    let states = Arc::new(Mutex::new(Vec::new()));
    let _state_listener = {
        let states = states.clone();
        watcher
            .listeners()
            .on_connection_changed(move |change| states.lock().unwrap().push(change.state))
    };
    watcher.connect(h.game, ConnectionRole::Watcher).await;
    eventually("watcher snapshot", || watcher.session().is_some()).await;
    eventually("scorer sees the watcher", || {
        scorer
            .session()
            .is_some_and(|snapshot| snapshot.viewer_count == 1)
    })
    .await;

    let viewer_counts = Arc::new(Mutex::new(Vec::new()));
    let _count_listener = {
        let viewer_counts = viewer_counts.clone();
        scorer
            .listeners()
            .on_counts_changed(move |counts| viewer_counts.lock().unwrap().push(counts.viewer_count))
    };

    scorer.submit_score(1, TeamSide::Home, 3).await.unwrap();
    eventually("watcher applies the score", || {
        watcher
            .session()
            .is_some_and(|snapshot| snapshot.aggregates.home_total == 3)
    })
    .await;

    flaky.cut();
    eventually("watcher back online", || {
        let states = states.lock().unwrap();
        states.contains(&ConnectionState::Reconnecting)
            && states.last() == Some(&ConnectionState::Connected)
    })
    .await;
    eventually("viewer count dropped then restored", || {
        let counts = viewer_counts.lock().unwrap();
        counts
            .iter()
            .position(|count| *count == 0)
            .is_some_and(|dropped| counts[dropped + 1..].contains(&1))
    })
    .await;

    assert_eq!(flaky.tickets.load(Ordering::SeqCst), 2);
    assert_eq!(watcher.state(), ConnectionState::Connected);
    eventually("fresh snapshot", || {
        watcher.session().is_some_and(|snapshot| {
            snapshot.aggregates.home_total == 3 && snapshot.viewer_count == 1
        })
    })
    .await;
    let snapshot = watcher.session().unwrap();
    assert_eq!(snapshot.entries.len(), 1);
    assert_eq!(snapshot.entries[0].submitted_by, SCORER_A);

    watcher.disconnect().await;
    scorer.disconnect().await;
}

#[tokio::test]
async fn explicit_disconnect_leaves_immediately() {
    let h = harness().await;
    let scorer = LiveSessionController::<Baseball>::new(
        Arc::new(InProcessApi::<Baseball>::new(h.state.clone(), SCORER_A)),
        quick_reconnects(),
    );
    scorer.connect(h.game, ConnectionRole::Scorer).await;
    scorer.start(1).await.unwrap();

    let watcher = LiveSessionController::<Baseball>::new(
        Arc::new(InProcessApi::<Baseball>::new(h.state.clone(), FAN)),
        quick_reconnects(),
    );
    watcher.connect(h.game, ConnectionRole::Watcher).await;
    eventually("watcher counted", || {
        scorer
            .session()
            .is_some_and(|snapshot| snapshot.viewer_count == 1)
    })
    .await;

    watcher.disconnect().await;
    assert_eq!(watcher.state(), ConnectionState::Closed);
    eventually("watcher gone", || {
        scorer
            .session()
            .is_some_and(|snapshot| snapshot.viewer_count == 0)
    })
    .await;

    scorer.disconnect().await;
}
