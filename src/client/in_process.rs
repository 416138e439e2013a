use std::marker::PhantomData;

use futures::{FutureExt, StreamExt, future::BoxFuture};
use tokio_stream::wrappers::ReceiverStream;
use uuid::Uuid;

use crate::{
    client::{
        error::{ClientError, ClientResult},
        transport::{EventStream, LiveApi},
    },
    dto::{
        session::{
            AccountSessions, AdvancePositionRequest, SessionTarget, SnapshotOf,
            StartSessionRequest, SubmitScoreRequest, TicketGrant,
        },
        sse::{PositionUpdate, ScoreUpdate, SessionEnded},
    },
    services::{live_feed, session_service, ticket_service},
    state::{
        SharedState, channel::ConnectionRole, session::SubjectKey, sport::Sport,
        store::FinalizedOf,
    },
};

/// Live API served by the service layer of a backend running in the same process.
pub struct InProcessApi<S> {
    state: SharedState,
    identity: String,
    _sport: PhantomData<fn() -> S>,
}

impl<S: Sport> InProcessApi<S> {
    /// Act as `identity` against `state`.
    pub fn new(state: SharedState, identity: impl Into<String>) -> Self {
        Self {
            state,
            identity: identity.into(),
            _sport: PhantomData,
        }
    }

    /// Identity the calls are made with.
    pub fn identity(&self) -> &str {
        &self.identity
    }
}

impl<S: Sport> Clone for InProcessApi<S> {
    fn clone(&self) -> Self {
        Self::new(self.state.clone(), self.identity.clone())
    }
}

impl<S: Sport> LiveApi<S> for InProcessApi<S> {
    fn request_ticket(
        &self,
        key: SubjectKey,
        role: ConnectionRole,
    ) -> BoxFuture<'_, ClientResult<TicketGrant>> {
        async move {
            Ok(ticket_service::issue_ticket::<S>(&self.state, &self.identity, key, role).await?)
        }
        .boxed()
    }

    fn open_channel(
        &self,
        key: SubjectKey,
        grant: TicketGrant,
        await_start: bool,
    ) -> BoxFuture<'_, ClientResult<EventStream>> {
        async move {
            let ticket = self
                .state
                .tickets()
                .redeem(&grant.ticket, S::KIND, key)
                .map_err(|err| ClientError::TicketRejected(err.to_string()))?;
            let receiver = live_feed::spawn_feed::<S>(self.state.clone(), ticket, await_start);
            Ok(ReceiverStream::new(receiver).map(Ok).boxed())
        }
        .boxed()
    }

    fn start(
        &self,
        key: SubjectKey,
        request: StartSessionRequest,
    ) -> BoxFuture<'_, ClientResult<SnapshotOf<S>>> {
        async move {
            let started =
                session_service::start::<S>(&self.state, &self.identity, key, request).await?;
            Ok(started.snapshot)
        }
        .boxed()
    }

    fn submit_score(
        &self,
        key: SubjectKey,
        target: SessionTarget,
        request: SubmitScoreRequest<S::Participant>,
    ) -> BoxFuture<'_, ClientResult<ScoreUpdate<S::Participant>>> {
        async move {
            Ok(
                session_service::submit_score::<S>(&self.state, &self.identity, key, target, request)
                    .await?,
            )
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
            Ok(session_service::advance_position::<S>(
                &self.state,
                &self.identity,
                key,
                target,
                request,
            )
            .await?)
        }
        .boxed()
    }

    fn finalize(
        &self,
        key: SubjectKey,
        target: SessionTarget,
    ) -> BoxFuture<'_, ClientResult<FinalizedOf<S>>> {
        async move {
            Ok(session_service::finalize::<S>(&self.state, &self.identity, key, target).await?)
        }
        .boxed()
    }

    fn stop(
        &self,
        key: SubjectKey,
        target: SessionTarget,
    ) -> BoxFuture<'_, ClientResult<SessionEnded>> {
        async move { Ok(session_service::stop::<S>(&self.state, &self.identity, key, target).await?) }
            .boxed()
    }

    fn current_state(&self, key: SubjectKey) -> BoxFuture<'_, ClientResult<SnapshotOf<S>>> {
        async move {
            Ok(session_service::current_state::<S>(&self.state, &self.identity, key).await?)
        }
        .boxed()
    }

    fn active_sessions(&self, account_id: Uuid) -> BoxFuture<'_, ClientResult<AccountSessions>> {
        async move {
            Ok(session_service::active_sessions(&self.state, &self.identity, account_id).await?)
        }
        .boxed()
    }
}
