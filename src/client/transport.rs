use futures::{future::BoxFuture, stream::BoxStream};
use uuid::Uuid;

use crate::{
    client::error::ClientResult,
    dto::{
        session::{
            AccountSessions, AdvancePositionRequest, SessionTarget, SnapshotOf,
            StartSessionRequest, SubmitScoreRequest, TicketGrant,
        },
        sse::{PositionUpdate, ScoreUpdate, ServerEvent, SessionEnded},
    },
    state::{channel::ConnectionRole, session::SubjectKey, sport::Sport, store::FinalizedOf},
};

/// Raw named events of one open live channel. Ends when the server closes the stream.
pub type EventStream = BoxStream<'static, ClientResult<ServerEvent>>;

/// Operations a session controller needs from the live scoring backend.
///
/// Every call acts on behalf of the identity the implementation was built with.
pub trait LiveApi<S: Sport>: Send + Sync + 'static {
    /// Ask for a one-time stream ticket.
    fn request_ticket(
        &self,
        key: SubjectKey,
        role: ConnectionRole,
    ) -> BoxFuture<'_, ClientResult<TicketGrant>>;

    /// Redeem a ticket and open the event stream.
    ///
    /// Without a live session the stream ends after `no_session`, unless `await_start` keeps
    /// it open until the session starts.
    fn open_channel(
        &self,
        key: SubjectKey,
        grant: TicketGrant,
        await_start: bool,
    ) -> BoxFuture<'_, ClientResult<EventStream>>;

    /// Start the subject's session, or join the one already running.
    fn start(
        &self,
        key: SubjectKey,
        request: StartSessionRequest,
    ) -> BoxFuture<'_, ClientResult<SnapshotOf<S>>>;

    fn submit_score(
        &self,
        key: SubjectKey,
        target: SessionTarget,
        request: SubmitScoreRequest<S::Participant>,
    ) -> BoxFuture<'_, ClientResult<ScoreUpdate<S::Participant>>>;

    fn advance_position(
        &self,
        key: SubjectKey,
        target: SessionTarget,
        request: AdvancePositionRequest,
    ) -> BoxFuture<'_, ClientResult<PositionUpdate>>;

    fn finalize(
        &self,
        key: SubjectKey,
        target: SessionTarget,
    ) -> BoxFuture<'_, ClientResult<FinalizedOf<S>>>;

    fn stop(&self, key: SubjectKey, target: SessionTarget)
    -> BoxFuture<'_, ClientResult<SessionEnded>>;

    fn current_state(&self, key: SubjectKey) -> BoxFuture<'_, ClientResult<SnapshotOf<S>>>;

    /// Active sessions of an account across sports.
    fn active_sessions(&self, account_id: Uuid) -> BoxFuture<'_, ClientResult<AccountSessions>>;
}
