use std::convert::Infallible;

use axum::{
    Extension, Json, Router,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    middleware,
    response::sse::{Event, Sse},
    routing::{delete, get, post},
};
use axum_valid::{Valid, ValidRejection};
use futures::Stream;
use uuid::Uuid;

use crate::{
    dto::{
        session::{
            AdvancePositionRequest, SessionTarget, SnapshotOf, StartSessionRequest,
            StreamQuery, SubmitScoreRequest, TicketGrant, TicketRequest,
        },
        sse::{PositionUpdate, ScoreUpdate, SessionEnded},
    },
    error::AppError,
    routes::identity::{CallerIdentity, require_identity},
    services::{live_feed, session_service, ticket_service},
    state::{
        SharedState, channel::ConnectionId, session::SubjectKey, sport::Sport,
        store::FinalizedOf,
    },
};

type JsonBody<T> = Result<Valid<Json<T>>, ValidRejection<JsonRejection>>;

/// Base path of the live routes of sport `S`.
pub fn base_path<S: Sport>() -> String {
    format!(
        "/accounts/{{account_id}}/{}/{{subject_id}}/live",
        S::KIND.route_segment()
    )
}

/// Live scoring routes of one sport.
///
/// The stream endpoint authenticates with its ticket; every other route needs the caller
/// identity header.
pub fn router<S: Sport>() -> Router<SharedState> {
    let base = base_path::<S>();

    let commands = Router::new()
        .route(&base, get(current_state::<S>))
        .route(&format!("{base}/tickets"), post(issue_ticket::<S>))
        .route(&format!("{base}/start"), post(start_session::<S>))
        .route(&format!("{base}/scores"), post(submit_score::<S>))
        .route(&format!("{base}/position"), post(advance_position::<S>))
        .route(&format!("{base}/finalize"), post(finalize_session::<S>))
        .route(&format!("{base}/stop"), post(stop_session::<S>))
        .route(
            &format!("{base}/connections/{{connection_id}}"),
            delete(disconnect::<S>),
        )
        .route_layer(middleware::from_fn(require_identity));

    Router::new()
        .route(&format!("{base}/stream"), get(stream::<S>))
        .merge(commands)
}

fn subject_key((account_id, subject_id): (Uuid, Uuid)) -> SubjectKey {
    SubjectKey {
        account_id,
        subject_id,
    }
}

/// Issue a one-time ticket for the live stream.
async fn issue_ticket<S: Sport>(
    State(state): State<SharedState>,
    Extension(CallerIdentity(identity)): Extension<CallerIdentity>,
    Path(path): Path<(Uuid, Uuid)>,
    body: JsonBody<TicketRequest>,
) -> Result<(StatusCode, Json<TicketGrant>), AppError> {
    let Valid(Json(request)) = body?;
    let grant =
        ticket_service::issue_ticket::<S>(&state, &identity, subject_key(path), request.role)
            .await?;
    Ok((StatusCode::CREATED, Json(grant)))
}

/// Open the live event stream with a ticket.
async fn stream<S: Sport>(
    State(state): State<SharedState>,
    Path(path): Path<(Uuid, Uuid)>,
    query: Result<Query<StreamQuery>, QueryRejection>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let Query(query) = query?;
    Ok(live_feed::open_stream::<S>(
        &state,
        subject_key(path),
        &query.ticket,
        query.await_start,
    )?)
}

/// Current state of the subject's active session.
async fn current_state<S: Sport>(
    State(state): State<SharedState>,
    Extension(CallerIdentity(identity)): Extension<CallerIdentity>,
    Path(path): Path<(Uuid, Uuid)>,
) -> Result<Json<SnapshotOf<S>>, AppError> {
    let snapshot = session_service::current_state::<S>(&state, &identity, subject_key(path)).await?;
    Ok(Json(snapshot))
}

/// Start a session; answers `201` when it was created and `200` when it already ran.
async fn start_session<S: Sport>(
    State(state): State<SharedState>,
    Extension(CallerIdentity(identity)): Extension<CallerIdentity>,
    Path(path): Path<(Uuid, Uuid)>,
    body: JsonBody<StartSessionRequest>,
) -> Result<(StatusCode, Json<SnapshotOf<S>>), AppError> {
    let Valid(Json(request)) = body?;
    let started =
        session_service::start::<S>(&state, &identity, subject_key(path), request).await?;
    let status = if started.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(started.snapshot)))
}

async fn submit_score<S: Sport>(
    State(state): State<SharedState>,
    Extension(CallerIdentity(identity)): Extension<CallerIdentity>,
    Path(path): Path<(Uuid, Uuid)>,
    target: Result<Query<SessionTarget>, QueryRejection>,
    body: JsonBody<SubmitScoreRequest<S::Participant>>,
) -> Result<Json<ScoreUpdate<S::Participant>>, AppError> {
    let Query(target) = target?;
    let Valid(Json(request)) = body?;
    let update =
        session_service::submit_score::<S>(&state, &identity, subject_key(path), target, request)
            .await?;
    Ok(Json(update))
}

async fn advance_position<S: Sport>(
    State(state): State<SharedState>,
    Extension(CallerIdentity(identity)): Extension<CallerIdentity>,
    Path(path): Path<(Uuid, Uuid)>,
    target: Result<Query<SessionTarget>, QueryRejection>,
    body: JsonBody<AdvancePositionRequest>,
) -> Result<Json<PositionUpdate>, AppError> {
    let Query(target) = target?;
    let Valid(Json(request)) = body?;
    let update = session_service::advance_position::<S>(
        &state,
        &identity,
        subject_key(path),
        target,
        request,
    )
    .await?;
    Ok(Json(update))
}

async fn finalize_session<S: Sport>(
    State(state): State<SharedState>,
    Extension(CallerIdentity(identity)): Extension<CallerIdentity>,
    Path(path): Path<(Uuid, Uuid)>,
    target: Result<Query<SessionTarget>, QueryRejection>,
) -> Result<Json<FinalizedOf<S>>, AppError> {
    let Query(target) = target?;
    let finalized =
        session_service::finalize::<S>(&state, &identity, subject_key(path), target).await?;
    Ok(Json(finalized))
}

async fn stop_session<S: Sport>(
    State(state): State<SharedState>,
    Extension(CallerIdentity(identity)): Extension<CallerIdentity>,
    Path(path): Path<(Uuid, Uuid)>,
    target: Result<Query<SessionTarget>, QueryRejection>,
) -> Result<Json<SessionEnded>, AppError> {
    let Query(target) = target?;
    let ended = session_service::stop::<S>(&state, &identity, subject_key(path), target).await?;
    Ok(Json(ended))
}

/// Close one connection of the active session.
async fn disconnect<S: Sport>(
    State(state): State<SharedState>,
    Extension(CallerIdentity(identity)): Extension<CallerIdentity>,
    Path((account_id, subject_id, connection_id)): Path<(Uuid, Uuid, ConnectionId)>,
) -> Result<StatusCode, AppError> {
    let key = subject_key((account_id, subject_id));
    session_service::disconnect::<S>(&state, &identity, key, connection_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
