use tokio::time::timeout;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dao::models::FinalScoresEntity,
    dto::{
        session::{
            AccountSessions, AdvancePositionRequest, SessionTarget, SnapshotOf,
            StartSessionRequest, SubmitScoreRequest,
        },
        sse::{PositionUpdate, ScoreUpdate, SessionEnded},
    },
    error::ServiceError,
    services::authorization,
    state::{
        SharedState,
        channel::{ConnectionId, ConnectionRole},
        session::{ScoreSubmission, SubjectKey},
        sport::Sport,
        store::{FinalizedOf, Started},
    },
};

/// Start the live session of `key`, or return the one already running.
///
/// A new session needs the subject to exist for this sport and to have no persisted final
/// scores.
pub async fn start<S: Sport>(
    state: &SharedState,
    identity: &str,
    key: SubjectKey,
    request: StartSessionRequest,
) -> Result<Started<S>, ServiceError> {
    authorization::require(state, identity, key, ConnectionRole::Scorer).await?;

    let sessions = state.sessions::<S>();
    if sessions.resolve(key, None).is_err() {
        let store = state.require_score_store().await?;

        let subject = store
            .find_subject(key.account_id, key.subject_id)
            .await?
            .filter(|subject| subject.sport == S::KIND)
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "{} `{}` not found",
                    S::KIND.route_segment(),
                    key.subject_id
                ))
            })?;

        if let Some(existing) = store
            .find_final_scores(key.account_id, key.subject_id)
            .await?
        {
            return Err(ServiceError::TerminalState(format!(
                "live session `{}` of `{}` was already finalized",
                existing.session_id, subject.name
            )));
        }
    }

    Ok(sessions
        .start(key, request.starting_position, identity)
        .await?)
}

/// Record a score in the subject's active session.
pub async fn submit_score<S: Sport>(
    state: &SharedState,
    identity: &str,
    key: SubjectKey,
    target: SessionTarget,
    request: SubmitScoreRequest<S::Participant>,
) -> Result<ScoreUpdate<S::Participant>, ServiceError> {
    authorization::require(state, identity, key, ConnectionRole::Scorer).await?;

    let sessions = state.sessions::<S>();
    let id = sessions.resolve(key, target.session_id)?;
    let submission = ScoreSubmission {
        position: request.position,
        participant: request.participant,
        value: request.value,
    };
    Ok(sessions.submit_score(id, submission, identity).await?)
}

/// Move the current inning or hole, forward or backward.
pub async fn advance_position<S: Sport>(
    state: &SharedState,
    identity: &str,
    key: SubjectKey,
    target: SessionTarget,
    request: AdvancePositionRequest,
) -> Result<PositionUpdate, ServiceError> {
    authorization::require(state, identity, key, ConnectionRole::Scorer).await?;

    let sessions = state.sessions::<S>();
    let id = sessions.resolve(key, target.session_id)?;
    Ok(sessions
        .advance_position(id, request.position, identity)
        .await?)
}

/// Persist the final scores and end the session.
///
/// The work runs on its own task so a dropped request cannot leave the transition pending.
/// When persistence fails or times out the session stays active and the call may be
/// retried.
pub async fn finalize<S: Sport>(
    state: &SharedState,
    identity: &str,
    key: SubjectKey,
    target: SessionTarget,
) -> Result<FinalizedOf<S>, ServiceError> {
    authorization::require(state, identity, key, ConnectionRole::Scorer).await?;
    let store = state.require_score_store().await?;
    let id = state.sessions::<S>().resolve(key, target.session_id)?;

    let task_state = state.clone();
    let actor = identity.to_string();
    let limit = state.config().live.persist_timeout;

    let task = tokio::spawn(async move {
        let finalized_by = actor.clone();
        let persist = move |snapshot: SnapshotOf<S>| async move {
            let record = FinalScoresEntity::from_snapshot(&snapshot, &finalized_by)
                .map_err(|err| ServiceError::Internal(format!("encode final scores: {err}")))?;
            match timeout(limit, store.persist_final_scores(record)).await {
                Ok(result) => result.map_err(ServiceError::from),
                Err(_) => Err(ServiceError::Timeout),
            }
        };

        task_state
            .sessions::<S>()
            .finalize(id, &actor, persist)
            .await
    });

    match task.await {
        Ok(Ok(finalized)) => Ok(finalized),
        Ok(Err(err)) => {
            warn!(session_id = %id, error = %err, "finalize rejected");
            Err(err)
        }
        Err(err) => Err(ServiceError::Internal(format!("finalize task failed: {err}"))),
    }
}

/// Discard the subject's active session.
pub async fn stop<S: Sport>(
    state: &SharedState,
    identity: &str,
    key: SubjectKey,
    target: SessionTarget,
) -> Result<SessionEnded, ServiceError> {
    authorization::require(state, identity, key, ConnectionRole::Scorer).await?;

    let sessions = state.sessions::<S>();
    let id = sessions.resolve(key, target.session_id)?;
    Ok(sessions.stop(id, identity).await?)
}

/// Current state of the subject's active session.
pub async fn current_state<S: Sport>(
    state: &SharedState,
    identity: &str,
    key: SubjectKey,
) -> Result<SnapshotOf<S>, ServiceError> {
    authorization::require(state, identity, key, ConnectionRole::Watcher).await?;
    Ok(state.sessions::<S>().current_state(key).await?)
}

/// Close one connection of the subject's active session.
pub async fn disconnect<S: Sport>(
    state: &SharedState,
    identity: &str,
    key: SubjectKey,
    connection: ConnectionId,
) -> Result<(), ServiceError> {
    authorization::require(state, identity, key, ConnectionRole::Scorer).await?;

    let sessions = state.sessions::<S>();
    let id = sessions.resolve(key, None)?;
    if sessions.disconnect(id, connection).await? {
        info!(session_id = %id, connection_id = %connection, identity, "connection closed by scorer");
        Ok(())
    } else {
        Err(ServiceError::NotFound(format!(
            "connection `{connection}` not found"
        )))
    }
}

/// Active sessions of an account across every sport.
pub async fn active_sessions(
    state: &SharedState,
    identity: &str,
    account_id: Uuid,
) -> Result<AccountSessions, ServiceError> {
    // Account-wide listing: no particular subject.
    let key = SubjectKey {
        account_id,
        subject_id: Uuid::nil(),
    };
    authorization::require(state, identity, key, ConnectionRole::Watcher).await?;

    let mut sessions = state.baseball_sessions().active_sessions(account_id).await;
    sessions.extend(state.golf_sessions().active_sessions(account_id).await);
    Ok(AccountSessions {
        account_id,
        sessions,
    })
}
