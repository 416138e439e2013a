use tracing::info;

use crate::{
    dto::session::TicketGrant,
    error::ServiceError,
    services::authorization,
    state::{SharedState, channel::ConnectionRole, session::SubjectKey, sport::Sport},
};

/// Issue a single-use ticket for the live stream of `key`.
///
/// Tickets are bound to the sport, the subject, the role and the caller. Issuing does not
/// require a session to be active: watchers may connect early and wait for the start.
pub async fn issue_ticket<S: Sport>(
    state: &SharedState,
    identity: &str,
    key: SubjectKey,
    role: ConnectionRole,
) -> Result<TicketGrant, ServiceError> {
    state.require_score_store().await?;
    authorization::require(state, identity, key, role).await?;

    let ticket = state.tickets().issue(key, S::KIND, role, identity);
    info!(
        subject_id = %key.subject_id,
        role = ?role,
        identity,
        "live ticket issued"
    );

    Ok(TicketGrant {
        stream_path: stream_path(S::KIND.route_segment(), key, &ticket.token),
        ticket: ticket.token,
        role: ticket.role,
        expires_at: ticket.expires_at,
    })
}

fn stream_path(segment: &str, key: SubjectKey, token: &str) -> String {
    format!(
        "/accounts/{}/{}/{}/live/stream?ticket={}",
        key.account_id, segment, key.subject_id, token
    )
}
