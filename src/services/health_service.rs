use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Report degraded mode and live activity while logging connectivity issues.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    match state.require_score_store().await {
        Ok(store) => {
            if let Err(err) = store.health_check().await {
                warn!(error = %err, "storage health check failed");
            }
        }
        Err(_) => warn!("storage unavailable (degraded mode)"),
    }

    let active = state.baseball_sessions().active_count() + state.golf_sessions().active_count();
    let tickets = state.tickets().len();
    if state.is_degraded() {
        HealthResponse::degraded(active, tickets)
    } else {
        HealthResponse::ok(active, tickets)
    }
}
