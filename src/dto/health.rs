use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Health response returned by the `/healthcheck` route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// Health status ("ok" or "degraded").
    pub status: String,
    /// Live sessions currently running, all sports included.
    pub active_sessions: usize,
    /// Stream tickets issued and not yet redeemed.
    pub pending_tickets: usize,
}

impl HealthResponse {
    /// Create a health response indicating the system is operational.
    pub fn ok(active_sessions: usize, pending_tickets: usize) -> Self {
        Self {
            status: "ok".to_string(),
            active_sessions,
            pending_tickets,
        }
    }

    /// Create a health response indicating the system is in degraded mode.
    pub fn degraded(active_sessions: usize, pending_tickets: usize) -> Self {
        Self {
            status: "degraded".to_string(),
            active_sessions,
            pending_tickets,
        }
    }
}
