use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI document for the live scoring backend.
///
/// The per-sport live routes are generic over the sport and are described by their
/// request, response and event schemas.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::accounts::active_sessions,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::session::AccountSessions,
            crate::dto::session::ActiveSessionSummary,
            crate::dto::session::StartSessionRequest,
            crate::dto::session::AdvancePositionRequest,
            crate::dto::session::TicketRequest,
            crate::dto::session::TicketGrant,
            crate::dto::sse::ConnectedEvent,
            crate::dto::sse::PositionUpdate,
            crate::dto::sse::SessionStartedEvent,
            crate::dto::sse::SessionEnded,
            crate::dto::sse::CountEvent,
            crate::dto::sse::PingEvent,
            crate::dto::sse::NoSessionEvent,
            crate::state::channel::ConnectionRole,
            crate::state::sport::SportKind,
            crate::state::sport::TeamSide,
            crate::state::sport::BaseballTotals,
            crate::state::sport::GolfTotals,
            crate::state::sport::GolferTotal,
            crate::state::state_machine::SessionStatus,
            crate::error::ErrorBody,
            crate::error::ErrorCode,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "live", description = "Live scoring sessions and streams"),
    )
)]
pub struct ApiDoc;
