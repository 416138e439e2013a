use axum::{
    Extension, Json, Router,
    extract::{Path, State},
    middleware,
    routing::get,
};
use uuid::Uuid;

use crate::{
    dto::session::AccountSessions,
    error::AppError,
    routes::identity::{CallerIdentity, require_identity},
    services::session_service,
    state::SharedState,
};

/// Account-wide live routes.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/accounts/{account_id}/live/sessions", get(active_sessions))
        .route_layer(middleware::from_fn(require_identity))
}

/// List the active live sessions of an account, every sport included.
#[utoipa::path(
    get,
    path = "/accounts/{account_id}/live/sessions",
    tag = "live",
    params(
        ("x-user-id" = String, Header, description = "Authenticated caller"),
        ("account_id" = Uuid, Path, description = "Account owning the sessions")
    ),
    responses(
        (status = 200, description = "Active sessions", body = AccountSessions),
        (status = 401, description = "Missing caller identity", body = crate::error::ErrorBody),
        (status = 403, description = "Caller may not watch this account", body = crate::error::ErrorBody)
    )
)]
pub async fn active_sessions(
    State(state): State<SharedState>,
    Extension(CallerIdentity(identity)): Extension<CallerIdentity>,
    Path(account_id): Path<Uuid>,
) -> Result<Json<AccountSessions>, AppError> {
    Ok(Json(
        session_service::active_sessions(&state, &identity, account_id).await?,
    ))
}
