use axum::{extract::Request, middleware::Next, response::Response};

use crate::error::AppError;

/// Header carrying the authenticated caller, set by the gateway in front of the service.
pub const IDENTITY_HEADER: &str = "x-user-id";

/// Caller identity attached to the request by [`require_identity`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity(pub String);

/// Reject requests that do not name their caller.
pub async fn require_identity(mut request: Request, next: Next) -> Result<Response, AppError> {
    let identity = request
        .headers()
        .get(IDENTITY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .ok_or_else(|| AppError::Unauthorized(format!("missing `{IDENTITY_HEADER}` header")))?;

    request.extensions_mut().insert(CallerIdentity(identity));
    Ok(next.run(request).await)
}
