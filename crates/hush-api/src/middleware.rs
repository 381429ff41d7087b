use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};

use crate::error::{ApiError, INVALID_TOKEN};
use crate::state::AppState;

/// Extract and validate the bearer access token; the claims are handed to
/// handlers as `Extension<Claims>`.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthorized(INVALID_TOKEN))?;

    let claims = state.tokens.verify_access(token)?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}
