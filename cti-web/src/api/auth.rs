//! Authentication middleware for cti-web
//!
//! Protected routes require the `X-CTI-Auth` header to match the shared
//! secret stored in the settings table. Secret 0 disables auth checking
//! (single-analyst localhost deployments).

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use cti_common::auth::{validate_secret, ApiAuthError, AUTH_HEADER};
use tracing::warn;

use crate::error::ApiError;
use crate::AppState;

/// Authentication middleware for protected routes
///
/// Health and static routes do NOT use this middleware.
pub async fn auth_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let presented = request
        .headers()
        .get(AUTH_HEADER)
        .and_then(|value| value.to_str().ok());

    validate_secret(presented, state.shared_secret).map_err(|e| {
        match &e {
            ApiAuthError::InvalidSecret => {
                warn!("Auth rejected: invalid shared secret presented");
            }
            ApiAuthError::MissingHeader => {
                warn!("Auth rejected: missing {} header", AUTH_HEADER);
            }
            ApiAuthError::DatabaseError(err) => {
                warn!("Auth rejected: {}", err);
            }
        }
        ApiError::Unauthorized(e.to_string())
    })?;

    Ok(next.run(request).await)
}
