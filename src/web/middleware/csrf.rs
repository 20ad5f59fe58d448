//! CSRF guard for the refresh endpoint.
//!
//! The refresh cookie is sent automatically by browsers, so the refresh
//! endpoint additionally requires an `x-csrf-token` header matching the
//! token issued to the session's user. The guard identifies the user from
//! the refresh cookie's verified claims before consulting the CSRF store.

use axum::{
    body::Body,
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use std::sync::Arc;
use tracing::debug;

use crate::web::error::ApiError;
use crate::web::handlers::AppState;

/// Header carrying the CSRF token.
pub const CSRF_HEADER: &str = "x-csrf-token";

/// Reject refresh requests without a matching CSRF token.
///
/// Missing or unverifiable refresh cookie is 401; the request cannot be
/// tied to a session at all. Missing or mismatched CSRF token is 403.
pub async fn verify_refresh_csrf(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    request: Request<Body>,
    next: Next,
) -> Response {
    let Some(cookie) = jar.get(state.cookie.name()) else {
        return ApiError::unauthorized("Missing refresh token").into_response();
    };

    let claims = match state.sessions.signer().verify(cookie.value()) {
        Ok(claims) => claims,
        Err(_) => {
            return ApiError::unauthorized("Invalid or expired refresh token").into_response()
        }
    };

    let Some(presented) = request
        .headers()
        .get(CSRF_HEADER)
        .and_then(|value| value.to_str().ok())
    else {
        debug!(user_id = claims.sub, "Refresh request without CSRF header");
        return ApiError::forbidden("Missing CSRF token").into_response();
    };

    if !state
        .sessions
        .csrf()
        .validate(&claims.sub.to_string(), presented)
    {
        debug!(user_id = claims.sub, "Refresh request with invalid CSRF token");
        return ApiError::forbidden("Invalid CSRF token").into_response();
    }

    next.run(request).await
}
