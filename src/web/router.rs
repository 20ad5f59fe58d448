//! Router configuration for the web API.

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use super::handlers::{login, logout, me, refresh, signup, AppState};
use super::middleware::{create_cors_layer, inject_signer, verify_refresh_csrf};

/// Create the main API router.
pub fn create_router(state: Arc<AppState>, cors_origins: &[String]) -> Router {
    // Refresh carries the CSRF guard; the other routes do not
    let refresh_routes = Router::new()
        .route("/refresh", post(refresh))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            verify_refresh_csrf,
        ));

    let auth_routes = Router::new()
        .route("/signup", post(signup))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/me", get(me))
        .merge(refresh_routes);

    let api_routes = Router::new().nest("/auth", auth_routes);

    // Clone the signer for the middleware closure
    let signer = state.sessions.signer().clone();

    Router::new()
        .nest("/api", api_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(create_cors_layer(cors_origins))
                .layer(middleware::from_fn(move |req, next| {
                    let signer = signer.clone();
                    inject_signer(signer, req, next)
                })),
        )
        .with_state(state)
}

/// Create a health check router.
pub fn create_health_router() -> Router {
    Router::new().route("/health", get(health_check))
}

/// Health check handler.
async fn health_check() -> &'static str {
    "OK"
}
