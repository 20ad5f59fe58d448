//! Middleware for the web API.

pub mod auth;
pub mod cors;
pub mod csrf;

pub use auth::{inject_signer, AuthUser};
pub use cors::create_cors_layer;
pub use csrf::{verify_refresh_csrf, CSRF_HEADER};
