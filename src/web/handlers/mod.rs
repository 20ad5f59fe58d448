//! Request handlers for the web API.

pub mod auth;

pub use auth::{login, logout, me, refresh, signup, AppState, CookieSettings};
