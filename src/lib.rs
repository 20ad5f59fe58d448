//! Gatehouse - credential-based session authentication service.
//!
//! Issues short-lived access tokens and rotating refresh tokens, keeps
//! refresh tokens hashed at rest, and guards the refresh endpoint with
//! per-user CSRF tokens.

pub mod auth;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod web;

pub use auth::{
    hash_password, validate_password, verify_password, Claims, ClientMeta, CsrfTokenManager,
    EstablishedSession, PasswordError, RefreshTokenStore, RotatedSession, SessionError,
    SessionService, SessionUser, TokenError, TokenSigner,
};
pub use clock::{Clock, SystemClock};
pub use config::Config;
pub use db::{Database, NewUser, User, UserRepository};
pub use error::{GatehouseError, Result};
pub use web::WebServer;
