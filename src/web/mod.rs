//! Web API: routing, handlers, middleware, and the server itself.

pub mod dto;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod server;

pub use error::{ApiError, ErrorCode};
pub use router::{create_health_router, create_router};
pub use server::{build_state, WebServer};
