//! Response DTOs for the web API.

use serde::Serialize;

use crate::auth::SessionUser;

/// Generic API response wrapper.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    /// Response payload.
    pub data: T,
}

impl<T> ApiResponse<T> {
    /// Wrap a payload.
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

/// User information included in session responses.
#[derive(Debug, Serialize)]
pub struct UserInfo {
    /// User ID.
    pub id: i64,
    /// Email address.
    pub email: String,
    /// Display name.
    pub name: String,
}

impl From<SessionUser> for UserInfo {
    fn from(user: SessionUser) -> Self {
        Self {
            id: user.id,
            email: user.email,
            name: user.name,
        }
    }
}

/// Session response for signup and login.
///
/// The refresh token is never in the body; it travels only in the
/// HTTP-only cookie.
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    /// Access token for the Authorization header.
    pub access_token: String,
    /// CSRF token the client must echo on refresh.
    pub csrf_token: String,
    /// Access token lifetime in seconds.
    pub expires_in: u64,
    /// The authenticated user.
    pub user: UserInfo,
}

/// Token refresh response.
#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    /// New access token.
    pub access_token: String,
    /// Rotated CSRF token.
    pub csrf_token: String,
    /// Access token lifetime in seconds.
    pub expires_in: u64,
}

/// Current user response.
#[derive(Debug, Serialize)]
pub struct MeResponse {
    /// User ID.
    pub id: i64,
    /// Email address.
    pub email: String,
    /// Display name.
    pub name: String,
}
