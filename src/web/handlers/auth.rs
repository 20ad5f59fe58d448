//! Authentication handlers.

use axum::{
    extract::State,
    http::{header::USER_AGENT, HeaderMap, StatusCode},
    Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use std::sync::Arc;
use validator::Validate;

use crate::auth::{ClientMeta, SessionService};
use crate::clock::Clock;
use crate::config::AuthConfig;
use crate::web::dto::{
    ApiResponse, LoginRequest, MeResponse, RefreshResponse, SessionResponse, SignupRequest,
};
use crate::web::error::ApiError;
use crate::web::middleware::AuthUser;

/// Refresh cookie attributes, built once from configuration.
#[derive(Clone)]
pub struct CookieSettings {
    name: String,
    path: String,
    secure: bool,
    same_site: SameSite,
}

impl CookieSettings {
    /// Derive cookie settings from the auth configuration.
    pub fn from_config(auth: &AuthConfig) -> Self {
        let same_site = match auth.cookie_same_site.as_str() {
            "lax" => SameSite::Lax,
            "none" => SameSite::None,
            _ => SameSite::Strict,
        };

        Self {
            name: auth.cookie_name.clone(),
            path: auth.cookie_path.clone(),
            secure: auth.cookie_secure,
            same_site,
        }
    }

    /// Name of the refresh cookie.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Build the HTTP-only refresh cookie.
    ///
    /// Scoped to the auth path so browsers only attach it to auth
    /// endpoints, never to general API traffic.
    pub fn refresh_cookie(&self, token: &str, max_age_secs: i64) -> Cookie<'static> {
        Cookie::build((self.name.clone(), token.to_string()))
            .http_only(true)
            .secure(self.secure)
            .same_site(self.same_site)
            .path(self.path.clone())
            .max_age(time::Duration::seconds(max_age_secs))
            .build()
    }

    /// Build an expired cookie that clears the refresh token.
    pub fn clear_cookie(&self) -> Cookie<'static> {
        Cookie::build((self.name.clone(), String::new()))
            .http_only(true)
            .secure(self.secure)
            .same_site(self.same_site)
            .path(self.path.clone())
            .max_age(time::Duration::ZERO)
            .build()
    }
}

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Session lifecycle controller.
    pub sessions: SessionService,
    /// Refresh cookie settings.
    pub cookie: CookieSettings,
    clock: Arc<dyn Clock>,
}

impl AppState {
    /// Create a new application state.
    pub fn new(sessions: SessionService, cookie: CookieSettings, clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions,
            cookie,
            clock,
        }
    }

    /// Build a refresh cookie whose Max-Age tracks the token's own expiry.
    ///
    /// The cookie then disappears from the browser at the same moment the
    /// token inside it stops verifying.
    fn refresh_cookie_for(&self, token: &str) -> Cookie<'static> {
        let max_age = self
            .sessions
            .signer()
            .decoded_expiry(token)
            .map(|expiry| (expiry - self.clock.now()).num_seconds())
            .unwrap_or_else(|| self.sessions.signer().refresh_ttl().num_seconds());

        self.cookie.refresh_cookie(token, max_age.max(0))
    }

    fn access_expires_in(&self) -> u64 {
        self.sessions.signer().access_ttl().num_seconds().max(0) as u64
    }
}

/// Pull request metadata for refresh token records.
fn client_meta(headers: &HeaderMap) -> ClientMeta {
    let user_agent = headers
        .get(USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .map(|s| s.to_string());

    // Behind a proxy the first hop in x-forwarded-for is the client
    let ip = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|list| list.split(',').next())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    ClientMeta { user_agent, ip }
}

/// POST /api/auth/signup - Register a new account.
pub async fn signup(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    headers: HeaderMap,
    Json(req): Json<SignupRequest>,
) -> Result<(StatusCode, CookieJar, Json<ApiResponse<SessionResponse>>), ApiError> {
    req.validate().map_err(ApiError::from_validation_errors)?;

    let meta = client_meta(&headers);
    let session = state
        .sessions
        .signup(&req.email, &req.password, &req.name, &meta)
        .await?;

    let jar = jar.add(state.refresh_cookie_for(&session.refresh_token));
    let response = SessionResponse {
        access_token: session.access_token,
        csrf_token: session.csrf_token,
        expires_in: state.access_expires_in(),
        user: session.user.into(),
    };

    Ok((StatusCode::CREATED, jar, Json(ApiResponse::new(response))))
}

/// POST /api/auth/login - Authenticate with email and password.
pub async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    headers: HeaderMap,
    Json(req): Json<LoginRequest>,
) -> Result<(CookieJar, Json<ApiResponse<SessionResponse>>), ApiError> {
    if req.email.is_empty() || req.password.is_empty() {
        return Err(ApiError::bad_request("Email and password are required"));
    }

    let meta = client_meta(&headers);
    let session = state.sessions.login(&req.email, &req.password, &meta).await?;

    let jar = jar.add(state.refresh_cookie_for(&session.refresh_token));
    let response = SessionResponse {
        access_token: session.access_token,
        csrf_token: session.csrf_token,
        expires_in: state.access_expires_in(),
        user: session.user.into(),
    };

    Ok((jar, Json(ApiResponse::new(response))))
}

/// POST /api/auth/refresh - Rotate the session.
///
/// The CSRF guard has already run; this handler consumes the presented
/// refresh token and sets the replacement cookie.
pub async fn refresh(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    headers: HeaderMap,
) -> Result<(CookieJar, Json<ApiResponse<RefreshResponse>>), ApiError> {
    let cookie = jar
        .get(state.cookie.name())
        .ok_or_else(|| ApiError::unauthorized("Missing refresh token"))?;

    let meta = client_meta(&headers);
    let rotated = state.sessions.refresh(cookie.value(), &meta).await?;

    let jar = jar.add(state.refresh_cookie_for(&rotated.refresh_token));
    let response = RefreshResponse {
        access_token: rotated.access_token,
        csrf_token: rotated.csrf_token,
        expires_in: state.access_expires_in(),
    };

    Ok((jar, Json(ApiResponse::new(response))))
}

/// POST /api/auth/logout - End the session.
///
/// Always succeeds: revocation failures are logged server-side and the
/// cookie is cleared regardless.
pub async fn logout(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> (CookieJar, Json<ApiResponse<()>>) {
    let token = jar.get(state.cookie.name()).map(|c| c.value().to_string());
    state.sessions.logout(token.as_deref()).await;

    let jar = jar.add(state.cookie.clear_cookie());
    (jar, Json(ApiResponse::new(())))
}

/// GET /api/auth/me - Get current user info.
pub async fn me(
    State(state): State<Arc<AppState>>,
    AuthUser(claims): AuthUser,
) -> Result<Json<ApiResponse<MeResponse>>, ApiError> {
    let user = state.sessions.current_user(&claims).await?;

    let response = MeResponse {
        id: user.id,
        email: user.email,
        name: user.name,
    };

    Ok(Json(ApiResponse::new(response)))
}
