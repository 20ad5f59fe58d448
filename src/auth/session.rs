//! Session lifecycle controller.
//!
//! Orchestrates signup, login, refresh rotation, and logout over the
//! signer, the refresh token store, the CSRF manager, and the user
//! repository. Handlers call this layer and translate its errors into
//! HTTP responses.

use std::sync::Arc;

use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::auth::csrf::CsrfTokenManager;
use crate::auth::password::{hash_password, verify_password, PasswordError};
use crate::auth::refresh::{ClientMeta, RefreshTokenStore};
use crate::auth::token::{Claims, TokenError, TokenSigner};
use crate::db::{NewUser, User, UserRepository};
use crate::GatehouseError;

/// Session operation failures.
#[derive(Error, Debug)]
pub enum SessionError {
    /// Unknown email or wrong password. Deliberately not distinguished.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Signup with an email that is already registered.
    #[error("email is already registered")]
    DuplicateEmail,

    /// Rejected input (password policy, field constraints).
    #[error("{0}")]
    Validation(String),

    /// Missing, expired, or unmatched token.
    #[error("not authenticated")]
    Unauthenticated,

    /// Token signing or password hashing failed.
    #[error("credential processing failed: {0}")]
    Signing(String),

    /// Storage failure.
    #[error("service unavailable: {0}")]
    Unavailable(String),
}

impl From<GatehouseError> for SessionError {
    fn from(e: GatehouseError) -> Self {
        SessionError::Unavailable(e.to_string())
    }
}

impl From<TokenError> for SessionError {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::Encoding(msg) => SessionError::Signing(msg),
            _ => SessionError::Unauthenticated,
        }
    }
}

/// Public view of a user, safe to serialize into responses.
#[derive(Debug, Clone)]
pub struct SessionUser {
    /// User ID.
    pub id: i64,
    /// Email address.
    pub email: String,
    /// Display name.
    pub name: String,
}

impl From<User> for SessionUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            name: user.name,
        }
    }
}

/// A freshly established session (signup or login).
#[derive(Debug, Clone)]
pub struct EstablishedSession {
    /// The authenticated user.
    pub user: SessionUser,
    /// Short-lived access token.
    pub access_token: String,
    /// Long-lived refresh token; goes into the HTTP-only cookie.
    pub refresh_token: String,
    /// CSRF token the client must echo on refresh.
    pub csrf_token: String,
}

/// Result of a successful refresh rotation.
#[derive(Debug, Clone)]
pub struct RotatedSession {
    /// User the rotation belongs to.
    pub user_id: i64,
    /// New access token.
    pub access_token: String,
    /// New refresh token, replacing the consumed one.
    pub refresh_token: String,
    /// Rotated CSRF token.
    pub csrf_token: String,
}

/// Session lifecycle controller.
#[derive(Clone)]
pub struct SessionService {
    signer: Arc<TokenSigner>,
    refresh_tokens: RefreshTokenStore,
    csrf: CsrfTokenManager,
    pool: SqlitePool,
}

impl SessionService {
    /// Wire the controller over its collaborators.
    pub fn new(
        signer: Arc<TokenSigner>,
        refresh_tokens: RefreshTokenStore,
        csrf: CsrfTokenManager,
        pool: SqlitePool,
    ) -> Self {
        Self {
            signer,
            refresh_tokens,
            csrf,
            pool,
        }
    }

    /// The CSRF manager, shared with the web middleware.
    pub fn csrf(&self) -> &CsrfTokenManager {
        &self.csrf
    }

    /// The token signer, shared with the auth extractor.
    pub fn signer(&self) -> &Arc<TokenSigner> {
        &self.signer
    }

    /// The refresh token store.
    pub fn refresh_tokens(&self) -> &RefreshTokenStore {
        &self.refresh_tokens
    }

    /// CSRF entries are keyed by the user ID rendered as a string.
    fn csrf_key(user_id: i64) -> String {
        user_id.to_string()
    }

    async fn establish(&self, user: User, meta: &ClientMeta) -> Result<EstablishedSession, SessionError> {
        let access_token = self.signer.issue_access(user.id, &user.email)?;
        let refresh_token = self.signer.issue_refresh(user.id, &user.email)?;

        self.refresh_tokens
            .store(user.id, &refresh_token, meta)
            .await?;
        let csrf_token = self.csrf.issue(&Self::csrf_key(user.id));

        Ok(EstablishedSession {
            user: user.into(),
            access_token,
            refresh_token,
            csrf_token,
        })
    }

    /// Register a new account and establish its first session.
    pub async fn signup(
        &self,
        email: &str,
        password: &str,
        name: &str,
        meta: &ClientMeta,
    ) -> Result<EstablishedSession, SessionError> {
        let users = UserRepository::new(&self.pool);

        if users.email_exists(email).await? {
            return Err(SessionError::DuplicateEmail);
        }

        let password_hash = hash_password(password).map_err(|e| match e {
            PasswordError::TooShort | PasswordError::TooLong => {
                SessionError::Validation(e.to_string())
            }
            other => SessionError::Signing(other.to_string()),
        })?;

        // The UNIQUE index backstops the existence check against a
        // concurrent signup with the same email
        let user = match users.create(&NewUser::new(email, password_hash, name)).await {
            Ok(user) => user,
            Err(e) if e.to_string().contains("UNIQUE") => {
                return Err(SessionError::DuplicateEmail)
            }
            Err(e) => return Err(e.into()),
        };

        info!(user_id = user.id, "New account registered");
        self.establish(user, meta).await
    }

    /// Authenticate by email and password and establish a session.
    ///
    /// Unknown email and wrong password produce the same error.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        meta: &ClientMeta,
    ) -> Result<EstablishedSession, SessionError> {
        let users = UserRepository::new(&self.pool);

        let Some(user) = users.get_by_email(email).await? else {
            debug!("Login attempt for unknown email");
            return Err(SessionError::InvalidCredentials);
        };

        if verify_password(password, &user.password).is_err() {
            debug!(user_id = user.id, "Login attempt with wrong password");
            return Err(SessionError::InvalidCredentials);
        }

        // Best effort; a failed timestamp update must not block the login
        if let Err(e) = users.update_last_login(user.id).await {
            warn!(user_id = user.id, error = %e, "Failed to update last login timestamp");
        }

        info!(user_id = user.id, "User logged in");
        self.establish(user, meta).await
    }

    /// Rotate a session: consume the presented refresh token and mint a
    /// replacement pair.
    ///
    /// The presented token must verify cryptographically AND match a live
    /// stored record. A verified token with no stored counterpart (already
    /// rotated, or revoked by logout) is rejected the same way as a forged
    /// one.
    pub async fn refresh(
        &self,
        raw_refresh_token: &str,
        meta: &ClientMeta,
    ) -> Result<RotatedSession, SessionError> {
        let claims = self.signer.verify(raw_refresh_token)?;

        let consumed = self
            .refresh_tokens
            .verify_and_consume(claims.sub, raw_refresh_token)
            .await?;
        if consumed.is_none() {
            warn!(user_id = claims.sub, "Refresh token verified but not on record");
            return Err(SessionError::Unauthenticated);
        }

        let access_token = self.signer.issue_access(claims.sub, &claims.email)?;
        let refresh_token = self.signer.issue_refresh(claims.sub, &claims.email)?;
        self.refresh_tokens
            .store(claims.sub, &refresh_token, meta)
            .await?;
        let csrf_token = self.csrf.rotate(&Self::csrf_key(claims.sub));

        debug!(user_id = claims.sub, "Session rotated");
        Ok(RotatedSession {
            user_id: claims.sub,
            access_token,
            refresh_token,
            csrf_token,
        })
    }

    /// End a session. Never fails.
    ///
    /// The user is identified from the refresh cookie when present. All
    /// of the user's refresh tokens and their CSRF token are revoked;
    /// storage errors are logged and swallowed so logout always succeeds
    /// from the client's point of view.
    pub async fn logout(&self, raw_refresh_token: Option<&str>) {
        let Some(token) = raw_refresh_token else {
            debug!("Logout without a refresh cookie; nothing to revoke");
            return;
        };

        // An expired or tampered cookie still yields a clean logout
        let Ok(claims) = self.signer.verify(token) else {
            debug!("Logout with an unverifiable refresh cookie");
            return;
        };

        if let Err(e) = self.refresh_tokens.revoke_all(claims.sub).await {
            warn!(user_id = claims.sub, error = %e, "Failed to revoke refresh tokens on logout");
        }
        self.csrf.revoke(&Self::csrf_key(claims.sub));
        info!(user_id = claims.sub, "User logged out");
    }

    /// Resolve the current user from verified access token claims.
    pub async fn current_user(&self, claims: &Claims) -> Result<SessionUser, SessionError> {
        let users = UserRepository::new(&self.pool);
        users
            .get_by_id(claims.sub)
            .await?
            .map(SessionUser::from)
            .ok_or(SessionError::Unauthenticated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::db::Database;
    use chrono::Duration;

    async fn service() -> (Database, SessionService) {
        let db = Database::open_in_memory().await.unwrap();
        let clock = Arc::new(SystemClock);
        let signer = Arc::new(TokenSigner::new(
            "test-secret",
            Duration::minutes(15),
            Duration::days(7),
            clock.clone(),
        ));
        let refresh_tokens =
            RefreshTokenStore::new(db.pool().clone(), clock.clone(), Duration::days(7), 20);
        let csrf = CsrfTokenManager::new(Duration::hours(24), clock);

        let service = SessionService::new(signer, refresh_tokens, csrf, db.pool().clone());
        (db, service)
    }

    fn meta() -> ClientMeta {
        ClientMeta::default()
    }

    #[tokio::test]
    async fn test_signup_establishes_session() {
        let (_db, service) = service().await;

        let session = service
            .signup("a@x.com", "password123", "Alice", &meta())
            .await
            .unwrap();

        assert_eq!(session.user.email, "a@x.com");
        assert_eq!(session.user.name, "Alice");
        assert!(!session.access_token.is_empty());
        assert!(!session.refresh_token.is_empty());
        assert_ne!(session.access_token, session.refresh_token);

        // The CSRF token validates for this user
        assert!(service
            .csrf()
            .validate(&session.user.id.to_string(), &session.csrf_token));

        // The refresh token is on record
        assert!(service
            .refresh_tokens()
            .is_valid(session.user.id, &session.refresh_token)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_signup_duplicate_email() {
        let (_db, service) = service().await;

        service
            .signup("a@x.com", "password123", "Alice", &meta())
            .await
            .unwrap();

        let result = service
            .signup("A@X.COM", "password456", "Imposter", &meta())
            .await;
        assert!(matches!(result, Err(SessionError::DuplicateEmail)));
    }

    #[tokio::test]
    async fn test_signup_rejects_short_password() {
        let (_db, service) = service().await;

        let result = service.signup("a@x.com", "short", "Alice", &meta()).await;
        assert!(matches!(result, Err(SessionError::Validation(_))));
    }

    #[tokio::test]
    async fn test_login_success_and_last_login() {
        let (db, service) = service().await;

        service
            .signup("a@x.com", "password123", "Alice", &meta())
            .await
            .unwrap();

        let session = service.login("a@x.com", "password123", &meta()).await.unwrap();
        assert_eq!(session.user.email, "a@x.com");

        let users = UserRepository::new(db.pool());
        let user = users.get_by_id(session.user.id).await.unwrap().unwrap();
        assert!(user.last_login_at.is_some());
    }

    #[tokio::test]
    async fn test_login_failures_are_uniform() {
        let (_db, service) = service().await;

        service
            .signup("a@x.com", "password123", "Alice", &meta())
            .await
            .unwrap();

        let wrong_password = service.login("a@x.com", "wrong-password", &meta()).await;
        let unknown_email = service.login("nobody@x.com", "password123", &meta()).await;

        assert!(matches!(wrong_password, Err(SessionError::InvalidCredentials)));
        assert!(matches!(unknown_email, Err(SessionError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn test_refresh_rotates_and_invalidates_old_token() {
        let (_db, service) = service().await;

        let session = service
            .signup("a@x.com", "password123", "Alice", &meta())
            .await
            .unwrap();

        let rotated = service
            .refresh(&session.refresh_token, &meta())
            .await
            .unwrap();
        assert_eq!(rotated.user_id, session.user.id);
        assert_ne!(rotated.refresh_token, session.refresh_token);
        assert_ne!(rotated.csrf_token, session.csrf_token);

        // Replay of the consumed token is rejected
        let replay = service.refresh(&session.refresh_token, &meta()).await;
        assert!(matches!(replay, Err(SessionError::Unauthenticated)));

        // The new token still works
        let again = service.refresh(&rotated.refresh_token, &meta()).await;
        assert!(again.is_ok());
    }

    #[tokio::test]
    async fn test_refresh_rejects_forged_token() {
        let (_db, service) = service().await;

        service
            .signup("a@x.com", "password123", "Alice", &meta())
            .await
            .unwrap();

        let forged = TokenSigner::new(
            "other-secret",
            Duration::minutes(15),
            Duration::days(7),
            Arc::new(SystemClock),
        )
        .issue_refresh(1, "a@x.com")
        .unwrap();

        let result = service.refresh(&forged, &meta()).await;
        assert!(matches!(result, Err(SessionError::Unauthenticated)));
    }

    #[tokio::test]
    async fn test_refresh_rejects_verified_but_unstored_token() {
        let (_db, service) = service().await;

        let session = service
            .signup("a@x.com", "password123", "Alice", &meta())
            .await
            .unwrap();

        // Correctly signed for this user but never persisted
        let ghost = service
            .signer()
            .issue_refresh(session.user.id, "a@x.com")
            .unwrap();

        let result = service.refresh(&ghost, &meta()).await;
        assert!(matches!(result, Err(SessionError::Unauthenticated)));
    }

    #[tokio::test]
    async fn test_logout_revokes_everything() {
        let (_db, service) = service().await;

        let session = service
            .signup("a@x.com", "password123", "Alice", &meta())
            .await
            .unwrap();
        let second = service.login("a@x.com", "password123", &meta()).await.unwrap();

        service.logout(Some(&session.refresh_token)).await;

        // Both sessions' refresh tokens are gone
        let replay_first = service.refresh(&session.refresh_token, &meta()).await;
        let replay_second = service.refresh(&second.refresh_token, &meta()).await;
        assert!(replay_first.is_err());
        assert!(replay_second.is_err());

        // CSRF token revoked too
        assert!(!service
            .csrf()
            .validate(&session.user.id.to_string(), &second.csrf_token));
    }

    #[tokio::test]
    async fn test_logout_tolerates_garbage() {
        let (_db, service) = service().await;

        // Neither call panics or errors
        service.logout(None).await;
        service.logout(Some("not-a-token")).await;
    }

    #[tokio::test]
    async fn test_current_user() {
        let (_db, service) = service().await;

        let session = service
            .signup("a@x.com", "password123", "Alice", &meta())
            .await
            .unwrap();

        let claims = service.signer().verify(&session.access_token).unwrap();
        let user = service.current_user(&claims).await.unwrap();
        assert_eq!(user.id, session.user.id);
        assert_eq!(user.name, "Alice");
    }
}
