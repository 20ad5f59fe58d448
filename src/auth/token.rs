//! Token signing engine.
//!
//! Issues and verifies signed, self-contained tokens carrying the identity
//! claim and an embedded expiry. Stateless: access token validity is
//! decided purely by signature and expiry at verification time.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::clock::Clock;

/// Identity claim embedded in every signed token.
///
/// `sub` is the stable user ID, immutable for the life of the account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID).
    pub sub: i64,
    /// Email address.
    pub email: String,
    /// Issued at timestamp.
    pub iat: u64,
    /// Expiration timestamp.
    pub exp: u64,
    /// Token ID (unique identifier).
    pub jti: String,
}

/// Verification failures.
///
/// The variants exist so logs can tell a tampered token from a merely
/// expired one; callers surface all of them to the client as a single
/// unauthorized response.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum TokenError {
    /// Signature does not match the payload.
    #[error("token signature is invalid")]
    InvalidSignature,

    /// Correctly signed, but past its embedded expiry.
    #[error("token has expired")]
    Expired,

    /// Not parseable as a token at all.
    #[error("token is malformed")]
    Malformed,

    /// Signing machinery failed; internal, not a per-request condition.
    #[error("token encoding failed: {0}")]
    Encoding(String),
}

/// Stateless signer/verifier for access and refresh tokens.
///
/// Both token kinds share one HS256 secret and differ only in TTL. The
/// refresh TTL being strictly greater than the access TTL is enforced at
/// startup by `Config::validate`.
pub struct TokenSigner {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    access_ttl: Duration,
    refresh_ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl TokenSigner {
    /// Create a signer from the shared secret and the two TTLs.
    pub fn new(
        secret: &str,
        access_ttl: Duration,
        refresh_ttl: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let mut validation = Validation::default();
        validation.validate_exp = true;
        // Exact expiry; clients refresh well before the boundary
        validation.leeway = 0;

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            access_ttl,
            refresh_ttl,
            clock,
        }
    }

    /// Access token lifetime.
    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    /// Refresh token lifetime.
    ///
    /// The refresh token store derives record expiry from this same value,
    /// so minted tokens and persisted records cannot drift apart.
    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    fn issue(&self, user_id: i64, email: &str, ttl: Duration) -> Result<String, TokenError> {
        let now = self.clock.now();
        let claims = Claims {
            sub: user_id,
            email: email.to_string(),
            iat: now.timestamp() as u64,
            exp: (now + ttl).timestamp() as u64,
            jti: uuid::Uuid::new_v4().to_string(),
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| TokenError::Encoding(e.to_string()))
    }

    /// Issue a short-lived access token for the given identity.
    pub fn issue_access(&self, user_id: i64, email: &str) -> Result<String, TokenError> {
        self.issue(user_id, email, self.access_ttl)
    }

    /// Issue a long-lived refresh token for the given identity.
    pub fn issue_refresh(&self, user_id: i64, email: &str) -> Result<String, TokenError> {
        self.issue(user_id, email, self.refresh_ttl)
    }

    /// Verify signature integrity, then expiry, and return the claims.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                let err = match e.kind() {
                    ErrorKind::ExpiredSignature => TokenError::Expired,
                    ErrorKind::InvalidSignature => TokenError::InvalidSignature,
                    _ => TokenError::Malformed,
                };
                debug!(cause = %e, "Token verification failed: {err}");
                err
            })
    }

    /// Read the embedded expiry without verifying the token.
    ///
    /// A pure parse step used to size the refresh cookie's Max-Age. The
    /// decoded payload must never influence an authorization decision.
    pub fn decoded_expiry(&self, token: &str) -> Option<DateTime<Utc>> {
        let mut validation = Validation::default();
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        let data = decode::<Claims>(token, &self.decoding_key, &validation).ok()?;
        DateTime::from_timestamp(data.claims.exp as i64, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;

    fn signer(secret: &str) -> TokenSigner {
        TokenSigner::new(
            secret,
            Duration::minutes(15),
            Duration::days(7),
            Arc::new(SystemClock),
        )
    }

    #[test]
    fn test_issue_and_verify_round_trip() {
        let signer = signer("test-secret");

        let token = signer.issue_access(1, "a@x.com").unwrap();
        let claims = signer.verify(&token).unwrap();

        assert_eq!(claims.sub, 1);
        assert_eq!(claims.email, "a@x.com");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_refresh_outlives_access() {
        let signer = signer("test-secret");

        let access = signer.verify(&signer.issue_access(1, "a@x.com").unwrap()).unwrap();
        let refresh = signer.verify(&signer.issue_refresh(1, "a@x.com").unwrap()).unwrap();

        assert!(refresh.exp > access.exp);
    }

    #[test]
    fn test_tokens_carry_unique_jti() {
        let signer = signer("test-secret");

        let t1 = signer.issue_access(1, "a@x.com").unwrap();
        let t2 = signer.issue_access(1, "a@x.com").unwrap();

        assert_ne!(t1, t2);
        assert_ne!(
            signer.verify(&t1).unwrap().jti,
            signer.verify(&t2).unwrap().jti
        );
    }

    #[test]
    fn test_verify_wrong_secret() {
        let token = signer("secret-one").issue_access(1, "a@x.com").unwrap();
        let result = signer("secret-two").verify(&token);

        assert_eq!(result.unwrap_err(), TokenError::InvalidSignature);
    }

    #[test]
    fn test_verify_expired_token() {
        // Issue with an already-past expiry by using a clock in the past
        let past = Arc::new(crate::clock::test_support::ManualClock::new(
            Utc::now() - Duration::hours(2),
        ));
        let expired_signer =
            TokenSigner::new("test-secret", Duration::minutes(15), Duration::days(7), past);

        let token = expired_signer.issue_access(1, "a@x.com").unwrap();
        let result = signer("test-secret").verify(&token);

        assert_eq!(result.unwrap_err(), TokenError::Expired);
    }

    #[test]
    fn test_verify_malformed_token() {
        let signer = signer("test-secret");

        assert_eq!(signer.verify("").unwrap_err(), TokenError::Malformed);
        assert_eq!(
            signer.verify("not-a-token").unwrap_err(),
            TokenError::Malformed
        );
        assert_eq!(
            signer.verify("a.b.c").unwrap_err(),
            TokenError::Malformed
        );
    }

    #[test]
    fn test_decoded_expiry_matches_claims() {
        let signer = signer("test-secret");

        let token = signer.issue_refresh(1, "a@x.com").unwrap();
        let claims = signer.verify(&token).unwrap();
        let expiry = signer.decoded_expiry(&token).unwrap();

        assert_eq!(expiry.timestamp() as u64, claims.exp);
    }

    #[test]
    fn test_decoded_expiry_works_on_expired_tokens() {
        let past = Arc::new(crate::clock::test_support::ManualClock::new(
            Utc::now() - Duration::hours(2),
        ));
        let expired_signer =
            TokenSigner::new("test-secret", Duration::minutes(15), Duration::days(7), past);

        let token = expired_signer.issue_access(1, "a@x.com").unwrap();
        // verify() rejects it but the pure parse still reads the expiry
        assert!(signer("test-secret").verify(&token).is_err());
        assert!(signer("test-secret").decoded_expiry(&token).is_some());
    }

    #[test]
    fn test_decoded_expiry_rejects_garbage() {
        let signer = signer("test-secret");
        assert!(signer.decoded_expiry("garbage").is_none());
    }
}
