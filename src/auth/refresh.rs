//! Persisted refresh token store.
//!
//! Sits between the session service and the refresh token repository.
//! Raw tokens are hashed before they touch the database; matching a
//! presented token means re-verifying it against a bounded window of the
//! user's most recent hashes.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;
use tracing::{debug, warn};

use crate::auth::password::{hash_token, verify_token_hash};
use crate::clock::Clock;
use crate::db::{NewRefreshTokenRecord, RefreshTokenRepository};
use crate::{GatehouseError, Result};

/// Storage format for timestamps, matching sqlite's `datetime('now')`.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Request metadata recorded alongside a stored token.
#[derive(Debug, Clone, Default)]
pub struct ClientMeta {
    /// User agent of the issuing request.
    pub user_agent: Option<String>,
    /// Source address of the issuing request.
    pub ip: Option<String>,
}

/// Hash-at-rest store for refresh tokens.
#[derive(Clone)]
pub struct RefreshTokenStore {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    lookup_window: u32,
}

impl RefreshTokenStore {
    /// Create a store.
    ///
    /// `ttl` must match the signer's refresh TTL so record expiry and the
    /// token's embedded expiry agree. `lookup_window` bounds how many
    /// recent records a verification scans.
    pub fn new(pool: SqlitePool, clock: Arc<dyn Clock>, ttl: Duration, lookup_window: u32) -> Self {
        Self {
            pool,
            clock,
            ttl,
            lookup_window,
        }
    }

    fn format_timestamp(ts: DateTime<Utc>) -> String {
        ts.format(TIMESTAMP_FORMAT).to_string()
    }

    fn now_string(&self) -> String {
        Self::format_timestamp(self.clock.now())
    }

    /// Hash and persist a freshly minted token for a user.
    pub async fn store(&self, user_id: i64, raw_token: &str, meta: &ClientMeta) -> Result<()> {
        let token_hash =
            hash_token(raw_token).map_err(|e| GatehouseError::Auth(e.to_string()))?;
        let expires_at = Self::format_timestamp(self.clock.now() + self.ttl);

        let repo = RefreshTokenRepository::new(&self.pool);
        repo.create(&NewRefreshTokenRecord {
            user_id,
            token_hash,
            expires_at,
            user_agent: meta.user_agent.clone(),
            ip: meta.ip.clone(),
        })
        .await?;

        Ok(())
    }

    /// Check whether a presented token matches a live stored record.
    ///
    /// Read-only: no record is consumed. Expired records never match.
    pub async fn is_valid(&self, user_id: i64, raw_token: &str) -> Result<bool> {
        let repo = RefreshTokenRepository::new(&self.pool);
        let records = repo
            .list_live(user_id, self.lookup_window, &self.now_string())
            .await?;

        Ok(records
            .iter()
            .any(|record| verify_token_hash(raw_token, &record.token_hash)))
    }

    /// Match a presented token against the user's recent records and
    /// delete the matched record.
    ///
    /// Returns the deleted record's ID, or `None` when nothing matched.
    /// Scans newest-first so the common case (the token just rotated in)
    /// pays one hash verification. Two concurrent calls with the same
    /// token can both match, but only the one whose delete lands first
    /// wins; the loser sees the record already gone and reports no match.
    pub async fn verify_and_consume(&self, user_id: i64, raw_token: &str) -> Result<Option<i64>> {
        let repo = RefreshTokenRepository::new(&self.pool);
        let records = repo
            .list_live(user_id, self.lookup_window, &self.now_string())
            .await?;

        for record in &records {
            if verify_token_hash(raw_token, &record.token_hash) {
                if repo.delete(record.id).await? {
                    debug!(user_id, record_id = record.id, "Refresh token consumed");
                    return Ok(Some(record.id));
                }
                warn!(
                    user_id,
                    record_id = record.id,
                    "Refresh token record vanished before delete; treating as no match"
                );
                return Ok(None);
            }
        }

        Ok(None)
    }

    /// Revoke a single record by ID. Idempotent.
    pub async fn revoke_one(&self, record_id: i64) -> Result<bool> {
        RefreshTokenRepository::new(&self.pool).delete(record_id).await
    }

    /// Revoke every stored token for a user. Idempotent.
    pub async fn revoke_all(&self, user_id: i64) -> Result<u64> {
        let deleted = RefreshTokenRepository::new(&self.pool)
            .delete_all_for_user(user_id)
            .await?;
        if deleted > 0 {
            debug!(user_id, deleted, "Revoked all refresh tokens");
        }
        Ok(deleted)
    }

    /// Delete expired records across all users.
    pub async fn cleanup_expired(&self) -> Result<u64> {
        RefreshTokenRepository::new(&self.pool).cleanup_expired().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::test_support::ManualClock;
    use crate::clock::SystemClock;
    use crate::db::Database;

    async fn setup() -> (Database, RefreshTokenStore) {
        let db = Database::open_in_memory().await.unwrap();
        sqlx::query("INSERT INTO users (email, password, name) VALUES (?, ?, ?)")
            .bind("test@example.com")
            .bind("hashed")
            .bind("Test User")
            .execute(db.pool())
            .await
            .unwrap();

        let store = RefreshTokenStore::new(
            db.pool().clone(),
            Arc::new(SystemClock),
            Duration::days(7),
            20,
        );
        (db, store)
    }

    #[tokio::test]
    async fn test_store_and_verify() {
        let (_db, store) = setup().await;
        let meta = ClientMeta::default();

        store.store(1, "raw-token-abc", &meta).await.unwrap();

        assert!(store.is_valid(1, "raw-token-abc").await.unwrap());
        assert!(!store.is_valid(1, "some-other-token").await.unwrap());
        assert!(!store.is_valid(2, "raw-token-abc").await.unwrap());
    }

    #[tokio::test]
    async fn test_consume_is_single_use() {
        let (_db, store) = setup().await;

        store
            .store(1, "raw-token-abc", &ClientMeta::default())
            .await
            .unwrap();

        let first = store.verify_and_consume(1, "raw-token-abc").await.unwrap();
        assert!(first.is_some());

        // Replay after consumption finds nothing
        let second = store.verify_and_consume(1, "raw-token-abc").await.unwrap();
        assert!(second.is_none());
        assert!(!store.is_valid(1, "raw-token-abc").await.unwrap());
    }

    #[tokio::test]
    async fn test_consume_leaves_other_tokens() {
        let (_db, store) = setup().await;
        let meta = ClientMeta::default();

        store.store(1, "token-one", &meta).await.unwrap();
        store.store(1, "token-two", &meta).await.unwrap();

        assert!(store
            .verify_and_consume(1, "token-one")
            .await
            .unwrap()
            .is_some());
        assert!(store.is_valid(1, "token-two").await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_token_never_matches() {
        let db = Database::open_in_memory().await.unwrap();
        sqlx::query("INSERT INTO users (email, password, name) VALUES (?, ?, ?)")
            .bind("test@example.com")
            .bind("hashed")
            .bind("Test User")
            .execute(db.pool())
            .await
            .unwrap();

        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store = RefreshTokenStore::new(
            db.pool().clone(),
            clock.clone(),
            Duration::days(7),
            20,
        );

        store
            .store(1, "raw-token", &ClientMeta::default())
            .await
            .unwrap();
        assert!(store.is_valid(1, "raw-token").await.unwrap());

        clock.advance(Duration::days(8));
        assert!(!store.is_valid(1, "raw-token").await.unwrap());
        assert!(store
            .verify_and_consume(1, "raw-token")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_lookup_window_bounds_scan() {
        let db = Database::open_in_memory().await.unwrap();
        sqlx::query("INSERT INTO users (email, password, name) VALUES (?, ?, ?)")
            .bind("test@example.com")
            .bind("hashed")
            .bind("Test User")
            .execute(db.pool())
            .await
            .unwrap();

        // Window of 2: only the two newest records are candidates
        let store = RefreshTokenStore::new(
            db.pool().clone(),
            Arc::new(SystemClock),
            Duration::days(7),
            2,
        );
        let meta = ClientMeta::default();

        store.store(1, "oldest", &meta).await.unwrap();
        store.store(1, "middle", &meta).await.unwrap();
        store.store(1, "newest", &meta).await.unwrap();

        assert!(store.is_valid(1, "newest").await.unwrap());
        assert!(store.is_valid(1, "middle").await.unwrap());
        assert!(!store.is_valid(1, "oldest").await.unwrap());
    }

    #[tokio::test]
    async fn test_revoke_one() {
        let (db, store) = setup().await;

        store
            .store(1, "raw-token", &ClientMeta::default())
            .await
            .unwrap();
        let record_id = RefreshTokenRepository::new(db.pool())
            .list_recent(1, 1)
            .await
            .unwrap()[0]
            .id;

        assert!(store.revoke_one(record_id).await.unwrap());
        assert!(!store.is_valid(1, "raw-token").await.unwrap());
        // Idempotent
        assert!(!store.revoke_one(record_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_revoke_all() {
        let (_db, store) = setup().await;
        let meta = ClientMeta::default();

        store.store(1, "token-one", &meta).await.unwrap();
        store.store(1, "token-two", &meta).await.unwrap();

        assert_eq!(store.revoke_all(1).await.unwrap(), 2);
        assert!(!store.is_valid(1, "token-one").await.unwrap());
        assert!(!store.is_valid(1, "token-two").await.unwrap());

        // Idempotent
        assert_eq!(store.revoke_all(1).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_client_meta_is_persisted() {
        let (db, store) = setup().await;

        store
            .store(
                1,
                "raw-token",
                &ClientMeta {
                    user_agent: Some("test-agent/1.0".to_string()),
                    ip: Some("203.0.113.7".to_string()),
                },
            )
            .await
            .unwrap();

        let repo = RefreshTokenRepository::new(db.pool());
        let records = repo.list_recent(1, 10).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].user_agent.as_deref(), Some("test-agent/1.0"));
        assert_eq!(records[0].ip.as_deref(), Some("203.0.113.7"));
        // Only the hash is at rest
        assert!(records[0].token_hash.starts_with("$argon2id$"));
    }
}
