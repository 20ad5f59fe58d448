//! Refresh token record repository.
//!
//! Stores one-way hashes of refresh tokens, never the raw token. Which
//! hash a presented token matches (if any) is decided by the store
//! adapter in `auth::refresh`; this layer only persists and lists.

use sqlx::SqlitePool;

use crate::{GatehouseError, Result};

/// Persisted refresh token record.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RefreshTokenRecord {
    /// Record ID.
    pub id: i64,
    /// Owning user ID.
    pub user_id: i64,
    /// One-way hash of the raw token (Argon2 PHC string).
    pub token_hash: String,
    /// Expiration timestamp (UTC, "%Y-%m-%d %H:%M:%S").
    pub expires_at: String,
    /// User agent of the issuing request, if known.
    pub user_agent: Option<String>,
    /// Source address of the issuing request, if known.
    pub ip: Option<String>,
    /// Creation timestamp.
    pub created_at: String,
}

/// New refresh token record for insertion.
#[derive(Debug, Clone)]
pub struct NewRefreshTokenRecord {
    /// Owning user ID.
    pub user_id: i64,
    /// One-way hash of the raw token.
    pub token_hash: String,
    /// Expiration timestamp (UTC, "%Y-%m-%d %H:%M:%S").
    pub expires_at: String,
    /// User agent of the issuing request.
    pub user_agent: Option<String>,
    /// Source address of the issuing request.
    pub ip: Option<String>,
}

/// Repository for refresh token record operations.
pub struct RefreshTokenRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> RefreshTokenRepository<'a> {
    /// Create a new repository instance.
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a new refresh token record.
    pub async fn create(&self, new_record: &NewRefreshTokenRecord) -> Result<RefreshTokenRecord> {
        let result = sqlx::query(
            "INSERT INTO refresh_tokens (user_id, token_hash, expires_at, user_agent, ip)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(new_record.user_id)
        .bind(&new_record.token_hash)
        .bind(&new_record.expires_at)
        .bind(&new_record.user_agent)
        .bind(&new_record.ip)
        .execute(self.pool)
        .await
        .map_err(|e| GatehouseError::Database(e.to_string()))?;

        let id = result.last_insert_rowid();
        self.get_by_id(id)
            .await?
            .ok_or_else(|| GatehouseError::NotFound("refresh token record".to_string()))
    }

    /// Get a record by ID.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<RefreshTokenRecord>> {
        let record = sqlx::query_as::<_, RefreshTokenRecord>(
            "SELECT id, user_id, token_hash, expires_at, user_agent, ip, created_at
             FROM refresh_tokens WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| GatehouseError::Database(e.to_string()))?;

        Ok(record)
    }

    /// List a user's most recent records, newest first, bounded by `limit`.
    pub async fn list_recent(&self, user_id: i64, limit: u32) -> Result<Vec<RefreshTokenRecord>> {
        let records = sqlx::query_as::<_, RefreshTokenRecord>(
            "SELECT id, user_id, token_hash, expires_at, user_agent, ip, created_at
             FROM refresh_tokens
             WHERE user_id = ?
             ORDER BY id DESC
             LIMIT ?",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(self.pool)
        .await
        .map_err(|e| GatehouseError::Database(e.to_string()))?;

        Ok(records)
    }

    /// List a user's most recent non-expired records, newest first.
    ///
    /// `now` is passed in rather than read from the database clock so that
    /// expiry checks share the caller's time source.
    pub async fn list_live(
        &self,
        user_id: i64,
        limit: u32,
        now: &str,
    ) -> Result<Vec<RefreshTokenRecord>> {
        let records = sqlx::query_as::<_, RefreshTokenRecord>(
            "SELECT id, user_id, token_hash, expires_at, user_agent, ip, created_at
             FROM refresh_tokens
             WHERE user_id = ? AND expires_at > ?
             ORDER BY id DESC
             LIMIT ?",
        )
        .bind(user_id)
        .bind(now)
        .bind(limit)
        .fetch_all(self.pool)
        .await
        .map_err(|e| GatehouseError::Database(e.to_string()))?;

        Ok(records)
    }

    /// Delete a record by ID.
    ///
    /// Idempotent: deleting an already-gone record returns `false`.
    pub async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE id = ?")
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(|e| GatehouseError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete all records for a user. Idempotent.
    pub async fn delete_all_for_user(&self, user_id: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE user_id = ?")
            .bind(user_id)
            .execute(self.pool)
            .await
            .map_err(|e| GatehouseError::Database(e.to_string()))?;

        Ok(result.rows_affected())
    }

    /// Delete expired records (cleanup job).
    pub async fn cleanup_expired(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at < datetime('now')")
            .execute(self.pool)
            .await
            .map_err(|e| GatehouseError::Database(e.to_string()))?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;

    async fn setup_db() -> Database {
        let db = Database::open_in_memory().await.unwrap();
        sqlx::query("INSERT INTO users (email, password, name) VALUES (?, ?, ?)")
            .bind("test@example.com")
            .bind("hashedpassword")
            .bind("Test User")
            .execute(db.pool())
            .await
            .unwrap();
        db
    }

    fn record(user_id: i64, hash: &str, expires_at: &str) -> NewRefreshTokenRecord {
        NewRefreshTokenRecord {
            user_id,
            token_hash: hash.to_string(),
            expires_at: expires_at.to_string(),
            user_agent: None,
            ip: None,
        }
    }

    #[tokio::test]
    async fn test_create_record() {
        let db = setup_db().await;
        let repo = RefreshTokenRepository::new(db.pool());

        let created = repo
            .create(&NewRefreshTokenRecord {
                user_id: 1,
                token_hash: "hash-123".to_string(),
                expires_at: "2099-12-31 23:59:59".to_string(),
                user_agent: Some("test-agent".to_string()),
                ip: Some("127.0.0.1".to_string()),
            })
            .await
            .unwrap();

        assert_eq!(created.user_id, 1);
        assert_eq!(created.token_hash, "hash-123");
        assert_eq!(created.user_agent.as_deref(), Some("test-agent"));
        assert_eq!(created.ip.as_deref(), Some("127.0.0.1"));
    }

    #[tokio::test]
    async fn test_list_recent_is_newest_first_and_bounded() {
        let db = setup_db().await;
        let repo = RefreshTokenRepository::new(db.pool());

        for i in 0..5 {
            repo.create(&record(1, &format!("hash-{i}"), "2099-12-31 23:59:59"))
                .await
                .unwrap();
        }

        let records = repo.list_recent(1, 3).await.unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].token_hash, "hash-4");
        assert_eq!(records[1].token_hash, "hash-3");
        assert_eq!(records[2].token_hash, "hash-2");
    }

    #[tokio::test]
    async fn test_list_live_excludes_expired() {
        let db = setup_db().await;
        let repo = RefreshTokenRepository::new(db.pool());

        repo.create(&record(1, "live", "2099-12-31 23:59:59"))
            .await
            .unwrap();
        repo.create(&record(1, "expired", "2000-01-01 00:00:00"))
            .await
            .unwrap();

        let live = repo.list_live(1, 10, "2020-06-01 12:00:00").await.unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].token_hash, "live");
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let db = setup_db().await;
        let repo = RefreshTokenRepository::new(db.pool());

        let created = repo
            .create(&record(1, "hash", "2099-12-31 23:59:59"))
            .await
            .unwrap();

        assert!(repo.delete(created.id).await.unwrap());
        assert!(!repo.delete(created.id).await.unwrap());
        assert!(repo.get_by_id(created.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_all_for_user() {
        let db = setup_db().await;
        let repo = RefreshTokenRepository::new(db.pool());

        for i in 0..3 {
            repo.create(&record(1, &format!("hash-{i}"), "2099-12-31 23:59:59"))
                .await
                .unwrap();
        }

        assert_eq!(repo.delete_all_for_user(1).await.unwrap(), 3);
        assert_eq!(repo.delete_all_for_user(1).await.unwrap(), 0);
        assert!(repo.list_recent(1, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cleanup_expired() {
        let db = setup_db().await;
        let repo = RefreshTokenRepository::new(db.pool());

        repo.create(&record(1, "old", "2000-01-01 00:00:00"))
            .await
            .unwrap();
        repo.create(&record(1, "current", "2099-12-31 23:59:59"))
            .await
            .unwrap();

        let deleted = repo.cleanup_expired().await.unwrap();
        assert_eq!(deleted, 1);

        let remaining = repo.list_recent(1, 10).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].token_hash, "current");
    }
}
