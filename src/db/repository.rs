//! User repository for gatehouse.
//!
//! This module provides CRUD operations for users in the database.

use sqlx::SqlitePool;

use super::user::{NewUser, User};
use crate::{GatehouseError, Result};

/// Repository for user operations.
pub struct UserRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> UserRepository<'a> {
    /// Create a new UserRepository with the given database pool reference.
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a new user in the database.
    ///
    /// Returns the created user with the assigned ID.
    pub async fn create(&self, new_user: &NewUser) -> Result<User> {
        let result = sqlx::query("INSERT INTO users (email, password, name) VALUES (?, ?, ?)")
            .bind(&new_user.email)
            .bind(&new_user.password)
            .bind(&new_user.name)
            .execute(self.pool)
            .await
            .map_err(|e| GatehouseError::Database(e.to_string()))?;

        let id = result.last_insert_rowid();
        self.get_by_id(id)
            .await?
            .ok_or_else(|| GatehouseError::NotFound("user".to_string()))
    }

    /// Get a user by ID.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        let result = sqlx::query_as::<_, User>(
            "SELECT id, email, password, name, created_at, last_login_at
             FROM users WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| GatehouseError::Database(e.to_string()))?;

        Ok(result)
    }

    /// Get a user by email (case-insensitive).
    pub async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        let result = sqlx::query_as::<_, User>(
            "SELECT id, email, password, name, created_at, last_login_at
             FROM users WHERE email = ? COLLATE NOCASE",
        )
        .bind(email)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| GatehouseError::Database(e.to_string()))?;

        Ok(result)
    }

    /// Check whether an email is already registered (case-insensitive).
    pub async fn email_exists(&self, email: &str) -> Result<bool> {
        let exists: (bool,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM users WHERE email = ? COLLATE NOCASE)")
                .bind(email)
                .fetch_one(self.pool)
                .await
                .map_err(|e| GatehouseError::Database(e.to_string()))?;

        Ok(exists.0)
    }

    /// Update the last login timestamp to now.
    pub async fn update_last_login(&self, id: i64) -> Result<()> {
        sqlx::query("UPDATE users SET last_login_at = datetime('now') WHERE id = ?")
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(|e| GatehouseError::Database(e.to_string()))?;

        Ok(())
    }
}
