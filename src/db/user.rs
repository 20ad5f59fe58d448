//! User model for gatehouse.

/// User entity representing a registered account.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    /// Unique user ID. Immutable for the life of the account.
    pub id: i64,
    /// Email address (unique, used as the login identifier).
    pub email: String,
    /// Password hash (Argon2).
    pub password: String,
    /// Display name.
    pub name: String,
    /// Creation timestamp.
    pub created_at: String,
    /// Last login timestamp (None if the user has never logged in).
    pub last_login_at: Option<String>,
}

/// New user for creation.
#[derive(Debug, Clone)]
pub struct NewUser {
    /// Email address.
    pub email: String,
    /// Password hash (already hashed, never plaintext).
    pub password: String,
    /// Display name.
    pub name: String,
}

impl NewUser {
    /// Create a new user record for insertion.
    pub fn new(email: impl Into<String>, password_hash: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password_hash.into(),
            name: name.into(),
        }
    }
}
