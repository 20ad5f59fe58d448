//! Authentication: credentials, tokens, CSRF, and session lifecycle.

pub mod csrf;
pub mod password;
pub mod refresh;
pub mod session;
pub mod token;

pub use csrf::CsrfTokenManager;
pub use password::{hash_password, validate_password, verify_password, PasswordError};
pub use refresh::{ClientMeta, RefreshTokenStore};
pub use session::{
    EstablishedSession, RotatedSession, SessionError, SessionService, SessionUser,
};
pub use token::{Claims, TokenError, TokenSigner};
