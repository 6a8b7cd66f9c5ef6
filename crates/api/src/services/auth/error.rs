//! Authentication error types.

use thiserror::Error;

use koi_farm_core::PermissionDenied;

use super::google::OAuthError;
use super::token::TokenError;
use crate::db::RepositoryError;

/// Errors that can occur during authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Invalid email format.
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] koi_farm_core::EmailError),

    /// Invalid username format.
    #[error("invalid username: {0}")]
    InvalidUsername(#[from] koi_farm_core::UsernameError),

    /// Required field missing or blank.
    #[error("{0} is required")]
    MissingField(&'static str),

    /// Invalid credentials (wrong password or user not found).
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Token references an account that no longer exists.
    #[error("user not found")]
    UserNotFound,

    /// Username, email or Google account already registered.
    #[error("user already exists")]
    UserAlreadyExists,

    /// Password too weak or invalid.
    #[error("password validation failed: {0}")]
    WeakPassword(String),

    /// Caller's role lacks the required capability.
    #[error(transparent)]
    Forbidden(#[from] PermissionDenied),

    /// Bearer token rejected.
    #[error("invalid token: {0}")]
    Token(#[from] TokenError),

    /// Google sign-in failed.
    #[error("google sign-in failed: {0}")]
    OAuth(#[from] OAuthError),

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),

    /// Password hashing error.
    #[error("password hashing error")]
    PasswordHash,
}
