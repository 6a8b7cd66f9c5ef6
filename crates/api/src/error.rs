//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures errors to Sentry before
//! responding to the client. All route handlers should return `Result<T, AppError>`.
//! Error bodies are JSON: `{"error": "<message>"}`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::db::RepositoryError;
use crate::services::auth::AuthError;
use crate::services::orders::OrderError;

/// Application-level error type for the API.
#[derive(Debug, Error)]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    /// Order operation failed.
    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    /// Authentication operation failed.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Google sign-in callback failed; always reported as 400.
    #[error("Google callback error: {0}")]
    OAuthCallback(AuthError),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// User is not authenticated.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Whether this error is the server's fault and should go to Sentry.
    fn is_server_error(&self) -> bool {
        match self {
            Self::Database(_) | Self::Internal(_) => true,
            Self::Order(OrderError::Repository(_)) => true,
            Self::Auth(err) | Self::OAuthCallback(err) => matches!(
                err,
                AuthError::Repository(_) | AuthError::PasswordHash | AuthError::OAuth(_)
            ),
            _ => false,
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::Database(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Order(err) => match err {
                OrderError::NotFound(_) => StatusCode::NOT_FOUND,
                OrderError::FishNotFound(_)
                | OrderError::FishUnavailable(_)
                | OrderError::InvalidQuantity { .. }
                | OrderError::Rule(_) => StatusCode::BAD_REQUEST,
                OrderError::Forbidden(_) => StatusCode::FORBIDDEN,
                OrderError::Conflict(_) => StatusCode::CONFLICT,
                OrderError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Auth(err) => match err {
                AuthError::InvalidCredentials | AuthError::UserNotFound | AuthError::Token(_) => {
                    StatusCode::UNAUTHORIZED
                }
                AuthError::Forbidden(_) => StatusCode::FORBIDDEN,
                AuthError::InvalidEmail(_)
                | AuthError::InvalidUsername(_)
                | AuthError::MissingField(_)
                | AuthError::WeakPassword(_)
                | AuthError::UserAlreadyExists => StatusCode::BAD_REQUEST,
                AuthError::OAuth(_) => StatusCode::BAD_GATEWAY,
                AuthError::Repository(_) | AuthError::PasswordHash => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            Self::OAuthCallback(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        }
    }

    // Don't expose internal error details to clients
    fn client_message(&self) -> String {
        match self {
            Self::Database(_) | Self::Internal(_) => "Internal server error".to_owned(),
            Self::Order(err) => match err {
                OrderError::Repository(_) => "Internal server error".to_owned(),
                OrderError::Forbidden(_) => "Not permitted".to_owned(),
                other => capitalize(&other.to_string()),
            },
            Self::Auth(err) => auth_message(err),
            Self::OAuthCallback(err) => match err {
                AuthError::Token(_) => "Invalid or expired sign-in state".to_owned(),
                AuthError::MissingField(_) => capitalize(&err.to_string()),
                _ => "Google sign-in failed".to_owned(),
            },
            Self::NotFound(what) => format!("{what} not found"),
            Self::Unauthorized(msg) | Self::BadRequest(msg) => msg.clone(),
        }
    }
}

fn auth_message(err: &AuthError) -> String {
    match err {
        AuthError::InvalidCredentials => "Invalid username or password".to_owned(),
        AuthError::UserNotFound | AuthError::Token(_) => "Invalid or expired token".to_owned(),
        AuthError::UserAlreadyExists => "Username or email is already registered".to_owned(),
        AuthError::Forbidden(_) => "Only managers can add staff".to_owned(),
        AuthError::WeakPassword(msg) => capitalize(msg),
        AuthError::InvalidEmail(e) => capitalize(&e.to_string()),
        AuthError::InvalidUsername(e) => capitalize(&e.to_string()),
        AuthError::MissingField(_) => capitalize(&err.to_string()),
        AuthError::OAuth(_) => "External service error".to_owned(),
        AuthError::Repository(_) | AuthError::PasswordHash => "Internal server error".to_owned(),
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Capture server errors to Sentry
        if self.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        } else {
            tracing::debug!(error = %self, "Request rejected");
        }

        let status = self.status();
        let body = Json(json!({ "error": self.client_message() }));
        (status, body).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context from a user ID.
///
/// Called after bearer authentication to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString, username: &str) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            username: Some(username.to_owned()),
            ..Default::default()
        }));
    });
}
