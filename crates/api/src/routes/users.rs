//! User and sign-in routes.
//!
//! ```text
//! POST /api/users/register-customer      - Register a customer
//! POST /api/users/staff                  - Add staff (manager only)
//! POST /api/users/login                  - Username/password login
//! GET  /api/users/me                     - Caller's profile
//! GET  /api/users/login/google           - Google consent URL
//! GET  /api/users/login/google/callback  - Finish Google sign-in
//! ```

use axum::{Json, extract::State};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use koi_farm_core::{Role, UserId};

use super::{ApiJson, ApiQuery};
use crate::error::{AppError, Result};
use crate::middleware::RequireAuth;
use crate::models::User;
use crate::services::auth::{IssuedToken, NewAccount};
use crate::state::AppState;

/// Body for registration and staff creation.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountRequest {
    pub username: String,
    pub password: String,
    pub full_name: String,
    #[serde(default)]
    pub email: Option<String>,
}

impl std::fmt::Debug for AccountRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountRequest")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("full_name", &self.full_name)
            .field("email", &self.email)
            .finish()
    }
}

impl From<AccountRequest> for NewAccount {
    fn from(req: AccountRequest) -> Self {
        Self {
            username: req.username,
            password: req.password,
            full_name: req.full_name,
            email: req.email,
        }
    }
}

/// Body for password login.
#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Plain confirmation message.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Issued bearer token.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl From<IssuedToken> for TokenResponse {
    fn from(issued: IssuedToken) -> Self {
        Self {
            token: issued.token,
            expires_at: issued.expires_at,
        }
    }
}

/// Consent URL to open in the browser.
#[derive(Debug, Serialize)]
pub struct UrlResponse {
    pub url: String,
}

/// Caller's profile.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub user_id: UserId,
    pub username: String,
    pub full_name: String,
    pub email: Option<String>,
    pub role: Role,
    pub google_linked: bool,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserView {
    fn from(user: User) -> Self {
        Self {
            user_id: user.id,
            username: user.username.as_str().to_owned(),
            full_name: user.full_name,
            email: user.email.map(koi_farm_core::Email::into_inner),
            role: user.role,
            google_linked: user.google_subject.is_some(),
            created_at: user.created_at,
        }
    }
}

/// Query parameters Google appends to the redirect URI.
#[derive(Debug, Deserialize)]
pub struct GoogleCallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// Register a new customer.
///
/// POST /api/users/register-customer
#[instrument(skip(state))]
pub async fn register_customer(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<AccountRequest>,
) -> Result<Json<MessageResponse>> {
    state.auth().register_customer(body.into()).await?;
    Ok(Json(MessageResponse {
        message: "Customer registered successfully.".to_owned(),
    }))
}

/// Add a staff account. Managers only.
///
/// POST /api/users/staff
#[instrument(skip(state, caller), fields(user_id = %caller.id))]
pub async fn add_staff(
    State(state): State<AppState>,
    RequireAuth(caller): RequireAuth,
    ApiJson(body): ApiJson<AccountRequest>,
) -> Result<Json<MessageResponse>> {
    state.auth().add_staff(&caller, body.into()).await?;
    Ok(Json(MessageResponse {
        message: "Staff added successfully.".to_owned(),
    }))
}

/// Log in with username and password.
///
/// POST /api/users/login
#[instrument(skip(state, body), fields(username = %body.username))]
pub async fn login(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<LoginRequest>,
) -> Result<Json<TokenResponse>> {
    let issued = state.auth().login(&body.username, &body.password).await?;
    Ok(Json(issued.into()))
}

/// The caller's own profile.
///
/// GET /api/users/me
#[instrument(skip(state, caller), fields(user_id = %caller.id))]
pub async fn me(
    State(state): State<AppState>,
    RequireAuth(caller): RequireAuth,
) -> Result<Json<UserView>> {
    let user = state.auth().current_user(&caller).await?;
    Ok(Json(user.into()))
}

/// Start Google sign-in.
///
/// GET /api/users/login/google
#[instrument(skip(state))]
pub async fn google_login(State(state): State<AppState>) -> Json<UrlResponse> {
    Json(UrlResponse {
        url: state.auth().google_authorization_url(),
    })
}

/// Finish Google sign-in. Every failure is a 400.
///
/// GET /api/users/login/google/callback
#[instrument(skip(state, params))]
pub async fn google_callback(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<GoogleCallbackParams>,
) -> Result<Json<TokenResponse>> {
    if let Some(error) = params.error {
        tracing::info!(%error, "Google sign-in declined");
        return Err(AppError::BadRequest("Google sign-in was cancelled".to_owned()));
    }

    let (Some(code), Some(oauth_state)) = (params.code, params.state) else {
        return Err(AppError::BadRequest(
            "Missing code or state parameter".to_owned(),
        ));
    };

    let issued = state
        .auth()
        .google_login(&code, &oauth_state)
        .await
        .map_err(AppError::OAuthCallback)?;
    Ok(Json(issued.into()))
}
