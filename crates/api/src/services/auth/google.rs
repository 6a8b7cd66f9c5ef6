//! Google sign-in (OAuth 2.0 authorization code flow).

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Deserialize;
use thiserror::Error;

use crate::config::GoogleOAuthConfig;

const AUTHORIZE_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";

/// Errors talking to the identity provider.
#[derive(Debug, Error)]
pub enum OAuthError {
    /// HTTP request failed.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Provider rejected the authorization code.
    #[error("token exchange failed: {0}")]
    TokenExchange(String),

    /// Provider returned a profile we cannot use.
    #[error("invalid profile: {0}")]
    Profile(String),
}

/// Profile returned by the identity provider after a successful exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalProfile {
    /// Stable account identifier at the provider.
    pub subject: String,
    pub email: Option<String>,
    pub email_verified: bool,
    pub name: Option<String>,
}

/// An external OAuth identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// URL the client should open to start sign-in.
    fn authorization_url(&self, state: &str) -> String;

    /// Exchange an authorization code for the signed-in profile.
    async fn exchange_code(&self, code: &str) -> Result<ExternalProfile, OAuthError>;
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct UserInfo {
    sub: String,
    email: Option<String>,
    #[serde(default)]
    email_verified: bool,
    name: Option<String>,
}

/// Google OpenID Connect client.
#[derive(Clone)]
pub struct GoogleClient {
    inner: Arc<GoogleClientInner>,
}

struct GoogleClientInner {
    client: reqwest::Client,
    config: GoogleOAuthConfig,
}

impl GoogleClient {
    /// Create a new Google sign-in client.
    #[must_use]
    pub fn new(config: GoogleOAuthConfig) -> Self {
        Self {
            inner: Arc::new(GoogleClientInner {
                client: reqwest::Client::new(),
                config,
            }),
        }
    }
}

#[async_trait]
impl IdentityProvider for GoogleClient {
    fn authorization_url(&self, state: &str) -> String {
        let config = &self.inner.config;
        format!(
            "{AUTHORIZE_URL}?\
            client_id={}&\
            response_type=code&\
            redirect_uri={}&\
            scope=openid%20email%20profile&\
            access_type=online&\
            prompt=select_account&\
            state={}",
            urlencoding::encode(&config.client_id),
            urlencoding::encode(&config.redirect_uri),
            urlencoding::encode(state)
        )
    }

    async fn exchange_code(&self, code: &str) -> Result<ExternalProfile, OAuthError> {
        let config = &self.inner.config;
        let params = [
            ("grant_type", "authorization_code"),
            ("client_id", config.client_id.as_str()),
            ("client_secret", config.client_secret.expose_secret()),
            ("code", code),
            ("redirect_uri", config.redirect_uri.as_str()),
        ];

        let response = self.inner.client.post(TOKEN_URL).form(&params).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            tracing::warn!(%status, body = %text, "Google token exchange failed");
            return Err(OAuthError::TokenExchange(format!("status {status}")));
        }
        let token: TokenResponse = response.json().await?;

        let info: UserInfo = self
            .inner
            .client
            .get(USERINFO_URL)
            .bearer_auth(&token.access_token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if info.sub.trim().is_empty() {
            return Err(OAuthError::Profile("missing subject".to_owned()));
        }

        Ok(ExternalProfile {
            subject: info.sub,
            email: info.email,
            email_verified: info.email_verified,
            name: info.name,
        })
    }
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;

    use super::*;

    #[test]
    fn test_authorization_url_encodes_parameters() {
        let client = GoogleClient::new(GoogleOAuthConfig {
            client_id: "client id".to_owned(),
            client_secret: SecretString::from("secret".to_owned()),
            redirect_uri: "http://localhost:5000/api/users/login/google/callback".to_owned(),
        });

        let url = client.authorization_url("abc.def");
        assert!(url.starts_with(AUTHORIZE_URL));
        assert!(url.contains("client_id=client%20id"));
        assert!(url.contains(
            "redirect_uri=http%3A%2F%2Flocalhost%3A5000%2Fapi%2Fusers%2Flogin%2Fgoogle%2Fcallback"
        ));
        assert!(url.contains("state=abc.def"));
        assert!(!url.contains("secret"));
    }
}
