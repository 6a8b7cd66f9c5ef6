//! Integration tests for the Koi Farm shop.
//!
//! # Running Tests
//!
//! ```bash
//! # In-process tests over in-memory stores
//! cargo test -p koi-farm-integration-tests
//!
//! # Include the PostgreSQL round trip (needs a migrated database)
//! KOI_DATABASE_URL=postgres://... cargo test -p koi-farm-integration-tests -- --ignored
//! ```
//!
//! # Test Categories
//!
//! - `orders` - Order lifecycle, ownership and concurrency
//! - `users` - Registration, login, staff creation and Google sign-in
//! - `catalog` - Fish listing and lookup
//!
//! [`TestApp`] builds the full router (request IDs, tracing, CORS) over
//! in-memory stores and drives it with `tower::ServiceExt::oneshot`, so no
//! port or database is needed.

#![allow(clippy::missing_panics_doc, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use rust_decimal::Decimal;
use secrecy::SecretString;
use serde_json::Value;
use tower::ServiceExt;

use koi_farm_api::config::TokenConfig;
use koi_farm_api::db::Stores;
use koi_farm_api::models::{NewFish, User};
use koi_farm_api::routes;
use koi_farm_api::services::auth::{
    ExternalProfile, HmacTokenService, IdentityProvider, NewAccount, OAuthError, create_account,
};
use koi_farm_api::state::AppState;
use koi_farm_core::{Price, Role};

/// Signing key used by every test app.
pub const TEST_TOKEN_SECRET: &str = "t3st-K0i!pond#Signing$Key%2026^xyz";

/// Password given to every account created by [`TestApp::create_user`].
pub const TEST_PASSWORD: &str = "nishikigoi-2026";

/// Code the stub provider accepts.
pub const GOOGLE_CODE: &str = "good-code";

/// Identity provider that accepts [`GOOGLE_CODE`] and returns a fixed profile.
pub struct StubGoogle {
    profile: ExternalProfile,
}

impl StubGoogle {
    #[must_use]
    pub const fn new(profile: ExternalProfile) -> Self {
        Self { profile }
    }
}

impl Default for StubGoogle {
    fn default() -> Self {
        Self::new(ExternalProfile {
            subject: "104242".to_owned(),
            email: Some("koi.fan@example.com".to_owned()),
            email_verified: true,
            name: Some("Koi Fan".to_owned()),
        })
    }
}

#[async_trait]
impl IdentityProvider for StubGoogle {
    fn authorization_url(&self, state: &str) -> String {
        format!("https://accounts.example.test/o/oauth2/auth?state={state}")
    }

    async fn exchange_code(&self, code: &str) -> Result<ExternalProfile, OAuthError> {
        if code == GOOGLE_CODE {
            Ok(self.profile.clone())
        } else {
            Err(OAuthError::TokenExchange("invalid_grant".to_owned()))
        }
    }
}

/// A decoded response.
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    /// Parsed JSON body; plain text becomes a string, empty becomes `Value::Null`.
    pub body: Value,
}

impl TestResponse {
    /// The `error` field of an error body.
    #[must_use]
    pub fn error(&self) -> &str {
        self.body["error"].as_str().unwrap_or_default()
    }
}

/// The application under test.
pub struct TestApp {
    router: Router,
    state: AppState,
}

impl TestApp {
    /// App with the stock catalog and the default Google profile.
    pub async fn new() -> Self {
        Self::with_google(StubGoogle::default()).await
    }

    /// App with the stock catalog and a custom Google profile.
    ///
    /// Catalog ids are assigned in order: 1 Kohaku, 2 Showa, 3 Sanke,
    /// 4 Ogon (sold).
    pub async fn with_google(google: StubGoogle) -> Self {
        let tokens = HmacTokenService::new(&TokenConfig {
            secret: SecretString::from(TEST_TOKEN_SECRET.to_owned()),
            ttl: Duration::from_secs(3600),
        })
        .expect("test key is valid");

        let state = AppState::with_parts(Stores::in_memory(), tokens, Arc::new(google));
        let app = Self {
            router: routes::app(state.clone(), None),
            state,
        };
        app.seed_catalog().await;
        app
    }

    async fn seed_catalog(&self) {
        let catalog = [
            ("Kohaku Grand Champion", "Kohaku", 125_000, true),
            ("Showa Tategoi", "Showa Sanshoku", 80_000, true),
            ("Sanke Jumbo", "Taisho Sanke", 95_000, true),
            ("Yamabuki Ogon", "Ogon", 30_000, false),
        ];
        for (name, breed, cents, available) in catalog {
            self.state
                .stores()
                .fish
                .upsert(NewFish {
                    name: name.to_owned(),
                    breed: breed.to_owned(),
                    price: Price::new(Decimal::new(cents, 2)).expect("positive price"),
                    image_url: None,
                    description: None,
                    available,
                })
                .await
                .expect("seed fish");
        }
    }

    #[must_use]
    pub const fn state(&self) -> &AppState {
        &self.state
    }

    /// Create an account directly in the store and return it with a token.
    pub async fn create_user(&self, username: &str, role: Role) -> (User, String) {
        let user = create_account(
            self.state.stores().users.as_ref(),
            NewAccount {
                username: username.to_owned(),
                password: TEST_PASSWORD.to_owned(),
                full_name: format!("{username} Tanaka"),
                email: None,
            },
            role,
        )
        .await
        .expect("create test user");
        let token = self.state.token_issuer().issue(&user.identity()).token;
        (user, token)
    }

    /// Send a request through the full router.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).expect("valid request"))
            .await
            .expect("router is infallible");

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        TestResponse { status, body }
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> TestResponse {
        self.request(Method::GET, uri, token, None).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Option<Value>) -> TestResponse {
        self.request(Method::POST, uri, token, body).await
    }

    pub async fn delete(&self, uri: &str, token: Option<&str>) -> TestResponse {
        self.request(Method::DELETE, uri, token, None).await
    }

    /// Create an empty order as the token's owner and return its id.
    pub async fn create_order(&self, token: &str) -> i64 {
        let response = self.post("/api/orders", Some(token), None).await;
        assert_eq!(response.status, StatusCode::CREATED, "{:?}", response.body);
        response.body["orderId"].as_i64().expect("orderId")
    }
}
