//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::ApiConfig;
use crate::db::Stores;
use crate::services::auth::{
    AuthService, GoogleClient, HmacTokenService, IdentityProvider, TokenError, TokenIssuer,
    TokenServices, TokenVerifier,
};
use crate::services::orders::OrderService;

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like stores, the token services and the identity provider.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    stores: Stores,
    tokens: TokenServices,
    identity: Arc<dyn IdentityProvider>,
    /// `None` when running on in-memory stores.
    pool: Option<PgPool>,
}

impl AppState {
    /// State backed by `PostgreSQL` and the real Google client.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::InvalidKey` if the token secret cannot key the signer.
    pub fn new(config: &ApiConfig, pool: PgPool) -> Result<Self, TokenError> {
        Ok(Self {
            inner: Arc::new(AppStateInner {
                stores: Stores::postgres(&pool),
                tokens: HmacTokenService::new(&config.token)?.into(),
                identity: Arc::new(GoogleClient::new(config.google.clone())),
                pool: Some(pool),
            }),
        })
    }

    /// State over arbitrary stores and identity provider, without a pool.
    #[must_use]
    pub fn with_parts(
        stores: Stores,
        tokens: impl Into<TokenServices>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                stores,
                tokens: tokens.into(),
                identity,
                pool: None,
            }),
        }
    }

    /// Get the stores.
    #[must_use]
    pub fn stores(&self) -> &Stores {
        &self.inner.stores
    }

    /// Issues bearer tokens.
    #[must_use]
    pub fn token_issuer(&self) -> &dyn TokenIssuer {
        self.inner.tokens.issuer.as_ref()
    }

    /// Checks presented bearer tokens.
    #[must_use]
    pub fn token_verifier(&self) -> &dyn TokenVerifier {
        self.inner.tokens.verifier.as_ref()
    }

    /// Get the database pool, if running against `PostgreSQL`.
    #[must_use]
    pub fn pool(&self) -> Option<&PgPool> {
        self.inner.pool.as_ref()
    }

    /// Order service over this state's stores.
    #[must_use]
    pub fn orders(&self) -> OrderService<'_> {
        OrderService::new(
            self.inner.stores.orders.as_ref(),
            self.inner.stores.fish.as_ref(),
        )
    }

    /// Auth service over this state's stores.
    #[must_use]
    pub fn auth(&self) -> AuthService<'_> {
        AuthService::new(
            self.inner.stores.users.as_ref(),
            self.inner.tokens.issuer.as_ref(),
            self.inner.tokens.oauth_state.as_ref(),
            self.inner.identity.as_ref(),
        )
    }
}
