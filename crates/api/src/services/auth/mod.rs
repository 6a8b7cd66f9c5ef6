//! Authentication service.
//!
//! Provides password accounts, staff management, bearer tokens and Google
//! sign-in.

mod error;
pub mod google;
pub mod password;
pub mod token;

pub use error::AuthError;
pub use google::{ExternalProfile, GoogleClient, IdentityProvider, OAuthError};
pub use token::{
    HmacTokenService, IssuedToken, OAuthStateSigner, TokenError, TokenIssuer, TokenServices,
    TokenVerifier,
};

use koi_farm_core::{Capability, Email, Role, Username, authorize};

use crate::db::{RepositoryError, UserStore};
use crate::models::{CurrentUser, NewUser, User};
use password::{hash_password, validate_password, verify_password};

/// Details for a new password account.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub username: String,
    pub password: String,
    pub full_name: String,
    pub email: Option<String>,
}

/// Validate `input` and create a password account with `role`.
///
/// Shared by self-registration, staff creation and the CLI manager bootstrap.
///
/// # Errors
///
/// Returns a validation `AuthError` for bad input, or
/// `AuthError::UserAlreadyExists` if the username or email is taken.
pub async fn create_account(
    users: &dyn UserStore,
    input: NewAccount,
    role: Role,
) -> Result<User, AuthError> {
    let username = Username::parse(&input.username)?;
    let full_name = input.full_name.trim();
    if full_name.is_empty() {
        return Err(AuthError::MissingField("full name"));
    }
    let email = input
        .email
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .map(Email::parse)
        .transpose()?;
    validate_password(&input.password)?;

    let password_hash = hash_password(&input.password)?;

    let user = users
        .create(NewUser {
            username,
            email,
            full_name: full_name.to_owned(),
            role,
            password_hash: Some(password_hash),
            google_subject: None,
        })
        .await
        .map_err(|e| match e {
            RepositoryError::Conflict(_) => AuthError::UserAlreadyExists,
            other => AuthError::Repository(other),
        })?;

    tracing::info!(user_id = %user.id, username = %user.username, %role, "Account created");
    Ok(user)
}

/// Authentication service.
///
/// Handles registration, login, staff creation and Google sign-in.
pub struct AuthService<'a> {
    users: &'a dyn UserStore,
    tokens: &'a dyn TokenIssuer,
    states: &'a dyn OAuthStateSigner,
    identity: &'a dyn IdentityProvider,
}

impl<'a> AuthService<'a> {
    /// Create a new authentication service.
    #[must_use]
    pub const fn new(
        users: &'a dyn UserStore,
        tokens: &'a dyn TokenIssuer,
        states: &'a dyn OAuthStateSigner,
        identity: &'a dyn IdentityProvider,
    ) -> Self {
        Self {
            users,
            tokens,
            states,
            identity,
        }
    }

    // =========================================================================
    // Password Accounts
    // =========================================================================

    /// Register a new customer with username and password.
    ///
    /// # Errors
    ///
    /// Returns a validation `AuthError` for bad input.
    /// Returns `AuthError::UserAlreadyExists` if the username or email is already registered.
    pub async fn register_customer(&self, input: NewAccount) -> Result<User, AuthError> {
        create_account(self.users, input, Role::Customer).await
    }

    /// Create a staff account on behalf of `caller`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Forbidden` (before touching storage) unless the
    /// caller may create staff, then the same errors as registration.
    pub async fn add_staff(&self, caller: &CurrentUser, input: NewAccount) -> Result<User, AuthError> {
        authorize(caller.role, Capability::CreateStaff)?;
        create_account(self.users, input, Role::Staff).await
    }

    /// Log in with username and password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` if the user doesn't exist, has no
    /// password, or the password is wrong.
    pub async fn login(&self, username: &str, password: &str) -> Result<IssuedToken, AuthError> {
        let username = Username::parse(username).map_err(|_| AuthError::InvalidCredentials)?;

        let (user, hash) = self
            .users
            .get_password_hash(&username)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        verify_password(password, &hash)?;

        tracing::info!(user_id = %user.id, "Password login");
        Ok(self.tokens.issue(&user.identity()))
    }

    /// Load the caller's own profile.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::UserNotFound` if the account behind the token is gone.
    pub async fn current_user(&self, caller: &CurrentUser) -> Result<User, AuthError> {
        self.users
            .get_by_id(caller.id)
            .await?
            .ok_or(AuthError::UserNotFound)
    }

    // =========================================================================
    // Google Sign-in
    // =========================================================================

    /// Consent URL carrying a freshly signed `state`.
    #[must_use]
    pub fn google_authorization_url(&self) -> String {
        let state = self.states.issue_state();
        self.identity.authorization_url(&state)
    }

    /// Finish Google sign-in and issue a local token.
    ///
    /// The local account is found by Google subject, otherwise an account
    /// with the same verified email is linked, otherwise a new customer is
    /// created.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Token` for a forged or expired state,
    /// `AuthError::OAuth` if the exchange fails.
    pub async fn google_login(&self, code: &str, state: &str) -> Result<IssuedToken, AuthError> {
        self.states.verify_state(state)?;
        if code.trim().is_empty() {
            return Err(AuthError::MissingField("code"));
        }

        let profile = self.identity.exchange_code(code).await?;
        let user = self.find_or_create_google_user(&profile).await?;

        tracing::info!(user_id = %user.id, "Google login");
        Ok(self.tokens.issue(&user.identity()))
    }

    async fn find_or_create_google_user(&self, profile: &ExternalProfile) -> Result<User, AuthError> {
        if let Some(user) = self.users.get_by_google_subject(&profile.subject).await? {
            return Ok(user);
        }

        let verified_email = if profile.email_verified {
            profile.email.as_deref().and_then(|e| Email::parse(e).ok())
        } else {
            None
        };

        if let Some(email) = &verified_email
            && let Some(existing) = self.users.get_by_email(email).await?
        {
            tracing::info!(user_id = %existing.id, "Linking Google account by verified email");
            return self
                .users
                .link_google_subject(existing.id, &profile.subject)
                .await
                .map_err(|e| match e {
                    RepositoryError::Conflict(_) => AuthError::UserAlreadyExists,
                    other => AuthError::Repository(other),
                });
        }

        let username = Username::parse(&format!("g-{}", profile.subject))
            .map_err(|e| OAuthError::Profile(format!("unusable subject: {e}")))?;
        let full_name = profile
            .name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .or_else(|| verified_email.as_ref().map(|e| e.as_str().to_owned()))
            .unwrap_or_else(|| username.as_str().to_owned());

        self.users
            .create(NewUser {
                username,
                email: verified_email,
                full_name,
                role: Role::Customer,
                password_hash: None,
                google_subject: Some(profile.subject.clone()),
            })
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(_) => AuthError::UserAlreadyExists,
                other => AuthError::Repository(other),
            })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use secrecy::SecretString;

    use super::*;
    use crate::config::TokenConfig;
    use crate::db::memory::MemoryUserStore;

    struct FakeGoogle {
        profile: ExternalProfile,
        seen_codes: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl IdentityProvider for FakeGoogle {
        fn authorization_url(&self, state: &str) -> String {
            format!("https://google.test/auth?state={state}")
        }

        async fn exchange_code(&self, code: &str) -> Result<ExternalProfile, OAuthError> {
            self.seen_codes.lock().unwrap().push(code.to_owned());
            Ok(self.profile.clone())
        }
    }

    fn tokens() -> HmacTokenService {
        HmacTokenService::new(&TokenConfig {
            secret: SecretString::from("k9V!q2#Lm8zR$w4Tn7pB@x1Yc6Hd3Fj0".to_owned()),
            ttl: Duration::from_secs(600),
        })
        .unwrap()
    }

    /// Hands out a fixed token and records who it was issued for.
    #[derive(Default)]
    struct StubIssuer {
        issued_for: Mutex<Vec<CurrentUser>>,
    }

    impl TokenIssuer for StubIssuer {
        fn issue(&self, user: &CurrentUser) -> IssuedToken {
            self.issued_for.lock().unwrap().push(user.clone());
            IssuedToken {
                token: "stub-token".to_owned(),
                expires_at: chrono::Utc::now(),
            }
        }
    }

    fn google(subject: &str, email: Option<&str>, verified: bool) -> FakeGoogle {
        FakeGoogle {
            profile: ExternalProfile {
                subject: subject.to_owned(),
                email: email.map(str::to_owned),
                email_verified: verified,
                name: Some("Koi Fan".to_owned()),
            },
            seen_codes: Mutex::new(Vec::new()),
        }
    }

    fn account(username: &str, email: Option<&str>) -> NewAccount {
        NewAccount {
            username: username.to_owned(),
            password: "hunter2hunter2".to_owned(),
            full_name: "Test User".to_owned(),
            email: email.map(str::to_owned),
        }
    }

    fn state_from(url: &str) -> String {
        url.split_once("state=").unwrap().1.to_owned()
    }

    #[tokio::test]
    async fn test_register_and_login() {
        let users = MemoryUserStore::default();
        let tokens = tokens();
        let idp = google("1", None, false);
        let auth = AuthService::new(&users, &tokens, &tokens, &idp);

        let user = auth.register_customer(account("alice", None)).await.unwrap();
        assert_eq!(user.role, Role::Customer);

        let issued = auth.login("alice", "hunter2hunter2").await.unwrap();
        assert_eq!(tokens.verify(&issued.token).unwrap(), user.identity());

        assert!(matches!(
            auth.login("alice", "wrong-password").await,
            Err(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            auth.login("nobody", "hunter2hunter2").await,
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_login_issues_through_injected_issuer() {
        let users = MemoryUserStore::default();
        let issuer = StubIssuer::default();
        let states = tokens();
        let idp = google("1", None, false);
        let auth = AuthService::new(&users, &issuer, &states, &idp);

        let user = auth.register_customer(account("alice", None)).await.unwrap();
        let issued = auth.login("alice", "hunter2hunter2").await.unwrap();

        assert_eq!(issued.token, "stub-token");
        assert_eq!(*issuer.issued_for.lock().unwrap(), vec![user.identity()]);

        assert!(auth.login("alice", "wrong-password").await.is_err());
        assert_eq!(issuer.issued_for.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_username_rejected() {
        let users = MemoryUserStore::default();
        let tokens = tokens();
        let idp = google("1", None, false);
        let auth = AuthService::new(&users, &tokens, &tokens, &idp);

        auth.register_customer(account("alice", None)).await.unwrap();
        assert!(matches!(
            auth.register_customer(account("alice", None)).await,
            Err(AuthError::UserAlreadyExists)
        ));
    }

    #[tokio::test]
    async fn test_add_staff_requires_manager() {
        let users = MemoryUserStore::default();
        let tokens = tokens();
        let idp = google("1", None, false);
        let auth = AuthService::new(&users, &tokens, &tokens, &idp);

        let staff_caller = CurrentUser {
            id: koi_farm_core::UserId::new(99),
            username: Username::parse("sam").unwrap(),
            role: Role::Staff,
        };
        assert!(matches!(
            auth.add_staff(&staff_caller, account("newbie", None)).await,
            Err(AuthError::Forbidden(_))
        ));
        assert!(
            users
                .get_by_username(&Username::parse("newbie").unwrap())
                .await
                .unwrap()
                .is_none()
        );

        let manager = CurrentUser {
            role: Role::Manager,
            ..staff_caller
        };
        let created = auth.add_staff(&manager, account("newbie", None)).await.unwrap();
        assert_eq!(created.role, Role::Staff);
    }

    #[tokio::test]
    async fn test_google_login_creates_then_reuses_account() {
        let users = MemoryUserStore::default();
        let tokens = tokens();
        let idp = google("10769150350006150715113082367", Some("fan@example.com"), true);
        let auth = AuthService::new(&users, &tokens, &tokens, &idp);

        let state = state_from(&auth.google_authorization_url());
        let first = auth.google_login("code-1", &state).await.unwrap();
        let second = auth.google_login("code-2", &state).await.unwrap();

        let a = tokens.verify(&first.token).unwrap();
        let b = tokens.verify(&second.token).unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(a.role, Role::Customer);
        assert_eq!(idp.seen_codes.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_google_login_links_verified_email() {
        let users = MemoryUserStore::default();
        let tokens = tokens();
        let idp = google("555", Some("Alice@Example.com"), true);
        let auth = AuthService::new(&users, &tokens, &tokens, &idp);

        let existing = auth
            .register_customer(account("alice", Some("alice@example.com")))
            .await
            .unwrap();

        let state = state_from(&auth.google_authorization_url());
        let issued = auth.google_login("code", &state).await.unwrap();
        assert_eq!(tokens.verify(&issued.token).unwrap().id, existing.id);

        let linked = users.get_by_google_subject("555").await.unwrap().unwrap();
        assert_eq!(linked.id, existing.id);
    }

    #[tokio::test]
    async fn test_google_login_does_not_relink_other_subject() {
        let users = MemoryUserStore::default();
        let tokens = tokens();
        let idp = google("new-sub", Some("alice@example.com"), true);
        let auth = AuthService::new(&users, &tokens, &tokens, &idp);

        let existing = users
            .create(NewUser {
                username: Username::parse("alice").unwrap(),
                email: Some(Email::parse("alice@example.com").unwrap()),
                full_name: "Alice".to_owned(),
                role: Role::Customer,
                password_hash: None,
                google_subject: Some("old-sub".to_owned()),
            })
            .await
            .unwrap();

        let state = state_from(&auth.google_authorization_url());
        assert!(matches!(
            auth.google_login("code", &state).await,
            Err(AuthError::UserAlreadyExists)
        ));

        let kept = users.get_by_id(existing.id).await.unwrap().unwrap();
        assert_eq!(kept.google_subject.as_deref(), Some("old-sub"));
    }

    #[tokio::test]
    async fn test_google_login_rejects_forged_state() {
        let users = MemoryUserStore::default();
        let tokens = tokens();
        let idp = google("555", None, false);
        let auth = AuthService::new(&users, &tokens, &tokens, &idp);

        assert!(matches!(
            auth.google_login("code", "forged.state").await,
            Err(AuthError::Token(_))
        ));
        assert!(idp.seen_codes.lock().unwrap().is_empty());
    }
}
