//! Signed bearer tokens.
//!
//! Tokens are compact JWTs (`header.claims.signature`, base64url without
//! padding) signed with HMAC-SHA256. The same key also signs the short-lived
//! `state` parameter of the Google sign-in round trip, under a separate
//! domain prefix so neither can be replayed as the other.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

use koi_farm_core::{Role, UserId, Username};

use crate::config::TokenConfig;
use crate::models::CurrentUser;

type HmacSha256 = Hmac<Sha256>;

/// Minutes a Google sign-in `state` stays valid.
const OAUTH_STATE_TTL_MINUTES: i64 = 10;

const JWT_HEADER: &str = r#"{"alg":"HS256","typ":"JWT"}"#;
const STATE_DOMAIN: &[u8] = b"koi-oauth-state:";

/// Reasons a token or state value is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("malformed token")]
    Malformed,
    #[error("bad signature")]
    BadSignature,
    #[error("token expired")]
    Expired,
    #[error("unsupported token algorithm")]
    UnsupportedAlgorithm,
    #[error("signing key rejected")]
    InvalidKey,
}

#[derive(Debug, Deserialize)]
struct Header {
    alg: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: UserId,
    name: Username,
    role: Role,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Serialize, Deserialize)]
struct StateClaims {
    nonce: String,
    exp: i64,
}

/// A freshly issued bearer token.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Produces signed, time-bounded tokens for a verified identity.
pub trait TokenIssuer: Send + Sync {
    fn issue(&self, user: &CurrentUser) -> IssuedToken;
}

/// Turns a presented token back into the identity it was issued for.
pub trait TokenVerifier: Send + Sync {
    /// # Errors
    ///
    /// Returns a `TokenError` if the token is malformed, tampered with, or expired.
    fn verify(&self, token: &str) -> Result<CurrentUser, TokenError>;
}

/// Signs and checks the `state` parameter of an OAuth redirect.
pub trait OAuthStateSigner: Send + Sync {
    /// Create a signed, expiring `state` value.
    fn issue_state(&self) -> String;

    /// # Errors
    ///
    /// Returns a `TokenError` if the state was not issued by this signer or has expired.
    fn verify_state(&self, state: &str) -> Result<(), TokenError>;
}

/// The token capabilities the application depends on, held as trait objects.
#[derive(Clone)]
pub struct TokenServices {
    pub issuer: Arc<dyn TokenIssuer>,
    pub verifier: Arc<dyn TokenVerifier>,
    pub oauth_state: Arc<dyn OAuthStateSigner>,
}

impl From<HmacTokenService> for TokenServices {
    fn from(service: HmacTokenService) -> Self {
        let service = Arc::new(service);
        Self {
            issuer: service.clone(),
            verifier: service.clone(),
            oauth_state: service,
        }
    }
}

/// Issues and verifies HS256 bearer tokens.
#[derive(Clone)]
pub struct HmacTokenService {
    key: HmacSha256,
    ttl: Duration,
}

impl std::fmt::Debug for HmacTokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HmacTokenService")
            .field("secret", &"[REDACTED]")
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl HmacTokenService {
    /// Key the service from the configured secret.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::InvalidKey` if the HMAC implementation rejects the key.
    pub fn new(config: &TokenConfig) -> Result<Self, TokenError> {
        let key = HmacSha256::new_from_slice(config.secret.expose_secret().as_bytes())
            .map_err(|_| TokenError::InvalidKey)?;
        Ok(Self {
            key,
            ttl: config.ttl,
        })
    }

    fn mac(&self, domain: &[u8]) -> HmacSha256 {
        let mut mac = self.key.clone();
        mac.update(domain);
        mac
    }

    fn sign(&self, domain: &[u8], message: &str) -> String {
        let mut mac = self.mac(domain);
        mac.update(message.as_bytes());
        URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
    }

    fn check_signature(&self, domain: &[u8], message: &str, sig: &str) -> Result<(), TokenError> {
        let sig = URL_SAFE_NO_PAD
            .decode(sig)
            .map_err(|_| TokenError::Malformed)?;
        let mut mac = self.mac(domain);
        mac.update(message.as_bytes());
        mac.verify_slice(&sig).map_err(|_| TokenError::BadSignature)
    }

    /// Issue a token as if the current time were `now`.
    #[must_use]
    pub fn issue_at(&self, user: &CurrentUser, now: DateTime<Utc>) -> IssuedToken {
        let ttl = chrono::Duration::from_std(self.ttl).unwrap_or(chrono::Duration::hours(2));
        let expires_at = now + ttl;
        let claims = Claims {
            sub: user.id,
            name: user.username.clone(),
            role: user.role,
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        // Claims contain only strings and integers
        let claims_json = serde_json::to_vec(&claims).unwrap_or_default();
        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(JWT_HEADER),
            URL_SAFE_NO_PAD.encode(claims_json)
        );
        let signature = self.sign(b"", &signing_input);

        IssuedToken {
            token: format!("{signing_input}.{signature}"),
            expires_at,
        }
    }

    /// Verify a token as if the current time were `now`.
    ///
    /// # Errors
    ///
    /// Returns a `TokenError` if the token is malformed, tampered with, or expired.
    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<CurrentUser, TokenError> {
        let mut parts = token.split('.');
        let (Some(header_b64), Some(claims_b64), Some(sig), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(TokenError::Malformed);
        };

        let header: Header = decode_json(header_b64)?;
        if header.alg != "HS256" {
            return Err(TokenError::UnsupportedAlgorithm);
        }

        let signing_input = format!("{header_b64}.{claims_b64}");
        self.check_signature(b"", &signing_input, sig)?;

        let claims: Claims = decode_json(claims_b64)?;
        if now.timestamp() >= claims.exp {
            return Err(TokenError::Expired);
        }

        Ok(CurrentUser {
            id: claims.sub,
            username: claims.name,
            role: claims.role,
        })
    }

    /// Create a signed, expiring `state` value for the Google sign-in redirect.
    #[must_use]
    pub fn issue_oauth_state(&self) -> String {
        let nonce: [u8; 16] = rand::random();
        let claims = StateClaims {
            nonce: URL_SAFE_NO_PAD.encode(nonce),
            exp: (Utc::now() + chrono::Duration::minutes(OAUTH_STATE_TTL_MINUTES)).timestamp(),
        };
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims).unwrap_or_default());
        let signature = self.sign(STATE_DOMAIN, &payload);
        format!("{payload}.{signature}")
    }

    /// Check a `state` value returned by the Google callback.
    ///
    /// # Errors
    ///
    /// Returns a `TokenError` if the state was not issued by this service or has expired.
    pub fn verify_oauth_state(&self, state: &str) -> Result<(), TokenError> {
        let (payload, sig) = state.split_once('.').ok_or(TokenError::Malformed)?;
        self.check_signature(STATE_DOMAIN, payload, sig)?;
        let claims: StateClaims = decode_json(payload)?;
        if Utc::now().timestamp() >= claims.exp {
            return Err(TokenError::Expired);
        }
        Ok(())
    }
}

impl TokenIssuer for HmacTokenService {
    fn issue(&self, user: &CurrentUser) -> IssuedToken {
        self.issue_at(user, Utc::now())
    }
}

impl TokenVerifier for HmacTokenService {
    fn verify(&self, token: &str) -> Result<CurrentUser, TokenError> {
        self.verify_at(token, Utc::now())
    }
}

impl OAuthStateSigner for HmacTokenService {
    fn issue_state(&self) -> String {
        self.issue_oauth_state()
    }

    fn verify_state(&self, state: &str) -> Result<(), TokenError> {
        self.verify_oauth_state(state)
    }
}

fn decode_json<T: serde::de::DeserializeOwned>(part: &str) -> Result<T, TokenError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(part)
        .map_err(|_| TokenError::Malformed)?;
    serde_json::from_slice(&bytes).map_err(|_| TokenError::Malformed)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    fn service(secret: &str) -> HmacTokenService {
        HmacTokenService::new(&TokenConfig {
            secret: SecretString::from(secret.to_owned()),
            ttl: Duration::from_secs(3600),
        })
        .unwrap()
    }

    fn alice() -> CurrentUser {
        CurrentUser {
            id: UserId::new(3),
            username: Username::parse("alice").unwrap(),
            role: Role::Staff,
        }
    }

    #[test]
    fn test_issue_then_verify() {
        let tokens = service("a-very-long-and-random-test-secret-value");
        let issued = tokens.issue(&alice());
        assert_eq!(issued.token.split('.').count(), 3);
        assert_eq!(tokens.verify(&issued.token).unwrap(), alice());
    }

    #[test]
    fn test_expired_token_rejected() {
        let tokens = service("a-very-long-and-random-test-secret-value");
        let issued = tokens.issue_at(&alice(), Utc::now() - chrono::Duration::hours(2));
        assert_eq!(tokens.verify(&issued.token), Err(TokenError::Expired));
    }

    #[test]
    fn test_wrong_key_rejected() {
        let issued = service("a-very-long-and-random-test-secret-value").issue(&alice());
        let other = service("a-completely-different-test-secret-value");
        assert_eq!(other.verify(&issued.token), Err(TokenError::BadSignature));
    }

    #[test]
    fn test_tampered_claims_rejected() {
        let tokens = service("a-very-long-and-random-test-secret-value");
        let issued = tokens.issue(&alice());
        let forged = URL_SAFE_NO_PAD.encode(
            r#"{"sub":3,"name":"alice","role":"manager","iat":0,"exp":99999999999}"#,
        );
        let mut parts: Vec<&str> = issued.token.split('.').collect();
        parts[1] = &forged;
        assert_eq!(
            tokens.verify(&parts.join(".")),
            Err(TokenError::BadSignature)
        );
    }

    #[test]
    fn test_garbage_is_malformed() {
        let tokens = service("a-very-long-and-random-test-secret-value");
        assert_eq!(tokens.verify("not-a-token"), Err(TokenError::Malformed));
        assert_eq!(tokens.verify("a.b.c.d"), Err(TokenError::Malformed));
    }

    #[test]
    fn test_alg_none_rejected() {
        let tokens = service("a-very-long-and-random-test-secret-value");
        let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"none","typ":"JWT"}"#);
        let claims = URL_SAFE_NO_PAD.encode(r#"{"sub":1,"name":"eve","role":"manager","iat":0,"exp":99999999999}"#);
        assert_eq!(
            tokens.verify(&format!("{header}.{claims}.")),
            Err(TokenError::UnsupportedAlgorithm)
        );
    }

    #[test]
    fn test_oauth_state_roundtrip_and_domain_separation() {
        let tokens = service("a-very-long-and-random-test-secret-value");
        let state = tokens.issue_oauth_state();
        assert!(tokens.verify_oauth_state(&state).is_ok());
        assert!(tokens.verify_oauth_state("forged.state").is_err());

        let issued = tokens.issue(&alice());
        let (_, rest) = issued.token.split_once('.').unwrap();
        assert!(tokens.verify_oauth_state(rest).is_err());
    }

    #[test]
    fn test_bundle_shares_one_key() {
        let services = TokenServices::from(service("a-very-long-and-random-test-secret-value"));
        let issued = services.issuer.issue(&alice());
        assert_eq!(services.verifier.verify(&issued.token).unwrap(), alice());

        let state = services.oauth_state.issue_state();
        assert!(services.oauth_state.verify_state(&state).is_ok());
        assert!(services.verifier.verify(&state).is_err());
    }
}
