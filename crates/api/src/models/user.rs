//! User domain types.
//!
//! These types represent validated domain objects separate from database row types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use koi_farm_core::{Email, Role, UserId, Username};

/// A shop account (customer, staff or manager).
#[derive(Debug, Clone)]
pub struct User {
    /// Unique user ID.
    pub id: UserId,
    /// Login name.
    pub username: Username,
    /// Contact email, if known.
    pub email: Option<Email>,
    /// Display name.
    pub full_name: String,
    /// Permission level.
    pub role: Role,
    /// Google account subject when linked to Google sign-in.
    pub google_subject: Option<String>,
    /// When the user was created.
    pub created_at: DateTime<Utc>,
    /// When the user was last updated.
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Identity carried in bearer tokens for this user.
    #[must_use]
    pub fn identity(&self) -> CurrentUser {
        CurrentUser {
            id: self.id,
            username: self.username.clone(),
            role: self.role,
        }
    }
}

/// Data for inserting a new user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: Username,
    pub email: Option<Email>,
    pub full_name: String,
    pub role: Role,
    /// Argon2id PHC string; `None` for Google-only accounts.
    pub password_hash: Option<String>,
    pub google_subject: Option<String>,
}

/// Authenticated caller identity.
///
/// Minimal data carried inside a bearer token to identify the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentUser {
    /// User's database ID.
    pub id: UserId,
    /// User's login name.
    pub username: Username,
    /// User's role at the time the token was issued.
    pub role: Role,
}
