//! User account persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};

use koi_farm_core::{Email, Role, UserId, Username};

use super::{RepositoryError, map_unique_violation};
use crate::models::{NewUser, User};

/// Storage for user accounts.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a user.
    ///
    /// Returns `RepositoryError::Conflict` if the username, email or Google
    /// subject is already taken.
    async fn create(&self, user: NewUser) -> Result<User, RepositoryError>;

    /// Get a user by ID.
    async fn get_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError>;

    /// Get a user by login name.
    async fn get_by_username(&self, username: &Username) -> Result<Option<User>, RepositoryError>;

    /// Get a user by email.
    async fn get_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError>;

    /// Get a user by linked Google subject.
    async fn get_by_google_subject(&self, subject: &str) -> Result<Option<User>, RepositoryError>;

    /// Get a user and their password hash.
    ///
    /// Returns `None` if the user doesn't exist or has no password set.
    async fn get_password_hash(
        &self,
        username: &Username,
    ) -> Result<Option<(User, String)>, RepositoryError>;

    /// Link a Google subject to an existing account.
    ///
    /// Relinking the same subject is a no-op. An account already linked to a
    /// different subject is left alone and the call fails with `Conflict`.
    async fn link_google_subject(&self, id: UserId, subject: &str)
    -> Result<User, RepositoryError>;
}

#[derive(FromRow)]
struct UserRow {
    id: UserId,
    username: String,
    email: Option<String>,
    full_name: String,
    role: Role,
    google_subject: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct UserWithHashRow {
    #[sqlx(flatten)]
    user: UserRow,
    password_hash: Option<String>,
}

impl TryFrom<UserRow> for User {
    type Error = RepositoryError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let username = Username::parse(&row.username).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid username in database: {e}"))
        })?;
        let email = row
            .email
            .as_deref()
            .map(Email::parse)
            .transpose()
            .map_err(|e| {
                RepositoryError::DataCorruption(format!("invalid email in database: {e}"))
            })?;

        Ok(Self {
            id: row.id,
            username,
            email,
            full_name: row.full_name,
            role: row.role,
            google_subject: row.google_subject,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const USER_COLUMNS: &str =
    "id, username, email, full_name, role, google_subject, created_at, updated_at";

/// `PostgreSQL` implementation of [`UserStore`].
#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    /// Create a new user repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_one_where(
        &self,
        predicate: &str,
        value: &str,
    ) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM koi.user_account WHERE {predicate} = $1"
        ))
        .bind(value)
        .fetch_optional(&self.pool)
        .await?;

        row.map(User::try_from).transpose()
    }
}

#[async_trait]
impl UserStore for PgUserRepository {
    async fn create(&self, user: NewUser) -> Result<User, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "INSERT INTO koi.user_account
                 (username, email, full_name, role, password_hash, google_subject)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {USER_COLUMNS}"
        ))
        .bind(user.username.as_str())
        .bind(user.email.as_ref().map(Email::as_str))
        .bind(&user.full_name)
        .bind(user.role)
        .bind(&user.password_hash)
        .bind(&user.google_subject)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, "user"))?;

        row.try_into()
    }

    async fn get_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM koi.user_account WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(User::try_from).transpose()
    }

    async fn get_by_username(&self, username: &Username) -> Result<Option<User>, RepositoryError> {
        self.fetch_one_where("username", username.as_str()).await
    }

    async fn get_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError> {
        self.fetch_one_where("email", email.as_str()).await
    }

    async fn get_by_google_subject(&self, subject: &str) -> Result<Option<User>, RepositoryError> {
        self.fetch_one_where("google_subject", subject).await
    }

    async fn get_password_hash(
        &self,
        username: &Username,
    ) -> Result<Option<(User, String)>, RepositoryError> {
        let row = sqlx::query_as::<_, UserWithHashRow>(&format!(
            "SELECT {USER_COLUMNS}, password_hash FROM koi.user_account WHERE username = $1"
        ))
        .bind(username.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(UserWithHashRow {
                user,
                password_hash: Some(hash),
            }) => Ok(Some((user.try_into()?, hash))),
            _ => Ok(None),
        }
    }

    async fn link_google_subject(
        &self,
        id: UserId,
        subject: &str,
    ) -> Result<User, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "UPDATE koi.user_account
             SET google_subject = $2, updated_at = now()
             WHERE id = $1 AND (google_subject IS NULL OR google_subject = $2)
             RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(subject)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, "google account link"))?;

        if let Some(row) = row {
            return row.try_into();
        }

        let exists: Option<i32> =
            sqlx::query_scalar("SELECT id FROM koi.user_account WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        match exists {
            Some(_) => Err(RepositoryError::Conflict(format!(
                "user {id} is linked to a different google account"
            ))),
            None => Err(RepositoryError::NotFound),
        }
    }
}
