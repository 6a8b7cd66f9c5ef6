//! Manager account bootstrap.
//!
//! Staff accounts can only be created by a manager through the API, so the
//! first manager has to come from here.
//!
//! # Usage
//!
//! ```bash
//! KOI_MANAGER_PASSWORD='…' koi-cli manager create -u owner -n "Farm Owner"
//! ```
//!
//! # Environment Variables
//!
//! - `KOI_DATABASE_URL` (or `DATABASE_URL`) - `PostgreSQL` connection string
//! - `KOI_MANAGER_PASSWORD` - Password for the new account

use koi_farm_api::db::PgUserRepository;
use koi_farm_api::services::auth::{AuthError, NewAccount, create_account};
use koi_farm_core::{Role, UserId};
use thiserror::Error;

use super::DatabaseSetupError;

/// Errors that can occur while creating a manager.
#[derive(Debug, Error)]
pub enum ManagerError {
    #[error(transparent)]
    Setup(#[from] DatabaseSetupError),

    /// Password variable not set.
    #[error("Missing environment variable: KOI_MANAGER_PASSWORD")]
    MissingPassword,

    /// Validation or storage failure.
    #[error("{0}")]
    Account(#[from] AuthError),
}

/// Create a manager account.
///
/// # Returns
///
/// The ID of the created user.
pub async fn create(
    username: &str,
    name: &str,
    email: Option<String>,
) -> Result<UserId, ManagerError> {
    dotenvy::dotenv().ok();
    let password =
        std::env::var("KOI_MANAGER_PASSWORD").map_err(|_| ManagerError::MissingPassword)?;

    let pool = super::connect().await?;
    let users = PgUserRepository::new(pool);

    let user = create_account(
        &users,
        NewAccount {
            username: username.to_owned(),
            password,
            full_name: name.to_owned(),
            email,
        },
        Role::Manager,
    )
    .await?;

    tracing::info!(
        "Manager created successfully! ID: {}, Username: {}",
        user.id,
        user.username
    );
    Ok(user.id)
}
