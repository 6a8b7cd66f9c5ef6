//! CLI subcommands.

pub mod manager;
pub mod migrate;
pub mod seed;

use secrecy::SecretString;
use sqlx::PgPool;
use thiserror::Error;

/// Errors shared by commands that talk to the database.
#[derive(Debug, Error)]
pub enum DatabaseSetupError {
    /// Required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    /// Database connection error.
    #[error("Database connection error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Connect using `KOI_DATABASE_URL`, falling back to `DATABASE_URL`.
///
/// Loads `.env` first.
pub async fn connect() -> Result<PgPool, DatabaseSetupError> {
    dotenvy::dotenv().ok();

    let database_url = std::env::var("KOI_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .map(SecretString::from)
        .map_err(|_| DatabaseSetupError::MissingEnvVar("KOI_DATABASE_URL"))?;

    tracing::info!("Connecting to database...");
    Ok(koi_farm_api::db::create_pool(&database_url).await?)
}
