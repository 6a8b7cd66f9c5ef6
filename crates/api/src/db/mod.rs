//! Persistence for the Koi Farm `PostgreSQL` database.
//!
//! # Tables (schema `koi`)
//!
//! - `user_account` - Customers, staff and managers
//! - `fish` - Catalog items
//! - `customer_order` - Order headers (status, version)
//! - `order_line` - One row per (order, fish)
//!
//! Each aggregate is reached through a store trait ([`OrderStore`],
//! [`FishStore`], [`UserStore`]) with a `PostgreSQL` implementation and an
//! in-memory implementation in [`memory`].
//!
//! # Migrations
//!
//! Migrations are stored in `crates/api/migrations/` and run via:
//! ```bash
//! cargo run -p koi-farm-cli -- migrate
//! ```

pub mod fish;
pub mod memory;
pub mod orders;
pub mod users;

use std::sync::Arc;
use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

pub use fish::{FishStore, PgFishRepository};
pub use orders::{OrderStore, PgOrderRepository};
pub use users::{PgUserRepository, UserStore};

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation or stale write.
    #[error("conflict: {0}")]
    Conflict(String),
}

/// Map a unique-constraint violation to `RepositoryError::Conflict`.
pub(crate) fn map_unique_violation(e: sqlx::Error, what: &str) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = e
        && db_err.is_unique_violation()
    {
        return RepositoryError::Conflict(format!("{what} already exists"));
    }
    RepositoryError::Database(e)
}

/// The set of stores the API runs against.
#[derive(Clone)]
pub struct Stores {
    pub orders: Arc<dyn OrderStore>,
    pub fish: Arc<dyn FishStore>,
    pub users: Arc<dyn UserStore>,
}

impl Stores {
    /// Stores backed by `PostgreSQL`.
    #[must_use]
    pub fn postgres(pool: &PgPool) -> Self {
        Self {
            orders: Arc::new(PgOrderRepository::new(pool.clone())),
            fish: Arc::new(PgFishRepository::new(pool.clone())),
            users: Arc::new(PgUserRepository::new(pool.clone())),
        }
    }

    /// Empty in-memory stores (tests and local demos).
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            orders: Arc::new(memory::MemoryOrderStore::default()),
            fish: Arc::new(memory::MemoryFishStore::default()),
            users: Arc::new(memory::MemoryUserStore::default()),
        }
    }
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}
