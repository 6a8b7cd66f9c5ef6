//! Fish catalog persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};

use koi_farm_core::{FishId, Price};

use super::RepositoryError;
use crate::models::{Fish, NewFish};

/// Read access to the catalog, plus upsert for seeding.
#[async_trait]
pub trait FishStore: Send + Sync {
    /// Get a fish by ID.
    async fn get_by_id(&self, id: FishId) -> Result<Option<Fish>, RepositoryError>;

    /// List fish ordered by name, optionally filtered by a case-insensitive
    /// substring of the name.
    async fn list(&self, search: Option<&str>) -> Result<Vec<Fish>, RepositoryError>;

    /// Insert a fish, or update the one with the same name.
    async fn upsert(&self, fish: NewFish) -> Result<Fish, RepositoryError>;
}

#[derive(FromRow)]
struct FishRow {
    id: FishId,
    name: String,
    breed: String,
    price: Price,
    image_url: Option<String>,
    description: Option<String>,
    available: bool,
    created_at: DateTime<Utc>,
}

impl From<FishRow> for Fish {
    fn from(row: FishRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            breed: row.breed,
            price: row.price,
            image_url: row.image_url,
            description: row.description,
            available: row.available,
            created_at: row.created_at,
        }
    }
}

const FISH_COLUMNS: &str = "id, name, breed, price, image_url, description, available, created_at";

/// Escape `LIKE` metacharacters so user input matches literally.
fn like_pattern(search: &str) -> String {
    let mut escaped = String::with_capacity(search.len() + 2);
    escaped.push('%');
    for c in search.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

/// `PostgreSQL` implementation of [`FishStore`].
#[derive(Clone)]
pub struct PgFishRepository {
    pool: PgPool,
}

impl PgFishRepository {
    /// Create a new fish repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FishStore for PgFishRepository {
    async fn get_by_id(&self, id: FishId) -> Result<Option<Fish>, RepositoryError> {
        let row = sqlx::query_as::<_, FishRow>(&format!(
            "SELECT {FISH_COLUMNS} FROM koi.fish WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Fish::from))
    }

    async fn list(&self, search: Option<&str>) -> Result<Vec<Fish>, RepositoryError> {
        let pattern = search
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(like_pattern);

        let rows = sqlx::query_as::<_, FishRow>(&format!(
            "SELECT {FISH_COLUMNS} FROM koi.fish
             WHERE $1::text IS NULL OR name ILIKE $1
             ORDER BY name, id"
        ))
        .bind(pattern)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Fish::from).collect())
    }

    async fn upsert(&self, fish: NewFish) -> Result<Fish, RepositoryError> {
        let row = sqlx::query_as::<_, FishRow>(&format!(
            "INSERT INTO koi.fish (name, breed, price, image_url, description, available)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (name) DO UPDATE SET
                 breed = EXCLUDED.breed,
                 price = EXCLUDED.price,
                 image_url = EXCLUDED.image_url,
                 description = EXCLUDED.description,
                 available = EXCLUDED.available,
                 updated_at = now()
             RETURNING {FISH_COLUMNS}"
        ))
        .bind(&fish.name)
        .bind(&fish.breed)
        .bind(fish.price)
        .bind(&fish.image_url)
        .bind(&fish.description)
        .bind(fish.available)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_pattern_escapes_metacharacters() {
        assert_eq!(like_pattern("kohaku"), "%kohaku%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
    }
}
