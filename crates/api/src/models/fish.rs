//! Catalog fish.

use chrono::{DateTime, Utc};

use koi_farm_core::{FishId, Price};

/// A koi offered in the catalog.
#[derive(Debug, Clone)]
pub struct Fish {
    pub id: FishId,
    pub name: String,
    pub breed: String,
    pub price: Price,
    pub image_url: Option<String>,
    pub description: Option<String>,
    /// Sold or reserved fish stay listed but cannot be ordered.
    pub available: bool,
    pub created_at: DateTime<Utc>,
}

/// Catalog entry to insert or update (keyed by name).
#[derive(Debug, Clone, serde::Deserialize)]
pub struct NewFish {
    pub name: String,
    pub breed: String,
    pub price: Price,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_available")]
    pub available: bool,
}

const fn default_available() -> bool {
    true
}

impl Fish {
    /// Case-insensitive substring match on the fish name.
    #[must_use]
    pub fn name_matches(&self, needle: &str) -> bool {
        self.name.to_lowercase().contains(&needle.to_lowercase())
    }
}
