//! Seed the fish catalog from YAML.
//!
//! ```yaml
//! fish:
//!   - name: Kohaku Grand Champion
//!     breed: Kohaku
//!     price: "1250.00"
//!     description: Deep red pattern on a snow-white base.
//!     available: true
//! ```
//!
//! Entries are upserted by name, so the command can be re-run after editing
//! the file.

use std::path::Path;

use serde::Deserialize;
use tracing::{error, info};

use koi_farm_api::db::{FishStore, PgFishRepository};
use koi_farm_api::models::NewFish;

/// Top-level layout of the catalog file.
#[derive(Debug, Deserialize)]
pub struct CatalogFile {
    pub fish: Vec<NewFish>,
}

/// Problems found in a catalog before anything is written.
pub fn validate_catalog(catalog: &CatalogFile) -> Vec<String> {
    let mut errors = Vec::new();
    let mut seen = std::collections::HashSet::new();

    for (i, fish) in catalog.fish.iter().enumerate() {
        let entry = i + 1;
        if fish.name.trim().is_empty() {
            errors.push(format!("entry {entry}: name is empty"));
        }
        if fish.breed.trim().is_empty() {
            errors.push(format!("entry {entry}: breed is empty"));
        }
        if !seen.insert(fish.name.trim().to_lowercase()) {
            errors.push(format!("entry {entry}: duplicate name '{}'", fish.name));
        }
    }
    errors
}

/// Upsert every fish in `file_path`.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, fails validation,
/// or a database operation fails.
pub async fn fish(file_path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let path = Path::new(file_path);
    if !path.exists() {
        return Err(format!("File not found: {file_path}").into());
    }

    info!(path = %file_path, "Loading fish catalog from file");

    // Read and validate YAML before connecting to database
    let content = tokio::fs::read_to_string(path).await?;
    let catalog: CatalogFile = serde_yaml::from_str(&content)?;

    let errors = validate_catalog(&catalog);
    if !errors.is_empty() {
        error!("Catalog validation failed:");
        for err in &errors {
            error!("  - {err}");
        }
        return Err(format!("{} validation errors found", errors.len()).into());
    }

    let pool = super::connect().await?;
    let store = PgFishRepository::new(pool);

    let total = catalog.fish.len();
    for entry in catalog.fish {
        let saved = store.upsert(entry).await?;
        info!(fish_id = %saved.id, name = %saved.name, price = %saved.price, "Upserted fish");
    }

    info!("Seeding complete! {total} fish upserted");
    Ok(())
}
