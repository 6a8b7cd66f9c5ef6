//! Fish catalog routes (read-only).

use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use koi_farm_core::{FishId, Price};

use super::{ApiPath, ApiQuery};
use crate::error::{AppError, Result};
use crate::models::Fish;
use crate::state::AppState;

/// A catalog entry as returned to clients.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FishView {
    pub fish_id: FishId,
    pub name: String,
    pub breed: String,
    pub price: Price,
    pub image_url: Option<String>,
    pub description: Option<String>,
    pub available: bool,
}

impl From<Fish> for FishView {
    fn from(fish: Fish) -> Self {
        Self {
            fish_id: fish.id,
            name: fish.name,
            breed: fish.breed,
            price: fish.price,
            image_url: fish.image_url,
            description: fish.description,
            available: fish.available,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub search: Option<String>,
}

/// GET /api/fishs
#[instrument(skip(state))]
pub async fn list(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<SearchParams>,
) -> Result<Json<Vec<FishView>>> {
    let fish = state.stores().fish.list(params.search.as_deref()).await?;
    Ok(Json(fish.into_iter().map(FishView::from).collect()))
}

/// GET /api/fishs/{fishId}
#[instrument(skip(state))]
pub async fn show(
    State(state): State<AppState>,
    ApiPath(fish_id): ApiPath<FishId>,
) -> Result<Json<FishView>> {
    let fish = state
        .stores()
        .fish
        .get_by_id(fish_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Fish {fish_id}")))?;
    Ok(Json(fish.into()))
}
