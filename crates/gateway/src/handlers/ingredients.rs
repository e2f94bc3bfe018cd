//! Ingredient handlers (read-only reference data)

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;

use crate::AppState;
use foodgram_common::{
    db::{models::Ingredient, Repository},
    errors::{AppError, Result},
};

#[derive(Debug, Default, Deserialize)]
pub struct IngredientSearch {
    /// Case-insensitive name prefix
    pub name: Option<String>,
}

pub async fn list_ingredients(
    State(state): State<AppState>,
    Query(search): Query<IngredientSearch>,
) -> Result<Json<Vec<Ingredient>>> {
    let ingredients = Repository::new(state.db.clone())
        .list_ingredients(search.name.as_deref())
        .await?;
    Ok(Json(ingredients))
}

pub async fn get_ingredient(
    State(state): State<AppState>,
    Path(ingredient_id): Path<i32>,
) -> Result<Json<Ingredient>> {
    Repository::new(state.db.clone())
        .find_ingredient(ingredient_id)
        .await?
        .map(Json)
        .ok_or(AppError::IngredientNotFound {
            ids: vec![ingredient_id],
        })
}
