//! Recipe handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use validator::Validate;

use super::views::{recipe_view, recipe_views, RecipeView, ShortRecipeView};
use crate::AppState;
use foodgram_common::{
    auth::{AuthUser, MaybeAuthUser},
    db::{IngredientAmountInput, NewRecipe, RecipeFilter, RecipeUpdate, Repository},
    errors::{AppError, Result},
    metrics,
    pagination::{page_links, Page},
};

#[derive(Debug, Deserialize, Validate)]
pub struct IngredientAmountRequest {
    pub id: i32,

    #[validate(range(min = 1))]
    pub amount: i32,
}

impl From<&IngredientAmountRequest> for IngredientAmountInput {
    fn from(request: &IngredientAmountRequest) -> Self {
        Self {
            ingredient_id: request.id,
            amount: request.amount,
        }
    }
}

/// Request to create a recipe
#[derive(Debug, Deserialize, Validate)]
pub struct CreateRecipeRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,

    #[validate(length(min = 1))]
    pub text: String,

    #[validate(range(min = 1))]
    pub cooking_time: i32,

    /// Image as a data URL or link
    #[validate(length(min = 1))]
    pub image: String,

    pub tags: Vec<i32>,

    #[validate(nested)]
    pub ingredients: Vec<IngredientAmountRequest>,
}

/// Partial update; omitted fields are left as they are
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateRecipeRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,

    #[validate(length(min = 1))]
    pub text: Option<String>,

    #[validate(range(min = 1))]
    pub cooking_time: Option<i32>,

    #[validate(length(min = 1))]
    pub image: Option<String>,

    pub tags: Option<Vec<i32>>,

    #[validate(nested)]
    pub ingredients: Option<Vec<IngredientAmountRequest>>,
}

/// `GET /api/recipes` query string
#[derive(Debug, Default, Deserialize)]
pub struct RecipeParams {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    pub author: Option<i32>,
    /// Comma-separated tag slugs
    pub tags: Option<String>,
    pub is_favorited: Option<String>,
    pub is_in_shopping_cart: Option<String>,
}

impl RecipeParams {
    /// Personal filters only apply to an authenticated viewer
    fn filter(&self, viewer: Option<i32>) -> RecipeFilter {
        RecipeFilter {
            author_id: self.author,
            tags: self
                .tags
                .as_deref()
                .map(split_slugs)
                .unwrap_or_default(),
            favorited_by: viewer.filter(|_| is_set(self.is_favorited.as_deref())),
            in_cart_of: viewer.filter(|_| is_set(self.is_in_shopping_cart.as_deref())),
        }
    }
}

fn split_slugs(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn is_set(flag: Option<&str>) -> bool {
    matches!(flag.map(str::trim), Some("1") | Some("true"))
}

pub async fn list_recipes(
    State(state): State<AppState>,
    viewer: MaybeAuthUser,
    Query(params): Query<RecipeParams>,
) -> Result<Json<Page<RecipeView>>> {
    let page = params.page.filter(|p| *p > 0).unwrap_or(1);
    let limit = state.config.page_limit(params.limit);
    let filter = params.filter(viewer.id());

    let repo = Repository::new(state.db.clone());
    let (recipes, count) = repo.list_recipes(&filter, page, limit).await?;
    let results = recipe_views(&repo, recipes, viewer.id()).await?;

    let links = page_links(
        &state.config.pagination.public_base_url,
        "/api/recipes",
        page,
        limit,
        count,
    );

    Ok(Json(Page::new(results, count, links)))
}

pub async fn get_recipe(
    State(state): State<AppState>,
    viewer: MaybeAuthUser,
    Path(recipe_id): Path<i32>,
) -> Result<Json<RecipeView>> {
    let repo = Repository::new(state.db.clone());
    let recipe = repo.get_recipe(recipe_id).await?;
    Ok(Json(recipe_view(&repo, recipe, viewer.id()).await?))
}

pub async fn create_recipe(
    State(state): State<AppState>,
    AuthUser(current): AuthUser,
    Json(request): Json<CreateRecipeRequest>,
) -> Result<(StatusCode, Json<RecipeView>)> {
    request.validate()?;

    let new = NewRecipe {
        ingredients: request.ingredients.iter().map(Into::into).collect(),
        name: request.name,
        text: request.text,
        cooking_time: request.cooking_time,
        image: request.image,
        tag_ids: request.tags,
    };

    let repo = Repository::new(state.db.clone());
    let recipe = repo.create_recipe(current.id, new).await?;
    metrics::record_recipe_created();

    let view = recipe_view(&repo, recipe, Some(current.id)).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn update_recipe(
    State(state): State<AppState>,
    AuthUser(current): AuthUser,
    Path(recipe_id): Path<i32>,
    Json(request): Json<UpdateRecipeRequest>,
) -> Result<Json<RecipeView>> {
    request.validate()?;

    let update = RecipeUpdate {
        ingredients: request
            .ingredients
            .as_ref()
            .map(|list| list.iter().map(Into::into).collect()),
        name: request.name,
        text: request.text,
        cooking_time: request.cooking_time,
        image: request.image,
        tag_ids: request.tags,
    };

    let repo = Repository::new(state.db.clone());
    let recipe = repo.update_recipe(recipe_id, current.id, update).await?;

    Ok(Json(recipe_view(&repo, recipe, Some(current.id)).await?))
}

pub async fn delete_recipe(
    State(state): State<AppState>,
    AuthUser(current): AuthUser,
    Path(recipe_id): Path<i32>,
) -> Result<StatusCode> {
    Repository::new(state.db.clone())
        .delete_recipe(recipe_id, current.id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn add_favorite(
    State(state): State<AppState>,
    AuthUser(current): AuthUser,
    Path(recipe_id): Path<i32>,
) -> Result<(StatusCode, Json<ShortRecipeView>)> {
    let repo = Repository::new(state.db.clone());
    let recipe = repo.get_recipe(recipe_id).await?;

    repo.add_favorite(current.id, recipe_id).await?;
    tracing::debug!(user_id = current.id, recipe_id, "Recipe favorited");

    Ok((StatusCode::CREATED, Json(ShortRecipeView::from(&recipe))))
}

pub async fn remove_favorite(
    State(state): State<AppState>,
    AuthUser(current): AuthUser,
    Path(recipe_id): Path<i32>,
) -> Result<StatusCode> {
    let repo = Repository::new(state.db.clone());
    repo.get_recipe(recipe_id).await?;

    if !repo.remove_favorite(current.id, recipe_id).await? {
        return Err(AppError::NotFound {
            resource_type: "favorite".to_string(),
            id: recipe_id.to_string(),
        });
    }

    Ok(StatusCode::NO_CONTENT)
}
