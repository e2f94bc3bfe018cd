//! Response shapes shared by several handlers

use foodgram_common::db::models::{Recipe, Tag, User};
use foodgram_common::db::{RecipeIngredientRow, Repository};
use foodgram_common::errors::{AppError, Result};
use serde::Serialize;
use std::collections::HashSet;

#[derive(Debug, Serialize)]
pub struct UserView {
    pub id: i32,
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub is_subscribed: bool,
}

impl UserView {
    pub fn new(user: &User, is_subscribed: bool) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            username: user.username.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            is_subscribed,
        }
    }
}

/// Recipe summary used in favorites, cart and subscription responses
#[derive(Debug, Serialize)]
pub struct ShortRecipeView {
    pub id: i32,
    pub name: String,
    pub image: String,
    pub cooking_time: i32,
}

impl From<&Recipe> for ShortRecipeView {
    fn from(recipe: &Recipe) -> Self {
        Self {
            id: recipe.id,
            name: recipe.name.clone(),
            image: recipe.image.clone(),
            cooking_time: recipe.cooking_time,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct IngredientLineView {
    pub id: i32,
    pub name: String,
    pub measurement_unit: String,
    pub amount: i32,
}

impl From<RecipeIngredientRow> for IngredientLineView {
    fn from(row: RecipeIngredientRow) -> Self {
        Self {
            id: row.ingredient_id,
            name: row.name,
            measurement_unit: row.measurement_unit,
            amount: row.amount,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RecipeView {
    pub id: i32,
    pub tags: Vec<Tag>,
    pub author: UserView,
    pub ingredients: Vec<IngredientLineView>,
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
    pub name: String,
    pub image: String,
    pub text: String,
    pub cooking_time: i32,
}

/// A followed author with a preview of their recipes
#[derive(Debug, Serialize)]
pub struct AuthorView {
    #[serde(flatten)]
    pub user: UserView,
    pub recipes: Vec<ShortRecipeView>,
    pub recipes_count: i64,
}

/// Expand recipes into full views, personalized for `viewer` when set.
/// Output order follows input order.
pub async fn recipe_views(
    repo: &Repository,
    recipes: Vec<Recipe>,
    viewer: Option<i32>,
) -> Result<Vec<RecipeView>> {
    let recipe_ids: Vec<i32> = recipes.iter().map(|r| r.id).collect();
    let author_ids: Vec<i32> = recipes
        .iter()
        .map(|r| r.author_id)
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();

    let authors = repo.users_by_ids(&author_ids).await?;
    let mut tags = repo.recipe_tags(&recipe_ids).await?;
    let mut ingredients = repo.recipe_ingredients(&recipe_ids).await?;

    let (subscribed, favorited, in_cart) = match viewer {
        Some(user_id) => (
            repo.subscribed_author_ids(user_id, &author_ids).await?,
            repo.favorited_recipe_ids(user_id, &recipe_ids).await?,
            repo.cart_recipe_ids(user_id, &recipe_ids).await?,
        ),
        None => Default::default(),
    };

    recipes
        .into_iter()
        .map(|recipe| {
            let author = authors
                .get(&recipe.author_id)
                .ok_or_else(|| AppError::DataIntegrity {
                    message: format!(
                        "Recipe {} references missing author {}",
                        recipe.id, recipe.author_id
                    ),
                })?;

            Ok(RecipeView {
                id: recipe.id,
                tags: tags.remove(&recipe.id).unwrap_or_default(),
                author: UserView::new(author, subscribed.contains(&author.id)),
                ingredients: ingredients
                    .remove(&recipe.id)
                    .unwrap_or_default()
                    .into_iter()
                    .map(IngredientLineView::from)
                    .collect(),
                is_favorited: favorited.contains(&recipe.id),
                is_in_shopping_cart: in_cart.contains(&recipe.id),
                name: recipe.name,
                image: recipe.image,
                text: recipe.text,
                cooking_time: recipe.cooking_time,
            })
        })
        .collect()
}

pub async fn recipe_view(repo: &Repository, recipe: Recipe, viewer: Option<i32>) -> Result<RecipeView> {
    let id = recipe.id;
    recipe_views(repo, vec![recipe], viewer)
        .await?
        .pop()
        .ok_or(AppError::RecipeNotFound { id })
}

/// Expand authors the viewer follows, with up to `recipes_limit` recipes each
pub async fn author_views(
    repo: &Repository,
    authors: Vec<User>,
    viewer: i32,
    recipes_limit: Option<u64>,
) -> Result<Vec<AuthorView>> {
    let author_ids: Vec<i32> = authors.iter().map(|a| a.id).collect();
    let counts = repo.recipe_counts(&author_ids).await?;
    let subscribed = repo.subscribed_author_ids(viewer, &author_ids).await?;

    let mut views = Vec::with_capacity(authors.len());
    for author in authors {
        let recipes = repo.recipes_by_author(author.id, recipes_limit).await?;
        views.push(AuthorView {
            user: UserView::new(&author, subscribed.contains(&author.id)),
            recipes: recipes.iter().map(ShortRecipeView::from).collect(),
            recipes_count: counts.get(&author.id).copied().unwrap_or(0),
        });
    }

    Ok(views)
}
