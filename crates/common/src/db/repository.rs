//! Repository pattern for database operations
//!
//! All reads and writes for users, reference data, recipes and the
//! per-user recipe lists go through here. Constraint violations are turned
//! into named `AppError` variants at this boundary.

use crate::db::models::*;
use crate::db::DbPool;
use crate::errors::{AppError, Result};
use crate::shopping_list::{CartSnapshot, CartStore, IngredientUsage};
use async_trait::async_trait;
use sea_orm::sea_query::{Expr, Func, OnConflict, Query};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbBackend, EntityTrait,
    FromQueryResult, JoinType, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect,
    RelationTrait, Set, Statement, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

/// Fields needed to register a user
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub hashed_password: String,
}

/// One `(ingredient, amount)` pair of a recipe being written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngredientAmountInput {
    pub ingredient_id: i32,
    pub amount: i32,
}

/// A recipe as submitted by its author
#[derive(Debug, Clone)]
pub struct NewRecipe {
    pub name: String,
    pub text: String,
    pub cooking_time: i32,
    pub image: String,
    pub tag_ids: Vec<i32>,
    pub ingredients: Vec<IngredientAmountInput>,
}

/// Partial recipe update. `None` leaves the field untouched; `Some` list
/// fields replace the whole set.
#[derive(Debug, Clone, Default)]
pub struct RecipeUpdate {
    pub name: Option<String>,
    pub text: Option<String>,
    pub cooking_time: Option<i32>,
    pub image: Option<String>,
    pub tag_ids: Option<Vec<i32>>,
    pub ingredients: Option<Vec<IngredientAmountInput>>,
}

/// Recipe list filters, all optional and combined with AND
#[derive(Debug, Clone, Default)]
pub struct RecipeFilter {
    pub author_id: Option<i32>,
    /// Tag slugs; a recipe matches if it has any of them
    pub tags: Vec<String>,
    pub favorited_by: Option<i32>,
    pub in_cart_of: Option<i32>,
}

/// An ingredient line of a recipe as shown to clients
#[derive(Debug, Clone, PartialEq, Eq, FromQueryResult, Serialize, Deserialize)]
pub struct RecipeIngredientRow {
    pub recipe_id: i32,
    pub ingredient_id: i32,
    pub name: String,
    pub measurement_unit: String,
    pub amount: i32,
}

impl NewRecipe {
    /// Checks that do not need the database
    pub fn check(&self) -> Result<()> {
        check_cooking_time(self.cooking_time)?;
        check_tag_ids(&self.tag_ids)?;
        check_ingredients(&self.ingredients)
    }
}

impl RecipeUpdate {
    pub fn check(&self) -> Result<()> {
        if let Some(minutes) = self.cooking_time {
            check_cooking_time(minutes)?;
        }
        if let Some(tag_ids) = &self.tag_ids {
            check_tag_ids(tag_ids)?;
        }
        if let Some(ingredients) = &self.ingredients {
            check_ingredients(ingredients)?;
        }
        Ok(())
    }
}

fn invalid(field: &str, message: impl Into<String>) -> AppError {
    AppError::Validation {
        message: message.into(),
        field: Some(field.to_string()),
    }
}

fn check_cooking_time(minutes: i32) -> Result<()> {
    if minutes < 1 {
        return Err(invalid("cooking_time", "Cooking time must be at least 1 minute"));
    }
    Ok(())
}

fn check_tag_ids(tag_ids: &[i32]) -> Result<()> {
    if tag_ids.is_empty() {
        return Err(invalid("tags", "At least one tag is required"));
    }
    let unique: HashSet<_> = tag_ids.iter().collect();
    if unique.len() != tag_ids.len() {
        return Err(invalid("tags", "Tags must not repeat"));
    }
    Ok(())
}

fn check_ingredients(ingredients: &[IngredientAmountInput]) -> Result<()> {
    if ingredients.is_empty() {
        return Err(invalid("ingredients", "At least one ingredient is required"));
    }
    let unique: HashSet<_> = ingredients.iter().map(|i| i.ingredient_id).collect();
    if unique.len() != ingredients.len() {
        return Err(invalid("ingredients", "Ingredients must not repeat"));
    }
    if let Some(bad) = ingredients.iter().find(|i| i.amount < 1) {
        return Err(invalid(
            "ingredients",
            format!("Amount of ingredient {} must be at least 1", bad.ingredient_id),
        ));
    }
    Ok(())
}

/// Ids from `wanted` that are not in `found`, in request order
fn missing_ids(wanted: &[i32], found: &[i32]) -> Vec<i32> {
    let found: HashSet<i32> = found.iter().copied().collect();
    wanted.iter().copied().filter(|id| !found.contains(id)).collect()
}

/// Escape `LIKE` wildcards in user input
fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Repository for data access operations
#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
}

impl Repository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> &DatabaseConnection {
        self.pool.conn()
    }

    // ========================================================================
    // User Operations
    // ========================================================================

    /// Register a user. Email and username must be unused.
    pub async fn create_user(&self, new: NewUser) -> Result<User> {
        let user = UserActiveModel {
            email: Set(new.email),
            username: Set(new.username),
            first_name: Set(new.first_name),
            last_name: Set(new.last_name),
            hashed_password: Set(new.hashed_password),
            is_active: Set(true),
            is_superuser: Set(false),
            created_at: Set(chrono::Utc::now().into()),
            ..Default::default()
        };

        let user = user.insert(self.conn()).await.map_err(|e| {
            AppError::from_write(
                e,
                || AppError::Duplicate {
                    message: "A user with this email or username already exists".into(),
                },
                || AppError::Internal {
                    message: "Unexpected reference while creating user".into(),
                },
            )
        })?;

        info!(user_id = user.id, username = %user.username, "User registered");
        Ok(user)
    }

    pub async fn find_user(&self, id: i32) -> Result<Option<User>> {
        UserEntity::find_by_id(id)
            .one(self.conn())
            .await
            .map_err(Into::into)
    }

    /// Find a user or fail with `UserNotFound`
    pub async fn get_user(&self, id: i32) -> Result<User> {
        self.find_user(id)
            .await?
            .ok_or(AppError::UserNotFound { id })
    }

    /// Users by id, keyed by id. Unknown ids are skipped.
    pub async fn users_by_ids(&self, ids: &[i32]) -> Result<HashMap<i32, User>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let users = UserEntity::find()
            .filter(UserColumn::Id.is_in(ids.to_vec()))
            .all(self.conn())
            .await?;

        Ok(users.into_iter().map(|u| (u.id, u)).collect())
    }

    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        UserEntity::find()
            .filter(UserColumn::Email.eq(email))
            .one(self.conn())
            .await
            .map_err(Into::into)
    }

    /// All users, oldest account first, one page at a time
    pub async fn list_users(&self, page: u64, limit: u64) -> Result<(Vec<User>, u64)> {
        let paginator = UserEntity::find()
            .order_by_asc(UserColumn::Id)
            .paginate(self.conn(), limit);

        let total = paginator.num_items().await?;
        let users = paginator.fetch_page(page.saturating_sub(1)).await?;

        Ok((users, total))
    }

    /// Replace the stored password hash
    pub async fn update_password(&self, user_id: i32, hashed_password: String) -> Result<()> {
        let result = UserEntity::update_many()
            .col_expr(UserColumn::HashedPassword, Expr::value(hashed_password))
            .filter(UserColumn::Id.eq(user_id))
            .exec(self.conn())
            .await?;

        if result.rows_affected == 0 {
            return Err(AppError::UserNotFound { id: user_id });
        }

        info!(user_id, "Password changed");
        Ok(())
    }

    // ========================================================================
    // Subscription Operations
    // ========================================================================

    pub async fn subscribe(&self, subscriber_id: i32, author_id: i32) -> Result<()> {
        if subscriber_id == author_id {
            return Err(AppError::Validation {
                message: "Cannot subscribe to yourself".into(),
                field: None,
            });
        }

        SubscriptionEntity::insert(SubscriptionActiveModel {
            author_id: Set(author_id),
            subscriber_id: Set(subscriber_id),
            ..Default::default()
        })
        .exec_without_returning(self.conn())
        .await
        .map_err(|e| {
            AppError::from_write(
                e,
                || AppError::AlreadySubscribed { author_id },
                || AppError::UserNotFound { id: author_id },
            )
        })?;

        debug!(subscriber_id, author_id, "Subscribed");
        Ok(())
    }

    /// Returns false when there was no such subscription
    pub async fn unsubscribe(&self, subscriber_id: i32, author_id: i32) -> Result<bool> {
        let result = SubscriptionEntity::delete_many()
            .filter(SubscriptionColumn::SubscriberId.eq(subscriber_id))
            .filter(SubscriptionColumn::AuthorId.eq(author_id))
            .exec(self.conn())
            .await?;

        Ok(result.rows_affected > 0)
    }

    /// Which of `author_ids` the subscriber follows
    pub async fn subscribed_author_ids(
        &self,
        subscriber_id: i32,
        author_ids: &[i32],
    ) -> Result<HashSet<i32>> {
        if author_ids.is_empty() {
            return Ok(HashSet::new());
        }

        let ids: Vec<i32> = SubscriptionEntity::find()
            .select_only()
            .column(SubscriptionColumn::AuthorId)
            .filter(SubscriptionColumn::SubscriberId.eq(subscriber_id))
            .filter(SubscriptionColumn::AuthorId.is_in(author_ids.to_vec()))
            .into_tuple()
            .all(self.conn())
            .await?;

        Ok(ids.into_iter().collect())
    }

    /// Authors the user follows, one page at a time
    pub async fn list_subscriptions(
        &self,
        subscriber_id: i32,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<User>, u64)> {
        let followed = Query::select()
            .column(SubscriptionColumn::AuthorId)
            .from(SubscriptionEntity)
            .and_where(SubscriptionColumn::SubscriberId.eq(subscriber_id))
            .to_owned();

        let paginator = UserEntity::find()
            .filter(UserColumn::Id.in_subquery(followed))
            .order_by_asc(UserColumn::Username)
            .paginate(self.conn(), limit);

        let total = paginator.num_items().await?;
        let users = paginator.fetch_page(page.saturating_sub(1)).await?;

        Ok((users, total))
    }

    // ========================================================================
    // Ingredient Operations
    // ========================================================================

    /// Ingredients whose name starts with `name_prefix` (case-insensitive)
    pub async fn list_ingredients(&self, name_prefix: Option<&str>) -> Result<Vec<Ingredient>> {
        let mut query = IngredientEntity::find()
            .order_by_asc(IngredientColumn::Name)
            .order_by_asc(IngredientColumn::Id);

        if let Some(prefix) = name_prefix.map(str::trim).filter(|p| !p.is_empty()) {
            let pattern = format!("{}%", escape_like(&prefix.to_lowercase()));
            query = query.filter(
                Expr::expr(Func::lower(Expr::col((IngredientEntity, IngredientColumn::Name))))
                    .like(pattern),
            );
        }

        query.all(self.conn()).await.map_err(Into::into)
    }

    pub async fn find_ingredient(&self, id: i32) -> Result<Option<Ingredient>> {
        IngredientEntity::find_by_id(id)
            .one(self.conn())
            .await
            .map_err(Into::into)
    }

    /// Insert unless the same (name, unit) exists. Returns true if inserted.
    pub async fn insert_ingredient_if_missing(
        &self,
        name: &str,
        measurement_unit: &str,
    ) -> Result<bool> {
        let inserted = IngredientEntity::insert(IngredientActiveModel {
            name: Set(name.to_string()),
            measurement_unit: Set(measurement_unit.to_string()),
            ..Default::default()
        })
        .on_conflict(
            OnConflict::columns([IngredientColumn::Name, IngredientColumn::MeasurementUnit])
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(self.conn())
        .await?;

        Ok(inserted > 0)
    }

    /// Admin insert. Fails with `Duplicate` if the (name, unit) pair exists.
    pub async fn create_ingredient(&self, name: &str, measurement_unit: &str) -> Result<Ingredient> {
        let ingredient = IngredientActiveModel {
            name: Set(name.to_string()),
            measurement_unit: Set(measurement_unit.to_string()),
            ..Default::default()
        }
        .insert(self.conn())
        .await
        .map_err(|e| {
            AppError::from_write(
                e,
                || AppError::Duplicate {
                    message: format!("Ingredient '{}' ({}) already exists", name, measurement_unit),
                },
                || AppError::Internal {
                    message: "Unexpected reference while creating ingredient".into(),
                },
            )
        })?;

        info!(ingredient_id = ingredient.id, name = %ingredient.name, "Ingredient created");
        Ok(ingredient)
    }

    /// Removes the ingredient from every recipe too. False if it did not exist.
    pub async fn delete_ingredient(&self, id: i32) -> Result<bool> {
        let result = IngredientEntity::delete_by_id(id).exec(self.conn()).await?;
        if result.rows_affected > 0 {
            info!(ingredient_id = id, "Ingredient deleted");
        }
        Ok(result.rows_affected > 0)
    }

    // ========================================================================
    // Tag Operations
    // ========================================================================

    pub async fn list_tags(&self) -> Result<Vec<Tag>> {
        TagEntity::find()
            .order_by_asc(TagColumn::Id)
            .all(self.conn())
            .await
            .map_err(Into::into)
    }

    pub async fn find_tag(&self, id: i32) -> Result<Option<Tag>> {
        TagEntity::find_by_id(id)
            .one(self.conn())
            .await
            .map_err(Into::into)
    }

    /// Insert unless the slug is taken. Returns true if inserted.
    pub async fn insert_tag_if_missing(
        &self,
        name: &str,
        color: Option<&str>,
        slug: &str,
    ) -> Result<bool> {
        validate_tag(slug, color)?;

        let inserted = TagEntity::insert(TagActiveModel {
            name: Set(name.to_string()),
            color: Set(color.map(str::to_string)),
            slug: Set(slug.to_string()),
            ..Default::default()
        })
        .on_conflict(OnConflict::column(TagColumn::Slug).do_nothing().to_owned())
        .exec_without_returning(self.conn())
        .await?;

        Ok(inserted > 0)
    }

    /// Admin insert. Fails with `Duplicate` if the slug is taken.
    pub async fn create_tag(&self, name: &str, color: Option<&str>, slug: &str) -> Result<Tag> {
        validate_tag(slug, color)?;

        let tag = TagActiveModel {
            name: Set(name.to_string()),
            color: Set(color.map(str::to_string)),
            slug: Set(slug.to_string()),
            ..Default::default()
        }
        .insert(self.conn())
        .await
        .map_err(|e| {
            AppError::from_write(
                e,
                || AppError::Duplicate {
                    message: format!("Tag with slug '{}' already exists", slug),
                },
                || AppError::Internal {
                    message: "Unexpected reference while creating tag".into(),
                },
            )
        })?;

        info!(tag_id = tag.id, slug = %tag.slug, "Tag created");
        Ok(tag)
    }

    /// Detaches the tag from every recipe too. False if it did not exist.
    pub async fn delete_tag(&self, id: i32) -> Result<bool> {
        let result = TagEntity::delete_by_id(id).exec(self.conn()).await?;
        if result.rows_affected > 0 {
            info!(tag_id = id, "Tag deleted");
        }
        Ok(result.rows_affected > 0)
    }

    // ========================================================================
    // Recipe Operations
    // ========================================================================

    /// Create a recipe with its tags and ingredient amounts in one transaction
    pub async fn create_recipe(&self, author_id: i32, new: NewRecipe) -> Result<Recipe> {
        new.check()?;

        let txn = self.conn().begin().await?;

        ensure_tags_exist(&txn, &new.tag_ids).await?;
        ensure_ingredients_exist(&txn, &new.ingredients).await?;

        let recipe = RecipeActiveModel {
            author_id: Set(author_id),
            name: Set(new.name),
            text: Set(new.text),
            cooking_time: Set(new.cooking_time),
            image: Set(new.image),
            created_at: Set(chrono::Utc::now().into()),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(|e| {
            AppError::from_write(
                e,
                || AppError::Duplicate {
                    message: "Recipe already exists".into(),
                },
                || AppError::UserNotFound { id: author_id },
            )
        })?;

        link_tags(&txn, recipe.id, &new.tag_ids).await?;
        link_ingredients(&txn, recipe.id, &new.ingredients).await?;

        txn.commit().await?;

        info!(recipe_id = recipe.id, author_id, "Recipe created");
        Ok(recipe)
    }

    /// Apply a partial update. Only the author may edit.
    pub async fn update_recipe(
        &self,
        recipe_id: i32,
        editor_id: i32,
        update: RecipeUpdate,
    ) -> Result<Recipe> {
        update.check()?;

        let txn = self.conn().begin().await?;

        let recipe = RecipeEntity::find_by_id(recipe_id)
            .one(&txn)
            .await?
            .ok_or(AppError::RecipeNotFound { id: recipe_id })?;

        if recipe.author_id != editor_id {
            return Err(AppError::NotAuthor { recipe_id });
        }

        if let Some(tag_ids) = &update.tag_ids {
            ensure_tags_exist(&txn, tag_ids).await?;
            RecipeTagEntity::delete_many()
                .filter(RecipeTagColumn::RecipeId.eq(recipe_id))
                .exec(&txn)
                .await?;
            link_tags(&txn, recipe_id, tag_ids).await?;
        }

        if let Some(ingredients) = &update.ingredients {
            ensure_ingredients_exist(&txn, ingredients).await?;
            RecipeIngredientAmountEntity::delete_many()
                .filter(RecipeIngredientAmountColumn::RecipeId.eq(recipe_id))
                .exec(&txn)
                .await?;
            link_ingredients(&txn, recipe_id, ingredients).await?;
        }

        let mut active: RecipeActiveModel = recipe.clone().into();
        if let Some(name) = update.name {
            active.name = Set(name);
        }
        if let Some(text) = update.text {
            active.text = Set(text);
        }
        if let Some(minutes) = update.cooking_time {
            active.cooking_time = Set(minutes);
        }
        if let Some(image) = update.image {
            active.image = Set(image);
        }

        let recipe = if active.is_changed() {
            active.update(&txn).await?
        } else {
            recipe
        };

        txn.commit().await?;

        info!(recipe_id, editor_id, "Recipe updated");
        Ok(recipe)
    }

    /// Delete a recipe. Only the author may delete.
    pub async fn delete_recipe(&self, recipe_id: i32, editor_id: i32) -> Result<()> {
        let recipe = self.get_recipe(recipe_id).await?;

        if recipe.author_id != editor_id {
            return Err(AppError::NotAuthor { recipe_id });
        }

        RecipeEntity::delete_by_id(recipe_id)
            .exec(self.conn())
            .await?;

        info!(recipe_id, editor_id, "Recipe deleted");
        Ok(())
    }

    pub async fn find_recipe(&self, id: i32) -> Result<Option<Recipe>> {
        RecipeEntity::find_by_id(id)
            .one(self.conn())
            .await
            .map_err(Into::into)
    }

    /// Find a recipe or fail with `RecipeNotFound`
    pub async fn get_recipe(&self, id: i32) -> Result<Recipe> {
        self.find_recipe(id)
            .await?
            .ok_or(AppError::RecipeNotFound { id })
    }

    /// Newest first, filtered, one page at a time
    pub async fn list_recipes(
        &self,
        filter: &RecipeFilter,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<Recipe>, u64)> {
        let mut query = RecipeEntity::find()
            .order_by_desc(RecipeColumn::CreatedAt)
            .order_by_desc(RecipeColumn::Id);

        if let Some(author_id) = filter.author_id {
            query = query.filter(RecipeColumn::AuthorId.eq(author_id));
        }

        if !filter.tags.is_empty() {
            let tagged = Query::select()
                .column((RecipeTagEntity, RecipeTagColumn::RecipeId))
                .from(RecipeTagEntity)
                .inner_join(
                    TagEntity,
                    Expr::col((TagEntity, TagColumn::Id))
                        .equals((RecipeTagEntity, RecipeTagColumn::TagId)),
                )
                .and_where(TagColumn::Slug.is_in(filter.tags.clone()))
                .to_owned();
            query = query.filter(RecipeColumn::Id.in_subquery(tagged));
        }

        if let Some(user_id) = filter.favorited_by {
            let favorited = Query::select()
                .column(FavoriteRecipeColumn::RecipeId)
                .from(FavoriteRecipeEntity)
                .and_where(FavoriteRecipeColumn::UserId.eq(user_id))
                .to_owned();
            query = query.filter(RecipeColumn::Id.in_subquery(favorited));
        }

        if let Some(user_id) = filter.in_cart_of {
            let in_cart = Query::select()
                .column(ShoppingCartColumn::RecipeId)
                .from(ShoppingCartEntity)
                .and_where(ShoppingCartColumn::UserId.eq(user_id))
                .to_owned();
            query = query.filter(RecipeColumn::Id.in_subquery(in_cart));
        }

        let paginator = query.paginate(self.conn(), limit);
        let total = paginator.num_items().await?;
        let recipes = paginator.fetch_page(page.saturating_sub(1)).await?;

        Ok((recipes, total))
    }

    /// Most recent recipes of one author, optionally capped
    pub async fn recipes_by_author(&self, author_id: i32, limit: Option<u64>) -> Result<Vec<Recipe>> {
        let mut query = RecipeEntity::find()
            .filter(RecipeColumn::AuthorId.eq(author_id))
            .order_by_desc(RecipeColumn::CreatedAt)
            .order_by_desc(RecipeColumn::Id);

        if let Some(limit) = limit {
            query = query.limit(limit);
        }

        query.all(self.conn()).await.map_err(Into::into)
    }

    /// Number of recipes per author, for the given authors
    pub async fn recipe_counts(&self, author_ids: &[i32]) -> Result<HashMap<i32, i64>> {
        if author_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows: Vec<(i32, i64)> = RecipeEntity::find()
            .select_only()
            .column(RecipeColumn::AuthorId)
            .column_as(RecipeColumn::Id.count(), "recipes_count")
            .filter(RecipeColumn::AuthorId.is_in(author_ids.to_vec()))
            .group_by(RecipeColumn::AuthorId)
            .into_tuple()
            .all(self.conn())
            .await?;

        Ok(rows.into_iter().collect())
    }

    /// Tags of each recipe, keyed by recipe id
    pub async fn recipe_tags(&self, recipe_ids: &[i32]) -> Result<HashMap<i32, Vec<Tag>>> {
        if recipe_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let links = RecipeTagEntity::find()
            .filter(RecipeTagColumn::RecipeId.is_in(recipe_ids.to_vec()))
            .all(self.conn())
            .await?;

        let tag_ids: Vec<i32> = links.iter().map(|l| l.tag_id).collect::<HashSet<_>>().into_iter().collect();
        let tags: HashMap<i32, Tag> = TagEntity::find()
            .filter(TagColumn::Id.is_in(tag_ids))
            .all(self.conn())
            .await?
            .into_iter()
            .map(|t| (t.id, t))
            .collect();

        let mut by_recipe: HashMap<i32, Vec<Tag>> = HashMap::new();
        for link in links {
            if let Some(tag) = tags.get(&link.tag_id) {
                by_recipe.entry(link.recipe_id).or_default().push(tag.clone());
            }
        }
        for list in by_recipe.values_mut() {
            list.sort_by_key(|t| t.id);
        }

        Ok(by_recipe)
    }

    /// Ingredient lines of each recipe, keyed by recipe id
    pub async fn recipe_ingredients(
        &self,
        recipe_ids: &[i32],
    ) -> Result<HashMap<i32, Vec<RecipeIngredientRow>>> {
        if recipe_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = RecipeIngredientAmountEntity::find()
            .select_only()
            .column(RecipeIngredientAmountColumn::RecipeId)
            .column_as(IngredientColumn::Id, "ingredient_id")
            .column(IngredientColumn::Name)
            .column(IngredientColumn::MeasurementUnit)
            .column(IngredientAmountColumn::Amount)
            .join(
                JoinType::InnerJoin,
                RecipeIngredientAmountRelation::IngredientAmount.def(),
            )
            .join(JoinType::InnerJoin, IngredientAmountRelation::Ingredient.def())
            .filter(RecipeIngredientAmountColumn::RecipeId.is_in(recipe_ids.to_vec()))
            .order_by_asc(IngredientColumn::Name)
            .order_by_asc(IngredientColumn::Id)
            .into_model::<RecipeIngredientRow>()
            .all(self.conn())
            .await?;

        let mut by_recipe: HashMap<i32, Vec<RecipeIngredientRow>> = HashMap::new();
        for row in rows {
            by_recipe.entry(row.recipe_id).or_default().push(row);
        }

        Ok(by_recipe)
    }

    // ========================================================================
    // Favorites & Shopping Cart
    // ========================================================================

    pub async fn add_favorite(&self, user_id: i32, recipe_id: i32) -> Result<()> {
        FavoriteRecipeEntity::insert(FavoriteRecipeActiveModel {
            user_id: Set(user_id),
            recipe_id: Set(recipe_id),
        })
        .exec_without_returning(self.conn())
        .await
        .map_err(|e| {
            AppError::from_write(
                e,
                || AppError::AlreadyFavorited { recipe_id },
                || AppError::RecipeNotFound { id: recipe_id },
            )
        })?;

        Ok(())
    }

    pub async fn remove_favorite(&self, user_id: i32, recipe_id: i32) -> Result<bool> {
        let result = FavoriteRecipeEntity::delete_many()
            .filter(FavoriteRecipeColumn::UserId.eq(user_id))
            .filter(FavoriteRecipeColumn::RecipeId.eq(recipe_id))
            .exec(self.conn())
            .await?;

        Ok(result.rows_affected > 0)
    }

    /// Which of `recipe_ids` the user has favorited
    pub async fn favorited_recipe_ids(
        &self,
        user_id: i32,
        recipe_ids: &[i32],
    ) -> Result<HashSet<i32>> {
        if recipe_ids.is_empty() {
            return Ok(HashSet::new());
        }

        let ids: Vec<i32> = FavoriteRecipeEntity::find()
            .select_only()
            .column(FavoriteRecipeColumn::RecipeId)
            .filter(FavoriteRecipeColumn::UserId.eq(user_id))
            .filter(FavoriteRecipeColumn::RecipeId.is_in(recipe_ids.to_vec()))
            .into_tuple()
            .all(self.conn())
            .await?;

        Ok(ids.into_iter().collect())
    }

    pub async fn add_to_cart(&self, user_id: i32, recipe_id: i32) -> Result<()> {
        ShoppingCartEntity::insert(ShoppingCartActiveModel {
            user_id: Set(user_id),
            recipe_id: Set(recipe_id),
        })
        .exec_without_returning(self.conn())
        .await
        .map_err(|e| {
            AppError::from_write(
                e,
                || AppError::AlreadyInShoppingCart { recipe_id },
                || AppError::RecipeNotFound { id: recipe_id },
            )
        })?;

        Ok(())
    }

    pub async fn remove_from_cart(&self, user_id: i32, recipe_id: i32) -> Result<bool> {
        let result = ShoppingCartEntity::delete_many()
            .filter(ShoppingCartColumn::UserId.eq(user_id))
            .filter(ShoppingCartColumn::RecipeId.eq(recipe_id))
            .exec(self.conn())
            .await?;

        Ok(result.rows_affected > 0)
    }

    /// Which of `recipe_ids` are in the user's cart
    pub async fn cart_recipe_ids(&self, user_id: i32, recipe_ids: &[i32]) -> Result<HashSet<i32>> {
        if recipe_ids.is_empty() {
            return Ok(HashSet::new());
        }

        let ids: Vec<i32> = ShoppingCartEntity::find()
            .select_only()
            .column(ShoppingCartColumn::RecipeId)
            .filter(ShoppingCartColumn::UserId.eq(user_id))
            .filter(ShoppingCartColumn::RecipeId.is_in(recipe_ids.to_vec()))
            .into_tuple()
            .all(self.conn())
            .await?;

        Ok(ids.into_iter().collect())
    }
}

#[async_trait]
impl CartStore for Repository {
    async fn load_cart(&self, user_id: i32) -> Result<CartSnapshot> {
        // LEFT JOINs from users keep one row for a user with an empty cart,
        // so zero rows means the user does not exist.
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            SELECT
                u.username,
                sc.recipe_id,
                i.id AS ingredient_id,
                i.name,
                i.measurement_unit,
                ia.amount
            FROM users u
            LEFT JOIN shopping_cart sc ON sc.user_id = u.id
            LEFT JOIN recipe_ingredient_amounts ria ON ria.recipe_id = sc.recipe_id
            LEFT JOIN ingredient_amounts ia ON ia.id = ria.ingredient_amount_id
            LEFT JOIN ingredients i ON i.id = ia.ingredient_id
            WHERE u.id = $1
            "#,
            vec![user_id.into()],
        );

        let rows = self.conn().query_all(stmt).await?;
        if rows.is_empty() {
            return Err(AppError::UserNotFound { id: user_id });
        }

        let mut snapshot = CartSnapshot {
            user_id,
            ..Default::default()
        };

        for row in rows {
            if snapshot.username.is_empty() {
                snapshot.username = row.try_get("", "username")?;
            }

            let recipe_id: Option<i32> = row.try_get("", "recipe_id")?;
            let ingredient_id: Option<i32> = row.try_get("", "ingredient_id")?;
            let name: Option<String> = row.try_get("", "name")?;
            let measurement_unit: Option<String> = row.try_get("", "measurement_unit")?;
            let amount: Option<i32> = row.try_get("", "amount")?;

            // Empty cart, or a recipe without ingredients
            if let (Some(recipe_id), Some(ingredient_id), Some(name), Some(measurement_unit), Some(amount)) =
                (recipe_id, ingredient_id, name, measurement_unit, amount)
            {
                snapshot.usages.push(IngredientUsage {
                    recipe_id,
                    ingredient_id,
                    name,
                    measurement_unit,
                    amount,
                });
            }
        }

        debug!(user_id, usages = snapshot.usages.len(), "Cart loaded");
        Ok(snapshot)
    }
}

async fn ensure_tags_exist<C: ConnectionTrait>(conn: &C, tag_ids: &[i32]) -> Result<()> {
    let found: Vec<i32> = TagEntity::find()
        .select_only()
        .column(TagColumn::Id)
        .filter(TagColumn::Id.is_in(tag_ids.to_vec()))
        .into_tuple()
        .all(conn)
        .await?;

    let missing = missing_ids(tag_ids, &found);
    if !missing.is_empty() {
        return Err(AppError::TagNotFound { ids: missing });
    }
    Ok(())
}

async fn ensure_ingredients_exist<C: ConnectionTrait>(
    conn: &C,
    ingredients: &[IngredientAmountInput],
) -> Result<()> {
    let wanted: Vec<i32> = ingredients.iter().map(|i| i.ingredient_id).collect();

    let found: Vec<i32> = IngredientEntity::find()
        .select_only()
        .column(IngredientColumn::Id)
        .filter(IngredientColumn::Id.is_in(wanted.clone()))
        .into_tuple()
        .all(conn)
        .await?;

    let missing = missing_ids(&wanted, &found);
    if !missing.is_empty() {
        return Err(AppError::IngredientNotFound { ids: missing });
    }
    Ok(())
}

async fn link_tags<C: ConnectionTrait>(conn: &C, recipe_id: i32, tag_ids: &[i32]) -> Result<()> {
    if tag_ids.is_empty() {
        return Ok(());
    }

    let links = tag_ids.iter().map(|&tag_id| RecipeTagActiveModel {
        recipe_id: Set(recipe_id),
        tag_id: Set(tag_id),
    });

    RecipeTagEntity::insert_many(links)
        .exec_without_returning(conn)
        .await?;

    Ok(())
}

/// Link a recipe to shared `(ingredient, amount)` rows, creating the ones
/// that do not exist yet
async fn link_ingredients<C: ConnectionTrait>(
    conn: &C,
    recipe_id: i32,
    ingredients: &[IngredientAmountInput],
) -> Result<()> {
    let mut amount_ids = Vec::with_capacity(ingredients.len());

    for input in ingredients {
        IngredientAmountEntity::insert(IngredientAmountActiveModel {
            ingredient_id: Set(input.ingredient_id),
            amount: Set(input.amount),
            ..Default::default()
        })
        .on_conflict(
            OnConflict::columns([
                IngredientAmountColumn::IngredientId,
                IngredientAmountColumn::Amount,
            ])
            .do_nothing()
            .to_owned(),
        )
        .exec_without_returning(conn)
        .await?;

        let shared = IngredientAmountEntity::find()
            .filter(IngredientAmountColumn::IngredientId.eq(input.ingredient_id))
            .filter(IngredientAmountColumn::Amount.eq(input.amount))
            .one(conn)
            .await?
            .ok_or_else(|| AppError::DataIntegrity {
                message: format!(
                    "Ingredient amount ({}, {}) vanished after upsert",
                    input.ingredient_id, input.amount
                ),
            })?;

        amount_ids.push(shared.id);
    }

    if amount_ids.is_empty() {
        return Ok(());
    }

    let links = amount_ids
        .into_iter()
        .map(|ingredient_amount_id| RecipeIngredientAmountActiveModel {
            recipe_id: Set(recipe_id),
            ingredient_amount_id: Set(ingredient_amount_id),
        });

    RecipeIngredientAmountEntity::insert_many(links)
        .exec_without_returning(conn)
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recipe() -> NewRecipe {
        NewRecipe {
            name: "Pancakes".into(),
            text: "Mix and fry".into(),
            cooking_time: 20,
            image: "data:image/png;base64,AAAA".into(),
            tag_ids: vec![1, 2],
            ingredients: vec![
                IngredientAmountInput { ingredient_id: 10, amount: 200 },
                IngredientAmountInput { ingredient_id: 12, amount: 2 },
            ],
        }
    }

    fn field_of(err: AppError) -> Option<String> {
        match err {
            AppError::Validation { field, .. } => field,
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_valid_recipe_passes() {
        assert!(recipe().check().is_ok());
    }

    #[test]
    fn test_recipe_needs_ingredients_and_tags() {
        let mut r = recipe();
        r.ingredients.clear();
        assert_eq!(field_of(r.check().unwrap_err()).as_deref(), Some("ingredients"));

        let mut r = recipe();
        r.tag_ids.clear();
        assert_eq!(field_of(r.check().unwrap_err()).as_deref(), Some("tags"));
    }

    #[test]
    fn test_recipe_rejects_repeats_and_bad_numbers() {
        let mut r = recipe();
        r.ingredients.push(IngredientAmountInput { ingredient_id: 10, amount: 5 });
        assert_eq!(field_of(r.check().unwrap_err()).as_deref(), Some("ingredients"));

        let mut r = recipe();
        r.ingredients[0].amount = 0;
        assert_eq!(field_of(r.check().unwrap_err()).as_deref(), Some("ingredients"));

        let mut r = recipe();
        r.tag_ids = vec![3, 3];
        assert_eq!(field_of(r.check().unwrap_err()).as_deref(), Some("tags"));

        let mut r = recipe();
        r.cooking_time = 0;
        assert_eq!(field_of(r.check().unwrap_err()).as_deref(), Some("cooking_time"));
    }

    #[test]
    fn test_update_checks_only_present_fields() {
        assert!(RecipeUpdate::default().check().is_ok());

        let update = RecipeUpdate {
            tag_ids: Some(vec![]),
            ..Default::default()
        };
        assert!(update.check().is_err());
    }

    #[test]
    fn test_missing_ids_keeps_request_order() {
        assert_eq!(missing_ids(&[5, 1, 9, 3], &[1, 3]), vec![5, 9]);
        assert!(missing_ids(&[1, 2], &[2, 1]).is_empty());
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("50%_off"), "50\\%\\_off");
        assert_eq!(escape_like("flour"), "flour");
    }
}

#[cfg(test)]
mod cart_store_tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase, Value};
    use std::collections::BTreeMap;

    type Row = BTreeMap<&'static str, Value>;

    /// One joined row as `load_cart` sees it. `None` parts come back as NULL.
    fn cart_row(recipe_id: Option<i32>, ingredient: Option<(i32, &str, &str, i32)>) -> Row {
        let (ingredient_id, name, unit, amount) = match ingredient {
            Some((id, name, unit, amount)) => (
                Some(id),
                Some(Box::new(name.to_string())),
                Some(Box::new(unit.to_string())),
                Some(amount),
            ),
            None => (None, None, None, None),
        };

        BTreeMap::from([
            ("username", Value::String(Some(Box::new("anna".to_string())))),
            ("recipe_id", Value::Int(recipe_id)),
            ("ingredient_id", Value::Int(ingredient_id)),
            ("name", Value::String(name)),
            ("measurement_unit", Value::String(unit)),
            ("amount", Value::Int(amount)),
        ])
    }

    fn repo_with(rows: Vec<Row>) -> Repository {
        let conn = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([rows])
            .into_connection();
        Repository::new(DbPool::from_connection(conn))
    }

    #[tokio::test]
    async fn test_unknown_user_has_no_rows() {
        let repo = repo_with(vec![]);

        let err = repo.load_cart(99).await.unwrap_err();
        assert!(matches!(err, AppError::UserNotFound { id: 99 }));
    }

    #[tokio::test]
    async fn test_empty_cart_is_one_null_row() {
        let repo = repo_with(vec![cart_row(None, None)]);

        let snapshot = repo.load_cart(1).await.unwrap();
        assert_eq!(snapshot.user_id, 1);
        assert_eq!(snapshot.username, "anna");
        assert!(snapshot.usages.is_empty());
    }

    #[tokio::test]
    async fn test_recipe_without_ingredients_is_skipped() {
        let repo = repo_with(vec![
            cart_row(Some(1), Some((10, "Мука", "г", 200))),
            cart_row(Some(2), None),
            cart_row(Some(3), Some((10, "Мука", "г", 50))),
        ]);

        let snapshot = repo.load_cart(1).await.unwrap();
        assert_eq!(snapshot.username, "anna");
        assert_eq!(
            snapshot.usages,
            vec![
                IngredientUsage {
                    recipe_id: 1,
                    ingredient_id: 10,
                    name: "Мука".into(),
                    measurement_unit: "г".into(),
                    amount: 200,
                },
                IngredientUsage {
                    recipe_id: 3,
                    ingredient_id: 10,
                    name: "Мука".into(),
                    measurement_unit: "г".into(),
                    amount: 50,
                },
            ]
        );
    }
}
