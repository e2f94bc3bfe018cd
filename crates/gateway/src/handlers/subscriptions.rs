//! Subscription handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use super::views::{author_views, AuthorView};
use crate::AppState;
use foodgram_common::{
    auth::AuthUser,
    db::Repository,
    errors::{AppError, Result},
    pagination::{page_links, Page, PageParams},
};

#[derive(Debug, Default, Deserialize)]
pub struct SubscriptionParams {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    /// Recipes shown per author
    pub recipes_limit: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RecipesLimit {
    pub recipes_limit: Option<u64>,
}

/// Authors the current user follows
pub async fn list_subscriptions(
    State(state): State<AppState>,
    AuthUser(current): AuthUser,
    Query(params): Query<SubscriptionParams>,
) -> Result<Json<Page<AuthorView>>> {
    let paging = PageParams {
        page: params.page,
        limit: params.limit,
    };
    let page = paging.page();
    let limit = state.config.page_limit(paging.limit);

    let repo = Repository::new(state.db.clone());
    let (authors, count) = repo.list_subscriptions(current.id, page, limit).await?;
    let results = author_views(&repo, authors, current.id, params.recipes_limit).await?;

    let links = page_links(
        &state.config.pagination.public_base_url,
        "/api/users/subscriptions",
        page,
        limit,
        count,
    );

    Ok(Json(Page::new(results, count, links)))
}

/// Follow an author
pub async fn subscribe(
    State(state): State<AppState>,
    AuthUser(current): AuthUser,
    Path(author_id): Path<i32>,
    Query(params): Query<RecipesLimit>,
) -> Result<(StatusCode, Json<AuthorView>)> {
    let repo = Repository::new(state.db.clone());
    let author = repo.get_user(author_id).await?;

    repo.subscribe(current.id, author_id).await?;
    tracing::info!(subscriber_id = current.id, author_id, "Subscribed to author");

    let view = author_views(&repo, vec![author], current.id, params.recipes_limit)
        .await?
        .pop()
        .ok_or(AppError::UserNotFound { id: author_id })?;

    Ok((StatusCode::CREATED, Json(view)))
}

/// Stop following an author
pub async fn unsubscribe(
    State(state): State<AppState>,
    AuthUser(current): AuthUser,
    Path(author_id): Path<i32>,
) -> Result<StatusCode> {
    let repo = Repository::new(state.db.clone());
    repo.get_user(author_id).await?;

    if !repo.unsubscribe(current.id, author_id).await? {
        return Err(AppError::NotFound {
            resource_type: "subscription".to_string(),
            id: author_id.to_string(),
        });
    }

    tracing::info!(subscriber_id = current.id, author_id, "Unsubscribed from author");
    Ok(StatusCode::NO_CONTENT)
}
