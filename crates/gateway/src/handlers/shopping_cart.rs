//! Shopping cart handlers and the shopping list download

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;

use super::views::ShortRecipeView;
use crate::AppState;
use foodgram_common::{
    auth::AuthUser,
    db::Repository,
    errors::{AppError, Result},
    shopping_list::ShoppingListService,
};

pub async fn add_to_cart(
    State(state): State<AppState>,
    AuthUser(current): AuthUser,
    Path(recipe_id): Path<i32>,
) -> Result<(StatusCode, Json<ShortRecipeView>)> {
    let repo = Repository::new(state.db.clone());
    let recipe = repo.get_recipe(recipe_id).await?;

    repo.add_to_cart(current.id, recipe_id).await?;
    tracing::debug!(user_id = current.id, recipe_id, "Recipe added to cart");

    Ok((StatusCode::CREATED, Json(ShortRecipeView::from(&recipe))))
}

pub async fn remove_from_cart(
    State(state): State<AppState>,
    AuthUser(current): AuthUser,
    Path(recipe_id): Path<i32>,
) -> Result<StatusCode> {
    let repo = Repository::new(state.db.clone());
    repo.get_recipe(recipe_id).await?;

    if !repo.remove_from_cart(current.id, recipe_id).await? {
        return Err(AppError::NotFound {
            resource_type: "shopping cart entry".to_string(),
            id: recipe_id.to_string(),
        });
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Render the current cart as a PDF and send it as an attachment
pub async fn download_shopping_cart(
    State(state): State<AppState>,
    AuthUser(current): AuthUser,
    headers: HeaderMap,
) -> Result<Response> {
    let service = ShoppingListService::new(
        Arc::new(Repository::new(state.db.clone())),
        state.renderer.clone(),
    );

    let export = service.export(current.id, chrono::Utc::now()).await?;
    let artifact = export.artifact;
    let etag = format!("\"{}\"", artifact.checksum);

    if etag_matches(&headers, &etag) {
        artifact.discard().await;
        return Ok((StatusCode::NOT_MODIFIED, [(header::ETAG, etag)]).into_response());
    }

    // The file is only a hand-off from the renderer; nothing is kept on disk
    let bytes = artifact.take().await?;

    let disposition = HeaderValue::from_str(&format!(
        "attachment; filename=\"{}\"",
        artifact.file_name
    ))
    .map_err(|e| AppError::Internal {
        message: format!("Invalid file name header: {}", e),
    })?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("application/pdf")),
            (header::CONTENT_DISPOSITION, disposition),
            (header::CONTENT_LENGTH, HeaderValue::from(bytes.len())),
        ],
        [(header::ETAG, etag)],
        Body::from(bytes),
    )
        .into_response())
}

fn etag_matches(headers: &HeaderMap, etag: &str) -> bool {
    headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(',').any(|candidate| candidate.trim() == etag))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_etag_matching() {
        let mut headers = HeaderMap::new();
        assert!(!etag_matches(&headers, "\"abc\""));

        headers.insert(header::IF_NONE_MATCH, HeaderValue::from_static("\"zzz\", \"abc\""));
        assert!(etag_matches(&headers, "\"abc\""));
        assert!(!etag_matches(&headers, "\"def\""));
    }
}
