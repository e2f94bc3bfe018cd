//! Tag handlers (read-only reference data)

use axum::{
    extract::{Path, State},
    Json,
};

use crate::AppState;
use foodgram_common::{
    db::{models::Tag, Repository},
    errors::{AppError, Result},
};

pub async fn list_tags(State(state): State<AppState>) -> Result<Json<Vec<Tag>>> {
    let tags = Repository::new(state.db.clone()).list_tags().await?;
    Ok(Json(tags))
}

pub async fn get_tag(State(state): State<AppState>, Path(tag_id): Path<i32>) -> Result<Json<Tag>> {
    Repository::new(state.db.clone())
        .find_tag(tag_id)
        .await?
        .map(Json)
        .ok_or(AppError::TagNotFound { ids: vec![tag_id] })
}
