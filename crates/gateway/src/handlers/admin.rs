//! Superuser-only management of tags and ingredients

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use validator::Validate;

use crate::AppState;
use foodgram_common::{
    auth::AdminUser,
    db::{
        models::{Ingredient, Tag},
        Repository,
    },
    errors::{AppError, Result},
};

#[derive(Debug, Deserialize, Validate)]
pub struct NewTagRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,

    #[validate(length(max = 7))]
    pub color: Option<String>,

    #[validate(length(min = 1, max = 200))]
    pub slug: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct NewIngredientRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,

    #[validate(length(min = 1, max = 200))]
    pub measurement_unit: String,
}

pub async fn create_tag(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Json(request): Json<NewTagRequest>,
) -> Result<(StatusCode, Json<Tag>)> {
    request.validate()?;

    let tag = Repository::new(state.db.clone())
        .create_tag(
            request.name.trim(),
            request.color.as_deref(),
            request.slug.trim(),
        )
        .await?;

    tracing::info!(admin_id = admin.id, tag_id = tag.id, "Admin created tag");
    Ok((StatusCode::CREATED, Json(tag)))
}

pub async fn delete_tag(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(tag_id): Path<i32>,
) -> Result<StatusCode> {
    if !Repository::new(state.db.clone()).delete_tag(tag_id).await? {
        return Err(AppError::TagNotFound { ids: vec![tag_id] });
    }

    tracing::info!(admin_id = admin.id, tag_id, "Admin deleted tag");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn create_ingredient(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Json(request): Json<NewIngredientRequest>,
) -> Result<(StatusCode, Json<Ingredient>)> {
    request.validate()?;

    let ingredient = Repository::new(state.db.clone())
        .create_ingredient(request.name.trim(), request.measurement_unit.trim())
        .await?;

    tracing::info!(
        admin_id = admin.id,
        ingredient_id = ingredient.id,
        "Admin created ingredient"
    );
    Ok((StatusCode::CREATED, Json(ingredient)))
}

pub async fn delete_ingredient(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(ingredient_id): Path<i32>,
) -> Result<StatusCode> {
    if !Repository::new(state.db.clone())
        .delete_ingredient(ingredient_id)
        .await?
    {
        return Err(AppError::IngredientNotFound {
            ids: vec![ingredient_id],
        });
    }

    tracing::info!(admin_id = admin.id, ingredient_id, "Admin deleted ingredient");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_request_validation() {
        let request: NewTagRequest = serde_json::from_value(serde_json::json!({
            "name": "Завтрак",
            "color": "#E26C2D",
            "slug": "breakfast",
        }))
        .unwrap();
        assert!(request.validate().is_ok());

        let no_color: NewTagRequest = serde_json::from_value(serde_json::json!({
            "name": "Обед",
            "slug": "lunch",
        }))
        .unwrap();
        assert!(no_color.color.is_none());
        assert!(no_color.validate().is_ok());

        let long_color = NewTagRequest {
            color: Some("#E26C2D00".into()),
            ..request
        };
        assert!(long_color.validate().is_err());
    }

    #[test]
    fn test_ingredient_request_validation() {
        let request = NewIngredientRequest {
            name: "Абрикос".into(),
            measurement_unit: "г".into(),
        };
        assert!(request.validate().is_ok());

        let no_unit = NewIngredientRequest {
            measurement_unit: String::new(),
            ..request
        };
        assert!(no_unit.validate().is_err());
    }
}
