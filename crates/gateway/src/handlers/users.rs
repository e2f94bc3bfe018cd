//! User registration, login and profile handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::views::UserView;
use crate::AppState;
use foodgram_common::{
    auth::{hash_password, verify_password, AuthUser, MaybeAuthUser},
    db::{NewUser, Repository},
    errors::{AppError, Result},
    pagination::{page_links, Page, PageParams},
};

/// Request to register a user
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email, length(max = 254))]
    pub email: String,

    #[validate(length(min = 1, max = 150))]
    pub username: String,

    #[serde(default)]
    #[validate(length(max = 150))]
    pub first_name: String,

    #[serde(default)]
    #[validate(length(max = 150))]
    pub last_name: String,

    #[validate(length(min = 8, max = 150))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,

    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SetPasswordRequest {
    #[validate(length(min = 1))]
    pub current_password: String,

    #[validate(length(min = 8, max = 150))]
    pub new_password: String,
}

impl SetPasswordRequest {
    /// Field-level checks plus the rule that the password must actually change
    fn check(&self) -> Result<()> {
        self.validate()?;
        if self.new_password == self.current_password {
            return Err(AppError::Validation {
                message: "New password must differ from the current one".into(),
                field: Some("new_password".into()),
            });
        }
        Ok(())
    }
}

#[derive(Serialize)]
pub struct TokenResponse {
    pub auth_token: String,
}

/// Register a new user
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<UserView>)> {
    request.validate()?;

    let hashed_password = hash_password(&request.password).await?;
    let repo = Repository::new(state.db.clone());

    let user = repo
        .create_user(NewUser {
            email: request.email.trim().to_lowercase(),
            username: request.username.trim().to_string(),
            first_name: request.first_name,
            last_name: request.last_name,
            hashed_password,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(UserView::new(&user, false))))
}

/// Exchange email and password for a token
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<TokenResponse>> {
    request.validate()?;

    let repo = Repository::new(state.db.clone());
    let user = repo
        .find_user_by_email(&request.email.trim().to_lowercase())
        .await?
        .filter(|u| u.is_active)
        .ok_or(AppError::InvalidCredentials)?;

    if !verify_password(&request.password, &user.hashed_password).await? {
        tracing::warn!(user_id = user.id, "Failed login attempt");
        return Err(AppError::InvalidCredentials);
    }

    let auth_token = state.jwt.generate_token(user.id)?;
    tracing::info!(user_id = user.id, "User logged in");

    Ok(Json(TokenResponse { auth_token }))
}

/// Every user, one page at a time
pub async fn list_users(
    State(state): State<AppState>,
    viewer: MaybeAuthUser,
    Query(paging): Query<PageParams>,
) -> Result<Json<Page<UserView>>> {
    let page = paging.page();
    let limit = state.config.page_limit(paging.limit);

    let repo = Repository::new(state.db.clone());
    let (users, count) = repo.list_users(page, limit).await?;

    let followed = match viewer.id() {
        Some(viewer_id) => {
            let ids: Vec<i32> = users.iter().map(|u| u.id).collect();
            repo.subscribed_author_ids(viewer_id, &ids).await?
        }
        None => Default::default(),
    };

    let results = users
        .iter()
        .map(|user| UserView::new(user, followed.contains(&user.id)))
        .collect();

    let links = page_links(
        &state.config.pagination.public_base_url,
        "/api/users",
        page,
        limit,
        count,
    );

    Ok(Json(Page::new(results, count, links)))
}

/// Change the current user's password. Existing tokens stay valid.
pub async fn set_password(
    State(state): State<AppState>,
    AuthUser(current): AuthUser,
    Json(request): Json<SetPasswordRequest>,
) -> Result<StatusCode> {
    request.check()?;

    let repo = Repository::new(state.db.clone());
    let user = repo.get_user(current.id).await?;

    if !verify_password(&request.current_password, &user.hashed_password).await? {
        tracing::warn!(user_id = user.id, "Password change with wrong current password");
        return Err(AppError::Validation {
            message: "Current password is incorrect".into(),
            field: Some("current_password".into()),
        });
    }

    let hashed_password = hash_password(&request.new_password).await?;
    repo.update_password(user.id, hashed_password).await?;

    Ok(StatusCode::NO_CONTENT)
}

/// The authenticated user's own profile
pub async fn me(State(state): State<AppState>, AuthUser(current): AuthUser) -> Result<Json<UserView>> {
    let user = Repository::new(state.db.clone()).get_user(current.id).await?;
    Ok(Json(UserView::new(&user, false)))
}

/// Public profile of any user
pub async fn get_user(
    State(state): State<AppState>,
    viewer: MaybeAuthUser,
    Path(user_id): Path<i32>,
) -> Result<Json<UserView>> {
    let repo = Repository::new(state.db.clone());
    let user = repo.get_user(user_id).await?;

    let is_subscribed = match viewer.id() {
        Some(viewer_id) => repo
            .subscribed_author_ids(viewer_id, &[user.id])
            .await?
            .contains(&user.id),
        None => false,
    };

    Ok(Json(UserView::new(&user, is_subscribed)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register_request() -> RegisterRequest {
        RegisterRequest {
            email: "anna@example.com".into(),
            username: "anna".into(),
            first_name: "Anna".into(),
            last_name: "Petrova".into(),
            password: "correct-horse".into(),
        }
    }

    #[test]
    fn test_register_validation() {
        assert!(register_request().validate().is_ok());

        let mut bad_email = register_request();
        bad_email.email = "not-an-email".into();
        assert!(bad_email.validate().is_err());

        let mut short_password = register_request();
        short_password.password = "short".into();
        assert!(short_password.validate().is_err());
    }

    #[test]
    fn test_set_password_rules() {
        let request = |current: &str, new: &str| SetPasswordRequest {
            current_password: current.into(),
            new_password: new.into(),
        };

        assert!(request("old-password", "new-password").check().is_ok());

        assert!(matches!(
            request("old-password", "short").check(),
            Err(AppError::Validation { .. })
        ));
        assert!(matches!(
            request("", "new-password").check(),
            Err(AppError::Validation { .. })
        ));

        match request("same-password", "same-password").check() {
            Err(AppError::Validation { field, .. }) => {
                assert_eq!(field.as_deref(), Some("new_password"))
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_register_defaults_names() {
        let request: RegisterRequest = serde_json::from_value(serde_json::json!({
            "email": "boris@example.com",
            "username": "boris",
            "password": "long-enough",
        }))
        .unwrap();
        assert_eq!(request.first_name, "");
        assert!(request.validate().is_ok());
    }
}
