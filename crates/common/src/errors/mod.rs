//! Error types for Foodgram services
//!
//! Provides a closed set of error kinds with:
//! - Distinct variants for not-found, conflict, forbidden and invalid input
//! - HTTP status code mapping done once, here
//! - Structured error responses
//! - Error codes for client handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::{DbErr, SqlErr};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors (1xxx)
    ValidationError,
    MissingField,
    InvalidFormat,

    // Authentication errors (2xxx)
    Unauthorized,
    InvalidCredentials,
    InvalidToken,
    ExpiredToken,

    // Authorization errors (3xxx)
    Forbidden,
    NotAuthor,

    // Resource errors (4xxx)
    NotFound,
    UserNotFound,
    RecipeNotFound,
    IngredientNotFound,
    TagNotFound,

    // Conflict errors (5xxx)
    Conflict,
    AlreadyFavorited,
    AlreadyInShoppingCart,
    AlreadySubscribed,

    // Rate limiting (6xxx)
    RateLimited,

    // Database errors (7xxx)
    DatabaseError,
    ConnectionError,
    DataIntegrity,

    // Rendering errors (8xxx)
    RenderFailed,

    // Internal errors (9xxx)
    InternalError,
    ConfigurationError,
    SerializationError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            ErrorCode::ValidationError => 1001,
            ErrorCode::MissingField => 1002,
            ErrorCode::InvalidFormat => 1003,

            ErrorCode::Unauthorized => 2001,
            ErrorCode::InvalidCredentials => 2002,
            ErrorCode::InvalidToken => 2003,
            ErrorCode::ExpiredToken => 2004,

            ErrorCode::Forbidden => 3001,
            ErrorCode::NotAuthor => 3002,

            ErrorCode::NotFound => 4001,
            ErrorCode::UserNotFound => 4002,
            ErrorCode::RecipeNotFound => 4003,
            ErrorCode::IngredientNotFound => 4004,
            ErrorCode::TagNotFound => 4005,

            ErrorCode::Conflict => 5001,
            ErrorCode::AlreadyFavorited => 5002,
            ErrorCode::AlreadyInShoppingCart => 5003,
            ErrorCode::AlreadySubscribed => 5004,

            ErrorCode::RateLimited => 6001,

            ErrorCode::DatabaseError => 7001,
            ErrorCode::ConnectionError => 7002,
            ErrorCode::DataIntegrity => 7003,

            ErrorCode::RenderFailed => 8001,

            ErrorCode::InternalError => 9001,
            ErrorCode::ConfigurationError => 9002,
            ErrorCode::SerializationError => 9003,
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Required field missing: {field}")]
    MissingField { field: String },

    #[error("Invalid format: {message}")]
    InvalidFormat { message: String },

    // Authentication errors
    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token expired")]
    ExpiredToken,

    // Authorization errors
    #[error("Forbidden: {message}")]
    Forbidden { message: String },

    #[error("Only the author can modify recipe {recipe_id}")]
    NotAuthor { recipe_id: i32 },

    // Resource errors
    #[error("Resource not found: {resource_type} with id {id}")]
    NotFound { resource_type: String, id: String },

    #[error("User not found: {id}")]
    UserNotFound { id: i32 },

    #[error("Recipe not found: {id}")]
    RecipeNotFound { id: i32 },

    #[error("Ingredients not found: {ids:?}")]
    IngredientNotFound { ids: Vec<i32> },

    #[error("Tags not found: {ids:?}")]
    TagNotFound { ids: Vec<i32> },

    // Conflict errors
    #[error("Duplicate resource: {message}")]
    Duplicate { message: String },

    #[error("Recipe {recipe_id} is already in favorites")]
    AlreadyFavorited { recipe_id: i32 },

    #[error("Recipe {recipe_id} is already in the shopping cart")]
    AlreadyInShoppingCart { recipe_id: i32 },

    #[error("Already subscribed to user {author_id}")]
    AlreadySubscribed { author_id: i32 },

    // Rate limiting
    #[error("Rate limit exceeded: {limit} requests per second")]
    RateLimited { limit: u32 },

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] DbErr),

    #[error("Database connection error: {message}")]
    DatabaseConnection { message: String },

    #[error("Data integrity violation: {message}")]
    DataIntegrity { message: String },

    // Rendering errors
    #[error("Rendering failed: {message}")]
    RenderFailed { message: String },

    // Internal errors
    #[error("Internal server error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::MissingField { .. } => ErrorCode::MissingField,
            AppError::InvalidFormat { .. } => ErrorCode::InvalidFormat,
            AppError::Unauthorized { .. } => ErrorCode::Unauthorized,
            AppError::InvalidCredentials => ErrorCode::InvalidCredentials,
            AppError::InvalidToken => ErrorCode::InvalidToken,
            AppError::ExpiredToken => ErrorCode::ExpiredToken,
            AppError::Forbidden { .. } => ErrorCode::Forbidden,
            AppError::NotAuthor { .. } => ErrorCode::NotAuthor,
            AppError::NotFound { .. } => ErrorCode::NotFound,
            AppError::UserNotFound { .. } => ErrorCode::UserNotFound,
            AppError::RecipeNotFound { .. } => ErrorCode::RecipeNotFound,
            AppError::IngredientNotFound { .. } => ErrorCode::IngredientNotFound,
            AppError::TagNotFound { .. } => ErrorCode::TagNotFound,
            AppError::Duplicate { .. } => ErrorCode::Conflict,
            AppError::AlreadyFavorited { .. } => ErrorCode::AlreadyFavorited,
            AppError::AlreadyInShoppingCart { .. } => ErrorCode::AlreadyInShoppingCart,
            AppError::AlreadySubscribed { .. } => ErrorCode::AlreadySubscribed,
            AppError::RateLimited { .. } => ErrorCode::RateLimited,
            AppError::Database(_) => ErrorCode::DatabaseError,
            AppError::DatabaseConnection { .. } => ErrorCode::ConnectionError,
            AppError::DataIntegrity { .. } => ErrorCode::DataIntegrity,
            AppError::RenderFailed { .. } => ErrorCode::RenderFailed,
            AppError::Internal { .. } => ErrorCode::InternalError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::Serialization(_) => ErrorCode::SerializationError,
            AppError::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            AppError::Validation { .. }
            | AppError::MissingField { .. }
            | AppError::InvalidFormat { .. } => StatusCode::BAD_REQUEST,

            // 401 Unauthorized
            AppError::Unauthorized { .. }
            | AppError::InvalidCredentials
            | AppError::InvalidToken
            | AppError::ExpiredToken => StatusCode::UNAUTHORIZED,

            // 403 Forbidden
            AppError::Forbidden { .. } | AppError::NotAuthor { .. } => StatusCode::FORBIDDEN,

            // 404 Not Found
            AppError::NotFound { .. }
            | AppError::UserNotFound { .. }
            | AppError::RecipeNotFound { .. }
            | AppError::IngredientNotFound { .. }
            | AppError::TagNotFound { .. } => StatusCode::NOT_FOUND,

            // 409 Conflict
            AppError::Duplicate { .. }
            | AppError::AlreadyFavorited { .. }
            | AppError::AlreadyInShoppingCart { .. }
            | AppError::AlreadySubscribed { .. } => StatusCode::CONFLICT,

            // 429 Too Many Requests
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,

            // 500 Internal Server Error
            AppError::Database(_)
            | AppError::DatabaseConnection { .. }
            | AppError::DataIntegrity { .. }
            | AppError::RenderFailed { .. }
            | AppError::Internal { .. }
            | AppError::Configuration { .. }
            | AppError::Serialization(_)
            | AppError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Check if this error should be logged at error level
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }

    /// Check if this error is a client error
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }

    /// Classify a write failure, turning unique and foreign key violations
    /// into the given domain errors.
    pub fn from_write(
        err: DbErr,
        on_unique: impl FnOnce() -> AppError,
        on_missing_reference: impl FnOnce() -> AppError,
    ) -> AppError {
        match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => on_unique(),
            Some(SqlErr::ForeignKeyConstraintViolation(_)) => on_missing_reference(),
            _ => AppError::Database(err),
        }
    }
}

/// Structured error response for API
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();
        let message = self.to_string();

        // Log based on severity
        if self.is_server_error() {
            tracing::error!(
                error = %message,
                code = ?code,
                status = status.as_u16(),
                "Server error"
            );
        } else if self.is_client_error() {
            tracing::warn!(
                error = %message,
                code = ?code,
                status = status.as_u16(),
                "Client error"
            );
        }

        let field = match self {
            AppError::Validation { field, .. } => field,
            AppError::MissingField { field } => Some(field),
            _ => None,
        };

        let body = ErrorResponse {
            error: ErrorDetails {
                code,
                message,
                field,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal {
            message: err.to_string(),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        let field = err.field_errors().keys().next().map(|f| f.to_string());
        AppError::Validation {
            message: err.to_string(),
            field,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        let err = AppError::RecipeNotFound { id: 7 };
        assert_eq!(err.code(), ErrorCode::RecipeNotFound);
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_user_not_found_is_404() {
        let err = AppError::UserNotFound { id: 42 };
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(err.to_string(), "User not found: 42");
    }

    #[test]
    fn test_conflicts() {
        for err in [
            AppError::AlreadyFavorited { recipe_id: 1 },
            AppError::AlreadyInShoppingCart { recipe_id: 1 },
            AppError::AlreadySubscribed { author_id: 1 },
        ] {
            assert_eq!(err.status_code(), StatusCode::CONFLICT);
        }
    }

    #[test]
    fn test_validation_error() {
        let err = AppError::Validation {
            message: "Invalid name".into(),
            field: Some("name".into()),
        };
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert!(!err.is_server_error());
        assert!(err.is_client_error());
    }

    #[test]
    fn test_render_and_integrity_are_server_errors() {
        let render = AppError::RenderFailed {
            message: "disk full".into(),
        };
        let integrity = AppError::DataIntegrity {
            message: "negative total".into(),
        };
        assert!(render.is_server_error());
        assert!(integrity.is_server_error());
        assert_ne!(render.code(), integrity.code());
    }

    #[test]
    fn test_from_write_passes_through_other_errors() {
        let err = AppError::from_write(
            DbErr::Custom("boom".into()),
            || AppError::Duplicate { message: "dup".into() },
            || AppError::RecipeNotFound { id: 1 },
        );
        assert_eq!(err.code(), ErrorCode::DatabaseError);
    }

    #[test]
    fn test_numeric_codes_are_unique() {
        let codes = [
            ErrorCode::ValidationError,
            ErrorCode::Unauthorized,
            ErrorCode::NotAuthor,
            ErrorCode::UserNotFound,
            ErrorCode::AlreadyInShoppingCart,
            ErrorCode::DataIntegrity,
            ErrorCode::RenderFailed,
        ];
        let mut numeric: Vec<u16> = codes.iter().map(ErrorCode::as_code).collect();
        numeric.sort_unstable();
        numeric.dedup();
        assert_eq!(numeric.len(), codes.len());
    }
}
