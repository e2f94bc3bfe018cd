//! Authentication and authorization utilities
//!
//! Provides:
//! - Password hashing (argon2)
//! - JWT token generation and validation
//! - Current user extraction for handlers

use crate::db::{DbPool, Repository};
use crate::errors::{AppError, Result};
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use axum::extract::{FromRef, FromRequestParts};
use axum::http::request::Parts;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// The authenticated user, as seen by handlers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    pub id: i32,
    pub email: String,
    pub username: String,
    pub is_superuser: bool,
}

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Subject (user ID)
    pub sub: String,

    /// Token ID
    pub jti: String,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

impl JwtClaims {
    pub fn user_id(&self) -> Result<i32> {
        self.sub.parse().map_err(|_| AppError::InvalidToken)
    }
}

/// JWT token manager
pub struct JwtManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expiration_secs: i64,
}

impl JwtManager {
    /// Create a new JWT manager with the given secret
    pub fn new(secret: &str, expiration_secs: u64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            expiration_secs: expiration_secs as i64,
        }
    }

    /// Issue a token for the given user
    pub fn generate_token(&self, user_id: i32) -> Result<String> {
        let now = Utc::now();
        let exp = now + Duration::seconds(self.expiration_secs);

        let claims = JwtClaims {
            sub: user_id.to_string(),
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: exp.timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding_key).map_err(|e| AppError::Internal {
            message: format!("Failed to generate token: {}", e),
        })
    }

    /// Validate and decode a JWT token
    pub fn validate_token(&self, token: &str) -> Result<JwtClaims> {
        decode::<JwtClaims>(token, &self.decoding_key, &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AppError::ExpiredToken,
                _ => AppError::InvalidToken,
            })
    }
}

/// Hash a password into an argon2 PHC string.
///
/// Argon2 is deliberately slow, so the work runs on the blocking pool.
pub async fn hash_password(password: &str) -> Result<String> {
    let password = password.to_owned();
    tokio::task::spawn_blocking(move || hash_password_blocking(&password))
        .await
        .map_err(|e| AppError::Internal {
            message: format!("Password hashing task failed: {}", e),
        })?
}

/// Check a password against a stored PHC string. Malformed hashes never match.
pub async fn verify_password(password: &str, stored_hash: &str) -> Result<bool> {
    let password = password.to_owned();
    let stored_hash = stored_hash.to_owned();
    tokio::task::spawn_blocking(move || verify_password_blocking(&password, &stored_hash))
        .await
        .map_err(|e| AppError::Internal {
            message: format!("Password verification task failed: {}", e),
        })
}

fn hash_password_blocking(password: &str) -> Result<String> {
    let salt = SaltString::encode_b64(&rand::random::<[u8; 16]>()).map_err(|e| {
        AppError::Internal {
            message: format!("Failed to build salt: {}", e),
        }
    })?;

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal {
            message: format!("Failed to hash password: {}", e),
        })
}

fn verify_password_blocking(password: &str, stored_hash: &str) -> bool {
    PasswordHash::new(stored_hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

/// Extract the token from an Authorization header value.
///
/// Accepts both `Bearer <token>` and `Token <token>`.
pub fn extract_bearer(auth_header: &str) -> Option<&str> {
    auth_header
        .strip_prefix("Bearer ")
        .or_else(|| auth_header.strip_prefix("Token "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

async fn resolve_user(parts: &Parts, jwt: &JwtManager, pool: DbPool) -> Result<Option<CurrentUser>> {
    let Some(header) = parts.headers.get("authorization") else {
        return Ok(None);
    };

    let token = header
        .to_str()
        .ok()
        .and_then(extract_bearer)
        .ok_or(AppError::InvalidToken)?;

    let claims = jwt.validate_token(token)?;
    let user_id = claims.user_id()?;

    let user = Repository::new(pool)
        .find_user(user_id)
        .await?
        .filter(|u| u.is_active)
        .ok_or_else(|| AppError::Unauthorized {
            message: "User is inactive or no longer exists".to_string(),
        })?;

    Ok(Some(CurrentUser {
        id: user.id,
        email: user.email,
        username: user.username,
        is_superuser: user.is_superuser,
    }))
}

/// Extractor that requires a valid token
#[derive(Debug, Clone)]
pub struct AuthUser(pub CurrentUser);

/// Extractor for endpoints that are public but personalize when a token
/// is sent. A malformed or expired token is still rejected.
#[derive(Debug, Clone)]
pub struct MaybeAuthUser(pub Option<CurrentUser>);

impl MaybeAuthUser {
    pub fn id(&self) -> Option<i32> {
        self.0.as_ref().map(|u| u.id)
    }
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    Arc<JwtManager>: FromRef<S>,
    DbPool: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self> {
        let jwt = Arc::<JwtManager>::from_ref(state);
        let pool = DbPool::from_ref(state);

        resolve_user(parts, &jwt, pool)
            .await?
            .map(AuthUser)
            .ok_or_else(|| AppError::Unauthorized {
                message: "Missing Authorization header".to_string(),
            })
    }
}

impl<S> FromRequestParts<S> for MaybeAuthUser
where
    S: Send + Sync,
    Arc<JwtManager>: FromRef<S>,
    DbPool: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self> {
        let jwt = Arc::<JwtManager>::from_ref(state);
        let pool = DbPool::from_ref(state);

        Ok(MaybeAuthUser(resolve_user(parts, &jwt, pool).await?))
    }
}

/// Extractor for the admin-only routes. Requires a token of a superuser.
#[derive(Debug, Clone)]
pub struct AdminUser(pub CurrentUser);

impl AdminUser {
    fn from_current(current: CurrentUser) -> Result<Self> {
        if !current.is_superuser {
            tracing::warn!(user_id = current.id, "Non-superuser tried an admin route");
            return Err(AppError::Forbidden {
                message: "Only administrators may do this".to_string(),
            });
        }
        Ok(AdminUser(current))
    }
}

impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
    Arc<JwtManager>: FromRef<S>,
    DbPool: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self> {
        let AuthUser(current) = AuthUser::from_request_parts(parts, state).await?;
        AdminUser::from_current(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn current(is_superuser: bool) -> CurrentUser {
        CurrentUser {
            id: 3,
            email: "chef@example.com".into(),
            username: "chef".into(),
            is_superuser,
        }
    }

    #[tokio::test]
    async fn test_password_hash_roundtrip() {
        let hash = hash_password("s3cret-pass").await.unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("s3cret-pass", &hash).await.unwrap());
        assert!(!verify_password("wrong", &hash).await.unwrap());
    }

    #[tokio::test]
    async fn test_password_hashes_are_salted() {
        let a = hash_password("same").await.unwrap();
        let b = hash_password("same").await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_malformed_hash_never_matches() {
        assert!(!verify_password("anything", "not-a-phc-string").await.unwrap());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_hashing_does_not_block_the_runtime() {
        // A single-threaded runtime keeps serving other tasks while argon2 runs.
        let ticker = tokio::spawn(async { tokio::task::yield_now().await });
        let hash = hash_password("busy-runtime").await.unwrap();
        tokio_test::assert_ok!(ticker.await);
        assert!(verify_password("busy-runtime", &hash).await.unwrap());
    }

    #[test]
    fn test_admin_requires_superuser() {
        let admin = AdminUser::from_current(current(true)).unwrap();
        assert_eq!(admin.0.username, "chef");

        assert!(matches!(
            AdminUser::from_current(current(false)),
            Err(AppError::Forbidden { .. })
        ));
    }

    #[test]
    fn test_extract_bearer() {
        assert_eq!(extract_bearer("Bearer abc.def"), Some("abc.def"));
        assert_eq!(extract_bearer("Token abc.def"), Some("abc.def"));
        assert_eq!(extract_bearer("Bearer "), None);
        assert_eq!(extract_bearer("Basic abc"), None);
        assert_eq!(extract_bearer("abc.def"), None);
    }

    #[test]
    fn test_jwt_roundtrip() {
        let manager = JwtManager::new("test_secret", 3600);

        let token = manager.generate_token(42).unwrap();
        let claims = manager.validate_token(&token).unwrap();

        assert_eq!(claims.user_id().unwrap(), 42);
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_jwt_ids_are_unique() {
        let manager = JwtManager::new("test_secret", 3600);
        let a = manager.validate_token(&manager.generate_token(1).unwrap()).unwrap();
        let b = manager.validate_token(&manager.generate_token(1).unwrap()).unwrap();
        assert_ne!(a.jti, b.jti);
    }

    #[test]
    fn test_expired_token_rejected() {
        let now = Utc::now().timestamp();
        let claims = JwtClaims {
            sub: "7".into(),
            jti: Uuid::new_v4().to_string(),
            iat: now - 7200,
            exp: now - 3600,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"test_secret"),
        )
        .unwrap();

        let manager = JwtManager::new("test_secret", 3600);
        assert!(matches!(
            manager.validate_token(&token),
            Err(AppError::ExpiredToken)
        ));
    }

    #[test]
    fn test_foreign_or_garbage_token_rejected() {
        let other = JwtManager::new("other_secret", 3600);
        let token = other.generate_token(1).unwrap();

        let manager = JwtManager::new("test_secret", 3600);
        assert!(matches!(
            manager.validate_token(&token),
            Err(AppError::InvalidToken)
        ));
        assert!(matches!(
            manager.validate_token("garbage"),
            Err(AppError::InvalidToken)
        ));
    }
}
