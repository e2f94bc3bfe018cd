//! Database layer for Foodgram
//!
//! Provides:
//! - SeaORM entity models
//! - Repository pattern for data access
//! - Connection pool management
//! - Startup migrations

pub mod models;
mod repository;

pub use repository::{
    IngredientAmountInput, NewRecipe, NewUser, RecipeFilter, RecipeIngredientRow, RecipeUpdate,
    Repository,
};

use crate::config::DatabaseConfig;
use crate::errors::{AppError, Result};
use backoff::ExponentialBackoff;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Database connection pool wrapper.
///
/// Built once at startup and handed to request handlers through
/// application state.
#[derive(Clone)]
pub struct DbPool {
    conn: Arc<DatabaseConnection>,
}

impl DbPool {
    /// Create a new database pool from configuration, retrying while the
    /// database is still coming up.
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        info!("Connecting to database...");

        let mut opts = ConnectOptions::new(&config.url);
        opts.max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .sqlx_logging(false);

        let policy = ExponentialBackoff {
            max_elapsed_time: Some(Duration::from_secs(config.connect_retry_window_secs)),
            ..ExponentialBackoff::default()
        };

        let conn = backoff::future::retry(policy, || async {
            Database::connect(opts.clone()).await.map_err(|e| {
                warn!(error = %e, "Database not reachable yet, retrying");
                backoff::Error::transient(e)
            })
        })
        .await
        .map_err(|e| AppError::DatabaseConnection {
            message: format!("Failed to connect: {}", e),
        })?;

        info!("Database connection established");

        Ok(Self {
            conn: Arc::new(conn),
        })
    }

    /// Wrap an existing connection
    pub fn from_connection(conn: DatabaseConnection) -> Self {
        Self {
            conn: Arc::new(conn),
        }
    }

    /// Underlying connection
    pub fn conn(&self) -> &DatabaseConnection {
        &self.conn
    }

    /// Apply pending SQL migrations from `crates/common/migrations`
    pub async fn migrate(&self) -> Result<()> {
        let pool = self.conn.get_postgres_connection_pool();

        sqlx::migrate!("./migrations")
            .run(pool)
            .await
            .map_err(|e| AppError::DatabaseConnection {
                message: format!("Migration failed: {}", e),
            })?;

        info!("Database migrations applied");
        Ok(())
    }

    /// Ping the database to check connectivity
    pub async fn ping(&self) -> Result<()> {
        self.conn
            .execute_unprepared("SELECT 1")
            .await
            .map_err(|e| AppError::DatabaseConnection {
                message: format!("Ping failed: {}", e),
            })?;

        Ok(())
    }
}
