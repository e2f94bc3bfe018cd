//! Foodgram Common Library
//!
//! Shared code for the Foodgram gateway and catalog loader including:
//! - Database models and repository patterns
//! - Shopping list aggregation and PDF export
//! - Error types and handling
//! - Configuration management
//! - Authentication utilities
//! - Metrics and observability

pub mod auth;
pub mod config;
pub mod db;
pub mod errors;
pub mod metrics;
pub mod pagination;
pub mod shopping_list;

// Re-export commonly used types
pub use config::AppConfig;
pub use db::{DbPool, Repository};
pub use errors::{AppError, Result};
pub use shopping_list::{ShoppingListService, PdfRenderer};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
