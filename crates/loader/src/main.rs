//! Foodgram Catalog Loader
//!
//! Imports reference data into the database:
//! 1. Reads a JSON file of ingredients or tags
//! 2. Validates every record
//! 3. Inserts the ones that are not there yet
//!
//! Usage: `foodgram-loader <ingredients|tags> <file.json>`

mod catalog;

use anyhow::{bail, Context};
use catalog::CatalogKind;
use foodgram_common::{config::AppConfig, db::DbPool, Repository, VERSION};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: foodgram-loader <ingredients|tags> <file.json>";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let mut args = std::env::args().skip(1);
    let (Some(kind), Some(path)) = (args.next(), args.next()) else {
        bail!(USAGE);
    };
    let Some(kind) = CatalogKind::parse(&kind) else {
        bail!("unknown catalog '{}'; {}", kind, USAGE);
    };
    let path = PathBuf::from(path);

    // Load configuration
    let config = AppConfig::load().context("Failed to load configuration")?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.observability.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!("Starting Foodgram Catalog Loader v{}", VERSION);

    let db = DbPool::new(&config.database)
        .await
        .context("Failed to connect to database")?;

    if config.database.run_migrations {
        db.migrate().await.context("Failed to apply migrations")?;
    }

    let repo = Repository::new(db);
    let summary = catalog::import_file(&repo, kind, &path)
        .await
        .with_context(|| format!("Failed to import {}", path.display()))?;

    println!(
        "{}: {} inserted, {} already present",
        path.display(),
        summary.inserted,
        summary.skipped
    );

    Ok(())
}
