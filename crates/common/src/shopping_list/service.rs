//! Shopping list export pipeline

use super::aggregate::{aggregate_usages, AggregatedLine, IngredientUsage};
use super::render::{format_line, ArtifactRef, DocumentRenderer};
use crate::errors::Result;
use crate::metrics;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument, warn};

/// Everything a user's cart contributes to the shopping list
#[derive(Debug, Clone, Default)]
pub struct CartSnapshot {
    pub user_id: i32,
    pub username: String,
    pub usages: Vec<IngredientUsage>,
}

/// Read side of the shopping cart
#[async_trait]
pub trait CartStore: Send + Sync {
    /// Load the ingredient usages for every recipe in the user's cart.
    ///
    /// Fails with `UserNotFound` when the user does not exist. An empty cart
    /// is a snapshot with no usages.
    async fn load_cart(&self, user_id: i32) -> Result<CartSnapshot>;
}

/// Result of a finished export
#[derive(Debug, Clone)]
pub struct ShoppingListExport {
    pub artifact: ArtifactRef,
    pub lines: Vec<AggregatedLine>,
}

/// Loads a cart, merges its ingredients and hands them to a renderer
#[derive(Clone)]
pub struct ShoppingListService {
    store: Arc<dyn CartStore>,
    renderer: Arc<dyn DocumentRenderer>,
}

impl ShoppingListService {
    pub fn new(store: Arc<dyn CartStore>, renderer: Arc<dyn DocumentRenderer>) -> Self {
        Self { store, renderer }
    }

    /// Merged ingredient totals for the user's current cart
    pub async fn aggregate(&self, user_id: i32) -> Result<Vec<AggregatedLine>> {
        let snapshot = self.store.load_cart(user_id).await?;
        aggregate_usages(snapshot.usages)
    }

    /// Aggregate the cart and render it as a document stamped with `now`
    #[instrument(skip(self))]
    pub async fn export(&self, user_id: i32, now: DateTime<Utc>) -> Result<ShoppingListExport> {
        let start = Instant::now();

        let result = self.export_inner(user_id, now).await;

        let line_count = result.as_ref().map(|e| e.lines.len()).unwrap_or(0);
        metrics::record_shopping_list_export(start.elapsed(), line_count, result.is_ok());

        match &result {
            Ok(export) => info!(
                user_id,
                lines = export.lines.len(),
                file = %export.artifact.file_name,
                size_bytes = export.artifact.size_bytes,
                "Shopping list exported"
            ),
            Err(e) => warn!(user_id, error = %e, "Shopping list export failed"),
        }

        result
    }

    async fn export_inner(&self, user_id: i32, now: DateTime<Utc>) -> Result<ShoppingListExport> {
        let snapshot = self.store.load_cart(user_id).await?;
        let recipes = snapshot
            .usages
            .iter()
            .map(|u| u.recipe_id)
            .collect::<std::collections::BTreeSet<_>>()
            .len();

        let lines = aggregate_usages(snapshot.usages)?;
        let display: Vec<String> = lines.iter().map(format_line).collect();

        tracing::debug!(user_id, recipes, lines = lines.len(), "Cart aggregated");

        let artifact = self
            .renderer
            .render(&display, &snapshot.username, now)
            .await?;

        Ok(ShoppingListExport { artifact, lines })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::AppError;
    use crate::shopping_list::PdfRenderer;
    use chrono::TimeZone;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeCartStore {
        carts: HashMap<i32, CartSnapshot>,
    }

    impl FakeCartStore {
        fn with_cart(mut self, user_id: i32, username: &str, usages: Vec<IngredientUsage>) -> Self {
            self.carts.insert(
                user_id,
                CartSnapshot {
                    user_id,
                    username: username.to_string(),
                    usages,
                },
            );
            self
        }
    }

    #[async_trait]
    impl CartStore for FakeCartStore {
        async fn load_cart(&self, user_id: i32) -> Result<CartSnapshot> {
            self.carts
                .get(&user_id)
                .cloned()
                .ok_or(AppError::UserNotFound { id: user_id })
        }
    }

    /// Captures what it was asked to render
    #[derive(Default)]
    struct RecordingRenderer {
        calls: Mutex<Vec<(Vec<String>, String)>>,
    }

    #[async_trait]
    impl DocumentRenderer for RecordingRenderer {
        async fn render(
            &self,
            lines: &[String],
            label: &str,
            timestamp: DateTime<Utc>,
        ) -> Result<ArtifactRef> {
            self.calls
                .lock()
                .unwrap()
                .push((lines.to_vec(), label.to_string()));
            Ok(ArtifactRef {
                path: PathBuf::from("/dev/null"),
                file_name: crate::shopping_list::artifact_file_name(label, timestamp),
                size_bytes: 0,
                checksum: String::new(),
            })
        }
    }

    struct FailingRenderer;

    #[async_trait]
    impl DocumentRenderer for FailingRenderer {
        async fn render(&self, _: &[String], _: &str, _: DateTime<Utc>) -> Result<ArtifactRef> {
            Err(AppError::RenderFailed {
                message: "disk full".into(),
            })
        }
    }

    fn usage(recipe_id: i32, ingredient_id: i32, name: &str, unit: &str, amount: i32) -> IngredientUsage {
        IngredientUsage {
            recipe_id,
            ingredient_id,
            name: name.to_string(),
            measurement_unit: unit.to_string(),
            amount,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 11, 20, 9, 30, 0).unwrap()
    }

    fn store() -> FakeCartStore {
        FakeCartStore::default()
            .with_cart(
                1,
                "anna",
                vec![
                    usage(1, 10, "flour", "g", 200),
                    usage(1, 11, "sugar", "g", 100),
                    usage(2, 10, "flour", "g", 150),
                    usage(2, 12, "egg", "pcs", 2),
                ],
            )
            .with_cart(2, "boris", vec![])
    }

    #[tokio::test]
    async fn test_export_renders_formatted_lines() {
        let renderer = Arc::new(RecordingRenderer::default());
        let service = ShoppingListService::new(Arc::new(store()), renderer.clone());

        let export = service.export(1, now()).await.unwrap();

        assert_eq!(export.lines.len(), 3);
        assert_eq!(
            export.artifact.file_name,
            "2024-11-20_09-30-00_anna_shopping_list.pdf"
        );

        let calls = renderer.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0].0,
            vec![
                "Egg \u{2014} 2 pcs".to_string(),
                "Flour \u{2014} 350 g".to_string(),
                "Sugar \u{2014} 100 g".to_string(),
            ]
        );
        assert_eq!(calls[0].1, "anna");
    }

    #[tokio::test]
    async fn test_empty_cart_still_renders() {
        let renderer = Arc::new(RecordingRenderer::default());
        let service = ShoppingListService::new(Arc::new(store()), renderer.clone());

        let export = service.export(2, now()).await.unwrap();

        assert!(export.lines.is_empty());
        let calls = renderer.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].0.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_user_does_not_render() {
        let renderer = Arc::new(RecordingRenderer::default());
        let service = ShoppingListService::new(Arc::new(store()), renderer.clone());

        let err = service.export(99, now()).await.unwrap_err();

        assert!(matches!(err, AppError::UserNotFound { id: 99 }));
        assert!(renderer.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_render_failure_propagates() {
        let service = ShoppingListService::new(Arc::new(store()), Arc::new(FailingRenderer));

        let err = service.export(1, now()).await.unwrap_err();

        assert!(matches!(err, AppError::RenderFailed { .. }));
        assert_eq!(err.status_code(), axum::http::StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_aggregate_without_rendering() {
        let renderer = Arc::new(RecordingRenderer::default());
        let service = ShoppingListService::new(Arc::new(store()), renderer.clone());

        let lines = service.aggregate(1).await.unwrap();

        assert_eq!(lines[1].name, "Flour");
        assert_eq!(lines[1].total_amount, 350);
        assert!(renderer.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_export_to_pdf_file() {
        let dir = std::env::temp_dir().join(format!("foodgram-export-{}", uuid::Uuid::new_v4()));
        let service = ShoppingListService::new(
            Arc::new(store()),
            Arc::new(PdfRenderer::new(&dir, 40)),
        );

        let export = service.export(1, now()).await.unwrap();
        let bytes = export.artifact.take().await.unwrap();
        let doc = lopdf::Document::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 1);

        // Downloads do not accumulate on disk
        assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 0);

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }
}
