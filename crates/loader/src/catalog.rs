//! Reference data files and their import

use foodgram_common::db::{models::validate_tag, Repository};
use foodgram_common::errors::{AppError, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IngredientRecord {
    pub name: String,
    pub measurement_unit: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TagRecord {
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
    pub slug: String,
}

/// Which catalog a file holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogKind {
    Ingredients,
    Tags,
}

impl CatalogKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ingredients" => Some(Self::Ingredients),
            "tags" => Some(Self::Tags),
            _ => None,
        }
    }
}

/// Outcome of one import run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ImportSummary {
    pub inserted: usize,
    pub skipped: usize,
}

pub fn parse_ingredients(raw: &str) -> Result<Vec<IngredientRecord>> {
    let records: Vec<IngredientRecord> = serde_json::from_str(raw)?;

    for (index, record) in records.iter().enumerate() {
        if record.name.trim().is_empty() || record.measurement_unit.trim().is_empty() {
            return Err(AppError::Validation {
                message: format!("Ingredient #{} has an empty name or unit", index + 1),
                field: None,
            });
        }
    }

    Ok(records)
}

pub fn parse_tags(raw: &str) -> Result<Vec<TagRecord>> {
    let records: Vec<TagRecord> = serde_json::from_str(raw)?;

    for record in &records {
        validate_tag(&record.slug, record.color.as_deref())?;
    }

    Ok(records)
}

/// Load one catalog file into the database. Rows already present are skipped.
pub async fn import_file(repo: &Repository, kind: CatalogKind, path: &Path) -> Result<ImportSummary> {
    let raw = tokio::fs::read_to_string(path).await.map_err(|e| AppError::Configuration {
        message: format!("Cannot read {}: {}", path.display(), e),
    })?;

    let mut summary = ImportSummary::default();

    match kind {
        CatalogKind::Ingredients => {
            for record in parse_ingredients(&raw)? {
                let inserted = repo
                    .insert_ingredient_if_missing(record.name.trim(), record.measurement_unit.trim())
                    .await?;
                summary.record(inserted);
                debug!(name = %record.name, inserted, "Ingredient processed");
            }
        }
        CatalogKind::Tags => {
            for record in parse_tags(&raw)? {
                let inserted = repo
                    .insert_tag_if_missing(record.name.trim(), record.color.as_deref(), &record.slug)
                    .await?;
                summary.record(inserted);
                debug!(slug = %record.slug, inserted, "Tag processed");
            }
        }
    }

    info!(
        kind = ?kind,
        file = %path.display(),
        inserted = summary.inserted,
        skipped = summary.skipped,
        "Catalog imported"
    );

    Ok(summary)
}

impl ImportSummary {
    fn record(&mut self, inserted: bool) {
        if inserted {
            self.inserted += 1;
        } else {
            self.skipped += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ingredients() {
        let records = parse_ingredients(
            r#"[{"name": "flour", "measurement_unit": "g"}, {"name": "egg", "measurement_unit": "pcs"}]"#,
        )
        .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].measurement_unit, "pcs");
    }

    #[test]
    fn test_blank_ingredient_rejected() {
        let err = parse_ingredients(r#"[{"name": " ", "measurement_unit": "g"}]"#).unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
    }

    #[test]
    fn test_malformed_json_is_serialization_error() {
        let err = parse_ingredients("{not json").unwrap_err();
        assert!(matches!(err, AppError::Serialization(_)));
    }

    #[test]
    fn test_parse_tags() {
        let records = parse_tags(
            r##"[{"name": "Breakfast", "color": "#E26C2D", "slug": "breakfast"}, {"name": "Dinner", "slug": "dinner"}]"##,
        )
        .unwrap();
        assert_eq!(records[0].color.as_deref(), Some("#E26C2D"));
        assert_eq!(records[1].color, None);
    }

    #[test]
    fn test_bad_tag_slug_rejected() {
        let err = parse_tags(r#"[{"name": "Bad", "slug": "no spaces allowed"}]"#).unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
    }

    #[test]
    fn test_catalog_kind() {
        assert_eq!(CatalogKind::parse("tags"), Some(CatalogKind::Tags));
        assert_eq!(CatalogKind::parse("recipes"), None);
    }

    #[test]
    fn test_summary_counts() {
        let mut summary = ImportSummary::default();
        summary.record(true);
        summary.record(false);
        summary.record(true);
        assert_eq!(summary, ImportSummary { inserted: 2, skipped: 1 });
    }
}
