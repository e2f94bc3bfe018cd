//! Tag entity (reference data)

use crate::errors::AppError;
use regex_lite::Regex;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "tags")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub name: String,

    /// `#RRGGBB`
    pub color: Option<String>,

    #[sea_orm(unique)]
    pub slug: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::recipe_tag::Entity")]
    RecipeLinks,
}

impl Related<super::recipe_tag::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::RecipeLinks.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

fn slug_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[-a-zA-Z0-9_]+$").expect("static slug pattern"))
}

fn color_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^#[0-9a-fA-F]{6}$").expect("static color pattern"))
}

/// Check a tag slug and optional color before insert
pub fn validate_tag(slug: &str, color: Option<&str>) -> crate::errors::Result<()> {
    if !slug_pattern().is_match(slug) {
        return Err(AppError::Validation {
            message: format!("Slug '{}' must match ^[-a-zA-Z0-9_]+$", slug),
            field: Some("slug".to_string()),
        });
    }

    if let Some(color) = color {
        if !color_pattern().is_match(color) {
            return Err(AppError::Validation {
                message: format!("Color '{}' must be a #RRGGBB hex value", color),
                field: Some("color".to_string()),
            });
        }
    }

    Ok(())
}
