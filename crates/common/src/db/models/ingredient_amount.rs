//! Ingredient amount entity
//!
//! A quantity of one ingredient. Identical (ingredient, amount) pairs are
//! shared between recipes through `recipe_ingredient_amounts`.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "ingredient_amounts")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub ingredient_id: i32,

    /// Always positive, enforced by a CHECK constraint
    pub amount: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::ingredient::Entity",
        from = "Column::IngredientId",
        to = "super::ingredient::Column::Id"
    )]
    Ingredient,
}

impl Related<super::ingredient::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Ingredient.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
