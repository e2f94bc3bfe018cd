//! Ingredient entity (reference data)

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "ingredients")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub name: String,

    pub measurement_unit: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::ingredient_amount::Entity")]
    Amounts,
}

impl Related<super::ingredient_amount::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Amounts.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
