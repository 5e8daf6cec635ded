//! Stock level entity - Current on-hand quantity of a material at a location.
//!
//! One row per (`material_id`, `location_id`), enforced by a unique index created
//! alongside the table. The quantity is a derived cache of the signed sum of the
//! matching `stock_transactions` rows and is only written by the stock engine.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Stock level database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_levels")]
pub struct Model {
    /// Unique identifier for the stock level row
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Material being counted
    pub material_id: i64,
    /// Location holding the stock
    pub location_id: i64,
    /// Units on hand, never negative
    pub quantity: i64,
    /// When the quantity last changed
    pub updated_at: DateTimeUtc,
}

/// Defines relationships between `StockLevel` and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each stock level belongs to one material
    #[sea_orm(
        belongs_to = "super::material::Entity",
        from = "Column::MaterialId",
        to = "super::material::Column::Id"
    )]
    Material,
    /// Each stock level belongs to one location
    #[sea_orm(
        belongs_to = "super::location::Entity",
        from = "Column::LocationId",
        to = "super::location::Column::Id"
    )]
    Location,
}

impl Related<super::material::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Material.def()
    }
}

impl Related<super::location::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Location.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
