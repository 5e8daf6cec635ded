//! Material entity - An item stocked by central supply.
//!
//! Materials carry a Thai name (required) and an optional English name, a unit of
//! measure, a default storage location and the reporting thresholds
//! (`reorder_point`, `safety_stock`). Deletion is a hard delete with an explicit
//! cascade, see [`crate::core::catalog::delete_material`].

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Material database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "materials")]
pub struct Model {
    /// Unique identifier for the material
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Stock code, unique across the system
    #[sea_orm(unique)]
    pub code: String,
    /// Thai display name, unique across the system
    #[sea_orm(unique)]
    pub name_th: String,
    /// Optional English display name
    pub name_en: Option<String>,
    /// Unit of measure (e.g., "box", "ream")
    pub unit: String,
    /// Category this material is filed under
    pub category_id: i64,
    /// Where the material is normally stored
    pub location_id: Option<i64>,
    /// Reporting threshold below which the material should be reordered
    pub reorder_point: Option<i64>,
    /// Reporting threshold for the minimum buffer
    pub safety_stock: Option<i64>,
    /// Free-text description
    pub description: Option<String>,
    /// When the material was created
    pub created_at: DateTimeUtc,
}

/// Defines relationships between Material and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each material belongs to one category
    #[sea_orm(
        belongs_to = "super::category::Entity",
        from = "Column::CategoryId",
        to = "super::category::Column::Id"
    )]
    Category,
    /// Each material optionally has a default location
    #[sea_orm(
        belongs_to = "super::location::Entity",
        from = "Column::LocationId",
        to = "super::location::Column::Id"
    )]
    Location,
    /// One material has stock levels at many locations
    #[sea_orm(has_many = "super::stock_level::Entity")]
    StockLevels,
}

impl Related<super::category::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Category.def()
    }
}

impl Related<super::stock_level::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::StockLevels.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
