//! Stock transaction entity - Immutable ledger entry for one quantity movement.
//!
//! `quantity` is a non-negative magnitude; the direction is carried by
//! `transaction_type`. Rows are only ever inserted, or bulk-deleted together with
//! their material.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Direction of a stock movement
#[derive(Copy, Clone, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum TransactionType {
    /// Stock entering a location
    #[sea_orm(string_value = "IN")]
    In,
    /// Stock leaving a location
    #[sea_orm(string_value = "OUT")]
    Out,
}

impl TransactionType {
    /// Applies the direction to a magnitude.
    #[must_use]
    pub const fn signed(self, magnitude: i64) -> i64 {
        match self {
            Self::In => magnitude,
            Self::Out => -magnitude,
        }
    }
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::In => write!(f, "IN"),
            Self::Out => write!(f, "OUT"),
        }
    }
}

/// Stock transaction database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_transactions")]
pub struct Model {
    /// Unique identifier for the transaction
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Material that moved
    pub material_id: i64,
    /// Location the movement applies to
    pub location_id: i64,
    /// `IN` or `OUT`
    pub transaction_type: TransactionType,
    /// Magnitude of the movement
    pub quantity: i64,
    /// Human-readable reason (remark, request number, stocktake note)
    pub description: String,
    /// When the movement was recorded
    pub created_at: DateTimeUtc,
}

/// Defines relationships between `StockTransaction` and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each transaction belongs to one material
    #[sea_orm(
        belongs_to = "super::material::Entity",
        from = "Column::MaterialId",
        to = "super::material::Column::Id"
    )]
    Material,
    /// Each transaction belongs to one location
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

impl ActiveModelBehavior for ActiveModel {}
