//! Issuance item entity - One issued line, linked back to its request item.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Issuance item database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "issuance_items")]
pub struct Model {
    /// Unique identifier for the line
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Owning issuance
    pub issuance_id: i64,
    /// Request line this fulfils
    pub request_item_id: Option<i64>,
    /// Material handed out
    pub material_id: i64,
    /// Units handed out
    pub issued_quantity: i64,
    /// Issuer's note for this line
    pub note: Option<String>,
}

/// Defines relationships between `IssuanceItem` and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each item belongs to one issuance
    #[sea_orm(
        belongs_to = "super::issuance::Entity",
        from = "Column::IssuanceId",
        to = "super::issuance::Column::Id"
    )]
    Issuance,
    /// Each item fulfils one request item
    #[sea_orm(
        belongs_to = "super::request_item::Entity",
        from = "Column::RequestItemId",
        to = "super::request_item::Column::Id"
    )]
    RequestItem,
    /// Each item refers to one material
    #[sea_orm(
        belongs_to = "super::material::Entity",
        from = "Column::MaterialId",
        to = "super::material::Column::Id"
    )]
    Material,
}

impl Related<super::issuance::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Issuance.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
