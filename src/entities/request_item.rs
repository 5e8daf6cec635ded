//! Request item entity - One requested material line within a request.
//!
//! Owned exclusively by its request and replaced wholesale when the request is
//! edited. `location_id` routes the eventual stock-out to the right stock pool.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Request item database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "request_items")]
pub struct Model {
    /// Unique identifier for the line
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Owning request
    pub request_id: i64,
    /// Material requested
    pub material_id: i64,
    /// Units requested
    pub requested_quantity: i64,
    /// Requester's note for this line
    pub note: Option<String>,
    /// Location to issue from
    pub location_id: Option<i64>,
}

/// Defines relationships between `RequestItem` and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each item belongs to one request
    #[sea_orm(
        belongs_to = "super::request::Entity",
        from = "Column::RequestId",
        to = "super::request::Column::Id"
    )]
    Request,
    /// Each item refers to one material
    #[sea_orm(
        belongs_to = "super::material::Entity",
        from = "Column::MaterialId",
        to = "super::material::Column::Id"
    )]
    Material,
    /// Each item optionally names a location
    #[sea_orm(
        belongs_to = "super::location::Entity",
        from = "Column::LocationId",
        to = "super::location::Column::Id"
    )]
    Location,
}

impl Related<super::request::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Request.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
