//! Issuance entity - The record of handing out materials against a request.
//!
//! `request_id` is unique: a request has at most one issuance.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Issuance database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "issuances")]
pub struct Model {
    /// Unique identifier for the issuance
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Human-readable number, e.g. `IS25680001`
    #[sea_orm(unique)]
    pub issuance_number: String,
    /// Request being fulfilled
    #[sea_orm(unique)]
    pub request_id: i64,
    /// User who handed the materials out
    pub issued_by: Option<i64>,
    /// Issuer's note
    pub note: String,
    /// When the materials were issued
    pub issued_date: DateTimeUtc,
}

/// Defines relationships between Issuance and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// The fulfilled request
    #[sea_orm(
        belongs_to = "super::request::Entity",
        from = "Column::RequestId",
        to = "super::request::Column::Id"
    )]
    Request,
    /// The issuing user
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::IssuedBy",
        to = "super::user::Column::Id"
    )]
    Issuer,
    /// One issuance owns many items
    #[sea_orm(has_many = "super::issuance_item::Entity")]
    Items,
}

impl Related<super::request::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Request.def()
    }
}

impl Related<super::issuance_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Items.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
