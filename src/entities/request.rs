//! Request entity - A requisition for materials, subject to approval.
//!
//! Two independent status columns: `approval_status` drives what may be edited,
//! `processing_status` tracks whether the materials have been handed out.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Approval state of a request
#[derive(Copy, Clone, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum ApprovalStatus {
    /// Waiting for an approver; the only editable state
    #[sea_orm(string_value = "PENDING")]
    Pending,
    /// Approved and ready for issuance
    #[sea_orm(string_value = "APPROVED")]
    Approved,
    /// Rejected by an approver
    #[sea_orm(string_value = "REJECTED")]
    Rejected,
}

/// Fulfilment state of a request
#[derive(Copy, Clone, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum ProcessingStatus {
    /// Not issued yet
    #[sea_orm(string_value = "PENDING_ISSUE")]
    PendingIssue,
    /// An issuance has been recorded
    #[sea_orm(string_value = "ISSUED")]
    Issued,
    /// Will never be issued because the request was rejected
    #[sea_orm(string_value = "REJECTED")]
    Rejected,
}

impl std::fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Approved => write!(f, "APPROVED"),
            Self::Rejected => write!(f, "REJECTED"),
        }
    }
}

/// Request database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "requests")]
pub struct Model {
    /// Unique identifier for the request
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Human-readable number, e.g. `REQ25680001`
    #[sea_orm(unique)]
    pub request_number: String,
    /// User who raised the request
    pub requester_id: i64,
    /// Department the materials are for
    pub department_id: i64,
    /// Date the requester asked for
    pub request_date: Date,
    /// Why the materials are needed
    pub reason: String,
    /// Approval state
    pub approval_status: ApprovalStatus,
    /// Fulfilment state
    pub processing_status: ProcessingStatus,
    /// Approver, once decided
    pub approved_by: Option<i64>,
    /// When the decision was made
    pub approved_date: Option<DateTimeUtc>,
    /// Approver's comment
    pub approval_reason: Option<String>,
    /// When the request was created
    pub created_at: DateTimeUtc,
    /// When the request was last modified
    pub updated_at: DateTimeUtc,
}

/// Defines relationships between Request and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// The requesting user
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::RequesterId",
        to = "super::user::Column::Id"
    )]
    Requester,
    /// The approving user
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::ApprovedBy",
        to = "super::user::Column::Id"
    )]
    Approver,
    /// The department the request is for
    #[sea_orm(
        belongs_to = "super::department::Entity",
        from = "Column::DepartmentId",
        to = "super::department::Column::Id"
    )]
    Department,
    /// One request owns many items
    #[sea_orm(has_many = "super::request_item::Entity")]
    Items,
    /// At most one issuance fulfils a request
    #[sea_orm(has_one = "super::issuance::Entity")]
    Issuance,
}

impl Related<super::request_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Items.def()
    }
}

impl Related<super::issuance::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Issuance.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
