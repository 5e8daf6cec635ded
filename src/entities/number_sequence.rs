//! Number sequence entity - Counter rows for human-readable document numbers.
//!
//! One row per prefix-and-year key (e.g. `REQ2568`), incremented atomically when
//! a new request or issuance number is allocated.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Number sequence database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "number_sequences")]
pub struct Model {
    /// Unique identifier
    #[sea_orm(primary_key)]
    pub id: i32,
    /// Counter key: document prefix followed by the Buddhist year
    #[sea_orm(unique)]
    pub prefix: String,
    /// Last sequence value handed out
    pub last_value: i64,
    /// When the counter last moved
    pub updated_at: DateTimeUtc,
}

/// `NumberSequence` has no relationships with other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
