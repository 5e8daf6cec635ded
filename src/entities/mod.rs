//! Entity module - Contains all SeaORM entity definitions for the database.
//! These entities represent the database tables and their relationships.
//! Each entity has a Model struct for data and an Entity struct for operations.

pub mod category;
pub mod department;
pub mod issuance;
pub mod issuance_item;
pub mod location;
pub mod material;
pub mod number_sequence;
pub mod request;
pub mod request_item;
pub mod stock_level;
pub mod stock_transaction;
pub mod user;

// Re-export specific types to avoid conflicts
pub use category::{Column as CategoryColumn, Entity as Category, Model as CategoryModel};
pub use department::{Column as DepartmentColumn, Entity as Department, Model as DepartmentModel};
pub use issuance::{Column as IssuanceColumn, Entity as Issuance, Model as IssuanceModel};
pub use issuance_item::{
    Column as IssuanceItemColumn, Entity as IssuanceItem, Model as IssuanceItemModel,
};
pub use location::{Column as LocationColumn, Entity as Location, Model as LocationModel};
pub use material::{Column as MaterialColumn, Entity as Material, Model as MaterialModel};
pub use number_sequence::{
    Column as NumberSequenceColumn, Entity as NumberSequence, Model as NumberSequenceModel,
};
pub use request::{
    ApprovalStatus, Column as RequestColumn, Entity as Request, Model as RequestModel,
    ProcessingStatus,
};
pub use request_item::{
    Column as RequestItemColumn, Entity as RequestItem, Model as RequestItemModel,
};
pub use stock_level::{Column as StockLevelColumn, Entity as StockLevel, Model as StockLevelModel};
pub use stock_transaction::{
    Column as StockTransactionColumn, Entity as StockTransaction, Model as StockTransactionModel,
    TransactionType,
};
pub use user::{Column as UserColumn, Entity as User, Model as UserModel};
