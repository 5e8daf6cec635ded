//! Core business logic - framework-agnostic stock ledger and requisition workflow.
//!
//! Every function takes a sea-orm connection so it can run on a pooled
//! connection or inside a caller's transaction.

/// Reference data (locations, departments, categories, users) and materials
pub mod catalog;
/// Issuance coordinator: turns approved requests into stock-out movements
pub mod issuance;
/// Ledger store: stock levels and the append-only transaction log
pub mod ledger;
/// Read-only reports over the ledger and requests
pub mod report;
/// Requisition workflow state machine
pub mod requisition;
/// Human-readable document numbering
pub mod sequence;
/// Stock engine: the only writer of stock levels and transactions
pub mod stock;
