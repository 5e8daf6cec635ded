//! Unified error type for the stock ledger and requisition workflow.
//!
//! Business-rule violations are distinct variants so callers (an HTTP layer, the
//! maintenance binary) can map them to user-facing failures. Storage failures are
//! carried unchanged in [`Error::Database`] and are never retried here.

use sea_orm::{DbErr, SqlErr};
use thiserror::Error;

/// Every failure the core can report.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration could not be read or parsed
    #[error("Configuration error: {message}")]
    Config {
        /// What went wrong
        message: String,
    },

    /// Underlying persistence failure
    #[error("Database error: {0}")]
    Database(#[from] DbErr),

    /// A referenced entity does not exist
    #[error("{entity} {id} not found")]
    NotFound {
        /// Kind of entity (e.g. "request", "material")
        entity: &'static str,
        /// Identifier that was looked up
        id: i64,
    },

    /// The storage location does not exist
    #[error("Location {location_id} not found")]
    LocationNotFound {
        /// Location that was looked up
        location_id: i64,
    },

    /// The requesting user does not exist
    #[error("Requester {user_id} not found")]
    RequesterNotFound {
        /// User that was looked up
        user_id: i64,
    },

    /// The department does not exist
    #[error("Department {department_id} not found")]
    DepartmentNotFound {
        /// Department that was looked up
        department_id: i64,
    },

    /// The operation is not legal for the entity's current state
    #[error("Invalid state: {message}")]
    InvalidState {
        /// Description of the rejected transition
        message: String,
    },

    /// Issuing would drive the stock level negative
    #[error(
        "Insufficient stock for material {material_id} at location {location_id}: available {available}, requested {requested}"
    )]
    InsufficientStock {
        /// Material being issued
        material_id: i64,
        /// Location being issued from
        location_id: i64,
        /// Quantity on hand when the issue was attempted
        available: i64,
        /// Quantity that was asked for
        requested: i64,
    },

    /// A quantity outside the accepted range
    #[error("Invalid quantity: {quantity}")]
    InvalidQuantity {
        /// The rejected quantity
        quantity: i64,
    },

    /// An issuance line does not belong to the request being issued
    #[error("Request item {request_item_id} does not belong to request {request_id}")]
    InvalidLineItem {
        /// The request being issued
        request_id: i64,
        /// The offending request item
        request_item_id: i64,
    },

    /// The request cannot be deleted because it has been issued
    #[error("Request {request_id} has an issuance and cannot be deleted")]
    HasIssuance {
        /// The request
        request_id: i64,
    },

    /// The request already has its single issuance
    #[error("Request {request_id} has already been issued")]
    AlreadyIssued {
        /// The request
        request_id: i64,
    },

    /// An issuance was submitted without lines
    #[error("Issuance must contain at least one item")]
    NoItems,

    /// A name or code was blank
    #[error("{entity} name cannot be empty")]
    InvalidName {
        /// Kind of record (e.g. "location")
        entity: &'static str,
    },

    /// A uniquely-named record already exists
    #[error("{entity} named {name:?} already exists")]
    DuplicateName {
        /// Kind of record (e.g. "department")
        entity: &'static str,
        /// The conflicting name
        name: String,
    },

    /// Optimistic update kept losing to concurrent writers
    #[error("Concurrent modification of {resource}, giving up after {attempts} attempts")]
    ConcurrentModification {
        /// What was being updated
        resource: String,
        /// How many times the update was tried
        attempts: u32,
    },
}

impl Error {
    /// Whether the failure is caused by the caller's input or the entity's state
    /// (a 4xx at an HTTP boundary) rather than by storage or configuration (5xx).
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        !matches!(
            self,
            Self::Config { .. } | Self::Database(_) | Self::ConcurrentModification { .. }
        )
    }

    /// Turns a unique-constraint violation into [`Error::DuplicateName`], leaving
    /// any other storage error untouched.
    pub(crate) fn duplicate_or(err: DbErr, entity: &'static str, name: &str) -> Self {
        if is_unique_violation(&err) {
            Self::DuplicateName {
                entity,
                name: name.to_string(),
            }
        } else {
            Self::Database(err)
        }
    }
}

/// True when the storage layer rejected a write because of a unique constraint.
pub(crate) fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

/// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
