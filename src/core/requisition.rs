//! Requisition workflow - the lifecycle of a request for materials.
//!
//! Approval runs `PENDING -> APPROVED | REJECTED`. Processing runs
//! `PENDING_ISSUE -> ISSUED` once an issuance is recorded (see
//! [`crate::core::issuance`]), or jumps to `REJECTED` with the approval. Items and
//! reason are editable, and the request deletable, only while approval is pending.

use crate::{
    core::sequence::{self, DocumentKind},
    entities::{
        ApprovalStatus, Department, Issuance, Location, Material, ProcessingStatus, Request,
        RequestItem, User, issuance, request, request_item,
    },
    errors::{Error, Result},
};
use chrono::{NaiveDate, Utc};
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*, sea_query::Expr};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

/// One requested line as submitted by the requester.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestItemInput {
    /// Material wanted
    pub material_id: i64,
    /// Units wanted, must be positive
    pub requested_quantity: i64,
    /// Optional note for the line
    pub note: Option<String>,
    /// Location to issue from; defaults to the material's default location
    pub location_id: Option<i64>,
}

/// Everything needed to raise a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRequest {
    /// Requesting user
    pub requester_id: i64,
    /// Department the materials are for
    pub department_id: i64,
    /// Date the materials are wanted
    pub request_date: NaiveDate,
    /// Why they are needed
    pub reason: String,
    /// Requested lines
    pub items: Vec<RequestItemInput>,
}

/// A request together with its items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestDetail {
    /// The request row
    pub request: request::Model,
    /// Its lines, in insertion order
    pub items: Vec<request_item::Model>,
}

/// An approver's decision on a pending request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApprovalDecision {
    /// Approve; the request becomes ready for issuance
    Approve,
    /// Reject; the request will never be issued
    Reject,
}

impl ApprovalDecision {
    const fn statuses(self) -> (ApprovalStatus, ProcessingStatus) {
        match self {
            Self::Approve => (ApprovalStatus::Approved, ProcessingStatus::PendingIssue),
            Self::Reject => (ApprovalStatus::Rejected, ProcessingStatus::Rejected),
        }
    }
}

async fn find_request<C>(db: &C, request_id: i64) -> Result<request::Model>
where
    C: ConnectionTrait,
{
    Request::find_by_id(request_id)
        .one(db)
        .await?
        .ok_or(Error::NotFound {
            entity: "request",
            id: request_id,
        })
}

fn ensure_pending(request: &request::Model, action: &str) -> Result<()> {
    if request.approval_status == ApprovalStatus::Pending {
        Ok(())
    } else {
        Err(Error::InvalidState {
            message: format!(
                "cannot {action} request {} with approval status {}",
                request.request_number, request.approval_status
            ),
        })
    }
}

async fn items_of<C>(db: &C, request_id: i64) -> Result<Vec<request_item::Model>>
where
    C: ConnectionTrait,
{
    RequestItem::find()
        .filter(request_item::Column::RequestId.eq(request_id))
        .order_by_asc(request_item::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Validates and inserts request lines. A line without a location takes the
/// material's default location.
async fn insert_items<C>(
    db: &C,
    request_id: i64,
    items: Vec<RequestItemInput>,
) -> Result<Vec<request_item::Model>>
where
    C: ConnectionTrait,
{
    let mut inserted = Vec::with_capacity(items.len());
    for item in items {
        if item.requested_quantity <= 0 {
            return Err(Error::InvalidQuantity {
                quantity: item.requested_quantity,
            });
        }
        let material = Material::find_by_id(item.material_id)
            .one(db)
            .await?
            .ok_or(Error::NotFound {
                entity: "material",
                id: item.material_id,
            })?;
        let location_id = item.location_id.or(material.location_id);
        if let Some(location_id) = location_id {
            Location::find_by_id(location_id)
                .one(db)
                .await?
                .ok_or(Error::LocationNotFound { location_id })?;
        }

        let model = request_item::ActiveModel {
            request_id: Set(request_id),
            material_id: Set(item.material_id),
            requested_quantity: Set(item.requested_quantity),
            note: Set(item.note),
            location_id: Set(location_id),
            ..Default::default()
        }
        .insert(db)
        .await?;
        inserted.push(model);
    }
    Ok(inserted)
}

/// Raises a new request in `PENDING` / `PENDING_ISSUE` with the next request number.
///
/// # Errors
/// * `RequesterNotFound` / `DepartmentNotFound` - unknown requester or department
/// * `InvalidQuantity`, `NotFound`, `LocationNotFound` - an item failed validation
#[instrument(skip(db, new_request), fields(requester_id = new_request.requester_id))]
pub async fn create_request<C>(db: &C, new_request: NewRequest) -> Result<RequestDetail>
where
    C: ConnectionTrait + TransactionTrait,
{
    let txn = db.begin().await?;

    User::find_by_id(new_request.requester_id)
        .one(&txn)
        .await?
        .ok_or(Error::RequesterNotFound {
            user_id: new_request.requester_id,
        })?;
    Department::find_by_id(new_request.department_id)
        .one(&txn)
        .await?
        .ok_or(Error::DepartmentNotFound {
            department_id: new_request.department_id,
        })?;

    let request_number =
        sequence::allocate_number(&txn, DocumentKind::Request, sequence::today()).await?;
    let now = Utc::now();
    let request = request::ActiveModel {
        request_number: Set(request_number),
        requester_id: Set(new_request.requester_id),
        department_id: Set(new_request.department_id),
        request_date: Set(new_request.request_date),
        reason: Set(new_request.reason),
        approval_status: Set(ApprovalStatus::Pending),
        processing_status: Set(ProcessingStatus::PendingIssue),
        approved_by: Set(None),
        approved_date: Set(None),
        approval_reason: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    let items = insert_items(&txn, request.id, new_request.items).await?;
    txn.commit().await?;

    info!(
        request_number = %request.request_number,
        items = items.len(),
        "request created"
    );
    Ok(RequestDetail { request, items })
}

/// A request with its items, if it exists.
pub async fn get_request<C>(db: &C, request_id: i64) -> Result<Option<RequestDetail>>
where
    C: ConnectionTrait,
{
    let Some(request) = Request::find_by_id(request_id).one(db).await? else {
        return Ok(None);
    };
    let items = items_of(db, request.id).await?;
    Ok(Some(RequestDetail { request, items }))
}

/// Requests with the given approval status, newest request date first.
pub async fn list_requests_by_status<C>(
    db: &C,
    status: ApprovalStatus,
) -> Result<Vec<request::Model>>
where
    C: ConnectionTrait,
{
    Request::find()
        .filter(request::Column::ApprovalStatus.eq(status))
        .order_by_desc(request::Column::RequestDate)
        .order_by_desc(request::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// The next request number, without consuming it.
pub async fn next_request_number<C>(db: &C) -> Result<String>
where
    C: ConnectionTrait,
{
    sequence::next_request_number(db).await
}

/// Replaces the reason and all items of a pending request.
///
/// # Errors
/// * `NotFound` - no such request
/// * `InvalidState` - the request has already been approved or rejected
#[instrument(skip(db, reason, items))]
pub async fn update_request<C>(
    db: &C,
    request_id: i64,
    reason: String,
    items: Vec<RequestItemInput>,
) -> Result<RequestDetail>
where
    C: ConnectionTrait + TransactionTrait,
{
    let txn = db.begin().await?;
    let existing = find_request(&txn, request_id).await?;
    ensure_pending(&existing, "edit")?;

    let updated = Request::update_many()
        .col_expr(request::Column::Reason, Expr::value(reason))
        .col_expr(request::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(request::Column::Id.eq(request_id))
        .filter(request::Column::ApprovalStatus.eq(ApprovalStatus::Pending))
        .exec(&txn)
        .await?;
    if updated.rows_affected == 0 {
        // Decided between our read and our write
        let current = find_request(&txn, request_id).await?;
        ensure_pending(&current, "edit")?;
    }

    RequestItem::delete_many()
        .filter(request_item::Column::RequestId.eq(request_id))
        .exec(&txn)
        .await?;
    let items = insert_items(&txn, request_id, items).await?;
    let request = find_request(&txn, request_id).await?;
    txn.commit().await?;

    info!(request_number = %request.request_number, "request updated");
    Ok(RequestDetail { request, items })
}

/// Deletes a pending request that has no issuance, together with its items.
///
/// # Errors
/// * `NotFound` - no such request
/// * `HasIssuance` - an issuance exists for the request
/// * `InvalidState` - the request has already been approved or rejected
#[instrument(skip(db))]
pub async fn delete_request<C>(db: &C, request_id: i64) -> Result<()>
where
    C: ConnectionTrait + TransactionTrait,
{
    let txn = db.begin().await?;
    let existing = find_request(&txn, request_id).await?;

    let has_issuance = Issuance::find()
        .filter(issuance::Column::RequestId.eq(request_id))
        .one(&txn)
        .await?
        .is_some();
    if has_issuance {
        return Err(Error::HasIssuance { request_id });
    }
    ensure_pending(&existing, "delete")?;

    RequestItem::delete_many()
        .filter(request_item::Column::RequestId.eq(request_id))
        .exec(&txn)
        .await?;
    Request::delete_by_id(request_id).exec(&txn).await?;
    txn.commit().await?;

    info!(request_number = %existing.request_number, "request deleted");
    Ok(())
}

/// Records an approver's decision on a pending request.
///
/// Approval keeps processing at `PENDING_ISSUE`; rejection moves it to
/// `REJECTED`. The status change only applies while the request is still
/// pending, so of two racing approvers exactly one succeeds.
///
/// # Errors
/// * `NotFound` - no such request or approver
/// * `InvalidState` - the request has already been decided
#[instrument(skip(db, reason))]
pub async fn set_approval<C>(
    db: &C,
    request_id: i64,
    decision: ApprovalDecision,
    approver_id: i64,
    reason: Option<String>,
) -> Result<request::Model>
where
    C: ConnectionTrait + TransactionTrait,
{
    let txn = db.begin().await?;
    let existing = find_request(&txn, request_id).await?;
    ensure_pending(&existing, "approve or reject")?;
    User::find_by_id(approver_id)
        .one(&txn)
        .await?
        .ok_or(Error::NotFound {
            entity: "user",
            id: approver_id,
        })?;

    let (approval_status, processing_status) = decision.statuses();
    let now = Utc::now();
    let updated = Request::update_many()
        .col_expr(request::Column::ApprovalStatus, Expr::value(approval_status))
        .col_expr(
            request::Column::ProcessingStatus,
            Expr::value(processing_status),
        )
        .col_expr(request::Column::ApprovedBy, Expr::value(approver_id))
        .col_expr(request::Column::ApprovedDate, Expr::value(now))
        .col_expr(request::Column::ApprovalReason, Expr::value(reason))
        .col_expr(request::Column::UpdatedAt, Expr::value(now))
        .filter(request::Column::Id.eq(request_id))
        .filter(request::Column::ApprovalStatus.eq(ApprovalStatus::Pending))
        .exec(&txn)
        .await?;
    if updated.rows_affected == 0 {
        let current = find_request(&txn, request_id).await?;
        ensure_pending(&current, "approve or reject")?;
    }

    let request = find_request(&txn, request_id).await?;
    txn.commit().await?;

    info!(
        request_number = %request.request_number,
        status = %request.approval_status,
        approver_id,
        "request decided"
    );
    Ok(request)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::test_utils::*;

    #[tokio::test]
    async fn test_create_request_initial_state() -> Result<()> {
        let fixture = setup_workflow().await?;

        let detail = create_test_request(&fixture, &[(fixture.material.id, 3)]).await?;
        assert_eq!(detail.request.approval_status, ApprovalStatus::Pending);
        assert_eq!(
            detail.request.processing_status,
            ProcessingStatus::PendingIssue
        );
        assert!(detail.request.approved_by.is_none());
        assert_eq!(detail.items.len(), 1);
        assert_eq!(detail.items[0].requested_quantity, 3);
        assert!(detail.request.request_number.starts_with("REQ"));
        assert_eq!(detail.request.request_number.len(), "REQ25680001".len());

        Ok(())
    }

    #[tokio::test]
    async fn test_item_location_defaults_to_material_location() -> Result<()> {
        let fixture = setup_workflow().await?;
        let shelf = create_test_location(&fixture.db, "Shelf B").await?;

        let detail = create_request(
            &fixture.db,
            NewRequest {
                requester_id: fixture.requester.id,
                department_id: fixture.department.id,
                request_date: chrono::Local::now().date_naive(),
                reason: "restock".to_string(),
                items: vec![
                    item_input(fixture.material.id, 2),
                    RequestItemInput {
                        location_id: Some(shelf.id),
                        ..item_input(fixture.material.id, 1)
                    },
                ],
            },
        )
        .await?;

        assert_eq!(detail.items[0].location_id, Some(fixture.location.id));
        assert_eq!(detail.items[1].location_id, Some(shelf.id));

        Ok(())
    }

    #[tokio::test]
    async fn test_create_request_unknown_requester_or_department() -> Result<()> {
        let fixture = setup_workflow().await?;

        let result = create_request(
            &fixture.db,
            NewRequest {
                requester_id: 999,
                department_id: fixture.department.id,
                request_date: chrono::Local::now().date_naive(),
                reason: "x".to_string(),
                items: vec![],
            },
        )
        .await;
        assert!(matches!(
            result,
            Err(Error::RequesterNotFound { user_id: 999 })
        ));

        let result = create_request(
            &fixture.db,
            NewRequest {
                requester_id: fixture.requester.id,
                department_id: 999,
                request_date: chrono::Local::now().date_naive(),
                reason: "x".to_string(),
                items: vec![],
            },
        )
        .await;
        assert!(matches!(
            result,
            Err(Error::DepartmentNotFound { department_id: 999 })
        ));

        // Failed creations consume no numbers
        assert!(next_request_number(&fixture.db).await?.ends_with("0001"));

        Ok(())
    }

    #[tokio::test]
    async fn test_create_request_rejects_bad_items() -> Result<()> {
        let fixture = setup_workflow().await?;

        let result = create_test_request(&fixture, &[(fixture.material.id, 0)]).await;
        assert!(matches!(result, Err(Error::InvalidQuantity { quantity: 0 })));

        let result = create_test_request(&fixture, &[(999, 1)]).await;
        assert!(matches!(
            result,
            Err(Error::NotFound {
                entity: "material",
                ..
            })
        ));

        // Nothing half-written
        assert!(
            list_requests_by_status(&fixture.db, ApprovalStatus::Pending)
                .await?
                .is_empty()
        );

        Ok(())
    }

    #[tokio::test]
    async fn test_request_numbers_are_sequential() -> Result<()> {
        let fixture = setup_workflow().await?;

        let mut numbers = Vec::new();
        for _ in 0..9 {
            let detail = create_test_request(&fixture, &[(fixture.material.id, 1)]).await?;
            numbers.push(detail.request.request_number);
        }

        let year = crate::core::sequence::buddhist_year(chrono::Local::now().date_naive());
        assert_eq!(numbers[0], format!("REQ{year}0001"));
        assert_eq!(numbers[8], format!("REQ{year}0009"));
        assert_eq!(
            next_request_number(&fixture.db).await?,
            format!("REQ{year}0010")
        );

        Ok(())
    }

    #[tokio::test]
    async fn test_update_request_replaces_items() -> Result<()> {
        let fixture = setup_workflow().await?;
        let detail = create_test_request(
            &fixture,
            &[(fixture.material.id, 3), (fixture.material.id, 4)],
        )
        .await?;

        let updated = update_request(
            &fixture.db,
            detail.request.id,
            "changed my mind".to_string(),
            vec![item_input(fixture.material.id, 10)],
        )
        .await?;

        assert_eq!(updated.request.reason, "changed my mind");
        assert_eq!(updated.items.len(), 1);
        assert_eq!(updated.items[0].requested_quantity, 10);

        let stored = get_request(&fixture.db, detail.request.id).await?.unwrap();
        assert_eq!(stored.items, updated.items);

        Ok(())
    }

    #[tokio::test]
    async fn test_update_and_delete_refused_after_decision() -> Result<()> {
        let fixture = setup_workflow().await?;
        let detail = create_test_request(&fixture, &[(fixture.material.id, 3)]).await?;

        set_approval(
            &fixture.db,
            detail.request.id,
            ApprovalDecision::Approve,
            fixture.approver.id,
            None,
        )
        .await?;

        let result = update_request(
            &fixture.db,
            detail.request.id,
            "too late".to_string(),
            vec![item_input(fixture.material.id, 1)],
        )
        .await;
        assert!(matches!(result, Err(Error::InvalidState { .. })));

        let result = delete_request(&fixture.db, detail.request.id).await;
        assert!(matches!(result, Err(Error::InvalidState { .. })));

        // Items untouched
        let stored = get_request(&fixture.db, detail.request.id).await?.unwrap();
        assert_eq!(stored.items, detail.items);

        Ok(())
    }

    #[tokio::test]
    async fn test_delete_pending_request() -> Result<()> {
        let fixture = setup_workflow().await?;
        let detail = create_test_request(&fixture, &[(fixture.material.id, 3)]).await?;

        delete_request(&fixture.db, detail.request.id).await?;

        assert!(get_request(&fixture.db, detail.request.id).await?.is_none());
        assert!(items_of(&fixture.db, detail.request.id).await?.is_empty());

        let result = delete_request(&fixture.db, detail.request.id).await;
        assert!(matches!(
            result,
            Err(Error::NotFound {
                entity: "request",
                ..
            })
        ));

        Ok(())
    }

    #[tokio::test]
    async fn test_approve_and_reject() -> Result<()> {
        let fixture = setup_workflow().await?;
        let first = create_test_request(&fixture, &[(fixture.material.id, 1)]).await?;
        let second = create_test_request(&fixture, &[(fixture.material.id, 1)]).await?;

        let approved = set_approval(
            &fixture.db,
            first.request.id,
            ApprovalDecision::Approve,
            fixture.approver.id,
            Some("ok".to_string()),
        )
        .await?;
        assert_eq!(approved.approval_status, ApprovalStatus::Approved);
        assert_eq!(approved.processing_status, ProcessingStatus::PendingIssue);
        assert_eq!(approved.approved_by, Some(fixture.approver.id));
        assert!(approved.approved_date.is_some());
        assert_eq!(approved.approval_reason.as_deref(), Some("ok"));

        let rejected = set_approval(
            &fixture.db,
            second.request.id,
            ApprovalDecision::Reject,
            fixture.approver.id,
            Some("not in budget".to_string()),
        )
        .await?;
        assert_eq!(rejected.approval_status, ApprovalStatus::Rejected);
        assert_eq!(rejected.processing_status, ProcessingStatus::Rejected);

        // A decided request cannot be decided again
        let result = set_approval(
            &fixture.db,
            first.request.id,
            ApprovalDecision::Reject,
            fixture.approver.id,
            None,
        )
        .await;
        assert!(matches!(result, Err(Error::InvalidState { .. })));

        assert_eq!(
            list_requests_by_status(&fixture.db, ApprovalStatus::Approved)
                .await?
                .len(),
            1
        );

        Ok(())
    }

    #[tokio::test]
    async fn test_approval_requires_known_approver() -> Result<()> {
        let fixture = setup_workflow().await?;
        let detail = create_test_request(&fixture, &[(fixture.material.id, 1)]).await?;

        let result = set_approval(
            &fixture.db,
            detail.request.id,
            ApprovalDecision::Approve,
            999,
            None,
        )
        .await;
        assert!(matches!(
            result,
            Err(Error::NotFound {
                entity: "user",
                id: 999
            })
        ));

        let stored = get_request(&fixture.db, detail.request.id).await?.unwrap();
        assert_eq!(stored.request.approval_status, ApprovalStatus::Pending);

        Ok(())
    }

    #[tokio::test]
    async fn test_concurrent_requests_get_distinct_numbers() -> Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let fixture = setup_workflow_on(setup_file_db(dir.path()).await?).await?;
        let lines = [(fixture.material.id, 1)];

        // First allocation of the year races to seed the counter
        let results = tokio::join!(
            create_test_request(&fixture, &lines),
            create_test_request(&fixture, &lines),
            create_test_request(&fixture, &lines),
            create_test_request(&fixture, &lines),
            create_test_request(&fixture, &lines),
            create_test_request(&fixture, &lines),
        );
        let results = [
            results.0, results.1, results.2, results.3, results.4, results.5,
        ];

        let mut numbers = Vec::new();
        for result in results {
            match result {
                Ok(detail) => numbers.push(detail.request.request_number),
                // Busy locks are acceptable; they must not consume or duplicate a number
                Err(Error::Database(_) | Error::ConcurrentModification { .. }) => {}
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert!(!numbers.is_empty());

        let distinct: std::collections::HashSet<&String> = numbers.iter().collect();
        assert_eq!(distinct.len(), numbers.len());

        let stored = list_requests_by_status(&fixture.db, ApprovalStatus::Pending).await?;
        assert_eq!(stored.len(), numbers.len());

        let year = crate::core::sequence::buddhist_year(chrono::Local::now().date_naive());
        let key = format!("REQ{year}");
        let highest = numbers
            .iter()
            .filter_map(|number| crate::core::sequence::parse_sequence(number, &key))
            .max()
            .unwrap();
        assert_eq!(
            next_request_number(&fixture.db).await?,
            crate::core::sequence::format_number(DocumentKind::Request, year, highest + 1)
        );

        Ok(())
    }
}
