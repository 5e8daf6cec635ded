//! Issuance coordinator - turns an approved request into stock-out movements.
//!
//! A request has at most one issuance. Creating it writes the issuance record,
//! marks the request `ISSUED` and issues stock for every line, all in one unit
//! of work: if any line is short of stock nothing is recorded.

use crate::{
    core::{
        sequence::{self, DocumentKind},
        stock,
    },
    entities::{
        ApprovalStatus, Issuance, IssuanceItem, ProcessingStatus, Request, RequestItem, User,
        issuance, issuance_item, request, request_item, stock_transaction,
    },
    errors::{Error, Result, is_unique_violation},
};
use chrono::Utc;
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*, sea_query::Expr};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{info, instrument, warn};

/// What happens to stock already issued when an issuance is deleted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum IssuanceDeletePolicy {
    /// Only the record is removed; the stock stays out
    #[default]
    KeepStock,
    /// Every posted line is received back into its location
    ReverseStock,
}

/// One line of an issuance, fulfilling one request item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuanceLine {
    /// Request item being fulfilled
    pub request_item_id: i64,
    /// Units handed out, between 1 and the requested quantity
    pub issued_quantity: i64,
    /// Optional note for the line
    pub note: Option<String>,
}

/// What happened to stock for one issuance line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineMovement {
    /// Stock was issued from the request item's location
    Posted {
        /// The fulfilled request item
        request_item_id: i64,
        /// The `OUT` ledger entry
        transaction: stock_transaction::Model,
    },
    /// The request item has no location, so no stock moved
    SkippedNoLocation {
        /// The fulfilled request item
        request_item_id: i64,
    },
}

/// An issuance together with its lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssuanceDetail {
    /// The issuance row
    pub issuance: issuance::Model,
    /// Its lines, in insertion order
    pub items: Vec<issuance_item::Model>,
}

/// Result of [`create_issuance`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuanceOutcome {
    /// The recorded issuance
    pub issuance: issuance::Model,
    /// Its lines
    pub items: Vec<issuance_item::Model>,
    /// The request after being marked `ISSUED`
    pub request: request::Model,
    /// Stock outcome per line, in line order
    pub movements: Vec<LineMovement>,
}

impl IssuanceOutcome {
    /// Lines whose stock movement was skipped.
    pub fn skipped(&self) -> impl Iterator<Item = i64> + '_ {
        self.movements.iter().filter_map(|movement| match movement {
            LineMovement::SkippedNoLocation { request_item_id } => Some(*request_item_id),
            LineMovement::Posted { .. } => None,
        })
    }
}

/// Result of [`delete_issuance`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuanceRemoval {
    /// The request, back at `PENDING_ISSUE`
    pub request: request::Model,
    /// `IN` entries written when stock was reversed; empty with `KeepStock`
    pub reversals: Vec<stock_transaction::Model>,
}

async fn find_issuance<C>(db: &C, issuance_id: i64) -> Result<issuance::Model>
where
    C: ConnectionTrait,
{
    Issuance::find_by_id(issuance_id)
        .one(db)
        .await?
        .ok_or(Error::NotFound {
            entity: "issuance",
            id: issuance_id,
        })
}

async fn items_of<C>(db: &C, issuance_id: i64) -> Result<Vec<issuance_item::Model>>
where
    C: ConnectionTrait,
{
    IssuanceItem::find()
        .filter(issuance_item::Column::IssuanceId.eq(issuance_id))
        .order_by_asc(issuance_item::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Checks every line against the request's items and returns them keyed by id.
fn validate_lines(
    request_id: i64,
    request_items: Vec<request_item::Model>,
    lines: &[IssuanceLine],
) -> Result<HashMap<i64, request_item::Model>> {
    let by_id: HashMap<i64, request_item::Model> = request_items
        .into_iter()
        .map(|item| (item.id, item))
        .collect();

    let mut totals: HashMap<i64, i64> = HashMap::new();
    for line in lines {
        let item = by_id
            .get(&line.request_item_id)
            .ok_or(Error::InvalidLineItem {
                request_id,
                request_item_id: line.request_item_id,
            })?;
        if line.issued_quantity <= 0 {
            return Err(Error::InvalidQuantity {
                quantity: line.issued_quantity,
            });
        }

        // Split lines for the same item share its requested quantity
        let total = totals.entry(item.id).or_insert(0);
        *total = total
            .checked_add(line.issued_quantity)
            .ok_or(Error::InvalidQuantity {
                quantity: line.issued_quantity,
            })?;
        if *total > item.requested_quantity {
            return Err(Error::InvalidQuantity { quantity: *total });
        }
    }

    Ok(by_id)
}

/// Issues materials against an approved request.
///
/// Each line references one of the request's items and takes its material and
/// location from it. Lines whose item has no location are recorded but move no
/// stock; they come back as [`LineMovement::SkippedNoLocation`].
///
/// # Errors
/// * `NotFound` - no such request, or unknown issuer
/// * `AlreadyIssued` - the request already has an issuance
/// * `InvalidState` - the request is not approved
/// * `NoItems` - `lines` is empty
/// * `InvalidLineItem` / `InvalidQuantity` - a line failed validation
/// * `InsufficientStock` - a line could not be issued; nothing is written
#[instrument(skip(db, lines, note), fields(lines = lines.len()))]
pub async fn create_issuance<C>(
    db: &C,
    request_id: i64,
    lines: Vec<IssuanceLine>,
    issued_by: Option<i64>,
    note: String,
) -> Result<IssuanceOutcome>
where
    C: ConnectionTrait + TransactionTrait,
{
    let txn = db.begin().await?;

    let request = Request::find_by_id(request_id)
        .one(&txn)
        .await?
        .ok_or(Error::NotFound {
            entity: "request",
            id: request_id,
        })?;
    let already_issued = Issuance::find()
        .filter(issuance::Column::RequestId.eq(request_id))
        .one(&txn)
        .await?
        .is_some();
    if already_issued {
        return Err(Error::AlreadyIssued { request_id });
    }
    if request.approval_status != ApprovalStatus::Approved {
        return Err(Error::InvalidState {
            message: format!(
                "cannot issue request {} with approval status {}",
                request.request_number, request.approval_status
            ),
        });
    }
    if lines.is_empty() {
        return Err(Error::NoItems);
    }

    let request_items = RequestItem::find()
        .filter(request_item::Column::RequestId.eq(request_id))
        .all(&txn)
        .await?;
    let request_items = validate_lines(request_id, request_items, &lines)?;

    if let Some(user_id) = issued_by {
        User::find_by_id(user_id)
            .one(&txn)
            .await?
            .ok_or(Error::NotFound {
                entity: "user",
                id: user_id,
            })?;
    }

    let issuance_number =
        sequence::allocate_number(&txn, DocumentKind::Issuance, sequence::today()).await?;
    let issuance = issuance::ActiveModel {
        issuance_number: Set(issuance_number),
        request_id: Set(request_id),
        issued_by: Set(issued_by),
        note: Set(note),
        issued_date: Set(Utc::now()),
        ..Default::default()
    }
    .insert(&txn)
    .await
    .map_err(|err| {
        if is_unique_violation(&err) {
            Error::AlreadyIssued { request_id }
        } else {
            Error::Database(err)
        }
    })?;

    let marked = Request::update_many()
        .col_expr(
            request::Column::ProcessingStatus,
            Expr::value(ProcessingStatus::Issued),
        )
        .col_expr(request::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(request::Column::Id.eq(request_id))
        .filter(request::Column::ProcessingStatus.eq(ProcessingStatus::PendingIssue))
        .exec(&txn)
        .await?;
    if marked.rows_affected == 0 {
        return Err(Error::InvalidState {
            message: format!(
                "request {} is not awaiting issue",
                request.request_number
            ),
        });
    }

    let description = format!("issued against request {}", request.request_number);
    let mut items = Vec::with_capacity(lines.len());
    let mut movements = Vec::with_capacity(lines.len());
    for line in lines {
        // Validated above
        let Some(request_item) = request_items.get(&line.request_item_id) else {
            continue;
        };

        let item = issuance_item::ActiveModel {
            issuance_id: Set(issuance.id),
            request_item_id: Set(Some(request_item.id)),
            material_id: Set(request_item.material_id),
            issued_quantity: Set(line.issued_quantity),
            note: Set(line.note),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        let movement = match request_item.location_id {
            Some(location_id) => {
                let posted = stock::issue(
                    &txn,
                    request_item.material_id,
                    location_id,
                    line.issued_quantity,
                    &description,
                )
                .await?;
                LineMovement::Posted {
                    request_item_id: request_item.id,
                    transaction: posted.transaction,
                }
            }
            None => {
                warn!(
                    issuance_number = %issuance.issuance_number,
                    request_item_id = request_item.id,
                    material_id = request_item.material_id,
                    "request item has no location, stock not issued"
                );
                LineMovement::SkippedNoLocation {
                    request_item_id: request_item.id,
                }
            }
        };
        items.push(item);
        movements.push(movement);
    }

    let request = Request::find_by_id(request_id)
        .one(&txn)
        .await?
        .ok_or(Error::NotFound {
            entity: "request",
            id: request_id,
        })?;
    txn.commit().await?;

    info!(
        issuance_number = %issuance.issuance_number,
        request_number = %request.request_number,
        lines = items.len(),
        "issuance created"
    );
    Ok(IssuanceOutcome {
        issuance,
        items,
        request,
        movements,
    })
}

/// Deletes an issuance and returns its request to `PENDING_ISSUE`.
///
/// With [`IssuanceDeletePolicy::KeepStock`] the stock already issued stays out of
/// the store. With [`IssuanceDeletePolicy::ReverseStock`] each line whose request
/// item has a location is received back there.
///
/// # Errors
/// * `NotFound` - no such issuance
#[instrument(skip(db))]
pub async fn delete_issuance<C>(
    db: &C,
    issuance_id: i64,
    policy: IssuanceDeletePolicy,
) -> Result<IssuanceRemoval>
where
    C: ConnectionTrait + TransactionTrait,
{
    let txn = db.begin().await?;
    let issuance = find_issuance(&txn, issuance_id).await?;
    let items = items_of(&txn, issuance_id).await?;

    let mut reversals = Vec::new();
    if policy == IssuanceDeletePolicy::ReverseStock {
        let description = format!("reversal of issuance {}", issuance.issuance_number);
        for item in &items {
            let Some(request_item_id) = item.request_item_id else {
                continue;
            };
            let location_id = RequestItem::find_by_id(request_item_id)
                .one(&txn)
                .await?
                .and_then(|request_item| request_item.location_id);
            let Some(location_id) = location_id else {
                continue;
            };
            let received = stock::receive(
                &txn,
                item.material_id,
                location_id,
                item.issued_quantity,
                &description,
            )
            .await?;
            reversals.push(received.transaction);
        }
    }

    IssuanceItem::delete_many()
        .filter(issuance_item::Column::IssuanceId.eq(issuance_id))
        .exec(&txn)
        .await?;
    Issuance::delete_by_id(issuance_id).exec(&txn).await?;

    Request::update_many()
        .col_expr(
            request::Column::ProcessingStatus,
            Expr::value(ProcessingStatus::PendingIssue),
        )
        .col_expr(request::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(request::Column::Id.eq(issuance.request_id))
        .exec(&txn)
        .await?;
    let request = Request::find_by_id(issuance.request_id)
        .one(&txn)
        .await?
        .ok_or(Error::NotFound {
            entity: "request",
            id: issuance.request_id,
        })?;
    txn.commit().await?;

    info!(
        issuance_number = %issuance.issuance_number,
        ?policy,
        reversed = reversals.len(),
        "issuance deleted"
    );
    Ok(IssuanceRemoval { request, reversals })
}

/// An issuance with its lines, if it exists.
pub async fn get_issuance<C>(db: &C, issuance_id: i64) -> Result<Option<IssuanceDetail>>
where
    C: ConnectionTrait,
{
    let Some(issuance) = Issuance::find_by_id(issuance_id).one(db).await? else {
        return Ok(None);
    };
    let items = items_of(db, issuance.id).await?;
    Ok(Some(IssuanceDetail { issuance, items }))
}

/// The issuance recorded for a request, if any.
pub async fn issuance_for_request<C>(db: &C, request_id: i64) -> Result<Option<IssuanceDetail>>
where
    C: ConnectionTrait,
{
    let Some(issuance) = Issuance::find()
        .filter(issuance::Column::RequestId.eq(request_id))
        .one(db)
        .await?
    else {
        return Ok(None);
    };
    let items = items_of(db, issuance.id).await?;
    Ok(Some(IssuanceDetail { issuance, items }))
}

/// Replaces the issuer's note.
///
/// # Errors
/// * `NotFound` - no such issuance
pub async fn update_issuance_note<C>(
    db: &C,
    issuance_id: i64,
    note: String,
) -> Result<issuance::Model>
where
    C: ConnectionTrait,
{
    let existing = find_issuance(db, issuance_id).await?;
    let mut active: issuance::ActiveModel = existing.into();
    active.note = Set(note);
    active.update(db).await.map_err(Into::into)
}

/// The next issuance number, without consuming it.
pub async fn next_issuance_number<C>(db: &C) -> Result<String>
where
    C: ConnectionTrait,
{
    sequence::next_issuance_number(db).await
}
