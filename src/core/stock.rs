//! Stock engine - the only component permitted to change stock.
//!
//! Each movement inserts exactly one ledger entry and updates the matching stock
//! level inside one unit of work, so the level always equals the signed sum of
//! its transactions and never goes negative. Callers inside a larger transaction
//! (issuance, material deletion) pass that transaction in and the engine's unit
//! of work becomes a savepoint.

use crate::{
    core::ledger::{self, LevelChange},
    entities::{Location, Material, StockLevel, TransactionType, stock_level, stock_transaction},
    errors::{Error, Result},
};
use sea_orm::{TransactionTrait, prelude::*};
use std::collections::HashMap;
use tracing::{debug, info, instrument, warn};

/// Times an adjustment re-reads and retries after losing a race with another writer.
pub const ADJUST_MAX_ATTEMPTS: u32 = 5;

/// Result of a successful stock movement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockMovement {
    /// Stock level after the movement
    pub level: stock_level::Model,
    /// The ledger entry recording it
    pub transaction: stock_transaction::Model,
}

/// A stock level that disagrees with its transactions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelDrift {
    /// Material
    pub material_id: i64,
    /// Location
    pub location_id: i64,
    /// Quantity stored on the level row, `None` when the row is missing
    pub level_quantity: Option<i64>,
    /// Signed sum of the transactions
    pub transaction_sum: i64,
}

/// Rows removed by [`delete_material_stock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaterialStockRemoval {
    /// Ledger entries removed
    pub transactions_deleted: u64,
    /// Stock level rows removed
    pub levels_deleted: u64,
}

async fn ensure_location<C>(db: &C, location_id: i64) -> Result<()>
where
    C: ConnectionTrait,
{
    Location::find_by_id(location_id)
        .one(db)
        .await?
        .map(|_| ())
        .ok_or(Error::LocationNotFound { location_id })
}

async fn ensure_material<C>(db: &C, material_id: i64) -> Result<()>
where
    C: ConnectionTrait,
{
    Material::find_by_id(material_id)
        .one(db)
        .await?
        .map(|_| ())
        .ok_or(Error::NotFound {
            entity: "material",
            id: material_id,
        })
}

async fn current_level<C>(
    db: &C,
    material_id: i64,
    location_id: i64,
) -> Result<stock_level::Model>
where
    C: ConnectionTrait,
{
    ledger::get_level(db, material_id, location_id)
        .await?
        .ok_or(Error::NotFound {
            entity: "stock level",
            id: material_id,
        })
}

/// Receives `quantity` units into a location.
///
/// Inserts an `IN` transaction and increments the level, creating it at
/// `quantity` when the material has never been stocked there.
///
/// # Errors
/// * `InvalidQuantity` - `quantity` is not positive
/// * `LocationNotFound` / `NotFound` - unknown location or material
#[instrument(skip(db, description))]
pub async fn receive<C>(
    db: &C,
    material_id: i64,
    location_id: i64,
    quantity: i64,
    description: &str,
) -> Result<StockMovement>
where
    C: ConnectionTrait + TransactionTrait,
{
    if quantity <= 0 {
        return Err(Error::InvalidQuantity { quantity });
    }

    let txn = db.begin().await?;
    ensure_location(&txn, location_id).await?;
    ensure_material(&txn, material_id).await?;

    let transaction = ledger::append_transaction(
        &txn,
        material_id,
        location_id,
        TransactionType::In,
        quantity,
        description,
    )
    .await?;
    let level = ledger::upsert_level(&txn, material_id, location_id, LevelChange::Delta(quantity))
        .await?
        .ok_or(Error::NotFound {
            entity: "stock level",
            id: material_id,
        })?;

    txn.commit().await?;
    info!(
        material_id,
        location_id, quantity, on_hand = level.quantity, "stock received"
    );

    Ok(StockMovement { level, transaction })
}

/// Issues `quantity` units out of a location.
///
/// The decrement is a guarded update (`quantity >= requested`), so two
/// concurrent issues can never both take the last units.
///
/// # Errors
/// * `InvalidQuantity` - `quantity` is not positive
/// * `InsufficientStock` - less than `quantity` on hand, or never stocked; nothing is written
/// * `LocationNotFound` / `NotFound` - unknown location or material
#[instrument(skip(db, description))]
pub async fn issue<C>(
    db: &C,
    material_id: i64,
    location_id: i64,
    quantity: i64,
    description: &str,
) -> Result<StockMovement>
where
    C: ConnectionTrait + TransactionTrait,
{
    if quantity <= 0 {
        return Err(Error::InvalidQuantity { quantity });
    }

    let txn = db.begin().await?;
    ensure_location(&txn, location_id).await?;
    ensure_material(&txn, material_id).await?;

    if !ledger::decrement_if_available(&txn, material_id, location_id, quantity).await? {
        let available = ledger::get_level(&txn, material_id, location_id)
            .await?
            .map_or(0, |level| level.quantity);
        return Err(Error::InsufficientStock {
            material_id,
            location_id,
            available,
            requested: quantity,
        });
    }

    let transaction = ledger::append_transaction(
        &txn,
        material_id,
        location_id,
        TransactionType::Out,
        quantity,
        description,
    )
    .await?;
    let level = current_level(&txn, material_id, location_id).await?;

    txn.commit().await?;
    info!(
        material_id,
        location_id, quantity, on_hand = level.quantity, "stock issued"
    );

    Ok(StockMovement { level, transaction })
}

/// Sets the on-hand quantity after a physical count.
///
/// The level is set to `new_quantity` directly and the difference is recorded as
/// an `IN` (difference >= 0, including zero) or `OUT` transaction of its
/// magnitude. The set is a compare-and-swap on the quantity read, retried up to
/// [`ADJUST_MAX_ATTEMPTS`] times when another writer got there first.
///
/// # Errors
/// * `InvalidQuantity` - `new_quantity` is negative
/// * `LocationNotFound` / `NotFound` - unknown location or material
/// * `ConcurrentModification` - every attempt lost to a concurrent writer
#[instrument(skip(db, description))]
pub async fn adjust<C>(
    db: &C,
    material_id: i64,
    location_id: i64,
    new_quantity: i64,
    description: &str,
) -> Result<StockMovement>
where
    C: ConnectionTrait + TransactionTrait,
{
    if new_quantity < 0 {
        return Err(Error::InvalidQuantity {
            quantity: new_quantity,
        });
    }

    let txn = db.begin().await?;
    ensure_location(&txn, location_id).await?;
    ensure_material(&txn, material_id).await?;

    for attempt in 1..=ADJUST_MAX_ATTEMPTS {
        let old_quantity = ledger::get_level(&txn, material_id, location_id)
            .await?
            .map_or(0, |level| level.quantity);

        let change = LevelChange::Absolute {
            expected: old_quantity,
            quantity: new_quantity,
        };
        let Some(level) = ledger::upsert_level(&txn, material_id, location_id, change).await?
        else {
            debug!(attempt, "stock level changed underneath adjustment, retrying");
            continue;
        };

        let diff = new_quantity - old_quantity;
        let transaction_type = if diff >= 0 {
            TransactionType::In
        } else {
            TransactionType::Out
        };
        let transaction = ledger::append_transaction(
            &txn,
            material_id,
            location_id,
            transaction_type,
            diff.abs(),
            description,
        )
        .await?;

        txn.commit().await?;
        info!(
            material_id,
            location_id, old_quantity, new_quantity, "stock adjusted"
        );
        return Ok(StockMovement { level, transaction });
    }

    Err(Error::ConcurrentModification {
        resource: format!("stock level ({material_id}, {location_id})"),
        attempts: ADJUST_MAX_ATTEMPTS,
    })
}

/// Deletes every ledger entry and stock level for a material.
///
/// Only meant for the material deletion cascade; irreversible.
#[instrument(skip(db))]
pub async fn delete_material_stock<C>(db: &C, material_id: i64) -> Result<MaterialStockRemoval>
where
    C: ConnectionTrait + TransactionTrait,
{
    let txn = db.begin().await?;
    let (transactions_deleted, levels_deleted) =
        ledger::delete_material_rows(&txn, material_id).await?;
    txn.commit().await?;

    info!(
        material_id,
        transactions_deleted, levels_deleted, "material stock deleted"
    );
    Ok(MaterialStockRemoval {
        transactions_deleted,
        levels_deleted,
    })
}

/// Ledger entries for a material at a location, newest first.
pub async fn transaction_history<C>(
    db: &C,
    material_id: i64,
    location_id: i64,
) -> Result<Vec<stock_transaction::Model>>
where
    C: ConnectionTrait,
{
    ledger::list_transactions(db, material_id, location_id).await
}

/// Compares every stock level with the signed sum of its transactions.
///
/// Pairs that have transactions but no level row are reported too, unless their
/// transactions net to zero. Read-only: drift is reported and logged, never fixed.
pub async fn reconcile<C>(db: &C) -> Result<Vec<LevelDrift>>
where
    C: ConnectionTrait,
{
    let mut totals: HashMap<(i64, i64), i64> = ledger::signed_totals(db)
        .await?
        .into_iter()
        .map(|(material_id, location_id, total)| ((material_id, location_id), total))
        .collect();

    let mut drift = Vec::new();
    for level in StockLevel::find().all(db).await? {
        let transaction_sum = totals
            .remove(&(level.material_id, level.location_id))
            .unwrap_or(0);
        if transaction_sum != level.quantity {
            drift.push(LevelDrift {
                material_id: level.material_id,
                location_id: level.location_id,
                level_quantity: Some(level.quantity),
                transaction_sum,
            });
        }
    }

    drift.extend(
        totals
            .into_iter()
            .filter(|(_, total)| *total != 0)
            .map(|((material_id, location_id), transaction_sum)| LevelDrift {
                material_id,
                location_id,
                level_quantity: None,
                transaction_sum,
            }),
    );
    drift.sort_by_key(|d| (d.material_id, d.location_id));

    for d in &drift {
        warn!(
            material_id = d.material_id,
            location_id = d.location_id,
            level = ?d.level_quantity,
            transactions = d.transaction_sum,
            "stock level drift detected"
        );
    }

    Ok(drift)
}
