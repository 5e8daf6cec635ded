//! Ledger store - durable storage of stock levels and stock transactions.
//!
//! Reads are public. Writes are crate-private and reached only through
//! [`crate::core::stock`], which wraps them in a single unit of work and owns all
//! business validation. Nothing here checks business rules; storage failures
//! propagate as [`Error::Database`].

use crate::{
    entities::{StockLevel, StockTransaction, TransactionType, stock_level, stock_transaction},
    errors::{Error, Result, is_unique_violation},
};
use chrono::Utc;
use sea_orm::{QueryOrder, QuerySelect, Set, TransactionTrait, prelude::*, sea_query::Expr};
use tracing::debug;

/// Signed sum of a transaction group: `IN` adds, `OUT` subtracts.
const SIGNED_QUANTITY_SUM: &str =
    "SUM(CASE WHEN transaction_type = 'IN' THEN quantity ELSE -quantity END)";

/// Attempts before an insert that keeps colliding with concurrent inserts gives up.
const INSERT_ATTEMPTS: u32 = 3;

/// How a stock level should change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelChange {
    /// Add `delta` (negative to subtract); an absent row is created at `delta`.
    Delta(i64),
    /// Set the quantity to `quantity`, provided it still equals `expected`.
    /// An absent row counts as zero.
    Absolute {
        /// Quantity the caller observed
        expected: i64,
        /// Quantity to store
        quantity: i64,
    },
}

/// Current stock level row for a material at a location, if one exists.
pub async fn get_level<C>(
    db: &C,
    material_id: i64,
    location_id: i64,
) -> Result<Option<stock_level::Model>>
where
    C: ConnectionTrait,
{
    StockLevel::find()
        .filter(stock_level::Column::MaterialId.eq(material_id))
        .filter(stock_level::Column::LocationId.eq(location_id))
        .one(db)
        .await
        .map_err(Into::into)
}

async fn fetch_level<C>(db: &C, material_id: i64, location_id: i64) -> Result<stock_level::Model>
where
    C: ConnectionTrait,
{
    get_level(db, material_id, location_id)
        .await?
        .ok_or(Error::NotFound {
            entity: "stock level",
            id: material_id,
        })
}

/// Inserts a new level row, returning `None` when a row for the pair already exists.
///
/// The insert runs in its own savepoint so a unique-key collision leaves the
/// surrounding transaction usable.
async fn try_insert_level<C>(
    db: &C,
    material_id: i64,
    location_id: i64,
    quantity: i64,
) -> Result<Option<stock_level::Model>>
where
    C: ConnectionTrait + TransactionTrait,
{
    let savepoint = db.begin().await?;
    let level = stock_level::ActiveModel {
        material_id: Set(material_id),
        location_id: Set(location_id),
        quantity: Set(quantity),
        updated_at: Set(Utc::now()),
        ..Default::default()
    };

    match level.insert(&savepoint).await {
        Ok(model) => {
            savepoint.commit().await?;
            Ok(Some(model))
        }
        Err(err) if is_unique_violation(&err) => {
            savepoint.rollback().await?;
            debug!(material_id, location_id, "stock level inserted concurrently");
            Ok(None)
        }
        Err(err) => Err(err.into()),
    }
}

/// Applies `change` to the (material, location) level, creating the row if needed.
///
/// Deltas are applied with a single `UPDATE ... SET quantity = quantity + delta`
/// so no read-modify-write window exists. Absolute sets are guarded by the
/// expected quantity; `Ok(None)` means the guard no longer held and the caller
/// should re-read and retry.
pub(crate) async fn upsert_level<C>(
    db: &C,
    material_id: i64,
    location_id: i64,
    change: LevelChange,
) -> Result<Option<stock_level::Model>>
where
    C: ConnectionTrait + TransactionTrait,
{
    for _ in 0..INSERT_ATTEMPTS {
        let mut update = StockLevel::update_many()
            .col_expr(stock_level::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(stock_level::Column::MaterialId.eq(material_id))
            .filter(stock_level::Column::LocationId.eq(location_id));

        let seed = match change {
            LevelChange::Delta(delta) => {
                update = update.col_expr(
                    stock_level::Column::Quantity,
                    Expr::col(stock_level::Column::Quantity).add(delta),
                );
                delta
            }
            LevelChange::Absolute { expected, quantity } => {
                update = update
                    .col_expr(stock_level::Column::Quantity, Expr::value(quantity))
                    .filter(stock_level::Column::Quantity.eq(expected));
                quantity
            }
        };

        if update.exec(db).await?.rows_affected > 0 {
            return fetch_level(db, material_id, location_id).await.map(Some);
        }

        if let LevelChange::Absolute { expected, .. } = change {
            // Row exists with a different quantity, or is absent but the caller saw stock
            if expected != 0 || get_level(db, material_id, location_id).await?.is_some() {
                return Ok(None);
            }
        }

        if let Some(model) = try_insert_level(db, material_id, location_id, seed).await? {
            return Ok(Some(model));
        }
    }

    Err(Error::ConcurrentModification {
        resource: format!("stock level ({material_id}, {location_id})"),
        attempts: INSERT_ATTEMPTS,
    })
}

/// Subtracts `quantity` only if at least that much is on hand.
///
/// Returns `false` when the row is missing or holds less than `quantity`; the
/// level is untouched in that case.
pub(crate) async fn decrement_if_available<C>(
    db: &C,
    material_id: i64,
    location_id: i64,
    quantity: i64,
) -> Result<bool>
where
    C: ConnectionTrait,
{
    let result = StockLevel::update_many()
        .col_expr(
            stock_level::Column::Quantity,
            Expr::col(stock_level::Column::Quantity).sub(quantity),
        )
        .col_expr(stock_level::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(stock_level::Column::MaterialId.eq(material_id))
        .filter(stock_level::Column::LocationId.eq(location_id))
        .filter(stock_level::Column::Quantity.gte(quantity))
        .exec(db)
        .await?;

    Ok(result.rows_affected > 0)
}

/// Appends one immutable ledger entry.
pub(crate) async fn append_transaction<C>(
    db: &C,
    material_id: i64,
    location_id: i64,
    transaction_type: TransactionType,
    magnitude: i64,
    description: &str,
) -> Result<stock_transaction::Model>
where
    C: ConnectionTrait,
{
    let transaction = stock_transaction::ActiveModel {
        material_id: Set(material_id),
        location_id: Set(location_id),
        transaction_type: Set(transaction_type),
        quantity: Set(magnitude),
        description: Set(description.to_string()),
        created_at: Set(Utc::now()),
        ..Default::default()
    };

    transaction.insert(db).await.map_err(Into::into)
}

/// Signed sum of all transactions for the pair. Read-only; absent rows sum to 0.
pub async fn sum_transactions<C>(db: &C, material_id: i64, location_id: i64) -> Result<i64>
where
    C: ConnectionTrait,
{
    let total: Option<Option<i64>> = StockTransaction::find()
        .select_only()
        .column_as(Expr::cust(SIGNED_QUANTITY_SUM), "total")
        .filter(stock_transaction::Column::MaterialId.eq(material_id))
        .filter(stock_transaction::Column::LocationId.eq(location_id))
        .into_tuple()
        .one(db)
        .await?;

    Ok(total.flatten().unwrap_or(0))
}

/// Signed transaction sum for every (material, location) pair that has transactions.
pub async fn signed_totals<C>(db: &C) -> Result<Vec<(i64, i64, i64)>>
where
    C: ConnectionTrait,
{
    StockTransaction::find()
        .select_only()
        .column(stock_transaction::Column::MaterialId)
        .column(stock_transaction::Column::LocationId)
        .column_as(Expr::cust(SIGNED_QUANTITY_SUM), "total")
        .group_by(stock_transaction::Column::MaterialId)
        .group_by(stock_transaction::Column::LocationId)
        .into_tuple()
        .all(db)
        .await
        .map_err(Into::into)
}

/// Ledger entries for the pair, newest first.
pub async fn list_transactions<C>(
    db: &C,
    material_id: i64,
    location_id: i64,
) -> Result<Vec<stock_transaction::Model>>
where
    C: ConnectionTrait,
{
    StockTransaction::find()
        .filter(stock_transaction::Column::MaterialId.eq(material_id))
        .filter(stock_transaction::Column::LocationId.eq(location_id))
        .order_by_desc(stock_transaction::Column::CreatedAt)
        .order_by_desc(stock_transaction::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// All stock level rows for a material across locations.
pub async fn levels_for_material<C>(db: &C, material_id: i64) -> Result<Vec<stock_level::Model>>
where
    C: ConnectionTrait,
{
    StockLevel::find()
        .filter(stock_level::Column::MaterialId.eq(material_id))
        .order_by_asc(stock_level::Column::LocationId)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Removes every transaction and level row for a material.
///
/// Returns `(transactions_deleted, levels_deleted)`.
pub(crate) async fn delete_material_rows<C>(db: &C, material_id: i64) -> Result<(u64, u64)>
where
    C: ConnectionTrait,
{
    let transactions = StockTransaction::delete_many()
        .filter(stock_transaction::Column::MaterialId.eq(material_id))
        .exec(db)
        .await?;
    let levels = StockLevel::delete_many()
        .filter(stock_level::Column::MaterialId.eq(material_id))
        .exec(db)
        .await?;

    Ok((transactions.rows_affected, levels.rows_affected))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::test_utils::*;

    #[tokio::test]
    async fn test_get_level_absent() -> Result<()> {
        let (db, location, material) = setup_with_material_without_stock().await?;

        let level = get_level(&db, material.id, location.id).await?;
        assert!(level.is_none());

        Ok(())
    }

    #[tokio::test]
    async fn test_upsert_delta_creates_then_increments() -> Result<()> {
        let (db, location, material) = setup_with_material_without_stock().await?;

        let created = upsert_level(&db, material.id, location.id, LevelChange::Delta(12))
            .await?
            .unwrap();
        assert_eq!(created.quantity, 12);

        let incremented = upsert_level(&db, material.id, location.id, LevelChange::Delta(8))
            .await?
            .unwrap();
        assert_eq!(incremented.id, created.id);
        assert_eq!(incremented.quantity, 20);

        let decremented = upsert_level(&db, material.id, location.id, LevelChange::Delta(-5))
            .await?
            .unwrap();
        assert_eq!(decremented.quantity, 15);

        assert_eq!(levels_for_material(&db, material.id).await?.len(), 1);

        Ok(())
    }

    #[tokio::test]
    async fn test_upsert_absolute_guarded_by_expected() -> Result<()> {
        let (db, location, material) = setup_with_material_without_stock().await?;

        // Absent row counts as zero
        let created = upsert_level(
            &db,
            material.id,
            location.id,
            LevelChange::Absolute {
                expected: 0,
                quantity: 30,
            },
        )
        .await?
        .unwrap();
        assert_eq!(created.quantity, 30);

        // Stale expectation is refused and leaves the row alone
        let stale = upsert_level(
            &db,
            material.id,
            location.id,
            LevelChange::Absolute {
                expected: 10,
                quantity: 99,
            },
        )
        .await?;
        assert!(stale.is_none());
        assert_eq!(
            get_level(&db, material.id, location.id).await?.unwrap().quantity,
            30
        );

        let updated = upsert_level(
            &db,
            material.id,
            location.id,
            LevelChange::Absolute {
                expected: 30,
                quantity: 10,
            },
        )
        .await?
        .unwrap();
        assert_eq!(updated.quantity, 10);

        Ok(())
    }

    #[tokio::test]
    async fn test_absolute_on_absent_row_with_nonzero_expectation() -> Result<()> {
        let (db, location, material) = setup_with_material_without_stock().await?;

        let result = upsert_level(
            &db,
            material.id,
            location.id,
            LevelChange::Absolute {
                expected: 5,
                quantity: 7,
            },
        )
        .await?;
        assert!(result.is_none());
        assert!(get_level(&db, material.id, location.id).await?.is_none());

        Ok(())
    }

    #[tokio::test]
    async fn test_decrement_if_available() -> Result<()> {
        let (db, location, material) = setup_with_material_without_stock().await?;

        // No row at all
        assert!(!decrement_if_available(&db, material.id, location.id, 1).await?);

        upsert_level(&db, material.id, location.id, LevelChange::Delta(10)).await?;
        assert!(!decrement_if_available(&db, material.id, location.id, 11).await?);
        assert!(decrement_if_available(&db, material.id, location.id, 10).await?);
        assert_eq!(
            get_level(&db, material.id, location.id).await?.unwrap().quantity,
            0
        );

        Ok(())
    }

    #[tokio::test]
    async fn test_sum_transactions_signed() -> Result<()> {
        let (db, location, material) = setup_with_material_without_stock().await?;

        assert_eq!(sum_transactions(&db, material.id, location.id).await?, 0);

        append_transaction(&db, material.id, location.id, TransactionType::In, 50, "in").await?;
        append_transaction(&db, material.id, location.id, TransactionType::Out, 20, "out").await?;
        append_transaction(&db, material.id, location.id, TransactionType::In, 0, "count").await?;

        assert_eq!(sum_transactions(&db, material.id, location.id).await?, 30);
        // Read-only: asking again gives the same answer
        assert_eq!(sum_transactions(&db, material.id, location.id).await?, 30);

        let totals = signed_totals(&db).await?;
        assert_eq!(totals, vec![(material.id, location.id, 30)]);

        Ok(())
    }

    #[tokio::test]
    async fn test_list_transactions_newest_first() -> Result<()> {
        let (db, location, material) = setup_with_material_without_stock().await?;

        let first =
            append_transaction(&db, material.id, location.id, TransactionType::In, 5, "first")
                .await?;
        let second =
            append_transaction(&db, material.id, location.id, TransactionType::Out, 2, "second")
                .await?;

        let history = list_transactions(&db, material.id, location.id).await?;
        assert_eq!(history, vec![second, first]);

        Ok(())
    }

    #[tokio::test]
    async fn test_delete_material_rows() -> Result<()> {
        let (db, location, material) = setup_with_material_without_stock().await?;

        upsert_level(&db, material.id, location.id, LevelChange::Delta(3)).await?;
        append_transaction(&db, material.id, location.id, TransactionType::In, 3, "in").await?;

        let (transactions, levels) = delete_material_rows(&db, material.id).await?;
        assert_eq!((transactions, levels), (1, 1));
        assert!(get_level(&db, material.id, location.id).await?.is_none());
        assert!(list_transactions(&db, material.id, location.id).await?.is_empty());

        Ok(())
    }
}
