//! Read-only reports over the ledger and requisitions.

use crate::{
    entities::{
        ApprovalStatus, Material, ProcessingStatus, Request, StockLevel, material, request,
        stock_level,
    },
    errors::Result,
};
use sea_orm::{PaginatorTrait, QueryOrder, QuerySelect, prelude::*};
use serde::Serialize;
use std::collections::HashMap;

/// A material at or below its reorder point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LowStockEntry {
    /// The material
    pub material: material::Model,
    /// Total on hand across all locations
    pub on_hand: i64,
    /// Its reorder point
    pub reorder_point: i64,
    /// Whether stock has also fallen below the safety stock
    pub below_safety_stock: bool,
}

/// Request counts by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RequisitionStats {
    /// Awaiting a decision
    pub pending: u64,
    /// Approved, issued or not
    pub approved: u64,
    /// Rejected
    pub rejected: u64,
    /// Approved and not yet issued
    pub awaiting_issue: u64,
    /// Issued
    pub issued: u64,
}

/// Materials whose total on-hand quantity is at or below their reorder point,
/// ordered by code. Materials without a reorder point are never reported.
pub async fn low_stock_report<C>(db: &C) -> Result<Vec<LowStockEntry>>
where
    C: ConnectionTrait,
{
    let totals: HashMap<i64, i64> = StockLevel::find()
        .select_only()
        .column(stock_level::Column::MaterialId)
        .column_as(stock_level::Column::Quantity.sum(), "total")
        .group_by(stock_level::Column::MaterialId)
        .into_tuple::<(i64, Option<i64>)>()
        .all(db)
        .await?
        .into_iter()
        .map(|(material_id, total)| (material_id, total.unwrap_or(0)))
        .collect();

    let materials = Material::find()
        .filter(material::Column::ReorderPoint.is_not_null())
        .order_by_asc(material::Column::Code)
        .all(db)
        .await?;

    Ok(materials
        .into_iter()
        .filter_map(|material| {
            let reorder_point = material.reorder_point?;
            let on_hand = totals.get(&material.id).copied().unwrap_or(0);
            (on_hand <= reorder_point).then(|| LowStockEntry {
                below_safety_stock: material.safety_stock.is_some_and(|safety| on_hand < safety),
                material,
                on_hand,
                reorder_point,
            })
        })
        .collect())
}

/// Counts requests per approval and processing status.
pub async fn requisition_stats<C>(db: &C) -> Result<RequisitionStats>
where
    C: ConnectionTrait,
{
    let by_approval = |status: ApprovalStatus| {
        Request::find().filter(request::Column::ApprovalStatus.eq(status))
    };

    Ok(RequisitionStats {
        pending: by_approval(ApprovalStatus::Pending).count(db).await?,
        approved: by_approval(ApprovalStatus::Approved).count(db).await?,
        rejected: by_approval(ApprovalStatus::Rejected).count(db).await?,
        awaiting_issue: by_approval(ApprovalStatus::Approved)
            .filter(request::Column::ProcessingStatus.eq(ProcessingStatus::PendingIssue))
            .count(db)
            .await?,
        issued: Request::find()
            .filter(request::Column::ProcessingStatus.eq(ProcessingStatus::Issued))
            .count(db)
            .await?,
    })
}
