//! Human-readable document numbers: `{PREFIX}{buddhist year}{4-digit sequence}`.
//!
//! Numbers are allocated from a counter row per prefix and year in
//! `number_sequences`, bumped with an atomic `last_value = last_value + 1`, so two
//! concurrent creations can never draw the same number. The first allocation of a
//! year seeds its counter from the highest number already stored for that prefix.

use crate::{
    entities::{Issuance, NumberSequence, Request, issuance, number_sequence, request},
    errors::{Error, Result, is_unique_violation},
};
use chrono::{Datelike, Local, NaiveDate, Utc};
use sea_orm::{QuerySelect, Set, TransactionTrait, prelude::*, sea_query::Expr};
use tracing::debug;

/// Years between the Gregorian and Buddhist calendars.
pub const BUDDHIST_ERA_OFFSET: i32 = 543;

const SEED_ATTEMPTS: u32 = 3;

/// Which kind of document is being numbered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    /// Requisitions, `REQ...`
    Request,
    /// Issuances, `IS...`
    Issuance,
}

impl DocumentKind {
    /// Prefix placed before the year
    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::Request => "REQ",
            Self::Issuance => "IS",
        }
    }

    /// Counter key for a year, e.g. `REQ2568`
    #[must_use]
    pub fn key(self, buddhist_year: i32) -> String {
        format!("{}{buddhist_year}", self.prefix())
    }
}

/// Buddhist-calendar year of a date.
#[must_use]
pub fn buddhist_year(date: NaiveDate) -> i32 {
    date.year() + BUDDHIST_ERA_OFFSET
}

/// Formats a document number; the sequence is zero-padded to four digits.
#[must_use]
pub fn format_number(kind: DocumentKind, buddhist_year: i32, sequence: i64) -> String {
    format!("{}{sequence:04}", kind.key(buddhist_year))
}

/// Sequence part of `number` if it was issued under `key`.
#[must_use]
pub fn parse_sequence(number: &str, key: &str) -> Option<i64> {
    number.strip_prefix(key)?.parse().ok()
}

pub(crate) fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Highest sequence already used under `key` in the document table itself.
async fn highest_stored_sequence<C>(db: &C, kind: DocumentKind, key: &str) -> Result<i64>
where
    C: ConnectionTrait,
{
    let numbers: Vec<String> = match kind {
        DocumentKind::Request => {
            Request::find()
                .select_only()
                .column(request::Column::RequestNumber)
                .filter(request::Column::RequestNumber.starts_with(key))
                .into_tuple()
                .all(db)
                .await?
        }
        DocumentKind::Issuance => {
            Issuance::find()
                .select_only()
                .column(issuance::Column::IssuanceNumber)
                .filter(issuance::Column::IssuanceNumber.starts_with(key))
                .into_tuple()
                .all(db)
                .await?
        }
    };

    Ok(numbers
        .iter()
        .filter_map(|number| parse_sequence(number, key))
        .max()
        .unwrap_or(0))
}

async fn counter<C>(db: &C, key: &str) -> Result<Option<number_sequence::Model>>
where
    C: ConnectionTrait,
{
    NumberSequence::find()
        .filter(number_sequence::Column::Prefix.eq(key))
        .one(db)
        .await
        .map_err(Into::into)
}

/// The number the next document of `kind` created on `date` would get.
///
/// Read-only preview; a concurrent creation may take it first.
pub async fn peek_next_number_for<C>(db: &C, kind: DocumentKind, date: NaiveDate) -> Result<String>
where
    C: ConnectionTrait,
{
    let year = buddhist_year(date);
    let key = kind.key(year);
    let last = match counter(db, &key).await? {
        Some(row) => row.last_value,
        None => highest_stored_sequence(db, kind, &key).await?,
    };
    Ok(format_number(kind, year, last + 1))
}

/// Preview of the next request number for today.
pub async fn next_request_number<C>(db: &C) -> Result<String>
where
    C: ConnectionTrait,
{
    peek_next_number_for(db, DocumentKind::Request, today()).await
}

/// Preview of the next issuance number for today.
pub async fn next_issuance_number<C>(db: &C) -> Result<String>
where
    C: ConnectionTrait,
{
    peek_next_number_for(db, DocumentKind::Issuance, today()).await
}

/// Allocates the next number of `kind` for `date`, consuming it.
pub(crate) async fn allocate_number<C>(db: &C, kind: DocumentKind, date: NaiveDate) -> Result<String>
where
    C: ConnectionTrait + TransactionTrait,
{
    let year = buddhist_year(date);
    let key = kind.key(year);

    for _ in 0..SEED_ATTEMPTS {
        let bumped = NumberSequence::update_many()
            .col_expr(
                number_sequence::Column::LastValue,
                Expr::col(number_sequence::Column::LastValue).add(1),
            )
            .col_expr(number_sequence::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(number_sequence::Column::Prefix.eq(key.as_str()))
            .exec(db)
            .await?;

        if bumped.rows_affected > 0 {
            let row = counter(db, &key).await?.ok_or_else(|| {
                Error::Database(DbErr::RecordNotFound(format!("number sequence {key}")))
            })?;
            return Ok(format_number(kind, year, row.last_value));
        }

        // First number of the year: seed the counter past anything already stored
        let next = highest_stored_sequence(db, kind, &key).await? + 1;
        let savepoint = db.begin().await?;
        let seeded = number_sequence::ActiveModel {
            prefix: Set(key.clone()),
            last_value: Set(next),
            updated_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&savepoint)
        .await;

        match seeded {
            Ok(_) => {
                savepoint.commit().await?;
                debug!(key = %key, next, "number sequence seeded");
                return Ok(format_number(kind, year, next));
            }
            Err(err) if is_unique_violation(&err) => {
                savepoint.rollback().await?;
                debug!(key = %key, "number sequence seeded concurrently, retrying");
            }
            Err(err) => return Err(err.into()),
        }
    }

    Err(Error::ConcurrentModification {
        resource: format!("number sequence {key}"),
        attempts: SEED_ATTEMPTS,
    })
}
