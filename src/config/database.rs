//! Database configuration module for the central supply ledger.
//!
//! This module handles `SQLite` database connection and table creation using `SeaORM`.
//! Tables are generated from the entity definitions with `Schema::create_table_from_entity`,
//! so the schema always matches the Rust structs. The one constraint the entity macros
//! cannot express, uniqueness of (`material_id`, `location_id`) on `stock_levels`, is added
//! as an explicit index.

use crate::entities::{
    Category, Department, Issuance, IssuanceItem, Location, Material, NumberSequence, Request,
    RequestItem, StockLevel, StockLevelColumn, StockTransaction, User,
};
use crate::errors::Result;
use sea_orm::sea_query::Index;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, EntityTrait, Schema};
use tracing::{debug, info, instrument};

const DEFAULT_DATABASE_URL: &str = "sqlite://data/central_supply.sqlite?mode=rwc";

/// Name of the unique index guarding one stock level row per material and location.
pub const STOCK_LEVEL_UNIQUE_INDEX: &str = "idx_stock_levels_material_location";

/// Resolves the database URL.
///
/// `DATABASE_URL` from the environment wins, then the URL from the config file,
/// then a local `SQLite` file.
#[must_use]
pub fn get_database_url(configured: Option<&str>) -> String {
    std::env::var("DATABASE_URL")
        .ok()
        .or_else(|| configured.map(str::to_string))
        .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string())
}

/// Establishes a connection to the database at `database_url`.
pub async fn create_connection(database_url: &str) -> Result<DatabaseConnection> {
    debug!("Connecting to database at {}", database_url);
    Database::connect(database_url).await.map_err(Into::into)
}

async fn create_table<C, E>(db: &C, schema: &Schema, entity: E) -> Result<()>
where
    C: ConnectionTrait,
    E: EntityTrait,
{
    let builder = db.get_database_backend();
    let mut statement = schema.create_table_from_entity(entity);
    statement.if_not_exists();
    db.execute(builder.build(&statement)).await?;
    Ok(())
}

/// Creates all tables (if missing) in dependency order, plus the stock level unique index.
#[instrument(skip(db))]
pub async fn create_tables<C>(db: &C) -> Result<()>
where
    C: ConnectionTrait,
{
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    // Parents before children so foreign keys resolve
    create_table(db, &schema, Department).await?;
    create_table(db, &schema, Category).await?;
    create_table(db, &schema, Location).await?;
    create_table(db, &schema, User).await?;
    create_table(db, &schema, Material).await?;
    create_table(db, &schema, StockLevel).await?;
    create_table(db, &schema, StockTransaction).await?;
    create_table(db, &schema, Request).await?;
    create_table(db, &schema, RequestItem).await?;
    create_table(db, &schema, Issuance).await?;
    create_table(db, &schema, IssuanceItem).await?;
    create_table(db, &schema, NumberSequence).await?;

    let stock_level_index = Index::create()
        .name(STOCK_LEVEL_UNIQUE_INDEX)
        .table(StockLevel)
        .col(StockLevelColumn::MaterialId)
        .col(StockLevelColumn::LocationId)
        .unique()
        .if_not_exists()
        .to_owned();
    db.execute(builder.build(&stock_level_index)).await?;

    info!("Database tables ensured");
    Ok(())
}
