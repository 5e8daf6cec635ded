//! Maintenance entry point: prepares the database and checks ledger health.

use central_supply::{
    config::{database, settings},
    core::{catalog, report, stock},
    errors::Result,
};
use dotenvy::dotenv;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file; env vars may also be set externally
    dotenv().ok();

    // 3. Load the application configuration
    let app_config = settings::load_default_config()
        .inspect_err(|e| error!("Failed to load configuration: {}", e))?;

    // 4. Connect and create the schema
    let database_url = database::get_database_url(app_config.database.url.as_deref());
    let db = database::create_connection(&database_url)
        .await
        .inspect_err(|e| error!("Failed to connect to {}: {}", database_url, e))?;
    database::create_tables(&db)
        .await
        .inspect(|_| info!("Database schema ready"))?;

    // 5. Seed configured reference data
    catalog::seed_reference_data(&db, &app_config).await?;
    info!(
        delete_policy = ?app_config.issuance.delete_policy(),
        "Issuance deletion policy"
    );

    // 6. Check the ledger
    let drift = stock::reconcile(&db).await?;
    if drift.is_empty() {
        info!("All stock levels match their transactions");
    } else {
        warn!("{} stock level(s) disagree with their transactions", drift.len());
    }

    for entry in report::low_stock_report(&db).await? {
        warn!(
            code = %entry.material.code,
            on_hand = entry.on_hand,
            reorder_point = entry.reorder_point,
            "Material at or below reorder point"
        );
    }

    let stats = report::requisition_stats(&db).await?;
    info!(
        pending = stats.pending,
        awaiting_issue = stats.awaiting_issue,
        issued = stats.issued,
        "Requisitions"
    );

    Ok(())
}
