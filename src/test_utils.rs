//! Shared test utilities for the stock ledger and requisition workflow.
//!
//! This module provides common helper functions for setting up test databases
//! and creating test entities with sensible defaults.

use crate::{
    core::{
        catalog::{self, NewMaterial, NewUser},
        requisition::{self, ApprovalDecision, NewRequest, RequestDetail, RequestItemInput},
    },
    entities::{self, ApprovalStatus, Category, ProcessingStatus},
    errors::Result,
};
use chrono::{Local, Utc};
use sea_orm::{ConnectOptions, Database, DatabaseConnection, Set, prelude::*};
use std::path::Path;
use tracing_subscriber::EnvFilter;

/// Creates an in-memory `SQLite` database with all tables initialized.
/// This is the standard setup for all integration tests.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// Creates a file-backed `SQLite` database in `dir` with a small connection pool,
/// for tests that need several connections writing at once.
pub async fn setup_file_db(dir: &Path) -> Result<DatabaseConnection> {
    let url = format!("sqlite://{}?mode=rwc", dir.join("ledger.sqlite").display());
    let mut options = ConnectOptions::new(url);
    options.max_connections(4).sqlx_logging(false);
    let db = Database::connect(options).await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// Routes `tracing` output to the test harness. Safe to call from every test.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .with_test_writer()
        .try_init();
}

/// Creates a storage location.
pub async fn create_test_location(
    db: &DatabaseConnection,
    name: &str,
) -> Result<entities::location::Model> {
    catalog::create_location(db, name).await
}

/// Creates a material category.
pub async fn create_test_category(
    db: &DatabaseConnection,
    name: &str,
) -> Result<entities::category::Model> {
    catalog::create_category(db, name).await
}

/// Creates a material through the catalog, so a default location gets its zero level.
///
/// # Defaults
/// * category: the first existing one, or a new "General"
/// * unit: "piece"
/// * no reorder point or safety stock
pub async fn create_test_material(
    db: &DatabaseConnection,
    code: &str,
    name_th: &str,
    location_id: Option<i64>,
) -> Result<entities::material::Model> {
    let category = match Category::find().one(db).await? {
        Some(category) => category,
        None => create_test_category(db, "General").await?,
    };

    catalog::create_material(
        db,
        NewMaterial {
            code: code.to_string(),
            name_th: name_th.to_string(),
            unit: "piece".to_string(),
            category_id: category.id,
            location_id,
            ..Default::default()
        },
    )
    .await
}

/// Sets up a database with one location and one material stocked there at zero.
/// Returns (db, location, material).
pub async fn setup_with_material() -> Result<(
    DatabaseConnection,
    entities::location::Model,
    entities::material::Model,
)> {
    let db = setup_test_db().await?;
    let location = create_test_location(&db, "Main Store").await?;
    let material = create_test_material(&db, "GAUZE-01", "Gauze", Some(location.id)).await?;
    Ok((db, location, material))
}

/// Like [`setup_with_material`] but the material row is inserted directly, so
/// the ledger is completely empty.
pub async fn setup_with_material_without_stock() -> Result<(
    DatabaseConnection,
    entities::location::Model,
    entities::material::Model,
)> {
    let db = setup_test_db().await?;
    let location = create_test_location(&db, "Main Store").await?;
    let category = create_test_category(&db, "General").await?;
    let material = entities::material::ActiveModel {
        code: Set("GAUZE-01".to_string()),
        name_th: Set("Gauze".to_string()),
        name_en: Set(None),
        unit: Set("piece".to_string()),
        category_id: Set(category.id),
        location_id: Set(Some(location.id)),
        reorder_point: Set(None),
        safety_stock: Set(None),
        description: Set(None),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(&db)
    .await?;
    Ok((db, location, material))
}

/// Sets up a database with one department and a requester in it.
/// Returns (db, requester, department).
pub async fn setup_with_requester() -> Result<(
    DatabaseConnection,
    entities::user::Model,
    entities::department::Model,
)> {
    let db = setup_test_db().await?;
    let (requester, department) = create_test_requester(&db).await?;
    Ok((db, requester, department))
}

/// Creates the "Surgery" department and a requester in it.
pub async fn create_test_requester(
    db: &DatabaseConnection,
) -> Result<(entities::user::Model, entities::department::Model)> {
    let department = catalog::create_department(db, "Surgery").await?;
    let requester = catalog::create_user(
        db,
        NewUser {
            username: "requester".to_string(),
            full_name: "Test Requester".to_string(),
            department_id: Some(department.id),
        },
    )
    .await?;
    Ok((requester, department))
}

/// Inserts a pending request with a fixed number, bypassing numbering.
pub async fn insert_request_with_number(
    db: &DatabaseConnection,
    request_number: &str,
    requester_id: i64,
    department_id: i64,
) -> Result<entities::request::Model> {
    let now = Utc::now();
    entities::request::ActiveModel {
        request_number: Set(request_number.to_string()),
        requester_id: Set(requester_id),
        department_id: Set(department_id),
        request_date: Set(now.date_naive()),
        reason: Set("imported".to_string()),
        approval_status: Set(ApprovalStatus::Pending),
        processing_status: Set(ProcessingStatus::PendingIssue),
        approved_by: Set(None),
        approved_date: Set(None),
        approval_reason: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(Into::into)
}

/// Everything a requisition test needs.
pub struct WorkflowFixture {
    /// In-memory database
    pub db: DatabaseConnection,
    /// Store the material lives in
    pub location: entities::location::Model,
    /// A material stocked at `location` (zero on hand)
    pub material: entities::material::Model,
    /// Requesting department
    pub department: entities::department::Model,
    /// Requesting user
    pub requester: entities::user::Model,
    /// User who approves and issues
    pub approver: entities::user::Model,
}

/// Sets up a location, a material, a department, a requester and an approver.
pub async fn setup_workflow() -> Result<WorkflowFixture> {
    setup_workflow_on(setup_test_db().await?).await
}

/// [`setup_workflow`] on an existing, empty database.
pub async fn setup_workflow_on(db: DatabaseConnection) -> Result<WorkflowFixture> {
    let (requester, department) = create_test_requester(&db).await?;
    let location = create_test_location(&db, "Main Store").await?;
    let material = create_test_material(&db, "GAUZE-01", "Gauze", Some(location.id)).await?;
    let approver = catalog::create_user(
        &db,
        NewUser {
            username: "approver".to_string(),
            full_name: "Test Approver".to_string(),
            department_id: None,
        },
    )
    .await?;

    Ok(WorkflowFixture {
        db,
        location,
        material,
        department,
        requester,
        approver,
    })
}

/// A request line with no note and the material's default location.
pub fn item_input(material_id: i64, requested_quantity: i64) -> RequestItemInput {
    RequestItemInput {
        material_id,
        requested_quantity,
        note: None,
        location_id: None,
    }
}

/// Raises a pending request for `(material_id, quantity)` lines.
pub async fn create_test_request(
    fixture: &WorkflowFixture,
    lines: &[(i64, i64)],
) -> Result<RequestDetail> {
    requisition::create_request(
        &fixture.db,
        NewRequest {
            requester_id: fixture.requester.id,
            department_id: fixture.department.id,
            request_date: Local::now().date_naive(),
            reason: "ward restock".to_string(),
            items: lines
                .iter()
                .map(|&(material_id, quantity)| item_input(material_id, quantity))
                .collect(),
        },
    )
    .await
}

/// Raises a request and approves it as the fixture's approver.
pub async fn create_approved_request(
    fixture: &WorkflowFixture,
    lines: &[(i64, i64)],
) -> Result<RequestDetail> {
    let detail = create_test_request(fixture, lines).await?;
    let request = requisition::set_approval(
        &fixture.db,
        detail.request.id,
        ApprovalDecision::Approve,
        fixture.approver.id,
        None,
    )
    .await?;
    Ok(RequestDetail {
        request,
        items: detail.items,
    })
}
