//! Reference data and materials.
//!
//! Locations, departments, categories and users are created here with their
//! uniqueness rules. Materials are created with a zero stock level at their
//! default location and deleted with an explicit cascade.

use crate::{
    config::settings::AppConfig,
    core::{
        ledger,
        stock::{self, MaterialStockRemoval},
    },
    entities::{
        Category, Department, IssuanceItem, Location, Material, RequestItem, category, department,
        issuance_item, location, material, request_item, user,
    },
    errors::{Error, Result},
};
use chrono::Utc;
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

/// Description recorded on the zero-quantity entry that opens a material's ledger.
pub const INITIAL_LEVEL_DESCRIPTION: &str = "initial stock level";

/// Input for [`create_user`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUser {
    /// Login name, must be unique
    pub username: String,
    /// Display name
    pub full_name: String,
    /// Home department
    pub department_id: Option<i64>,
}

/// Input for [`create_material`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMaterial {
    /// Stock code, must be unique
    pub code: String,
    /// Thai name, must be unique
    pub name_th: String,
    /// English name
    pub name_en: Option<String>,
    /// Unit of measure
    pub unit: String,
    /// Category
    pub category_id: i64,
    /// Default storage location
    pub location_id: Option<i64>,
    /// Total on-hand at or below which the material is reported as low
    pub reorder_point: Option<i64>,
    /// Minimum stock to keep
    pub safety_stock: Option<i64>,
    /// Free text
    pub description: Option<String>,
}

/// Edits applied by [`update_material`]; `None` leaves a field unchanged.
///
/// Optional columns take `Some(None)` to clear them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialChanges {
    /// New stock code
    pub code: Option<String>,
    /// New Thai name
    pub name_th: Option<String>,
    /// New English name
    pub name_en: Option<Option<String>>,
    /// New unit of measure
    pub unit: Option<String>,
    /// New category
    pub category_id: Option<i64>,
    /// New default location
    pub location_id: Option<Option<i64>>,
    /// New reorder point
    pub reorder_point: Option<Option<i64>>,
    /// New safety stock
    pub safety_stock: Option<Option<i64>>,
    /// New description
    pub description: Option<Option<String>>,
}

/// Rows removed by [`delete_material`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaterialDeletion {
    /// Issuance lines for the material
    pub issuance_items_deleted: u64,
    /// Request lines for the material
    pub request_items_deleted: u64,
    /// Ledger entries and stock levels
    pub stock: MaterialStockRemoval,
}

/// Rows inserted by [`seed_reference_data`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedSummary {
    /// New locations
    pub locations: usize,
    /// New departments
    pub departments: usize,
    /// New categories
    pub categories: usize,
}

fn required_name(entity: &'static str, name: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidName { entity });
    }
    Ok(trimmed.to_string())
}

/// Creates a storage location.
///
/// # Errors
/// * `DuplicateName` - a location with this name exists
pub async fn create_location<C>(db: &C, name: &str) -> Result<location::Model>
where
    C: ConnectionTrait,
{
    let name = required_name("location", name)?;
    let exists = Location::find()
        .filter(location::Column::Name.eq(name.as_str()))
        .one(db)
        .await?
        .is_some();
    if exists {
        return Err(Error::DuplicateName {
            entity: "location",
            name,
        });
    }

    location::ActiveModel {
        name: Set(name.clone()),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(|err| Error::duplicate_or(err, "location", &name))
}

/// Creates a department.
///
/// # Errors
/// * `DuplicateName` - a department with this name exists
pub async fn create_department<C>(db: &C, name: &str) -> Result<department::Model>
where
    C: ConnectionTrait,
{
    let name = required_name("department", name)?;
    let exists = Department::find()
        .filter(department::Column::Name.eq(name.as_str()))
        .one(db)
        .await?
        .is_some();
    if exists {
        return Err(Error::DuplicateName {
            entity: "department",
            name,
        });
    }

    department::ActiveModel {
        name: Set(name.clone()),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(|err| Error::duplicate_or(err, "department", &name))
}

/// Creates a material category.
///
/// # Errors
/// * `DuplicateName` - a category with this name exists
pub async fn create_category<C>(db: &C, name: &str) -> Result<category::Model>
where
    C: ConnectionTrait,
{
    let name = required_name("category", name)?;
    let exists = Category::find()
        .filter(category::Column::Name.eq(name.as_str()))
        .one(db)
        .await?
        .is_some();
    if exists {
        return Err(Error::DuplicateName {
            entity: "category",
            name,
        });
    }

    category::ActiveModel {
        name: Set(name.clone()),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(|err| Error::duplicate_or(err, "category", &name))
}

/// Creates a user.
///
/// # Errors
/// * `DepartmentNotFound` - the home department does not exist
/// * `DuplicateName` - the username is taken
pub async fn create_user<C>(db: &C, new_user: NewUser) -> Result<user::Model>
where
    C: ConnectionTrait,
{
    let username = required_name("user", &new_user.username)?;
    if let Some(department_id) = new_user.department_id {
        Department::find_by_id(department_id)
            .one(db)
            .await?
            .ok_or(Error::DepartmentNotFound { department_id })?;
    }

    user::ActiveModel {
        username: Set(username.clone()),
        full_name: Set(new_user.full_name),
        department_id: Set(new_user.department_id),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(|err| Error::duplicate_or(err, "user", &username))
}

/// All locations, alphabetically.
pub async fn list_locations<C>(db: &C) -> Result<Vec<location::Model>>
where
    C: ConnectionTrait,
{
    Location::find()
        .order_by_asc(location::Column::Name)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Finds a material by id.
pub async fn get_material<C>(db: &C, material_id: i64) -> Result<Option<material::Model>>
where
    C: ConnectionTrait,
{
    Material::find_by_id(material_id)
        .one(db)
        .await
        .map_err(Into::into)
}

async fn ensure_category<C>(db: &C, category_id: i64) -> Result<()>
where
    C: ConnectionTrait,
{
    Category::find_by_id(category_id)
        .one(db)
        .await?
        .map(|_| ())
        .ok_or(Error::NotFound {
            entity: "category",
            id: category_id,
        })
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

/// Fails with `DuplicateName` when another material already uses `value` in `column`.
async fn ensure_material_name_free<C>(
    db: &C,
    column: material::Column,
    value: &str,
    except_id: Option<i64>,
) -> Result<()>
where
    C: ConnectionTrait,
{
    let mut query = Material::find().filter(column.eq(value));
    if let Some(material_id) = except_id {
        query = query.filter(material::Column::Id.ne(material_id));
    }
    if query.one(db).await?.is_some() {
        return Err(Error::DuplicateName {
            entity: "material",
            name: value.to_string(),
        });
    }
    Ok(())
}

/// Creates a material and opens its ledger at the default location.
///
/// When a default location is given the material starts with a zero stock level
/// there, recorded as a zero-quantity `IN` entry.
///
/// # Errors
/// * `NotFound` - unknown category
/// * `LocationNotFound` - unknown default location
/// * `DuplicateName` - the code or Thai name is taken
/// * `InvalidName` - the code or Thai name is blank
#[instrument(skip(db, new_material), fields(code = %new_material.code))]
pub async fn create_material<C>(db: &C, new_material: NewMaterial) -> Result<material::Model>
where
    C: ConnectionTrait + TransactionTrait,
{
    let code = required_name("material", &new_material.code)?;
    let name_th = required_name("material", &new_material.name_th)?;

    let txn = db.begin().await?;
    ensure_category(&txn, new_material.category_id).await?;
    if let Some(location_id) = new_material.location_id {
        ensure_location(&txn, location_id).await?;
    }
    ensure_material_name_free(&txn, material::Column::Code, &code, None).await?;
    ensure_material_name_free(&txn, material::Column::NameTh, &name_th, None).await?;

    let material = material::ActiveModel {
        code: Set(code.clone()),
        name_th: Set(name_th),
        name_en: Set(new_material.name_en),
        unit: Set(new_material.unit),
        category_id: Set(new_material.category_id),
        location_id: Set(new_material.location_id),
        reorder_point: Set(new_material.reorder_point),
        safety_stock: Set(new_material.safety_stock),
        description: Set(new_material.description),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(&txn)
    .await
    .map_err(|err| Error::duplicate_or(err, "material", &code))?;

    if let Some(location_id) = material.location_id {
        stock::adjust(&txn, material.id, location_id, 0, INITIAL_LEVEL_DESCRIPTION).await?;
    }
    txn.commit().await?;

    info!(material_id = material.id, code = %material.code, "material created");
    Ok(material)
}

/// Edits a material.
///
/// Code and Thai name stay unique. When the default location changes to one
/// where the material has never been stocked, a zero level is opened there, so
/// new request items routed to it can be issued against the ledger.
///
/// # Errors
/// * `NotFound` - no such material, or unknown category
/// * `LocationNotFound` - unknown default location
/// * `DuplicateName` - the code or Thai name is taken by another material
/// * `InvalidName` - the code or Thai name is blank
#[instrument(skip(db, changes))]
pub async fn update_material<C>(
    db: &C,
    material_id: i64,
    changes: MaterialChanges,
) -> Result<material::Model>
where
    C: ConnectionTrait + TransactionTrait,
{
    let txn = db.begin().await?;
    let existing = Material::find_by_id(material_id)
        .one(&txn)
        .await?
        .ok_or(Error::NotFound {
            entity: "material",
            id: material_id,
        })?;
    let mut active: material::ActiveModel = existing.clone().into();

    if let Some(code) = changes.code {
        let code = required_name("material", &code)?;
        ensure_material_name_free(&txn, material::Column::Code, &code, Some(material_id)).await?;
        active.code = Set(code);
    }
    if let Some(name_th) = changes.name_th {
        let name_th = required_name("material", &name_th)?;
        ensure_material_name_free(&txn, material::Column::NameTh, &name_th, Some(material_id))
            .await?;
        active.name_th = Set(name_th);
    }
    if let Some(category_id) = changes.category_id {
        ensure_category(&txn, category_id).await?;
        active.category_id = Set(category_id);
    }
    if let Some(location_id) = changes.location_id {
        if let Some(location_id) = location_id {
            ensure_location(&txn, location_id).await?;
        }
        active.location_id = Set(location_id);
    }
    if let Some(name_en) = changes.name_en {
        active.name_en = Set(name_en);
    }
    if let Some(unit) = changes.unit {
        active.unit = Set(unit);
    }
    if let Some(reorder_point) = changes.reorder_point {
        active.reorder_point = Set(reorder_point);
    }
    if let Some(safety_stock) = changes.safety_stock {
        active.safety_stock = Set(safety_stock);
    }
    if let Some(description) = changes.description {
        active.description = Set(description);
    }

    let material = active
        .update(&txn)
        .await
        .map_err(|err| Error::duplicate_or(err, "material", &existing.code))?;

    if let Some(location_id) = material.location_id {
        if material.location_id != existing.location_id
            && ledger::get_level(&txn, material_id, location_id).await?.is_none()
        {
            stock::adjust(&txn, material_id, location_id, 0, INITIAL_LEVEL_DESCRIPTION).await?;
        }
    }
    txn.commit().await?;

    info!(material_id, code = %material.code, "material updated");
    Ok(material)
}

/// Hard-deletes a material and everything that refers to it.
///
/// Issuance lines, request lines, ledger entries and stock levels go first,
/// then the material itself, all in one unit of work. Requests and issuances
/// left without lines are kept.
///
/// # Errors
/// * `NotFound` - no such material
#[instrument(skip(db))]
pub async fn delete_material<C>(db: &C, material_id: i64) -> Result<MaterialDeletion>
where
    C: ConnectionTrait + TransactionTrait,
{
    let txn = db.begin().await?;
    let material = Material::find_by_id(material_id)
        .one(&txn)
        .await?
        .ok_or(Error::NotFound {
            entity: "material",
            id: material_id,
        })?;

    let issuance_items_deleted = IssuanceItem::delete_many()
        .filter(issuance_item::Column::MaterialId.eq(material_id))
        .exec(&txn)
        .await?
        .rows_affected;
    let request_items_deleted = RequestItem::delete_many()
        .filter(request_item::Column::MaterialId.eq(material_id))
        .exec(&txn)
        .await?
        .rows_affected;
    let stock = stock::delete_material_stock(&txn, material_id).await?;
    Material::delete_by_id(material_id).exec(&txn).await?;
    txn.commit().await?;

    info!(
        material_id,
        code = %material.code,
        issuance_items_deleted,
        request_items_deleted,
        "material deleted"
    );
    Ok(MaterialDeletion {
        issuance_items_deleted,
        request_items_deleted,
        stock,
    })
}

/// Inserts the configured locations, departments and categories that do not exist yet.
pub async fn seed_reference_data<C>(db: &C, config: &AppConfig) -> Result<SeedSummary>
where
    C: ConnectionTrait + TransactionTrait,
{
    let txn = db.begin().await?;
    let mut summary = SeedSummary::default();

    for entry in &config.locations {
        let exists = Location::find()
            .filter(location::Column::Name.eq(entry.name.trim()))
            .one(&txn)
            .await?
            .is_some();
        if !exists {
            create_location(&txn, &entry.name).await?;
            summary.locations += 1;
        }
    }
    for entry in &config.departments {
        let exists = Department::find()
            .filter(department::Column::Name.eq(entry.name.trim()))
            .one(&txn)
            .await?
            .is_some();
        if !exists {
            create_department(&txn, &entry.name).await?;
            summary.departments += 1;
        }
    }
    for entry in &config.categories {
        let exists = Category::find()
            .filter(category::Column::Name.eq(entry.name.trim()))
            .one(&txn)
            .await?
            .is_some();
        if !exists {
            create_category(&txn, &entry.name).await?;
            summary.categories += 1;
        }
    }

    txn.commit().await?;
    info!(
        locations = summary.locations,
        departments = summary.departments,
        categories = summary.categories,
        "reference data seeded"
    );
    Ok(summary)
}
