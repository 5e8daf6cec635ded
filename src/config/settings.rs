//! Application settings loaded from config.toml
//!
//! Every section is optional. A missing file is not an error for the library
//! (see [`load_config`]), the maintenance binary decides what to do about it.
//! Reference data listed here is inserted by
//! [`crate::core::catalog::seed_reference_data`] when absent.

use crate::core::issuance::IssuanceDeletePolicy;
use crate::errors::{Error, Result};
use serde::Deserialize;
use std::path::Path;

/// Configuration structure representing the entire config.toml file
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Database connection settings
    pub database: DatabaseConfig,
    /// Issuance behaviour
    pub issuance: IssuanceConfig,
    /// Storage locations to seed
    pub locations: Vec<NamedEntry>,
    /// Departments to seed
    pub departments: Vec<NamedEntry>,
    /// Material categories to seed
    pub categories: Vec<NamedEntry>,
}

/// `[database]` section
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Connection URL; `DATABASE_URL` takes precedence
    pub url: Option<String>,
}

/// `[issuance]` section
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct IssuanceConfig {
    /// Receive issued stock back into its location when an issuance is deleted.
    /// Off by default: deleting an issuance only corrects the paperwork.
    pub reverse_stock_on_delete: bool,
}

impl IssuanceConfig {
    /// The deletion policy these settings select.
    #[must_use]
    pub const fn delete_policy(&self) -> IssuanceDeletePolicy {
        if self.reverse_stock_on_delete {
            IssuanceDeletePolicy::ReverseStock
        } else {
            IssuanceDeletePolicy::KeepStock
        }
    }
}

/// A reference-data row identified by name
#[derive(Debug, Deserialize, Clone)]
pub struct NamedEntry {
    /// Unique name
    pub name: String,
}

/// Parses configuration from a TOML string.
pub fn parse_config(contents: &str) -> Result<AppConfig> {
    toml::from_str(contents).map_err(|e| Error::Config {
        message: format!("Failed to parse config.toml: {e}"),
    })
}

/// Loads configuration from a TOML file
///
/// # Returns
/// * `Ok(AppConfig)` - Successfully parsed configuration, or defaults when the file does not exist
/// * `Err(Error)` - The file exists but could not be read or parsed
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AppConfig> {
    let path = path.as_ref();
    if !path.exists() {
        tracing::warn!("Config file {:?} not found, using defaults", path);
        return Ok(AppConfig::default());
    }
    let contents = std::fs::read_to_string(path).map_err(|e| Error::Config {
        message: format!("Failed to read config file {}: {e}", path.display()),
    })?;
    parse_config(&contents)
}

/// Loads configuration from `CENTRAL_SUPPLY_CONFIG`, falling back to ./config.toml
pub fn load_default_config() -> Result<AppConfig> {
    let path =
        std::env::var("CENTRAL_SUPPLY_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    load_config(path)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
            [database]
            url = "sqlite::memory:"

            [issuance]
            reverse_stock_on_delete = true

            [[locations]]
            name = "Main store"

            [[locations]]
            name = "Ward cabinet"

            [[departments]]
            name = "Pharmacy"

            [[categories]]
            name = "Office supplies"
        "#;

        let config = parse_config(toml_str).unwrap();
        assert_eq!(config.database.url.as_deref(), Some("sqlite::memory:"));
        assert!(config.issuance.reverse_stock_on_delete);
        assert_eq!(
            config.issuance.delete_policy(),
            IssuanceDeletePolicy::ReverseStock
        );
        assert_eq!(config.locations.len(), 2);
        assert_eq!(config.locations[1].name, "Ward cabinet");
        assert_eq!(config.departments[0].name, "Pharmacy");
        assert_eq!(config.categories[0].name, "Office supplies");
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = parse_config("").unwrap();
        assert!(config.database.url.is_none());
        assert_eq!(
            config.issuance.delete_policy(),
            IssuanceDeletePolicy::KeepStock
        );
        assert!(config.locations.is_empty());
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let result = parse_config("[[locations]\nname = ");
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let config = load_config("does/not/exist/config.toml").unwrap();
        assert!(config.departments.is_empty());
    }
}
