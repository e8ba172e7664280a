//! Seed inventory from YAML.
//!
//! ```yaml
//! items:
//!   - phone_model: iPhone 15 Pro
//!     case_type: Ốp cứng
//!     unit_price: 150000
//!     quantity: 40
//!     reorder_threshold: 5
//! ```
//!
//! Items are upserted by `(phone_model, case_type)`, so the file can be
//! re-applied to reset stock levels.

use std::collections::HashSet;
use std::path::Path;

use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{error, info};

use caseforge_storefront::db::{self, InventoryStore, PgInventoryStore};

/// Threshold used when an item does not set one.
const DEFAULT_REORDER_THRESHOLD: i32 = 5;

#[derive(Debug, Deserialize)]
pub struct InventorySeed {
    pub items: Vec<SeedItem>,
}

#[derive(Debug, Deserialize)]
pub struct SeedItem {
    pub phone_model: String,
    pub case_type: String,
    pub unit_price: Decimal,
    pub quantity: i32,
    #[serde(default = "default_reorder_threshold")]
    pub reorder_threshold: i32,
}

const fn default_reorder_threshold() -> i32 {
    DEFAULT_REORDER_THRESHOLD
}

/// Problems with a seed file, one message per offending item.
fn validate(seed: &InventorySeed) -> Vec<String> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();

    for (index, item) in seed.items.iter().enumerate() {
        let label = format!("item {} ({} / {})", index + 1, item.phone_model, item.case_type);
        if item.phone_model.trim().is_empty() || item.case_type.trim().is_empty() {
            errors.push(format!("{label}: phone_model and case_type are required"));
        }
        if item.unit_price <= Decimal::ZERO {
            errors.push(format!("{label}: unit_price must be positive"));
        }
        if item.quantity < 0 || item.reorder_threshold < 0 {
            errors.push(format!("{label}: quantity and reorder_threshold cannot be negative"));
        }
        if !seen.insert((item.phone_model.trim(), item.case_type.trim())) {
            errors.push(format!("{label}: duplicate entry"));
        }
    }

    errors
}

/// Upsert inventory items from a YAML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, fails validation,
/// or the database rejects an item.
pub async fn inventory(file_path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let path = Path::new(file_path);
    if !path.exists() {
        return Err(format!("File not found: {file_path}").into());
    }

    info!(path = %file_path, "Loading inventory from file");
    let content = tokio::fs::read_to_string(path).await?;
    let seed: InventorySeed = serde_yaml::from_str(&content)?;

    let errors = validate(&seed);
    if !errors.is_empty() {
        error!("Inventory file validation failed:");
        for err in &errors {
            error!("  - {err}");
        }
        return Err(format!("{} validation errors found", errors.len()).into());
    }

    let database_url = super::database_url()?;
    let pool = db::create_pool(&database_url).await?;
    info!("Connected to database");

    let store = PgInventoryStore::new(pool);
    for item in &seed.items {
        let stored = store
            .upsert_item(
                item.phone_model.trim(),
                item.case_type.trim(),
                item.unit_price,
                item.quantity,
                item.reorder_threshold,
            )
            .await?;
        info!(
            id = %stored.id,
            phone_model = %stored.phone_model,
            case_type = %stored.case_type,
            quantity = stored.quantity,
            "Inventory item upserted"
        );
    }

    info!(items = seed.items.len(), "Seeding complete!");
    Ok(())
}
