//! Stock levels per phone model and case type.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use caseforge_core::InventoryItemId;

/// A phone-model × case-type pair with its on-hand quantity.
#[derive(Debug, Clone, Serialize)]
pub struct InventoryItem {
    pub id: InventoryItemId,
    pub phone_model: String,
    pub case_type: String,
    /// Selling price per case.
    pub unit_price: Decimal,
    /// On-hand quantity. Never negative.
    pub quantity: i32,
    pub reorder_threshold: i32,
    /// Storage paths of the printable design template.
    pub template_assets: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

/// A quantity adjustment as applied by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuantityChange {
    pub item_id: InventoryItemId,
    pub previous: i32,
    pub current: i32,
    pub reorder_threshold: i32,
}

impl QuantityChange {
    /// Whether stock has dropped to or below the reorder threshold.
    #[must_use]
    pub const fn needs_reorder(&self) -> bool {
        self.current <= self.reorder_threshold
    }
}
