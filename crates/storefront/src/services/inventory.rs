//! Inventory reconciliation for order placement and cancellation.
//!
//! Each line item adjusts its inventory item with one atomic, zero-clamped
//! update. Lines are independent: a failed line is logged and reported in
//! [`ReconcileReport::skipped`] while the remaining lines are still applied.

use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, instrument, warn};

use caseforge_core::{InventoryItemId, LineItemId, OrderId};

use crate::db::{InventoryStore, OrderStore};
use crate::models::QuantityChange;

/// A line that could not be applied.
#[derive(Debug, Clone, Serialize)]
pub struct SkippedLine {
    pub line_item_id: LineItemId,
    pub inventory_item_id: InventoryItemId,
    pub reason: String,
}

/// Outcome of reconciling one order against inventory.
///
/// `success` means every line was visited; compare `updates` with the
/// line count, or check [`ReconcileReport::is_complete`], to detect
/// skipped lines.
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileReport {
    pub success: bool,
    pub message: String,
    pub updates: Vec<QuantityChange>,
    pub skipped: Vec<SkippedLine>,
}

impl ReconcileReport {
    fn failed(message: String) -> Self {
        Self {
            success: false,
            message,
            updates: Vec::new(),
            skipped: Vec::new(),
        }
    }

    /// Every line was applied.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.success && self.skipped.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Decrement,
    Restore,
}

/// Applies order line items to on-hand inventory.
#[derive(Clone)]
pub struct InventoryReconciler {
    orders: Arc<dyn OrderStore>,
    inventory: Arc<dyn InventoryStore>,
}

impl InventoryReconciler {
    #[must_use]
    pub fn new(orders: Arc<dyn OrderStore>, inventory: Arc<dyn InventoryStore>) -> Self {
        Self { orders, inventory }
    }

    /// Take each line's quantity out of stock, clamping at zero.
    #[instrument(skip(self))]
    pub async fn decrement_on_order_create(&self, order_id: OrderId) -> ReconcileReport {
        self.reconcile(order_id, Direction::Decrement).await
    }

    /// Put each line's quantity back into stock.
    #[instrument(skip(self))]
    pub async fn restore_on_order_cancel(&self, order_id: OrderId) -> ReconcileReport {
        self.reconcile(order_id, Direction::Restore).await
    }

    async fn reconcile(&self, order_id: OrderId, direction: Direction) -> ReconcileReport {
        let lines = match self.orders.line_items(order_id).await {
            Ok(lines) => lines,
            Err(e) => {
                error!(error = %e, "Failed to load line items for inventory update");
                return ReconcileReport::failed(format!("could not load order {order_id}: {e}"));
            }
        };

        let mut updates = Vec::with_capacity(lines.len());
        let mut skipped = Vec::new();

        for line in &lines {
            let delta = match direction {
                Direction::Decrement => -line.quantity,
                Direction::Restore => line.quantity,
            };

            match self.inventory.adjust_quantity(line.inventory_item_id, delta).await {
                Ok(change) => {
                    if matches!(direction, Direction::Decrement) {
                        if change.previous < line.quantity {
                            warn!(
                                item_id = %change.item_id,
                                on_hand = change.previous,
                                ordered = line.quantity,
                                "Order exceeded stock, clamped at zero"
                            );
                        }
                        if change.needs_reorder() {
                            warn!(
                                item_id = %change.item_id,
                                quantity = change.current,
                                threshold = change.reorder_threshold,
                                "Inventory at or below reorder threshold"
                            );
                        }
                    }
                    updates.push(change);
                }
                Err(e) => {
                    error!(
                        line_item_id = %line.id,
                        item_id = %line.inventory_item_id,
                        error = %e,
                        "Skipping inventory update for line"
                    );
                    skipped.push(SkippedLine {
                        line_item_id: line.id,
                        inventory_item_id: line.inventory_item_id,
                        reason: e.to_string(),
                    });
                }
            }
        }

        let verb = match direction {
            Direction::Decrement => "decremented",
            Direction::Restore => "restored",
        };
        info!(
            updated = updates.len(),
            skipped = skipped.len(),
            "Inventory {verb}"
        );

        ReconcileReport {
            success: true,
            message: format!(
                "{verb} {} of {} lines for order {order_id}",
                updates.len(),
                lines.len()
            ),
            updates,
            skipped,
        }
    }
}
