//! Checkout, end-user cancellation and order lookup.

use std::sync::Arc;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, instrument, warn};

use caseforge_core::{
    InventoryItemId, OrderId, OrderStatus, PaymentMethod, PhoneError, PhoneNumber, ShippingStatus,
};

use crate::cart::MAX_LINE_QUANTITY;
use crate::db::{InventoryStore, OrderStore, RepositoryError, ShipmentStore};
use crate::models::{LineItem, NewLineItem, NewOrder, Order, Shipment};
use crate::services::assets::{self, AssetStore, relocate_order_assets};
use crate::services::ghn::{FeeRequest, GhnClient, Package, fallback};
use crate::services::inventory::{InventoryReconciler, ReconcileReport};

/// Errors from order operations.
#[derive(Debug, Error)]
pub enum OrderError {
    #[error("{0}")]
    Validation(String),

    #[error("invalid phone number: {0}")]
    InvalidPhone(#[from] PhoneError),

    #[error("unknown inventory item: {0}")]
    UnknownItem(InventoryItemId),

    #[error("order not found: {0}")]
    NotFound(OrderId),

    #[error("order cannot be cancelled: {0}")]
    NotCancellable(&'static str),

    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
}

/// One line of a checkout. Prices come from inventory, never the client.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutLine {
    pub inventory_item_id: InventoryItemId,
    pub quantity: i32,
    #[serde(default)]
    pub design_assets: Vec<String>,
}

/// Checkout form submitted by the customer.
#[derive(Debug, Clone, Deserialize)]
pub struct Checkout {
    pub customer_name: String,
    pub customer_phone: String,
    #[serde(default)]
    pub customer_email: Option<String>,
    pub shipping_address: String,
    #[serde(default)]
    pub to_district_id: Option<i32>,
    #[serde(default)]
    pub to_ward_code: Option<String>,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub note: Option<String>,
    pub lines: Vec<CheckoutLine>,
}

/// A persisted order and the inventory adjustments made for it.
#[derive(Debug, Clone, Serialize)]
pub struct PlacedOrder {
    pub order: Order,
    pub inventory: ReconcileReport,
}

/// Everything the order status page shows.
#[derive(Debug, Clone, Serialize)]
pub struct OrderDetail {
    pub order: Order,
    pub line_items: Vec<LineItem>,
    pub shipment: Option<Shipment>,
}

/// Order lifecycle operations.
#[derive(Clone)]
pub struct OrderService {
    orders: Arc<dyn OrderStore>,
    inventory: Arc<dyn InventoryStore>,
    shipments: Arc<dyn ShipmentStore>,
    assets: Arc<dyn AssetStore>,
    reconciler: InventoryReconciler,
    ghn: GhnClient,
}

impl OrderService {
    #[must_use]
    pub fn new(
        orders: Arc<dyn OrderStore>,
        inventory: Arc<dyn InventoryStore>,
        shipments: Arc<dyn ShipmentStore>,
        assets: Arc<dyn AssetStore>,
        ghn: GhnClient,
    ) -> Self {
        let reconciler = InventoryReconciler::new(orders.clone(), inventory.clone());
        Self {
            orders,
            inventory,
            shipments,
            assets,
            reconciler,
            ghn,
        }
    }

    /// Persist an order, then take its lines out of stock.
    ///
    /// Cash-on-delivery orders are confirmed immediately, so their uploaded
    /// design files are relocated right away. Gateway orders are relocated
    /// when payment succeeds.
    ///
    /// # Errors
    ///
    /// Returns a validation error for bad input, `UnknownItem` for a line
    /// referencing missing inventory, or a repository error if the order
    /// cannot be persisted.
    #[instrument(skip(self, checkout), fields(payment_method = %checkout.payment_method))]
    pub async fn place_order(&self, checkout: &Checkout) -> Result<PlacedOrder, OrderError> {
        validate(checkout)?;
        let customer_phone = PhoneNumber::parse(&checkout.customer_phone)?;

        let mut line_items = Vec::with_capacity(checkout.lines.len());
        for line in &checkout.lines {
            let item = self
                .inventory
                .get_item(line.inventory_item_id)
                .await?
                .ok_or(OrderError::UnknownItem(line.inventory_item_id))?;
            line_items.push(NewLineItem {
                inventory_item_id: item.id,
                quantity: line.quantity,
                unit_price: item.unit_price,
                design_assets: line.design_assets.clone(),
            });
        }

        let subtotal: Decimal = line_items.iter().map(NewLineItem::line_total).sum();
        let shipping_fee = self.quote_shipping(checkout, &line_items, subtotal).await;

        let order = self
            .orders
            .create_order(&NewOrder {
                customer_name: checkout.customer_name.trim().to_string(),
                customer_phone,
                customer_email: non_empty(checkout.customer_email.as_deref()),
                shipping_address: checkout.shipping_address.trim().to_string(),
                to_district_id: checkout.to_district_id,
                to_ward_code: non_empty(checkout.to_ward_code.as_deref()),
                payment_method: checkout.payment_method,
                subtotal,
                shipping_fee,
                total: subtotal + shipping_fee,
                note: non_empty(checkout.note.as_deref()),
                line_items,
            })
            .await?;

        let report = self.reconciler.decrement_on_order_create(order.id).await;
        if !report.is_complete() {
            warn!(order_id = %order.id, message = %report.message, "Inventory only partly updated");
        }

        if order.payment_method == PaymentMethod::Cod
            && let Err(e) =
                relocate_order_assets(self.orders.as_ref(), self.assets.as_ref(), order.id).await
        {
            warn!(order_id = %order.id, error = %e, "Design asset relocation failed");
        }

        info!(order_id = %order.id, total = %order.total, "Order placed");

        Ok(PlacedOrder {
            order,
            inventory: report,
        })
    }

    /// Carrier quote when the destination is known, the flat fee otherwise.
    async fn quote_shipping(
        &self,
        checkout: &Checkout,
        lines: &[NewLineItem],
        subtotal: Decimal,
    ) -> Decimal {
        let (Some(to_district_id), Some(to_ward_code)) = (
            checkout.to_district_id,
            non_empty(checkout.to_ward_code.as_deref()),
        ) else {
            return fallback::fee_quote().total;
        };

        let cases: i32 = lines.iter().map(|line| line.quantity).sum();
        let quote = self
            .ghn
            .fee(&FeeRequest {
                to_district_id,
                to_ward_code,
                package: Package::for_items(u32::try_from(cases).unwrap_or(1)),
                insurance_value: subtotal.trunc().to_i64().unwrap_or_default(),
            })
            .await;
        quote.total
    }

    /// Cancel an order on the customer's behalf and return its stock.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, or `NotCancellable` if the order already has a
    /// carrier shipment or is already completed or cancelled.
    #[instrument(skip(self))]
    pub async fn cancel_order(&self, order_id: OrderId) -> Result<Order, OrderError> {
        let order = self
            .orders
            .get_order(order_id)
            .await?
            .ok_or(OrderError::NotFound(order_id))?;

        if order.has_carrier_order() {
            return Err(OrderError::NotCancellable("order has already been handed to the carrier"));
        }
        if let Some(shipment) = self.shipments.get_by_order(order_id).await?
            && shipment.status != ShippingStatus::Cancelled
        {
            return Err(OrderError::NotCancellable("order has already been handed to the carrier"));
        }
        match order.status {
            OrderStatus::Cancelled => {
                return Err(OrderError::NotCancellable("order is already cancelled"));
            }
            OrderStatus::Completed => {
                return Err(OrderError::NotCancellable("order is already completed"));
            }
            OrderStatus::Pending | OrderStatus::Processing => {}
        }

        // Stock goes back only for the request that actually closed the order.
        if !self.orders.cancel_if_open(order_id).await? {
            return Err(OrderError::NotCancellable("order can no longer be cancelled"));
        }
        info!("Order cancelled");

        let report = self.reconciler.restore_on_order_cancel(order_id).await;
        if !report.is_complete() {
            warn!(message = %report.message, "Inventory only partly restored");
        }

        self.orders
            .get_order(order_id)
            .await?
            .ok_or(OrderError::NotFound(order_id))
    }

    /// Order, line items and latest shipment.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` or a repository error.
    pub async fn order_detail(&self, order_id: OrderId) -> Result<OrderDetail, OrderError> {
        let order = self
            .orders
            .get_order(order_id)
            .await?
            .ok_or(OrderError::NotFound(order_id))?;
        let line_items = self.orders.line_items(order_id).await?;
        let shipment = self.shipments.get_by_order(order_id).await?;

        Ok(OrderDetail {
            order,
            line_items,
            shipment,
        })
    }
}

fn validate(checkout: &Checkout) -> Result<(), OrderError> {
    let invalid = |message: &str| Err(OrderError::Validation(message.to_string()));

    if checkout.customer_name.trim().is_empty() {
        return invalid("customer name is required");
    }
    if checkout.shipping_address.trim().is_empty() {
        return invalid("shipping address is required");
    }
    if checkout.lines.is_empty() {
        return invalid("order has no items");
    }
    for line in &checkout.lines {
        if !u32::try_from(line.quantity).is_ok_and(|q| (1..=MAX_LINE_QUANTITY).contains(&q)) {
            return invalid("item quantity is out of range");
        }
        if line
            .design_assets
            .iter()
            .any(|key| assets::validate_key(key).is_err())
        {
            return invalid("invalid design asset path");
        }
    }
    Ok(())
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}
