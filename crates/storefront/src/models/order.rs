//! Orders and their line items.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use caseforge_core::{
    InventoryItemId, LineItemId, OrderId, OrderStatus, PaymentMethod, PaymentStatus, PhoneNumber,
    Price,
};

/// A placed order.
#[derive(Debug, Clone, Serialize)]
pub struct Order {
    pub id: OrderId,
    pub customer_name: String,
    pub customer_phone: PhoneNumber,
    pub customer_email: Option<String>,
    /// Full shipping address as a single display string.
    pub shipping_address: String,
    /// Carrier district of the destination, needed to book a shipment.
    pub to_district_id: Option<i32>,
    /// Carrier ward of the destination, needed to book a shipment.
    pub to_ward_code: Option<String>,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub status: OrderStatus,
    pub subtotal: Decimal,
    pub shipping_fee: Decimal,
    pub total: Decimal,
    pub carrier_order_code: Option<String>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Whether a carrier shipment has been booked for this order.
    ///
    /// An order with a shipment cannot be cancelled by the customer.
    #[must_use]
    pub const fn has_carrier_order(&self) -> bool {
        self.carrier_order_code.is_some()
    }

    /// The order total as a [`Price`].
    #[must_use]
    pub const fn total_price(&self) -> Price {
        Price::vnd(self.total)
    }
}

/// One line of an order.
#[derive(Debug, Clone, Serialize)]
pub struct LineItem {
    pub id: LineItemId,
    pub order_id: OrderId,
    pub inventory_item_id: InventoryItemId,
    pub quantity: i32,
    pub unit_price: Decimal,
    /// Storage paths of the customer's design files.
    pub design_assets: Vec<String>,
}

/// Data needed to insert an order.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub customer_name: String,
    pub customer_phone: PhoneNumber,
    pub customer_email: Option<String>,
    pub shipping_address: String,
    pub to_district_id: Option<i32>,
    pub to_ward_code: Option<String>,
    pub payment_method: PaymentMethod,
    pub subtotal: Decimal,
    pub shipping_fee: Decimal,
    pub total: Decimal,
    pub note: Option<String>,
    pub line_items: Vec<NewLineItem>,
}

/// Data needed to insert a line item.
#[derive(Debug, Clone)]
pub struct NewLineItem {
    pub inventory_item_id: InventoryItemId,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub design_assets: Vec<String>,
}

impl NewLineItem {
    /// `unit_price × quantity`.
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}
