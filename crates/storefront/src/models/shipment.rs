//! Carrier shipments.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use caseforge_core::{OrderId, ShipmentId, ShippingStatus};

/// A shipment booked with the carrier for an order.
#[derive(Debug, Clone, Serialize)]
pub struct Shipment {
    pub id: ShipmentId,
    pub order_id: OrderId,
    pub carrier_order_code: String,
    /// Raw status string last reported by the carrier.
    pub carrier_status: String,
    pub status: ShippingStatus,
    pub tracking_url: String,
    pub fee: Decimal,
    pub expected_delivery: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Data needed to insert a shipment.
#[derive(Debug, Clone)]
pub struct NewShipment {
    pub order_id: OrderId,
    pub carrier_order_code: String,
    pub carrier_status: String,
    pub status: ShippingStatus,
    pub tracking_url: String,
    pub fee: Decimal,
    pub expected_delivery: Option<DateTime<Utc>>,
}
