//! GHN request and response types.
//!
//! Geography types deserialize from the carrier's PascalCase field names
//! and serialize in snake case for the storefront API.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use caseforge_core::ShippingStatus;

/// Weight charged per phone case, in grams.
pub const ITEM_WEIGHT_GRAMS: u32 = 200;

/// Standard parcel size in centimetres (length, width, height).
pub const PARCEL_DIMENSIONS_CM: (u32, u32, u32) = (20, 15, 5);

/// GHN standard delivery service.
pub(crate) const SERVICE_TYPE_STANDARD: u8 = 2;

/// Every GHN response is wrapped in `{code, message, data}`.
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    pub code: i64,
    #[serde(default)]
    pub message: String,
    pub data: Option<T>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Province {
    #[serde(rename(deserialize = "ProvinceID"))]
    pub province_id: i32,
    #[serde(rename(deserialize = "ProvinceName"))]
    pub province_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct District {
    #[serde(rename(deserialize = "DistrictID"))]
    pub district_id: i32,
    #[serde(rename(deserialize = "ProvinceID"))]
    pub province_id: i32,
    #[serde(rename(deserialize = "DistrictName"))]
    pub district_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ward {
    #[serde(rename(deserialize = "WardCode"))]
    pub ward_code: String,
    #[serde(rename(deserialize = "DistrictID"))]
    pub district_id: i32,
    #[serde(rename(deserialize = "WardName"))]
    pub ward_name: String,
}

/// Parcel weight and size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    /// Grams.
    pub weight: u32,
    pub length: u32,
    pub width: u32,
    pub height: u32,
}

impl Package {
    /// Standard parcel for `count` cases.
    #[must_use]
    pub const fn for_items(count: u32) -> Self {
        let count = if count == 0 { 1 } else { count };
        let (length, width, height) = PARCEL_DIMENSIONS_CM;
        Self {
            weight: ITEM_WEIGHT_GRAMS * count,
            length,
            width,
            height,
        }
    }
}

/// Input for a fee quote. The origin comes from configuration.
#[derive(Debug, Clone)]
pub struct FeeRequest {
    pub to_district_id: i32,
    pub to_ward_code: String,
    pub package: Package,
    /// Declared value in VND.
    pub insurance_value: i64,
}

/// A shipping fee quote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeeQuote {
    pub total: Decimal,
    pub service_fee: Decimal,
    pub insurance_fee: Decimal,
    /// Flat advisory figure used while the carrier is unreachable.
    pub estimated: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FeeData {
    pub total: i64,
    #[serde(default)]
    pub service_fee: i64,
    #[serde(default)]
    pub insurance_fee: i64,
}

impl From<FeeData> for FeeQuote {
    fn from(data: FeeData) -> Self {
        Self {
            total: Decimal::from(data.total),
            service_fee: Decimal::from(data.service_fee),
            insurance_fee: Decimal::from(data.insurance_fee),
            estimated: false,
        }
    }
}

/// One line on the carrier's shipping order.
#[derive(Debug, Clone, Serialize)]
pub struct ShipmentItem {
    pub name: String,
    pub quantity: u32,
    /// Grams.
    pub weight: u32,
}

/// Input for creating a carrier shipping order.
#[derive(Debug, Clone)]
pub struct CreateShipment {
    /// Our order ID, echoed back by the carrier.
    pub client_order_code: String,
    pub to_name: String,
    pub to_phone: String,
    pub to_address: String,
    pub to_district_id: i32,
    pub to_ward_code: String,
    /// Amount the carrier collects on delivery (zero for prepaid orders).
    pub cod_amount: i64,
    pub insurance_value: i64,
    pub package: Package,
    pub items: Vec<ShipmentItem>,
    pub note: Option<String>,
}

/// A shipping order accepted by the carrier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreatedShipment {
    pub order_code: String,
    pub total_fee: Decimal,
    pub expected_delivery: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreatedData {
    pub order_code: String,
    #[serde(default)]
    pub total_fee: i64,
    #[serde(default)]
    pub expected_delivery_time: Option<String>,
}

impl From<CreatedData> for CreatedShipment {
    fn from(data: CreatedData) -> Self {
        Self {
            order_code: data.order_code,
            total_fee: Decimal::from(data.total_fee),
            expected_delivery: data
                .expected_delivery_time
                .as_deref()
                .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
                .map(|t| t.with_timezone(&Utc)),
        }
    }
}

/// Per-order result of a cancel request.
#[derive(Debug, Clone, Deserialize)]
pub struct CancelResult {
    pub order_code: String,
    pub result: bool,
    #[serde(default)]
    pub message: String,
}

/// Current carrier-side state of a shipping order.
#[derive(Debug, Clone, Deserialize)]
pub struct ShipmentDetail {
    pub order_code: String,
    pub status: String,
}

/// Status callback posted by the carrier.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookPayload {
    #[serde(rename = "OrderCode", default)]
    pub order_code: String,
    #[serde(rename = "Status", default)]
    pub status: String,
    #[serde(rename = "Type", default)]
    pub kind: Option<String>,
    #[serde(rename = "ClientOrderCode", default)]
    pub client_order_code: Option<String>,
}

/// Normalise a carrier status onto [`ShippingStatus`].
///
/// Unrecognised values map to `Pending`.
#[must_use]
pub fn map_status(carrier_status: &str) -> ShippingStatus {
    match carrier_status.trim().to_ascii_lowercase().as_str() {
        "ready_to_pick" => ShippingStatus::ReadyToPick,
        "picking" | "money_collect_picking" => ShippingStatus::Picking,
        "picked" | "storing" | "transporting" | "sorting" => ShippingStatus::Picked,
        "delivering" | "money_collect_delivering" => ShippingStatus::Delivering,
        "delivered" => ShippingStatus::Delivered,
        "delivery_fail" | "delivery_failed" => ShippingStatus::DeliveryFailed,
        "waiting_to_return" | "return" | "return_transporting" | "return_sorting"
        | "returning" | "return_fail" | "returned" => ShippingStatus::Returned,
        "cancel" | "cancelled" => ShippingStatus::Cancelled,
        _ => ShippingStatus::Pending,
    }
}
