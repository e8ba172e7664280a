//! Carrier webhook boundaries.
//!
//! The carrier retries any non-200 answer, so these handlers answer 200 for
//! every input. Problems are logged and nothing else.

use axum::{Json, body::Bytes, extract::State};
use serde_json::{Value, json};
use tracing::{error, info, instrument, warn};

use crate::error::add_breadcrumb;
use crate::services::ghn::WebhookPayload;
use crate::services::shipping::ShippingError;
use crate::state::AppState;

fn acknowledged() -> Json<Value> {
    Json(json!({ "code": 200, "message": "Success" }))
}

/// Shipment status update from the carrier.
#[instrument(skip_all)]
pub async fn ghn(State(state): State<AppState>, body: Bytes) -> Json<Value> {
    let payload: WebhookPayload = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(error = %e, "Ignoring unreadable carrier webhook");
            return acknowledged();
        }
    };

    if payload.order_code.trim().is_empty() {
        warn!(status = %payload.status, "Carrier webhook without an order code");
        return acknowledged();
    }

    add_breadcrumb(
        "shipping",
        "Carrier webhook received",
        Some(&[
            ("order_code", payload.order_code.as_str()),
            ("status", payload.status.as_str()),
        ]),
    );

    match state.shipping().apply_webhook(&payload).await {
        Ok(shipment) => info!(
            order_id = %shipment.order_id,
            order_code = %shipment.carrier_order_code,
            status = %shipment.status,
            "Carrier webhook applied"
        ),
        Err(ShippingError::UnknownShipment(code)) => {
            warn!(order_code = %code, "Carrier webhook for unknown shipment");
        }
        Err(e) => error!(order_code = %payload.order_code, error = %e, "Carrier webhook failed"),
    }

    acknowledged()
}

/// Reachability ping used while registering the webhook.
pub async fn ghn_test(body: Bytes) -> Json<Value> {
    info!(bytes = body.len(), "Carrier test webhook received");
    acknowledged()
}
