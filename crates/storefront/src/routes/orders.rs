//! Checkout and order route handlers.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Serialize;
use tower_sessions::Session;
use tracing::{instrument, warn};

use caseforge_core::{OrderId, PaymentMethod};

use super::ClientIp;
use super::payments::start_payment;
use crate::error::Result;
use crate::error::AppError;
use crate::middleware::session::{cart_key, placed_order, remember_order};
use crate::models::Order;
use crate::services::inventory::ReconcileReport;
use crate::services::orders::{Checkout, OrderDetail};
use crate::state::AppState;

/// Response to a successful checkout.
#[derive(Debug, Serialize)]
pub struct PlacedOrderResponse {
    pub order: Order,
    pub inventory: ReconcileReport,
    /// Where to send the customer for gateway orders. `None` for COD, or if
    /// the payment attempt could not be recorded (retry via the payments
    /// API).
    pub payment_url: Option<String>,
}

/// Place an order from the checkout form.
///
/// The visitor's cart is emptied once the order is persisted.
#[instrument(skip(state, session, checkout))]
pub async fn place(
    State(state): State<AppState>,
    ClientIp(client_ip): ClientIp,
    session: Session,
    Json(checkout): Json<Checkout>,
) -> Result<(StatusCode, Json<PlacedOrderResponse>)> {
    let placed = state.orders().place_order(&checkout).await?;
    remember_order(&session, placed.order.id).await?;

    let payment_url = if placed.order.payment_method == PaymentMethod::Gateway {
        match start_payment(&state, &placed.order, client_ip).await {
            Ok(redirect) => Some(redirect.redirect_url),
            Err(e) => {
                warn!(order_id = %placed.order.id, error = %e, "Payment request failed after checkout");
                None
            }
        }
    } else {
        None
    };

    let key = cart_key(&session).await?;
    state.cart_store(session, key).clear().await;

    Ok((
        StatusCode::CREATED,
        Json(PlacedOrderResponse {
            order: placed.order,
            inventory: placed.inventory,
            payment_url,
        }),
    ))
}

/// Orders are only visible to the session that placed them. Anyone else
/// gets the same 404 as for an order that does not exist.
pub(crate) async fn require_placed(session: &Session, id: OrderId) -> Result<()> {
    if placed_order(session, id).await? {
        Ok(())
    } else {
        Err(AppError::NotFound(format!("order {id}")))
    }
}

/// Order status page data.
#[instrument(skip(state, session))]
pub async fn show(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<OrderId>,
) -> Result<Json<OrderDetail>> {
    require_placed(&session, id).await?;
    Ok(Json(state.orders().order_detail(id).await?))
}

/// Customer cancel.
#[instrument(skip(state, session))]
pub async fn cancel(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<OrderId>,
) -> Result<Json<Order>> {
    require_placed(&session, id).await?;
    Ok(Json(state.orders().cancel_order(id).await?))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use crate::routes::test_support::{
        TestApp, body_json, empty_request, json_request, session_cookie, with_cookie,
    };

    fn checkout(item: i64, method: &str) -> serde_json::Value {
        json!({
            "customer_name": "Trần Thị Mai",
            "customer_phone": "0912 345 678",
            "shipping_address": "12 Lý Thường Kiệt, Hoàn Kiếm, Hà Nội",
            "payment_method": method,
            "lines": [{ "inventory_item_id": item, "quantity": 2 }]
        })
    }

    #[tokio::test]
    async fn test_cod_checkout_has_no_payment_url() {
        let app = TestApp::new();
        let item = app.seed_item("iPhone 15", 5).await;

        let response = app
            .send(json_request("POST", "/api/orders", &checkout(item.as_i64(), "cod")))
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let body = body_json(response).await;
        assert!(body["payment_url"].is_null());
        assert_eq!(body["inventory"]["success"], true);
        assert_eq!(app.store.quantity(item).await, Some(3));
    }

    #[tokio::test]
    async fn test_gateway_checkout_returns_signed_url() {
        let app = TestApp::new();
        let item = app.seed_item("Galaxy S24", 5).await;

        let response = app
            .send(json_request("POST", "/api/orders", &checkout(item.as_i64(), "gateway")))
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let body = body_json(response).await;
        let url = body["payment_url"].as_str().unwrap();
        assert!(url.starts_with(&app.config.vnpay.payment_url));
        assert!(url.contains("vnp_SecureHash="));
    }

    #[tokio::test]
    async fn test_invalid_checkout_is_rejected() {
        let app = TestApp::new();
        let item = app.seed_item("Pixel 8", 5).await;
        let mut body = checkout(item.as_i64(), "cod");
        body["customer_phone"] = json!("12345");

        let response = app.send(json_request("POST", "/api/orders", &body)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(app.store.quantity(item).await, Some(5));
    }

    /// Place a COD order and return its id with the placing session's cookie.
    async fn place_cod(app: &TestApp, item: i64) -> (i64, String) {
        let response = app
            .send(json_request("POST", "/api/orders", &checkout(item, "cod")))
            .await;
        let cookie = session_cookie(&response);
        let placed = body_json(response).await;
        (placed["order"]["id"].as_i64().unwrap(), cookie)
    }

    #[tokio::test]
    async fn test_show_and_cancel() {
        let app = TestApp::new();
        let item = app.seed_item("iPhone 15", 5).await;
        let (id, cookie) = place_cod(&app, item.as_i64()).await;

        let response = app
            .send(with_cookie(empty_request("GET", &format!("/api/orders/{id}")), &cookie))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let detail = body_json(response).await;
        assert_eq!(detail["line_items"].as_array().unwrap().len(), 1);
        assert!(detail["shipment"].is_null());

        let cancel_uri = format!("/api/orders/{id}/cancel");
        let response = app
            .send(with_cookie(empty_request("POST", &cancel_uri), &cookie))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(app.store.quantity(item).await, Some(5));

        let response = app
            .send(with_cookie(empty_request("POST", &cancel_uri), &cookie))
            .await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_other_visitors_cannot_see_or_cancel() {
        let app = TestApp::new();
        let item = app.seed_item("iPhone 15", 5).await;
        let (id, _) = place_cod(&app, item.as_i64()).await;

        let response = app.send(empty_request("GET", &format!("/api/orders/{id}"))).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .send(empty_request("POST", &format!("/api/orders/{id}/cancel")))
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(app.store.quantity(item).await, Some(3));

        // A different visitor with their own session fares no better.
        let (_, stranger) = place_cod(&app, item.as_i64()).await;
        let response = app
            .send(with_cookie(
                empty_request("POST", &format!("/api/orders/{id}/cancel")),
                &stranger,
            ))
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(app.store.quantity(item).await, Some(1));
    }

    #[tokio::test]
    async fn test_unknown_order_is_not_found() {
        let app = TestApp::new();
        let response = app.send(empty_request("GET", "/api/orders/404")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
