//! Carrier lookups, fee quotes and shipment management.
//!
//! Geography and fee lookups always answer: when the carrier is down the
//! response carries static data and `degraded: true`. Shipment booking,
//! cancellation and refresh are back-office operations behind [`AdminToken`].

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use caseforge_core::OrderId;

use super::AdminToken;
use crate::error::{AppError, Result};
use crate::models::Shipment;
use crate::services::ghn::{District, FeeQuote, FeeRequest, Package, Province, Ward};
use crate::state::AppState;

/// Lookup result, flagged when it came from the static fallback.
#[derive(Debug, Serialize)]
pub struct Lookup<T> {
    pub data: T,
    pub degraded: bool,
}

impl<T> Lookup<T> {
    fn new(state: &AppState, data: T) -> Json<Self> {
        Json(Self {
            data,
            degraded: !state.ghn().circuit().is_available(),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct DistrictQuery {
    pub province_id: i32,
}

#[derive(Debug, Deserialize)]
pub struct WardQuery {
    pub district_id: i32,
}

/// Fee quote form.
#[derive(Debug, Deserialize)]
pub struct FeeForm {
    pub to_district_id: i32,
    pub to_ward_code: String,
    #[serde(default = "default_item_count")]
    pub item_count: u32,
    /// Declared value in VND.
    #[serde(default)]
    pub insurance_value: i64,
}

const fn default_item_count() -> u32 {
    1
}

pub async fn provinces(
    State(state): State<AppState>,
) -> Json<Lookup<Vec<Province>>> {
    let data = state.ghn().provinces().await;
    Lookup::new(&state, data)
}

pub async fn districts(
    State(state): State<AppState>,
    Query(query): Query<DistrictQuery>,
) -> Json<Lookup<Vec<District>>> {
    let data = state.ghn().districts(query.province_id).await;
    Lookup::new(&state, data)
}

pub async fn wards(
    State(state): State<AppState>,
    Query(query): Query<WardQuery>,
) -> Json<Lookup<Vec<Ward>>> {
    let data = state.ghn().wards(query.district_id).await;
    Lookup::new(&state, data)
}

/// Quote the delivery fee. Estimates are flagged with `estimated: true`.
#[instrument(skip(state, form), fields(to_district_id = form.to_district_id))]
pub async fn fee(State(state): State<AppState>, Json(form): Json<FeeForm>) -> Result<Json<FeeQuote>> {
    if form.to_ward_code.trim().is_empty() {
        return Err(AppError::BadRequest("Ward is required".to_string()));
    }
    if form.insurance_value < 0 {
        return Err(AppError::BadRequest("Declared value cannot be negative".to_string()));
    }

    let quote = state
        .ghn()
        .fee(&FeeRequest {
            to_district_id: form.to_district_id,
            to_ward_code: form.to_ward_code.trim().to_string(),
            package: Package::for_items(form.item_count.max(1)),
            insurance_value: form.insurance_value,
        })
        .await;
    Ok(Json(quote))
}

/// Book a carrier shipment for an order.
#[instrument(skip(state))]
pub async fn create(
    _: AdminToken,
    State(state): State<AppState>,
    Path(order_id): Path<OrderId>,
) -> Result<(StatusCode, Json<Shipment>)> {
    let shipment = state.shipping().create_shipment(order_id).await?;
    Ok((StatusCode::CREATED, Json(shipment)))
}

#[instrument(skip(state))]
pub async fn cancel(
    _: AdminToken,
    State(state): State<AppState>,
    Path(order_id): Path<OrderId>,
) -> Result<Json<Shipment>> {
    Ok(Json(state.shipping().cancel_shipment(order_id).await?))
}

/// Pull the latest status from the carrier.
#[instrument(skip(state))]
pub async fn refresh(
    _: AdminToken,
    State(state): State<AppState>,
    Path(order_id): Path<OrderId>,
) -> Result<Json<Shipment>> {
    Ok(Json(state.shipping().refresh_status(order_id).await?))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use axum::body::Body;
    use axum::http::{Request, header};

    use crate::config::TEST_ADMIN_TOKEN;
    use crate::routes::test_support::{TestApp, body_json, empty_request, json_request};
    use crate::services::ghn::client::tests::spawn_stub;

    async fn stubbed_app() -> TestApp {
        let addr = spawn_stub().await;
        TestApp::with_config(|config| config.ghn.api_url = format!("http://{addr}"))
    }

    #[tokio::test]
    async fn test_lookups_fall_back_when_carrier_is_down() {
        let app = TestApp::new();

        let response = app.send(empty_request("GET", "/api/shipping/provinces")).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["degraded"], true);
        assert!(!body["data"].as_array().unwrap().is_empty());

        let body = body_json(
            app.send(json_request(
                "POST",
                "/api/shipping/fee",
                &json!({ "to_district_id": 1442, "to_ward_code": "20109", "item_count": 2 }),
            ))
            .await,
        )
        .await;
        assert_eq!(body["estimated"], true);
    }

    #[tokio::test]
    async fn test_lookups_from_carrier() {
        let app = stubbed_app().await;

        let body = body_json(
            app.send(empty_request("GET", "/api/shipping/districts?province_id=202"))
                .await,
        )
        .await;
        assert_eq!(body["degraded"], false);
        assert_eq!(body["data"][0]["district_id"], 1454);

        let body = body_json(
            app.send(json_request(
                "POST",
                "/api/shipping/fee",
                &json!({ "to_district_id": 1454, "to_ward_code": "21012" }),
            ))
            .await,
        )
        .await;
        assert_eq!(body["estimated"], false);
    }

    #[tokio::test]
    async fn test_fee_requires_ward() {
        let app = TestApp::new();
        let response = app
            .send(json_request(
                "POST",
                "/api/shipping/fee",
                &json!({ "to_district_id": 1442, "to_ward_code": " " }),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    fn admin(mut request: Request<Body>) -> Request<Body> {
        request.headers_mut().insert(
            header::AUTHORIZATION,
            format!("Bearer {TEST_ADMIN_TOKEN}").parse().unwrap(),
        );
        request
    }

    #[tokio::test]
    async fn test_shipment_routes_require_admin_token() {
        let app = TestApp::new();
        let uri = "/api/shipping/orders/1";

        let response = app.send(empty_request("POST", uri)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let mut wrong = empty_request("GET", uri);
        wrong
            .headers_mut()
            .insert(header::AUTHORIZATION, "Bearer R4ZT8WQK2MVN7HPX".parse().unwrap());
        assert_eq!(app.send(wrong).await.status(), StatusCode::UNAUTHORIZED);

        let response = app.send(admin(empty_request("POST", uri))).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        // No configured token locks the routes entirely.
        let locked = TestApp::with_config(|config| config.admin_token = None);
        let response = locked.send(admin(empty_request("POST", uri))).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_shipment_lifecycle() {
        let app = stubbed_app().await;
        let item = app.seed_item("iPhone 15", 5).await;
        let placed = body_json(
            app.send(json_request(
                "POST",
                "/api/orders",
                &json!({
                    "customer_name": "Phạm Quốc Bảo",
                    "customer_phone": "0987654321",
                    "shipping_address": "88 Cách Mạng Tháng 8, Quận 10, TP.HCM",
                    "to_district_id": 1454,
                    "to_ward_code": "21012",
                    "payment_method": "cod",
                    "lines": [{ "inventory_item_id": item.as_i64(), "quantity": 1 }]
                }),
            ))
            .await,
        )
        .await;
        let id = placed["order"]["id"].as_i64().unwrap();
        let uri = format!("/api/shipping/orders/{id}");

        let response = app.send(admin(empty_request("POST", &uri))).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let shipment = body_json(response).await;
        assert_eq!(shipment["carrier_order_code"], format!("GHN{id}").as_str());

        let response = app.send(admin(empty_request("POST", &uri))).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let refreshed = body_json(app.send(admin(empty_request("GET", &uri))).await).await;
        assert_eq!(refreshed["status"], "delivering");

        let response = app
            .send(admin(empty_request("POST", &format!("{uri}/cancel"))))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "cancelled");
    }
}
