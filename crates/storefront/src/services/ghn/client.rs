//! HTTP client for the GHN public API.

use std::sync::Arc;

use reqwest::Method;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, instrument, warn};

use super::types::{
    CancelResult, CreateShipment, CreatedData, CreatedShipment, District, Envelope, FeeData,
    FeeQuote, FeeRequest, Province, SERVICE_TYPE_STANDARD, ShipmentDetail, Ward,
};
use super::{CircuitState, GhnError, fallback};
use crate::config::GhnConfig;

/// Public tracking page for a carrier order.
const TRACKING_BASE_URL: &str = "https://donhang.ghn.vn/?order_code=";

/// The shop pays the carrier; COD covers goods only.
const PAYMENT_TYPE_SHOP_PAYS: u8 = 1;

/// Customers may not open the parcel before accepting it.
const REQUIRED_NOTE: &str = "KHONGCHOXEMHANG";

/// Customer-facing tracking URL for a carrier order code.
#[must_use]
pub fn tracking_url(order_code: &str) -> String {
    format!("{TRACKING_BASE_URL}{order_code}")
}

/// GHN API client.
///
/// Cheap to clone; clones share the connection pool and [`CircuitState`].
#[derive(Clone)]
pub struct GhnClient {
    inner: Arc<GhnClientInner>,
}

struct GhnClientInner {
    http: reqwest::Client,
    base_url: String,
    from_district_id: i32,
    from_ward_code: Option<String>,
    circuit: CircuitState,
}

impl GhnClient {
    /// Create a new GHN client.
    ///
    /// # Errors
    ///
    /// Returns `GhnError::Config` if the token or shop ID are not valid
    /// header values, or `GhnError::Http` if the HTTP client fails to build.
    pub fn new(config: &GhnConfig) -> Result<Self, GhnError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "Token",
            HeaderValue::from_str(config.token.expose_secret())
                .map_err(|e| GhnError::Config(format!("invalid token: {e}")))?,
        );
        headers.insert(
            "ShopId",
            HeaderValue::from_str(&config.shop_id)
                .map_err(|e| GhnError::Config(format!("invalid shop ID: {e}")))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            inner: Arc::new(GhnClientInner {
                http,
                base_url: config.api_url.trim_end_matches('/').to_string(),
                from_district_id: config.from_district_id,
                from_ward_code: config.from_ward_code.clone(),
                circuit: CircuitState::default(),
            }),
        })
    }

    /// Availability flag for this client.
    #[must_use]
    pub fn circuit(&self) -> &CircuitState {
        &self.inner.circuit
    }

    /// Call an endpoint and unwrap its envelope, updating the circuit state.
    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<T, GhnError> {
        let result = self.send(method, path, body).await;
        match &result {
            Ok(_) => self.inner.circuit.mark_up(),
            Err(e) => {
                warn!(path, error = %e, "GHN request failed");
                self.inner.circuit.mark_down();
            }
        }
        result
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<T, GhnError> {
        let url = format!("{}/{path}", self.inner.base_url);
        let mut request = self.inner.http.request(method, &url);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;
        debug!(path, status = status.as_u16(), "GHN response");

        let envelope: Envelope<T> =
            serde_json::from_slice(&bytes).map_err(|e| GhnError::Api {
                code: i64::from(status.as_u16()),
                message: if status.is_success() {
                    format!("malformed response: {e}")
                } else {
                    String::from_utf8_lossy(&bytes).into_owned()
                },
            })?;

        if envelope.code != 200 {
            return Err(GhnError::Api {
                code: envelope.code,
                message: envelope.message,
            });
        }
        envelope.data.ok_or(GhnError::MissingData)
    }

    /// All provinces, or the static list if the carrier is unreachable.
    #[instrument(skip(self))]
    pub async fn provinces(&self) -> Vec<Province> {
        self.call(Method::GET, "master-data/province", None)
            .await
            .unwrap_or_else(|_| fallback::provinces())
    }

    /// Districts of a province, or the static list if the carrier is unreachable.
    #[instrument(skip(self))]
    pub async fn districts(&self, province_id: i32) -> Vec<District> {
        self.call(
            Method::POST,
            "master-data/district",
            Some(json!({ "province_id": province_id })),
        )
        .await
        .unwrap_or_else(|_| fallback::districts(province_id))
    }

    /// Wards of a district, or the static list if the carrier is unreachable.
    #[instrument(skip(self))]
    pub async fn wards(&self, district_id: i32) -> Vec<Ward> {
        self.call(
            Method::POST,
            "master-data/ward",
            Some(json!({ "district_id": district_id })),
        )
        .await
        .unwrap_or_else(|_| fallback::wards(district_id))
    }

    /// Quote a fee from the configured warehouse.
    ///
    /// Falls back to a flat estimate (`estimated = true`) on failure.
    #[instrument(skip(self, request), fields(to_district_id = request.to_district_id))]
    pub async fn fee(&self, request: &FeeRequest) -> FeeQuote {
        let body = json!({
            "service_type_id": SERVICE_TYPE_STANDARD,
            "from_district_id": self.inner.from_district_id,
            "from_ward_code": self.inner.from_ward_code,
            "to_district_id": request.to_district_id,
            "to_ward_code": request.to_ward_code,
            "weight": request.package.weight,
            "length": request.package.length,
            "width": request.package.width,
            "height": request.package.height,
            "insurance_value": request.insurance_value,
        });

        self.call::<FeeData>(Method::POST, "v2/shipping-order/fee", Some(body))
            .await
            .map_or_else(|_| fallback::fee_quote(), FeeQuote::from)
    }

    /// Create a shipping order.
    ///
    /// # Errors
    ///
    /// Returns an error if the carrier rejects the order or is unreachable.
    #[instrument(skip(self, request), fields(client_order_code = %request.client_order_code))]
    pub async fn create_order(&self, request: &CreateShipment) -> Result<CreatedShipment, GhnError> {
        let body = json!({
            "payment_type_id": PAYMENT_TYPE_SHOP_PAYS,
            "service_type_id": SERVICE_TYPE_STANDARD,
            "required_note": REQUIRED_NOTE,
            "client_order_code": request.client_order_code,
            "to_name": request.to_name,
            "to_phone": request.to_phone,
            "to_address": request.to_address,
            "to_district_id": request.to_district_id,
            "to_ward_code": request.to_ward_code,
            "cod_amount": request.cod_amount,
            "insurance_value": request.insurance_value,
            "weight": request.package.weight,
            "length": request.package.length,
            "width": request.package.width,
            "height": request.package.height,
            "items": request.items,
            "note": request.note,
        });

        let created: CreatedData = self
            .call(Method::POST, "v2/shipping-order/create", Some(body))
            .await?;
        Ok(created.into())
    }

    /// Cancel a shipping order.
    ///
    /// # Errors
    ///
    /// Returns an error if the carrier is unreachable or does not report a
    /// result for the order.
    #[instrument(skip(self))]
    pub async fn cancel_order(&self, order_code: &str) -> Result<CancelResult, GhnError> {
        let results: Vec<CancelResult> = self
            .call(
                Method::POST,
                "v2/switch-status/cancel",
                Some(json!({ "order_codes": [order_code] })),
            )
            .await?;

        results
            .into_iter()
            .find(|r| r.order_code == order_code)
            .ok_or(GhnError::MissingData)
    }

    /// Fetch the carrier's current view of a shipping order.
    ///
    /// # Errors
    ///
    /// Returns an error if the carrier is unreachable or rejects the code.
    #[instrument(skip(self))]
    pub async fn order_detail(&self, order_code: &str) -> Result<ShipmentDetail, GhnError> {
        self.call(
            Method::POST,
            "v2/shipping-order/detail",
            Some(json!({ "order_code": order_code })),
        )
        .await
    }
}
