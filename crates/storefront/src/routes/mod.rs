//! HTTP route handlers for the storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                 - Liveness check
//! GET  /health/ready           - Readiness check (database)
//!
//! # Orders
//! POST /api/orders                          - Checkout
//! GET  /api/orders/{id}                     - Order detail
//! POST /api/orders/{id}/cancel              - Customer cancel
//!
//! # Payments (VNPay)
//! GET  /api/payments/vnpay/ipn              - Server-to-server callback (also POST)
//! GET  /api/payments/vnpay/return           - Browser return, always redirects
//! POST /api/payments/vnpay/retry/{order_id} - New attempt for an unpaid order
//!
//! # Shipping (GHN)
//! GET  /api/shipping/provinces
//! GET  /api/shipping/districts?province_id=
//! GET  /api/shipping/wards?district_id=
//! POST /api/shipping/fee
//! POST /api/shipping/orders/{order_id}        - Book a shipment
//! GET  /api/shipping/orders/{order_id}        - Refresh carrier status
//! POST /api/shipping/orders/{order_id}/cancel - Cancel the shipment
//!
//! # Webhooks
//! POST /api/webhooks/ghn       - Carrier status updates
//! POST /api/webhooks/ghn/test  - Reachability ping
//!
//! # Cart
//! GET    /api/cart
//! DELETE /api/cart
//! POST   /api/cart/items
//! PATCH  /api/cart/items/{line_id}
//! DELETE /api/cart/items/{line_id}
//!
//! # Design uploads
//! POST /api/uploads            - Multipart upload into temp/{session}/
//! GET  /assets/*               - Uploaded files
//! ```

pub mod cart;
pub mod health;
pub mod orders;
pub mod payments;
pub mod shipping;
pub mod uploads;
pub mod webhooks;

use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};

use axum::{
    Router,
    extract::{ConnectInfo, DefaultBodyLimit, FromRequestParts},
    http::{header, request::Parts},
    routing::{get, patch, post},
};
use secrecy::ExposeSecret;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::error::AppError;
use crate::middleware::request_id_middleware;
use crate::services::vnpay::signature::constant_time_compare;
use crate::state::AppState;

/// Fallback when neither a proxy header nor the socket address is known.
const UNKNOWN_CLIENT_IP: &str = "127.0.0.1";

/// Client IP address.
///
/// Uses the socket peer. Only when `trust_proxy_headers` is configured does
/// it take `x-forwarded-for` (first hop), then `x-real-ip`, from the reverse
/// proxy instead. The gateway requires some address, so this never rejects.
#[derive(Debug, Clone)]
pub struct ClientIp(pub String);

impl FromRequestParts<AppState> for ClientIp {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let forwarded_header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split(',').next())
                .map(str::trim)
                .filter(|v| v.parse::<IpAddr>().is_ok())
                .map(String::from)
        };

        let forwarded = if state.config().trust_proxy_headers {
            forwarded_header("x-forwarded-for").or_else(|| forwarded_header("x-real-ip"))
        } else {
            None
        };

        let ip = forwarded
            .or_else(|| {
                parts
                    .extensions
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|ConnectInfo(addr)| addr.ip().to_string())
            })
            .unwrap_or_else(|| UNKNOWN_CLIENT_IP.to_string());

        Ok(Self(ip))
    }
}

/// Guard for back-office routes: `Authorization: Bearer <STOREFRONT_ADMIN_TOKEN>`.
///
/// With no token configured every request is refused.
#[derive(Debug, Clone, Copy)]
pub struct AdminToken;

impl FromRequestParts<AppState> for AdminToken {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(expected) = state.config().admin_token.as_ref() else {
            return Err(AppError::Unauthorized);
        };
        let provided = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .unwrap_or_default();

        if provided.is_empty() || !constant_time_compare(provided, expected.expose_secret()) {
            return Err(AppError::Unauthorized);
        }
        Ok(Self)
    }
}

/// Create the order routes router.
pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(orders::place))
        .route("/{id}", get(orders::show))
        .route("/{id}/cancel", post(orders::cancel))
}

/// Create the payment routes router.
pub fn payment_routes() -> Router<AppState> {
    Router::new()
        .route("/vnpay/ipn", get(payments::ipn).post(payments::ipn))
        .route("/vnpay/return", get(payments::vnpay_return))
        .route("/vnpay/retry/{order_id}", post(payments::retry))
}

/// Create the shipping routes router.
pub fn shipping_routes() -> Router<AppState> {
    Router::new()
        .route("/provinces", get(shipping::provinces))
        .route("/districts", get(shipping::districts))
        .route("/wards", get(shipping::wards))
        .route("/fee", post(shipping::fee))
        .route(
            "/orders/{order_id}",
            get(shipping::refresh).post(shipping::create),
        )
        .route("/orders/{order_id}/cancel", post(shipping::cancel))
}

/// Create the webhook routes router.
pub fn webhook_routes() -> Router<AppState> {
    Router::new()
        .route("/ghn", post(webhooks::ghn))
        .route("/ghn/test", post(webhooks::ghn_test))
}

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show).delete(cart::clear))
        .route("/items", post(cart::add))
        .route(
            "/items/{line_id}",
            patch(cart::update).delete(cart::remove),
        )
}

/// Create all routes for the storefront.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .nest("/api/orders", order_routes())
        .nest("/api/payments", payment_routes())
        .nest("/api/shipping", shipping_routes())
        .nest("/api/webhooks", webhook_routes())
        .nest("/api/cart", cart_routes())
        .route(
            "/api/uploads",
            post(uploads::upload).layer(DefaultBodyLimit::max(uploads::MAX_UPLOAD_BYTES)),
        )
}

/// The full application router with state, static assets, request IDs and
/// tracing. The session and Sentry layers are added by the caller.
pub fn app(state: AppState) -> Router {
    let assets = ServeDir::new(state.config().asset_dir.clone());

    routes()
        .nest_service("/assets", assets)
        .layer(axum::middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, Response, header};
    use rust_decimal::Decimal;
    use serde_json::Value;
    use tempfile::TempDir;
    use tower::ServiceExt;
    use tower_sessions::MemoryStore as SessionMemoryStore;

    use caseforge_core::InventoryItemId;

    use super::app;
    use crate::config::{StorefrontConfig, test_config};
    use crate::db::{InventoryStore, MemoryStore, Stores};
    use crate::middleware::configure_session_layer;
    use crate::state::AppState;

    /// An app over in-memory stores with a temporary asset directory.
    pub struct TestApp {
        pub router: axum::Router,
        pub store: Arc<MemoryStore>,
        pub state: AppState,
        pub config: StorefrontConfig,
        _dir: TempDir,
    }

    impl TestApp {
        pub fn with_config(edit: impl FnOnce(&mut StorefrontConfig)) -> Self {
            let dir = TempDir::new().unwrap();
            let mut config = test_config(dir.path());
            edit(&mut config);
            let store = Arc::new(MemoryStore::new());
            let state = AppState::new(config.clone(), Stores::memory(&store)).unwrap();
            let router = app(state.clone())
                .layer(configure_session_layer(SessionMemoryStore::default(), &config));
            Self {
                router,
                store,
                state,
                config,
                _dir: dir,
            }
        }

        pub fn new() -> Self {
            Self::with_config(|_| {})
        }

        pub async fn seed_item(&self, model: &str, quantity: i32) -> InventoryItemId {
            self.store
                .upsert_item(model, "silicone", Decimal::from(150_000), quantity, 2)
                .await
                .unwrap()
                .id
        }

        pub async fn send(&self, request: Request<Body>) -> Response<Body> {
            self.router.clone().oneshot(request).await.unwrap()
        }
    }

    pub fn json_request(method: &str, uri: &str, body: &Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    pub fn empty_request(method: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    pub async fn body_json(response: Response<Body>) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    /// Attach a session cookie to a request.
    pub fn with_cookie(mut request: Request<Body>, cookie: &str) -> Request<Body> {
        request
            .headers_mut()
            .insert(header::COOKIE, cookie.parse().unwrap());
        request
    }

    /// The session cookie set by a response, ready to send back.
    pub fn session_cookie(response: &Response<Body>) -> String {
        let set_cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
        set_cookie.split(';').next().unwrap().to_string()
    }
}
