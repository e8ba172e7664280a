//! VNPay callback boundaries and payment retries.
//!
//! The IPN and return handlers never fail toward the gateway: every outcome,
//! including internal errors, is mapped onto the gateway's response codes
//! (IPN) or a redirect (return). Failures are only visible in logs.

use axum::{
    Json,
    body::Bytes,
    extract::{Path, RawQuery, State},
    response::Redirect,
};
use serde::Serialize;
use tower_sessions::Session;
use tracing::{error, info, instrument, warn};

use caseforge_core::{OrderId, PaymentMethod, PaymentStatus};

use super::ClientIp;
use super::orders::require_placed;
use crate::error::{AppError, Result, add_breadcrumb};
use crate::models::Order;
use crate::services::orders::OrderError;
use crate::services::vnpay::{
    CallbackResult, Params, PaymentError, PaymentRedirect, PaymentRequest,
};
use crate::state::AppState;

/// Body returned to the gateway for every IPN call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IpnResponse {
    #[serde(rename = "RspCode")]
    pub rsp_code: &'static str,
    #[serde(rename = "Message")]
    pub message: &'static str,
}

impl IpnResponse {
    const fn new(rsp_code: &'static str, message: &'static str) -> Self {
        Self { rsp_code, message }
    }
}

/// Map a callback outcome onto the gateway's IPN vocabulary.
#[must_use]
pub fn ipn_response(outcome: &std::result::Result<CallbackResult, PaymentError>) -> IpnResponse {
    match outcome {
        Ok(result) if result.already_finalized => {
            IpnResponse::new("02", "Order already confirmed")
        }
        Ok(_) => IpnResponse::new("00", "Confirm Success"),
        Err(PaymentError::InvalidSignature) => IpnResponse::new("97", "Invalid signature"),
        Err(PaymentError::UnknownTransaction(_) | PaymentError::MissingField(_)) => {
            IpnResponse::new("01", "Order not found")
        }
        Err(PaymentError::AmountMismatch { .. }) => IpnResponse::new("04", "Invalid amount"),
        Err(_) => IpnResponse::new("99", "Unknown error"),
    }
}

/// Collect callback parameters from the query string and a form body.
///
/// Malformed input never rejects the request; it just fails verification.
fn collect_params(query: Option<&str>, body: &[u8]) -> Params {
    let mut params = Params::new();
    let mut extend = |bytes: &[u8]| {
        for (key, value) in url::form_urlencoded::parse(bytes) {
            params.insert(key.into_owned(), value.into_owned());
        }
    };
    if let Some(query) = query {
        extend(query.as_bytes());
    }
    extend(body);
    params
}

/// Server-to-server payment notification. Always HTTP 200.
#[instrument(skip_all)]
pub async fn ipn(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
    body: Bytes,
) -> Json<IpnResponse> {
    let params = collect_params(query.as_deref(), &body);
    let txn_ref = params.get("vnp_TxnRef").map_or("", String::as_str);
    add_breadcrumb("payment", "IPN received", Some(&[("txn_ref", txn_ref)]));

    let outcome = state.gateway().verify_callback(&params).await;
    let response = ipn_response(&outcome);

    match &outcome {
        Ok(result) => info!(
            order_id = %result.order_id,
            is_success = result.is_success,
            rsp_code = response.rsp_code,
            "IPN processed"
        ),
        Err(e @ (PaymentError::Repository(_) | PaymentError::Signature(_))) => {
            error!(error = %e, "IPN processing failed");
        }
        Err(e) => warn!(error = %e, rsp_code = response.rsp_code, "IPN rejected"),
    }

    Json(response)
}

/// Browser return from the gateway. Always a redirect to the order page.
#[instrument(skip_all)]
pub async fn vnpay_return(State(state): State<AppState>, RawQuery(query): RawQuery) -> Redirect {
    let params = collect_params(query.as_deref(), &[]);

    match state.gateway().verify_callback(&params).await {
        Ok(result) if result.is_success => {
            Redirect::to(&format!("/orders/{}?payment=success", result.order_id))
        }
        Ok(result) => Redirect::to(&format!(
            "/orders/{}?payment=failed&code={}",
            result.order_id, result.response_code
        )),
        Err(e) => {
            warn!(error = %e, "Payment return could not be verified");
            Redirect::to("/orders?payment=error")
        }
    }
}

/// Response to a retry.
#[derive(Debug, Serialize)]
pub struct RetryResponse {
    pub payment_url: String,
    pub txn_ref: String,
}

/// Start a new payment attempt for an unpaid gateway order.
#[instrument(skip(state, session, client_ip))]
pub async fn retry(
    State(state): State<AppState>,
    session: Session,
    Path(order_id): Path<OrderId>,
    ClientIp(client_ip): ClientIp,
) -> Result<Json<RetryResponse>> {
    require_placed(&session, order_id).await?;
    let order = state
        .stores()
        .orders
        .get_order(order_id)
        .await?
        .ok_or(OrderError::NotFound(order_id))?;

    if order.payment_method != PaymentMethod::Gateway {
        return Err(AppError::BadRequest(
            "Order is paid on delivery".to_string(),
        ));
    }
    if order.payment_status == PaymentStatus::Paid {
        return Err(AppError::Conflict("Order is already paid".to_string()));
    }
    if order.status.is_terminal() {
        return Err(AppError::Conflict("Order is closed".to_string()));
    }

    let redirect = start_payment(&state, &order, client_ip).await?;
    Ok(Json(RetryResponse {
        payment_url: redirect.redirect_url,
        txn_ref: redirect.txn_ref,
    }))
}

/// Record a new attempt for `order` and build its redirect URL.
pub(crate) async fn start_payment(
    state: &AppState,
    order: &Order,
    client_ip: String,
) -> std::result::Result<PaymentRedirect, PaymentError> {
    state
        .gateway()
        .create_payment_request(&PaymentRequest {
            order_id: order.id,
            amount: order.total,
            // Gateways mangle diacritics in the description.
            description: format!("Thanh toan don hang {}", order.id),
            client_ip,
            locale: None,
            bank_code: None,
        })
        .await
}
