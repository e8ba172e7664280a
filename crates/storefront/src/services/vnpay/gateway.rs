//! VNPay payment requests and callback handling.

use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use rust_decimal::Decimal;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use caseforge_core::{CurrencyCode, OrderId, PaymentStatus, Price, TransactionStatus};

use super::signature::{self, Params, SECURE_HASH_FIELD};
use super::PaymentError;
use crate::config::VnpayConfig;
use crate::db::{OrderStore, PaymentStore};
use crate::models::{NewPayment, PaymentOutcome, PaymentRecord};
use crate::services::assets::{AssetStore, relocate_order_assets};

/// Protocol version sent with every request.
pub const VNPAY_VERSION: &str = "2.1.0";

/// The single response code the gateway uses for an approved payment.
pub const RESPONSE_CODE_SUCCESS: &str = "00";

/// Timestamp format for `vnp_CreateDate`, `vnp_ExpireDate` and `vnp_PayDate`.
const TIME_FORMAT: &str = "%Y%m%d%H%M%S";

/// Gateway timestamps are wall-clock time in GMT+7.
const GATEWAY_UTC_OFFSET_HOURS: i64 = 7;

/// How long the customer has to complete payment.
const PAYMENT_EXPIRY_MINUTES: i64 = 15;

/// Display language of the gateway's payment page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    Vn,
    En,
}

impl Locale {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Vn => "vn",
            Self::En => "en",
        }
    }
}

/// Input for [`VnpayGateway::create_payment_request`].
#[derive(Debug, Clone)]
pub struct PaymentRequest {
    pub order_id: OrderId,
    pub amount: Decimal,
    pub description: String,
    pub client_ip: String,
    pub locale: Option<Locale>,
    /// Preselect a bank on the gateway page.
    pub bank_code: Option<String>,
}

/// Where to send the customer to pay.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentRedirect {
    pub redirect_url: String,
    pub txn_ref: String,
}

/// Outcome of a verified callback.
#[derive(Debug, Clone, Serialize)]
pub struct CallbackResult {
    pub is_success: bool,
    pub txn_ref: String,
    pub order_id: OrderId,
    pub response_code: String,
    pub transaction_no: Option<String>,
    /// The record had been settled by an earlier callback.
    pub already_finalized: bool,
}

/// Format a gateway timestamp (`yyyyMMddHHmmss`, GMT+7).
#[must_use]
pub fn format_gateway_time(at: DateTime<Utc>) -> String {
    (at.naive_utc() + TimeDelta::hours(GATEWAY_UTC_OFFSET_HOURS))
        .format(TIME_FORMAT)
        .to_string()
}

/// Parse a gateway timestamp. Malformed input yields `None`.
#[must_use]
pub fn parse_gateway_time(value: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value, TIME_FORMAT)
        .ok()
        .map(|local| (local - TimeDelta::hours(GATEWAY_UTC_OFFSET_HOURS)).and_utc())
}

/// Transaction reference unique per attempt: `{order_id}_{unix_millis}`.
#[must_use]
pub fn new_txn_ref(order_id: OrderId, at: DateTime<Utc>) -> String {
    format!("{order_id}_{}", at.timestamp_millis())
}

/// Human-readable Vietnamese message for a gateway response code.
#[must_use]
pub fn response_message(code: &str) -> &'static str {
    match code {
        "00" => "Giao dịch thành công",
        "07" => "Trừ tiền thành công. Giao dịch bị nghi ngờ (liên quan tới lừa đảo, giao dịch bất thường)",
        "09" => "Thẻ/Tài khoản của khách hàng chưa đăng ký dịch vụ InternetBanking tại ngân hàng",
        "10" => "Khách hàng xác thực thông tin thẻ/tài khoản không đúng quá 3 lần",
        "11" => "Đã hết hạn chờ thanh toán. Xin quý khách vui lòng thực hiện lại giao dịch",
        "12" => "Thẻ/Tài khoản của khách hàng bị khóa",
        "13" => "Quý khách nhập sai mật khẩu xác thực giao dịch (OTP)",
        "24" => "Khách hàng hủy giao dịch",
        "51" => "Tài khoản của quý khách không đủ số dư để thực hiện giao dịch",
        "65" => "Tài khoản của Quý khách đã vượt quá hạn mức giao dịch trong ngày",
        "75" => "Ngân hàng thanh toán đang bảo trì",
        "79" => "Quý khách nhập sai mật khẩu thanh toán quá số lần quy định",
        "99" => "Lỗi không xác định",
        _ => "Giao dịch thất bại",
    }
}

/// VNPay payment gateway adapter.
#[derive(Clone)]
pub struct VnpayGateway {
    config: VnpayConfig,
    payments: Arc<dyn PaymentStore>,
    orders: Arc<dyn OrderStore>,
    assets: Arc<dyn AssetStore>,
}

impl VnpayGateway {
    #[must_use]
    pub fn new(
        config: VnpayConfig,
        payments: Arc<dyn PaymentStore>,
        orders: Arc<dyn OrderStore>,
        assets: Arc<dyn AssetStore>,
    ) -> Self {
        Self {
            config,
            payments,
            orders,
            assets,
        }
    }

    /// Build the request parameters for one attempt (unsigned).
    fn request_params(
        &self,
        request: &PaymentRequest,
        txn_ref: &str,
        gateway_amount: i64,
        now: DateTime<Utc>,
    ) -> Params {
        let mut params = Params::new();
        let mut set = |key: &str, value: String| {
            params.insert(key.to_string(), value);
        };

        set("vnp_Version", VNPAY_VERSION.to_string());
        set("vnp_Command", "pay".to_string());
        set("vnp_TmnCode", self.config.tmn_code.clone());
        set("vnp_Amount", gateway_amount.to_string());
        set("vnp_CurrCode", CurrencyCode::VND.code().to_string());
        set("vnp_TxnRef", txn_ref.to_string());
        set("vnp_OrderInfo", request.description.clone());
        set("vnp_OrderType", "other".to_string());
        set(
            "vnp_Locale",
            request.locale.unwrap_or_default().as_str().to_string(),
        );
        set("vnp_ReturnUrl", self.config.return_url.clone());
        set("vnp_IpAddr", request.client_ip.clone());
        set("vnp_CreateDate", format_gateway_time(now));
        set(
            "vnp_ExpireDate",
            format_gateway_time(now + TimeDelta::minutes(PAYMENT_EXPIRY_MINUTES)),
        );
        if let Some(bank_code) = request.bank_code.as_deref().filter(|c| !c.is_empty()) {
            set("vnp_BankCode", bank_code.to_string());
        }

        params
    }

    /// Build a signed redirect URL and record the pending attempt.
    ///
    /// The attempt is persisted before the URL is returned; if persistence
    /// fails no URL is handed out.
    ///
    /// # Errors
    ///
    /// Returns `PaymentError::InvalidAmount` for a negative amount, or a
    /// signing or repository error.
    #[instrument(skip(self, request), fields(order_id = %request.order_id))]
    pub async fn create_payment_request(
        &self,
        request: &PaymentRequest,
    ) -> Result<PaymentRedirect, PaymentError> {
        let gateway_amount = Price::vnd(request.amount)
            .to_gateway_amount()
            .ok_or(PaymentError::InvalidAmount)?;

        let now = Utc::now();
        let txn_ref = new_txn_ref(request.order_id, now);
        let params = self.request_params(request, &txn_ref, gateway_amount, now);

        let canonical = signature::canonicalize(&params);
        let secure_hash = signature::sign(&canonical, self.config.hash_secret.expose_secret())?;
        let redirect_url = format!(
            "{}?{canonical}&{SECURE_HASH_FIELD}={secure_hash}",
            self.config.payment_url
        );

        self.payments
            .insert_payment(&NewPayment {
                order_id: request.order_id,
                txn_ref: txn_ref.clone(),
                amount: request.amount,
            })
            .await?;

        info!(txn_ref = %txn_ref, amount = gateway_amount, "Payment request created");

        Ok(PaymentRedirect {
            redirect_url,
            txn_ref,
        })
    }

    /// Verify a gateway callback and apply its result.
    ///
    /// Nothing is changed unless the signature, transaction reference and
    /// amount all check out. A repeated callback for a settled attempt
    /// re-applies the order side effects, which are idempotent.
    ///
    /// # Errors
    ///
    /// Returns `PaymentError::InvalidSignature`, `UnknownTransaction`,
    /// `AmountMismatch`, or a repository error.
    #[instrument(skip(self, params), fields(txn_ref = tracing::field::Empty))]
    pub async fn verify_callback(&self, params: &Params) -> Result<CallbackResult, PaymentError> {
        if !signature::verify(params, self.config.hash_secret.expose_secret()) {
            warn!("Rejected gateway callback with invalid signature");
            return Err(PaymentError::InvalidSignature);
        }

        let field = |key: &str| params.get(key).filter(|v| !v.is_empty()).cloned();

        let txn_ref = field("vnp_TxnRef").ok_or(PaymentError::MissingField("vnp_TxnRef"))?;
        tracing::Span::current().record("txn_ref", txn_ref.as_str());

        let record = self
            .payments
            .get_by_txn_ref(&txn_ref)
            .await?
            .ok_or_else(|| PaymentError::UnknownTransaction(txn_ref.clone()))?;

        check_amount(&record, params.get("vnp_Amount").map(String::as_str))?;

        let response_code =
            field("vnp_ResponseCode").ok_or(PaymentError::MissingField("vnp_ResponseCode"))?;
        let outcome = PaymentOutcome {
            transaction_status: if response_code == RESPONSE_CODE_SUCCESS {
                TransactionStatus::Success
            } else {
                TransactionStatus::Error
            },
            response_code,
            bank_code: field("vnp_BankCode"),
            gateway_transaction_no: field("vnp_TransactionNo"),
            paid_at: params.get("vnp_PayDate").and_then(|d| parse_gateway_time(d)),
        };

        let (settled, already_finalized) =
            match self.payments.finalize_payment(&txn_ref, &outcome).await? {
                Some(updated) => (updated, false),
                None => (record, true),
            };
        let is_success = settled.transaction_status == TransactionStatus::Success;

        if is_success {
            self.orders
                .set_payment_status(settled.order_id, PaymentStatus::Paid)
                .await?;

            // Relocation failures never change the payment outcome.
            if let Err(e) =
                relocate_order_assets(self.orders.as_ref(), self.assets.as_ref(), settled.order_id)
                    .await
            {
                warn!(order_id = %settled.order_id, error = %e, "Design asset relocation failed");
            }
        } else if !already_finalized {
            let stored = self
                .orders
                .set_payment_status(settled.order_id, PaymentStatus::Failed)
                .await?;
            if stored == PaymentStatus::Paid {
                info!(order_id = %settled.order_id, "Failed attempt ignored for paid order");
            }
        }

        info!(
            order_id = %settled.order_id,
            response_code = %outcome.response_code,
            is_success,
            already_finalized,
            "Gateway callback applied"
        );

        Ok(CallbackResult {
            is_success,
            txn_ref,
            order_id: settled.order_id,
            response_code: settled
                .response_code
                .unwrap_or(outcome.response_code),
            transaction_no: settled.gateway_transaction_no,
            already_finalized,
        })
    }
}

/// The callback amount must equal the recorded amount × 100.
fn check_amount(record: &PaymentRecord, received: Option<&str>) -> Result<(), PaymentError> {
    let expected = Price::vnd(record.amount)
        .to_gateway_amount()
        .ok_or(PaymentError::InvalidAmount)?;
    let received = received.unwrap_or_default();

    if received.parse::<i64>().ok() == Some(expected) {
        Ok(())
    } else {
        Err(PaymentError::AmountMismatch {
            expected,
            received: received.to_string(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{Datelike, Timelike};
    use secrecy::SecretString;

    use caseforge_core::{PaymentMethod, PhoneNumber};

    use super::*;
    use crate::config::VNPAY_SANDBOX_URL;
    use crate::db::{InventoryStore, MemoryStore};
    use crate::models::{NewLineItem, NewOrder};
    use crate::services::assets::LocalAssetStore;

    const SECRET: &str = "QX7RKM2ZP4VW9TLB8HNC3YDJ6FGS1AE0";

    struct Fixture {
        store: Arc<MemoryStore>,
        assets: Arc<LocalAssetStore>,
        gateway: VnpayGateway,
        _dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let assets = Arc::new(LocalAssetStore::new(dir.path()));
        let config = VnpayConfig {
            tmn_code: "CF2024TM".to_string(),
            hash_secret: SecretString::from(SECRET),
            payment_url: VNPAY_SANDBOX_URL.to_string(),
            return_url: "http://localhost:3000/api/payments/vnpay/return".to_string(),
        };
        let gateway = VnpayGateway::new(config, store.clone(), store.clone(), assets.clone());
        Fixture {
            store,
            assets,
            gateway,
            _dir: dir,
        }
    }

    async fn place_order(store: &MemoryStore, assets: Vec<String>) -> OrderId {
        let item = store
            .upsert_item("iPhone 15 Pro", "Ốp cứng", Decimal::from(150_000), 10, 2)
            .await
            .unwrap();
        store
            .create_order(&NewOrder {
                customer_name: "Trần Thị B".to_string(),
                customer_phone: PhoneNumber::parse("0987654321").unwrap(),
                customer_email: Some("b@example.vn".to_string()),
                shipping_address: "12 Nguyễn Huệ, Quận 1, TP.HCM".to_string(),
                to_district_id: Some(1442),
                to_ward_code: Some("20109".to_string()),
                payment_method: PaymentMethod::Gateway,
                subtotal: Decimal::from(150_000),
                shipping_fee: Decimal::ZERO,
                total: Decimal::from(150_000),
                note: None,
                line_items: vec![NewLineItem {
                    inventory_item_id: item.id,
                    quantity: 1,
                    unit_price: Decimal::from(150_000),
                    design_assets: assets,
                }],
            })
            .await
            .unwrap()
            .id
    }

    fn request(order_id: OrderId) -> PaymentRequest {
        PaymentRequest {
            order_id,
            amount: Decimal::from(150_000),
            description: format!("Thanh toan don hang {order_id}"),
            client_ip: "203.0.113.7".to_string(),
            locale: None,
            bank_code: None,
        }
    }

    fn callback(txn_ref: &str, amount: &str, code: &str) -> Params {
        let mut params: Params = [
            ("vnp_TmnCode", "CF2024TM"),
            ("vnp_TxnRef", txn_ref),
            ("vnp_Amount", amount),
            ("vnp_ResponseCode", code),
            ("vnp_TransactionStatus", code),
            ("vnp_BankCode", "NCB"),
            ("vnp_TransactionNo", "14226112"),
            ("vnp_PayDate", "20260915143000"),
            ("vnp_OrderInfo", "Thanh toan don hang"),
        ]
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
        let hash = signature::sign(&signature::canonicalize(&params), SECRET).unwrap();
        params.insert(SECURE_HASH_FIELD.to_string(), hash);
        params.insert("vnp_SecureHashType".to_string(), "HmacSHA512".to_string());
        params
    }

    #[test]
    fn test_gateway_time_round_trip_in_gmt7() {
        let at = DateTime::parse_from_rfc3339("2026-09-15T07:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(format_gateway_time(at), "20260915143000");

        let parsed = parse_gateway_time("20260915143000").unwrap();
        assert_eq!(parsed, at);
        assert_eq!((parsed.year(), parsed.hour()), (2026, 7));
    }

    #[test]
    fn test_parse_gateway_time_malformed_is_none() {
        assert!(parse_gateway_time("2026-09-15").is_none());
        assert!(parse_gateway_time("").is_none());
        assert!(parse_gateway_time("20261345999999").is_none());
    }

    #[test]
    fn test_response_message() {
        assert_eq!(response_message("00"), "Giao dịch thành công");
        assert_eq!(response_message("24"), "Khách hàng hủy giao dịch");
        assert_eq!(response_message("xx"), "Giao dịch thất bại");
    }

    #[tokio::test]
    async fn test_payment_url_verifies_with_same_secret() {
        let f = fixture();
        let order_id = place_order(&f.store, vec![]).await;

        let redirect = f.gateway.create_payment_request(&request(order_id)).await.unwrap();
        assert!(redirect.redirect_url.starts_with(VNPAY_SANDBOX_URL));
        assert!(redirect.txn_ref.starts_with(&format!("{order_id}_")));

        let url = url::Url::parse(&redirect.redirect_url).unwrap();
        let params: Params = url.query_pairs().into_owned().collect();
        assert!(signature::verify(&params, SECRET));
        assert_eq!(params["vnp_Amount"], "15000000");
        assert_eq!(params["vnp_Locale"], "vn");
        assert_eq!(params["vnp_CurrCode"], "VND");
        assert_eq!(params["vnp_OrderType"], "other");
        assert!(!params.contains_key("vnp_BankCode"));

        let record = f.store.get_by_txn_ref(&redirect.txn_ref).await.unwrap().unwrap();
        assert_eq!(record.transaction_status, TransactionStatus::Pending);
    }

    #[tokio::test]
    async fn test_no_url_when_record_cannot_be_persisted() {
        let f = fixture();
        let order_id = place_order(&f.store, vec![]).await;
        f.store.set_fail_writes(true);

        let result = f.gateway.create_payment_request(&request(order_id)).await;
        assert!(matches!(result, Err(PaymentError::Repository(_))));
    }

    #[tokio::test]
    async fn test_successful_callback_marks_paid_and_is_idempotent() {
        let f = fixture();
        f.assets.put("temp/u1/front.png", b"png").await.unwrap();
        let order_id = place_order(&f.store, vec!["temp/u1/front.png".to_string()]).await;
        let redirect = f.gateway.create_payment_request(&request(order_id)).await.unwrap();

        let params = callback(&redirect.txn_ref, "15000000", "00");
        let first = f.gateway.verify_callback(&params).await.unwrap();
        assert!(first.is_success);
        assert!(!first.already_finalized);
        assert_eq!(first.order_id, order_id);
        assert_eq!(first.transaction_no.as_deref(), Some("14226112"));

        let order = f.store.get_order(order_id).await.unwrap().unwrap();
        assert_eq!(order.payment_status, PaymentStatus::Paid);
        let lines = f.store.line_items(order_id).await.unwrap();
        assert_eq!(lines[0].design_assets, vec![format!("orders/{order_id}/front.png")]);

        let record = f.store.get_by_txn_ref(&redirect.txn_ref).await.unwrap().unwrap();
        assert_eq!(record.transaction_status, TransactionStatus::Success);
        assert_eq!(record.bank_code.as_deref(), Some("NCB"));
        assert!(record.paid_at.is_some());

        let second = f.gateway.verify_callback(&params).await.unwrap();
        assert!(second.is_success);
        assert!(second.already_finalized);
        let order = f.store.get_order(order_id).await.unwrap().unwrap();
        assert_eq!(order.payment_status, PaymentStatus::Paid);
    }

    #[tokio::test]
    async fn test_invalid_signature_changes_nothing() {
        let f = fixture();
        let order_id = place_order(&f.store, vec![]).await;
        let redirect = f.gateway.create_payment_request(&request(order_id)).await.unwrap();

        let mut params = callback(&redirect.txn_ref, "15000000", "00");
        params.insert("vnp_ResponseCode".to_string(), "24".to_string());
        assert!(matches!(
            f.gateway.verify_callback(&params).await,
            Err(PaymentError::InvalidSignature)
        ));

        let record = f.store.get_by_txn_ref(&redirect.txn_ref).await.unwrap().unwrap();
        assert_eq!(record.transaction_status, TransactionStatus::Pending);
        let order = f.store.get_order(order_id).await.unwrap().unwrap();
        assert_eq!(order.payment_status, PaymentStatus::Pending);
    }

    #[tokio::test]
    async fn test_amount_mismatch_and_unknown_reference() {
        let f = fixture();
        let order_id = place_order(&f.store, vec![]).await;
        let redirect = f.gateway.create_payment_request(&request(order_id)).await.unwrap();

        let params = callback(&redirect.txn_ref, "100", "00");
        assert!(matches!(
            f.gateway.verify_callback(&params).await,
            Err(PaymentError::AmountMismatch { expected: 15_000_000, .. })
        ));

        let params = callback("999_1", "15000000", "00");
        assert!(matches!(
            f.gateway.verify_callback(&params).await,
            Err(PaymentError::UnknownTransaction(_))
        ));
    }

    #[tokio::test]
    async fn test_failed_callback_marks_failed_but_never_downgrades_paid() {
        let f = fixture();
        let order_id = place_order(&f.store, vec![]).await;

        let cancelled = f.gateway.create_payment_request(&request(order_id)).await.unwrap();
        let result = f
            .gateway
            .verify_callback(&callback(&cancelled.txn_ref, "15000000", "24"))
            .await
            .unwrap();
        assert!(!result.is_success);
        let order = f.store.get_order(order_id).await.unwrap().unwrap();
        assert_eq!(order.payment_status, PaymentStatus::Failed);

        // Distinct millisecond timestamp for the second attempt.
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        let paid = f.gateway.create_payment_request(&request(order_id)).await.unwrap();
        f.gateway
            .verify_callback(&callback(&paid.txn_ref, "15000000", "00"))
            .await
            .unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        let late = f.gateway.create_payment_request(&request(order_id)).await.unwrap();
        f.gateway
            .verify_callback(&callback(&late.txn_ref, "15000000", "51"))
            .await
            .unwrap();

        let order = f.store.get_order(order_id).await.unwrap().unwrap();
        assert_eq!(order.payment_status, PaymentStatus::Paid);
    }
}
