//! Payment attempts against the gateway.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use caseforge_core::{OrderId, PaymentRecordId, TransactionStatus};

/// One payment attempt for an order.
///
/// Created as `Pending` when the redirect URL is built and settled exactly
/// once by the verified gateway callback.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentRecord {
    pub id: PaymentRecordId,
    pub order_id: OrderId,
    /// Our reference for the attempt (`vnp_TxnRef`).
    pub txn_ref: String,
    pub amount: Decimal,
    pub transaction_status: TransactionStatus,
    pub response_code: Option<String>,
    pub bank_code: Option<String>,
    /// The gateway's own transaction number (`vnp_TransactionNo`).
    pub gateway_transaction_no: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Data needed to insert a pending payment record.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub order_id: OrderId,
    pub txn_ref: String,
    pub amount: Decimal,
}

/// Result of a verified callback, applied to a pending record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentOutcome {
    pub transaction_status: TransactionStatus,
    pub response_code: String,
    pub bank_code: Option<String>,
    pub gateway_transaction_no: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
}
