//! Payment record repository for database operations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;

use caseforge_core::{OrderId, PaymentRecordId};

use super::{PaymentStore, RepositoryError, parse_column};
use crate::models::{NewPayment, PaymentOutcome, PaymentRecord};

const PAYMENT_COLUMNS: &str = "id, order_id, txn_ref, amount, transaction_status, response_code, \
     bank_code, gateway_transaction_no, paid_at, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: i64,
    order_id: i64,
    txn_ref: String,
    amount: Decimal,
    transaction_status: String,
    response_code: Option<String>,
    bank_code: Option<String>,
    gateway_transaction_no: Option<String>,
    paid_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for PaymentRecord {
    type Error = RepositoryError;

    fn try_from(r: PaymentRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: PaymentRecordId::new(r.id),
            order_id: OrderId::new(r.order_id),
            txn_ref: r.txn_ref,
            amount: r.amount,
            transaction_status: parse_column(&r.transaction_status)?,
            response_code: r.response_code,
            bank_code: r.bank_code,
            gateway_transaction_no: r.gateway_transaction_no,
            paid_at: r.paid_at,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

/// `PostgreSQL` implementation of [`PaymentStore`].
#[derive(Clone)]
pub struct PgPaymentStore {
    pool: PgPool,
}

impl PgPaymentStore {
    /// Create a new payment store.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PaymentStore for PgPaymentStore {
    async fn insert_payment(&self, payment: &NewPayment) -> Result<PaymentRecord, RepositoryError> {
        let row: PaymentRow = sqlx::query_as(&format!(
            r"
            INSERT INTO storefront.payment_records (order_id, txn_ref, amount)
            VALUES ($1, $2, $3)
            RETURNING {PAYMENT_COLUMNS}
            "
        ))
        .bind(payment.order_id.as_i64())
        .bind(&payment.txn_ref)
        .bind(payment.amount)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| RepositoryError::from_insert(e, "transaction reference"))?;

        PaymentRecord::try_from(row)
    }

    async fn get_by_txn_ref(
        &self,
        txn_ref: &str,
    ) -> Result<Option<PaymentRecord>, RepositoryError> {
        let row: Option<PaymentRow> = sqlx::query_as(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM storefront.payment_records WHERE txn_ref = $1"
        ))
        .bind(txn_ref)
        .fetch_optional(&self.pool)
        .await?;

        row.map(PaymentRecord::try_from).transpose()
    }

    async fn list_for_order(
        &self,
        order_id: OrderId,
    ) -> Result<Vec<PaymentRecord>, RepositoryError> {
        let rows: Vec<PaymentRow> = sqlx::query_as(&format!(
            r"
            SELECT {PAYMENT_COLUMNS}
            FROM storefront.payment_records
            WHERE order_id = $1
            ORDER BY created_at DESC, id DESC
            "
        ))
        .bind(order_id.as_i64())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(PaymentRecord::try_from).collect()
    }

    async fn finalize_payment(
        &self,
        txn_ref: &str,
        outcome: &PaymentOutcome,
    ) -> Result<Option<PaymentRecord>, RepositoryError> {
        let row: Option<PaymentRow> = sqlx::query_as(&format!(
            r"
            UPDATE storefront.payment_records
            SET transaction_status = $2,
                response_code = $3,
                bank_code = $4,
                gateway_transaction_no = $5,
                paid_at = $6,
                updated_at = NOW()
            WHERE txn_ref = $1 AND transaction_status = 'pending'
            RETURNING {PAYMENT_COLUMNS}
            "
        ))
        .bind(txn_ref)
        .bind(outcome.transaction_status.as_str())
        .bind(&outcome.response_code)
        .bind(outcome.bank_code.as_deref())
        .bind(outcome.gateway_transaction_no.as_deref())
        .bind(outcome.paid_at)
        .fetch_optional(&self.pool)
        .await?;

        row.map(PaymentRecord::try_from).transpose()
    }
}
