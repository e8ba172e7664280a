//! Shipment repository for database operations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;

use caseforge_core::{OrderId, ShipmentId, ShippingStatus};

use super::{RepositoryError, ShipmentStore, parse_column};
use crate::models::{NewShipment, Shipment};

const SHIPMENT_COLUMNS: &str = "id, order_id, carrier_order_code, carrier_status, status, \
     tracking_url, fee, expected_delivery, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct ShipmentRow {
    id: i64,
    order_id: i64,
    carrier_order_code: String,
    carrier_status: String,
    status: String,
    tracking_url: String,
    fee: Decimal,
    expected_delivery: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ShipmentRow> for Shipment {
    type Error = RepositoryError;

    fn try_from(r: ShipmentRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: ShipmentId::new(r.id),
            order_id: OrderId::new(r.order_id),
            carrier_order_code: r.carrier_order_code,
            carrier_status: r.carrier_status,
            status: parse_column(&r.status)?,
            tracking_url: r.tracking_url,
            fee: r.fee,
            expected_delivery: r.expected_delivery,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

/// `PostgreSQL` implementation of [`ShipmentStore`].
#[derive(Clone)]
pub struct PgShipmentStore {
    pool: PgPool,
}

impl PgShipmentStore {
    /// Create a new shipment store.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ShipmentStore for PgShipmentStore {
    async fn insert_shipment(&self, shipment: &NewShipment) -> Result<Shipment, RepositoryError> {
        let row: ShipmentRow = sqlx::query_as(&format!(
            r"
            INSERT INTO storefront.shipments (
                order_id, carrier_order_code, carrier_status, status, tracking_url,
                fee, expected_delivery
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {SHIPMENT_COLUMNS}
            "
        ))
        .bind(shipment.order_id.as_i64())
        .bind(&shipment.carrier_order_code)
        .bind(&shipment.carrier_status)
        .bind(shipment.status.as_str())
        .bind(&shipment.tracking_url)
        .bind(shipment.fee)
        .bind(shipment.expected_delivery)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| RepositoryError::from_insert(e, "carrier order code"))?;

        Shipment::try_from(row)
    }

    async fn get_by_order(&self, order_id: OrderId) -> Result<Option<Shipment>, RepositoryError> {
        let row: Option<ShipmentRow> = sqlx::query_as(&format!(
            r"
            SELECT {SHIPMENT_COLUMNS}
            FROM storefront.shipments
            WHERE order_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "
        ))
        .bind(order_id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Shipment::try_from).transpose()
    }

    async fn get_by_code(&self, code: &str) -> Result<Option<Shipment>, RepositoryError> {
        let row: Option<ShipmentRow> = sqlx::query_as(&format!(
            "SELECT {SHIPMENT_COLUMNS} FROM storefront.shipments WHERE carrier_order_code = $1"
        ))
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Shipment::try_from).transpose()
    }

    async fn update_status(
        &self,
        id: ShipmentId,
        carrier_status: &str,
        status: ShippingStatus,
    ) -> Result<Shipment, RepositoryError> {
        let row: Option<ShipmentRow> = sqlx::query_as(&format!(
            r"
            UPDATE storefront.shipments
            SET carrier_status = $2, status = $3, updated_at = NOW()
            WHERE id = $1
            RETURNING {SHIPMENT_COLUMNS}
            "
        ))
        .bind(id.as_i64())
        .bind(carrier_status)
        .bind(status.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or(RepositoryError::NotFound).and_then(Shipment::try_from)
    }
}
