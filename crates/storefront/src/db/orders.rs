//! Order repository for database operations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;

use caseforge_core::{
    InventoryItemId, LineItemId, OrderId, OrderStatus, PaymentStatus, PhoneNumber,
};

use super::{OrderStore, RepositoryError, parse_column};
use crate::models::{LineItem, NewOrder, Order};

const ORDER_COLUMNS: &str = "id, customer_name, customer_phone, customer_email, shipping_address, \
     to_district_id, to_ward_code, payment_method, payment_status, status, subtotal, \
     shipping_fee, total, carrier_order_code, note, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: i64,
    customer_name: String,
    customer_phone: String,
    customer_email: Option<String>,
    shipping_address: String,
    to_district_id: Option<i32>,
    to_ward_code: Option<String>,
    payment_method: String,
    payment_status: String,
    status: String,
    subtotal: Decimal,
    shipping_fee: Decimal,
    total: Decimal,
    carrier_order_code: Option<String>,
    note: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = RepositoryError;

    fn try_from(r: OrderRow) -> Result<Self, Self::Error> {
        let customer_phone = PhoneNumber::parse(&r.customer_phone).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid phone in database: {e}"))
        })?;

        Ok(Self {
            id: OrderId::new(r.id),
            customer_name: r.customer_name,
            customer_phone,
            customer_email: r.customer_email,
            shipping_address: r.shipping_address,
            to_district_id: r.to_district_id,
            to_ward_code: r.to_ward_code,
            payment_method: parse_column(&r.payment_method)?,
            payment_status: parse_column(&r.payment_status)?,
            status: parse_column(&r.status)?,
            subtotal: r.subtotal,
            shipping_fee: r.shipping_fee,
            total: r.total,
            carrier_order_code: r.carrier_order_code,
            note: r.note,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct LineItemRow {
    id: i64,
    order_id: i64,
    inventory_item_id: i64,
    quantity: i32,
    unit_price: Decimal,
    design_assets: Vec<String>,
}

impl From<LineItemRow> for LineItem {
    fn from(r: LineItemRow) -> Self {
        Self {
            id: LineItemId::new(r.id),
            order_id: OrderId::new(r.order_id),
            inventory_item_id: InventoryItemId::new(r.inventory_item_id),
            quantity: r.quantity,
            unit_price: r.unit_price,
            design_assets: r.design_assets,
        }
    }
}

/// `PostgreSQL` implementation of [`OrderStore`].
#[derive(Clone)]
pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    /// Create a new order store.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn ping(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn create_order(&self, order: &NewOrder) -> Result<Order, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let row: OrderRow = sqlx::query_as(&format!(
            r"
            INSERT INTO storefront.orders (
                customer_name, customer_phone, customer_email, shipping_address,
                to_district_id, to_ward_code, payment_method, subtotal, shipping_fee,
                total, note
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING {ORDER_COLUMNS}
            "
        ))
        .bind(&order.customer_name)
        .bind(order.customer_phone.as_str())
        .bind(order.customer_email.as_deref())
        .bind(&order.shipping_address)
        .bind(order.to_district_id)
        .bind(order.to_ward_code.as_deref())
        .bind(order.payment_method.as_str())
        .bind(order.subtotal)
        .bind(order.shipping_fee)
        .bind(order.total)
        .bind(order.note.as_deref())
        .fetch_one(&mut *tx)
        .await?;

        for line in &order.line_items {
            sqlx::query(
                r"
                INSERT INTO storefront.order_line_items (
                    order_id, inventory_item_id, quantity, unit_price, design_assets
                )
                VALUES ($1, $2, $3, $4, $5)
                ",
            )
            .bind(row.id)
            .bind(line.inventory_item_id.as_i64())
            .bind(line.quantity)
            .bind(line.unit_price)
            .bind(&line.design_assets)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Order::try_from(row)
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let row: Option<OrderRow> = sqlx::query_as(&format!(
            "SELECT {ORDER_COLUMNS} FROM storefront.orders WHERE id = $1"
        ))
        .bind(id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Order::try_from).transpose()
    }

    async fn line_items(&self, id: OrderId) -> Result<Vec<LineItem>, RepositoryError> {
        let rows: Vec<LineItemRow> = sqlx::query_as(
            r"
            SELECT id, order_id, inventory_item_id, quantity, unit_price, design_assets
            FROM storefront.order_line_items
            WHERE order_id = $1
            ORDER BY id
            ",
        )
        .bind(id.as_i64())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(LineItem::from).collect())
    }

    async fn set_payment_status(
        &self,
        id: OrderId,
        status: PaymentStatus,
    ) -> Result<PaymentStatus, RepositoryError> {
        let stored: Option<(String,)> = sqlx::query_as(
            r"
            UPDATE storefront.orders
            SET payment_status = CASE
                    WHEN payment_status = 'paid' AND $2 = 'failed' THEN payment_status
                    ELSE $2
                END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING payment_status
            ",
        )
        .bind(id.as_i64())
        .bind(status.as_str())
        .fetch_optional(&self.pool)
        .await?;

        let (stored,) = stored.ok_or(RepositoryError::NotFound)?;
        parse_column(&stored)
    }

    async fn set_status(&self, id: OrderId, status: OrderStatus) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE storefront.orders SET status = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id.as_i64())
        .bind(status.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn cancel_if_open(&self, id: OrderId) -> Result<bool, RepositoryError> {
        let row: Option<(i64,)> = sqlx::query_as(
            r"
            UPDATE storefront.orders o
            SET status = 'cancelled', updated_at = NOW()
            WHERE o.id = $1
              AND o.status IN ('pending', 'processing')
              AND o.carrier_order_code IS NULL
              AND NOT EXISTS (
                  SELECT 1 FROM storefront.shipments s
                  WHERE s.order_id = o.id AND s.status <> 'cancelled'
              )
            RETURNING o.id
            ",
        )
        .bind(id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.is_some())
    }

    async fn attach_carrier_order(&self, id: OrderId, code: &str) -> Result<bool, RepositoryError> {
        let row: Option<(i64,)> = sqlx::query_as(
            r"
            UPDATE storefront.orders
            SET carrier_order_code = $2,
                status = CASE WHEN status = 'pending' THEN 'processing' ELSE status END,
                updated_at = NOW()
            WHERE id = $1 AND status IN ('pending', 'processing')
            RETURNING id
            ",
        )
        .bind(id.as_i64())
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.is_some())
    }

    async fn set_carrier_order_code(
        &self,
        id: OrderId,
        code: Option<&str>,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE storefront.orders
            SET carrier_order_code = $2, updated_at = NOW()
            WHERE id = $1
            ",
        )
        .bind(id.as_i64())
        .bind(code)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn update_line_item_assets(
        &self,
        id: LineItemId,
        assets: &[String],
    ) -> Result<(), RepositoryError> {
        let result =
            sqlx::query("UPDATE storefront.order_line_items SET design_assets = $2 WHERE id = $1")
                .bind(id.as_i64())
                .bind(assets)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}
