//! Inventory repository for database operations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;

use caseforge_core::InventoryItemId;

use super::{InventoryStore, RepositoryError};
use crate::models::{InventoryItem, QuantityChange};

#[derive(sqlx::FromRow)]
struct InventoryItemRow {
    id: i64,
    phone_model: String,
    case_type: String,
    unit_price: Decimal,
    quantity: i32,
    reorder_threshold: i32,
    template_assets: Vec<String>,
    updated_at: DateTime<Utc>,
}

impl From<InventoryItemRow> for InventoryItem {
    fn from(r: InventoryItemRow) -> Self {
        Self {
            id: InventoryItemId::new(r.id),
            phone_model: r.phone_model,
            case_type: r.case_type,
            unit_price: r.unit_price,
            quantity: r.quantity,
            reorder_threshold: r.reorder_threshold,
            template_assets: r.template_assets,
            updated_at: r.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct AdjustRow {
    previous: i32,
    current: i32,
    reorder_threshold: i32,
}

/// `PostgreSQL` implementation of [`InventoryStore`].
#[derive(Clone)]
pub struct PgInventoryStore {
    pool: PgPool,
}

impl PgInventoryStore {
    /// Create a new inventory store.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl InventoryStore for PgInventoryStore {
    async fn get_item(&self, id: InventoryItemId) -> Result<Option<InventoryItem>, RepositoryError> {
        let row: Option<InventoryItemRow> = sqlx::query_as(
            r"
            SELECT id, phone_model, case_type, unit_price, quantity, reorder_threshold,
                   template_assets, updated_at
            FROM storefront.inventory_items
            WHERE id = $1
            ",
        )
        .bind(id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(InventoryItem::from))
    }

    async fn adjust_quantity(
        &self,
        id: InventoryItemId,
        delta: i32,
    ) -> Result<QuantityChange, RepositoryError> {
        // The locked CTE captures the pre-update quantity; a single statement
        // keeps concurrent checkouts from losing each other's decrements.
        let row: Option<AdjustRow> = sqlx::query_as(
            r"
            WITH locked AS (
                SELECT id, quantity
                FROM storefront.inventory_items
                WHERE id = $1
                FOR UPDATE
            )
            UPDATE storefront.inventory_items AS item
            SET quantity = GREATEST(item.quantity + $2, 0),
                updated_at = NOW()
            FROM locked
            WHERE item.id = locked.id
            RETURNING locked.quantity AS previous,
                      item.quantity AS current,
                      item.reorder_threshold
            ",
        )
        .bind(id.as_i64())
        .bind(delta)
        .fetch_optional(&self.pool)
        .await?;

        let row = row.ok_or(RepositoryError::NotFound)?;
        Ok(QuantityChange {
            item_id: id,
            previous: row.previous,
            current: row.current,
            reorder_threshold: row.reorder_threshold,
        })
    }

    async fn upsert_item(
        &self,
        phone_model: &str,
        case_type: &str,
        unit_price: Decimal,
        quantity: i32,
        reorder_threshold: i32,
    ) -> Result<InventoryItem, RepositoryError> {
        let row: InventoryItemRow = sqlx::query_as(
            r"
            INSERT INTO storefront.inventory_items (
                phone_model, case_type, unit_price, quantity, reorder_threshold
            )
            VALUES ($1, $2, $3, GREATEST($4, 0), $5)
            ON CONFLICT (phone_model, case_type) DO UPDATE
            SET unit_price = EXCLUDED.unit_price,
                quantity = EXCLUDED.quantity,
                reorder_threshold = EXCLUDED.reorder_threshold,
                updated_at = NOW()
            RETURNING id, phone_model, case_type, unit_price, quantity, reorder_threshold,
                      template_assets, updated_at
            ",
        )
        .bind(phone_model)
        .bind(case_type)
        .bind(unit_price)
        .bind(quantity)
        .bind(reorder_threshold)
        .fetch_one(&self.pool)
        .await?;

        Ok(InventoryItem::from(row))
    }
}
