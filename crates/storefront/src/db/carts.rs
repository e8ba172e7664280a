//! Cart snapshot table, the primary cart storage backend.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::cart::{CartStorage, StorageError};

/// Largest snapshot stored in the database.
pub const DATABASE_QUOTA_BYTES: usize = 256 * 1024;

/// `PostgreSQL` implementation of [`CartStorage`].
#[derive(Clone)]
pub struct PgCartStorage {
    pool: PgPool,
}

impl PgCartStorage {
    /// Create a new cart snapshot store.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CartStorage for PgCartStorage {
    fn name(&self) -> &'static str {
        "database"
    }

    fn quota(&self) -> usize {
        DATABASE_QUOTA_BYTES
    }

    async fn load(&self, key: &str) -> Result<Option<String>, StorageError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT payload FROM storefront.cart_snapshots WHERE cart_key = $1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| StorageError::unavailable(self.name(), e))?;

        Ok(row.map(|(payload,)| payload))
    }

    async fn save(&self, key: &str, payload: &str) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO storefront.cart_snapshots (cart_key, payload)
            VALUES ($1, $2)
            ON CONFLICT (cart_key) DO UPDATE
            SET payload = EXCLUDED.payload, updated_at = NOW()
            ",
        )
        .bind(key)
        .bind(payload)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::unavailable(self.name(), e))?;

        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM storefront.cart_snapshots WHERE cart_key = $1")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::unavailable(self.name(), e))?;

        Ok(())
    }
}
