//! Database operations for storefront `PostgreSQL`.
//!
//! # Database: `caseforge`
//!
//! ## Tables (schema `storefront`)
//!
//! - `orders` / `order_line_items` - Checkout orders and their lines
//! - `inventory_items` - On-hand stock per phone model and case type
//! - `payment_records` - One row per gateway payment attempt
//! - `shipments` - Carrier shipments booked for orders
//! - `cart_snapshots` - Serialized carts keyed by visitor cart key
//! - `tower_sessions.session` - Tower-sessions storage
//!
//! Every table sits behind an async store trait so services can be exercised
//! against [`memory::MemoryStore`] in tests and against `PostgreSQL` in
//! production.
//!
//! # Migrations
//!
//! Migrations are stored in `crates/storefront/migrations/` and run via:
//! ```bash
//! cargo run -p caseforge-cli -- migrate
//! ```

pub mod carts;
pub mod inventory;
pub mod memory;
pub mod orders;
pub mod payments;
pub mod shipments;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use caseforge_core::{
    InventoryItemId, LineItemId, OrderId, OrderStatus, PaymentStatus, ShipmentId, ShippingStatus,
};

use crate::cart::CartStorage;
use crate::models::{
    InventoryItem, LineItem, NewOrder, NewPayment, NewShipment, Order, PaymentOutcome,
    PaymentRecord, QuantityChange, Shipment,
};

pub use carts::PgCartStorage;
pub use inventory::PgInventoryStore;
pub use memory::MemoryStore;
pub use orders::PgOrderStore;
pub use payments::PgPaymentStore;
pub use shipments::PgShipmentStore;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., duplicate transaction reference).
    #[error("constraint violation: {0}")]
    Conflict(String),
}

impl RepositoryError {
    /// Map a unique violation to `Conflict`, anything else to `Database`.
    pub(crate) fn from_insert(err: sqlx::Error, what: &str) -> Self {
        if let sqlx::Error::Database(ref db_err) = err
            && db_err.is_unique_violation()
        {
            return Self::Conflict(format!("{what} already exists"));
        }
        Self::Database(err)
    }
}

/// Parse a persisted status column, reporting bad values as corruption.
pub(crate) fn parse_column<T>(value: &str) -> Result<T, RepositoryError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e: T::Err| RepositoryError::DataCorruption(e.to_string()))
}

/// Orders and their line items.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Cheap connectivity check for readiness probes.
    async fn ping(&self) -> Result<(), RepositoryError>;

    /// Insert an order and all of its line items atomically.
    async fn create_order(&self, order: &NewOrder) -> Result<Order, RepositoryError>;

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, RepositoryError>;

    async fn line_items(&self, id: OrderId) -> Result<Vec<LineItem>, RepositoryError>;

    /// Set the order's payment status and return the status now stored.
    ///
    /// `Failed` never overwrites `Paid`; in that case the stored `Paid` is
    /// returned unchanged. Returns `NotFound` if the order does not exist.
    async fn set_payment_status(
        &self,
        id: OrderId,
        status: PaymentStatus,
    ) -> Result<PaymentStatus, RepositoryError>;

    /// Returns `NotFound` if the order does not exist.
    async fn set_status(&self, id: OrderId, status: OrderStatus) -> Result<(), RepositoryError>;

    /// Move an open order to `Cancelled` in one step.
    ///
    /// Only a pending or processing order with no carrier order code and no
    /// active shipment is changed. Returns whether this call made the change,
    /// so exactly one of several concurrent cancels sees `true`.
    async fn cancel_if_open(&self, id: OrderId) -> Result<bool, RepositoryError>;

    /// Record a booked carrier order on an open order, moving `Pending` to
    /// `Processing`.
    ///
    /// Returns `false` and changes nothing if the order was closed in the
    /// meantime.
    async fn attach_carrier_order(&self, id: OrderId, code: &str) -> Result<bool, RepositoryError>;

    /// Record (or clear) the carrier order code on the order.
    async fn set_carrier_order_code(
        &self,
        id: OrderId,
        code: Option<&str>,
    ) -> Result<(), RepositoryError>;

    /// Replace a line item's design asset paths.
    async fn update_line_item_assets(
        &self,
        id: LineItemId,
        assets: &[String],
    ) -> Result<(), RepositoryError>;
}

/// Stock levels.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    async fn get_item(&self, id: InventoryItemId) -> Result<Option<InventoryItem>, RepositoryError>;

    /// Atomically add `delta` to the on-hand quantity, clamping at zero.
    ///
    /// Returns `NotFound` if the item does not exist.
    async fn adjust_quantity(
        &self,
        id: InventoryItemId,
        delta: i32,
    ) -> Result<QuantityChange, RepositoryError>;

    /// Insert or update an item by `(phone_model, case_type)`.
    async fn upsert_item(
        &self,
        phone_model: &str,
        case_type: &str,
        unit_price: Decimal,
        quantity: i32,
        reorder_threshold: i32,
    ) -> Result<InventoryItem, RepositoryError>;
}

/// Gateway payment attempts.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Returns `Conflict` if the transaction reference is already used.
    async fn insert_payment(&self, payment: &NewPayment) -> Result<PaymentRecord, RepositoryError>;

    async fn get_by_txn_ref(&self, txn_ref: &str)
    -> Result<Option<PaymentRecord>, RepositoryError>;

    /// All attempts for an order, newest first.
    async fn list_for_order(&self, order_id: OrderId)
    -> Result<Vec<PaymentRecord>, RepositoryError>;

    /// Settle a pending attempt.
    ///
    /// Only applies while the record is still `pending`; returns `None` if the
    /// record does not exist or was already settled.
    async fn finalize_payment(
        &self,
        txn_ref: &str,
        outcome: &PaymentOutcome,
    ) -> Result<Option<PaymentRecord>, RepositoryError>;
}

/// Carrier shipments.
#[async_trait]
pub trait ShipmentStore: Send + Sync {
    async fn insert_shipment(&self, shipment: &NewShipment) -> Result<Shipment, RepositoryError>;

    /// The most recent shipment for an order.
    async fn get_by_order(&self, order_id: OrderId) -> Result<Option<Shipment>, RepositoryError>;

    async fn get_by_code(&self, code: &str) -> Result<Option<Shipment>, RepositoryError>;

    /// Returns `NotFound` if the shipment does not exist.
    async fn update_status(
        &self,
        id: ShipmentId,
        carrier_status: &str,
        status: ShippingStatus,
    ) -> Result<Shipment, RepositoryError>;
}

/// The set of stores the services run against.
#[derive(Clone)]
pub struct Stores {
    pub orders: Arc<dyn OrderStore>,
    pub inventory: Arc<dyn InventoryStore>,
    pub payments: Arc<dyn PaymentStore>,
    pub shipments: Arc<dyn ShipmentStore>,
    /// Primary cart snapshot backend.
    pub carts: Arc<dyn CartStorage>,
}

impl Stores {
    /// `PostgreSQL`-backed stores sharing one pool.
    #[must_use]
    pub fn postgres(pool: &PgPool) -> Self {
        Self {
            orders: Arc::new(PgOrderStore::new(pool.clone())),
            inventory: Arc::new(PgInventoryStore::new(pool.clone())),
            payments: Arc::new(PgPaymentStore::new(pool.clone())),
            shipments: Arc::new(PgShipmentStore::new(pool.clone())),
            carts: Arc::new(PgCartStorage::new(pool.clone())),
        }
    }

    /// All stores backed by a single in-memory store.
    #[must_use]
    pub fn memory(store: &Arc<MemoryStore>) -> Self {
        Self {
            orders: store.clone(),
            inventory: store.clone(),
            payments: store.clone(),
            shipments: store.clone(),
            carts: store.clone(),
        }
    }
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}
