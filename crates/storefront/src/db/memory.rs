//! In-memory implementation of every store, for tests and local demos.
//!
//! Mirrors the `PostgreSQL` semantics that services rely on: atomic clamped
//! quantity adjustment, pending-only payment finalization, and `Failed`
//! never overwriting `Paid`. Failures can be injected per store or per
//! inventory item.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::Mutex;

use caseforge_core::{
    InventoryItemId, LineItemId, OrderId, OrderStatus, PaymentRecordId, PaymentStatus, ShipmentId,
    ShippingStatus,
};

use super::carts::DATABASE_QUOTA_BYTES;
use super::{InventoryStore, OrderStore, PaymentStore, RepositoryError, ShipmentStore};
use crate::cart::{CartStorage, StorageError};
use crate::models::{
    InventoryItem, LineItem, NewOrder, NewPayment, NewShipment, Order, PaymentOutcome,
    PaymentRecord, QuantityChange, Shipment,
};

#[derive(Default)]
struct Tables {
    next_id: i64,
    orders: HashMap<OrderId, Order>,
    line_items: Vec<LineItem>,
    inventory: HashMap<InventoryItemId, InventoryItem>,
    payments: Vec<PaymentRecord>,
    shipments: Vec<Shipment>,
    carts: HashMap<String, String>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Store backed by process memory.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    fail_writes: AtomicBool,
    failing_items: Mutex<HashSet<InventoryItemId>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every write fail with a database error until reset.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make reads and adjustments of one inventory item fail.
    pub async fn fail_item(&self, id: InventoryItemId) {
        self.failing_items.lock().await.insert(id);
    }

    /// Current on-hand quantity of an item.
    pub async fn quantity(&self, id: InventoryItemId) -> Option<i32> {
        self.tables.lock().await.inventory.get(&id).map(|i| i.quantity)
    }

    fn check_writable(&self) -> Result<(), RepositoryError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(RepositoryError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }

    async fn check_item(&self, id: InventoryItemId) -> Result<(), RepositoryError> {
        if self.failing_items.lock().await.contains(&id) {
            return Err(RepositoryError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn ping(&self) -> Result<(), RepositoryError> {
        Ok(())
    }

    async fn create_order(&self, new: &NewOrder) -> Result<Order, RepositoryError> {
        self.check_writable()?;
        let mut tables = self.tables.lock().await;

        if let Some(missing) = new
            .line_items
            .iter()
            .find(|line| !tables.inventory.contains_key(&line.inventory_item_id))
        {
            return Err(RepositoryError::Conflict(format!(
                "inventory item {} does not exist",
                missing.inventory_item_id
            )));
        }

        let now = Utc::now();
        let order = Order {
            id: OrderId::new(tables.next_id()),
            customer_name: new.customer_name.clone(),
            customer_phone: new.customer_phone.clone(),
            customer_email: new.customer_email.clone(),
            shipping_address: new.shipping_address.clone(),
            to_district_id: new.to_district_id,
            to_ward_code: new.to_ward_code.clone(),
            payment_method: new.payment_method,
            payment_status: PaymentStatus::Pending,
            status: OrderStatus::Pending,
            subtotal: new.subtotal,
            shipping_fee: new.shipping_fee,
            total: new.total,
            carrier_order_code: None,
            note: new.note.clone(),
            created_at: now,
            updated_at: now,
        };

        for line in &new.line_items {
            let id = LineItemId::new(tables.next_id());
            tables.line_items.push(LineItem {
                id,
                order_id: order.id,
                inventory_item_id: line.inventory_item_id,
                quantity: line.quantity,
                unit_price: line.unit_price,
                design_assets: line.design_assets.clone(),
            });
        }
        tables.orders.insert(order.id, order.clone());

        Ok(order)
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        Ok(self.tables.lock().await.orders.get(&id).cloned())
    }

    async fn line_items(&self, id: OrderId) -> Result<Vec<LineItem>, RepositoryError> {
        Ok(self
            .tables
            .lock()
            .await
            .line_items
            .iter()
            .filter(|line| line.order_id == id)
            .cloned()
            .collect())
    }

    async fn set_payment_status(
        &self,
        id: OrderId,
        status: PaymentStatus,
    ) -> Result<PaymentStatus, RepositoryError> {
        self.check_writable()?;
        let mut tables = self.tables.lock().await;
        let order = tables.orders.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        if !(order.payment_status == PaymentStatus::Paid && status == PaymentStatus::Failed) {
            order.payment_status = status;
            order.updated_at = Utc::now();
        }
        Ok(order.payment_status)
    }

    async fn set_status(&self, id: OrderId, status: OrderStatus) -> Result<(), RepositoryError> {
        self.check_writable()?;
        let mut tables = self.tables.lock().await;
        let order = tables.orders.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        order.status = status;
        order.updated_at = Utc::now();
        Ok(())
    }

    async fn cancel_if_open(&self, id: OrderId) -> Result<bool, RepositoryError> {
        self.check_writable()?;
        let mut tables = self.tables.lock().await;
        let shipped = tables
            .shipments
            .iter()
            .any(|s| s.order_id == id && s.status != ShippingStatus::Cancelled);
        let order = tables.orders.get_mut(&id).ok_or(RepositoryError::NotFound)?;

        let open = matches!(order.status, OrderStatus::Pending | OrderStatus::Processing);
        if !open || order.carrier_order_code.is_some() || shipped {
            return Ok(false);
        }
        order.status = OrderStatus::Cancelled;
        order.updated_at = Utc::now();
        Ok(true)
    }

    async fn attach_carrier_order(&self, id: OrderId, code: &str) -> Result<bool, RepositoryError> {
        self.check_writable()?;
        let mut tables = self.tables.lock().await;
        let order = tables.orders.get_mut(&id).ok_or(RepositoryError::NotFound)?;

        match order.status {
            OrderStatus::Pending | OrderStatus::Processing => {
                order.carrier_order_code = Some(code.to_string());
                order.status = OrderStatus::Processing;
                order.updated_at = Utc::now();
                Ok(true)
            }
            OrderStatus::Completed | OrderStatus::Cancelled => Ok(false),
        }
    }

    async fn set_carrier_order_code(
        &self,
        id: OrderId,
        code: Option<&str>,
    ) -> Result<(), RepositoryError> {
        self.check_writable()?;
        let mut tables = self.tables.lock().await;
        let order = tables.orders.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        order.carrier_order_code = code.map(String::from);
        order.updated_at = Utc::now();
        Ok(())
    }

    async fn update_line_item_assets(
        &self,
        id: LineItemId,
        assets: &[String],
    ) -> Result<(), RepositoryError> {
        self.check_writable()?;
        let mut tables = self.tables.lock().await;
        let line = tables
            .line_items
            .iter_mut()
            .find(|line| line.id == id)
            .ok_or(RepositoryError::NotFound)?;
        line.design_assets = assets.to_vec();
        Ok(())
    }
}

#[async_trait]
impl InventoryStore for MemoryStore {
    async fn get_item(&self, id: InventoryItemId) -> Result<Option<InventoryItem>, RepositoryError> {
        self.check_item(id).await?;
        Ok(self.tables.lock().await.inventory.get(&id).cloned())
    }

    async fn adjust_quantity(
        &self,
        id: InventoryItemId,
        delta: i32,
    ) -> Result<QuantityChange, RepositoryError> {
        self.check_writable()?;
        self.check_item(id).await?;
        let mut tables = self.tables.lock().await;
        let item = tables.inventory.get_mut(&id).ok_or(RepositoryError::NotFound)?;

        let previous = item.quantity;
        item.quantity = previous.saturating_add(delta).max(0);
        item.updated_at = Utc::now();

        Ok(QuantityChange {
            item_id: id,
            previous,
            current: item.quantity,
            reorder_threshold: item.reorder_threshold,
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
        self.check_writable()?;
        let mut tables = self.tables.lock().await;

        let existing = tables
            .inventory
            .values()
            .find(|i| i.phone_model == phone_model && i.case_type == case_type)
            .map(|i| i.id);
        let id = match existing {
            Some(id) => id,
            None => InventoryItemId::new(tables.next_id()),
        };

        let item = InventoryItem {
            id,
            phone_model: phone_model.to_string(),
            case_type: case_type.to_string(),
            unit_price,
            quantity: quantity.max(0),
            reorder_threshold,
            template_assets: Vec::new(),
            updated_at: Utc::now(),
        };
        tables.inventory.insert(id, item.clone());

        Ok(item)
    }
}

#[async_trait]
impl PaymentStore for MemoryStore {
    async fn insert_payment(&self, payment: &NewPayment) -> Result<PaymentRecord, RepositoryError> {
        self.check_writable()?;
        let mut tables = self.tables.lock().await;

        if tables.payments.iter().any(|p| p.txn_ref == payment.txn_ref) {
            return Err(RepositoryError::Conflict(
                "transaction reference already exists".to_string(),
            ));
        }

        let now = Utc::now();
        let record = PaymentRecord {
            id: PaymentRecordId::new(tables.next_id()),
            order_id: payment.order_id,
            txn_ref: payment.txn_ref.clone(),
            amount: payment.amount,
            transaction_status: caseforge_core::TransactionStatus::Pending,
            response_code: None,
            bank_code: None,
            gateway_transaction_no: None,
            paid_at: None,
            created_at: now,
            updated_at: now,
        };
        tables.payments.push(record.clone());

        Ok(record)
    }

    async fn get_by_txn_ref(
        &self,
        txn_ref: &str,
    ) -> Result<Option<PaymentRecord>, RepositoryError> {
        Ok(self
            .tables
            .lock()
            .await
            .payments
            .iter()
            .find(|p| p.txn_ref == txn_ref)
            .cloned())
    }

    async fn list_for_order(
        &self,
        order_id: OrderId,
    ) -> Result<Vec<PaymentRecord>, RepositoryError> {
        Ok(self
            .tables
            .lock()
            .await
            .payments
            .iter()
            .rev()
            .filter(|p| p.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn finalize_payment(
        &self,
        txn_ref: &str,
        outcome: &PaymentOutcome,
    ) -> Result<Option<PaymentRecord>, RepositoryError> {
        self.check_writable()?;
        let mut tables = self.tables.lock().await;

        let Some(record) = tables
            .payments
            .iter_mut()
            .find(|p| p.txn_ref == txn_ref && !p.transaction_status.is_final())
        else {
            return Ok(None);
        };

        record.transaction_status = outcome.transaction_status;
        record.response_code = Some(outcome.response_code.clone());
        record.bank_code.clone_from(&outcome.bank_code);
        record
            .gateway_transaction_no
            .clone_from(&outcome.gateway_transaction_no);
        record.paid_at = outcome.paid_at;
        record.updated_at = Utc::now();

        Ok(Some(record.clone()))
    }
}

#[async_trait]
impl ShipmentStore for MemoryStore {
    async fn insert_shipment(&self, shipment: &NewShipment) -> Result<Shipment, RepositoryError> {
        self.check_writable()?;
        let mut tables = self.tables.lock().await;

        if tables
            .shipments
            .iter()
            .any(|s| s.carrier_order_code == shipment.carrier_order_code)
        {
            return Err(RepositoryError::Conflict(
                "carrier order code already exists".to_string(),
            ));
        }

        let now = Utc::now();
        let record = Shipment {
            id: ShipmentId::new(tables.next_id()),
            order_id: shipment.order_id,
            carrier_order_code: shipment.carrier_order_code.clone(),
            carrier_status: shipment.carrier_status.clone(),
            status: shipment.status,
            tracking_url: shipment.tracking_url.clone(),
            fee: shipment.fee,
            expected_delivery: shipment.expected_delivery,
            created_at: now,
            updated_at: now,
        };
        tables.shipments.push(record.clone());

        Ok(record)
    }

    async fn get_by_order(&self, order_id: OrderId) -> Result<Option<Shipment>, RepositoryError> {
        Ok(self
            .tables
            .lock()
            .await
            .shipments
            .iter()
            .rev()
            .find(|s| s.order_id == order_id)
            .cloned())
    }

    async fn get_by_code(&self, code: &str) -> Result<Option<Shipment>, RepositoryError> {
        Ok(self
            .tables
            .lock()
            .await
            .shipments
            .iter()
            .find(|s| s.carrier_order_code == code)
            .cloned())
    }

    async fn update_status(
        &self,
        id: ShipmentId,
        carrier_status: &str,
        status: ShippingStatus,
    ) -> Result<Shipment, RepositoryError> {
        self.check_writable()?;
        let mut tables = self.tables.lock().await;
        let shipment = tables
            .shipments
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or(RepositoryError::NotFound)?;

        shipment.carrier_status = carrier_status.to_string();
        shipment.status = status;
        shipment.updated_at = Utc::now();

        Ok(shipment.clone())
    }
}

#[async_trait]
impl CartStorage for MemoryStore {
    fn name(&self) -> &'static str {
        "database"
    }

    fn quota(&self) -> usize {
        DATABASE_QUOTA_BYTES
    }

    async fn load(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.tables.lock().await.carts.get(key).cloned())
    }

    async fn save(&self, key: &str, payload: &str) -> Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::unavailable(self.name(), "writes disabled"));
        }
        self.tables
            .lock()
            .await
            .carts
            .insert(key.to_string(), payload.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.tables.lock().await.carts.remove(key);
        Ok(())
    }
}
