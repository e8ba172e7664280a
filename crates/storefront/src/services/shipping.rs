//! Carrier shipments for orders.
//!
//! Composes the GHN client with the order and shipment stores. Carrier
//! status updates (polled or pushed by webhook) are normalised with
//! [`map_status`] and moved onto the order lifecycle. A carrier-side
//! cancellation never touches inventory; stock is only returned through an
//! end-user cancel.

use std::sync::Arc;

use rust_decimal::prelude::ToPrimitive;
use thiserror::Error;
use tracing::{info, instrument, warn};

use caseforge_core::{OrderId, PaymentMethod, PaymentStatus, ShippingStatus};

use crate::db::{InventoryStore, OrderStore, RepositoryError, ShipmentStore};
use crate::models::{NewShipment, Order, Shipment};
use crate::services::ghn::{
    CreateShipment, GhnClient, GhnError, ITEM_WEIGHT_GRAMS, Package, ShipmentItem,
    WebhookPayload, map_status, tracking_url,
};

/// Errors from shipping operations.
#[derive(Debug, Error)]
pub enum ShippingError {
    #[error("order not found: {0}")]
    OrderNotFound(OrderId),

    #[error("order {0} has no shipment")]
    NoShipment(OrderId),

    #[error("order already has an active shipment: {0}")]
    AlreadyShipped(String),

    #[error("order has no destination district and ward")]
    MissingDestination,

    #[error("order cannot be shipped: {0}")]
    NotShippable(&'static str),

    #[error("unknown carrier order code: {0}")]
    UnknownShipment(String),

    #[error("carrier refused the request: {0}")]
    CarrierRejected(String),

    #[error("carrier error: {0}")]
    Carrier(#[from] GhnError),

    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Shipment lifecycle operations.
#[derive(Clone)]
pub struct ShippingService {
    orders: Arc<dyn OrderStore>,
    inventory: Arc<dyn InventoryStore>,
    shipments: Arc<dyn ShipmentStore>,
    ghn: GhnClient,
}

impl ShippingService {
    #[must_use]
    pub fn new(
        orders: Arc<dyn OrderStore>,
        inventory: Arc<dyn InventoryStore>,
        shipments: Arc<dyn ShipmentStore>,
        ghn: GhnClient,
    ) -> Self {
        Self {
            orders,
            inventory,
            shipments,
            ghn,
        }
    }

    #[must_use]
    pub const fn ghn(&self) -> &GhnClient {
        &self.ghn
    }

    async fn order(&self, order_id: OrderId) -> Result<Order, ShippingError> {
        self.orders
            .get_order(order_id)
            .await?
            .ok_or(ShippingError::OrderNotFound(order_id))
    }

    async fn shipment(&self, order_id: OrderId) -> Result<Shipment, ShippingError> {
        self.shipments
            .get_by_order(order_id)
            .await?
            .ok_or(ShippingError::NoShipment(order_id))
    }

    /// Book a carrier shipment for an order.
    ///
    /// # Errors
    ///
    /// Refuses cancelled orders, unpaid gateway orders, orders without a
    /// destination, and orders with an active shipment. Carrier failures
    /// are returned as `Carrier`.
    #[instrument(skip(self))]
    pub async fn create_shipment(&self, order_id: OrderId) -> Result<Shipment, ShippingError> {
        let order = self.order(order_id).await?;

        if order.status.is_terminal() {
            return Err(ShippingError::NotShippable("order is closed"));
        }
        if order.payment_method == PaymentMethod::Gateway
            && order.payment_status != PaymentStatus::Paid
        {
            return Err(ShippingError::NotShippable("payment has not been completed"));
        }
        if let Some(existing) = self.shipments.get_by_order(order_id).await?
            && existing.status != ShippingStatus::Cancelled
        {
            return Err(ShippingError::AlreadyShipped(existing.carrier_order_code));
        }
        let (Some(to_district_id), Some(to_ward_code)) =
            (order.to_district_id, order.to_ward_code.clone())
        else {
            return Err(ShippingError::MissingDestination);
        };

        let lines = self.orders.line_items(order_id).await?;
        let mut items = Vec::with_capacity(lines.len());
        for line in &lines {
            let name = match self.inventory.get_item(line.inventory_item_id).await {
                Ok(Some(item)) => format!("Ốp lưng {} ({})", item.phone_model, item.case_type),
                _ => format!("Ốp lưng #{}", line.inventory_item_id),
            };
            items.push(ShipmentItem {
                name,
                quantity: u32::try_from(line.quantity).unwrap_or_default(),
                weight: ITEM_WEIGHT_GRAMS,
            });
        }
        let cases = items.iter().map(|item| item.quantity).sum();

        let cod_amount = if order.payment_method == PaymentMethod::Cod {
            order.total.trunc().to_i64().unwrap_or_default()
        } else {
            0
        };

        let created = self
            .ghn
            .create_order(&CreateShipment {
                client_order_code: order.id.to_string(),
                to_name: order.customer_name.clone(),
                to_phone: order.customer_phone.as_str().to_string(),
                to_address: order.shipping_address.clone(),
                to_district_id,
                to_ward_code,
                cod_amount,
                insurance_value: order.subtotal.trunc().to_i64().unwrap_or_default(),
                package: Package::for_items(cases),
                items,
                note: order.note.clone(),
            })
            .await?;

        let shipment = self
            .shipments
            .insert_shipment(&NewShipment {
                order_id,
                carrier_order_code: created.order_code.clone(),
                carrier_status: "ready_to_pick".to_string(),
                status: ShippingStatus::ReadyToPick,
                tracking_url: tracking_url(&created.order_code),
                fee: created.total_fee,
                expected_delivery: created.expected_delivery,
            })
            .await?;

        if !self
            .orders
            .attach_carrier_order(order_id, &created.order_code)
            .await?
        {
            // Closed while the carrier was booking; undo the booking.
            warn!(carrier_order_code = %created.order_code, "Order closed during booking");
            match self.ghn.cancel_order(&created.order_code).await {
                Ok(result) if result.result => {}
                Ok(result) => warn!(message = %result.message, "Carrier refused to void booking"),
                Err(e) => warn!(error = %e, "Failed to void carrier booking"),
            }
            self.shipments
                .update_status(shipment.id, "cancel", ShippingStatus::Cancelled)
                .await?;
            return Err(ShippingError::NotShippable("order is closed"));
        }

        info!(carrier_order_code = %created.order_code, "Carrier shipment created");
        Ok(shipment)
    }

    /// Cancel the order's carrier shipment.
    ///
    /// Cancelling an already cancelled shipment returns it unchanged.
    ///
    /// # Errors
    ///
    /// Returns `NoShipment`, `CarrierRejected` if the carrier declines, or
    /// `Carrier` if it is unreachable.
    #[instrument(skip(self))]
    pub async fn cancel_shipment(&self, order_id: OrderId) -> Result<Shipment, ShippingError> {
        let shipment = self.shipment(order_id).await?;
        if shipment.status == ShippingStatus::Cancelled {
            return Ok(shipment);
        }

        let result = self.ghn.cancel_order(&shipment.carrier_order_code).await?;
        if !result.result {
            return Err(ShippingError::CarrierRejected(result.message));
        }

        let shipment = self
            .shipments
            .update_status(shipment.id, "cancel", ShippingStatus::Cancelled)
            .await?;
        self.orders.set_carrier_order_code(order_id, None).await?;

        info!(carrier_order_code = %shipment.carrier_order_code, "Carrier shipment cancelled");
        Ok(shipment)
    }

    /// Poll the carrier for the shipment's current status.
    ///
    /// # Errors
    ///
    /// Returns `NoShipment`, or `Carrier` if the carrier is unreachable.
    #[instrument(skip(self))]
    pub async fn refresh_status(&self, order_id: OrderId) -> Result<Shipment, ShippingError> {
        let shipment = self.shipment(order_id).await?;
        let detail = self.ghn.order_detail(&shipment.carrier_order_code).await?;
        self.apply_status(&shipment, &detail.status).await
    }

    /// Apply a status pushed by the carrier.
    ///
    /// # Errors
    ///
    /// Returns `UnknownShipment` for an order code we never booked.
    #[instrument(skip(self, payload), fields(order_code = %payload.order_code, status = %payload.status))]
    pub async fn apply_webhook(&self, payload: &WebhookPayload) -> Result<Shipment, ShippingError> {
        let shipment = self
            .shipments
            .get_by_code(&payload.order_code)
            .await?
            .ok_or_else(|| ShippingError::UnknownShipment(payload.order_code.clone()))?;
        self.apply_status(&shipment, &payload.status).await
    }

    async fn apply_status(
        &self,
        shipment: &Shipment,
        carrier_status: &str,
    ) -> Result<Shipment, ShippingError> {
        let status = map_status(carrier_status);
        if status == ShippingStatus::Pending {
            warn!(carrier_status, "Unrecognised carrier status");
        }

        let updated = self
            .shipments
            .update_status(shipment.id, carrier_status, status)
            .await?;

        if let Some(next) = status.implied_order_status() {
            let order = self.order(shipment.order_id).await?;
            if order.status.is_terminal() {
                if order.status != next {
                    warn!(
                        order_id = %order.id,
                        current = %order.status,
                        implied = %next,
                        "Ignoring carrier status for closed order"
                    );
                }
            } else if order.status != next {
                self.orders.set_status(order.id, next).await?;
                info!(order_id = %order.id, status = %next, "Order status updated from carrier");
            }
        }

        Ok(updated)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal::Decimal;

    use caseforge_core::{InventoryItemId, OrderStatus, PhoneNumber};

    use super::*;
    use crate::db::MemoryStore;
    use crate::models::{NewLineItem, NewOrder};
    use crate::services::ghn::client::tests::{STUB_TOKEN, config, spawn_stub};

    async fn service(store: &Arc<MemoryStore>, reachable: bool) -> ShippingService {
        let url = if reachable {
            format!("http://{}", spawn_stub().await)
        } else {
            "http://127.0.0.1:1".to_string()
        };
        let ghn = GhnClient::new(&config(&url, STUB_TOKEN)).unwrap();
        ShippingService::new(store.clone(), store.clone(), store.clone(), ghn)
    }

    async fn order(store: &MemoryStore, method: PaymentMethod, ward: Option<&str>) -> OrderId {
        let item: InventoryItemId = store
            .upsert_item("iPhone 15 Pro Max", "Ốp cứng", Decimal::from(180_000), 10, 2)
            .await
            .unwrap()
            .id;
        store
            .create_order(&NewOrder {
                customer_name: "Võ Minh E".to_string(),
                customer_phone: PhoneNumber::parse("0934567890").unwrap(),
                customer_email: None,
                shipping_address: "20 Pasteur, Quận 1".to_string(),
                to_district_id: Some(1442),
                to_ward_code: ward.map(String::from),
                payment_method: method,
                subtotal: Decimal::from(360_000),
                shipping_fee: Decimal::from(30_000),
                total: Decimal::from(390_000),
                note: None,
                line_items: vec![NewLineItem {
                    inventory_item_id: item,
                    quantity: 2,
                    unit_price: Decimal::from(180_000),
                    design_assets: Vec::new(),
                }],
            })
            .await
            .unwrap()
            .id
    }

    fn webhook(code: &str, status: &str) -> WebhookPayload {
        WebhookPayload {
            order_code: code.to_string(),
            status: status.to_string(),
            ..WebhookPayload::default()
        }
    }

    #[tokio::test]
    async fn test_create_shipment_records_and_blocks_second() {
        let store = Arc::new(MemoryStore::new());
        let service = service(&store, true).await;
        let order_id = order(&store, PaymentMethod::Cod, Some("20109")).await;

        let shipment = service.create_shipment(order_id).await.unwrap();
        assert_eq!(shipment.carrier_order_code, format!("GHN{order_id}"));
        assert_eq!(shipment.status, ShippingStatus::ReadyToPick);
        assert!(shipment.tracking_url.ends_with(&shipment.carrier_order_code));

        let order = store.get_order(order_id).await.unwrap().unwrap();
        assert!(order.has_carrier_order());
        assert_eq!(order.status, OrderStatus::Processing);

        assert!(matches!(
            service.create_shipment(order_id).await,
            Err(ShippingError::AlreadyShipped(_))
        ));
    }

    #[tokio::test]
    async fn test_create_shipment_preconditions() {
        let store = Arc::new(MemoryStore::new());
        let service = service(&store, true).await;

        let no_ward = order(&store, PaymentMethod::Cod, None).await;
        assert!(matches!(
            service.create_shipment(no_ward).await,
            Err(ShippingError::MissingDestination)
        ));

        let unpaid = order(&store, PaymentMethod::Gateway, Some("20109")).await;
        assert!(matches!(
            service.create_shipment(unpaid).await,
            Err(ShippingError::NotShippable(_))
        ));

        assert!(matches!(
            service.create_shipment(OrderId::new(404)).await,
            Err(ShippingError::OrderNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_carrier_failure_records_nothing() {
        let store = Arc::new(MemoryStore::new());
        let service = service(&store, false).await;
        let order_id = order(&store, PaymentMethod::Cod, Some("20109")).await;

        assert!(matches!(
            service.create_shipment(order_id).await,
            Err(ShippingError::Carrier(_))
        ));
        assert!(store.get_by_order(order_id).await.unwrap().is_none());
        assert!(!service.ghn().circuit().is_available());
    }

    #[tokio::test]
    async fn test_cancel_shipment_clears_carrier_code() {
        let store = Arc::new(MemoryStore::new());
        let service = service(&store, true).await;
        let order_id = order(&store, PaymentMethod::Cod, Some("20109")).await;
        service.create_shipment(order_id).await.unwrap();

        let cancelled = service.cancel_shipment(order_id).await.unwrap();
        assert_eq!(cancelled.status, ShippingStatus::Cancelled);
        let order = store.get_order(order_id).await.unwrap().unwrap();
        assert!(!order.has_carrier_order());

        // Idempotent, and no longer counts as an active shipment.
        service.cancel_shipment(order_id).await.unwrap();
        assert!(!matches!(
            service.create_shipment(order_id).await,
            Err(ShippingError::AlreadyShipped(_))
        ));
    }

    #[tokio::test]
    async fn test_webhook_moves_order_lifecycle() {
        let store = Arc::new(MemoryStore::new());
        let service = service(&store, true).await;
        let order_id = order(&store, PaymentMethod::Cod, Some("20109")).await;
        let code = service.create_shipment(order_id).await.unwrap().carrier_order_code;

        let shipment = service.apply_webhook(&webhook(&code, "delivering")).await.unwrap();
        assert_eq!(shipment.status, ShippingStatus::Delivering);

        service.apply_webhook(&webhook(&code, "delivered")).await.unwrap();
        let order = store.get_order(order_id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Completed);

        // A late transit update does not reopen a completed order.
        service.apply_webhook(&webhook(&code, "transporting")).await.unwrap();
        let order = store.get_order(order_id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Completed);
    }

    #[tokio::test]
    async fn test_webhook_cancel_does_not_restore_inventory() {
        let store = Arc::new(MemoryStore::new());
        let service = service(&store, true).await;
        let order_id = order(&store, PaymentMethod::Cod, Some("20109")).await;
        let item = store.line_items(order_id).await.unwrap()[0].inventory_item_id;
        let before = store.quantity(item).await;
        let code = service.create_shipment(order_id).await.unwrap().carrier_order_code;

        let shipment = service.apply_webhook(&webhook(&code, "cancel")).await.unwrap();
        assert_eq!(shipment.status, ShippingStatus::Cancelled);
        let order = store.get_order(order_id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Cancelled);
        assert_eq!(store.quantity(item).await, before);
    }

    #[tokio::test]
    async fn test_webhook_unknown_code_and_status() {
        let store = Arc::new(MemoryStore::new());
        let service = service(&store, true).await;
        let order_id = order(&store, PaymentMethod::Cod, Some("20109")).await;
        let code = service.create_shipment(order_id).await.unwrap().carrier_order_code;

        assert!(matches!(
            service.apply_webhook(&webhook("NOPE", "delivered")).await,
            Err(ShippingError::UnknownShipment(_))
        ));

        let shipment = service.apply_webhook(&webhook(&code, "lost")).await.unwrap();
        assert_eq!(shipment.status, ShippingStatus::Pending);
        assert_eq!(shipment.carrier_status, "lost");
        let order = store.get_order(order_id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Processing);
    }

    #[tokio::test]
    async fn test_refresh_status_polls_carrier() {
        let store = Arc::new(MemoryStore::new());
        let service = service(&store, true).await;
        let order_id = order(&store, PaymentMethod::Cod, Some("20109")).await;
        service.create_shipment(order_id).await.unwrap();

        let shipment = service.refresh_status(order_id).await.unwrap();
        assert_eq!(shipment.status, ShippingStatus::Delivering);
        assert!(matches!(
            service.refresh_status(OrderId::new(404)).await,
            Err(ShippingError::NoShipment(_))
        ));
    }
}
