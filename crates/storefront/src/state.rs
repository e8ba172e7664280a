//! Application state shared across handlers.

use std::sync::Arc;

use tower_sessions::Session;

use crate::cart::{CartStorage, CartStore, FallbackStorage, MemoryCartStorage, SessionCartStorage};
use crate::config::StorefrontConfig;
use crate::db::Stores;
use crate::services::assets::{AssetStore, LocalAssetStore};
use crate::services::ghn::{GhnClient, GhnError};
use crate::services::orders::OrderService;
use crate::services::shipping::ShippingService;
use crate::services::vnpay::VnpayGateway;

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like the stores, adapters and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    stores: Stores,
    assets: Arc<dyn AssetStore>,
    gateway: VnpayGateway,
    orders: OrderService,
    shipping: ShippingService,
    memory_carts: Arc<MemoryCartStorage>,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Arguments
    ///
    /// * `config` - Storefront configuration
    /// * `stores` - Persistence backends (`PostgreSQL` or in-memory)
    ///
    /// # Errors
    ///
    /// Returns an error if the carrier client cannot be built from the
    /// configuration.
    pub fn new(config: StorefrontConfig, stores: Stores) -> Result<Self, GhnError> {
        let assets: Arc<dyn AssetStore> = Arc::new(LocalAssetStore::new(config.asset_dir.clone()));
        let ghn = GhnClient::new(&config.ghn)?;

        let gateway = VnpayGateway::new(
            config.vnpay.clone(),
            stores.payments.clone(),
            stores.orders.clone(),
            assets.clone(),
        );
        let orders = OrderService::new(
            stores.orders.clone(),
            stores.inventory.clone(),
            stores.shipments.clone(),
            assets.clone(),
            ghn.clone(),
        );
        let shipping = ShippingService::new(
            stores.orders.clone(),
            stores.inventory.clone(),
            stores.shipments.clone(),
            ghn,
        );

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                stores,
                assets,
                gateway,
                orders,
                shipping,
                memory_carts: Arc::new(MemoryCartStorage::new()),
            }),
        })
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn stores(&self) -> &Stores {
        &self.inner.stores
    }

    /// Design asset storage.
    #[must_use]
    pub fn assets(&self) -> &dyn AssetStore {
        self.inner.assets.as_ref()
    }

    /// VNPay payment gateway adapter.
    #[must_use]
    pub fn gateway(&self) -> &VnpayGateway {
        &self.inner.gateway
    }

    #[must_use]
    pub fn orders(&self) -> &OrderService {
        &self.inner.orders
    }

    #[must_use]
    pub fn shipping(&self) -> &ShippingService {
        &self.inner.shipping
    }

    /// GHN carrier client.
    #[must_use]
    pub fn ghn(&self) -> &GhnClient {
        self.inner.shipping.ghn()
    }

    /// Cart for one visitor: database first, then the session, then memory.
    #[must_use]
    pub fn cart_store(&self, session: Session, cart_key: String) -> CartStore {
        let backends: Vec<Arc<dyn CartStorage>> = vec![
            self.inner.stores.carts.clone(),
            Arc::new(SessionCartStorage::new(session)),
            self.inner.memory_carts.clone(),
        ];
        CartStore::new(FallbackStorage::new(backends), cart_key)
    }
}
