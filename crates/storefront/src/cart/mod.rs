//! Shopping cart persisted through a fallback chain of storage backends.
//!
//! A cart is a small JSON document. [`CartStore`] loads it, applies one
//! change, and writes it back through [`FallbackStorage`]. If every backend
//! rejects the snapshot for size, previews are compressed aggressively and
//! the write is retried once.

pub mod compress;
pub mod storage;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use caseforge_core::InventoryItemId;

pub use compress::{Compression, PREVIEW_COMPRESS_THRESHOLD};
pub use storage::{
    CartStorage, FallbackStorage, MemoryCartStorage, SessionCartStorage, StorageError,
};

/// Largest quantity allowed on a single cart line.
pub const MAX_LINE_QUANTITY: u32 = 99;

/// Errors from cart operations.
#[derive(Debug, Error)]
pub enum CartError {
    #[error("cart line not found: {0}")]
    LineNotFound(Uuid),

    #[error("quantity must be between 1 and {MAX_LINE_QUANTITY}")]
    InvalidQuantity,

    #[error("cart storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("cart serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// The visitor's cart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    pub items: Vec<CartItem>,
}

impl Cart {
    /// Sum of `unit_price × quantity` over all lines.
    #[must_use]
    pub fn subtotal(&self) -> Decimal {
        self.items.iter().map(CartItem::line_total).sum()
    }

    /// Total number of cases in the cart.
    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.items.iter().map(|item| item.quantity).sum()
    }
}

/// One cart line: a case for a phone model with the customer's design.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub line_id: Uuid,
    pub inventory_item_id: InventoryItemId,
    pub phone_model: String,
    pub case_type: String,
    pub unit_price: Decimal,
    pub quantity: u32,
    /// Uploaded design files, as returned by the upload endpoint.
    #[serde(default)]
    pub design_assets: Vec<String>,
    /// Rendered preview as a `data:` URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,
}

impl CartItem {
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }

    /// Lines with the same product and design are merged on add.
    fn same_design(&self, other: &NewCartItem) -> bool {
        self.inventory_item_id == other.inventory_item_id
            && self.design_assets == other.design_assets
    }
}

/// A line to add, priced by the caller from the inventory record.
#[derive(Debug, Clone)]
pub struct NewCartItem {
    pub inventory_item_id: InventoryItemId,
    pub phone_model: String,
    pub case_type: String,
    pub unit_price: Decimal,
    pub quantity: u32,
    pub design_assets: Vec<String>,
    pub preview: Option<String>,
}

/// Cart operations for one cart key.
pub struct CartStore {
    storage: FallbackStorage,
    key: String,
}

impl CartStore {
    #[must_use]
    pub const fn new(storage: FallbackStorage, key: String) -> Self {
        Self { storage, key }
    }

    /// Load the cart. A missing or unreadable snapshot is an empty cart.
    pub async fn load(&self) -> Cart {
        let Some(payload) = self.storage.load(&self.key).await else {
            return Cart::default();
        };
        match serde_json::from_str(&payload) {
            Ok(cart) => cart,
            Err(e) => {
                warn!(error = %e, "Discarding unreadable cart snapshot");
                Cart::default()
            }
        }
    }

    /// Add a line, merging it into an existing line with the same design.
    ///
    /// # Errors
    ///
    /// Returns `CartError::InvalidQuantity` for a zero quantity or one that
    /// would exceed the per-line limit, or a storage error.
    #[instrument(skip(self, item), fields(inventory_item_id = %item.inventory_item_id))]
    pub async fn add_item(&self, item: NewCartItem) -> Result<Cart, CartError> {
        if item.quantity == 0 || item.quantity > MAX_LINE_QUANTITY {
            return Err(CartError::InvalidQuantity);
        }

        let mut cart = self.load().await;

        if let Some(existing) = cart.items.iter_mut().find(|line| line.same_design(&item)) {
            let quantity = existing.quantity + item.quantity;
            if quantity > MAX_LINE_QUANTITY {
                return Err(CartError::InvalidQuantity);
            }
            existing.quantity = quantity;
            if item.preview.is_some() {
                existing.preview = item.preview.map(|p| {
                    compress::shrink_if_large(p, Compression::Standard, PREVIEW_COMPRESS_THRESHOLD)
                });
            }
        } else {
            cart.items.push(CartItem {
                line_id: Uuid::new_v4(),
                inventory_item_id: item.inventory_item_id,
                phone_model: item.phone_model,
                case_type: item.case_type,
                unit_price: item.unit_price,
                quantity: item.quantity,
                design_assets: item.design_assets,
                preview: item.preview.map(|p| {
                    compress::shrink_if_large(p, Compression::Standard, PREVIEW_COMPRESS_THRESHOLD)
                }),
            });
        }

        self.persist(cart).await
    }

    /// Set a line's quantity. Zero removes the line.
    ///
    /// # Errors
    ///
    /// Returns `CartError::LineNotFound` if the line is not in the cart.
    pub async fn update_quantity(&self, line_id: Uuid, quantity: u32) -> Result<Cart, CartError> {
        if quantity > MAX_LINE_QUANTITY {
            return Err(CartError::InvalidQuantity);
        }
        if quantity == 0 {
            return self.remove_item(line_id).await;
        }

        let mut cart = self.load().await;
        let line = cart
            .items
            .iter_mut()
            .find(|line| line.line_id == line_id)
            .ok_or(CartError::LineNotFound(line_id))?;
        line.quantity = quantity;

        self.persist(cart).await
    }

    /// Remove a line.
    ///
    /// # Errors
    ///
    /// Returns `CartError::LineNotFound` if the line is not in the cart.
    pub async fn remove_item(&self, line_id: Uuid) -> Result<Cart, CartError> {
        let mut cart = self.load().await;
        let before = cart.items.len();
        cart.items.retain(|line| line.line_id != line_id);
        if cart.items.len() == before {
            return Err(CartError::LineNotFound(line_id));
        }

        self.persist(cart).await
    }

    /// Empty the cart in every backend.
    pub async fn clear(&self) {
        self.storage.remove(&self.key).await;
    }

    async fn persist(&self, mut cart: Cart) -> Result<Cart, CartError> {
        let payload = serde_json::to_string(&cart)?;
        match self.storage.save(&self.key, &payload).await {
            Ok(_) => Ok(cart),
            Err(StorageError::Exhausted { quota_only: true }) => {
                info!("Cart over every storage quota, compressing previews");
                for item in &mut cart.items {
                    item.preview = item
                        .preview
                        .take()
                        .map(|p| compress::shrink_if_large(p, Compression::Aggressive, 0));
                }
                let payload = serde_json::to_string(&cart)?;
                self.storage.save(&self.key, &payload).await?;
                Ok(cart)
            }
            Err(e) => Err(e.into()),
        }
    }
}
