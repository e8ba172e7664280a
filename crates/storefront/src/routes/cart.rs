//! Cart route handlers.
//!
//! The cart key lives in the session; the cart itself goes through the
//! storage fallback chain. Lines are priced from inventory, never from the
//! request.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::instrument;
use uuid::Uuid;

use caseforge_core::InventoryItemId;

use crate::cart::{Cart, CartItem, CartStore, NewCartItem};
use crate::error::{AppError, Result};
use crate::middleware::session::cart_key;
use crate::services::assets::validate_key;
use crate::state::AppState;

/// Cart as returned to the client.
#[derive(Debug, Serialize)]
pub struct CartView {
    pub items: Vec<CartItem>,
    pub subtotal: Decimal,
    pub item_count: u32,
}

impl From<Cart> for CartView {
    fn from(cart: Cart) -> Self {
        Self {
            subtotal: cart.subtotal(),
            item_count: cart.item_count(),
            items: cart.items,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AddItemForm {
    pub inventory_item_id: InventoryItemId,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    #[serde(default)]
    pub design_assets: Vec<String>,
    /// Rendered preview as a `data:` URL.
    #[serde(default)]
    pub preview: Option<String>,
}

const fn default_quantity() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
pub struct UpdateItemForm {
    pub quantity: u32,
}

async fn visitor_cart(state: &AppState, session: Session) -> Result<CartStore> {
    let key = cart_key(&session).await?;
    Ok(state.cart_store(session, key))
}

pub async fn show(State(state): State<AppState>, session: Session) -> Result<Json<CartView>> {
    let cart = visitor_cart(&state, session).await?.load().await;
    Ok(Json(cart.into()))
}

/// Add a line to the cart.
#[instrument(skip(state, session, form), fields(inventory_item_id = %form.inventory_item_id))]
pub async fn add(
    State(state): State<AppState>,
    session: Session,
    Json(form): Json<AddItemForm>,
) -> Result<Json<CartView>> {
    for key in &form.design_assets {
        validate_key(key)?;
    }

    let item = state
        .stores()
        .inventory
        .get_item(form.inventory_item_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("inventory item {}", form.inventory_item_id)))?;

    let cart = visitor_cart(&state, session)
        .await?
        .add_item(NewCartItem {
            inventory_item_id: item.id,
            phone_model: item.phone_model,
            case_type: item.case_type,
            unit_price: item.unit_price,
            quantity: form.quantity,
            design_assets: form.design_assets,
            preview: form.preview.filter(|p| p.starts_with("data:image/")),
        })
        .await?;
    Ok(Json(cart.into()))
}

/// Set a line's quantity; zero removes it.
pub async fn update(
    State(state): State<AppState>,
    session: Session,
    Path(line_id): Path<Uuid>,
    Json(form): Json<UpdateItemForm>,
) -> Result<Json<CartView>> {
    let cart = visitor_cart(&state, session)
        .await?
        .update_quantity(line_id, form.quantity)
        .await?;
    Ok(Json(cart.into()))
}

pub async fn remove(
    State(state): State<AppState>,
    session: Session,
    Path(line_id): Path<Uuid>,
) -> Result<Json<CartView>> {
    let cart = visitor_cart(&state, session).await?.remove_item(line_id).await?;
    Ok(Json(cart.into()))
}

pub async fn clear(State(state): State<AppState>, session: Session) -> Result<StatusCode> {
    visitor_cart(&state, session).await?.clear().await;
    Ok(StatusCode::NO_CONTENT)
}
