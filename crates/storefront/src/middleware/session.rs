//! Session middleware configuration.
//!
//! Sets up `PostgreSQL`-backed sessions using tower-sessions. The session
//! holds the visitor's cart key, their upload folder, the orders they placed,
//! and a fallback copy of the cart when the database rejects it.

use sqlx::PgPool;
use tower_sessions::{Expiry, Session, SessionManagerLayer, SessionStore};
use tower_sessions_sqlx_store::PostgresStore;
use uuid::Uuid;

use caseforge_core::OrderId;

use crate::config::StorefrontConfig;
use crate::models::session::keys;

/// Session cookie name.
pub const SESSION_COOKIE_NAME: &str = "cf_session";

/// Session expiry time in seconds (7 days).
const SESSION_EXPIRY_SECONDS: i64 = 7 * 24 * 60 * 60;

/// Most recent orders a session keeps access to.
const MAX_PLACED_ORDERS: usize = 20;

/// Create the session layer with `PostgreSQL` store.
///
/// The `tower_sessions.session` table is created by migration.
#[must_use]
pub fn create_session_layer(
    pool: &PgPool,
    config: &StorefrontConfig,
) -> SessionManagerLayer<PostgresStore> {
    configure_session_layer(PostgresStore::new(pool.clone()), config)
}

/// Apply the storefront's cookie settings to any session store.
#[must_use]
pub fn configure_session_layer<S: SessionStore>(
    store: S,
    config: &StorefrontConfig,
) -> SessionManagerLayer<S> {
    let is_secure = config.base_url.starts_with("https://");

    SessionManagerLayer::new(store)
        .with_name(SESSION_COOKIE_NAME)
        .with_expiry(Expiry::OnInactivity(
            tower_sessions::cookie::time::Duration::seconds(SESSION_EXPIRY_SECONDS),
        ))
        .with_secure(is_secure)
        .with_same_site(tower_sessions::cookie::SameSite::Lax)
        .with_http_only(true)
        .with_path("/")
}

/// Read a per-visitor identifier from the session, creating it on first use.
async fn session_id(session: &Session, key: &str) -> Result<String, tower_sessions::session::Error> {
    if let Some(existing) = session.get::<String>(key).await? {
        return Ok(existing);
    }
    let id = Uuid::new_v4().simple().to_string();
    session.insert(key, &id).await?;
    Ok(id)
}

/// The visitor's cart key.
///
/// # Errors
///
/// Returns an error if the session store fails.
pub async fn cart_key(session: &Session) -> Result<String, tower_sessions::session::Error> {
    session_id(session, keys::CART_KEY).await
}

/// The visitor's upload folder name under `temp/`.
///
/// # Errors
///
/// Returns an error if the session store fails.
pub async fn upload_session(session: &Session) -> Result<String, tower_sessions::session::Error> {
    session_id(session, keys::UPLOAD_SESSION).await
}

/// Remember that this session placed `order_id`.
///
/// # Errors
///
/// Returns an error if the session store fails.
pub async fn remember_order(
    session: &Session,
    order_id: OrderId,
) -> Result<(), tower_sessions::session::Error> {
    let mut placed: Vec<OrderId> = session
        .get(keys::PLACED_ORDERS)
        .await?
        .unwrap_or_default();
    if !placed.contains(&order_id) {
        placed.push(order_id);
    }
    if placed.len() > MAX_PLACED_ORDERS {
        placed.drain(..placed.len() - MAX_PLACED_ORDERS);
    }
    session.insert(keys::PLACED_ORDERS, placed).await
}

/// Whether this session placed `order_id`.
///
/// # Errors
///
/// Returns an error if the session store fails.
pub async fn placed_order(
    session: &Session,
    order_id: OrderId,
) -> Result<bool, tower_sessions::session::Error> {
    let placed: Option<Vec<OrderId>> = session.get(keys::PLACED_ORDERS).await?;
    Ok(placed.is_some_and(|ids| ids.contains(&order_id)))
}
