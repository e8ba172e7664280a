//! Session-related types.

/// Session keys used by the storefront.
pub mod keys {
    /// Key for the per-visitor cart key (a UUID string).
    pub const CART_KEY: &str = "cart_key";

    /// Key for the current upload session, the `temp/{id}/` folder that
    /// holds design assets until an order claims them.
    pub const UPLOAD_SESSION: &str = "upload_session";

    /// Key for the IDs of orders placed from this session.
    pub const PLACED_ORDERS: &str = "placed_orders";

    /// Prefix for cart snapshots stored directly in the session.
    pub const CART_SNAPSHOT_PREFIX: &str = "cart_snapshot:";
}
