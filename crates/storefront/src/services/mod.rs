//! Business logic services for the storefront.
//!
//! # Services
//!
//! - `vnpay` - Payment request signing and callback verification
//! - `ghn` - Carrier client with static fallback geography
//! - `inventory` - Stock adjustment on order placement and cancellation
//! - `orders` - Checkout, cancellation and order lookup
//! - `shipping` - Carrier shipments and status updates
//! - `assets` - Design upload storage and relocation

pub mod assets;
pub mod ghn;
pub mod inventory;
pub mod orders;
pub mod shipping;
pub mod vnpay;
