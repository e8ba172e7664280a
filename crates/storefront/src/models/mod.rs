//! Domain models for the storefront.
//!
//! These are the shapes the services work with. Database row structs live
//! next to their queries in `db/` and are converted into these types there.

pub mod inventory;
pub mod order;
pub mod payment;
pub mod session;
pub mod shipment;

pub use inventory::{InventoryItem, QuantityChange};
pub use order::{LineItem, NewLineItem, NewOrder, Order};
pub use payment::{NewPayment, PaymentOutcome, PaymentRecord};
pub use shipment::{NewShipment, Shipment};
