//! Caseforge Core - Shared types library.
//!
//! This crate provides common types used across all Caseforge components:
//! - `storefront` - Checkout, payment gateway and carrier integration server
//! - `cli` - Command-line tools for migrations and inventory seeding
//!
//! # Architecture
//!
//! The core crate contains only types and traits - no I/O, no database access,
//! no HTTP clients. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for type-safe IDs, prices, phone numbers, and statuses

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
