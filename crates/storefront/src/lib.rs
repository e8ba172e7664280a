//! Caseforge storefront library.
//!
//! Checkout, VNPay payments, GHN shipping and the cart for the Caseforge
//! phone case shop. The binary in `main.rs` wires this library to
//! `PostgreSQL`; tests run it against the in-memory stores.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cart;
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
