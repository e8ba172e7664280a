//! GHN (Giao Hàng Nhanh) carrier integration.
//!
//! [`GhnClient`] wraps the carrier's address lookup, fee quote and shipping
//! order endpoints. Each client owns a [`CircuitState`] that records whether
//! the last call reached the carrier; geographic lookups and fee quotes fall
//! back to static advisory data while it is down.

pub(crate) mod client;
pub mod fallback;
pub mod types;

use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;
use tracing::{info, warn};

pub use client::{GhnClient, tracking_url};
pub use types::{
    CancelResult, CreateShipment, CreatedShipment, District, FeeQuote, FeeRequest,
    ITEM_WEIGHT_GRAMS, Package, Province, ShipmentDetail, ShipmentItem, Ward, WebhookPayload,
    map_status,
};

/// Errors that can occur when talking to the GHN API.
#[derive(Debug, Error)]
pub enum GhnError {
    /// Transport failure or timeout.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The envelope carried a non-success code.
    #[error("GHN API error {code}: {message}")]
    Api { code: i64, message: String },

    /// A success envelope without a `data` payload.
    #[error("GHN response missing data")]
    MissingData,

    /// The client could not be built from configuration.
    #[error("invalid GHN configuration: {0}")]
    Config(String),
}

/// Whether the carrier API answered the most recent call.
///
/// A heuristic flag only: any failure marks it down and the next success
/// marks it up again. There is no half-open state or retry schedule.
#[derive(Debug)]
pub struct CircuitState {
    available: AtomicBool,
}

impl Default for CircuitState {
    fn default() -> Self {
        Self {
            available: AtomicBool::new(true),
        }
    }
}

impl CircuitState {
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::Relaxed)
    }

    pub fn mark_up(&self) {
        if !self.available.swap(true, Ordering::Relaxed) {
            info!("GHN API reachable again");
        }
    }

    pub fn mark_down(&self) {
        if self.available.swap(false, Ordering::Relaxed) {
            warn!("GHN API unavailable, serving fallback data");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_circuit_state_toggles() {
        let state = CircuitState::default();
        assert!(state.is_available());

        state.mark_down();
        state.mark_down();
        assert!(!state.is_available());

        state.mark_up();
        assert!(state.is_available());
    }
}
