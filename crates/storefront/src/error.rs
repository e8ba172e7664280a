//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures server-side failures to
//! Sentry before responding to the client. JSON route handlers return
//! `Result<T, AppError>`. Webhook boundaries never do; they map every
//! outcome onto the external caller's fixed response vocabulary.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::cart::{CartError, StorageError};
use crate::db::RepositoryError;
use crate::services::assets::AssetError;
use crate::services::ghn::GhnError;
use crate::services::orders::OrderError;
use crate::services::shipping::ShippingError;
use crate::services::vnpay::PaymentError;

/// Application-level error type for the storefront.
#[derive(Debug, Error)]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    /// Payment gateway operation failed.
    #[error("Payment error: {0}")]
    Payment(#[from] PaymentError),

    /// Carrier API operation failed.
    #[error("Carrier error: {0}")]
    Carrier(#[from] GhnError),

    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    #[error("Shipping error: {0}")]
    Shipping(#[from] ShippingError),

    #[error("Cart error: {0}")]
    Cart(#[from] CartError),

    #[error("Asset error: {0}")]
    Asset(#[from] AssetError),

    #[error("Session error: {0}")]
    Session(#[from] tower_sessions::session::Error),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Missing or wrong back-office credentials.
    #[error("Unauthorized")]
    Unauthorized,

    /// Request conflicts with the resource's current state.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Database(_) | Self::Session(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::Carrier(_) => StatusCode::BAD_GATEWAY,
            Self::Payment(err) => match err {
                PaymentError::Signature(_) | PaymentError::Repository(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
                _ => StatusCode::BAD_REQUEST,
            },
            Self::Order(err) => match err {
                OrderError::Validation(_)
                | OrderError::InvalidPhone(_)
                | OrderError::UnknownItem(_) => StatusCode::BAD_REQUEST,
                OrderError::NotFound(_) => StatusCode::NOT_FOUND,
                OrderError::NotCancellable(_) => StatusCode::CONFLICT,
                OrderError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Shipping(err) => match err {
                ShippingError::OrderNotFound(_)
                | ShippingError::NoShipment(_)
                | ShippingError::UnknownShipment(_) => StatusCode::NOT_FOUND,
                ShippingError::AlreadyShipped(_)
                | ShippingError::NotShippable(_)
                | ShippingError::CarrierRejected(_) => StatusCode::CONFLICT,
                ShippingError::MissingDestination => StatusCode::BAD_REQUEST,
                ShippingError::Carrier(_) => StatusCode::BAD_GATEWAY,
                ShippingError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Cart(err) => match err {
                CartError::LineNotFound(_) => StatusCode::NOT_FOUND,
                CartError::InvalidQuantity => StatusCode::BAD_REQUEST,
                CartError::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
                CartError::Serialize(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Asset(err) => match err {
                AssetError::InvalidKey(_) => StatusCode::BAD_REQUEST,
                AssetError::Io(_) | AssetError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
        }
    }

    // Don't expose internal error details to clients
    fn public_message(&self, status: StatusCode) -> String {
        if status == StatusCode::BAD_GATEWAY {
            return "Shipping service unavailable".to_string();
        }
        if status == StatusCode::SERVICE_UNAVAILABLE {
            let too_large = matches!(
                self,
                Self::Cart(CartError::Storage(StorageError::Exhausted { quota_only: true }))
            );
            return if too_large {
                "Cart is too large to save".to_string()
            } else {
                "Cart could not be saved".to_string()
            };
        }
        if status.is_server_error() {
            return "Internal server error".to_string();
        }

        match self {
            // One generic answer for every callback check.
            Self::Payment(_) => "Invalid payment callback".to_string(),
            Self::Order(err) => err.to_string(),
            Self::Shipping(err) => err.to_string(),
            Self::Cart(err) => err.to_string(),
            Self::Asset(_) => "Invalid asset path".to_string(),
            Self::NotFound(what) => format!("Not found: {what}"),
            Self::BadRequest(msg) | Self::Conflict(msg) => msg.clone(),
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Capture server errors to Sentry
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        let message = self.public_message(status);
        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Add a breadcrumb for a step in an external flow.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of events
/// leading up to an error.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("payment", "IPN received", Some(&[("txn_ref", "42_1757900000000")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use caseforge_core::OrderId;

    use super::*;

    fn get_status(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn test_app_error_display() {
        let err = AppError::NotFound("order 12".to_string());
        assert_eq!(err.to_string(), "Not found: order 12");

        let err = AppError::BadRequest("invalid input".to_string());
        assert_eq!(err.to_string(), "Bad request: invalid input");
    }

    #[test]
    fn test_app_error_status_codes() {
        assert_eq!(
            get_status(AppError::NotFound("test".to_string())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            get_status(AppError::Internal("test".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            get_status(OrderError::NotCancellable("shipped").into()),
            StatusCode::CONFLICT
        );
        assert_eq!(
            get_status(ShippingError::NoShipment(OrderId::new(1)).into()),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            get_status(PaymentError::InvalidSignature.into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            get_status(GhnError::MissingData.into()),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(get_status(AppError::Unauthorized), StatusCode::UNAUTHORIZED);
        assert_eq!(
            get_status(CartError::InvalidQuantity.into()),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_internal_details_are_hidden() {
        let err = AppError::Database(RepositoryError::DataCorruption("bad row 7".to_string()));
        let status = err.status();
        assert!(!err.public_message(status).contains("bad row"));

        let err = AppError::Payment(PaymentError::AmountMismatch {
            expected: 100,
            received: "1".to_string(),
        });
        assert_eq!(err.public_message(err.status()), "Invalid payment callback");
    }
}
