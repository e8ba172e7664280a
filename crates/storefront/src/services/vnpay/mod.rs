//! VNPay payment gateway integration.
//!
//! - [`signature`] builds canonical query strings and HMAC-SHA512 signatures.
//! - [`gateway`] creates payment redirects and applies verified callbacks.

pub mod gateway;
pub mod signature;

use thiserror::Error;

use crate::db::RepositoryError;

pub use gateway::{
    CallbackResult, Locale, PaymentRedirect, PaymentRequest, VnpayGateway, response_message,
};
pub use signature::{Params, SignatureError};

/// Errors from the payment gateway adapter.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// Signature missing or wrong. Never says which.
    #[error("invalid signature")]
    InvalidSignature,

    #[error("missing callback field: {0}")]
    MissingField(&'static str),

    #[error("unknown transaction reference: {0}")]
    UnknownTransaction(String),

    #[error("amount mismatch: expected {expected}, received {received}")]
    AmountMismatch { expected: i64, received: String },

    #[error("amount cannot be sent to the gateway")]
    InvalidAmount,

    #[error("signing error: {0}")]
    Signature(#[from] SignatureError),

    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
}
