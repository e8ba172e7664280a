//! Status enums for orders, payments and shipments.
//!
//! All statuses are persisted as lowercase snake-case `TEXT` (guarded by
//! `CHECK` constraints in the migrations) and round-trip through
//! [`std::fmt::Display`] / [`std::str::FromStr`].

use serde::{Deserialize, Serialize};

/// Error returned when a stored or submitted status string is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind}: {value}")]
pub struct StatusParseError {
    /// Which status family was being parsed.
    pub kind: &'static str,
    /// The rejected input.
    pub value: String,
}

macro_rules! text_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $kind:literal {
            $( $(#[$vmeta:meta])* $variant:ident => $text:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $( $(#[$vmeta])* $variant ),+
        }

        impl $name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            /// The persisted representation.
            #[must_use]
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $( Self::$variant => $text ),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = StatusParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $( $text => Ok(Self::$variant), )+
                    _ => Err(StatusParseError {
                        kind: $kind,
                        value: s.to_string(),
                    }),
                }
            }
        }
    };
}

text_enum! {
    /// How the customer pays for an order.
    PaymentMethod, "payment method" {
        /// Cash on delivery, collected by the carrier.
        Cod => "cod",
        /// Online payment through the VNPay gateway.
        Gateway => "gateway",
    }
}

text_enum! {
    /// Payment state of an order.
    PaymentStatus, "payment status" {
        Pending => "pending",
        Paid => "paid",
        Failed => "failed",
    }
}

text_enum! {
    /// Coarse order lifecycle.
    ///
    /// `Pending -> Processing -> Completed`, with `Cancelled` reachable from
    /// `Pending` or `Processing`.
    OrderStatus, "order status" {
        Pending => "pending",
        Processing => "processing",
        Completed => "completed",
        Cancelled => "cancelled",
    }
}

text_enum! {
    /// State of a single payment attempt.
    ///
    /// Only ever moves `Pending -> Success` or `Pending -> Error`.
    TransactionStatus, "transaction status" {
        Pending => "pending",
        Success => "success",
        Error => "error",
    }
}

text_enum! {
    /// Internal shipment status, normalised from the carrier's vocabulary.
    ShippingStatus, "shipping status" {
        /// Carrier status not (yet) recognised.
        Pending => "pending",
        ReadyToPick => "ready_to_pick",
        Picking => "picking",
        Picked => "picked",
        Delivering => "delivering",
        Delivered => "delivered",
        DeliveryFailed => "delivery_failed",
        Returned => "returned",
        Cancelled => "cancelled",
    }
}

impl Default for PaymentStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl Default for OrderStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl OrderStatus {
    /// Whether the order has reached a final state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

impl TransactionStatus {
    /// Whether the attempt has been settled by a verified callback.
    #[must_use]
    pub const fn is_final(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl ShippingStatus {
    /// Order lifecycle state implied by a shipment status, if any.
    ///
    /// Statuses that say nothing about the order (unknown, failed delivery
    /// attempts, returns in progress) yield `None` so the order is left alone.
    #[must_use]
    pub const fn implied_order_status(&self) -> Option<OrderStatus> {
        match self {
            Self::ReadyToPick | Self::Picking | Self::Picked | Self::Delivering => {
                Some(OrderStatus::Processing)
            }
            Self::Delivered => Some(OrderStatus::Completed),
            Self::Cancelled => Some(OrderStatus::Cancelled),
            Self::Pending | Self::DeliveryFailed | Self::Returned => None,
        }
    }
}
