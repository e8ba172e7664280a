//! Type-safe price representation using decimal arithmetic.
//!
//! The shop sells in Vietnamese dong, which has no minor unit in practice.
//! Payment gateways still expect a scaled integer ("amount × 100"), so the
//! conversion lives here rather than at each call site.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

/// Scale factor applied to amounts sent to the payment gateway.
pub const GATEWAY_AMOUNT_SCALE: i64 = 100;

/// A price with currency information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    /// Amount in the currency's standard unit (whole dong for VND).
    pub amount: Decimal,
    /// ISO 4217 currency code.
    pub currency_code: CurrencyCode,
}

impl Price {
    /// Create a new price.
    #[must_use]
    pub const fn new(amount: Decimal, currency_code: CurrencyCode) -> Self {
        Self {
            amount,
            currency_code,
        }
    }

    /// Create a price in Vietnamese dong.
    #[must_use]
    pub const fn vnd(amount: Decimal) -> Self {
        Self::new(amount, CurrencyCode::VND)
    }

    /// The amount as the gateway's scaled integer (`amount × 100`).
    ///
    /// Returns `None` for negative amounts or values that overflow `i64`.
    #[must_use]
    pub fn to_gateway_amount(&self) -> Option<i64> {
        if self.amount.is_sign_negative() {
            return None;
        }
        (self.amount * Decimal::from(GATEWAY_AMOUNT_SCALE))
            .round()
            .to_i64()
    }

    /// Format for display, e.g. `150.000 ₫`.
    #[must_use]
    pub fn display(&self) -> String {
        let whole = self.amount.round().to_i64().unwrap_or_default();
        let digits = whole.unsigned_abs().to_string();
        let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
        for (i, c) in digits.chars().enumerate() {
            if i > 0 && (digits.len() - i) % 3 == 0 {
                grouped.push('.');
            }
            grouped.push(c);
        }
        let sign = if whole < 0 { "-" } else { "" };
        format!("{sign}{grouped} {}", self.currency_code.symbol())
    }
}

/// ISO 4217 currency codes accepted by the storefront.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CurrencyCode {
    #[default]
    VND,
    USD,
}

impl CurrencyCode {
    /// Code sent to the payment gateway.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::VND => "VND",
            Self::USD => "USD",
        }
    }

    /// Display symbol.
    #[must_use]
    pub const fn symbol(&self) -> &'static str {
        match self {
            Self::VND => "₫",
            Self::USD => "$",
        }
    }
}
