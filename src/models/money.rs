use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::errors::ServiceError;

/// Currencies Stripe charges in whole units.
const ZERO_DECIMAL_CURRENCIES: &[&str] = &[
    "BIF", "CLP", "DJF", "GNF", "JPY", "KMF", "KRW", "MGA", "PYG", "RWF", "UGX", "VND", "VUV",
    "XAF", "XOF", "XPF",
];

pub fn is_zero_decimal_currency(currency: &str) -> bool {
    ZERO_DECIMAL_CURRENCIES
        .iter()
        .any(|code| code.eq_ignore_ascii_case(currency))
}

pub fn currency_decimals(currency: &str) -> u32 {
    if is_zero_decimal_currency(currency) {
        0
    } else {
        2
    }
}

/// Rounds to the store precision, halves away from zero.
pub fn sanitize_amount(amount: Decimal, decimals: u32) -> Decimal {
    amount.round_dp_with_strategy(decimals, RoundingStrategy::MidpointAwayFromZero)
}

/// `amount * percent / 100`, sanitized.
pub fn percent_of(amount: Decimal, percent: Decimal, decimals: u32) -> Decimal {
    sanitize_amount(amount * percent / Decimal::ONE_HUNDRED, decimals)
}

/// Converts a major-unit amount into the integer the gateway expects.
pub fn to_minor_units(amount: Decimal, currency: &str) -> Result<i64, ServiceError> {
    let scaled = if is_zero_decimal_currency(currency) {
        amount
    } else {
        amount * Decimal::ONE_HUNDRED
    };
    scaled
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .ok_or_else(|| ServiceError::ValidationError(format!("amount {} out of range", amount)))
}

pub fn from_minor_units(minor: i64, currency: &str) -> Decimal {
    if is_zero_decimal_currency(currency) {
        Decimal::from(minor)
    } else {
        Decimal::new(minor, 2)
    }
}
