//! Money calculation utilities using rust_decimal for precision
//!
//! All calculations are done using `Decimal` internally, then converted to `f64`
//! for storage/serialization.

use rust_decimal::prelude::*;

/// Rounding strategy for monetary values (2 decimal places, half-up)
const DECIMAL_PLACES: u32 = 2;

/// Tolerance for monetary comparisons (0.01)
pub const MONEY_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// Convert f64 to Decimal for calculation
#[inline]
pub fn to_decimal(value: f64) -> Decimal {
    Decimal::from_f64(value).unwrap_or_default()
}

/// Convert Decimal back to f64 for storage, rounded to 2 decimal places
#[inline]
pub fn to_f64(value: Decimal) -> f64 {
    value
        .round_dp_with_strategy(DECIMAL_PLACES, RoundingStrategy::MidpointAwayFromZero)
        .to_f64()
        .unwrap_or_default()
}

/// Compare two monetary values for equality (within 0.01 tolerance)
pub fn money_eq(a: f64, b: f64) -> bool {
    let diff = (to_decimal(a) - to_decimal(b)).abs();
    diff < MONEY_TOLERANCE
}

/// quantity × unit price
pub fn line_total(quantity: i32, unit_price: f64) -> f64 {
    to_f64(Decimal::from(quantity) * to_decimal(unit_price))
}

/// subtotal + tax + service charge
pub fn order_total(subtotal: f64, tax_amount: f64, service_charge: f64) -> f64 {
    to_f64(to_decimal(subtotal) + to_decimal(tax_amount) + to_decimal(service_charge))
}

/// Sum monetary values with precise arithmetic
pub fn sum<I: IntoIterator<Item = f64>>(values: I) -> Decimal {
    values.into_iter().map(to_decimal).sum()
}
