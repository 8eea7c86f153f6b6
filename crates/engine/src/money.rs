//! Fixed-point helpers for monetary values.
//!
//! The bank reports amounts as integer minor units (pence). Staging stores
//! them as `DECIMAL(10,2)`, always derived by dividing by 100 — never as
//! floating point.
use rust_decimal::Decimal;

/// Converts integer minor units into an exact two-decimal amount.
///
/// `1050` minor units become `10.50`, never `10.499999…`.
#[must_use]
pub fn amount_from_minor_units(minor_units: i64) -> Decimal {
    Decimal::new(minor_units, 2)
}

/// Splits a total evenly across `days`, rounded to 2 decimal places.
///
/// Used by the budget-per-day report figure. `days == 0` returns the total
/// unchanged rather than dividing by zero.
#[must_use]
pub fn per_day(total: Decimal, days: u32) -> Decimal {
    if days == 0 {
        return total;
    }
    (total / Decimal::from(days)).round_dp(2)
}
