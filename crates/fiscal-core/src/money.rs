//! # Money Module
//!
//! Provides the `Money` type for handling monetary values safely, plus the
//! fixed two-decimal text form every fiscal document field uses.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  (150000 / 100).toFixed(2)     → "1500.00"   fine                       │
//! │  1e21 / 100                    → "1e+19"     ❌ scientific notation     │
//! │  0.1 + 0.2                     → 0.30000000000000004 ❌ drift           │
//! │                                                                         │
//! │  OUR SOLUTION: Integer Cents, formatted with integer division          │
//! │    150000 cents → 1500 (÷100) and 00 (%100) → "1500.00"                │
//! │    Parsing "1500.00" back gives exactly 150000 cents                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use fiscal_core::money::Money;
//!
//! let price = Money::from_cents(150000);
//! assert_eq!(price.to_decimal_string(), "1500.00");
//! assert_eq!(Money::parse_decimal("1500.00"), Some(price));
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};
use ts_rs::TS;

// =============================================================================
// Rounding
// =============================================================================

/// Divides `numerator` by `denominator`, rounding half away from zero.
///
/// Works on the exact rational value: the remainder decides the rounding,
/// so no float ever enters the computation. Returns `None` unless the
/// denominator is positive.
///
/// ```rust
/// use fiscal_core::money::div_round_half_away;
///
/// assert_eq!(div_round_half_away(5, 10), Some(1));
/// assert_eq!(div_round_half_away(-5, 10), Some(-1));
/// assert_eq!(div_round_half_away(4, 10), Some(0));
/// assert_eq!(div_round_half_away(4, 0), None);
/// ```
pub fn div_round_half_away(numerator: i128, denominator: i128) -> Option<i128> {
    if denominator <= 0 {
        return None;
    }
    let quotient = numerator / denominator;
    let remainder = numerator % denominator;

    if remainder.unsigned_abs() * 2 >= denominator.unsigned_abs() {
        Some(quotient + numerator.signum())
    } else {
        Some(quotient)
    }
}

/// Formats a value carrying two implied decimals as `"<int>.<2 digits>"`.
///
/// Shared by money, quantities (stored ×100) and rates (basis points of a
/// percent, also ×100).
pub fn format_hundredths(value: i64) -> String {
    let sign = if value < 0 { "-" } else { "" };
    let abs = value.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}

/// Parses `"<int>"`, `"<int>.<d>"` or `"<int>.<dd>"` into hundredths.
///
/// Returns `None` for anything else: more than two decimals, exponents,
/// stray characters, overflow.
pub fn parse_hundredths(text: &str) -> Option<i64> {
    let text = text.trim();
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };

    let (int_part, frac_part) = match digits.split_once('.') {
        Some((i, f)) => (i, f),
        None => (digits, ""),
    };

    if int_part.is_empty()
        || frac_part.len() > 2
        || !int_part.bytes().all(|b| b.is_ascii_digit())
        || !frac_part.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }

    let int_value: i64 = int_part.parse().ok()?;
    let frac_value: i64 = match frac_part.len() {
        0 => 0,
        1 => frac_part.parse::<i64>().ok()? * 10,
        _ => frac_part.parse().ok()?,
    };

    let magnitude = int_value.checked_mul(100)?.checked_add(frac_value)?;
    Some(if negative { -magnitude } else { magnitude })
}

// =============================================================================
// Money Type
// =============================================================================

/// Represents a monetary value in centavos (the smallest BRL unit).
///
/// ## Design Decisions
/// - **i64 (signed)**: Allows negative values for returns and adjustments
/// - **Single field tuple struct**: Zero-cost abstraction over i64
/// - **Derives**: Full serde support for JSON serialization
///
/// ## Where Money is Used
/// ```text
/// InvoiceItem.unit_price ──► InvoiceItem.total ──► TaxBreakdown.base
///                                   │
///                                   ▼
///              Invoice.totals.products ──► Invoice.totals.invoice
///                                   │
///                                   ▼
///                         "vProd" / "vNF" in the document
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents (the smallest currency unit).
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Returns the value in cents.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    /// Checks if the value is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checks if the value is negative (less than zero).
    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Fixed two-decimal text used by every monetary document field.
    ///
    /// ## Example
    /// ```rust
    /// use fiscal_core::money::Money;
    ///
    /// assert_eq!(Money::from_cents(150000).to_decimal_string(), "1500.00");
    /// assert_eq!(Money::from_cents(0).to_decimal_string(), "0.00");
    /// assert_eq!(Money::from_cents(-5).to_decimal_string(), "-0.05");
    /// ```
    pub fn to_decimal_string(&self) -> String {
        format_hundredths(self.0)
    }

    /// Parses the two-decimal text form back into exact cents.
    pub fn parse_decimal(text: &str) -> Option<Money> {
        parse_hundredths(text).map(Money)
    }

    /// Adds two amounts, `None` on overflow.
    #[inline]
    pub const fn checked_add(self, other: Money) -> Option<Money> {
        match self.0.checked_add(other.0) {
            Some(cents) => Some(Money(cents)),
            None => None,
        }
    }

    /// Subtracts `other`, `None` on overflow.
    #[inline]
    pub const fn checked_sub(self, other: Money) -> Option<Money> {
        match self.0.checked_sub(other.0) {
            Some(cents) => Some(Money(cents)),
            None => None,
        }
    }

    /// Subtracts `other`, clamping at the i64 bounds.
    #[inline]
    pub const fn saturating_sub(self, other: Money) -> Money {
        Money(self.0.saturating_sub(other.0))
    }

    /// Multiplies a unit price by a quantity stored in hundredths.
    ///
    /// `quantity_hundredths = 150` means 1.50 units. The product is rounded
    /// half away from zero back to whole cents. Returns `None` when the
    /// rounded result does not fit in cents.
    ///
    /// ```rust
    /// use fiscal_core::money::Money;
    ///
    /// let unit = Money::from_cents(150000);
    /// assert_eq!(unit.times_quantity(100), Some(unit)); // 1.00 unit
    /// assert_eq!(Money::from_cents(333).times_quantity(150), Some(Money::from_cents(500))); // 4.995 → 5.00
    /// assert_eq!(Money::from_cents(i64::MAX).times_quantity(200), None);
    /// ```
    pub fn times_quantity(&self, quantity_hundredths: i64) -> Option<Money> {
        let exact = i128::from(self.0) * i128::from(quantity_hundredths);
        let rounded = div_round_half_away(exact, 100)?;
        i64::try_from(rounded).ok().map(Money)
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R$ {}", self.to_decimal_string())
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Neg for Money {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Money(-self.0)
    }
}

impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), Add::add)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decimal_string() {
        assert_eq!(Money::from_cents(150000).to_decimal_string(), "1500.00");
        assert_eq!(Money::from_cents(0).to_decimal_string(), "0.00");
        assert_eq!(Money::from_cents(7).to_decimal_string(), "0.07");
        assert_eq!(Money::from_cents(-550).to_decimal_string(), "-5.50");
        assert_eq!(
            Money::from_cents(1_000_000_000_000).to_decimal_string(),
            "10000000000.00"
        );
    }

    #[test]
    fn test_decimal_string_never_scientific_or_truncated() {
        let text = Money::from_cents(150000).to_decimal_string();
        assert_ne!(text, "1500");
        assert!(!text.contains('e'));
        assert_eq!(text.split('.').nth(1).map(str::len), Some(2));
    }

    #[test]
    fn test_extreme_values_format() {
        assert_eq!(format_hundredths(i64::MIN), "-92233720368547758.08");
        assert_eq!(format_hundredths(i64::MAX), "92233720368547758.07");
    }

    #[test]
    fn test_parse_decimal() {
        assert_eq!(Money::parse_decimal("1500.00"), Some(Money::from_cents(150000)));
        assert_eq!(Money::parse_decimal("0.5"), Some(Money::from_cents(50)));
        assert_eq!(Money::parse_decimal("12"), Some(Money::from_cents(1200)));
        assert_eq!(Money::parse_decimal("-5.50"), Some(Money::from_cents(-550)));

        assert_eq!(Money::parse_decimal("1.5e3"), None);
        assert_eq!(Money::parse_decimal("1.005"), None);
        assert_eq!(Money::parse_decimal(""), None);
        assert_eq!(Money::parse_decimal(".50"), None);
        assert_eq!(Money::parse_decimal("1,50"), None);
    }

    #[test]
    fn test_round_half_away_from_zero() {
        assert_eq!(div_round_half_away(15, 10), Some(2));
        assert_eq!(div_round_half_away(25, 10), Some(3)); // not bankers (would be 2)
        assert_eq!(div_round_half_away(-25, 10), Some(-3));
        assert_eq!(div_round_half_away(14, 10), Some(1));
        assert_eq!(div_round_half_away(-14, 10), Some(-1));
        assert_eq!(div_round_half_away(0, 10), Some(0));
    }

    #[test]
    fn test_round_rejects_non_positive_divisor() {
        assert_eq!(div_round_half_away(10, 0), None);
        assert_eq!(div_round_half_away(10, -5), None);
    }

    #[test]
    fn test_times_quantity() {
        let cents = |m: Option<Money>| m.map(|m| m.cents());
        assert_eq!(cents(Money::from_cents(299).times_quantity(300)), Some(897));
        assert_eq!(cents(Money::from_cents(1000).times_quantity(33)), Some(330));
        assert_eq!(cents(Money::from_cents(1).times_quantity(50)), Some(1)); // 0.5 → 1
    }

    #[test]
    fn test_times_quantity_overflow_is_none() {
        // 2 units of i64::MAX used to wrap to -2 cents
        assert_eq!(Money::from_cents(i64::MAX).times_quantity(200), None);
        assert_eq!(Money::from_cents(i64::MIN).times_quantity(200), None);
        assert_eq!(
            Money::from_cents(i64::MAX).times_quantity(100),
            Some(Money::from_cents(i64::MAX))
        );
    }

    #[test]
    fn test_checked_arithmetic() {
        let max = Money::from_cents(i64::MAX);
        let one = Money::from_cents(1);

        assert_eq!(max.checked_add(one), None);
        assert_eq!(Money::from_cents(i64::MIN).checked_sub(one), None);
        assert_eq!(one.checked_add(one), Some(Money::from_cents(2)));
        assert_eq!(one.checked_sub(one), Some(Money::zero()));
        assert_eq!(one.saturating_sub(Money::from_cents(i64::MIN)), max);
    }

    #[test]
    fn test_arithmetic() {
        let a = Money::from_cents(1000);
        let b = Money::from_cents(500);

        assert_eq!((a + b).cents(), 1500);
        assert_eq!((a - b).cents(), 500);
        assert_eq!((a * 3).cents(), 3000);
        assert_eq!((-a).cents(), -1000);

        let total: Money = vec![a, b, b].into_iter().sum();
        assert_eq!(total.cents(), 2000);
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", Money::from_cents(1099)), "R$ 10.99");
    }
}
