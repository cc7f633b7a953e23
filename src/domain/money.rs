//! Exact money type backed by rust_decimal.
//!
//! Every ledger field is an `Amount`. Addition and subtraction are exact,
//! which is what makes forward-then-revert restore a record bit-for-bit.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal as RustDecimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Fixed-point money value for ledger arithmetic.
///
/// Derived figures (interest, prorated shares) are rounded to minor units
/// via [`Amount::round_minor`]; raw ledger mutations never round.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Amount(RustDecimal);

impl Amount {
    pub fn new(value: RustDecimal) -> Self {
        Amount(value)
    }

    /// Parse an Amount from a string losslessly.
    ///
    /// # Errors
    /// Returns an error if the string is not a valid decimal number.
    pub fn from_str_canonical(s: &str) -> Result<Self, rust_decimal::Error> {
        RustDecimal::from_str(s).map(Amount)
    }

    /// Format without exponent notation or trailing zeros.
    pub fn to_canonical_string(&self) -> String {
        format!("{}", self.0.normalize())
    }

    pub fn inner(&self) -> RustDecimal {
        self.0
    }

    pub fn zero() -> Self {
        Amount(RustDecimal::ZERO)
    }

    pub fn one() -> Self {
        Amount(RustDecimal::ONE)
    }

    pub fn from_i64(value: i64) -> Self {
        Amount(RustDecimal::from(value))
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_positive(&self) -> bool {
        !self.is_zero() && self.0.is_sign_positive()
    }

    pub fn is_negative(&self) -> bool {
        !self.is_zero() && self.0.is_sign_negative()
    }

    pub fn abs(&self) -> Self {
        Amount(self.0.abs())
    }

    /// Round to two decimal places (minor currency units), halves away from zero.
    pub fn round_minor(&self) -> Self {
        Amount(self.0.round_dp_with_strategy(
            2,
            rust_decimal::RoundingStrategy::MidpointAwayFromZero,
        ))
    }

    /// How many whole multiples of `unit` fit into this amount.
    ///
    /// Returns 0 when `unit` is not positive or the quotient does not fit
    /// an i64; deposit-period counting never legitimately reaches either.
    pub fn whole_units_of(&self, unit: Amount) -> i64 {
        if !unit.is_positive() {
            return 0;
        }
        (self.0 / unit.0).floor().to_i64().unwrap_or(0)
    }

    /// Truncate to an i64 counter value.
    pub fn to_i64(&self) -> i64 {
        self.0.trunc().to_i64().unwrap_or(0)
    }

    /// Clamp into `[lo, hi]`.
    pub fn clamp(self, lo: Amount, hi: Amount) -> Amount {
        if self < lo {
            lo
        } else if self > hi {
            hi
        } else {
            self
        }
    }

    pub fn max(self, other: Amount) -> Amount {
        if self >= other {
            self
        } else {
            other
        }
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_canonical_string())
    }
}

impl FromStr for Amount {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_str_canonical(s)
    }
}

impl From<RustDecimal> for Amount {
    fn from(value: RustDecimal) -> Self {
        Amount(value)
    }
}

impl From<Amount> for RustDecimal {
    fn from(value: Amount) -> Self {
        value.0
    }
}

impl std::ops::Add for Amount {
    type Output = Amount;

    fn add(self, rhs: Amount) -> Amount {
        Amount(self.0 + rhs.0)
    }
}

impl std::ops::Sub for Amount {
    type Output = Amount;

    fn sub(self, rhs: Amount) -> Amount {
        Amount(self.0 - rhs.0)
    }
}

impl std::ops::Mul for Amount {
    type Output = Amount;

    fn mul(self, rhs: Amount) -> Amount {
        Amount(self.0 * rhs.0)
    }
}

impl std::ops::Div for Amount {
    type Output = Amount;

    fn div(self, rhs: Amount) -> Amount {
        Amount(self.0 / rhs.0)
    }
}

impl std::ops::Neg for Amount {
    type Output = Amount;

    fn neg(self) -> Amount {
        Amount(-self.0)
    }
}

impl std::ops::AddAssign for Amount {
    fn add_assign(&mut self, rhs: Amount) {
        self.0 += rhs.0;
    }
}

impl std::ops::SubAssign for Amount {
    fn sub_assign(&mut self, rhs: Amount) {
        self.0 -= rhs.0;
    }
}

impl std::iter::Sum for Amount {
    fn sum<I: Iterator<Item = Amount>>(iter: I) -> Amount {
        iter.fold(Amount::zero(), |acc, a| acc + a)
    }
}
