//! Fixed-point money arithmetic.
//!
//! Amounts are scaled integers -- a count of hundredths -- rather than binary
//! floating point, so aggregation is exact and rounding behaves the way money
//! is expected to round. Parsing accepts arbitrary-precision decimal input
//! and normalizes to two fractional digits with round-half-up, ties away
//! from zero.

use std::fmt;
use std::ops::{Add, AddAssign};
use std::str::FromStr;

use serde::{Serialize, Serializer};

/// Number of fractional digits carried by an [`Amount`].
pub const SCALE: u32 = 2;

/// Errors produced when parsing an [`Amount`] from a decimal string.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseAmountError {
    /// The input was empty or contained no digits.
    #[error("amount is empty")]
    Empty,
    /// The input was not a plain decimal number.
    #[error("amount is not a valid decimal")]
    Invalid,
    /// The input does not fit the internal representation.
    #[error("amount is out of range")]
    OutOfRange,
}

/// An exact decimal money value at two-digit scale.
///
/// Stored as hundredths in an `i128`, giving headroom far beyond any sum a
/// sixty-second window can accumulate. Any sign is allowed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(i128);

impl Amount {
    /// The zero amount.
    pub const ZERO: Amount = Amount(0);

    /// Build an amount from a count of hundredths.
    #[must_use]
    pub const fn from_hundredths(hundredths: i128) -> Self {
        Self(hundredths)
    }

    /// The amount as a count of hundredths.
    #[must_use]
    pub const fn as_hundredths(self) -> i128 {
        self.0
    }

    /// Divide by a positive count, rounding half up -- ties away from zero --
    /// at two-digit scale. Used to compute averages.
    #[must_use]
    pub fn div_round_half_up(self, divisor: u64) -> Self {
        debug_assert!(divisor > 0, "division by zero count");
        let divisor = i128::from(divisor);
        let quotient = self.0 / divisor;
        let remainder = self.0 % divisor;
        if remainder.abs() * 2 >= divisor {
            Self(quotient + self.0.signum())
        } else {
            Self(quotient)
        }
    }
}

impl Add for Amount {
    type Output = Amount;

    fn add(self, rhs: Amount) -> Amount {
        Amount(self.0 + rhs.0)
    }
}

impl AddAssign for Amount {
    fn add_assign(&mut self, rhs: Amount) {
        self.0 += rhs.0;
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let magnitude = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", magnitude / 100, magnitude % 100)
    }
}

impl Serialize for Amount {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl FromStr for Amount {
    type Err = ParseAmountError;

    /// Parse a decimal string of any precision, e.g. `"12.3456"` or `"-0.5"`.
    ///
    /// Fractional digits past the second are folded into a single half-up
    /// rounding step: the third digit alone decides the direction, since any
    /// remainder at or above half a hundredth rounds away from zero and any
    /// remainder below it truncates.
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let (negative, unsigned) = match input.as_bytes().first() {
            Some(b'-') => (true, &input[1..]),
            Some(b'+') => (false, &input[1..]),
            Some(_) => (false, input),
            None => return Err(ParseAmountError::Empty),
        };

        let (integral, fraction) = match unsigned.split_once('.') {
            Some((integral, fraction)) => (integral, fraction),
            None => (unsigned, ""),
        };
        if integral.is_empty() && fraction.is_empty() {
            return Err(ParseAmountError::Empty);
        }
        if !integral.bytes().all(|b| b.is_ascii_digit())
            || !fraction.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(ParseAmountError::Invalid);
        }

        let mut hundredths: i128 = 0;
        for digit in integral.bytes() {
            hundredths = hundredths
                .checked_mul(10)
                .and_then(|acc| acc.checked_add(i128::from(digit - b'0')))
                .ok_or(ParseAmountError::OutOfRange)?;
        }
        hundredths = hundredths
            .checked_mul(100)
            .ok_or(ParseAmountError::OutOfRange)?;

        let mut digits = fraction.bytes().map(|b| i128::from(b - b'0'));
        hundredths = hundredths
            .checked_add(digits.next().unwrap_or(0) * 10)
            .and_then(|acc| acc.checked_add(digits.next().unwrap_or(0)))
            .ok_or(ParseAmountError::OutOfRange)?;
        if digits.next().unwrap_or(0) >= 5 {
            hundredths = hundredths
                .checked_add(1)
                .ok_or(ParseAmountError::OutOfRange)?;
        }

        if negative {
            hundredths = -hundredths;
        }
        Ok(Self(hundredths))
    }
}
