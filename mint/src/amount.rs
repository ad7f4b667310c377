//! Fixed-point ledger amounts.
//!
//! Amounts are carried as integer base units (10^-8 of a coin) everywhere
//! inside the service; the 8-decimal string form exists only at the API and
//! ledger boundary. Matching a payment is therefore plain integer equality,
//! never floating-point comparison.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Base units per whole coin (8 decimal places).
pub const COIN: u64 = 100_000_000;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct Amount(u64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub const fn from_base_units(units: u64) -> Self {
        Amount(units)
    }

    pub const fn base_units(self) -> u64 {
        self.0
    }

    /// Rounds a decimal coin value, as deserialized from ledger JSON, to the
    /// nearest base unit. Exact for every value the ledger can encode.
    pub fn from_coins_lossy(value: f64) -> Self {
        Amount((value.max(0.0) * COIN as f64).round() as u64)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:08}", self.0 / COIN, self.0 % COIN)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AmountParseError {
    #[error("malformed decimal amount")]
    Malformed,
    #[error("amount out of range")]
    Overflow,
}

impl FromStr for Amount {
    type Err = AmountParseError;

    /// Parses a decimal coin amount with at most 8 fractional digits.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (whole, frac) = match s.split_once('.') {
            Some((w, f)) => (w, f),
            None => (s, ""),
        };

        if whole.is_empty() || !whole.bytes().all(|b| b.is_ascii_digit()) {
            return Err(AmountParseError::Malformed);
        }
        if frac.len() > 8 || !frac.bytes().all(|b| b.is_ascii_digit()) {
            return Err(AmountParseError::Malformed);
        }

        let whole: u64 = whole.parse().map_err(|_| AmountParseError::Overflow)?;
        let mut units = whole
            .checked_mul(COIN)
            .ok_or(AmountParseError::Overflow)?;

        if !frac.is_empty() {
            let scale = 10u64.pow((8 - frac.len()) as u32);
            let frac: u64 = frac.parse().map_err(|_| AmountParseError::Overflow)?;
            units = units
                .checked_add(frac * scale)
                .ok_or(AmountParseError::Overflow)?;
        }

        Ok(Amount(units))
    }
}
