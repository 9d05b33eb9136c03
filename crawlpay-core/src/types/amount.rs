//! [`AmountValue`] represents a price in minor currency units.
//!
//! This module holds its type definition and implementations.

use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};

/// A monetary amount in minor currency units (e.g. cents).
///
/// Amounts travel as plain JSON integers and as decimal header values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AmountValue(pub u64);

impl AmountValue {
    /// Whether this amount is strictly positive.
    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }
}

impl From<u8> for AmountValue {
    fn from(value: u8) -> Self {
        AmountValue(value as u64)
    }
}

impl From<u16> for AmountValue {
    fn from(value: u16) -> Self {
        AmountValue(value as u64)
    }
}

impl From<u32> for AmountValue {
    fn from(value: u32) -> Self {
        AmountValue(value as u64)
    }
}

impl From<u64> for AmountValue {
    fn from(value: u64) -> Self {
        AmountValue(value)
    }
}

impl FromStr for AmountValue {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u64>().map(AmountValue)
    }
}

impl Display for AmountValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
