//! Miscellaneous common types used throughout the testbed.

use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};

/// An ISO 4217 currency code, e.g. `USD`.
///
/// Only the shape is checked: three ASCII letters, normalized to upper case.
///
/// ```
/// use crawlpay_core::types::Currency;
///
/// let usd: Currency = "usd".parse().unwrap();
/// assert_eq!(usd.as_str(), "USD");
/// assert!("US".parse::<Currency>().is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency(String);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid ISO 4217 currency code: {0:?}")]
pub struct InvalidCurrency(pub String);

impl Currency {
    /// United States dollar, the testbed's default currency.
    pub fn usd() -> Self {
        Currency("USD".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Currency {
    type Err = InvalidCurrency;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.len() == 3 && trimmed.chars().all(|c| c.is_ascii_alphabetic()) {
            Ok(Currency(trimmed.to_ascii_uppercase()))
        } else {
            Err(InvalidCurrency(s.to_string()))
        }
    }
}

impl TryFrom<String> for Currency {
    type Error = InvalidCurrency;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Currency> for String {
    fn from(value: Currency) -> Self {
        value.0
    }
}

impl Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
