//! Monetary types for the Tally ledger core.

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::ops::{Add, Neg, Sub};

/// A monetary amount with currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    /// The amount value (high precision decimal).
    pub value: Decimal,
    /// ISO 4217 currency code.
    pub currency: Currency,
}

impl Money {
    /// Create a new Money instance.
    pub fn new(value: Decimal, currency: Currency) -> Self {
        Self { value, currency }
    }

    /// Create from a string value.
    pub fn from_str(value: &str, currency: Currency) -> Result<Self, rust_decimal::Error> {
        Ok(Self {
            value: value.parse()?,
            currency,
        })
    }

    /// Create a zero amount in the given currency.
    pub fn zero(currency: Currency) -> Self {
        Self {
            value: Decimal::ZERO,
            currency,
        }
    }

    /// Check if the amount is positive.
    pub fn is_positive(&self) -> bool {
        self.value > Decimal::ZERO
    }

    /// Check if the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.value.is_zero()
    }

    /// Check if the amount is negative.
    pub fn is_negative(&self) -> bool {
        self.value < Decimal::ZERO
    }

    /// Get the absolute value.
    pub fn abs(&self) -> Self {
        Self {
            value: self.value.abs(),
            currency: self.currency.clone(),
        }
    }

    /// Round to the currency's standard decimal places (half-even).
    pub fn round(&self) -> Self {
        let places = self.currency.decimal_places();
        Self {
            value: self
                .value
                .round_dp_with_strategy(places, RoundingStrategy::MidpointNearestEven),
            currency: self.currency.clone(),
        }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value, self.currency)
    }
}

impl Add for Money {
    type Output = Result<Money, CurrencyMismatchError>;

    fn add(self, other: Money) -> Self::Output {
        if self.currency != other.currency {
            return Err(CurrencyMismatchError {
                expected: self.currency,
                actual: other.currency,
            });
        }
        Ok(Money {
            value: self.value + other.value,
            currency: self.currency,
        })
    }
}

impl Sub for Money {
    type Output = Result<Money, CurrencyMismatchError>;

    fn sub(self, other: Money) -> Self::Output {
        if self.currency != other.currency {
            return Err(CurrencyMismatchError {
                expected: self.currency,
                actual: other.currency,
            });
        }
        Ok(Money {
            value: self.value - other.value,
            currency: self.currency,
        })
    }
}

impl Neg for Money {
    type Output = Money;

    fn neg(self) -> Self::Output {
        Money {
            value: -self.value,
            currency: self.currency,
        }
    }
}

/// Error when attempting operations on different currencies.
#[derive(Debug, Clone)]
pub struct CurrencyMismatchError {
    pub expected: Currency,
    pub actual: Currency,
}

impl fmt::Display for CurrencyMismatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Currency mismatch: expected {}, got {}",
            self.expected, self.actual
        )
    }
}

impl std::error::Error for CurrencyMismatchError {}

/// ISO 4217 currency code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Currency(String);

impl Currency {
    /// Create a new currency from code.
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into().to_uppercase())
    }

    /// Get the currency code.
    pub fn code(&self) -> &str {
        &self.0
    }

    /// Get the standard decimal places for this currency.
    pub fn decimal_places(&self) -> u32 {
        match self.0.as_str() {
            "JPY" | "KRW" | "VND" => 0,
            "BHD" | "KWD" | "OMR" => 3,
            _ => 2,
        }
    }

    /// Common currencies
    pub fn eur() -> Self {
        Self::new("EUR")
    }

    pub fn usd() -> Self {
        Self::new("USD")
    }

    pub fn gbp() -> Self {
        Self::new("GBP")
    }

    pub fn bgn() -> Self {
        Self::new("BGN")
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Currency {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Exchange rate table with EUR as the pivot currency.
///
/// Each entry maps a currency to units-of-that-currency per 1 EUR. The
/// table is supplied by the caller at call time; the ledger core never
/// fetches rates itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateTable {
    rates: HashMap<Currency, Decimal>,
    /// When this table was produced by its provider.
    pub as_of: DateTime<Utc>,
}

impl RateTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self {
            rates: HashMap::new(),
            as_of: Utc::now(),
        }
    }

    /// Create a table pre-seeded with the pivot rate (EUR -> 1).
    pub fn with_pivot() -> Self {
        let mut table = Self::new();
        table.insert(Currency::eur(), Decimal::ONE);
        table
    }

    /// The pivot currency through which all conversions are routed.
    pub fn pivot() -> Currency {
        Currency::eur()
    }

    /// Set the rate for a currency (units per 1 EUR).
    pub fn insert(&mut self, currency: Currency, per_eur: Decimal) {
        self.rates.insert(currency, per_eur);
    }

    /// Get the rate for a currency, if present.
    pub fn get(&self, currency: &Currency) -> Option<Decimal> {
        self.rates.get(currency).copied()
    }

    /// Check whether a currency is present.
    pub fn contains(&self, currency: &Currency) -> bool {
        self.rates.contains_key(currency)
    }

    /// Number of currencies in the table.
    pub fn len(&self) -> usize {
        self.rates.len()
    }

    /// Check if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }
}

impl Default for RateTable {
    fn default() -> Self {
        Self::new()
    }
}

impl FromIterator<(Currency, Decimal)> for RateTable {
    fn from_iter<I: IntoIterator<Item = (Currency, Decimal)>>(iter: I) -> Self {
        Self {
            rates: iter.into_iter().collect(),
            as_of: Utc::now(),
        }
    }
}
