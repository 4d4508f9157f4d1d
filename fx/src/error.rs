//! FX engine error types.

use rust_decimal::Decimal;
use tally_common::{Currency, TallyError};
use thiserror::Error;

/// Errors that can occur during currency conversion.
#[derive(Debug, Error)]
pub enum FxError {
    /// Currency code absent from the supplied rate table.
    #[error("Unknown currency: {0}")]
    UnknownCurrency(Currency),

    /// Table carries a non-positive rate for the currency.
    #[error("Invalid rate {rate} for {currency}")]
    InvalidRate { currency: Currency, rate: Decimal },

    /// Rate provider failed to produce a table.
    #[error("Rate provider error: {0}")]
    Provider(String),
}

/// Result type for FX operations.
pub type FxResult<T> = Result<T, FxError>;

impl From<FxError> for TallyError {
    fn from(e: FxError) -> Self {
        match e {
            FxError::UnknownCurrency(currency) => TallyError::UnknownCurrency(currency),
            FxError::InvalidRate { currency, rate } => TallyError::validation_field(
                format!("invalid rate {} for {}", rate, currency),
                "rates",
            ),
            // Provider outages are transient; callers may retry.
            FxError::Provider(message) => TallyError::Conflict(message),
        }
    }
}
