//! Error taxonomy for the Tally ledger core.

use crate::{AccountId, Currency, CurrencyMismatchError, ExpenseId, TransactionId};
use thiserror::Error;

/// Main error type for ledger operations.
#[derive(Error, Debug)]
pub enum TallyError {
    /// Request rejected before any effect was applied.
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    /// Currency code absent from the supplied rate table.
    #[error("Unknown currency: {0}")]
    UnknownCurrency(Currency),

    /// Amount currency does not match the target account's currency.
    #[error("Currency mismatch: expected {expected}, got {actual}")]
    CurrencyMismatch { expected: Currency, actual: Currency },

    /// Account missing or not owned by the caller.
    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    /// Transaction missing or not owned by the caller.
    #[error("Transaction not found: {0}")]
    TransactionNotFound(TransactionId),

    /// Shared expense missing or the caller is not a party to it.
    #[error("Shared expense not found: {0}")]
    ExpenseNotFound(ExpenseId),

    /// Lock-acquisition timeout or concurrent mutation detected.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Operation not permitted in the entity's current state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Internal recomputation mismatch. Never reachable in correct
    /// operation; the enclosing operation aborts without committing.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
}

impl TallyError {
    /// Check if this error is retryable by the caller.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TallyError::Conflict(_))
    }

    /// Convenience constructor for validation failures.
    pub fn validation(message: impl Into<String>) -> Self {
        TallyError::Validation {
            message: message.into(),
            field: None,
        }
    }

    /// Validation failure attributed to a specific field.
    pub fn validation_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        TallyError::Validation {
            message: message.into(),
            field: Some(field.into()),
        }
    }
}

impl From<CurrencyMismatchError> for TallyError {
    fn from(e: CurrencyMismatchError) -> Self {
        TallyError::CurrencyMismatch {
            expected: e.expected,
            actual: e.actual,
        }
    }
}

/// Result type alias for ledger operations.
pub type Result<T> = std::result::Result<T, TallyError>;
