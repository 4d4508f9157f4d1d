//! Transaction records and the audit interchange shape.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use tally_common::{AccountId, Currency, Money, TransactionId, UserId};

/// Direction of a ledger transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionKind {
    /// Increases the account balance.
    Income,
    /// Decreases the account balance.
    Expense,
}

impl TransactionKind {
    /// Signed balance change caused by an amount of this kind.
    pub fn signed(&self, amount: Decimal) -> Decimal {
        match self {
            TransactionKind::Income => amount,
            TransactionKind::Expense => -amount,
        }
    }
}

/// A ledger transaction against a single account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique transaction ID.
    pub id: TransactionId,
    /// Owning user.
    pub owner_id: UserId,
    /// Account the transaction targets.
    pub account_id: AccountId,
    /// Direction.
    pub kind: TransactionKind,
    /// Always positive; the kind carries the sign.
    pub amount: Decimal,
    /// Must equal the target account's currency; amounts are applied
    /// without conversion.
    pub currency: Currency,
    /// When the transaction occurred.
    pub occurred_at: DateTime<Utc>,
    /// Free-form note.
    pub note: String,
}

impl Transaction {
    /// Create a new transaction record.
    pub fn new(
        owner_id: UserId,
        account_id: AccountId,
        kind: TransactionKind,
        amount: Decimal,
        currency: Currency,
        occurred_at: DateTime<Utc>,
        note: impl Into<String>,
    ) -> Self {
        Self {
            id: TransactionId::new(),
            owner_id,
            account_id,
            kind,
            amount,
            currency,
            occurred_at,
            note: note.into(),
        }
    }

    /// The signed balance delta this transaction contributes.
    pub fn signed_delta(&self) -> Decimal {
        self.kind.signed(self.amount)
    }

    /// The amount as a [`Money`] value.
    pub fn money(&self) -> Money {
        Money::new(self.amount, self.currency.clone())
    }
}

/// Field changes for `LedgerEngine::update_transaction`.
///
/// `None` keeps the existing value.
#[derive(Debug, Clone, Default)]
pub struct TransactionPatch {
    pub account_id: Option<AccountId>,
    pub kind: Option<TransactionKind>,
    pub amount: Option<Decimal>,
    pub currency: Option<Currency>,
    pub occurred_at: Option<DateTime<Utc>>,
    pub note: Option<String>,
}

impl TransactionPatch {
    /// Patch that only changes the amount.
    pub fn amount(amount: Decimal) -> Self {
        Self {
            amount: Some(amount),
            ..Self::default()
        }
    }
}

/// Stable export shape consumed by history and reporting views.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: TransactionId,
    pub account_id: AccountId,
    pub kind: TransactionKind,
    pub amount: Decimal,
    pub currency: Currency,
    pub occurred_at: DateTime<Utc>,
    pub note: String,
}

impl From<&Transaction> for AuditRecord {
    fn from(tx: &Transaction) -> Self {
        Self {
            id: tx.id,
            account_id: tx.account_id,
            kind: tx.kind,
            amount: tx.amount,
            currency: tx.currency.clone(),
            occurred_at: tx.occurred_at,
            note: tx.note.clone(),
        }
    }
}
