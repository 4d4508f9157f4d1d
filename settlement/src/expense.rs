//! Shared-expense records.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use tally_common::{Currency, ExpenseId, Result, TallyError, TransactionId, UserId};

/// A two-party shared-expense row.
///
/// Convention: a row records only the contribution of the party who
/// created it; the counterparty's own payment lives in a separate row
/// they create, not in this one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedExpense {
    /// Unique expense ID.
    pub id: ExpenseId,
    /// Party who created the row.
    pub creator_id: UserId,
    /// The other party to the expense.
    pub counterparty_id: UserId,
    /// What the expense was for.
    pub description: String,
    /// Total cost of the expense.
    pub total_amount: Decimal,
    /// Currency of every amount on this row.
    pub currency: Currency,
    /// What the creator paid.
    pub creator_paid: Decimal,
    /// What the counterparty chipped in on this row, as recorded by the
    /// creator.
    pub counterparty_paid: Decimal,
    /// Whether the row has been settled.
    pub settled: bool,
    /// When the row was settled.
    pub settled_at: Option<DateTime<Utc>>,
    /// Ledger transaction this row is linked to, if any.
    pub linked_transaction_id: Option<TransactionId>,
}

impl SharedExpense {
    /// Create a new unsettled row recording the creator's own payment.
    pub fn new(
        creator_id: UserId,
        counterparty_id: UserId,
        paid: Decimal,
        currency: Currency,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: ExpenseId::new(),
            creator_id,
            counterparty_id,
            description: description.into(),
            total_amount: paid,
            currency,
            creator_paid: paid,
            counterparty_paid: Decimal::ZERO,
            settled: false,
            settled_at: None,
            linked_transaction_id: None,
        }
    }

    /// Check whether a user is one of the two parties.
    pub fn is_party(&self, user_id: &UserId) -> bool {
        self.creator_id == *user_id || self.counterparty_id == *user_id
    }

    /// Transition `Open -> Settled`.
    ///
    /// Terminal: a settled row permits no further transition and no
    /// field mutation.
    pub fn settle(&mut self) -> Result<()> {
        if self.settled {
            return Err(TallyError::InvalidState(format!(
                "expense {} is already settled",
                self.id
            )));
        }
        self.settled = true;
        self.settled_at = Some(Utc::now());
        Ok(())
    }
}

/// Field changes for `SettlementLedger::update_expense`.
///
/// `None` keeps the existing value.
#[derive(Debug, Clone, Default)]
pub struct ExpensePatch {
    pub description: Option<String>,
    pub total_amount: Option<Decimal>,
    pub creator_paid: Option<Decimal>,
    pub counterparty_paid: Option<Decimal>,
    pub linked_transaction_id: Option<TransactionId>,
}
