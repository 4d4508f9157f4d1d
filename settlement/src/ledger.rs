//! Shared-expense settlement ledger.
//!
//! Bookkeeping-only: the ledger is independent of the account stores
//! unless a row is explicitly linked to a transaction. Balances are
//! derived reads over the unsettled rows; `settle` takes exclusive
//! access to only its own row.

use std::collections::HashMap;

use dashmap::DashMap;
use rust_decimal::{Decimal, RoundingStrategy};
use tracing::{info, instrument};

use tally_common::{Currency, ExpenseId, Money, Result, TallyError, UserId};

use crate::expense::{ExpensePatch, SharedExpense};

/// Aggregates shared-expense rows per counterparty pair into fair-share
/// balances and exposes the terminal settle operation.
pub struct SettlementLedger {
    rows: DashMap<ExpenseId, SharedExpense>,
}

impl SettlementLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self {
            rows: DashMap::new(),
        }
    }

    /// Record a payment the caller made toward a shared expense.
    #[instrument(skip(self, description), fields(owner = %owner_id, counterparty = %counterparty_id))]
    pub fn record_own_payment(
        &self,
        owner_id: &UserId,
        counterparty_id: &UserId,
        paid: Money,
        description: impl Into<String>,
    ) -> Result<SharedExpense> {
        if !paid.is_positive() {
            return Err(TallyError::validation_field(
                "paid amount must be positive",
                "paid",
            ));
        }
        if owner_id == counterparty_id {
            return Err(TallyError::validation(
                "a shared expense needs two distinct parties",
            ));
        }

        let row = SharedExpense::new(
            owner_id.clone(),
            counterparty_id.clone(),
            paid.value,
            paid.currency,
            description,
        );

        info!(expense_id = %row.id, paid = %row.creator_paid, "Shared expense recorded");
        self.rows.insert(row.id, row.clone());
        Ok(row)
    }

    /// Edit an unsettled row. Creator-only.
    pub fn update_expense(
        &self,
        expense_id: ExpenseId,
        owner_id: &UserId,
        patch: ExpensePatch,
    ) -> Result<SharedExpense> {
        let mut row = self
            .rows
            .get_mut(&expense_id)
            .ok_or(TallyError::ExpenseNotFound(expense_id))?;

        if row.creator_id != *owner_id {
            return Err(TallyError::ExpenseNotFound(expense_id));
        }
        if row.settled {
            return Err(TallyError::InvalidState(format!(
                "expense {} is settled and cannot be edited",
                expense_id
            )));
        }

        for (amount, field) in [
            (patch.total_amount, "total_amount"),
            (patch.creator_paid, "creator_paid"),
            (patch.counterparty_paid, "counterparty_paid"),
        ] {
            if let Some(value) = amount {
                if value < Decimal::ZERO {
                    return Err(TallyError::validation_field(
                        "amount must not be negative",
                        field,
                    ));
                }
            }
        }

        if let Some(description) = patch.description {
            row.description = description;
        }
        if let Some(total_amount) = patch.total_amount {
            row.total_amount = total_amount;
        }
        if let Some(creator_paid) = patch.creator_paid {
            row.creator_paid = creator_paid;
        }
        if let Some(counterparty_paid) = patch.counterparty_paid {
            row.counterparty_paid = counterparty_paid;
        }
        if let Some(tx_id) = patch.linked_transaction_id {
            row.linked_transaction_id = Some(tx_id);
        }

        Ok(row.clone())
    }

    /// Mark a row as settled. Either involved party may settle.
    #[instrument(skip(self), fields(owner = %owner_id, expense = %expense_id))]
    pub fn settle(&self, expense_id: ExpenseId, owner_id: &UserId) -> Result<SharedExpense> {
        let mut row = self
            .rows
            .get_mut(&expense_id)
            .ok_or(TallyError::ExpenseNotFound(expense_id))?;

        if !row.is_party(owner_id) {
            return Err(TallyError::ExpenseNotFound(expense_id));
        }

        row.settle()?;
        info!(expense_id = %expense_id, "Shared expense settled");
        Ok(row.clone())
    }

    /// Get a row the caller is a party to.
    pub fn get(&self, expense_id: ExpenseId, owner_id: &UserId) -> Result<SharedExpense> {
        self.rows
            .get(&expense_id)
            .filter(|row| row.is_party(owner_id))
            .map(|row| row.clone())
            .ok_or(TallyError::ExpenseNotFound(expense_id))
    }

    /// All rows between two parties, oldest first.
    pub fn list_between(&self, user_id: &UserId, counterparty_id: &UserId) -> Vec<SharedExpense> {
        let mut rows: Vec<SharedExpense> = self
            .rows
            .iter()
            .filter(|row| pair_matches(row, user_id, counterparty_id))
            .map(|row| row.clone())
            .collect();
        rows.sort_by_key(|row| *row.id.as_uuid());
        rows
    }

    /// Net fair-share balance between two parties in one currency.
    ///
    /// Positive: the counterparty owes `user_id` that amount; negative:
    /// `user_id` owes the counterparty. Only unsettled rows in the given
    /// currency participate; other currencies are never combined in.
    pub fn balance(&self, user_id: &UserId, counterparty_id: &UserId, currency: &Currency) -> Money {
        let mut paid_by_user = Decimal::ZERO;
        let mut paid_by_counterparty = Decimal::ZERO;

        for row in self.rows.iter() {
            if row.settled
                || row.currency != *currency
                || !pair_matches(&row, user_id, counterparty_id)
            {
                continue;
            }
            if row.creator_id == *user_id {
                paid_by_user += row.creator_paid;
            } else {
                paid_by_counterparty += row.creator_paid;
            }
        }

        Money::new(
            net_of(paid_by_user, paid_by_counterparty, currency),
            currency.clone(),
        )
    }

    /// Fair-share balances between two parties, one accumulator per
    /// currency.
    pub fn balances(
        &self,
        user_id: &UserId,
        counterparty_id: &UserId,
    ) -> HashMap<Currency, Money> {
        let mut paid: HashMap<Currency, (Decimal, Decimal)> = HashMap::new();

        for row in self.rows.iter() {
            if row.settled || !pair_matches(&row, user_id, counterparty_id) {
                continue;
            }
            let entry = paid
                .entry(row.currency.clone())
                .or_insert((Decimal::ZERO, Decimal::ZERO));
            if row.creator_id == *user_id {
                entry.0 += row.creator_paid;
            } else {
                entry.1 += row.creator_paid;
            }
        }

        paid.into_iter()
            .map(|(currency, (a, b))| {
                let net = net_of(a, b, &currency);
                (currency.clone(), Money::new(net, currency))
            })
            .collect()
    }
}

impl Default for SettlementLedger {
    fn default() -> Self {
        Self::new()
    }
}

fn pair_matches(row: &SharedExpense, a: &UserId, b: &UserId) -> bool {
    (row.creator_id == *a && row.counterparty_id == *b)
        || (row.creator_id == *b && row.counterparty_id == *a)
}

// net = A - (A + B) / 2, rounded to minor units at this output boundary.
fn net_of(a: Decimal, b: Decimal, currency: &Currency) -> Decimal {
    let fair_share = (a + b) / Decimal::TWO;
    (a - fair_share).round_dp_with_strategy(
        currency.decimal_places(),
        RoundingStrategy::MidpointNearestEven,
    )
}
