//! Core ledger engine: transaction create/update/delete with
//! revert-then-apply balance maintenance.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{info, instrument};

use tally_common::{AccountId, Money, Result, TallyError, TransactionId, UserId};

use crate::account::Account;
use crate::store::{AccountStore, BalanceDelta, TransactionStore};
use crate::transaction::{AuditRecord, Transaction, TransactionKind, TransactionPatch};

/// The ledger engine manages transaction rows and keeps account balances
/// equal to the sum of their applied deltas.
///
/// Every mutation path reverses the prior balance effect before applying
/// the new one, through a single `AccountStore` call per account touched.
pub struct LedgerEngine {
    accounts: Arc<AccountStore>,
    transactions: Arc<TransactionStore>,
}

impl LedgerEngine {
    /// Create a new ledger engine over the given stores.
    pub fn new(accounts: Arc<AccountStore>, transactions: Arc<TransactionStore>) -> Self {
        Self {
            accounts,
            transactions,
        }
    }

    /// Create a transaction and apply its balance delta.
    ///
    /// The row is persisted only if the delta application succeeds; a
    /// failed application leaves no transaction record behind.
    #[instrument(skip(self, note), fields(owner = %owner_id, account = %account_id))]
    pub fn create_transaction(
        &self,
        owner_id: &UserId,
        account_id: AccountId,
        kind: TransactionKind,
        amount: Money,
        occurred_at: DateTime<Utc>,
        note: impl Into<String>,
    ) -> Result<Transaction> {
        if !amount.is_positive() {
            return Err(TallyError::validation_field(
                "amount must be positive",
                "amount",
            ));
        }

        let tx = Transaction::new(
            owner_id.clone(),
            account_id,
            kind,
            amount.value,
            amount.currency,
            occurred_at,
            note,
        );

        self.accounts
            .apply_delta(account_id, owner_id, tx.signed_delta(), &tx.currency)?;
        self.transactions.insert(tx.clone());

        info!(
            tx_id = %tx.id,
            kind = ?tx.kind,
            amount = %tx.amount,
            "Transaction created"
        );

        Ok(tx)
    }

    /// Update a transaction, reversing its old balance effect and
    /// applying the new one as a single unit.
    ///
    /// When the account is unchanged the revert and apply are combined
    /// into one delta, so no intermediate balance is ever observable;
    /// when the account changes, both deltas go through one atomic batch.
    #[instrument(skip(self, patch), fields(owner = %owner_id, tx = %tx_id))]
    pub fn update_transaction(
        &self,
        tx_id: TransactionId,
        owner_id: &UserId,
        patch: TransactionPatch,
    ) -> Result<Transaction> {
        let slot = self.transactions.slot(tx_id)?;
        let mut row = self.transactions.lock_row(tx_id, &slot)?;

        if row.owner_id != *owner_id {
            return Err(TallyError::TransactionNotFound(tx_id));
        }

        let old = row.clone();
        let mut updated = old.clone();
        if let Some(account_id) = patch.account_id {
            updated.account_id = account_id;
        }
        if let Some(kind) = patch.kind {
            updated.kind = kind;
        }
        if let Some(amount) = patch.amount {
            updated.amount = amount;
        }
        if let Some(currency) = patch.currency {
            updated.currency = currency;
        }
        if let Some(occurred_at) = patch.occurred_at {
            updated.occurred_at = occurred_at;
        }
        if let Some(note) = patch.note {
            updated.note = note;
        }

        if updated.amount <= Decimal::ZERO {
            return Err(TallyError::validation_field(
                "amount must be positive",
                "amount",
            ));
        }

        let revert = -old.signed_delta();
        let apply = updated.signed_delta();

        if old.account_id == updated.account_id {
            self.accounts.apply_delta(
                updated.account_id,
                owner_id,
                revert + apply,
                &updated.currency,
            )?;
        } else {
            self.accounts.apply_deltas(
                owner_id,
                &[
                    BalanceDelta::new(old.account_id, revert, old.currency.clone()),
                    BalanceDelta::new(updated.account_id, apply, updated.currency.clone()),
                ],
            )?;
        }

        // Balance effects committed; now the row may change.
        *row = updated.clone();

        info!(tx_id = %tx_id, "Transaction updated");
        Ok(updated)
    }

    /// Delete a transaction, reversing its balance effect first.
    #[instrument(skip(self), fields(owner = %owner_id, tx = %tx_id))]
    pub fn delete_transaction(&self, tx_id: TransactionId, owner_id: &UserId) -> Result<Transaction> {
        let slot = self.transactions.slot(tx_id)?;
        let row = self.transactions.lock_row(tx_id, &slot)?;

        if row.owner_id != *owner_id {
            return Err(TallyError::TransactionNotFound(tx_id));
        }

        self.accounts
            .apply_delta(row.account_id, owner_id, -row.signed_delta(), &row.currency)?;

        let removed = row.clone();
        self.transactions.remove(tx_id);

        info!(tx_id = %tx_id, "Transaction deleted");
        Ok(removed)
    }

    /// Get a transaction owned by the caller.
    pub fn get_transaction(&self, tx_id: TransactionId, owner_id: &UserId) -> Result<Transaction> {
        self.transactions.get(tx_id, owner_id)
    }

    /// All transactions for an account, oldest first.
    pub fn list_for_account(
        &self,
        account_id: AccountId,
        owner_id: &UserId,
    ) -> Result<Vec<Transaction>> {
        self.accounts.get(account_id, owner_id)?;
        self.transactions.list_for_account(account_id, owner_id)
    }

    /// Export the account's history in the stable audit shape.
    pub fn audit_trail(&self, account_id: AccountId, owner_id: &UserId) -> Result<Vec<AuditRecord>> {
        let txs = self.list_for_account(account_id, owner_id)?;
        Ok(txs.iter().map(AuditRecord::from).collect())
    }

    /// Delete an account owned by the caller.
    ///
    /// Transaction rows referencing it are retained but orphaned.
    pub fn delete_account(&self, account_id: AccountId, owner_id: &UserId) -> Result<Account> {
        self.accounts.remove(account_id, owner_id)
    }

    /// Recompute the account balance from its live rows and compare with
    /// the stored value.
    pub fn verify_account(&self, account_id: AccountId, owner_id: &UserId) -> Result<()> {
        let account = self.accounts.get(account_id, owner_id)?;
        let recomputed = self
            .transactions
            .sum_deltas_for_account(account_id, owner_id)?;

        if account.balance != recomputed {
            return Err(TallyError::InvariantViolation(format!(
                "account {} balance {} != recomputed {}",
                account_id, account.balance, recomputed
            )));
        }
        Ok(())
    }
}
