//! Account and transaction row stores.
//!
//! `AccountStore::apply_deltas` is the single choke point through which
//! every balance change in the system passes. Multi-account batches take
//! their per-account locks in ascending account-id order, validate every
//! entry before mutating anything, and either apply all deltas or none.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::{Mutex, MutexGuard};
use rust_decimal::Decimal;
use tracing::{debug, info};

use tally_common::{AccountId, Currency, Result, TallyError, TransactionId, UserId};

use crate::account::Account;
use crate::transaction::Transaction;

/// Store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Bound on any single lock acquisition. On timeout the operation
    /// fails with a retryable `Conflict` and applies nothing.
    pub lock_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_secs(5),
        }
    }
}

/// One entry of a multi-account balance batch.
#[derive(Debug, Clone)]
pub struct BalanceDelta {
    /// Account to change.
    pub account_id: AccountId,
    /// Signed balance change.
    pub delta: Decimal,
    /// Currency the caller believes the account is denominated in; the
    /// batch fails `CurrencyMismatch` when it disagrees with the account.
    pub expected_currency: Currency,
}

impl BalanceDelta {
    /// Create a new batch entry.
    pub fn new(account_id: AccountId, delta: Decimal, expected_currency: Currency) -> Self {
        Self {
            account_id,
            delta,
            expected_currency,
        }
    }
}

/// Concurrent account registry with serialized per-account mutation.
pub struct AccountStore {
    accounts: DashMap<AccountId, Arc<Mutex<Account>>>,
    config: StoreConfig,
}

impl AccountStore {
    /// Create a store with the default configuration.
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    /// Create a store with a custom configuration.
    pub fn with_config(config: StoreConfig) -> Self {
        Self {
            accounts: DashMap::new(),
            config,
        }
    }

    /// Create a new account with a zero balance.
    pub fn create(&self, owner_id: UserId, name: impl Into<String>, currency: Currency) -> Account {
        let account = Account::new(owner_id, name, currency);

        info!(
            account_id = %account.id,
            currency = %account.currency,
            "Account created"
        );

        self.accounts
            .insert(account.id, Arc::new(Mutex::new(account.clone())));
        account
    }

    /// Get an account owned by the caller.
    pub fn get(&self, account_id: AccountId, owner_id: &UserId) -> Result<Account> {
        let slot = self.slot(account_id)?;
        let guard = self.lock_account(account_id, &slot)?;

        if guard.owner_id != *owner_id {
            return Err(TallyError::AccountNotFound(account_id));
        }
        Ok(guard.clone())
    }

    /// Delete an account owned by the caller.
    ///
    /// Transactions referencing the account are retained but orphaned;
    /// their deltas are not recomputed.
    pub fn remove(&self, account_id: AccountId, owner_id: &UserId) -> Result<Account> {
        let slot = self.slot(account_id)?;
        let guard = self.lock_account(account_id, &slot)?;

        if guard.owner_id != *owner_id {
            return Err(TallyError::AccountNotFound(account_id));
        }

        // Removed under the entry lock so no in-flight delta lands after
        // the account is gone.
        self.accounts.remove(&account_id);

        info!(account_id = %account_id, "Account deleted");
        Ok(guard.clone())
    }

    /// Apply a single signed balance delta.
    pub fn apply_delta(
        &self,
        account_id: AccountId,
        owner_id: &UserId,
        delta: Decimal,
        expected_currency: &Currency,
    ) -> Result<Account> {
        let entry = BalanceDelta::new(account_id, delta, expected_currency.clone());
        let mut updated = self.apply_deltas(owner_id, std::slice::from_ref(&entry))?;
        updated
            .pop()
            .ok_or_else(|| TallyError::InvariantViolation("balance batch returned no account".into()))
    }

    /// Apply a batch of balance deltas as one atomic unit.
    ///
    /// Locks are acquired in ascending account-id order (the fixed global
    /// order) with a bounded timeout; every entry is validated before any
    /// balance is mutated. Either all deltas apply or none do. Updated
    /// accounts are returned in lock order. Same-account deltas must be
    /// pre-combined by the caller.
    pub fn apply_deltas(&self, owner_id: &UserId, entries: &[BalanceDelta]) -> Result<Vec<Account>> {
        if entries.is_empty() {
            return Ok(Vec::new());
        }

        let mut ordered: Vec<&BalanceDelta> = entries.iter().collect();
        ordered.sort_by_key(|e| e.account_id);

        for pair in ordered.windows(2) {
            if pair[0].account_id == pair[1].account_id {
                return Err(TallyError::InvariantViolation(format!(
                    "duplicate account {} in balance batch",
                    pair[0].account_id
                )));
            }
        }

        let slots = ordered
            .iter()
            .map(|e| self.slot(e.account_id))
            .collect::<Result<Vec<_>>>()?;

        let mut guards: Vec<MutexGuard<'_, Account>> = Vec::with_capacity(slots.len());
        for (entry, slot) in ordered.iter().zip(slots.iter()) {
            let guard = slot.try_lock_for(self.config.lock_timeout).ok_or_else(|| {
                TallyError::Conflict(format!("timed out locking account {}", entry.account_id))
            })?;
            guards.push(guard);
        }

        for (entry, guard) in ordered.iter().zip(guards.iter()) {
            // Deletion may have won the race after the slot was resolved
            if guard.owner_id != *owner_id || !self.accounts.contains_key(&entry.account_id) {
                return Err(TallyError::AccountNotFound(entry.account_id));
            }
            if guard.currency != entry.expected_currency {
                return Err(TallyError::CurrencyMismatch {
                    expected: guard.currency.clone(),
                    actual: entry.expected_currency.clone(),
                });
            }
        }

        let now = chrono::Utc::now();
        let mut updated = Vec::with_capacity(guards.len());
        for (entry, guard) in ordered.iter().zip(guards.iter_mut()) {
            guard.balance += entry.delta;
            guard.updated_at = now;

            debug!(
                account_id = %entry.account_id,
                delta = %entry.delta,
                balance = %guard.balance,
                "Balance delta applied"
            );

            updated.push((*guard).clone());
        }

        Ok(updated)
    }

    fn slot(&self, account_id: AccountId) -> Result<Arc<Mutex<Account>>> {
        self.accounts
            .get(&account_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(TallyError::AccountNotFound(account_id))
    }

    fn lock_account<'a>(
        &self,
        account_id: AccountId,
        slot: &'a Arc<Mutex<Account>>,
    ) -> Result<MutexGuard<'a, Account>> {
        slot.try_lock_for(self.config.lock_timeout)
            .ok_or_else(|| TallyError::Conflict(format!("timed out locking account {}", account_id)))
    }
}

impl Default for AccountStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Concurrent transaction row registry.
///
/// Each row sits behind its own mutex so that concurrent mutation of one
/// transaction surfaces as a retryable `Conflict` instead of a lost
/// revert.
pub struct TransactionStore {
    rows: DashMap<TransactionId, Arc<Mutex<Transaction>>>,
    config: StoreConfig,
}

impl TransactionStore {
    /// Create a store with the default configuration.
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    /// Create a store with a custom configuration.
    pub fn with_config(config: StoreConfig) -> Self {
        Self {
            rows: DashMap::new(),
            config,
        }
    }

    /// Insert a new row.
    pub fn insert(&self, tx: Transaction) {
        self.rows.insert(tx.id, Arc::new(Mutex::new(tx)));
    }

    /// Get a transaction owned by the caller.
    pub fn get(&self, tx_id: TransactionId, owner_id: &UserId) -> Result<Transaction> {
        let slot = self.slot(tx_id)?;
        let guard = self.lock_row(tx_id, &slot)?;

        if guard.owner_id != *owner_id {
            return Err(TallyError::TransactionNotFound(tx_id));
        }
        Ok(guard.clone())
    }

    /// Remove a row.
    pub fn remove(&self, tx_id: TransactionId) {
        self.rows.remove(&tx_id);
    }

    /// All transactions for an account owned by the caller, oldest first.
    pub fn list_for_account(
        &self,
        account_id: AccountId,
        owner_id: &UserId,
    ) -> Result<Vec<Transaction>> {
        let mut txs = Vec::new();
        for slot in self.snapshot() {
            let guard = self.lock_row_anon(&slot)?;
            if guard.account_id == account_id && guard.owner_id == *owner_id {
                txs.push(guard.clone());
            }
        }
        txs.sort_by_key(|t| (t.occurred_at, *t.id.as_uuid()));
        Ok(txs)
    }

    /// Sum of signed deltas over live rows referencing an account.
    pub fn sum_deltas_for_account(
        &self,
        account_id: AccountId,
        owner_id: &UserId,
    ) -> Result<Decimal> {
        let mut total = Decimal::ZERO;
        for slot in self.snapshot() {
            let guard = self.lock_row_anon(&slot)?;
            if guard.account_id == account_id && guard.owner_id == *owner_id {
                total += guard.signed_delta();
            }
        }
        Ok(total)
    }

    pub(crate) fn slot(&self, tx_id: TransactionId) -> Result<Arc<Mutex<Transaction>>> {
        self.rows
            .get(&tx_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(TallyError::TransactionNotFound(tx_id))
    }

    pub(crate) fn lock_row<'a>(
        &self,
        tx_id: TransactionId,
        slot: &'a Arc<Mutex<Transaction>>,
    ) -> Result<MutexGuard<'a, Transaction>> {
        slot.try_lock_for(self.config.lock_timeout)
            .ok_or_else(|| TallyError::Conflict(format!("timed out locking transaction {}", tx_id)))
    }

    fn lock_row_anon<'a>(
        &self,
        slot: &'a Arc<Mutex<Transaction>>,
    ) -> Result<MutexGuard<'a, Transaction>> {
        slot.try_lock_for(self.config.lock_timeout)
            .ok_or_else(|| TallyError::Conflict("timed out locking transaction row".into()))
    }

    // Arc handles are collected before any row lock is taken so no map
    // shard lock is held while waiting on a row.
    fn snapshot(&self) -> Vec<Arc<Mutex<Transaction>>> {
        self.rows.iter().map(|e| Arc::clone(e.value())).collect()
    }
}

impl Default for TransactionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn owner() -> UserId {
        UserId::new("maria")
    }

    #[test]
    fn test_create_and_get() {
        let store = AccountStore::new();
        let account = store.create(owner(), "Checking", Currency::eur());

        let fetched = store.get(account.id, &owner()).unwrap();
        assert_eq!(fetched.id, account.id);
        assert_eq!(fetched.balance, Decimal::ZERO);
    }

    #[test]
    fn test_get_unowned_account_is_not_found() {
        let store = AccountStore::new();
        let account = store.create(owner(), "Checking", Currency::eur());

        let result = store.get(account.id, &UserId::new("intruder"));
        assert!(matches!(result, Err(TallyError::AccountNotFound(_))));
    }

    #[test]
    fn test_apply_delta() {
        let store = AccountStore::new();
        let account = store.create(owner(), "Checking", Currency::eur());

        let updated = store
            .apply_delta(account.id, &owner(), dec!(120.50), &Currency::eur())
            .unwrap();
        assert_eq!(updated.balance, dec!(120.50));

        let updated = store
            .apply_delta(account.id, &owner(), dec!(-20.50), &Currency::eur())
            .unwrap();
        assert_eq!(updated.balance, dec!(100.00));
    }

    #[test]
    fn test_apply_delta_currency_mismatch() {
        let store = AccountStore::new();
        let account = store.create(owner(), "Checking", Currency::eur());

        let result = store.apply_delta(account.id, &owner(), dec!(10), &Currency::usd());
        assert!(matches!(result, Err(TallyError::CurrencyMismatch { .. })));

        // Nothing was applied
        assert_eq!(store.get(account.id, &owner()).unwrap().balance, Decimal::ZERO);
    }

    #[test]
    fn test_apply_delta_missing_account() {
        let store = AccountStore::new();

        let result = store.apply_delta(AccountId::new(), &owner(), dec!(10), &Currency::eur());
        assert!(matches!(result, Err(TallyError::AccountNotFound(_))));
    }

    #[test]
    fn test_apply_deltas_all_or_nothing() {
        let store = AccountStore::new();
        let a = store.create(owner(), "Checking", Currency::eur());
        let b = store.create(owner(), "Savings", Currency::usd());

        // Second entry carries the wrong currency, so the first must not
        // be applied either.
        let result = store.apply_deltas(
            &owner(),
            &[
                BalanceDelta::new(a.id, dec!(100), Currency::eur()),
                BalanceDelta::new(b.id, dec!(100), Currency::eur()),
            ],
        );
        assert!(matches!(result, Err(TallyError::CurrencyMismatch { .. })));

        assert_eq!(store.get(a.id, &owner()).unwrap().balance, Decimal::ZERO);
        assert_eq!(store.get(b.id, &owner()).unwrap().balance, Decimal::ZERO);
    }

    #[test]
    fn test_apply_deltas_rejects_duplicate_accounts() {
        let store = AccountStore::new();
        let a = store.create(owner(), "Checking", Currency::eur());

        let result = store.apply_deltas(
            &owner(),
            &[
                BalanceDelta::new(a.id, dec!(-50), Currency::eur()),
                BalanceDelta::new(a.id, dec!(80), Currency::eur()),
            ],
        );
        assert!(matches!(result, Err(TallyError::InvariantViolation(_))));
        assert_eq!(store.get(a.id, &owner()).unwrap().balance, Decimal::ZERO);
    }

    #[test]
    fn test_apply_deltas_empty_batch() {
        let store = AccountStore::new();
        assert!(store.apply_deltas(&owner(), &[]).unwrap().is_empty());
    }

    #[test]
    fn test_lock_timeout_is_conflict() {
        let store = AccountStore::with_config(StoreConfig {
            lock_timeout: Duration::from_millis(50),
        });
        let account = store.create(owner(), "Checking", Currency::eur());

        let slot = store.slot(account.id).unwrap();
        let _held = slot.lock();

        let result = store.apply_delta(account.id, &owner(), dec!(10), &Currency::eur());
        assert!(matches!(result, Err(TallyError::Conflict(_))));
        assert!(result.unwrap_err().is_retryable());
    }

    #[test]
    fn test_remove_is_owner_only() {
        let store = AccountStore::new();
        let account = store.create(owner(), "Checking", Currency::eur());

        let result = store.remove(account.id, &UserId::new("intruder"));
        assert!(matches!(result, Err(TallyError::AccountNotFound(_))));

        store.remove(account.id, &owner()).unwrap();
        assert!(matches!(
            store.get(account.id, &owner()),
            Err(TallyError::AccountNotFound(_))
        ));
    }
}
