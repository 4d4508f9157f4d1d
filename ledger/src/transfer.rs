//! Currency-converted transfers between two accounts.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{info, instrument};

use tally_common::{AccountId, Currency, Money, RateTable, Result, TallyError, UserId};

use crate::store::{AccountStore, BalanceDelta, TransactionStore};
use crate::transaction::{Transaction, TransactionKind};

/// The two audit rows produced by a completed transfer.
#[derive(Debug, Clone)]
pub struct TransferReceipt {
    /// `Transfer out` expense on the source account.
    pub out_tx: Transaction,
    /// `Transfer in` income on the destination account.
    pub in_tx: Transaction,
}

/// Executes a currency-converted transfer as one atomic operation
/// spanning two accounts and two audit transactions.
pub struct TransferCoordinator {
    accounts: Arc<AccountStore>,
    transactions: Arc<TransactionStore>,
}

impl TransferCoordinator {
    /// Create a new coordinator over the given stores.
    pub fn new(accounts: Arc<AccountStore>, transactions: Arc<TransactionStore>) -> Self {
        Self {
            accounts,
            transactions,
        }
    }

    /// Transfer `amount` from one account into another, converting into
    /// the destination currency through the supplied rate table.
    ///
    /// The two balance deltas go through one lock-ordered batch — both
    /// account locks held for its duration — and the two audit rows are
    /// pre-built and inserted infallibly afterwards, so a debited source
    /// without a credited destination is never observable.
    #[instrument(
        skip(self, rates, note),
        fields(owner = %owner_id, from = %from_account, to = %to_account)
    )]
    pub fn execute(
        &self,
        owner_id: &UserId,
        from_account: AccountId,
        to_account: AccountId,
        amount: Money,
        to_currency: Currency,
        rates: &RateTable,
        note: &str,
    ) -> Result<TransferReceipt> {
        if from_account == to_account {
            return Err(TallyError::validation(
                "transfer source and destination must differ",
            ));
        }
        if !amount.is_positive() {
            return Err(TallyError::validation_field(
                "amount must be positive",
                "amount",
            ));
        }

        let converted = tally_fx::convert(amount.value, &amount.currency, &to_currency, rates)
            .map_err(TallyError::from)?;
        if converted <= Decimal::ZERO {
            return Err(TallyError::validation_field(
                "amount rounds to zero in the destination currency",
                "amount",
            ));
        }

        let now = Utc::now();
        let out_tx = Transaction::new(
            owner_id.clone(),
            from_account,
            TransactionKind::Expense,
            amount.value,
            amount.currency.clone(),
            now,
            transfer_note("Transfer out", note),
        );
        let in_tx = Transaction::new(
            owner_id.clone(),
            to_account,
            TransactionKind::Income,
            converted,
            to_currency.clone(),
            now,
            transfer_note("Transfer in", note),
        );

        self.accounts.apply_deltas(
            owner_id,
            &[
                BalanceDelta::new(from_account, -amount.value, amount.currency.clone()),
                BalanceDelta::new(to_account, converted, to_currency),
            ],
        )?;

        self.transactions.insert(out_tx.clone());
        self.transactions.insert(in_tx.clone());

        info!(
            out_tx = %out_tx.id,
            in_tx = %in_tx.id,
            amount = %amount,
            converted = %converted,
            "Transfer executed"
        );

        Ok(TransferReceipt { out_tx, in_tx })
    }
}

fn transfer_note(prefix: &str, note: &str) -> String {
    if note.is_empty() {
        prefix.to_string()
    } else {
        format!("{prefix}: {note}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn owner() -> UserId {
        UserId::new("maria")
    }

    struct Fixture {
        accounts: Arc<AccountStore>,
        transactions: Arc<TransactionStore>,
        coordinator: TransferCoordinator,
    }

    fn setup() -> Fixture {
        let accounts = Arc::new(AccountStore::new());
        let transactions = Arc::new(TransactionStore::new());
        let coordinator = TransferCoordinator::new(accounts.clone(), transactions.clone());
        Fixture {
            accounts,
            transactions,
            coordinator,
        }
    }

    fn eur_bgn_rates() -> RateTable {
        let mut rates = RateTable::with_pivot();
        rates.insert(Currency::bgn(), dec!(1.95583));
        rates
    }

    #[test]
    fn test_transfer_conserves_value() {
        let f = setup();
        let eur = f.accounts.create(owner(), "EUR", Currency::eur());
        let bgn = f.accounts.create(owner(), "BGN", Currency::bgn());

        let receipt = f
            .coordinator
            .execute(
                &owner(),
                eur.id,
                bgn.id,
                Money::new(dec!(100), Currency::eur()),
                Currency::bgn(),
                &eur_bgn_rates(),
                "vacation budget",
            )
            .unwrap();

        assert_eq!(f.accounts.get(eur.id, &owner()).unwrap().balance, dec!(-100));
        assert_eq!(f.accounts.get(bgn.id, &owner()).unwrap().balance, dec!(195.58));

        assert_eq!(receipt.out_tx.kind, TransactionKind::Expense);
        assert_eq!(receipt.out_tx.currency, Currency::eur());
        assert_eq!(receipt.out_tx.note, "Transfer out: vacation budget");
        assert_eq!(receipt.in_tx.kind, TransactionKind::Income);
        assert_eq!(receipt.in_tx.amount, dec!(195.58));

        // Both audit rows exist
        assert!(f.transactions.get(receipt.out_tx.id, &owner()).is_ok());
        assert!(f.transactions.get(receipt.in_tx.id, &owner()).is_ok());
    }

    #[test]
    fn test_same_account_transfer_rejected() {
        let f = setup();
        let eur = f.accounts.create(owner(), "EUR", Currency::eur());

        let result = f.coordinator.execute(
            &owner(),
            eur.id,
            eur.id,
            Money::new(dec!(10), Currency::eur()),
            Currency::eur(),
            &eur_bgn_rates(),
            "",
        );
        assert!(matches!(result, Err(TallyError::Validation { .. })));
    }

    #[test]
    fn test_currency_mismatch_applies_nothing() {
        let f = setup();
        let eur = f.accounts.create(owner(), "EUR", Currency::eur());
        let bgn = f.accounts.create(owner(), "BGN", Currency::bgn());

        // Caller claims the destination is EUR; it is not.
        let mut rates = eur_bgn_rates();
        rates.insert(Currency::usd(), dec!(1.0876));
        let result = f.coordinator.execute(
            &owner(),
            eur.id,
            bgn.id,
            Money::new(dec!(100), Currency::eur()),
            Currency::usd(),
            &rates,
            "",
        );
        assert!(matches!(result, Err(TallyError::CurrencyMismatch { .. })));

        assert_eq!(f.accounts.get(eur.id, &owner()).unwrap().balance, Decimal::ZERO);
        assert_eq!(f.accounts.get(bgn.id, &owner()).unwrap().balance, Decimal::ZERO);
    }

    #[test]
    fn test_unknown_currency_applies_nothing() {
        let f = setup();
        let eur = f.accounts.create(owner(), "EUR", Currency::eur());
        let bgn = f.accounts.create(owner(), "BGN", Currency::bgn());

        let empty = RateTable::new();
        let result = f.coordinator.execute(
            &owner(),
            eur.id,
            bgn.id,
            Money::new(dec!(100), Currency::eur()),
            Currency::bgn(),
            &empty,
            "",
        );
        assert!(matches!(result, Err(TallyError::UnknownCurrency(_))));

        assert_eq!(f.accounts.get(eur.id, &owner()).unwrap().balance, Decimal::ZERO);
        assert_eq!(f.accounts.get(bgn.id, &owner()).unwrap().balance, Decimal::ZERO);
    }

    #[test]
    fn test_non_positive_amount_rejected() {
        let f = setup();
        let eur = f.accounts.create(owner(), "EUR", Currency::eur());
        let bgn = f.accounts.create(owner(), "BGN", Currency::bgn());

        let result = f.coordinator.execute(
            &owner(),
            eur.id,
            bgn.id,
            Money::new(Decimal::ZERO, Currency::eur()),
            Currency::bgn(),
            &eur_bgn_rates(),
            "",
        );
        assert!(matches!(result, Err(TallyError::Validation { .. })));
    }

    #[test]
    fn test_same_currency_transfer_keeps_amount() {
        let f = setup();
        let a = f.accounts.create(owner(), "Checking", Currency::eur());
        let b = f.accounts.create(owner(), "Savings", Currency::eur());

        let receipt = f
            .coordinator
            .execute(
                &owner(),
                a.id,
                b.id,
                Money::new(dec!(250.25), Currency::eur()),
                Currency::eur(),
                &RateTable::new(),
                "",
            )
            .unwrap();

        assert_eq!(receipt.in_tx.amount, dec!(250.25));
        assert_eq!(receipt.in_tx.note, "Transfer in");
        assert_eq!(f.accounts.get(a.id, &owner()).unwrap().balance, dec!(-250.25));
        assert_eq!(f.accounts.get(b.id, &owner()).unwrap().balance, dec!(250.25));
    }
}
