//! Account records.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use tally_common::{AccountId, Currency, Money, UserId};

/// A user's monetary account.
///
/// `balance` equals the sum of all currently-applied transaction deltas
/// since creation (initial balance 0). It is only ever written through
/// [`AccountStore::apply_deltas`](crate::store::AccountStore); no other
/// component writes it directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// Unique account identifier.
    pub id: AccountId,
    /// Owning user.
    pub owner_id: UserId,
    /// Account name/description.
    pub name: String,
    /// Account currency; every transaction targeting the account must be
    /// denominated in it.
    pub currency: Currency,
    /// Current balance.
    pub balance: Decimal,
    /// When the account was created.
    pub created_at: DateTime<Utc>,
    /// When the account was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Create a new account with a zero balance.
    pub fn new(owner_id: UserId, name: impl Into<String>, currency: Currency) -> Self {
        let now = Utc::now();
        Self {
            id: AccountId::new(),
            owner_id,
            name: name.into(),
            currency,
            balance: Decimal::ZERO,
            created_at: now,
            updated_at: now,
        }
    }

    /// The balance as a [`Money`] amount.
    pub fn balance_money(&self) -> Money {
        Money::new(self.balance, self.currency.clone())
    }
}
