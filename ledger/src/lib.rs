//! Tally Ledger
//!
//! Accounts, transactions, and currency-converted transfers. Every
//! balance change in the system flows through one atomic choke point
//! (`AccountStore::apply_deltas`); mutation paths revert a prior effect
//! and apply the new one as a single unit.

pub mod account;
pub mod engine;
pub mod store;
pub mod transaction;
pub mod transfer;

pub use account::Account;
pub use engine::LedgerEngine;
pub use store::{AccountStore, BalanceDelta, StoreConfig, TransactionStore};
pub use transaction::{AuditRecord, Transaction, TransactionKind, TransactionPatch};
pub use transfer::{TransferCoordinator, TransferReceipt};
