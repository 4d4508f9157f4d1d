//! Tally Settlement
//!
//! Peer-to-peer shared-expense bookkeeping: each party records their own
//! payments, per-currency fair-share balances are derived from the
//! unsettled rows, and settling a row is a terminal transition.

pub mod expense;
pub mod ledger;

pub use expense::{ExpensePatch, SharedExpense};
pub use ledger::SettlementLedger;
