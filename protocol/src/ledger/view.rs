//! Read-only ledger access for contract entry points.
//!
//! Contracts never mutate a ledger directly; they read snapshots
//! through [`LedgerView`] and emit records whose preconditions pin what
//! they read. Keeping the trait this narrow is what lets the same entry
//! points run against an in-process [`Ledger`](super::Ledger) in tests
//! and against a remote chain snapshot in a client.

use super::account::{AccountId, AccountSnapshot, TokenId};

/// A source of account snapshots at some consistent point in time.
pub trait LedgerView {
    /// Fetch the `(account, token_id)` entry. Entries that were never
    /// created read as empty: zero balance, zero words, `exists: false`.
    fn fetch_account_state(&self, account: &AccountId, token_id: &TokenId) -> AccountSnapshot;
}

impl<T: LedgerView + ?Sized> LedgerView for &T {
    fn fetch_account_state(&self, account: &AccountId, token_id: &TokenId) -> AccountSnapshot {
        (**self).fetch_account_state(account, token_id)
    }
}
