//! # Ledger Module
//!
//! The verifiable-state ledger and the transaction shape it enforces.
//! Every asset movement and escrow state change on a Tandem ledger is
//! expressed as a forest of [`AccountUpdate`] records inside a
//! [`Transaction`], and [`Ledger::apply_transaction`] is the one gate
//! they all pass through.
//!
//! ## Architecture
//!
//! ```text
//! account.rs     — AccountId, TokenId, StateWord, AccountSnapshot
//! update.rs      — AccountUpdate records, UpdateBuilder, commitments
//! transaction.rs — Transaction envelope, TxId, SignedTransaction
//! view.rs        — LedgerView, the read interface contracts consume
//! apply.rs       — Ledger, the validation pipeline, Receipt, errors
//! ```
//!
//! ## Transaction Lifecycle
//!
//! 1. **Read** — Entry points fetch [`AccountSnapshot`]s through
//!    [`LedgerView`] and decide what should happen.
//! 2. **Build** — They emit [`AccountUpdate`] forests whose
//!    preconditions pin everything they read.
//! 3. **Sign** — Each signing party adds its slots to a
//!    [`SignedTransaction`], over either the full commitment or its
//!    own record's.
//! 4. **Apply** — [`Ledger::apply_transaction`] validates the whole
//!    structure and applies it atomically, or leaves the ledger
//!    untouched and says why.
//!
//! ## Design Decisions
//!
//! - Entries are keyed by `(account, token)`: one account's native
//!   funds, custom-token funds, and per-token contract state are
//!   distinct rows with distinct state vectors.
//! - Preconditions are checked against pre-transaction state for the
//!   entire forest. Records never observe each other's effects, which
//!   is what makes concurrent escrow races fail cleanly instead of
//!   interleaving.
//! - Per-token conservation is enforced across each forest; the only
//!   escape hatch is an explicit, owner-held supply-change gate.
//! - Transaction ids are `double_sha256` of the canonical bytes,
//!   keeping ids stable across signing.

pub mod account;
pub mod apply;
pub mod transaction;
pub mod update;
pub mod view;

pub use account::{AccountId, AccountSnapshot, AddressError, StateWord, TokenId};
pub use apply::{AccountEntry, Ledger, LedgerError, Receipt};
pub use transaction::{SignedTransaction, Transaction, TransactionBuilder, TxId};
pub use update::{
    AccountUpdate, Authorization, MayUseToken, Precondition, StateWrite, UpdateBuilder, UpdateKind,
};
pub use view::LedgerView;
