//! # Tandem Escrow Contracts
//!
//! Client-side contract logic for escrowed exchange on a Tandem ledger.
//! Each module is one escrow variant; all of them share the same shape:
//! a typed record packed into the contract account's state words and a
//! set of pure entry points that read a [`LedgerView`] snapshot and
//! return the authorization tree of one transaction.
//!
//! - **Offer** — seller escrows an asset at an asking price; closed by
//!   a direct buy or by settlement against a bid.
//! - **Bid** — buyer escrows payment for a wanted asset; closed by a
//!   direct sale or by settlement against an offer.
//! - **Swap** — two instances escrow equal amounts of different assets
//!   and exchange ownership atomically, withdrawing separately.
//! - **Option** — a call option: premium up front, strike-for-asset
//!   exchange on exercise.
//!
//! ## Design Principles
//!
//! 1. Entry points never mutate anything. They are functions from
//!    (snapshot, arguments) to records; the ledger is the only mutator.
//! 2. Everything an entry point reads comes back as a precondition, so
//!    stale snapshots fail at apply time instead of misbehaving.
//! 3. Phases are enum variants, not boolean flags, and the zero
//!    discriminant is always the empty phase — an untouched account is
//!    a valid empty escrow.
//! 4. Cross-contract settlement is one-directional delegation: the
//!    cooperating side returns a record, the initiating side folds it
//!    into its own tree. No contract ever holds a reference to another.
//!
//! [`LedgerView`]: tandem_protocol::ledger::LedgerView

pub mod bid;
pub mod error;
pub mod offer;
pub mod option;
pub mod swap;
