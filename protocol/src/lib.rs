// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Tandem Protocol -- Core Library
//!
//! Tandem is peer-to-peer asset exchange without the exchange: offers,
//! bids, swaps and options settle as single atomic transactions on a
//! verifiable-state ledger. Escrow accounts stand in for order books,
//! signatures stand in for trust, and a settlement either happens whole
//! or leaves no trace.
//!
//! ## Architecture
//!
//! The crate is split into modules that mirror the actual concerns of
//! an exchange protocol:
//!
//! - **crypto**: Ed25519 signatures and BLAKE3 hashing. The primitives
//!   everything above leans on. Don't roll your own.
//! - **ledger**: accounts, tokens, the authorization-tree transaction
//!   model, and the pipeline that validates and applies it atomically.
//! - **tokens**: the token owner's side of the story. Builds the
//!   owner-approved record trees that move custom-token balance.
//! - **chain**: how anything talks to a chain. The client trait, the
//!   in-process chain for demos and tests, retrying submission.
//! - **keys**: named account fixtures. A seller, a buyer, an owner,
//!   stable addresses every run.
//! - **config**: protocol constants and network parameters.
//!
//! ## Design Philosophy
//!
//! 1. Correctness over performance (but we're still fast).
//! 2. Authorization is explicit per record. Nothing signs by accident.
//! 3. No unsafe code in crypto paths -- we sleep at night.
//! 4. If it touches money, it has tests. Plural.

pub mod chain;
pub mod config;
pub mod crypto;
pub mod keys;
pub mod ledger;
pub mod tokens;
