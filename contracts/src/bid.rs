//! # Bid escrow
//!
//! The buyer side of an exchange, mirror to [`super::offer`]. A buyer
//! deposits native motes into the contract account and records which
//! asset token they want, how much of it, and the price they are
//! putting up. A seller can then take the bid directly with
//! [`BidEscrow::sell`], or an offer escrow can settle against it so
//! that neither trader signs the closing transaction.
//!
//! Lifecycle:
//!
//! 1. **Empty** -- every record slot zero, no deposit.
//! 2. **Bid** -- [`BidEscrow::bid`] ran: the record holds price,
//!    amount, owner, and the wanted token id, and the contract account
//!    holds the motes.
//! 3. Back to **Empty** -- [`BidEscrow::sell`] or the cooperating
//!    [`BidEscrow::settle`] released the deposit and reset the record.
//!
//! The record lives on the contract's *native* entry; the asset family
//! the bid wants is data in the record, not part of the entry key.

use serde::{Deserialize, Serialize};

use tandem_protocol::ledger::{
    AccountId, AccountSnapshot, AccountUpdate, LedgerView, StateWord, TokenId,
};
use tandem_protocol::tokens::FungibleToken;

use crate::error::{scalar_slot, EscrowError};
use crate::offer;

// ---------------------------------------------------------------------------
// Record layout
// ---------------------------------------------------------------------------

/// Motes on deposit, on the contract's native entry.
pub const SLOT_PRICE: usize = 0;
/// Asset amount the bid wants in exchange.
pub const SLOT_AMOUNT: usize = 1;
/// The bidder's account, zero while the escrow is empty.
pub const SLOT_OWNER: usize = 2;
/// Token id of the wanted asset family.
pub const SLOT_TOKEN: usize = 3;

/// Typed view of a bid's record slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BidRecord {
    /// Motes the bidder put up.
    pub price: u64,
    /// Units of the asset the bidder wants for them.
    pub amount: u64,
    /// The bidder, or [`AccountId::EMPTY`] when no bid is open.
    pub owner: AccountId,
    /// The asset family the bid is denominated in.
    pub token: TokenId,
}

impl BidRecord {
    /// True when no bid is open.
    pub fn is_empty(&self) -> bool {
        self.owner.is_empty()
    }

    fn decode(account: AccountId, snapshot: &AccountSnapshot) -> Result<Self, EscrowError> {
        Ok(Self {
            price: scalar_slot(account, snapshot, SLOT_PRICE)?,
            amount: scalar_slot(account, snapshot, SLOT_AMOUNT)?,
            owner: snapshot.word(SLOT_OWNER).to_account(),
            token: snapshot.word(SLOT_TOKEN).to_token(),
        })
    }
}

// ---------------------------------------------------------------------------
// BidEscrow
// ---------------------------------------------------------------------------

/// Client-side handle to one bid escrow instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BidEscrow {
    account: AccountId,
    token: FungibleToken,
}

impl BidEscrow {
    pub fn new(account: AccountId, token: FungibleToken) -> Self {
        Self { account, token }
    }

    /// The contract account.
    pub fn account(&self) -> AccountId {
        self.account
    }

    /// The asset token this bid wants.
    pub fn token(&self) -> FungibleToken {
        self.token
    }

    /// Decode the current record.
    ///
    /// # Errors
    ///
    /// [`EscrowError::MalformedRecord`] when a scalar slot holds
    /// something other than a `u64`.
    pub fn record(&self, view: &impl LedgerView) -> Result<BidRecord, EscrowError> {
        let snapshot = view.fetch_account_state(&self.account, &TokenId::NATIVE);
        BidRecord::decode(self.account, &snapshot)
    }

    /// Open a bid: deposit `price` motes against `amount` units of the
    /// asset.
    ///
    /// Needs the buyer's signature for the deposit debit. Leaves the
    /// escrow **Bid**.
    ///
    /// # Errors
    ///
    /// [`EscrowError::StateGuard`] when a bid is already open, plus the
    /// [`BidEscrow::record`] errors.
    pub fn bid(
        &self,
        view: &impl LedgerView,
        buyer: AccountId,
        amount: u64,
        price: u64,
    ) -> Result<Vec<AccountUpdate>, EscrowError> {
        let record = self.record(view)?;
        if !record.is_empty() {
            return Err(EscrowError::StateGuard {
                account: self.account,
                current: "Bid".into(),
                expected: "Empty".into(),
            });
        }

        let open = AccountUpdate::builder(self.account)
            .proved()
            .require(SLOT_PRICE, StateWord::ZERO)
            .require(SLOT_AMOUNT, StateWord::ZERO)
            .require(SLOT_OWNER, StateWord::ZERO)
            .require(SLOT_TOKEN, StateWord::ZERO)
            .write(SLOT_PRICE, StateWord::from_u64(price))
            .write(SLOT_AMOUNT, StateWord::from_u64(amount))
            .write(SLOT_OWNER, StateWord::from_account(buyer))
            .write(SLOT_TOKEN, StateWord::from_token(self.token.token_id()))
            .label("bid.open")
            .build();
        let deposit = AccountUpdate::builder(buyer)
            .debit(price)
            .signed()
            .bind_to_transaction()
            .label("bid.open.deposit")
            .child(
                AccountUpdate::builder(self.account)
                    .credit(price)
                    .label("bid.open.escrow")
                    .build(),
            )
            .build();

        Ok(vec![open, deposit])
    }

    /// Take the bid directly: `seller` delivers the recorded asset
    /// amount to the bidder and collects the deposited motes.
    ///
    /// Needs the seller's signature for the asset debit. Leaves the
    /// escrow **Empty**.
    ///
    /// # Errors
    ///
    /// [`EscrowError::StateGuard`] when no bid is open,
    /// [`EscrowError::TokenMismatch`] when this handle's token is not
    /// the recorded one, plus the [`BidEscrow::record`] errors.
    pub fn sell(
        &self,
        view: &impl LedgerView,
        seller: AccountId,
    ) -> Result<Vec<AccountUpdate>, EscrowError> {
        let record = self.record(view)?;
        if record.is_empty() {
            return Err(EscrowError::StateGuard {
                account: self.account,
                current: "Empty".into(),
                expected: "Bid".into(),
            });
        }
        if record.token != self.token.token_id() {
            return Err(EscrowError::TokenMismatch {
                expected: record.token,
                got: self.token.token_id(),
            });
        }

        let payout = AccountUpdate::builder(self.account)
            .debit(record.price)
            .proved()
            .bind_to_transaction()
            .require(SLOT_PRICE, StateWord::from_u64(record.price))
            .require(SLOT_AMOUNT, StateWord::from_u64(record.amount))
            .require(SLOT_OWNER, StateWord::from_account(record.owner))
            .require(SLOT_TOKEN, StateWord::from_token(record.token))
            .write(SLOT_PRICE, StateWord::ZERO)
            .write(SLOT_AMOUNT, StateWord::ZERO)
            .write(SLOT_OWNER, StateWord::ZERO)
            .write(SLOT_TOKEN, StateWord::ZERO)
            .label("bid.sell")
            .child(
                AccountUpdate::builder(seller)
                    .credit(record.price)
                    .label("bid.sell.payment")
                    .build(),
            )
            .build();
        let delivery = self.token.transfer(seller, record.owner, record.amount);

        Ok(vec![payout, delivery])
    }

    /// Build this side's half of an offer/bid settlement: release the
    /// deposited motes to `seller`, reset the record, and guard the
    /// offer escrow's state.
    ///
    /// Invoked by [`super::offer::OfferEscrow::settle`], which embeds
    /// the returned record as a child of its own release. The asserted
    /// terms are checked against what this escrow recorded, so a
    /// mismatched pairing fails before any transaction exists. The
    /// guard child pins the offer's record without writing it; at apply
    /// time that makes this release valid only alongside the very offer
    /// state the terms came from.
    ///
    /// # Errors
    ///
    /// [`EscrowError::StateGuard`] when no bid is open,
    /// [`EscrowError::TokenMismatch`] when the offer trades a different
    /// asset, [`EscrowError::TermMismatch`] when amount or price
    /// disagree, plus the [`BidEscrow::record`] errors.
    pub fn settle(
        &self,
        view: &impl LedgerView,
        offer_account: AccountId,
        asset_token: TokenId,
        amount: u64,
        price: u64,
        seller: AccountId,
    ) -> Result<AccountUpdate, EscrowError> {
        let record = self.record(view)?;
        if record.is_empty() {
            return Err(EscrowError::StateGuard {
                account: self.account,
                current: "Empty".into(),
                expected: "Bid".into(),
            });
        }
        if record.token != asset_token {
            return Err(EscrowError::TokenMismatch {
                expected: record.token,
                got: asset_token,
            });
        }
        if record.amount != amount {
            return Err(EscrowError::TermMismatch {
                field: "amount",
                ours: record.amount,
                theirs: amount,
            });
        }
        if record.price != price {
            return Err(EscrowError::TermMismatch {
                field: "price",
                ours: record.price,
                theirs: price,
            });
        }

        Ok(AccountUpdate::builder(self.account)
            .debit(record.price)
            .proved()
            .bind_to_transaction()
            .require(SLOT_PRICE, StateWord::from_u64(record.price))
            .require(SLOT_AMOUNT, StateWord::from_u64(record.amount))
            .require(SLOT_OWNER, StateWord::from_account(record.owner))
            .require(SLOT_TOKEN, StateWord::from_token(record.token))
            .write(SLOT_PRICE, StateWord::ZERO)
            .write(SLOT_AMOUNT, StateWord::ZERO)
            .write(SLOT_OWNER, StateWord::ZERO)
            .write(SLOT_TOKEN, StateWord::ZERO)
            .label("bid.settle")
            .child(
                AccountUpdate::builder(seller)
                    .credit(record.price)
                    .label("bid.settle.payment")
                    .build(),
            )
            .child(
                // Precondition-only: it is not the writer of the offer's
                // slots, so it never conflicts with the release that is.
                AccountUpdate::builder(offer_account)
                    .token_id(asset_token)
                    .require(offer::SLOT_PRICE, StateWord::from_u64(price))
                    .require(offer::SLOT_AMOUNT, StateWord::from_u64(amount))
                    .require(offer::SLOT_OWNER, StateWord::from_account(seller))
                    .label("bid.settle.guard")
                    .build(),
            )
            .build())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
