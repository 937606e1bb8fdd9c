//! # Offer escrow
//!
//! The seller side of an exchange. A seller deposits `amount` units of
//! an asset token into the contract account and records an asking
//! `price` in native motes. Any buyer can then close the offer by
//! paying that price in the same transaction, or the payment can come
//! out of a [`super::bid::BidEscrow`]'s deposit instead, settling two
//! escrows against each other with no signature from either trader.
//!
//! Lifecycle:
//!
//! 1. **Empty** -- every record slot zero, nothing on deposit.
//! 2. **Offered** -- [`OfferEscrow::offer`] ran: the record holds
//!    price, amount and owner, and the contract account holds the
//!    asset.
//! 3. Back to **Empty** -- [`OfferEscrow::buy`] or
//!    [`OfferEscrow::settle`] released the deposit and reset the
//!    record, atomically with the payment leg.
//!
//! Entry points are pure: they read a [`LedgerView`] snapshot and
//! return the records of one transaction. The same values they read
//! come back as preconditions, so a snapshot that goes stale makes the
//! transaction fail instead of executing against state it never saw.

use serde::{Deserialize, Serialize};

use tandem_protocol::ledger::{AccountId, AccountSnapshot, AccountUpdate, LedgerView, StateWord};
use tandem_protocol::tokens::FungibleToken;

use crate::bid::BidEscrow;
use crate::error::{scalar_slot, EscrowError};

// ---------------------------------------------------------------------------
// Record layout
// ---------------------------------------------------------------------------

/// Asking price in motes, on the contract's asset-token entry.
pub const SLOT_PRICE: usize = 0;
/// Escrowed asset amount.
pub const SLOT_AMOUNT: usize = 1;
/// The seller's account, zero while the escrow is empty.
pub const SLOT_OWNER: usize = 2;

/// Typed view of an offer's record slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferRecord {
    /// Asking price in motes.
    pub price: u64,
    /// Units of the asset token on deposit.
    pub amount: u64,
    /// The seller, or [`AccountId::EMPTY`] when no offer is open.
    pub owner: AccountId,
}

impl OfferRecord {
    /// True when no offer is open.
    pub fn is_empty(&self) -> bool {
        self.owner.is_empty()
    }

    fn decode(account: AccountId, snapshot: &AccountSnapshot) -> Result<Self, EscrowError> {
        Ok(Self {
            price: scalar_slot(account, snapshot, SLOT_PRICE)?,
            amount: scalar_slot(account, snapshot, SLOT_AMOUNT)?,
            owner: snapshot.word(SLOT_OWNER).to_account(),
        })
    }
}

// ---------------------------------------------------------------------------
// OfferEscrow
// ---------------------------------------------------------------------------

/// Client-side handle to one offer escrow instance.
///
/// `account` is the contract account; `token` is the asset family being
/// sold. The record lives on the `(account, token)` entry, so one
/// contract account can host independent offers in different tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OfferEscrow {
    account: AccountId,
    token: FungibleToken,
}

impl OfferEscrow {
    pub fn new(account: AccountId, token: FungibleToken) -> Self {
        Self { account, token }
    }

    /// The contract account.
    pub fn account(&self) -> AccountId {
        self.account
    }

    /// The asset token this escrow trades.
    pub fn token(&self) -> FungibleToken {
        self.token
    }

    /// Decode the current record.
    ///
    /// # Errors
    ///
    /// [`EscrowError::MalformedRecord`] when a scalar slot holds
    /// something other than a `u64`.
    pub fn record(&self, view: &impl LedgerView) -> Result<OfferRecord, EscrowError> {
        let snapshot = view.fetch_account_state(&self.account, &self.token.token_id());
        OfferRecord::decode(self.account, &snapshot)
    }

    /// Open an offer: deposit `amount` of the asset and ask `price`
    /// motes for it.
    ///
    /// The transaction needs the seller's signature (for the asset
    /// debit) and leaves the escrow **Offered**.
    ///
    /// # Errors
    ///
    /// [`EscrowError::StateGuard`] when an offer is already open, plus
    /// the [`OfferEscrow::record`] errors.
    pub fn offer(
        &self,
        view: &impl LedgerView,
        seller: AccountId,
        amount: u64,
        price: u64,
    ) -> Result<Vec<AccountUpdate>, EscrowError> {
        let record = self.record(view)?;
        if !record.is_empty() {
            return Err(EscrowError::StateGuard {
                account: self.account,
                current: "Offered".into(),
                expected: "Empty".into(),
            });
        }

        // Pinning all slots to zero makes two concurrent opens collide:
        // the second one's preconditions fail against the first's writes.
        let open = AccountUpdate::builder(self.account)
            .token_id(self.token.token_id())
            .proved()
            .require(SLOT_PRICE, StateWord::ZERO)
            .require(SLOT_AMOUNT, StateWord::ZERO)
            .require(SLOT_OWNER, StateWord::ZERO)
            .write(SLOT_PRICE, StateWord::from_u64(price))
            .write(SLOT_AMOUNT, StateWord::from_u64(amount))
            .write(SLOT_OWNER, StateWord::from_account(seller))
            .label("offer.open")
            .build();
        let deposit = self.token.transfer(seller, self.account, amount);

        Ok(vec![open, deposit])
    }

    /// Buy the offered asset outright, paying the recorded price from
    /// `buyer`'s native balance.
    ///
    /// Release and payment ride in one transaction; the buyer signs the
    /// payment debit, the escrow's own records are contract-authorized.
    /// Leaves the escrow **Empty**.
    ///
    /// # Errors
    ///
    /// [`EscrowError::StateGuard`] when no offer is open, plus the
    /// [`OfferEscrow::record`] errors.
    pub fn buy(
        &self,
        view: &impl LedgerView,
        buyer: AccountId,
    ) -> Result<Vec<AccountUpdate>, EscrowError> {
        let record = self.record(view)?;
        if record.is_empty() {
            return Err(EscrowError::StateGuard {
                account: self.account,
                current: "Empty".into(),
                expected: "Offered".into(),
            });
        }

        let release = AccountUpdate::builder(self.account)
            .token_id(self.token.token_id())
            .debit(record.amount)
            .proved()
            .bind_to_transaction()
            .parents_own_token()
            .require(SLOT_PRICE, StateWord::from_u64(record.price))
            .require(SLOT_AMOUNT, StateWord::from_u64(record.amount))
            .require(SLOT_OWNER, StateWord::from_account(record.owner))
            .write(SLOT_PRICE, StateWord::ZERO)
            .write(SLOT_AMOUNT, StateWord::ZERO)
            .write(SLOT_OWNER, StateWord::ZERO)
            .label("offer.buy")
            .child(
                AccountUpdate::builder(buyer)
                    .token_id(self.token.token_id())
                    .credit(record.amount)
                    .inherit_token()
                    .label("offer.buy.asset")
                    .build(),
            )
            .build();
        let payment = AccountUpdate::builder(buyer)
            .debit(record.price)
            .signed()
            .bind_to_transaction()
            .label("offer.buy.payment")
            .child(
                AccountUpdate::builder(record.owner)
                    .credit(record.price)
                    .label("offer.buy.proceeds")
                    .build(),
            )
            .build();

        Ok(vec![self.token.approve_update(release), payment])
    }

    /// Settle against a standing bid: the asset goes to `buyer`, the
    /// price comes out of the bid's deposit, and nobody signs.
    ///
    /// Both escrows end **Empty**. The bid side re-checks the terms it
    /// recorded against what this side asserts, so two escrows that
    /// never agreed on price, amount, or token refuse to produce a
    /// transaction at all.
    ///
    /// # Errors
    ///
    /// [`EscrowError::StateGuard`] when either escrow is empty,
    /// [`EscrowError::NotOwner`] when `buyer` is not the bid's owner,
    /// and the bid's [`EscrowError::TermMismatch`] /
    /// [`EscrowError::TokenMismatch`] when the recorded terms disagree.
    pub fn settle(
        &self,
        view: &impl LedgerView,
        bid: &BidEscrow,
        buyer: AccountId,
    ) -> Result<Vec<AccountUpdate>, EscrowError> {
        let record = self.record(view)?;
        if record.is_empty() {
            return Err(EscrowError::StateGuard {
                account: self.account,
                current: "Empty".into(),
                expected: "Offered".into(),
            });
        }
        let payment = bid.settle(
            view,
            self.account,
            self.token.token_id(),
            record.amount,
            record.price,
            record.owner,
        )?;
        // The bid's deposit pays; only its recorded owner may be the
        // one who receives the asset for it.
        let bid_owner = bid.record(view)?.owner;
        if bid_owner != buyer {
            return Err(EscrowError::NotOwner {
                caller: buyer,
                owner: bid_owner,
            });
        }
        let release = AccountUpdate::builder(self.account)
            .token_id(self.token.token_id())
            .debit(record.amount)
            .proved()
            .bind_to_transaction()
            .parents_own_token()
            .require(SLOT_PRICE, StateWord::from_u64(record.price))
            .require(SLOT_AMOUNT, StateWord::from_u64(record.amount))
            .require(SLOT_OWNER, StateWord::from_account(record.owner))
            .write(SLOT_PRICE, StateWord::ZERO)
            .write(SLOT_AMOUNT, StateWord::ZERO)
            .write(SLOT_OWNER, StateWord::ZERO)
            .label("offer.settle")
            .child(
                AccountUpdate::builder(buyer)
                    .token_id(self.token.token_id())
                    .credit(record.amount)
                    .inherit_token()
                    .label("offer.settle.asset")
                    .build(),
            )
            .child(payment)
            .build();

        Ok(vec![self.token.approve_update(release)])
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
