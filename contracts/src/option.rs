//! # Option escrow
//!
//! A call option on an escrowed asset. The writer deposits `amount`
//! units of the underlying and names a strike token and a premium. A
//! buyer pays the premium to acquire the option, and may later exercise
//! it by paying `amount` of the strike token for the underlying.
//!
//! Lifecycle:
//!
//! 1. **Empty** -- every record slot zero, nothing on deposit.
//! 2. **Offered** -- [`OptionEscrow::offer`] deposited the underlying
//!    and recorded the terms; no holder yet.
//! 3. **Accepted** -- [`OptionEscrow::accept`] paid the premium to the
//!    writer and recorded the holder.
//! 4. Back to **Empty** -- [`OptionEscrow::execute`] exchanged strike
//!    payment for the underlying, or [`OptionEscrow::withdraw`]
//!    returned the deposit to the writer.
//!
//! The writer may reclaim the deposit only while the option is unsold:
//! once a premium has been paid, the asset stays committed to the
//! holder until exercise. Premiums are never refunded; they are the
//! price of optionality, not a deposit.

use std::fmt;

use serde::{Deserialize, Serialize};

use tandem_protocol::ledger::{
    AccountId, AccountSnapshot, AccountUpdate, LedgerView, StateWord, TokenId,
};
use tandem_protocol::tokens::FungibleToken;

use crate::error::{scalar_slot, EscrowError};

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

/// Where an option instance is in its lifecycle.
///
/// Stored as the record's phase word; `Empty` is discriminant zero so
/// an untouched entry reads as an empty escrow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptionPhase {
    /// No option written.
    Empty = 0,
    /// Underlying deposited, premium not yet paid.
    Offered = 1,
    /// Premium paid; the holder may exercise.
    Accepted = 2,
}

impl OptionPhase {
    /// The phase as a state word.
    pub fn word(self) -> StateWord {
        StateWord::from_u64(self as u64)
    }

    /// Decode a state word, `None` for anything that is not a phase.
    pub fn from_word(word: StateWord) -> Option<Self> {
        match word.to_u64()? {
            0 => Some(Self::Empty),
            1 => Some(Self::Offered),
            2 => Some(Self::Accepted),
            _ => None,
        }
    }
}

impl fmt::Display for OptionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "Empty"),
            Self::Offered => write!(f, "Offered"),
            Self::Accepted => write!(f, "Accepted"),
        }
    }
}

// ---------------------------------------------------------------------------
// Record layout
// ---------------------------------------------------------------------------

/// Phase word, on the contract's underlying-asset entry.
pub const SLOT_PHASE: usize = 0;
/// The option writer.
pub const SLOT_OWNER: usize = 1;
/// Units of the underlying on deposit.
pub const SLOT_AMOUNT: usize = 2;
/// Token id of the strike payment family.
pub const SLOT_BASE_TOKEN: usize = 3;
/// The option holder, zero until the premium is paid.
pub const SLOT_OPTION_OWNER: usize = 4;
/// Premium in motes.
pub const SLOT_OPTION_PRICE: usize = 5;

/// Typed view of an option's record slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionRecord {
    /// Lifecycle phase.
    pub phase: OptionPhase,
    /// The writer who deposited the underlying.
    pub owner: AccountId,
    /// Units on deposit.
    pub amount: u64,
    /// The strike payment family.
    pub base_token: TokenId,
    /// The holder, or [`AccountId::EMPTY`] before acceptance.
    pub option_owner: AccountId,
    /// Premium in motes.
    pub option_price: u64,
}

impl OptionRecord {
    fn decode(account: AccountId, snapshot: &AccountSnapshot) -> Result<Self, EscrowError> {
        let phase = OptionPhase::from_word(snapshot.word(SLOT_PHASE)).ok_or(
            EscrowError::MalformedRecord {
                account,
                slot: SLOT_PHASE,
                expected: "phase",
            },
        )?;
        Ok(Self {
            phase,
            owner: snapshot.word(SLOT_OWNER).to_account(),
            amount: scalar_slot(account, snapshot, SLOT_AMOUNT)?,
            base_token: snapshot.word(SLOT_BASE_TOKEN).to_token(),
            option_owner: snapshot.word(SLOT_OPTION_OWNER).to_account(),
            option_price: scalar_slot(account, snapshot, SLOT_OPTION_PRICE)?,
        })
    }
}

// ---------------------------------------------------------------------------
// OptionEscrow
// ---------------------------------------------------------------------------

/// Client-side handle to one option escrow instance.
///
/// `token` is the underlying asset family; the strike family is data in
/// the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptionEscrow {
    account: AccountId,
    token: FungibleToken,
}

impl OptionEscrow {
    pub fn new(account: AccountId, token: FungibleToken) -> Self {
        Self { account, token }
    }

    /// The contract account.
    pub fn account(&self) -> AccountId {
        self.account
    }

    /// The underlying asset family.
    pub fn token(&self) -> FungibleToken {
        self.token
    }

    /// Decode the current record.
    ///
    /// # Errors
    ///
    /// [`EscrowError::MalformedRecord`] when the phase word is not a
    /// phase or a scalar slot is not a `u64`.
    pub fn record(&self, view: &impl LedgerView) -> Result<OptionRecord, EscrowError> {
        let snapshot = view.fetch_account_state(&self.account, &self.token.token_id());
        OptionRecord::decode(self.account, &snapshot)
    }

    /// Write an option: deposit `amount` of the underlying, to be
    /// exercised against `base_token` at par, for an up-front
    /// `option_price` premium.
    ///
    /// Needs the writer's signature for the deposit debit. Leaves the
    /// escrow **Offered**.
    ///
    /// # Errors
    ///
    /// [`EscrowError::StateGuard`] unless the escrow is **Empty**, plus
    /// the [`OptionEscrow::record`] errors.
    pub fn offer(
        &self,
        view: &impl LedgerView,
        owner: AccountId,
        amount: u64,
        base_token: TokenId,
        option_price: u64,
    ) -> Result<Vec<AccountUpdate>, EscrowError> {
        let record = self.record(view)?;
        if record.phase != OptionPhase::Empty {
            return Err(EscrowError::StateGuard {
                account: self.account,
                current: record.phase.to_string(),
                expected: OptionPhase::Empty.to_string(),
            });
        }

        let open = AccountUpdate::builder(self.account)
            .token_id(self.token.token_id())
            .proved()
            .require(SLOT_PHASE, OptionPhase::Empty.word())
            .require(SLOT_OWNER, StateWord::ZERO)
            .require(SLOT_AMOUNT, StateWord::ZERO)
            .require(SLOT_BASE_TOKEN, StateWord::ZERO)
            .require(SLOT_OPTION_OWNER, StateWord::ZERO)
            .require(SLOT_OPTION_PRICE, StateWord::ZERO)
            .write(SLOT_PHASE, OptionPhase::Offered.word())
            .write(SLOT_OWNER, StateWord::from_account(owner))
            .write(SLOT_AMOUNT, StateWord::from_u64(amount))
            .write(SLOT_BASE_TOKEN, StateWord::from_token(base_token))
            .write(SLOT_OPTION_PRICE, StateWord::from_u64(option_price))
            .label("option.open")
            .build();
        let deposit = self.token.transfer(owner, self.account, amount);

        Ok(vec![open, deposit])
    }

    /// Buy the option: pay the recorded premium to the writer and
    /// become the holder.
    ///
    /// Needs the buyer's signature for the premium debit. Leaves the
    /// escrow **Accepted**.
    ///
    /// # Errors
    ///
    /// [`EscrowError::StateGuard`] unless the escrow is **Offered**,
    /// plus the [`OptionEscrow::record`] errors.
    pub fn accept(
        &self,
        view: &impl LedgerView,
        buyer: AccountId,
    ) -> Result<Vec<AccountUpdate>, EscrowError> {
        let record = self.record(view)?;
        if record.phase != OptionPhase::Offered {
            return Err(EscrowError::StateGuard {
                account: self.account,
                current: record.phase.to_string(),
                expected: OptionPhase::Offered.to_string(),
            });
        }

        let flip = AccountUpdate::builder(self.account)
            .token_id(self.token.token_id())
            .proved()
            .require(SLOT_PHASE, OptionPhase::Offered.word())
            .require(SLOT_OWNER, StateWord::from_account(record.owner))
            .require(SLOT_AMOUNT, StateWord::from_u64(record.amount))
            .require(SLOT_BASE_TOKEN, StateWord::from_token(record.base_token))
            .require(SLOT_OPTION_OWNER, StateWord::ZERO)
            .require(SLOT_OPTION_PRICE, StateWord::from_u64(record.option_price))
            .write(SLOT_PHASE, OptionPhase::Accepted.word())
            .write(SLOT_OPTION_OWNER, StateWord::from_account(buyer))
            .label("option.accept")
            .build();
        let premium = AccountUpdate::builder(buyer)
            .debit(record.option_price)
            .signed()
            .bind_to_transaction()
            .label("option.accept.premium")
            .child(
                AccountUpdate::builder(record.owner)
                    .credit(record.option_price)
                    .label("option.accept.proceeds")
                    .build(),
            )
            .build();

        Ok(vec![flip, premium])
    }

    /// Exercise the option: `caller` pays `amount` of the strike token
    /// to the writer and takes the underlying.
    ///
    /// `base` must be the strike family's token handle; the caller
    /// signs the strike debit. Leaves the escrow **Empty**.
    ///
    /// # Errors
    ///
    /// [`EscrowError::StateGuard`] unless the escrow is **Accepted**,
    /// [`EscrowError::NotHolder`] when `caller` does not hold the
    /// option, [`EscrowError::TokenMismatch`] when `base` is not the
    /// recorded strike family, plus the [`OptionEscrow::record`]
    /// errors.
    pub fn execute(
        &self,
        view: &impl LedgerView,
        base: &FungibleToken,
        caller: AccountId,
    ) -> Result<Vec<AccountUpdate>, EscrowError> {
        let record = self.record(view)?;
        if record.phase != OptionPhase::Accepted {
            return Err(EscrowError::StateGuard {
                account: self.account,
                current: record.phase.to_string(),
                expected: OptionPhase::Accepted.to_string(),
            });
        }
        if caller != record.option_owner {
            return Err(EscrowError::NotHolder {
                caller,
                holder: record.option_owner,
            });
        }
        if base.token_id() != record.base_token {
            return Err(EscrowError::TokenMismatch {
                expected: record.base_token,
                got: base.token_id(),
            });
        }

        let release = AccountUpdate::builder(self.account)
            .token_id(self.token.token_id())
            .debit(record.amount)
            .proved()
            .bind_to_transaction()
            .parents_own_token()
            .require(SLOT_PHASE, OptionPhase::Accepted.word())
            .require(SLOT_OWNER, StateWord::from_account(record.owner))
            .require(SLOT_AMOUNT, StateWord::from_u64(record.amount))
            .require(SLOT_BASE_TOKEN, StateWord::from_token(record.base_token))
            .require(SLOT_OPTION_OWNER, StateWord::from_account(record.option_owner))
            .require(SLOT_OPTION_PRICE, StateWord::from_u64(record.option_price))
            .write(SLOT_PHASE, OptionPhase::Empty.word())
            .write(SLOT_OWNER, StateWord::ZERO)
            .write(SLOT_AMOUNT, StateWord::ZERO)
            .write(SLOT_BASE_TOKEN, StateWord::ZERO)
            .write(SLOT_OPTION_OWNER, StateWord::ZERO)
            .write(SLOT_OPTION_PRICE, StateWord::ZERO)
            .label("option.execute")
            .child(
                AccountUpdate::builder(caller)
                    .token_id(self.token.token_id())
                    .credit(record.amount)
                    .inherit_token()
                    .label("option.execute.asset")
                    .build(),
            )
            .build();
        let strike = base.transfer(caller, record.owner, record.amount);

        Ok(vec![self.token.approve_update(release), strike])
    }

    /// Reclaim an unsold option's deposit and reset the escrow.
    ///
    /// Only the writer may withdraw, and only while **Offered**; after
    /// a premium has been paid the deposit is committed to the holder.
    ///
    /// # Errors
    ///
    /// [`EscrowError::StateGuard`] unless the escrow is **Offered**,
    /// [`EscrowError::NotOwner`] when `caller` is not the writer, plus
    /// the [`OptionEscrow::record`] errors.
    pub fn withdraw(
        &self,
        view: &impl LedgerView,
        caller: AccountId,
    ) -> Result<Vec<AccountUpdate>, EscrowError> {
        let record = self.record(view)?;
        if record.phase != OptionPhase::Offered {
            return Err(EscrowError::StateGuard {
                account: self.account,
                current: record.phase.to_string(),
                expected: OptionPhase::Offered.to_string(),
            });
        }
        if caller != record.owner {
            return Err(EscrowError::NotOwner {
                caller,
                owner: record.owner,
            });
        }

        let release = AccountUpdate::builder(self.account)
            .token_id(self.token.token_id())
            .debit(record.amount)
            .proved()
            .bind_to_transaction()
            .parents_own_token()
            .require(SLOT_PHASE, OptionPhase::Offered.word())
            .require(SLOT_OWNER, StateWord::from_account(record.owner))
            .require(SLOT_AMOUNT, StateWord::from_u64(record.amount))
            .require(SLOT_BASE_TOKEN, StateWord::from_token(record.base_token))
            .require(SLOT_OPTION_OWNER, StateWord::ZERO)
            .require(SLOT_OPTION_PRICE, StateWord::from_u64(record.option_price))
            .write(SLOT_PHASE, OptionPhase::Empty.word())
            .write(SLOT_OWNER, StateWord::ZERO)
            .write(SLOT_AMOUNT, StateWord::ZERO)
            .write(SLOT_BASE_TOKEN, StateWord::ZERO)
            .write(SLOT_OPTION_PRICE, StateWord::ZERO)
            .label("option.withdraw")
            .child(
                AccountUpdate::builder(record.owner)
                    .token_id(self.token.token_id())
                    .credit(record.amount)
                    .inherit_token()
                    .label("option.withdraw.asset")
                    .build(),
            )
            .build();

        Ok(vec![self.token.approve_update(release)])
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
