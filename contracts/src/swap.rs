//! # Swap escrow
//!
//! Bilateral exchange between two independently deployed swap
//! instances. There is no buyer or seller: each side escrows an equal
//! amount of its own asset and names the asset family it expects back.
//! Settlement flips ownership of both deposits in one transaction
//! without moving a single balance; each side then withdraws what it
//! now owns on its own schedule.
//!
//! Lifecycle, per instance:
//!
//! 1. **Open** -- every record slot zero, nothing on deposit.
//! 2. **Offered** -- [`SwapEscrow::offer`] deposited the asset and
//!    recorded owner, amount, and the wanted counter-asset.
//! 3. **Settled** -- [`SwapEscrow::settle`] ran against a matching
//!    instance: both records now carry the *other* side's owner.
//! 4. Back to **Open** -- [`SwapEscrow::withdraw`] released the
//!    deposit to its new owner and cleared the record.
//!
//! Splitting settle from withdraw means both sides' preconditions are
//! checked before either side's funds move. The cooperating half of
//! settlement, [`SwapEscrow::base_settle`], is gated by a
//! [`SettleTicket`] only [`SwapEscrow::settle`] can mint, and its
//! record carries a precondition on the caller's phase word; an
//! out-of-flow call fails closed at the API and a replayed record
//! fails at apply time.

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

/// Where a swap instance is in its lifecycle.
///
/// Stored as the record's phase word. `Open` is discriminant zero so an
/// untouched entry reads as an open escrow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwapPhase {
    /// Ready to accept a deposit.
    Open = 0,
    /// Asset deposited, waiting for a counterparty.
    Offered = 1,
    /// Ownership flipped; the deposit awaits withdrawal.
    Settled = 2,
}

impl SwapPhase {
    /// The phase as a state word.
    pub fn word(self) -> StateWord {
        StateWord::from_u64(self as u64)
    }

    /// Decode a state word, `None` for anything that is not a phase.
    pub fn from_word(word: StateWord) -> Option<Self> {
        match word.to_u64()? {
            0 => Some(Self::Open),
            1 => Some(Self::Offered),
            2 => Some(Self::Settled),
            _ => None,
        }
    }
}

impl fmt::Display for SwapPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "Open"),
            Self::Offered => write!(f, "Offered"),
            Self::Settled => write!(f, "Settled"),
        }
    }
}

// ---------------------------------------------------------------------------
// Record layout
// ---------------------------------------------------------------------------

/// Phase word, on the contract's own-asset entry.
pub const SLOT_PHASE: usize = 0;
/// Current owner of the deposit. After settlement this is the
/// counterparty's owner.
pub const SLOT_OWNER: usize = 1;
/// Units of the own asset on deposit.
pub const SLOT_AMOUNT: usize = 2;
/// Token id of the asset family expected from the counterparty.
pub const SLOT_BASE_TOKEN: usize = 3;

/// Typed view of a swap's record slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapRecord {
    /// Lifecycle phase.
    pub phase: SwapPhase,
    /// Whoever the deposit currently belongs to.
    pub owner: AccountId,
    /// Units on deposit.
    pub amount: u64,
    /// The counter-asset this side expects.
    pub base_token: TokenId,
}

impl SwapRecord {
    fn decode(account: AccountId, snapshot: &AccountSnapshot) -> Result<Self, EscrowError> {
        let phase = SwapPhase::from_word(snapshot.word(SLOT_PHASE)).ok_or(
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
        })
    }
}

// ---------------------------------------------------------------------------
// SettleTicket
// ---------------------------------------------------------------------------

/// Capability that proves a [`SwapEscrow::base_settle`] call originates
/// inside a [`SwapEscrow::settle`] flow.
///
/// The field is private to this module, so no code outside it can mint
/// one; `settle` constructs the ticket right before delegating to its
/// counterparty.
pub struct SettleTicket(());

// ---------------------------------------------------------------------------
// SwapEscrow
// ---------------------------------------------------------------------------

/// Client-side handle to one swap escrow instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapEscrow {
    account: AccountId,
    token: FungibleToken,
}

impl SwapEscrow {
    pub fn new(account: AccountId, token: FungibleToken) -> Self {
        Self { account, token }
    }

    /// The contract account.
    pub fn account(&self) -> AccountId {
        self.account
    }

    /// The asset family this instance deposits.
    pub fn token(&self) -> FungibleToken {
        self.token
    }

    /// Decode the current record.
    ///
    /// # Errors
    ///
    /// [`EscrowError::MalformedRecord`] when the phase word is not a
    /// phase or a scalar slot is not a `u64`.
    pub fn record(&self, view: &impl LedgerView) -> Result<SwapRecord, EscrowError> {
        let snapshot = view.fetch_account_state(&self.account, &self.token.token_id());
        SwapRecord::decode(self.account, &snapshot)
    }

    /// Deposit `amount` of the own asset and name the `base_token`
    /// family expected in return.
    ///
    /// Needs the owner's signature for the deposit debit. Leaves the
    /// escrow **Offered**.
    ///
    /// # Errors
    ///
    /// [`EscrowError::StateGuard`] unless the escrow is **Open**, plus
    /// the [`SwapEscrow::record`] errors.
    pub fn offer(
        &self,
        view: &impl LedgerView,
        owner: AccountId,
        amount: u64,
        base_token: TokenId,
    ) -> Result<Vec<AccountUpdate>, EscrowError> {
        let record = self.record(view)?;
        if record.phase != SwapPhase::Open {
            return Err(EscrowError::StateGuard {
                account: self.account,
                current: record.phase.to_string(),
                expected: SwapPhase::Open.to_string(),
            });
        }

        let open = AccountUpdate::builder(self.account)
            .token_id(self.token.token_id())
            .proved()
            .require(SLOT_PHASE, SwapPhase::Open.word())
            .require(SLOT_OWNER, StateWord::ZERO)
            .require(SLOT_AMOUNT, StateWord::ZERO)
            .require(SLOT_BASE_TOKEN, StateWord::ZERO)
            .write(SLOT_PHASE, SwapPhase::Offered.word())
            .write(SLOT_OWNER, StateWord::from_account(owner))
            .write(SLOT_AMOUNT, StateWord::from_u64(amount))
            .write(SLOT_BASE_TOKEN, StateWord::from_token(base_token))
            .label("swap.open")
            .build();
        let deposit = self.token.transfer(owner, self.account, amount);

        Ok(vec![open, deposit])
    }

    /// Settle against a matching counterparty instance: both records
    /// flip to **Settled** with ownership exchanged, and no balance
    /// moves yet.
    ///
    /// The counterparty's half is obtained through its
    /// [`SwapEscrow::base_settle`] and folded in as a child of this
    /// side's record. Nobody signs; both records are
    /// contract-authorized, and each side's full record rides along as
    /// preconditions.
    ///
    /// # Errors
    ///
    /// [`EscrowError::StateGuard`] unless both instances are
    /// **Offered**, [`EscrowError::TokenMismatch`] when this side does
    /// not want the counterparty's asset, and the counterparty's
    /// [`SwapEscrow::base_settle`] errors.
    pub fn settle(
        &self,
        view: &impl LedgerView,
        counterparty: &SwapEscrow,
    ) -> Result<Vec<AccountUpdate>, EscrowError> {
        let record = self.record(view)?;
        if record.phase != SwapPhase::Offered {
            return Err(EscrowError::StateGuard {
                account: self.account,
                current: record.phase.to_string(),
                expected: SwapPhase::Offered.to_string(),
            });
        }
        if record.base_token != counterparty.token.token_id() {
            return Err(EscrowError::TokenMismatch {
                expected: record.base_token,
                got: counterparty.token.token_id(),
            });
        }
        let theirs = counterparty.record(view)?;
        if theirs.phase != SwapPhase::Offered {
            return Err(EscrowError::StateGuard {
                account: counterparty.account,
                current: theirs.phase.to_string(),
                expected: SwapPhase::Offered.to_string(),
            });
        }

        let partner = counterparty.base_settle(
            SettleTicket(()),
            view,
            self.account,
            self.token.token_id(),
            record.amount,
            record.owner,
        )?;

        Ok(vec![AccountUpdate::builder(self.account)
            .token_id(self.token.token_id())
            .proved()
            .bind_to_transaction()
            .require(SLOT_PHASE, SwapPhase::Offered.word())
            .require(SLOT_OWNER, StateWord::from_account(record.owner))
            .require(SLOT_AMOUNT, StateWord::from_u64(record.amount))
            .require(SLOT_BASE_TOKEN, StateWord::from_token(record.base_token))
            .write(SLOT_PHASE, SwapPhase::Settled.word())
            .write(SLOT_OWNER, StateWord::from_account(theirs.owner))
            .label("swap.settle")
            .child(partner)
            .build()])
    }

    /// Build this side's half of a settlement initiated by the caller's
    /// [`SwapEscrow::settle`]: flip to **Settled** and hand ownership
    /// of the deposit to `caller_owner`.
    ///
    /// The asserted terms are checked against this record and against
    /// the caller's ledger record, and the returned update carries a
    /// precondition child pinning the caller's phase word at
    /// **Offered**. A record captured from one settlement cannot be
    /// replayed: after it applies the caller's phase is **Settled** and
    /// the pin fails.
    ///
    /// # Errors
    ///
    /// [`EscrowError::StateGuard`] unless both sides are **Offered**,
    /// [`EscrowError::TokenMismatch`] when the asset families do not
    /// point at each other, [`EscrowError::TermMismatch`] when the
    /// amounts differ, [`EscrowError::NotOwner`] when `caller_owner`
    /// is not the caller's recorded owner, plus the decode errors.
    pub fn base_settle(
        &self,
        _ticket: SettleTicket,
        view: &impl LedgerView,
        caller_account: AccountId,
        caller_token: TokenId,
        caller_amount: u64,
        caller_owner: AccountId,
    ) -> Result<AccountUpdate, EscrowError> {
        let record = self.record(view)?;
        if record.phase != SwapPhase::Offered {
            return Err(EscrowError::StateGuard {
                account: self.account,
                current: record.phase.to_string(),
                expected: SwapPhase::Offered.to_string(),
            });
        }
        if record.base_token != caller_token {
            return Err(EscrowError::TokenMismatch {
                expected: record.base_token,
                got: caller_token,
            });
        }
        if record.amount != caller_amount {
            return Err(EscrowError::TermMismatch {
                field: "amount",
                ours: record.amount,
                theirs: caller_amount,
            });
        }

        let caller_snapshot = view.fetch_account_state(&caller_account, &caller_token);
        let caller_record = SwapRecord::decode(caller_account, &caller_snapshot)?;
        if caller_record.phase != SwapPhase::Offered {
            return Err(EscrowError::StateGuard {
                account: caller_account,
                current: caller_record.phase.to_string(),
                expected: SwapPhase::Offered.to_string(),
            });
        }
        if caller_record.base_token != self.token.token_id() {
            return Err(EscrowError::TokenMismatch {
                expected: self.token.token_id(),
                got: caller_record.base_token,
            });
        }
        if caller_record.owner != caller_owner {
            return Err(EscrowError::NotOwner {
                caller: caller_owner,
                owner: caller_record.owner,
            });
        }

        Ok(AccountUpdate::builder(self.account)
            .token_id(self.token.token_id())
            .proved()
            .bind_to_transaction()
            .require(SLOT_PHASE, SwapPhase::Offered.word())
            .require(SLOT_OWNER, StateWord::from_account(record.owner))
            .require(SLOT_AMOUNT, StateWord::from_u64(record.amount))
            .require(SLOT_BASE_TOKEN, StateWord::from_token(record.base_token))
            .write(SLOT_PHASE, SwapPhase::Settled.word())
            .write(SLOT_OWNER, StateWord::from_account(caller_owner))
            .label("swap.settle.partner")
            .child(
                // Precondition-only pin on the caller's phase word.
                AccountUpdate::builder(caller_account)
                    .token_id(caller_token)
                    .require(SLOT_PHASE, SwapPhase::Offered.word())
                    .label("swap.settle.guard")
                    .build(),
            )
            .build())
    }

    /// Release the deposit to whoever the settled record says owns it
    /// now, and reset the escrow to **Open**.
    ///
    /// # Errors
    ///
    /// [`EscrowError::StateGuard`] unless the escrow is **Settled**,
    /// plus the [`SwapEscrow::record`] errors.
    pub fn withdraw(&self, view: &impl LedgerView) -> Result<Vec<AccountUpdate>, EscrowError> {
        let record = self.record(view)?;
        if record.phase != SwapPhase::Settled {
            return Err(EscrowError::StateGuard {
                account: self.account,
                current: record.phase.to_string(),
                expected: SwapPhase::Settled.to_string(),
            });
        }

        let release = AccountUpdate::builder(self.account)
            .token_id(self.token.token_id())
            .debit(record.amount)
            .proved()
            .bind_to_transaction()
            .parents_own_token()
            .require(SLOT_PHASE, SwapPhase::Settled.word())
            .require(SLOT_OWNER, StateWord::from_account(record.owner))
            .require(SLOT_AMOUNT, StateWord::from_u64(record.amount))
            .require(SLOT_BASE_TOKEN, StateWord::from_token(record.base_token))
            .write(SLOT_PHASE, SwapPhase::Open.word())
            .write(SLOT_OWNER, StateWord::ZERO)
            .write(SLOT_AMOUNT, StateWord::ZERO)
            .write(SLOT_BASE_TOKEN, StateWord::ZERO)
            .label("swap.withdraw")
            .child(
                AccountUpdate::builder(record.owner)
                    .token_id(self.token.token_id())
                    .credit(record.amount)
                    .inherit_token()
                    .label("swap.withdraw.asset")
                    .build(),
            )
            .build();

        Ok(vec![self.token.approve_update(release)])
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
