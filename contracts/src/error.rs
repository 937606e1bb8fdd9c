//! # Escrow error taxonomy
//!
//! Construction-time failures shared by every escrow variant. These
//! surface while an entry point is turning a ledger snapshot into an
//! authorization tree, before anything touches the chain. Apply-time
//! failures (stale preconditions, missing signatures, conservation) are
//! the ledger's own and come back from submission as `LedgerError`.

use thiserror::Error;

use tandem_protocol::ledger::{AccountId, AccountSnapshot, TokenId};

/// Why an escrow entry point refused to build its tree.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EscrowError {
    /// The escrow is not in a phase that allows this operation.
    #[error("escrow {account} is {current}, expected {expected}")]
    StateGuard {
        /// The escrow's contract account.
        account: AccountId,
        /// The phase read from the ledger.
        current: String,
        /// The phase this operation requires.
        expected: String,
    },

    /// Cross-contract settlement terms disagree.
    #[error("term mismatch on {field}: this side holds {ours}, the caller asserts {theirs}")]
    TermMismatch {
        /// Which stored field disagrees.
        field: &'static str,
        /// The value this escrow has on record.
        ours: u64,
        /// The value the cooperating side asserted.
        theirs: u64,
    },

    /// The settlement token is not the one on record.
    #[error("token mismatch: escrow recorded {expected}, counterparty supplies {got}")]
    TokenMismatch {
        /// The token id this escrow recorded.
        expected: TokenId,
        /// The token id the counterparty brought.
        got: TokenId,
    },

    /// The caller is not the escrow's recorded owner.
    #[error("caller {caller} is not the escrow owner {owner}")]
    NotOwner {
        /// Who tried the operation.
        caller: AccountId,
        /// Who the record says owns the escrow.
        owner: AccountId,
    },

    /// The caller does not hold the option.
    #[error("caller {caller} does not hold the option ({holder} does)")]
    NotHolder {
        /// Who tried the operation.
        caller: AccountId,
        /// The recorded option holder.
        holder: AccountId,
    },

    /// A state word does not decode as the field the layout says it is.
    #[error("slot {slot} on {account} does not decode as {expected}")]
    MalformedRecord {
        /// The contract account whose record is damaged.
        account: AccountId,
        /// The slot that failed to decode.
        slot: usize,
        /// What the layout says the slot holds.
        expected: &'static str,
    },
}

/// Read a slot that must hold a scalar.
pub(crate) fn scalar_slot(
    account: AccountId,
    snapshot: &AccountSnapshot,
    slot: usize,
) -> Result<u64, EscrowError> {
    snapshot
        .word(slot)
        .to_u64()
        .ok_or(EscrowError::MalformedRecord {
            account,
            slot,
            expected: "u64",
        })
}
