//! # The ledger and its application pipeline
//!
//! [`Ledger`] holds every `(account, token)` entry and is the sole
//! authority on whether a transaction applies. A submitted transaction
//! runs a sequence of checks, ordered from cheapest to most expensive:
//!
//! 1. **Structure** -- record and depth limits, fee bounds, memo
//!    length, slot ranges, duplicate records.
//! 2. **Nonce** -- the fee payer's sequence number must match exactly.
//! 3. **Signatures** -- the fee payer's full-commitment signature, plus
//!    one verification per signature-authorized record against either
//!    the full commitment or the record's own commitment. Debits and
//!    state writes with no authorization at all are rejected here.
//! 4. **Token permission** -- every record moving custom-token balance
//!    must trace its permission claim up the tree to the token owner.
//! 5. **Preconditions** -- every pinned state word is compared against
//!    the ledger as it stood *before* the transaction, for the whole
//!    forest, before anything mutates. Stale snapshots die here.
//! 6. **Write conflicts** -- at most one record per transaction may
//!    write state on a given entry, so "last write wins" never arises.
//! 7. **Conservation** -- per token, balance deltas across the forest
//!    must net to zero unless a record on the token owner's account
//!    explicitly authorizes a supply change. The fee sits outside the
//!    forest and moves to the ledger's fee pool instead.
//! 8. **Balances** -- deltas are simulated in traversal order with
//!    checked arithmetic; only a fully successful simulation commits.
//!
//! Failure at any stage leaves the ledger byte-for-byte untouched.
//! There is no partial application and no retry inside the ledger;
//! resubmission is the job of the chain client.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use super::account::{AccountId, AccountSnapshot, StateWord, TokenId};
use super::transaction::{SignedTransaction, Transaction, TxId};
use super::update::{AccountUpdate, Authorization, MayUseToken, UpdateKind};
use super::view::LedgerView;
use crate::config::{
    MAX_MEMO_LENGTH, MAX_TREE_DEPTH, MAX_TX_FEE_MOTES, MAX_UPDATES_PER_TX, MIN_TX_FEE_MOTES,
    STATE_WORDS,
};
use crate::crypto::{blake3_hash_multi, merkle_root};

/// Label used in error reports for the fee payer's implicit record.
const FEE_PAYER_LABEL: &str = "fee-payer";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why a transaction was refused. Every variant is fatal to the whole
/// transaction; the ledger never applies part of one.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// The forest carries more records than the protocol allows.
    #[error("transaction has {count} records, the limit is {limit}")]
    TooManyRecords { count: usize, limit: usize },

    /// A record chain nests deeper than the protocol allows.
    #[error("authorization tree depth {depth} exceeds the limit {limit}")]
    TreeTooDeep { depth: usize, limit: usize },

    /// The fee is below the protocol floor.
    #[error("fee {fee} is below the minimum {minimum}")]
    FeeTooLow { fee: u64, minimum: u64 },

    /// The fee is implausibly large, usually a unit mistake.
    #[error("fee {fee} exceeds the maximum {maximum}")]
    FeeTooHigh { fee: u64, maximum: u64 },

    /// The memo exceeds the protocol limit.
    #[error("memo is {length} bytes, the limit is {limit}")]
    MemoTooLong { length: usize, limit: usize },

    /// A write or precondition addresses a slot past the state vector.
    #[error("state slot {slot} is out of range (entries have {limit} words)")]
    SlotOutOfRange { slot: usize, limit: usize },

    /// Two records in the forest are byte-identical. One signature
    /// would satisfy both, so a duplicated debit could replay inside
    /// its own transaction; the forest must not contain repeats.
    #[error("duplicate record in authorization forest (label `{label}`)")]
    DuplicateRecord { label: String },

    /// The fee payer's sequence number does not match the ledger.
    #[error("fee payer nonce mismatch: transaction carries {got}, account is at {expected}")]
    NonceMismatch { expected: u64, got: u64 },

    /// An account that must sign has bytes that are not a usable key.
    #[error("account {account} is not backed by a valid signing key")]
    MalformedAccountKey { account: AccountId },

    /// A required signature slot is empty.
    #[error("missing signature for account {account} (record `{label}`)")]
    MissingSignature { account: AccountId, label: String },

    /// A signature was present but does not verify.
    #[error("invalid signature for account {account} (record `{label}`)")]
    InvalidSignature { account: AccountId, label: String },

    /// A record debits an account with no authorization at all.
    #[error("record `{label}` debits account {account} without authorization")]
    UnauthorizedDebit { account: AccountId, label: String },

    /// A record writes state with no authorization at all.
    #[error("record `{label}` writes state on account {account} without authorization")]
    UnauthorizedStateWrite { account: AccountId, label: String },

    /// A record moves balance under a token the ledger has no owner
    /// for.
    #[error("record `{label}` references unregistered token {token}")]
    UnknownToken { token: TokenId, label: String },

    /// A record moves custom-token balance without a permission chain
    /// reaching the token owner.
    #[error("record `{label}` may not move balance under token {token}")]
    TokenPermissionDenied { token: TokenId, label: String },

    /// A pinned state word has changed since the snapshot was taken.
    #[error(
        "precondition mismatch on account {account} slot {slot}: expected {expected}, ledger has {actual}"
    )]
    PreconditionMismatch {
        account: AccountId,
        slot: usize,
        expected: StateWord,
        actual: StateWord,
    },

    /// Two records in one transaction write state on the same entry.
    #[error("conflicting state writes on account {account} under token {token}")]
    WriteConflict { account: AccountId, token: TokenId },

    /// Balance deltas for a token do not net to zero and no supply
    /// change was authorized.
    #[error("net balance delta for token {token} is {net}, expected zero")]
    ConservationViolation { token: TokenId, net: i128 },

    /// A debit exceeds the available balance at its point in the
    /// traversal.
    #[error("insufficient balance on account {account}: have {available}, need {required}")]
    InsufficientBalance {
        account: AccountId,
        available: u64,
        required: u64,
    },

    /// A credit would overflow the entry's balance.
    #[error("balance overflow on account {account}")]
    BalanceOverflow { account: AccountId },
}

// ---------------------------------------------------------------------------
// Entries and receipts
// ---------------------------------------------------------------------------

/// One `(account, token)` row of the ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountEntry {
    /// Balance in motes of the entry's token.
    pub balance: u64,
    /// Sequence number. Only advanced on the fee payer's native entry.
    pub nonce: u64,
    /// The entry's state vector.
    pub state: [StateWord; STATE_WORDS],
}

impl Default for AccountEntry {
    fn default() -> Self {
        Self {
            balance: 0,
            nonce: 0,
            state: [StateWord::ZERO; STATE_WORDS],
        }
    }
}

/// Proof of inclusion handed back for an applied transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    /// Id of the applied transaction.
    pub tx_id: TxId,
    /// Ledger height after application.
    pub height: u64,
    /// Merkle root over all entries after application.
    pub state_root: [u8; 32],
    /// Wall-clock inclusion time.
    pub included_at: DateTime<Utc>,
}

impl Receipt {
    /// Hex encoding of the state root.
    pub fn state_root_hex(&self) -> String {
        hex::encode(self.state_root)
    }
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// The in-memory verifiable-state ledger.
///
/// Entries live in a `BTreeMap` so iteration order, and therefore the
/// state root, is deterministic. The ledger takes no locks; concurrent
/// writers are serialized by whoever owns the ledger (see the chain
/// client), and cross-transaction races are resolved by preconditions,
/// not by mutual exclusion.
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    accounts: BTreeMap<(AccountId, TokenId), AccountEntry>,
    token_owners: BTreeMap<TokenId, AccountId>,
    height: u64,
    fee_pool: u64,
}

impl Ledger {
    /// An empty ledger at height zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `owner` as a token issuer and return the derived token
    /// id. Derivation is deterministic, so re-registering the same
    /// owner is a no-op returning the same id.
    pub fn register_token(&mut self, owner: AccountId) -> TokenId {
        let token = TokenId::derive(&owner);
        self.token_owners.insert(token, owner);
        debug!(token = %token, owner = %owner, "registered token");
        token
    }

    /// The owner registered for `token`, if any.
    pub fn token_owner(&self, token: &TokenId) -> Option<AccountId> {
        self.token_owners.get(token).copied()
    }

    /// Seed an entry with `amount` motes outside any transaction.
    /// Genesis and test bootstrap only; normal balance movement goes
    /// through [`apply_transaction`](Self::apply_transaction).
    pub fn fund(&mut self, account: AccountId, token_id: TokenId, amount: u64) {
        let entry = self.accounts.entry((account, token_id)).or_default();
        entry.balance = entry.balance.saturating_add(amount);
        debug!(account = %account, token = %token_id, amount, "funded entry");
    }

    /// Current balance of an entry, zero if it does not exist.
    pub fn balance(&self, account: &AccountId, token_id: &TokenId) -> u64 {
        self.accounts
            .get(&(*account, *token_id))
            .map(|e| e.balance)
            .unwrap_or(0)
    }

    /// The nonce the account's next transaction must carry.
    pub fn account_nonce(&self, account: &AccountId) -> u64 {
        self.accounts
            .get(&(*account, TokenId::NATIVE))
            .map(|e| e.nonce)
            .unwrap_or(0)
    }

    /// Number of transactions applied so far.
    pub fn height(&self) -> u64 {
        self.height
    }

    /// Total fees collected, in motes.
    pub fn fee_pool(&self) -> u64 {
        self.fee_pool
    }

    /// Merkle root over every entry, in key order.
    pub fn state_root(&self) -> [u8; 32] {
        let leaves: Vec<[u8; 32]> = self
            .accounts
            .iter()
            .map(|((account, token), entry)| {
                let balance = entry.balance.to_le_bytes();
                let nonce = entry.nonce.to_le_bytes();
                let mut words = Vec::with_capacity(STATE_WORDS * 32);
                for word in &entry.state {
                    words.extend_from_slice(word.as_bytes());
                }
                blake3_hash_multi(&[
                    account.as_bytes(),
                    token.as_bytes(),
                    &balance,
                    &nonce,
                    &words,
                ])
            })
            .collect();
        merkle_root(&leaves)
    }

    /// Validate and apply a signed transaction.
    ///
    /// Runs the full pipeline described in the module docs. On success
    /// the forest's balance deltas, state writes, the fee transfer, and
    /// the fee payer's nonce bump all land atomically and a [`Receipt`]
    /// is returned. On any failure the ledger is unchanged.
    pub fn apply_transaction(
        &mut self,
        signed: &SignedTransaction,
    ) -> Result<Receipt, LedgerError> {
        let tx = &signed.transaction;
        let records = collect_records(tx);
        debug!(
            tx = %tx.id(),
            records = records.len(),
            depth = tx.tree_depth(),
            "validating transaction"
        );

        // 1. Structure: limits, slot ranges, duplicate records.
        check_structure(tx, &records)?;

        // 2. Fee payer nonce must match exactly (replay protection).
        let expected_nonce = self.account_nonce(&tx.fee_payer);
        if tx.nonce != expected_nonce {
            return Err(LedgerError::NonceMismatch {
                expected: expected_nonce,
                got: tx.nonce,
            });
        }

        // 3. Signatures and per-record authorization floors.
        check_authorization(signed, &records)?;

        // 4. Token permission chains for custom-token movement.
        self.check_token_permissions(tx)?;

        // 5. Preconditions against pre-transaction state, whole forest.
        self.check_preconditions(&records)?;

        // 6. At most one state-writing record per entry.
        check_write_conflicts(&records)?;

        // 7. Per-token conservation, with owner-gated supply changes.
        self.check_conservation(&records)?;

        // 8. Simulate balances in traversal order; commit only if every
        //    step stays within u64.
        let staged = self.stage_balances(tx, &records)?;

        // Commit. Nothing below this point can fail.
        for (key, balance) in staged {
            self.accounts.entry(key).or_default().balance = balance;
        }
        for record in &records {
            if record.writes.is_empty() {
                continue;
            }
            let entry = self
                .accounts
                .entry((record.account, record.token_id))
                .or_default();
            for write in &record.writes {
                entry.state[write.slot] = write.value;
            }
        }
        self.accounts
            .entry((tx.fee_payer, TokenId::NATIVE))
            .or_default()
            .nonce += 1;
        self.fee_pool += tx.fee;
        self.height += 1;

        let receipt = Receipt {
            tx_id: tx.id(),
            height: self.height,
            state_root: self.state_root(),
            included_at: Utc::now(),
        };
        info!(
            tx = %receipt.tx_id,
            height = receipt.height,
            state_root = %receipt.state_root_hex(),
            "transaction applied"
        );
        Ok(receipt)
    }

    // -- pipeline stages ----------------------------------------------------

    fn check_token_permissions(&self, tx: &Transaction) -> Result<(), LedgerError> {
        let mut chain: Vec<&AccountUpdate> = Vec::new();
        for root in &tx.updates {
            self.walk_token_permission(root, &mut chain)?;
        }
        Ok(())
    }

    fn walk_token_permission<'a>(
        &self,
        record: &'a AccountUpdate,
        chain: &mut Vec<&'a AccountUpdate>,
    ) -> Result<(), LedgerError> {
        chain.push(record);
        if record.kind.moves_balance() && !record.token_id.is_native() {
            let owner = self.token_owners.get(&record.token_id).copied().ok_or_else(|| {
                LedgerError::UnknownToken {
                    token: record.token_id,
                    label: record.label.clone(),
                }
            })?;
            if !entitled(chain, chain.len() - 1, &owner) {
                return Err(LedgerError::TokenPermissionDenied {
                    token: record.token_id,
                    label: record.label.clone(),
                });
            }
        }
        for child in &record.children {
            self.walk_token_permission(child, chain)?;
        }
        chain.pop();
        Ok(())
    }

    fn check_preconditions(&self, records: &[&AccountUpdate]) -> Result<(), LedgerError> {
        for record in records {
            for pre in &record.preconditions {
                let actual = self
                    .accounts
                    .get(&(record.account, record.token_id))
                    .map(|e| e.state[pre.slot])
                    .unwrap_or(StateWord::ZERO);
                if actual != pre.expected {
                    return Err(LedgerError::PreconditionMismatch {
                        account: record.account,
                        slot: pre.slot,
                        expected: pre.expected,
                        actual,
                    });
                }
            }
        }
        Ok(())
    }

    fn check_conservation(&self, records: &[&AccountUpdate]) -> Result<(), LedgerError> {
        let mut net: BTreeMap<TokenId, i128> = BTreeMap::new();
        for record in records {
            if record.kind.moves_balance() {
                *net.entry(record.token_id).or_insert(0) += record.balance_delta();
            }
        }
        for (token, delta) in net {
            if delta == 0 {
                continue;
            }
            // Supply changes are legal only when the token owner's own
            // record in this forest carries the issuance gate.
            let authorized = !token.is_native()
                && self.token_owners.get(&token).map_or(false, |owner| {
                    records.iter().any(|r| {
                        r.account == *owner
                            && r.authorizes_supply_change
                            && r.authorization != Authorization::None
                    })
                });
            if !authorized {
                return Err(LedgerError::ConservationViolation { token, net: delta });
            }
        }
        Ok(())
    }

    fn stage_balances(
        &self,
        tx: &Transaction,
        records: &[&AccountUpdate],
    ) -> Result<HashMap<(AccountId, TokenId), u64>, LedgerError> {
        let mut staged: HashMap<(AccountId, TokenId), u64> = HashMap::new();

        // The fee is debited before the forest runs.
        let fee_key = (tx.fee_payer, TokenId::NATIVE);
        let available = self.balance(&tx.fee_payer, &TokenId::NATIVE);
        let after_fee =
            available
                .checked_sub(tx.fee)
                .ok_or(LedgerError::InsufficientBalance {
                    account: tx.fee_payer,
                    available,
                    required: tx.fee,
                })?;
        staged.insert(fee_key, after_fee);

        for record in records {
            if !record.kind.moves_balance() {
                continue;
            }
            let key = (record.account, record.token_id);
            let current = staged
                .get(&key)
                .copied()
                .unwrap_or_else(|| self.balance(&record.account, &record.token_id));
            let next = match record.kind {
                UpdateKind::Debit { amount } => {
                    current
                        .checked_sub(amount)
                        .ok_or(LedgerError::InsufficientBalance {
                            account: record.account,
                            available: current,
                            required: amount,
                        })?
                }
                UpdateKind::Credit { amount } => current
                    .checked_add(amount)
                    .ok_or(LedgerError::BalanceOverflow {
                        account: record.account,
                    })?,
                UpdateKind::Approval => current,
            };
            staged.insert(key, next);
        }

        Ok(staged)
    }
}

impl LedgerView for Ledger {
    fn fetch_account_state(&self, account: &AccountId, token_id: &TokenId) -> AccountSnapshot {
        match self.accounts.get(&(*account, *token_id)) {
            Some(entry) => AccountSnapshot {
                balance: entry.balance,
                nonce: entry.nonce,
                state: entry.state,
                exists: true,
            },
            None => AccountSnapshot::empty(),
        }
    }
}

// ---------------------------------------------------------------------------
// Stateless checks
// ---------------------------------------------------------------------------

fn collect_records(tx: &Transaction) -> Vec<&AccountUpdate> {
    let mut records = Vec::with_capacity(tx.updates.len());
    tx.for_each_update(&mut |record| records.push(record));
    records
}

fn check_structure(tx: &Transaction, records: &[&AccountUpdate]) -> Result<(), LedgerError> {
    if tx.fee < MIN_TX_FEE_MOTES {
        return Err(LedgerError::FeeTooLow {
            fee: tx.fee,
            minimum: MIN_TX_FEE_MOTES,
        });
    }
    if tx.fee > MAX_TX_FEE_MOTES {
        return Err(LedgerError::FeeTooHigh {
            fee: tx.fee,
            maximum: MAX_TX_FEE_MOTES,
        });
    }
    if records.len() > MAX_UPDATES_PER_TX {
        return Err(LedgerError::TooManyRecords {
            count: records.len(),
            limit: MAX_UPDATES_PER_TX,
        });
    }
    let depth = tx.tree_depth();
    if depth > MAX_TREE_DEPTH {
        return Err(LedgerError::TreeTooDeep {
            depth,
            limit: MAX_TREE_DEPTH,
        });
    }
    if let Some(memo) = &tx.memo {
        if memo.len() > MAX_MEMO_LENGTH {
            return Err(LedgerError::MemoTooLong {
                length: memo.len(),
                limit: MAX_MEMO_LENGTH,
            });
        }
    }

    let mut seen = HashSet::with_capacity(records.len());
    for record in records {
        for write in &record.writes {
            if write.slot >= STATE_WORDS {
                return Err(LedgerError::SlotOutOfRange {
                    slot: write.slot,
                    limit: STATE_WORDS,
                });
            }
        }
        for pre in &record.preconditions {
            if pre.slot >= STATE_WORDS {
                return Err(LedgerError::SlotOutOfRange {
                    slot: pre.slot,
                    limit: STATE_WORDS,
                });
            }
        }
        if !seen.insert(record.commitment()) {
            return Err(LedgerError::DuplicateRecord {
                label: record.label.clone(),
            });
        }
    }
    Ok(())
}

fn check_authorization(
    signed: &SignedTransaction,
    records: &[&AccountUpdate],
) -> Result<(), LedgerError> {
    let tx = &signed.transaction;

    // Fee payer always signs the full commitment.
    let payer_sig = signed
        .fee_payer_signature
        .as_ref()
        .ok_or(LedgerError::MissingSignature {
            account: tx.fee_payer,
            label: FEE_PAYER_LABEL.to_string(),
        })?;
    let payer_key = tx
        .fee_payer
        .public_key()
        .map_err(|_| LedgerError::MalformedAccountKey {
            account: tx.fee_payer,
        })?;
    if !payer_key.verify(&tx.commitment(), payer_sig) {
        return Err(LedgerError::InvalidSignature {
            account: tx.fee_payer,
            label: FEE_PAYER_LABEL.to_string(),
        });
    }

    for record in records {
        match record.authorization {
            Authorization::Signature => {
                let sig =
                    signed
                        .signature_for(record)
                        .ok_or_else(|| LedgerError::MissingSignature {
                            account: record.account,
                            label: record.label.clone(),
                        })?;
                let key = record.account.public_key().map_err(|_| {
                    LedgerError::MalformedAccountKey {
                        account: record.account,
                    }
                })?;
                let message = signed.signing_message(record);
                if !key.verify(&message, sig) {
                    return Err(LedgerError::InvalidSignature {
                        account: record.account,
                        label: record.label.clone(),
                    });
                }
            }
            // Proof records were built by trusted entry points in this
            // process; acceptance rests on that construction.
            Authorization::Proof => {}
            Authorization::None => {
                if matches!(record.kind, UpdateKind::Debit { amount } if amount > 0) {
                    return Err(LedgerError::UnauthorizedDebit {
                        account: record.account,
                        label: record.label.clone(),
                    });
                }
                if !record.writes.is_empty() {
                    return Err(LedgerError::UnauthorizedStateWrite {
                        account: record.account,
                        label: record.label.clone(),
                    });
                }
            }
        }
    }
    Ok(())
}

fn check_write_conflicts(records: &[&AccountUpdate]) -> Result<(), LedgerError> {
    let mut writers: HashSet<(AccountId, TokenId)> = HashSet::new();
    for record in records {
        if record.writes.is_empty() {
            continue;
        }
        let mut slots = HashSet::with_capacity(record.writes.len());
        for write in &record.writes {
            if !slots.insert(write.slot) {
                return Err(LedgerError::WriteConflict {
                    account: record.account,
                    token: record.token_id,
                });
            }
        }
        if !writers.insert((record.account, record.token_id)) {
            return Err(LedgerError::WriteConflict {
                account: record.account,
                token: record.token_id,
            });
        }
    }
    Ok(())
}

/// Whether `chain[idx]` may move balance under the token owned by
/// `owner`. The owner's own records always may; everything else needs
/// an unbroken claim chain back to an owner record.
fn entitled(chain: &[&AccountUpdate], idx: usize, owner: &AccountId) -> bool {
    let record = chain[idx];
    if record.account == *owner {
        return true;
    }
    match record.may_use_token {
        MayUseToken::No => false,
        MayUseToken::ParentsOwnToken => idx > 0 && chain[idx - 1].account == *owner,
        MayUseToken::InheritFromParent => idx > 0 && entitled(chain, idx - 1, owner),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
