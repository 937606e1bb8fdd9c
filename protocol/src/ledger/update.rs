//! # Account updates: the authorization tree
//!
//! A transaction does not name a single sender and receiver. It carries
//! a forest of [`AccountUpdate`] records, each describing one account's
//! part in the overall change: a balance delta, state writes, the
//! preconditions under which the record is valid, and how the record is
//! authorized.
//!
//! Records nest. A child record runs under its parent's authority, which
//! is how a contract approves balance movement in its own token family
//! and how one contract composes a call into another: the callee's
//! records arrive as a child forest under the caller's record.
//!
//! The types here are plain data. All enforcement -- signature checks,
//! token permission walks, precondition evaluation, conservation --
//! happens in [`super::apply`] when a ledger applies the transaction.
//!
//! ## Commitments
//!
//! Every record has a deterministic commitment hash over its semantic
//! content and the commitments of its children. Hashing children by
//! commitment rather than by inline bytes means a record's hash pins the
//! entire subtree beneath it. The `label` field is diagnostics only and
//! deliberately excluded; two records that differ only in label are the
//! same record.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::account::{AccountId, StateWord, TokenId};
use crate::config::PROTOCOL_MAGIC;
use crate::crypto::domain_separated_hash;

/// Domain context for record commitments.
const RECORD_CONTEXT: &str = "tandem.record.v1";

// ---------------------------------------------------------------------------
// UpdateKind
// ---------------------------------------------------------------------------

/// What a record does to its entry's balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UpdateKind {
    /// Remove `amount` motes from the entry.
    Debit { amount: u64 },
    /// Add `amount` motes to the entry.
    Credit { amount: u64 },
    /// No balance change. Used for pure state updates, permission
    /// grants, and precondition-only guard records.
    Approval,
}

impl UpdateKind {
    /// Signed balance effect of this record, in motes.
    pub fn balance_delta(&self) -> i128 {
        match self {
            Self::Debit { amount } => -(*amount as i128),
            Self::Credit { amount } => *amount as i128,
            Self::Approval => 0,
        }
    }

    /// True when the record moves balance in either direction.
    pub fn moves_balance(&self) -> bool {
        !matches!(self, Self::Approval)
            && !matches!(self, Self::Debit { amount: 0 } | Self::Credit { amount: 0 })
    }

    fn tag(&self) -> u8 {
        match self {
            Self::Approval => 0,
            Self::Debit { .. } => 1,
            Self::Credit { .. } => 2,
        }
    }

    fn amount(&self) -> u64 {
        match self {
            Self::Debit { amount } | Self::Credit { amount } => *amount,
            Self::Approval => 0,
        }
    }
}

impl fmt::Display for UpdateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Debit { amount } => write!(f, "debit {amount}"),
            Self::Credit { amount } => write!(f, "credit {amount}"),
            Self::Approval => write!(f, "approval"),
        }
    }
}

// ---------------------------------------------------------------------------
// Authorization
// ---------------------------------------------------------------------------

/// How a record proves it speaks for its account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Authorization {
    /// No direct authority. Valid only for records that neither debit
    /// nor write state: plain credits and guard records.
    None,
    /// An Ed25519 signature by the account's key must accompany the
    /// transaction. What the signature covers depends on
    /// [`AccountUpdate::use_full_commitment`].
    Signature,
    /// The record was emitted by the account's own verified contract
    /// logic. On this ledger that means a trusted entry point
    /// constructed it; the record is accepted on that basis.
    Proof,
}

impl Authorization {
    fn tag(&self) -> u8 {
        match self {
            Self::None => 0,
            Self::Signature => 1,
            Self::Proof => 2,
        }
    }
}

impl fmt::Display for Authorization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Signature => write!(f, "signature"),
            Self::Proof => write!(f, "proof"),
        }
    }
}

// ---------------------------------------------------------------------------
// MayUseToken
// ---------------------------------------------------------------------------

/// Whether a record may move balance under a custom token, and where
/// that permission comes from.
///
/// Native-currency movement never needs permission. For any other token
/// the chain of records above a balance-moving record must lead back to
/// the token owner's account, and this flag says how each link in the
/// chain claims that connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MayUseToken {
    /// No claim. The default for records that stay in native currency.
    No,
    /// The direct parent record belongs to the token owner's account.
    ParentsOwnToken,
    /// The parent record itself holds token permission, by either claim.
    /// This is how a callee's records inherit the caller's grant.
    InheritFromParent,
}

impl MayUseToken {
    fn tag(&self) -> u8 {
        match self {
            Self::No => 0,
            Self::ParentsOwnToken => 1,
            Self::InheritFromParent => 2,
        }
    }
}

impl fmt::Display for MayUseToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::No => write!(f, "no"),
            Self::ParentsOwnToken => write!(f, "parents-own-token"),
            Self::InheritFromParent => write!(f, "inherit-from-parent"),
        }
    }
}

// ---------------------------------------------------------------------------
// StateWrite / Precondition
// ---------------------------------------------------------------------------

/// One state-word assignment carried by a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateWrite {
    /// Index of the word being written.
    pub slot: usize,
    /// The value the word takes if the transaction applies.
    pub value: StateWord,
}

/// An equality requirement on the current value of a state word.
///
/// Preconditions are evaluated against the ledger as it stood *before*
/// the transaction, for every record in the forest, before anything is
/// applied. A record built against a snapshot that has since changed
/// fails here instead of executing against state it never saw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Precondition {
    /// Index of the word being pinned.
    pub slot: usize,
    /// The value the word must currently hold.
    pub expected: StateWord,
}

// ---------------------------------------------------------------------------
// AccountUpdate
// ---------------------------------------------------------------------------

/// One record in a transaction's authorization forest.
///
/// Addresses one `(account, token_id)` ledger entry and describes the
/// record's balance effect, state writes, preconditions, authorization,
/// token permission claim, and child records. Construct through
/// [`AccountUpdate::builder`]; the struct itself is inert data that the
/// ledger validates as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountUpdate {
    /// The account this record addresses.
    pub account: AccountId,

    /// The token family of the entry. Balance and state words live on
    /// the `(account, token_id)` pair, not on the account alone.
    pub token_id: TokenId,

    /// Balance effect.
    pub kind: UpdateKind,

    /// State-word assignments, applied only if the whole transaction
    /// applies.
    pub writes: Vec<StateWrite>,

    /// Equality pins on the entry's current words.
    pub preconditions: Vec<Precondition>,

    /// How the record is authorized.
    pub authorization: Authorization,

    /// Token permission claim for custom-token balance movement.
    pub may_use_token: MayUseToken,

    /// When the record is signature-authorized, sign the whole
    /// transaction's commitment instead of just this record's. A record
    /// bound this way cannot be spliced into a different transaction.
    pub use_full_commitment: bool,

    /// Allows this record to absorb a conservation imbalance in its own
    /// token family. Only honored on a record addressing the token
    /// owner's account; this is how minting and burning are authorized.
    pub authorizes_supply_change: bool,

    /// Human-readable note for logs and failure reports. Not part of
    /// the commitment.
    pub label: String,

    /// Child records running under this record's authority.
    pub children: Vec<AccountUpdate>,
}

impl AccountUpdate {
    /// Start building a record for `account`.
    pub fn builder(account: AccountId) -> UpdateBuilder {
        UpdateBuilder::new(account)
    }

    /// Signed balance effect of this record alone, in motes.
    pub fn balance_delta(&self) -> i128 {
        self.kind.balance_delta()
    }

    /// Number of records in this subtree, including this one.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(|c| c.node_count()).sum::<usize>()
    }

    /// Depth of this subtree. A record with no children has depth 1.
    pub fn depth(&self) -> usize {
        1 + self
            .children
            .iter()
            .map(|c| c.depth())
            .max()
            .unwrap_or(0)
    }

    /// Visit this record and every descendant in depth-first pre-order,
    /// the same order the ledger applies balance changes in.
    pub fn for_each<'a, F>(&'a self, f: &mut F)
    where
        F: FnMut(&'a AccountUpdate),
    {
        f(self);
        for child in &self.children {
            child.for_each(f);
        }
    }

    /// Canonical byte representation of this record.
    ///
    /// Fixed-width little-endian integers, length-prefixed sequences,
    /// and children represented by their commitment hashes so the
    /// encoding of a record pins its whole subtree. `label` is
    /// excluded.
    pub fn commitment_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(160 + 36 * (self.writes.len() + self.preconditions.len()));

        // Protocol magic, big-endian so the ASCII tag survives in hexdumps.
        buf.extend_from_slice(&PROTOCOL_MAGIC.to_be_bytes());

        // Addressed entry.
        buf.extend_from_slice(self.account.as_bytes());
        buf.extend_from_slice(self.token_id.as_bytes());

        // Balance effect: kind tag plus amount (zero for approvals).
        buf.push(self.kind.tag());
        buf.extend_from_slice(&self.kind.amount().to_le_bytes());

        // Authorization and permission claims.
        buf.push(self.authorization.tag());
        buf.push(self.may_use_token.tag());

        // Boolean flags packed into one byte.
        let mut flags = 0u8;
        if self.use_full_commitment {
            flags |= 0b0000_0001;
        }
        if self.authorizes_supply_change {
            flags |= 0b0000_0010;
        }
        buf.push(flags);

        // State writes, length-prefixed.
        buf.extend_from_slice(&(self.writes.len() as u32).to_le_bytes());
        for write in &self.writes {
            buf.extend_from_slice(&(write.slot as u32).to_le_bytes());
            buf.extend_from_slice(write.value.as_bytes());
        }

        // Preconditions, length-prefixed.
        buf.extend_from_slice(&(self.preconditions.len() as u32).to_le_bytes());
        for pre in &self.preconditions {
            buf.extend_from_slice(&(pre.slot as u32).to_le_bytes());
            buf.extend_from_slice(pre.expected.as_bytes());
        }

        // Children by commitment hash.
        buf.extend_from_slice(&(self.children.len() as u32).to_le_bytes());
        for child in &self.children {
            buf.extend_from_slice(&child.commitment());
        }

        buf
    }

    /// Commitment hash of this record and its subtree.
    pub fn commitment(&self) -> [u8; 32] {
        domain_separated_hash(RECORD_CONTEXT, &self.commitment_bytes())
    }
}

// ---------------------------------------------------------------------------
// UpdateBuilder
// ---------------------------------------------------------------------------

/// Fluent builder for [`AccountUpdate`] records.
///
/// Defaults describe the most inert possible record: native token,
/// no balance change, no writes, no preconditions, no authorization,
/// no token permission claim. Every capability is opted into.
///
/// ```
/// use tandem_protocol::ledger::{AccountUpdate, StateWord};
/// # use tandem_protocol::ledger::AccountId;
/// # let account = AccountId::EMPTY;
///
/// let record = AccountUpdate::builder(account)
///     .credit(1_000)
///     .label("example.credit")
///     .build();
///
/// assert_eq!(record.balance_delta(), 1_000);
/// ```
pub struct UpdateBuilder {
    update: AccountUpdate,
}

impl UpdateBuilder {
    /// Start a record for `account` with inert defaults.
    pub fn new(account: AccountId) -> Self {
        Self {
            update: AccountUpdate {
                account,
                token_id: TokenId::NATIVE,
                kind: UpdateKind::Approval,
                writes: Vec::new(),
                preconditions: Vec::new(),
                authorization: Authorization::None,
                may_use_token: MayUseToken::No,
                use_full_commitment: false,
                authorizes_supply_change: false,
                label: String::new(),
                children: Vec::new(),
            },
        }
    }

    /// Address an entry under `token` instead of the native currency.
    pub fn token_id(mut self, token: TokenId) -> Self {
        self.update.token_id = token;
        self
    }

    /// Make the record a debit of `amount` motes.
    pub fn debit(mut self, amount: u64) -> Self {
        self.update.kind = UpdateKind::Debit { amount };
        self
    }

    /// Make the record a credit of `amount` motes.
    pub fn credit(mut self, amount: u64) -> Self {
        self.update.kind = UpdateKind::Credit { amount };
        self
    }

    /// Add a state-word write.
    pub fn write(mut self, slot: usize, value: StateWord) -> Self {
        self.update.writes.push(StateWrite { slot, value });
        self
    }

    /// Add an equality precondition on a state word.
    pub fn require(mut self, slot: usize, expected: StateWord) -> Self {
        self.update.preconditions.push(Precondition { slot, expected });
        self
    }

    /// Authorize by account signature.
    pub fn signed(mut self) -> Self {
        self.update.authorization = Authorization::Signature;
        self
    }

    /// Authorize as the output of the account's own contract logic.
    pub fn proved(mut self) -> Self {
        self.update.authorization = Authorization::Proof;
        self
    }

    /// Claim token permission from a parent owned by the token owner.
    pub fn parents_own_token(mut self) -> Self {
        self.update.may_use_token = MayUseToken::ParentsOwnToken;
        self
    }

    /// Inherit the parent record's token permission.
    pub fn inherit_token(mut self) -> Self {
        self.update.may_use_token = MayUseToken::InheritFromParent;
        self
    }

    /// Bind a signature-authorized record to the whole transaction so
    /// it cannot be replayed in another one.
    pub fn bind_to_transaction(mut self) -> Self {
        self.update.use_full_commitment = true;
        self
    }

    /// Allow this record to cover a supply imbalance in its token.
    pub fn authorize_supply_change(mut self) -> Self {
        self.update.authorizes_supply_change = true;
        self
    }

    /// Attach a diagnostic label.
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.update.label = label.into();
        self
    }

    /// Append a child record.
    pub fn child(mut self, child: AccountUpdate) -> Self {
        self.update.children.push(child);
        self
    }

    /// Append several child records.
    pub fn children(mut self, children: impl IntoIterator<Item = AccountUpdate>) -> Self {
        self.update.children.extend(children);
        self
    }

    /// Finish and return the record.
    pub fn build(self) -> AccountUpdate {
        self.update
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Keypair;

    fn account() -> AccountId {
        AccountId::from_public_key(&Keypair::generate().public_key())
    }

    #[test]
    fn builder_defaults_are_inert() {
        let record = AccountUpdate::builder(account()).build();

        assert_eq!(record.token_id, TokenId::NATIVE);
        assert_eq!(record.kind, UpdateKind::Approval);
        assert_eq!(record.authorization, Authorization::None);
        assert_eq!(record.may_use_token, MayUseToken::No);
        assert!(!record.use_full_commitment);
        assert!(!record.authorizes_supply_change);
        assert!(record.writes.is_empty());
        assert!(record.preconditions.is_empty());
        assert!(record.children.is_empty());
        assert_eq!(record.balance_delta(), 0);
    }

    #[test]
    fn builder_sets_every_field() {
        let owner = account();
        let token = TokenId::derive(&owner);
        let child = AccountUpdate::builder(account()).credit(7).build();

        let record = AccountUpdate::builder(owner)
            .token_id(token)
            .debit(42)
            .write(0, StateWord::from_u64(9))
            .require(1, StateWord::from_u64(3))
            .signed()
            .parents_own_token()
            .bind_to_transaction()
            .authorize_supply_change()
            .label("test.record")
            .child(child.clone())
            .build();

        assert_eq!(record.token_id, token);
        assert_eq!(record.kind, UpdateKind::Debit { amount: 42 });
        assert_eq!(record.writes, vec![StateWrite { slot: 0, value: StateWord::from_u64(9) }]);
        assert_eq!(
            record.preconditions,
            vec![Precondition { slot: 1, expected: StateWord::from_u64(3) }]
        );
        assert_eq!(record.authorization, Authorization::Signature);
        assert_eq!(record.may_use_token, MayUseToken::ParentsOwnToken);
        assert!(record.use_full_commitment);
        assert!(record.authorizes_supply_change);
        assert_eq!(record.label, "test.record");
        assert_eq!(record.children, vec![child]);
        assert_eq!(record.balance_delta(), -42);
    }

    #[test]
    fn node_count_and_depth() {
        let a = account();
        let leaf = AccountUpdate::builder(a).credit(1).build();
        let mid = AccountUpdate::builder(a).child(leaf.clone()).child(leaf).build();
        let root = AccountUpdate::builder(a).child(mid).build();

        assert_eq!(root.node_count(), 4);
        assert_eq!(root.depth(), 3);

        let single = AccountUpdate::builder(a).build();
        assert_eq!(single.node_count(), 1);
        assert_eq!(single.depth(), 1);
    }

    #[test]
    fn for_each_visits_pre_order() {
        let a = account();
        let leaf = AccountUpdate::builder(a).label("leaf").build();
        let mid = AccountUpdate::builder(a).label("mid").child(leaf).build();
        let root = AccountUpdate::builder(a).label("root").child(mid).build();

        let mut seen = Vec::new();
        root.for_each(&mut |r| seen.push(r.label.clone()));
        assert_eq!(seen, vec!["root", "mid", "leaf"]);
    }

    #[test]
    fn commitment_is_deterministic() {
        let a = account();
        let make = || {
            AccountUpdate::builder(a)
                .credit(10)
                .write(2, StateWord::from_u64(5))
                .build()
        };
        assert_eq!(make().commitment(), make().commitment());
    }

    #[test]
    fn commitment_covers_semantic_fields() {
        let a = account();
        let base = AccountUpdate::builder(a).credit(10).build();

        let different_amount = AccountUpdate::builder(a).credit(11).build();
        assert_ne!(base.commitment(), different_amount.commitment());

        let different_kind = AccountUpdate::builder(a).debit(10).build();
        assert_ne!(base.commitment(), different_kind.commitment());

        let with_precondition = AccountUpdate::builder(a)
            .credit(10)
            .require(0, StateWord::ZERO)
            .build();
        assert_ne!(base.commitment(), with_precondition.commitment());

        let bound = AccountUpdate::builder(a).credit(10).bind_to_transaction().build();
        assert_ne!(base.commitment(), bound.commitment());
    }

    #[test]
    fn commitment_pins_children() {
        let a = account();
        let child_small = AccountUpdate::builder(a).credit(1).build();
        let child_big = AccountUpdate::builder(a).credit(2).build();

        let tree_small = AccountUpdate::builder(a).child(child_small).build();
        let tree_big = AccountUpdate::builder(a).child(child_big).build();

        assert_ne!(tree_small.commitment(), tree_big.commitment());
    }

    #[test]
    fn label_does_not_affect_commitment() {
        let a = account();
        let plain = AccountUpdate::builder(a).credit(10).label("one").build();
        let relabeled = AccountUpdate::builder(a).credit(10).label("two").build();
        assert_eq!(plain.commitment(), relabeled.commitment());
    }

    #[test]
    fn moves_balance_ignores_zero_amounts() {
        assert!(UpdateKind::Debit { amount: 1 }.moves_balance());
        assert!(UpdateKind::Credit { amount: 1 }.moves_balance());
        assert!(!UpdateKind::Approval.moves_balance());
        assert!(!UpdateKind::Debit { amount: 0 }.moves_balance());
        assert!(!UpdateKind::Credit { amount: 0 }.moves_balance());
    }

    #[test]
    fn update_json_round_trip() {
        let a = account();
        let record = AccountUpdate::builder(a)
            .token_id(TokenId::derive(&a))
            .debit(5)
            .write(0, StateWord::from_u64(1))
            .require(3, StateWord::from_account(a))
            .proved()
            .inherit_token()
            .label("round.trip")
            .child(AccountUpdate::builder(a).credit(5).build())
            .build();

        let json = serde_json::to_string(&record).unwrap();
        let recovered: AccountUpdate = serde_json::from_str(&json).unwrap();
        assert_eq!(record, recovered);
    }
}
