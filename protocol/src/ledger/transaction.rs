//! # Transactions and signing
//!
//! A [`Transaction`] wraps an authorization forest with the fee payer's
//! envelope: who covers the fee, at what nonce, when, and with what
//! memo. The envelope and the forest together produce the *full
//! commitment*, the hash a signer endorses when it wants its record
//! welded to this exact transaction.
//!
//! Signatures travel beside the transaction in a [`SignedTransaction`].
//! Each signature-authorized record gets its own signature slot, keyed
//! by the record's commitment, because one account can appear in
//! several records of the same forest with different bindings. The fee
//! payer always signs the full commitment; other records sign either
//! the full commitment or just their own, per
//! [`AccountUpdate::use_full_commitment`].

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::account::AccountId;
use super::update::{AccountUpdate, Authorization};
use crate::config::{MIN_TX_FEE_MOTES, PROTOCOL_MAGIC};
use crate::crypto::{domain_separated_hash, double_sha256, Keypair, Signature};

/// Domain context for the full transaction commitment.
const TX_CONTEXT: &str = "tandem.tx.v1";

// ---------------------------------------------------------------------------
// TxId
// ---------------------------------------------------------------------------

/// Transaction identifier: `double_sha256` of the canonical bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxId([u8; 32]);

impl TxId {
    /// Wrap raw id bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Raw id bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Hex encoding (64 characters).
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let raw = hex::decode(s)?;
        if raw.len() != 32 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&raw);
        Ok(Self(bytes))
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxId({}…)", &self.to_hex()[..12])
    }
}

// ---------------------------------------------------------------------------
// Transaction
// ---------------------------------------------------------------------------

/// An unsigned transaction: fee envelope plus authorization forest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Account whose native entry pays the fee and advances its nonce.
    pub fee_payer: AccountId,

    /// Fee in motes, debited outside the forest's conservation sum.
    pub fee: u64,

    /// The fee payer's expected sequence number. Applying at any other
    /// nonce is a replay and is rejected.
    pub nonce: u64,

    /// Unix timestamp in milliseconds when the transaction was built.
    pub timestamp: u64,

    /// Optional human-readable memo.
    pub memo: Option<String>,

    /// Root records of the authorization forest.
    pub updates: Vec<AccountUpdate>,
}

impl Transaction {
    /// Start building a transaction paid for by `fee_payer`.
    pub fn builder(fee_payer: AccountId) -> TransactionBuilder {
        TransactionBuilder::new(fee_payer)
    }

    /// Canonical byte representation of the envelope and forest.
    ///
    /// Same discipline as record commitments: fixed-width little-endian
    /// integers, length prefixes, forest roots by commitment hash.
    pub fn commitment_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(128 + 32 * self.updates.len());

        buf.extend_from_slice(&PROTOCOL_MAGIC.to_be_bytes());
        buf.extend_from_slice(self.fee_payer.as_bytes());
        buf.extend_from_slice(&self.fee.to_le_bytes());
        buf.extend_from_slice(&self.nonce.to_le_bytes());
        buf.extend_from_slice(&self.timestamp.to_le_bytes());

        // Memo, length-prefixed if present.
        match &self.memo {
            Some(memo) => {
                buf.push(0x01);
                buf.extend_from_slice(&(memo.len() as u32).to_le_bytes());
                buf.extend_from_slice(memo.as_bytes());
            }
            None => buf.push(0x00),
        }

        // Forest roots by commitment.
        buf.extend_from_slice(&(self.updates.len() as u32).to_le_bytes());
        for root in &self.updates {
            buf.extend_from_slice(&root.commitment());
        }

        buf
    }

    /// The full commitment: what full-commitment signers endorse.
    pub fn commitment(&self) -> [u8; 32] {
        domain_separated_hash(TX_CONTEXT, &self.commitment_bytes())
    }

    /// Transaction id.
    pub fn id(&self) -> TxId {
        TxId(double_sha256(&self.commitment_bytes()))
    }

    /// Total number of records in the forest.
    pub fn update_count(&self) -> usize {
        self.updates.iter().map(|u| u.node_count()).sum()
    }

    /// Depth of the deepest record chain in the forest.
    pub fn tree_depth(&self) -> usize {
        self.updates.iter().map(|u| u.depth()).max().unwrap_or(0)
    }

    /// Visit every record in the forest in depth-first pre-order.
    pub fn for_each_update<'a, F>(&'a self, f: &mut F)
    where
        F: FnMut(&'a AccountUpdate),
    {
        for root in &self.updates {
            root.for_each(f);
        }
    }

    /// The set of accounts that must contribute a signature: the fee
    /// payer plus the account of every signature-authorized record.
    pub fn required_signers(&self) -> BTreeSet<AccountId> {
        let mut signers = BTreeSet::new();
        signers.insert(self.fee_payer);
        self.for_each_update(&mut |record| {
            if record.authorization == Authorization::Signature {
                signers.insert(record.account);
            }
        });
        signers
    }
}

// ---------------------------------------------------------------------------
// TransactionBuilder
// ---------------------------------------------------------------------------

/// Fluent builder for unsigned [`Transaction`]s.
///
/// Defaults: the minimum fee, nonce zero, timestamp taken at build
/// time, no memo, empty forest. Callers almost always want to set the
/// nonce from a ledger snapshot before building.
pub struct TransactionBuilder {
    fee_payer: AccountId,
    fee: u64,
    nonce: u64,
    timestamp: Option<u64>,
    memo: Option<String>,
    updates: Vec<AccountUpdate>,
}

impl TransactionBuilder {
    /// Start a transaction paid for by `fee_payer`.
    pub fn new(fee_payer: AccountId) -> Self {
        Self {
            fee_payer,
            fee: MIN_TX_FEE_MOTES,
            nonce: 0,
            timestamp: None,
            memo: None,
            updates: Vec::new(),
        }
    }

    /// Set the fee in motes.
    pub fn fee(mut self, fee: u64) -> Self {
        self.fee = fee;
        self
    }

    /// Set the fee payer's nonce.
    pub fn nonce(mut self, nonce: u64) -> Self {
        self.nonce = nonce;
        self
    }

    /// Set the timestamp explicitly (Unix milliseconds). If not called,
    /// `build()` uses the current UTC time.
    pub fn timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Attach a memo.
    pub fn memo(mut self, memo: impl Into<String>) -> Self {
        self.memo = Some(memo.into());
        self
    }

    /// Append one root record to the forest.
    pub fn update(mut self, update: AccountUpdate) -> Self {
        self.updates.push(update);
        self
    }

    /// Append several root records.
    pub fn updates(mut self, updates: impl IntoIterator<Item = AccountUpdate>) -> Self {
        self.updates.extend(updates);
        self
    }

    /// Consume the builder and produce an unsigned [`Transaction`].
    pub fn build(self) -> Transaction {
        let timestamp = self
            .timestamp
            .unwrap_or_else(|| Utc::now().timestamp_millis() as u64);

        Transaction {
            fee_payer: self.fee_payer,
            fee: self.fee,
            nonce: self.nonce,
            timestamp,
            memo: self.memo,
            updates: self.updates,
        }
    }
}

// ---------------------------------------------------------------------------
// SignedTransaction
// ---------------------------------------------------------------------------

/// A transaction together with its collected signatures.
///
/// `signatures` is keyed by the hex commitment of the record each
/// signature authorizes. The message actually signed is either the
/// record's own commitment or the transaction's full commitment,
/// depending on the record's binding flag; the key identifies the slot
/// either way.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    /// The transaction being authorized.
    pub transaction: Transaction,

    /// The fee payer's signature over the full commitment.
    pub fee_payer_signature: Option<Signature>,

    /// Per-record signatures, keyed by hex record commitment.
    pub signatures: BTreeMap<String, Signature>,
}

impl SignedTransaction {
    /// Wrap an unsigned transaction with empty signature slots.
    pub fn new(transaction: Transaction) -> Self {
        Self {
            transaction,
            fee_payer_signature: None,
            signatures: BTreeMap::new(),
        }
    }

    /// Contribute every signature `keypair` is responsible for: the fee
    /// payer slot if the key is the fee payer, and one slot per
    /// signature-authorized record addressing the key's account.
    ///
    /// Signing is additive, so a multi-party transaction is passed from
    /// signer to signer until [`is_fully_signed`](Self::is_fully_signed)
    /// holds.
    pub fn sign(mut self, keypair: &Keypair) -> Self {
        let account = AccountId::from_public_key(&keypair.public_key());
        let full = self.transaction.commitment();

        if account == self.transaction.fee_payer {
            self.fee_payer_signature = Some(keypair.sign(&full));
        }

        let mut slots: Vec<(String, [u8; 32])> = Vec::new();
        self.transaction.for_each_update(&mut |record| {
            if record.account == account && record.authorization == Authorization::Signature {
                let message = if record.use_full_commitment {
                    full
                } else {
                    record.commitment()
                };
                slots.push((hex::encode(record.commitment()), message));
            }
        });

        for (key, message) in slots {
            self.signatures.insert(key, keypair.sign(&message));
        }

        self
    }

    /// Look up the signature slot for a record.
    pub fn signature_for(&self, record: &AccountUpdate) -> Option<&Signature> {
        self.signatures.get(&hex::encode(record.commitment()))
    }

    /// The message a record's signature must cover.
    pub fn signing_message(&self, record: &AccountUpdate) -> [u8; 32] {
        if record.use_full_commitment {
            self.transaction.commitment()
        } else {
            record.commitment()
        }
    }

    /// True once the fee payer slot and every signature-authorized
    /// record slot are filled. Says nothing about validity; the ledger
    /// verifies the signatures when it applies the transaction.
    pub fn is_fully_signed(&self) -> bool {
        if self.fee_payer_signature.is_none() {
            return false;
        }
        let mut complete = true;
        self.transaction.for_each_update(&mut |record| {
            if record.authorization == Authorization::Signature
                && self.signature_for(record).is_none()
            {
                complete = false;
            }
        });
        complete
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
