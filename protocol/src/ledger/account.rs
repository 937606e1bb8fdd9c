//! # Accounts, tokens, and on-ledger state words
//!
//! The ledger is keyed by `(AccountId, TokenId)` pairs. The same
//! account can hold a native balance and any number of custom-token
//! balances, and each of those entries carries its own state vector.
//!
//! ## Identity model
//!
//! An [`AccountId`] is the raw Ed25519 public key of the account,
//! rendered as a Bech32 address (`tdm1...`) for humans. There is no
//! hashing step between key and identity: signature verification reads
//! the key straight out of the id, which keeps the authorization path
//! free of lookups.
//!
//! A [`TokenId`] is content-addressed: it is the domain-separated
//! BLAKE3 hash of the issuing account's id. Whoever controls that
//! account is the token's owner, and the derivation means token ids
//! cannot be squatted or forged.
//!
//! ## State words
//!
//! Every ledger entry exposes [`STATE_WORDS`](crate::config::STATE_WORDS)
//! 32-byte [`StateWord`]s. Contracts pack scalars, account ids, and
//! token ids into these words; the conversions here are the only
//! sanctioned way to do that packing.

use std::fmt;

use bech32::{Bech32, Hrp};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{MAINNET_HRP, STATE_WORDS, TESTNET_HRP};
use crate::crypto::{domain_separated_hash, PublicKey};

/// Domain context for deriving token ids from their owning account.
const TOKEN_ID_CONTEXT: &str = "tandem.token.v1";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from parsing or interpreting account and token identifiers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AddressError {
    /// The Bech32 envelope itself failed to decode.
    #[error("bech32 decode failed: {0}")]
    Bech32Decode(String),

    /// The human-readable prefix is not one of ours.
    #[error("unexpected address prefix: expected {expected}, got {got}")]
    InvalidHrp { expected: String, got: String },

    /// The decoded payload has the wrong length.
    #[error("address payload must be {expected} bytes, got {got}")]
    InvalidLength { expected: usize, got: usize },

    /// A hex string failed to parse.
    #[error("invalid hex encoding: {0}")]
    InvalidHex(String),

    /// The account's bytes do not form a valid Ed25519 public key, so
    /// it can never produce a verifiable signature.
    #[error("account bytes are not a valid public key")]
    NotAPublicKey,
}

// ---------------------------------------------------------------------------
// AccountId
// ---------------------------------------------------------------------------

/// On-ledger identity of an account: its Ed25519 public key.
///
/// Ordering and hashing are over the raw key bytes, which makes the
/// id usable as a map key and gives the ledger a deterministic
/// iteration order for state-root computation.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AccountId([u8; 32]);

impl AccountId {
    /// The all-zeros sentinel. Never a real key; contracts store it in
    /// a state word to mean "no account recorded here".
    pub const EMPTY: AccountId = AccountId([0u8; 32]);

    /// Wrap raw key bytes without validation.
    ///
    /// Use [`public_key`](Self::public_key) later if the id needs to
    /// verify signatures; ids that only ever receive funds or hold
    /// contract state never need a valid curve point.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Derive the id for a public key. This is the identity map: the
    /// id *is* the key.
    pub fn from_public_key(pk: &PublicKey) -> Self {
        Self(*pk.as_bytes())
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// True for the all-zeros sentinel.
    pub fn is_empty(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Recover the verifying key, failing if the bytes are not a valid
    /// curve point (for example the [`EMPTY`](Self::EMPTY) sentinel).
    pub fn public_key(&self) -> Result<PublicKey, AddressError> {
        PublicKey::try_from_slice(&self.0).map_err(|_| AddressError::NotAPublicKey)
    }

    /// Encode as a mainnet Bech32 address (`tdm1...`).
    pub fn to_address(&self) -> String {
        let hrp = Hrp::parse(MAINNET_HRP).expect("static HRP is valid");
        bech32::encode::<Bech32>(hrp, &self.0)
            .expect("encoding a 32-byte payload should never fail")
    }

    /// Encode as a testnet Bech32 address (`ttdm1...`).
    pub fn to_testnet_address(&self) -> String {
        let hrp = Hrp::parse(TESTNET_HRP).expect("static HRP is valid");
        bech32::encode::<Bech32>(hrp, &self.0)
            .expect("encoding a 32-byte payload should never fail")
    }

    /// Parse a Bech32 address with either the mainnet or testnet
    /// prefix. Checksum, prefix, and payload length are all validated.
    pub fn from_address(addr: &str) -> Result<Self, AddressError> {
        let (hrp, data) =
            bech32::decode(addr).map_err(|e| AddressError::Bech32Decode(e.to_string()))?;

        let mainnet = Hrp::parse(MAINNET_HRP).expect("static HRP is valid");
        let testnet = Hrp::parse(TESTNET_HRP).expect("static HRP is valid");
        if hrp != mainnet && hrp != testnet {
            return Err(AddressError::InvalidHrp {
                expected: format!("{MAINNET_HRP} or {TESTNET_HRP}"),
                got: hrp.to_string(),
            });
        }

        if data.len() != 32 {
            return Err(AddressError::InvalidLength {
                expected: 32,
                got: data.len(),
            });
        }

        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&data);
        Ok(Self(bytes))
    }

    /// Hex encoding of the raw key bytes.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex (64 characters).
    pub fn from_hex(s: &str) -> Result<Self, AddressError> {
        let raw = hex::decode(s).map_err(|e| AddressError::InvalidHex(e.to_string()))?;
        if raw.len() != 32 {
            return Err(AddressError::InvalidLength {
                expected: 32,
                got: raw.len(),
            });
        }
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&raw);
        Ok(Self(bytes))
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_address())
    }
}

impl fmt::Debug for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let addr = self.to_address();
        let head = &addr[..addr.len().min(16)];
        write!(f, "AccountId({head}…)")
    }
}

// ---------------------------------------------------------------------------
// TokenId
// ---------------------------------------------------------------------------

/// Identifier of a token family.
///
/// [`TokenId::NATIVE`] denotes the built-in currency. Every other
/// token id is derived from the owning account with
/// [`TokenId::derive`], which makes token ownership a fact of the
/// derivation rather than a registry entry that could be tampered
/// with.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TokenId([u8; 32]);

impl TokenId {
    /// The native currency of the ledger.
    pub const NATIVE: TokenId = TokenId([0u8; 32]);

    /// Derive the token id owned by `owner`.
    pub fn derive(owner: &AccountId) -> Self {
        Self(domain_separated_hash(TOKEN_ID_CONTEXT, owner.as_bytes()))
    }

    /// Wrap raw bytes without validation.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Raw id bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// True for the native currency.
    pub fn is_native(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Hex encoding of the id.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex (64 characters).
    pub fn from_hex(s: &str) -> Result<Self, AddressError> {
        let raw = hex::decode(s).map_err(|e| AddressError::InvalidHex(e.to_string()))?;
        if raw.len() != 32 {
            return Err(AddressError::InvalidLength {
                expected: 32,
                got: raw.len(),
            });
        }
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&raw);
        Ok(Self(bytes))
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_native() {
            write!(f, "native")
        } else {
            write!(f, "{}", self.to_hex())
        }
    }
}

impl fmt::Debug for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_native() {
            write!(f, "TokenId(native)")
        } else {
            write!(f, "TokenId({}…)", &self.to_hex()[..12])
        }
    }
}

// ---------------------------------------------------------------------------
// StateWord
// ---------------------------------------------------------------------------

/// One 32-byte word of on-ledger contract state.
///
/// Words are opaque to the ledger; contracts give them meaning by
/// packing scalars and identifiers into them. Scalars occupy the first
/// eight bytes little-endian with the rest zeroed, so a word holding a
/// `u64` is distinguishable from one holding an identifier.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StateWord([u8; 32]);

impl StateWord {
    /// The all-zeros word, the initial value of every slot.
    pub const ZERO: StateWord = StateWord([0u8; 32]);

    /// Pack a scalar into a word.
    pub fn from_u64(value: u64) -> Self {
        let mut bytes = [0u8; 32];
        bytes[..8].copy_from_slice(&value.to_le_bytes());
        Self(bytes)
    }

    /// Unpack a scalar. Returns `None` when any of the upper 24 bytes
    /// is set, which means the word holds something other than a
    /// scalar.
    pub fn to_u64(&self) -> Option<u64> {
        if self.0[8..].iter().any(|b| *b != 0) {
            return None;
        }
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&self.0[..8]);
        Some(u64::from_le_bytes(raw))
    }

    /// Pack an account id into a word.
    pub fn from_account(account: AccountId) -> Self {
        Self(*account.as_bytes())
    }

    /// Reinterpret the word as an account id. Total: any 32 bytes form
    /// an id, and the zero word maps to [`AccountId::EMPTY`].
    pub fn to_account(&self) -> AccountId {
        AccountId::from_bytes(self.0)
    }

    /// Pack a token id into a word.
    pub fn from_token(token: TokenId) -> Self {
        Self(*token.as_bytes())
    }

    /// Reinterpret the word as a token id. The zero word maps to
    /// [`TokenId::NATIVE`].
    pub fn to_token(&self) -> TokenId {
        TokenId::from_bytes(self.0)
    }

    /// Wrap raw bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Raw word bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// True when every byte is zero.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl fmt::Display for StateWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for StateWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_zero() {
            write!(f, "StateWord(0)")
        } else {
            write!(f, "StateWord({}…)", &hex::encode(self.0)[..16])
        }
    }
}

// ---------------------------------------------------------------------------
// AccountSnapshot
// ---------------------------------------------------------------------------

/// A read-only view of one `(account, token)` ledger entry.
///
/// Contracts build their authorization trees against snapshots: they
/// read the current words here and then emit preconditions pinning
/// those same words, so a snapshot that goes stale between read and
/// application makes the transaction fail instead of misbehave.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    /// Balance in the entry's token, in motes.
    pub balance: u64,
    /// Sequence number, advanced when the account pays a fee.
    pub nonce: u64,
    /// The entry's state vector.
    pub state: [StateWord; STATE_WORDS],
    /// Whether the entry has ever been touched. An entry that does not
    /// exist reads as zero balance and all-zero words.
    pub exists: bool,
}

impl AccountSnapshot {
    /// The snapshot of an entry that was never created.
    pub fn empty() -> Self {
        Self {
            balance: 0,
            nonce: 0,
            state: [StateWord::ZERO; STATE_WORDS],
            exists: false,
        }
    }

    /// Read one state word, treating out-of-range slots as zero.
    pub fn word(&self, slot: usize) -> StateWord {
        self.state.get(slot).copied().unwrap_or(StateWord::ZERO)
    }
}

impl Default for AccountSnapshot {
    fn default() -> Self {
        Self::empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
