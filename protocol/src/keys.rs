//! # Named account fixtures
//!
//! Demos and tests juggle a handful of personae (a seller, a buyer, a
//! token owner) and want to call them by name, not by where their key
//! material came from. [`AccountKey`] bundles a display name with a
//! keypair and the account it controls; [`named_accounts`] mints a
//! whole roster in one call.
//!
//! Derived keys are deterministic per name so a demo prints the same
//! addresses every run. They are development material only; nothing
//! seeded from a public context string belongs near real funds.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::{domain_separated_hash, Keypair};
use crate::ledger::AccountId;

/// Domain context for deterministic development keys.
const DEV_KEY_CONTEXT: &str = "tandem.devkey.v1";

/// Why a key fixture could not be loaded.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyFixtureError {
    /// The secret key is not 32 bytes of hex.
    #[error("fixture `{name}`: secret key is not 32 bytes of hex")]
    InvalidSecretKey { name: String },

    /// The public key is not 32 bytes of hex.
    #[error("fixture `{name}`: public key is not 32 bytes of hex")]
    InvalidPublicKey { name: String },

    /// The listed public key is not the one the secret key produces.
    #[error("fixture `{name}`: public key does not match its secret key")]
    KeyMismatch { name: String },
}

/// A named keypair with the account it controls.
#[derive(Debug, Clone)]
pub struct AccountKey {
    name: String,
    keypair: Keypair,
}

impl AccountKey {
    /// A fresh random key under `name`.
    pub fn random(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            keypair: Keypair::generate(),
        }
    }

    /// The deterministic development key for `name`. Same name, same
    /// key, every run.
    pub fn derived(name: impl Into<String>) -> Self {
        let name = name.into();
        let seed = domain_separated_hash(DEV_KEY_CONTEXT, name.as_bytes());
        Self {
            keypair: Keypair::from_seed(&seed),
            name,
        }
    }

    /// The display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The signing keypair.
    pub fn keypair(&self) -> &Keypair {
        &self.keypair
    }

    /// The account this key controls.
    pub fn account(&self) -> AccountId {
        AccountId::from_public_key(&self.keypair.public_key())
    }

    /// The bech32 mainnet address.
    pub fn address(&self) -> String {
        self.account().to_address()
    }

    /// Serializable fixture form, secret key included.
    pub fn to_fixture(&self) -> KeyFixture {
        KeyFixture {
            name: self.name.clone(),
            secret_key: self.keypair.to_hex(),
            public_key: self.keypair.public_key_hex(),
        }
    }
}

/// One serialized fixture entry: a name plus a hex-encoded key pair.
///
/// The public key is stored alongside the secret on purpose. Fixture
/// files get edited by hand, and a stale or mispasted half of the pair
/// must fail loudly at load time instead of quietly signing for the
/// wrong account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyFixture {
    /// Display name for the account.
    pub name: String,
    /// Hex-encoded 32-byte secret key.
    pub secret_key: String,
    /// Hex-encoded 32-byte public key, cross-checked at load time.
    pub public_key: String,
}

impl KeyFixture {
    /// Validate the pair and produce the usable key.
    pub fn into_account_key(self) -> Result<AccountKey, KeyFixtureError> {
        let keypair = Keypair::from_hex(&self.secret_key).map_err(|_| {
            KeyFixtureError::InvalidSecretKey {
                name: self.name.clone(),
            }
        })?;
        let listed = hex::decode(&self.public_key).map_err(|_| {
            KeyFixtureError::InvalidPublicKey {
                name: self.name.clone(),
            }
        })?;
        if listed.len() != 32 {
            return Err(KeyFixtureError::InvalidPublicKey { name: self.name });
        }
        if keypair.public_key_bytes().as_slice() != listed.as_slice() {
            return Err(KeyFixtureError::KeyMismatch { name: self.name });
        }
        Ok(AccountKey {
            name: self.name,
            keypair,
        })
    }
}

/// The deterministic roster for `names`, in order.
pub fn named_accounts(names: &[&str]) -> Vec<AccountKey> {
    names.iter().map(|name| AccountKey::derived(*name)).collect()
}

/// Validate and load a whole fixture list. One bad pair fails the lot;
/// a half-loaded roster is worse than none.
pub fn load_fixtures(
    fixtures: impl IntoIterator<Item = KeyFixture>,
) -> Result<Vec<AccountKey>, KeyFixtureError> {
    fixtures
        .into_iter()
        .map(KeyFixture::into_account_key)
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
