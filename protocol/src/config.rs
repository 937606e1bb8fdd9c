//! # Protocol Configuration & Constants
//!
//! Every magic number in Tandem lives here. If you're hardcoding a constant
//! somewhere else, you're doing it wrong and you owe the team coffee.
//!
//! These values define the shape of every transaction the ledger will accept.
//! Changing them after contracts are deployed invalidates in-flight escrows,
//! so choose wisely during devnet.

use std::time::Duration;

// ---------------------------------------------------------------------------
// Chain Targets
// ---------------------------------------------------------------------------

/// Local in-process chain. Instant inclusion, no network, no mercy withheld.
pub const CHAIN_ID_LOCAL: u32 = 0x544E444C; // "TNDL"

/// Devnet. Reset whenever it gets in the way, which is often.
pub const CHAIN_ID_DEVNET: u32 = 0x544E4444; // "TNDD"

/// Lightnet. A single-operator network for integration runs that want real
/// submission latency without real stakes.
pub const CHAIN_ID_LIGHTNET: u32 = 0x544E4447; // "TNDG"

/// Zeko. The hosted rollup target. Known for rejecting perfectly good
/// transactions on the first try, hence the resubmission policy below.
pub const CHAIN_ID_ZEKO: u32 = 0x544E445A; // "TNDZ"

/// Human-readable prefixes for addresses. Bech32 HRP values, short enough
/// to type and long enough to be unambiguous.
pub const MAINNET_HRP: &str = "tdm";
pub const TESTNET_HRP: &str = "ttdm";

// ---------------------------------------------------------------------------
// Protocol Version
// ---------------------------------------------------------------------------

/// Protocol magic bytes prefixed to every canonical byte encoding before it
/// is hashed or signed. Keeps Tandem commitments from ever colliding with
/// another protocol's, even for byte-identical payloads.
pub const PROTOCOL_MAGIC: u32 = 0x544E444D; // "TNDM"

/// Protocol fingerprint for logs and handshake-style identification.
pub const PROTOCOL_FINGERPRINT: &str = "ALAS-TANDEM-2026";

/// Major version. Bump on changes that invalidate existing escrow records.
pub const PROTOCOL_VERSION_MAJOR: u16 = 0;

/// Minor version. Bump on backward-compatible additions.
pub const PROTOCOL_VERSION_MINOR: u16 = 1;

/// The full version string, assembled at compile time so we don't allocate
/// for something this trivial at runtime.
pub const PROTOCOL_VERSION: &str = "0.1.0";

// ---------------------------------------------------------------------------
// Cryptographic Parameters
// ---------------------------------------------------------------------------

/// Ed25519 everywhere a human or contract authorizes anything.
/// Deterministic signatures, no nonce footguns, fast verification.
pub const SIGNING_ALGORITHM: &str = "Ed25519";

/// Ed25519 secret keys are 32 bytes.
pub const SIGNING_KEY_LENGTH: usize = 32;

/// Public (verifying) key length in bytes.
pub const VERIFYING_KEY_LENGTH: usize = 32;

/// Ed25519 signature length. Always 64 bytes. If yours isn't, something
/// has gone terribly wrong.
pub const SIGNATURE_LENGTH: usize = 64;

/// The hash function for account ids, token ids and tree commitments.
/// BLAKE3, with domain separation per use. Transaction ids use
/// double-SHA-256 for cross-chain reference compatibility.
pub const PRIMARY_HASH_FUNCTION: &str = "BLAKE3";

/// Hash output length in bytes. Both SHA-256 and BLAKE3 produce 32 bytes.
pub const HASH_OUTPUT_LENGTH: usize = 32;

// ---------------------------------------------------------------------------
// Ledger Accounts & State
// ---------------------------------------------------------------------------

/// Number of 32-byte state words each (account, token id) entry carries.
/// Every escrow record in the contracts crate must fit its slot layout
/// inside this many words. Eight matches what the verifiable-state circuits
/// commit to per account, and it is not negotiable from Rust.
pub const STATE_WORDS: usize = 8;

/// Size of one state word in bytes.
pub const STATE_WORD_LENGTH: usize = 32;

/// Decimals of the base currency. 1 TDM = 10^9 motes. Nine decimals keeps
/// sub-cent pricing exact without dragging in 128-bit balances.
pub const CURRENCY_DECIMALS: u32 = 9;

/// Motes per whole TDM. The only conversion factor anyone should use.
pub const MOTES_PER_TDM: u64 = 1_000_000_000;

// ---------------------------------------------------------------------------
// Transaction Limits
// ---------------------------------------------------------------------------

/// Maximum number of records in one authorization forest, counting every
/// nested child. Bounds validation work per transaction. The deepest
/// settlement bundle we produce (offer + bid + token approvals + payment
/// legs) is under a dozen records, so 64 is generous.
pub const MAX_UPDATES_PER_TX: usize = 64;

/// Maximum nesting depth of an authorization tree. Token approval wrapping
/// adds one level, cross-contract settlement adds two more. Eight covers
/// every shape the contracts crate produces, twice over.
pub const MAX_TREE_DEPTH: usize = 8;

/// Maximum memo field length in bytes. Enough for a short label, not enough
/// for your novel.
pub const MAX_MEMO_LENGTH: usize = 512;

// ---------------------------------------------------------------------------
// Fee Parameters
// ---------------------------------------------------------------------------

/// Minimum transaction fee in motes. Basically free, but enough to make
/// spamming the ledger a measurable hobby.
pub const MIN_TX_FEE_MOTES: u64 = 100;

/// Maximum fee cap. If a client computes a fee above this, the client is
/// broken, and we would rather reject than silently drain a wallet.
pub const MAX_TX_FEE_MOTES: u64 = 10_000_000;

// ---------------------------------------------------------------------------
// Submission & Retry
// ---------------------------------------------------------------------------

/// First pause before a transient rejection is retried.
pub const SUBMIT_BACKOFF_INITIAL: Duration = Duration::from_millis(500);

/// Backoff ceiling. Beyond this we keep retrying at a constant interval
/// rather than growing the wait forever.
pub const SUBMIT_BACKOFF_MAX: Duration = Duration::from_secs(8);

/// How many times a transient rejection is retried before the submission is
/// reported as failed. Retries always resubmit the identical signed bundle;
/// anything that changes the bundle is a new transaction, full stop.
pub const SUBMIT_MAX_ATTEMPTS: u32 = 6;

/// How long `wait_for_inclusion` polls before declaring a submission lost.
pub const INCLUSION_TIMEOUT: Duration = Duration::from_secs(120);

// ---------------------------------------------------------------------------
// Utility
// ---------------------------------------------------------------------------

/// Returns a friendly name for a chain id, mainly for logging.
/// Unknown chains get a hex dump because we're helpful like that.
pub fn chain_name(chain_id: u32) -> String {
    match chain_id {
        CHAIN_ID_LOCAL => "local".to_string(),
        CHAIN_ID_DEVNET => "devnet".to_string(),
        CHAIN_ID_LIGHTNET => "lightnet".to_string(),
        CHAIN_ID_ZEKO => "zeko".to_string(),
        other => format!("unknown(0x{:08X})", other),
    }
}

/// Format a mote amount as whole TDM with the fractional part trimmed to
/// what's actually there. `1_500_000_000` renders as `1.5 TDM`,
/// `42` renders as `0.000000042 TDM`.
pub fn format_motes(motes: u64) -> String {
    let whole = motes / MOTES_PER_TDM;
    let frac = motes % MOTES_PER_TDM;
    if frac == 0 {
        format!("{whole} TDM")
    } else {
        let frac_str = format!("{frac:09}");
        format!("{whole}.{} TDM", frac_str.trim_end_matches('0'))
    }
}
