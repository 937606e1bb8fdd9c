//! # Hashing Utilities
//!
//! Cryptographic hash functions used throughout Tandem. We support two
//! primary hash functions and refuse to support more without a very good
//! reason:
//!
//! - **BLAKE3**. Our default. Fast on every platform, parallelizable, and
//!   provably secure under standard assumptions. Used for account and token
//!   derivation, authorization-tree commitments, and the ledger state root.
//!
//! - **SHA-256**. Used in `double_sha256` for transaction ids, so a Tandem
//!   transaction hash looks and behaves like a transaction hash anywhere
//!   else. Compatibility, not security, is the reason it exists here.
//!
//! When building Tandem-native data structures, always prefer BLAKE3 with a
//! domain-separation context. When producing an id an external system will
//! store, use `double_sha256`.

use sha2::{Digest, Sha256};

/// Compute the SHA-256 hash of the input data.
///
/// Returns a 32-byte digest. Used primarily as the inner half of
/// `double_sha256`. For Tandem-internal hashing, prefer [`blake3_hash`].
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut output = [0u8; 32];
    output.copy_from_slice(&result);
    output
}

/// Compute the double-SHA-256 hash: `SHA-256(SHA-256(data))`.
///
/// This construction is what most ledgers use for transaction ids, and we
/// keep it for exactly that: a Tandem transaction id can be pasted into any
/// tooling that expects a 32-byte double-SHA digest. The double hash also
/// closes the length-extension hole SHA-256 has on its own, though for an
/// id that hole never mattered much.
///
/// # Example
///
/// ```
/// use tandem_protocol::crypto::double_sha256;
///
/// let tx_id = double_sha256(b"raw transaction bytes");
/// assert_eq!(tx_id.len(), 32);
/// ```
pub fn double_sha256(data: &[u8]) -> [u8; 32] {
    sha256(&sha256(data))
}

/// Compute the BLAKE3 hash of the input data.
///
/// The workhorse hash function of Tandem. Uses the `blake3` crate, which
/// automatically takes advantage of SIMD instructions on supported
/// platforms. For typical update-tree payloads (well under 1 KiB) the
/// single-threaded path is what runs, and it's still ~5x faster than
/// SHA-256.
///
/// # Example
///
/// ```
/// use tandem_protocol::crypto::blake3_hash;
///
/// let hash = blake3_hash(b"tandem protocol");
/// assert_eq!(hash.len(), 32);
/// ```
pub fn blake3_hash(data: &[u8]) -> [u8; 32] {
    *blake3::hash(data).as_bytes()
}

/// Compute a domain-separated hash using BLAKE3 with a context string.
///
/// Domain separation prevents hash collisions across protocol contexts:
/// `domain_separated_hash("tandem.token.v1", data)` and
/// `domain_separated_hash("tandem.update.v1", data)` can never collide even
/// for identical `data`, because the context derives a different internal IV.
///
/// This uses BLAKE3's built-in `derive_key` mode, which is the proper way to
/// do domain separation with BLAKE3. Don't try to prepend a tag manually;
/// that's what amateurs do.
pub fn domain_separated_hash(context: &str, data: &[u8]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new_derive_key(context);
    hasher.update(data);
    *hasher.finalize().as_bytes()
}

/// Hash multiple byte slices together without concatenation overhead.
///
/// Instead of allocating a buffer to concatenate inputs, we feed them
/// sequentially into the hasher. Same result, less allocation. Used for
/// composite structures like `(account || token || delta)` in the tree
/// commitment code.
pub fn blake3_hash_multi(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    for part in parts {
        hasher.update(part);
    }
    *hasher.finalize().as_bytes()
}

/// Compute a Merkle root from a list of leaf hashes using BLAKE3.
///
/// A simple binary Merkle tree, used for the ledger state root. If the
/// number of leaves is odd, the last leaf is duplicated (the Bitcoin
/// approach; the known duplicate-leaf pitfall doesn't apply because the
/// ledger hashes each (account, token) entry exactly once).
///
/// Returns the 32-byte root hash. An empty input returns all zeros, the
/// "empty ledger" sentinel.
pub fn merkle_root(leaves: &[[u8; 32]]) -> [u8; 32] {
    if leaves.is_empty() {
        return [0u8; 32];
    }

    let mut current_level: Vec<[u8; 32]> = leaves.to_vec();

    // A single leaf is paired with itself so the root is always the output
    // of a hash operation, never a raw leaf.
    if current_level.len() == 1 {
        return blake3_hash_multi(&[current_level[0].as_slice(), current_level[0].as_slice()]);
    }

    while current_level.len() > 1 {
        let mut next_level = Vec::with_capacity((current_level.len() + 1) / 2);

        for chunk in current_level.chunks(2) {
            let left = &chunk[0];
            let right = if chunk.len() == 2 { &chunk[1] } else { &chunk[0] };
            let parent = blake3_hash_multi(&[left.as_slice(), right.as_slice()]);
            next_level.push(parent);
        }

        current_level = next_level;
    }

    current_level[0]
}
