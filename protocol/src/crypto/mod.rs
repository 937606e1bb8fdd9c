//! # Cryptographic Primitives for Tandem
//!
//! Every signing operation and every hash in the protocol flows through here.
//!
//! We deliberately chose boring, well-audited cryptography:
//!
//! - **Ed25519** for signatures. Fast, deterministic, and nobody has broken it.
//! - **BLAKE3** for hashing. Because we live in the future.
//! - **SHA-256** for transaction ids. Because the rest of the world doesn't.
//!
//! ## A note on "rolling your own crypto"
//!
//! We don't. Everything here is a thin, type-safe wrapper around audited
//! implementations. If you're tempted to optimize these functions, please
//! reconsider. Then reconsider again. Then go read about timing attacks
//! and come back when you've lost the urge.

pub mod hash;
pub mod keys;

// Re-export the things people actually need so they don't have to memorize
// our module hierarchy. Life's too short for five levels of `use` statements.
pub use hash::{
    blake3_hash, blake3_hash_multi, domain_separated_hash, double_sha256, merkle_root, sha256,
};
pub use keys::{Keypair, PublicKey, Signature};
