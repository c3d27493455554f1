//! Cryptographic identity for DAAN nodes
//!
//! Each node owns one Ed25519 keypair. The node id is derived from the
//! public key (first 16 bytes of its SHA-256 digest, lowercase hex), so ids
//! are stable, self-certifying, and cheap to re-derive for verification.

pub mod error;
pub mod hash;
pub mod keys;
pub mod signatures;

pub use error::{CryptoError, Result};
pub use hash::sha256_hex;
pub use keys::{node_id_from_public_key, NodeKeypair};
pub use signatures::{verify_with_key_hex, Ed25519Verifier, KeyDirectory, KeypairSigner};
