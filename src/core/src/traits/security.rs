//! Signing and verification seams
//!
//! Managers never hold key material directly; they call an injected signer
//! and verifier. The signer is serializable but not assumed reentrant; the
//! verifier must be pure.

use crate::error::Result;

/// Produces hex-encoded signatures over arbitrary bytes.
///
/// May block (the backing key can live behind a remote signing service), so
/// callers must not hold manager locks across a call.
pub trait Signer: Send + Sync {
    /// Sign the given bytes, returning the signature as lowercase hex
    fn sign(&self, data: &[u8]) -> Result<String>;

    /// Identifier of the signing node
    fn signer_id(&self) -> &str;
}

/// Verifies hex-encoded signatures against a signer's known public key.
pub trait Verifier: Send + Sync {
    /// Returns true iff `signature` is a valid signature by `signer_id`
    /// over `data`
    fn verify(&self, signer_id: &str, data: &[u8], signature: &str) -> bool;
}
