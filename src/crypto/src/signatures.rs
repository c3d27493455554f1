//! Signer and verifier implementations over node keypairs
//!
//! `KeypairSigner` adapts a local keypair to the core `Signer` seam.
//! `Ed25519Verifier` resolves signer ids through a shared `KeyDirectory`,
//! so verification works for any peer whose public key has been learned
//! through admission.

use std::sync::Arc;

use dashmap::DashMap;
use ed25519_dalek::{Signature, Verifier as DalekVerifier, VerifyingKey};
use tracing::debug;

use daan_core::traits::{Signer, Verifier};

use crate::error::{CryptoError, Result};
use crate::keys::NodeKeypair;

/// Shared registry mapping node ids to Ed25519 public keys.
///
/// Admission inserts a key when a node joins; verification looks it up.
#[derive(Clone, Default)]
pub struct KeyDirectory {
    keys: Arc<DashMap<String, VerifyingKey>>,
}

impl KeyDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node's public key from its compressed bytes
    pub fn insert(&self, node_id: &str, public_key: &[u8]) -> Result<()> {
        let bytes: [u8; 32] = public_key
            .try_into()
            .map_err(|_| CryptoError::InvalidKey(format!("public key must be 32 bytes, got {}", public_key.len())))?;
        let key = VerifyingKey::from_bytes(&bytes)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        self.keys.insert(node_id.to_string(), key);
        Ok(())
    }

    /// Register a node's public key from lowercase hex
    pub fn insert_hex(&self, node_id: &str, public_key_hex: &str) -> Result<()> {
        let bytes = hex::decode(public_key_hex)?;
        self.insert(node_id, &bytes)
    }

    /// Look up a node's verifying key
    pub fn get(&self, node_id: &str) -> Option<VerifyingKey> {
        self.keys.get(node_id).map(|entry| *entry.value())
    }

    /// Number of known keys
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Verify a hex signature against a hex-encoded public key carried inline
/// (invitations and genesis records embed the key they were signed with)
pub fn verify_with_key_hex(public_key_hex: &str, data: &[u8], signature_hex: &str) -> bool {
    let Ok(key_bytes) = hex::decode(public_key_hex) else {
        return false;
    };
    let Ok(key_array) = <[u8; 32]>::try_from(key_bytes.as_slice()) else {
        return false;
    };
    let Ok(key) = VerifyingKey::from_bytes(&key_array) else {
        return false;
    };
    let Ok(sig_bytes) = hex::decode(signature_hex) else {
        return false;
    };
    let Ok(sig) = Signature::from_slice(&sig_bytes) else {
        return false;
    };
    key.verify(data, &sig).is_ok()
}

/// `Signer` backed by a local node keypair.
pub struct KeypairSigner {
    keypair: Arc<NodeKeypair>,
    node_id: String,
}

impl KeypairSigner {
    pub fn new(keypair: Arc<NodeKeypair>) -> Self {
        let node_id = keypair.node_id();
        Self { keypair, node_id }
    }
}

impl Signer for KeypairSigner {
    fn sign(&self, data: &[u8]) -> daan_core::Result<String> {
        Ok(self.keypair.sign_hex(data))
    }

    fn signer_id(&self) -> &str {
        &self.node_id
    }
}

/// `Verifier` resolving signer ids through a `KeyDirectory`.
#[derive(Clone)]
pub struct Ed25519Verifier {
    directory: KeyDirectory,
}

impl Ed25519Verifier {
    pub fn new(directory: KeyDirectory) -> Self {
        Self { directory }
    }
}

impl Verifier for Ed25519Verifier {
    fn verify(&self, signer_id: &str, data: &[u8], signature: &str) -> bool {
        let Some(key) = self.directory.get(signer_id) else {
            debug!(signer_id, "Unknown signer");
            return false;
        };
        let Ok(sig_bytes) = hex::decode(signature) else {
            return false;
        };
        let Ok(sig) = Signature::from_slice(&sig_bytes) else {
            return false;
        };
        key.verify(data, &sig).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_and_verify() {
        let keypair = Arc::new(NodeKeypair::generate());
        let directory = KeyDirectory::new();
        directory
            .insert(&keypair.node_id(), &keypair.public_key_bytes())
            .unwrap();

        let signer = KeypairSigner::new(keypair.clone());
        let verifier = Ed25519Verifier::new(directory);

        let message = b"join request";
        let signature = signer.sign(message).unwrap();

        assert!(verifier.verify(&keypair.node_id(), message, &signature));
        assert!(!verifier.verify(&keypair.node_id(), b"other message", &signature));
    }

    #[test]
    fn test_unknown_signer_rejected() {
        let verifier = Ed25519Verifier::new(KeyDirectory::new());
        assert!(!verifier.verify("deadbeef", b"data", "00"));
    }

    #[test]
    fn test_malformed_signature_rejected() {
        let keypair = Arc::new(NodeKeypair::generate());
        let directory = KeyDirectory::new();
        directory
            .insert(&keypair.node_id(), &keypair.public_key_bytes())
            .unwrap();
        let verifier = Ed25519Verifier::new(directory);

        assert!(!verifier.verify(&keypair.node_id(), b"data", "not-hex"));
        assert!(!verifier.verify(&keypair.node_id(), b"data", "0011"));
    }
}
