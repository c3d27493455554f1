//! Node keypair generation, derivation, and on-disk persistence

use std::path::Path;

use ed25519_dalek::{Signer as DalekSigner, SigningKey, VerifyingKey};
use rand::RngCore;
use tracing::info;

use crate::error::{CryptoError, Result};
use crate::hash::sha256;

/// Length of a node id in hex characters (16 bytes of digest)
pub const NODE_ID_HEX_LEN: usize = 32;

/// Derive a node id from a public key: first 16 bytes of SHA-256 over the
/// compressed key bytes, lowercase hex
pub fn node_id_from_public_key(public_key: &[u8]) -> String {
    let digest = sha256(public_key);
    hex::encode(&digest[..16])
}

/// A node's Ed25519 identity keypair
pub struct NodeKeypair {
    signing_key: SigningKey,
}

impl NodeKeypair {
    /// Generate a fresh keypair from the OS RNG
    pub fn generate() -> Self {
        let mut csprng = rand::rngs::OsRng;
        let mut seed = [0u8; 32];
        csprng.fill_bytes(&mut seed);
        Self {
            signing_key: SigningKey::from_bytes(&seed),
        }
    }

    /// Reconstruct a keypair from the 32-byte secret seed
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self> {
        let seed: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidKey(format!("secret must be 32 bytes, got {}", bytes.len())))?;
        Ok(Self {
            signing_key: SigningKey::from_bytes(&seed),
        })
    }

    /// Load a keypair from a hex key file, generating and saving one if the
    /// file does not exist
    pub fn load_or_generate(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            let bytes = hex::decode(contents.trim())?;
            Self::from_secret_bytes(&bytes)
        } else {
            let keypair = Self::generate();
            keypair.save(path)?;
            info!(path = %path.display(), node_id = %keypair.node_id(), "Generated new node keypair");
            Ok(keypair)
        }
    }

    /// Persist the secret seed as lowercase hex
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, hex::encode(self.signing_key.to_bytes()))?;
        Ok(())
    }

    /// The public verifying key
    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// Public key as compressed bytes
    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    /// Public key as lowercase hex
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key_bytes())
    }

    /// Node id derived from the public key
    pub fn node_id(&self) -> String {
        node_id_from_public_key(&self.public_key_bytes())
    }

    /// Sign arbitrary bytes, returning the signature as lowercase hex
    pub fn sign_hex(&self, data: &[u8]) -> String {
        hex::encode(self.signing_key.sign(data).to_bytes())
    }
}

impl std::fmt::Debug for NodeKeypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeKeypair")
            .field("node_id", &self.node_id())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_derivation() {
        let keypair = NodeKeypair::generate();
        let id = keypair.node_id();
        assert_eq!(id.len(), NODE_ID_HEX_LEN);
        assert_eq!(id, node_id_from_public_key(&keypair.public_key_bytes()));
    }

    #[test]
    fn test_node_id_is_stable() {
        let keypair = NodeKeypair::generate();
        let restored = NodeKeypair::from_secret_bytes(&keypair.signing_key.to_bytes()).unwrap();
        assert_eq!(keypair.node_id(), restored.node_id());
    }

    #[test]
    fn test_load_or_generate_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node_key.hex");

        let first = NodeKeypair::load_or_generate(&path).unwrap();
        assert!(path.exists());

        let second = NodeKeypair::load_or_generate(&path).unwrap();
        assert_eq!(first.node_id(), second.node_id());
        assert_eq!(first.public_key_hex(), second.public_key_hex());
    }

    #[test]
    fn test_invalid_secret_rejected() {
        let result = NodeKeypair::from_secret_bytes(&[0u8; 16]);
        assert!(matches!(result, Err(CryptoError::InvalidKey(_))));
    }
}
