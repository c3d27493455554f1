//! Error types for the crypto subsystem

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CryptoError>;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Invalid key material: {0}")]
    InvalidKey(String),

    #[error("Invalid hex encoding: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    #[error("Signature verification failed")]
    SignatureVerificationFailed,

    #[error("Signing failed: {0}")]
    SigningFailed(String),

    #[error("Key file error: {0}")]
    KeyFile(#[from] std::io::Error),
}
