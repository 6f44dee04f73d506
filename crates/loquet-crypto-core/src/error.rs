//! Cryptographic error types for `loquet-crypto-core`.

use thiserror::Error;

/// Errors produced by cryptographic operations.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Key stretching failed (bad recipe parameters, memory allocation).
    #[error("key stretch failed: {0}")]
    KeyStretch(String),

    /// Symmetric encryption failure (AES-256-GCM).
    #[error("encryption error: {0}")]
    Encryption(String),

    /// Authentication tag verification failed — ciphertext tampered or wrong key.
    #[error("decryption failed: authentication tag mismatch")]
    Decryption,

    /// Invalid key material (wrong length, corrupted bytes).
    #[error("invalid key material: {0}")]
    InvalidKeyMaterial(String),

    /// Secure memory allocation failure (mlock, CSPRNG).
    #[error("secure memory error: {0}")]
    SecureMemory(String),
}
