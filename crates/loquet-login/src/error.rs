//! Login error types for `loquet-login`.
//!
//! The PIN operations surface error *kinds*, not message text — callers
//! choose corrective action by kind: fall back to the full password
//! (`NotSetUp`), retry the PIN (`InvalidPin`), or wait (`RemoteUnavailable`).

use loquet_crypto_core::CryptoError;
use thiserror::Error;

/// Errors produced by login operations.
#[derive(Debug, Error)]
pub enum LoginError {
    /// No usable PIN package on this device. Covers both a genuinely
    /// absent package and a corrupt one — either way PIN login is not
    /// available here.
    #[error("PIN login is not set up on this device")]
    NotSetUp,

    /// The PIN package has expired — authoritatively (server) or by the
    /// local expiry timestamp. The local package is removed when a login
    /// attempt hits this.
    #[error("PIN login has expired")]
    PinExpired,

    /// Authentication failed on a PIN-derived ciphertext — wrong PIN or
    /// tampered package. The local package is left in place; it may still
    /// be valid for the correct PIN.
    #[error("invalid PIN")]
    InvalidPin,

    /// The credential service could not answer. Distinct from `NotSetUp`:
    /// the package may still be perfectly valid.
    #[error("credential service unavailable: {0}")]
    RemoteUnavailable(String),

    /// The username does not resolve to a local account directory.
    #[error("no local account for user: {0}")]
    AccountNotFound(String),

    /// Local disk failure during load/save/delete.
    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),

    /// Structural failure in a non-PIN package (care or login package),
    /// which must exist and parse for any account on this device.
    #[error("package error: {0}")]
    Package(String),

    /// Cryptographic operation failed (delegated from the crypto core).
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}
