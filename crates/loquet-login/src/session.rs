//! Authenticated sessions.
//!
//! A [`Session`] is what every successful login — full password or PIN —
//! hands back: the caller's proof that the master key was recovered and
//! the account's secrets are usable. PIN login produces a session
//! indistinguishable from a full-password one.

use loquet_crypto_core::stretch::stretch;
use loquet_crypto_core::{SecretBuffer, SecretKey};

use crate::directory::{AccountNumber, LoginDirectory};
use crate::error::LoginError;
use crate::package::{CarePackage, LoginPackage};
use crate::server::OwnerCredentials;

/// Master key length in bytes (256 bits).
pub const MASTER_KEY_LEN: usize = 32;

/// Sync key length in bytes.
pub const SYNC_KEY_LEN: usize = 32;

/// An authenticated session for one account.
pub struct Session {
    /// Normalized username.
    pub username: String,
    /// Local account directory number.
    pub account: AccountNumber,
    /// The account's primary symmetric key.
    pub master_key: SecretKey<MASTER_KEY_LEN>,
    /// Key for the account's synchronized data.
    pub sync_key: SecretBuffer,
    /// Server credentials of the account owner.
    pub credentials: OwnerCredentials,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Session(***)")
    }
}

/// Provision a fresh account with random keys.
///
/// Mirrors what a completed full-password login leaves behind: the
/// account directory, the care package, the login package, and a live
/// session. The full master-login protocol itself lives elsewhere; this
/// is the local half that PIN operations build on.
///
/// # Errors
///
/// Returns [`LoginError::Crypto`] if key generation fails or
/// [`LoginError::Storage`] if the account files cannot be written.
pub fn establish_account(
    dir: &LoginDirectory,
    username: &str,
    care: &CarePackage,
) -> Result<Session, LoginError> {
    let master_key = SecretKey::<MASTER_KEY_LEN>::random()?;
    let sync_key = SecretBuffer::random(SYNC_KEY_LEN)?;
    establish_account_with_keys(dir, username, care, master_key, sync_key)
}

/// Provision a fresh account with caller-supplied keys.
///
/// Used by callers that already negotiated key material — and by test
/// fixtures that need a known master key.
///
/// # Errors
///
/// Same as [`establish_account`].
pub fn establish_account_with_keys(
    dir: &LoginDirectory,
    username: &str,
    care: &CarePackage,
    master_key: SecretKey<MASTER_KEY_LEN>,
    sync_key: SecretBuffer,
) -> Result<Session, LoginError> {
    let username = LoginDirectory::normalize_username(username)?;
    let account = dir.create_account(&username)?;

    care.save(dir, account)?;

    let password_proof = SecretBuffer::random(32)?;
    let login_package = LoginPackage::create(
        master_key.expose(),
        sync_key.expose(),
        password_proof.expose(),
    )?;
    login_package.save(dir, account)?;

    let auth_id = stretch(username.as_bytes(), &care.auth_recipe)?;

    Ok(Session {
        username,
        account,
        master_key,
        sync_key,
        credentials: OwnerCredentials {
            auth_id,
            password_proof,
        },
    })
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
