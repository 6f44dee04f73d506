//! PIN-based re-login.
//!
//! A user who has already logged in with the full password can bind a
//! short PIN to this device. The construction double-wraps a random
//! "PIN key":
//!
//! ```text
//! master key ── sealed under PIN key ──► PinPackage.json   (this device)
//! PIN key ── sealed under local_key ──► credential service (per device id)
//! ```
//!
//! Neither half is useful alone. The server half is fetched with an
//! `auth_token` that proves PIN knowledge but decrypts nothing; the
//! `local_key` that decrypts it never leaves the device. A network
//! transcript cannot decrypt, and a stolen disk cannot authenticate.
//! The server independently expires or revokes its half, which is what
//! makes a lost device's PIN capability killable from the outside.
//!
//! Operations are synchronous and touch disk at most once and the
//! service at most once. Same-account calls are not safe to run
//! concurrently; callers keep one logical current user per process.

use data_encoding::BASE64;
use loquet_crypto_core::stretch::stretch;
use loquet_crypto_core::{sealed, CryptoError, SecretBuffer, SecretKey};
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroize;

use crate::directory::LoginDirectory;
use crate::error::LoginError;
use crate::package::{CarePackage, LoginPackage, PinLocalPackage, DEVICE_ID_LEN};
use crate::server::{CredentialService, OwnerCredentials, ServerError};
use crate::session::{Session, MASTER_KEY_LEN};

/// PIN key length in bytes (256 bits).
pub const PIN_KEY_LEN: usize = 32;

// ---------------------------------------------------------------------------
// Key derivation
// ---------------------------------------------------------------------------

/// The two PIN-derived keys, each with a single, fixed role.
struct PinKeys {
    /// Sent to the credential service as capability proof. Never
    /// decrypts anything.
    auth_token: SecretBuffer,
    /// Decrypts the server-delivered half. Never transmitted.
    local_key: SecretBuffer,
}

/// Stretch `username || PIN` under both account recipes.
///
/// The input is the exact concatenation with no separator — this
/// construction is a cross-version compatibility contract with the
/// credential service and must not change.
fn derive_pin_keys(username: &str, pin: &str, care: &CarePackage) -> Result<PinKeys, LoginError> {
    let mut pin_input = Vec::with_capacity(username.len().saturating_add(pin.len()));
    pin_input.extend_from_slice(username.as_bytes());
    pin_input.extend_from_slice(pin.as_bytes());

    let auth = stretch(&pin_input, &care.auth_recipe);
    let local = stretch(&pin_input, &care.local_recipe);
    pin_input.zeroize();

    Ok(PinKeys {
        auth_token: auth?,
        local_key: local?,
    })
}

// ---------------------------------------------------------------------------
// Setup
// ---------------------------------------------------------------------------

/// Set up PIN login for the session's account on this device.
///
/// Requires a live authenticated session — the master key and owner
/// credentials come from it. Creates both halves of the double wrap and
/// persists the local one *before* uploading the server one: a local
/// package whose server record never landed just fails a later login
/// with "not set up", and re-running setup heals either half. No
/// two-phase commit is needed.
///
/// # Errors
///
/// - [`LoginError::Package`] if the account's care package is unusable
/// - [`LoginError::Storage`] if the local package cannot be written
/// - [`LoginError::RemoteUnavailable`] if the upload fails (the local
///   package is left in place; retry by re-running setup)
pub fn pin_setup(
    dir: &LoginDirectory,
    server: &dyn CredentialService,
    session: &Session,
    pin: &str,
    expires_at: i64,
) -> Result<(), LoginError> {
    let care = CarePackage::load(dir, session.account)?;
    let keys = derive_pin_keys(&session.username, pin, &care)?;

    // The pivot linking the two halves.
    let pin_key = SecretKey::<PIN_KEY_LEN>::random()?;
    let wrapped_master_key = sealed::seal(session.master_key.expose(), pin_key.expose())?;
    let server_half = sealed::seal(pin_key.expose(), keys.local_key.expose())?;

    // Fresh random device binding, independent of the PIN key.
    let mut device_id = [0u8; DEVICE_ID_LEN];
    OsRng.fill_bytes(&mut device_id);

    let package = PinLocalPackage {
        wrapped_master_key,
        device_id: BASE64.encode(&device_id),
        expires_at,
    };
    package.save(dir, session.account)?;

    server
        .upload_pin_package(
            &session.credentials,
            &device_id,
            keys.auth_token.expose(),
            &server_half,
            expires_at,
        )
        .map_err(|e| match e {
            ServerError::Unavailable(msg) | ServerError::Rejected(msg) => {
                LoginError::RemoteUnavailable(msg)
            }
            other => LoginError::RemoteUnavailable(other.to_string()),
        })?;

    Ok(())
}

// ---------------------------------------------------------------------------
// Login
// ---------------------------------------------------------------------------

/// Log in with a PIN, returning a session equivalent to a full-password
/// login.
///
/// Expiry is checked twice, and both checks are load-bearing: the local
/// timestamp short-circuits an obviously stale package without a round
/// trip (works fully offline), while the server remains authoritative
/// and may refuse earlier (administrative revocation). Either expiry
/// outcome deletes the local package, so the next existence check
/// answers "unavailable" from disk alone. No other failure deletes
/// anything — a wrong PIN leaves a perfectly good package behind.
///
/// # Errors
///
/// - [`LoginError::NotSetUp`] — no usable local package, or the server
///   has no record for this device
/// - [`LoginError::PinExpired`] — expired locally or server-side (the
///   local package is removed as a side effect)
/// - [`LoginError::InvalidPin`] — the PIN does not authenticate
/// - [`LoginError::RemoteUnavailable`] — the service could not answer;
///   nothing is concluded and nothing is deleted
pub fn pin_login(
    dir: &LoginDirectory,
    server: &dyn CredentialService,
    username: &str,
    pin: &str,
) -> Result<Session, LoginError> {
    let username =
        LoginDirectory::normalize_username(username).map_err(|_| LoginError::NotSetUp)?;
    let account = dir.account_number(&username).map_err(|_| LoginError::NotSetUp)?;

    let local = PinLocalPackage::load(dir, account)?;

    // Offline short-circuit: past its own expiry the package can never
    // work again, with or without the server's opinion. Cleanup is
    // best-effort — the caller gets the expiry either way.
    if local.expires_at <= now_epoch_secs() {
        let _ = PinLocalPackage::delete(dir, account);
        return Err(LoginError::PinExpired);
    }

    let care = CarePackage::load(dir, account)?;
    let login_package = LoginPackage::load(dir, account)?;

    let keys = derive_pin_keys(&username, pin, &care)?;
    let device_id = local.device_id_bytes()?;

    let server_half = match server.fetch_pin_package(&device_id, keys.auth_token.expose()) {
        Ok(sealed_box) => sealed_box,
        Err(ServerError::Expired) => {
            // The server is authoritative: its half is gone for good, so
            // the local half is dead weight. Self-heal, best-effort.
            let _ = PinLocalPackage::delete(dir, account);
            return Err(LoginError::PinExpired);
        }
        Err(ServerError::NotFound) => return Err(LoginError::NotSetUp),
        Err(ServerError::BadPinToken) => return Err(LoginError::InvalidPin),
        Err(e @ (ServerError::Unavailable(_) | ServerError::Rejected(_))) => {
            return Err(LoginError::RemoteUnavailable(e.to_string()));
        }
    };

    let pin_key =
        sealed::open(&server_half, keys.local_key.expose()).map_err(auth_failure_means_bad_pin)?;
    let master_key_buf = sealed::open(&local.wrapped_master_key, pin_key.expose())
        .map_err(auth_failure_means_bad_pin)?;
    let master_key = SecretKey::<MASTER_KEY_LEN>::from_slice(master_key_buf.expose())?;

    let sync_key = login_package.sync_key(master_key.expose())?;
    let password_proof = login_package.password_proof(master_key.expose())?;
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

/// A tag mismatch on either half of the double wrap means the PIN did
/// not authenticate; anything else is a real crypto failure.
fn auth_failure_means_bad_pin(e: CryptoError) -> LoginError {
    match e {
        CryptoError::Decryption => LoginError::InvalidPin,
        other => LoginError::Crypto(other),
    }
}

// ---------------------------------------------------------------------------
// Existence check / deletion
// ---------------------------------------------------------------------------

/// Whether this device can offer PIN login for the user.
///
/// Defined as "the local package loads": absent and corrupt both answer
/// `false`. Pure local read — no network, no side effects, no errors.
#[must_use]
pub fn pin_login_available(dir: &LoginDirectory, username: &str) -> bool {
    let Ok(username) = LoginDirectory::normalize_username(username) else {
        return false;
    };
    let Ok(account) = dir.account_number(&username) else {
        return false;
    };
    PinLocalPackage::load(dir, account).is_ok()
}

/// Remove the local PIN package for the user. Idempotent.
///
/// Does not contact the credential service — server-side revocation is a
/// separate administrative operation.
///
/// # Errors
///
/// - [`LoginError::AccountNotFound`] if the username resolves to no
///   local account
/// - [`LoginError::Storage`] on disk failure other than absence
pub fn pin_delete(dir: &LoginDirectory, username: &str) -> Result<(), LoginError> {
    let username = LoginDirectory::normalize_username(username)?;
    let account = dir.account_number(&username)?;
    PinLocalPackage::delete(dir, account)
}

fn now_epoch_secs() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
}

// ---------------------------------------------------------------------------
// Unit tests — derivation chain
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use loquet_crypto_core::stretch::StretchRecipe;

    fn fast_care() -> CarePackage {
        CarePackage {
            auth_recipe: StretchRecipe::generate_scrypt(4, 2, 1).expect("generate"),
            local_recipe: StretchRecipe::generate_scrypt(4, 2, 1).expect("generate"),
        }
    }

    #[test]
    fn derive_is_deterministic() {
        let care = fast_care();
        let a = derive_pin_keys("alice", "1234", &care).expect("derive");
        let b = derive_pin_keys("alice", "1234", &care).expect("derive");
        assert_eq!(a.auth_token.expose(), b.auth_token.expose());
        assert_eq!(a.local_key.expose(), b.local_key.expose());
    }

    #[test]
    fn auth_token_and_local_key_are_independent() {
        let keys = derive_pin_keys("alice", "1234", &fast_care()).expect("derive");
        assert_ne!(keys.auth_token.expose(), keys.local_key.expose());
        assert_eq!(keys.auth_token.len(), 32);
        assert_eq!(keys.local_key.len(), 32);
    }

    #[test]
    fn different_usernames_same_pin_derive_different_keys() {
        let care = fast_care();
        let alice = derive_pin_keys("alice", "1234", &care).expect("derive");
        let bob = derive_pin_keys("bob", "1234", &care).expect("derive");
        assert_ne!(alice.auth_token.expose(), bob.auth_token.expose());
        assert_ne!(alice.local_key.expose(), bob.local_key.expose());
    }

    #[test]
    fn different_pins_derive_different_keys() {
        let care = fast_care();
        let a = derive_pin_keys("alice", "1234", &care).expect("derive");
        let b = derive_pin_keys("alice", "4321", &care).expect("derive");
        assert_ne!(a.auth_token.expose(), b.auth_token.expose());
        assert_ne!(a.local_key.expose(), b.local_key.expose());
    }

    #[test]
    fn input_is_bare_concatenation() {
        // "alic" + "e1234" and "alice" + "1234" concatenate identically,
        // so they must derive identically — pinning the no-separator
        // construction the credential service depends on.
        let care = fast_care();
        let a = derive_pin_keys("alice", "1234", &care).expect("derive");
        let b = derive_pin_keys("alic", "e1234", &care).expect("derive");
        assert_eq!(a.auth_token.expose(), b.auth_token.expose());
        assert_eq!(a.local_key.expose(), b.local_key.expose());
    }
}
