//! The credential service boundary.
//!
//! The remote authority stores, per `(account, device id)`, a sealed PIN
//! key plus an expiration time, and serves it back to whoever presents
//! the matching device id and PIN-derived auth token. Transport is out of
//! scope here — the engine only needs the trait and its outcome set.
//!
//! [`MemoryCredentialService`] is the in-process implementation used by
//! the test suites and by harness code; it enforces the same contract a
//! production service would (owner authentication on writes, token proof
//! and expiry on reads).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use loquet_crypto_core::sealed::SealedBox;
use loquet_crypto_core::SecretBuffer;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Server credentials of the account owner, derived during full-password
/// login. Opaque to the PIN engine — they authenticate uploads, nothing
/// else.
pub struct OwnerCredentials {
    /// Public-ish account lookup key (derived from the username alone).
    pub auth_id: SecretBuffer,
    /// Proof of password knowledge (never derivable from a PIN).
    pub password_proof: SecretBuffer,
}

impl std::fmt::Debug for OwnerCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("OwnerCredentials(***)")
    }
}

/// Outcomes of credential service calls, as seen by the engine.
#[derive(Debug, Error)]
pub enum ServerError {
    /// No record for this device id.
    #[error("no PIN record for this device")]
    NotFound,

    /// The record exists but is past its expiry or has been revoked.
    /// The server is authoritative here — it may say this before the
    /// client's own clock agrees.
    #[error("PIN record expired or revoked")]
    Expired,

    /// The presented PIN auth token does not prove PIN knowledge for
    /// this record.
    #[error("PIN auth token rejected")]
    BadPinToken,

    /// The caller's owner credentials do not authenticate the write.
    #[error("owner credentials rejected: {0}")]
    Rejected(String),

    /// Transport or service failure; nothing can be concluded about the
    /// record.
    #[error("credential service unavailable: {0}")]
    Unavailable(String),
}

/// The remote authority holding the server half of every PIN setup.
pub trait CredentialService {
    /// Create or replace the PIN record for `(account, device_id)`.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Rejected`] if the owner credentials do not
    /// authenticate, or [`ServerError::Unavailable`] on service failure.
    fn upload_pin_package(
        &self,
        owner: &OwnerCredentials,
        device_id: &[u8],
        pin_auth_token: &[u8],
        wrapped_pin_key: &SealedBox,
        expires_at: i64,
    ) -> Result<(), ServerError>;

    /// Fetch the sealed PIN key for `(device_id, pin_auth_token)`.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::NotFound`], [`ServerError::Expired`],
    /// [`ServerError::BadPinToken`], or [`ServerError::Unavailable`] per
    /// their documented meanings.
    fn fetch_pin_package(
        &self,
        device_id: &[u8],
        pin_auth_token: &[u8],
    ) -> Result<SealedBox, ServerError>;
}

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

struct PinRecord {
    pin_auth_token: Vec<u8>,
    wrapped_pin_key: SealedBox,
    expires_at: i64,
    revoked: bool,
}

/// In-process credential service.
///
/// Enforces the full contract: registered-owner authentication on
/// uploads, token proof and expiry on fetches. `revoke` and
/// `set_offline` exist so suites can drive the administrative and
/// transport-failure paths.
#[derive(Default)]
pub struct MemoryCredentialService {
    owners: Mutex<Vec<(Vec<u8>, Vec<u8>)>>,
    records: Mutex<HashMap<Vec<u8>, PinRecord>>,
    offline: AtomicBool,
}

impl MemoryCredentialService {
    /// Create an empty service with no registered owners.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an account owner so its uploads authenticate.
    pub fn register_owner(&self, owner: &OwnerCredentials) {
        self.lock_owners().push((
            owner.auth_id.expose().to_vec(),
            owner.password_proof.expose().to_vec(),
        ));
    }

    /// Administratively revoke the record for a device id. Subsequent
    /// fetches report [`ServerError::Expired`].
    pub fn revoke(&self, device_id: &[u8]) {
        if let Some(record) = self.lock_records().get_mut(device_id) {
            record.revoked = true;
        }
    }

    /// Simulate a transport outage: while offline, every call returns
    /// [`ServerError::Unavailable`].
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Whether a record exists for this device id (ignores expiry).
    #[must_use]
    pub fn has_record(&self, device_id: &[u8]) -> bool {
        self.lock_records().contains_key(device_id)
    }

    fn lock_owners(&self) -> std::sync::MutexGuard<'_, Vec<(Vec<u8>, Vec<u8>)>> {
        self.owners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_records(&self) -> std::sync::MutexGuard<'_, HashMap<Vec<u8>, PinRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CredentialService for MemoryCredentialService {
    fn upload_pin_package(
        &self,
        owner: &OwnerCredentials,
        device_id: &[u8],
        pin_auth_token: &[u8],
        wrapped_pin_key: &SealedBox,
        expires_at: i64,
    ) -> Result<(), ServerError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(ServerError::Unavailable("service offline".into()));
        }

        let authenticated = self.lock_owners().iter().any(|(auth_id, proof)| {
            auth_id == owner.auth_id.expose() && proof == owner.password_proof.expose()
        });
        if !authenticated {
            return Err(ServerError::Rejected("unknown account owner".into()));
        }

        self.lock_records().insert(
            device_id.to_vec(),
            PinRecord {
                pin_auth_token: pin_auth_token.to_vec(),
                wrapped_pin_key: wrapped_pin_key.clone(),
                expires_at,
                revoked: false,
            },
        );
        Ok(())
    }

    fn fetch_pin_package(
        &self,
        device_id: &[u8],
        pin_auth_token: &[u8],
    ) -> Result<SealedBox, ServerError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(ServerError::Unavailable("service offline".into()));
        }

        let records = self.lock_records();
        let record = records.get(device_id).ok_or(ServerError::NotFound)?;

        if record.revoked || record.expires_at <= now_epoch_secs() {
            return Err(ServerError::Expired);
        }
        if record.pin_auth_token != pin_auth_token {
            return Err(ServerError::BadPinToken);
        }

        Ok(record.wrapped_pin_key.clone())
    }
}

fn now_epoch_secs() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
