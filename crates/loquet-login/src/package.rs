//! Persisted package models for an account directory.
//!
//! Three files live beside each other per account:
//!
//! - `CarePackage.json` — the two stretch recipes, provisioned once at
//!   full-password login and immutable afterwards
//! - `LoginPackage.json` — account secrets wrapped under the master key
//! - `PinPackage.json` — the device-local half of PIN login; present
//!   exactly when PIN login is available on this device
//!
//! The PIN package is special: *any* failure to produce a valid value
//! from disk — missing file, malformed JSON, bad device-id encoding —
//! collapses into [`LoginError::NotSetUp`], because every one of those
//! states means the same thing to a caller: this device cannot PIN-login.
//! Unknown extra fields are tolerated on read for forward compatibility.

use data_encoding::BASE64;
use loquet_crypto_core::sealed::{self, SealedBox};
use loquet_crypto_core::stretch::StretchRecipe;
use loquet_crypto_core::SecretBuffer;
use serde::{Deserialize, Serialize};

use crate::directory::{AccountNumber, LoginDirectory};
use crate::error::LoginError;

/// File name of the PIN local package.
pub const PIN_PACKAGE_FILE: &str = "PinPackage.json";

/// File name of the care package.
const CARE_PACKAGE_FILE: &str = "CarePackage.json";

/// File name of the login package.
const LOGIN_PACKAGE_FILE: &str = "LoginPackage.json";

/// Device id length in bytes.
pub const DEVICE_ID_LEN: usize = 32;

// ---------------------------------------------------------------------------
// PIN local package
// ---------------------------------------------------------------------------

/// The device-local record produced by PIN setup and consumed by PIN login.
///
/// Existence of this file (meaning: it loads and parses) *is* the
/// "PIN login available" signal — there is no separate flag.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PinLocalPackage {
    /// The master key sealed under the random PIN key. Stored because at
    /// login time the caller holds neither the master key nor the PIN key.
    pub wrapped_master_key: SealedBox,
    /// Base64 of 32 random bytes generated at setup. A device-unique
    /// lookup secret for the credential service — not a hardware id.
    pub device_id: String,
    /// Seconds since epoch after which this package is invalid regardless
    /// of what the server says.
    pub expires_at: i64,
}

impl PinLocalPackage {
    /// Load and validate the PIN package for an account.
    ///
    /// # Errors
    ///
    /// Returns [`LoginError::NotSetUp`] for every absent-or-corrupt state;
    /// callers never need to distinguish them.
    pub fn load(dir: &LoginDirectory, account: AccountNumber) -> Result<Self, LoginError> {
        let contents = dir
            .load(account, PIN_PACKAGE_FILE)
            .map_err(|_| LoginError::NotSetUp)?;
        let package: Self =
            serde_json::from_str(&contents).map_err(|_| LoginError::NotSetUp)?;

        // A device id that cannot name a server record is as useless as no
        // package at all.
        let did = BASE64
            .decode(package.device_id.as_bytes())
            .map_err(|_| LoginError::NotSetUp)?;
        if did.len() != DEVICE_ID_LEN {
            return Err(LoginError::NotSetUp);
        }

        Ok(package)
    }

    /// Persist the package atomically.
    ///
    /// # Errors
    ///
    /// Returns [`LoginError::Storage`] on disk failure.
    pub fn save(&self, dir: &LoginDirectory, account: AccountNumber) -> Result<(), LoginError> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| LoginError::Package(format!("PIN package serialization failed: {e}")))?;
        dir.save(account, PIN_PACKAGE_FILE, &json)
    }

    /// Remove the package. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`LoginError::Storage`] on disk failure other than absence.
    pub fn delete(dir: &LoginDirectory, account: AccountNumber) -> Result<(), LoginError> {
        dir.delete(account, PIN_PACKAGE_FILE)
    }

    /// Decode the device id to raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`LoginError::NotSetUp`] if the encoding is invalid (a
    /// package that passed [`load`](Self::load) cannot hit this).
    pub fn device_id_bytes(&self) -> Result<Vec<u8>, LoginError> {
        BASE64
            .decode(self.device_id.as_bytes())
            .map_err(|_| LoginError::NotSetUp)
    }
}

// ---------------------------------------------------------------------------
// Care package
// ---------------------------------------------------------------------------

/// The account's two stretch recipes.
///
/// Recipe roles never mix: `auth_recipe` feeds values that are sent to
/// the credential service, `local_recipe` feeds values that never leave
/// the device. Both are applied to the same inputs; independence of the
/// derived keys comes from the recipes' independent salts.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CarePackage {
    /// Recipe behind server-bound capability proofs.
    pub auth_recipe: StretchRecipe,
    /// Recipe behind device-local decryption keys.
    pub local_recipe: StretchRecipe,
}

impl CarePackage {
    /// Generate a fresh pair of independent recipes at default cost.
    ///
    /// # Errors
    ///
    /// Returns [`LoginError::Crypto`] if the CSPRNG fails.
    pub fn generate() -> Result<Self, LoginError> {
        Ok(Self {
            auth_recipe: StretchRecipe::generate()?,
            local_recipe: StretchRecipe::generate()?,
        })
    }

    /// Load the care package for an account.
    ///
    /// # Errors
    ///
    /// Returns [`LoginError::Package`] if the file is missing or does not
    /// parse — an account without a care package is broken, not merely
    /// lacking PIN setup.
    pub fn load(dir: &LoginDirectory, account: AccountNumber) -> Result<Self, LoginError> {
        let contents = load_required(dir, account, CARE_PACKAGE_FILE)?;
        serde_json::from_str(&contents)
            .map_err(|e| LoginError::Package(format!("care package parse failed: {e}")))
    }

    /// Persist the care package atomically.
    ///
    /// # Errors
    ///
    /// Returns [`LoginError::Storage`] on disk failure.
    pub fn save(&self, dir: &LoginDirectory, account: AccountNumber) -> Result<(), LoginError> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| LoginError::Package(format!("care package serialization failed: {e}")))?;
        dir.save(account, CARE_PACKAGE_FILE, &json)
    }
}

// ---------------------------------------------------------------------------
// Login package
// ---------------------------------------------------------------------------

/// Account secrets sealed under the master key.
///
/// Written at full-password login; PIN login only reads it. Whoever
/// recovers the master key — by password or by PIN — unwraps the same
/// sync key and server password proof from here.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginPackage {
    /// The sync key sealed under the master key.
    pub wrapped_sync_key: SealedBox,
    /// The server password proof sealed under the master key.
    pub wrapped_password_proof: SealedBox,
}

impl LoginPackage {
    /// Seal a sync key and password proof under the master key.
    ///
    /// # Errors
    ///
    /// Returns [`LoginError::Crypto`] if sealing fails.
    pub fn create(
        master_key: &[u8],
        sync_key: &[u8],
        password_proof: &[u8],
    ) -> Result<Self, LoginError> {
        Ok(Self {
            wrapped_sync_key: sealed::seal(sync_key, master_key)?,
            wrapped_password_proof: sealed::seal(password_proof, master_key)?,
        })
    }

    /// Load the login package for an account.
    ///
    /// # Errors
    ///
    /// Returns [`LoginError::Package`] if the file is missing or does not
    /// parse.
    pub fn load(dir: &LoginDirectory, account: AccountNumber) -> Result<Self, LoginError> {
        let contents = load_required(dir, account, LOGIN_PACKAGE_FILE)?;
        serde_json::from_str(&contents)
            .map_err(|e| LoginError::Package(format!("login package parse failed: {e}")))
    }

    /// Persist the login package atomically.
    ///
    /// # Errors
    ///
    /// Returns [`LoginError::Storage`] on disk failure.
    pub fn save(&self, dir: &LoginDirectory, account: AccountNumber) -> Result<(), LoginError> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| LoginError::Package(format!("login package serialization failed: {e}")))?;
        dir.save(account, LOGIN_PACKAGE_FILE, &json)
    }

    /// Unwrap the sync key with the master key.
    ///
    /// # Errors
    ///
    /// Returns [`LoginError::Crypto`] if authentication fails (wrong
    /// master key or corrupt package).
    pub fn sync_key(&self, master_key: &[u8]) -> Result<SecretBuffer, LoginError> {
        Ok(sealed::open(&self.wrapped_sync_key, master_key)?)
    }

    /// Unwrap the server password proof with the master key.
    ///
    /// # Errors
    ///
    /// Returns [`LoginError::Crypto`] if authentication fails.
    pub fn password_proof(&self, master_key: &[u8]) -> Result<SecretBuffer, LoginError> {
        Ok(sealed::open(&self.wrapped_password_proof, master_key)?)
    }
}

/// Load a file that must exist for any provisioned account.
fn load_required(
    dir: &LoginDirectory,
    account: AccountNumber,
    file: &str,
) -> Result<String, LoginError> {
    dir.load(account, file).map_err(|e| match e {
        LoginError::Storage(ref io) if io.kind() == std::io::ErrorKind::NotFound => {
            LoginError::Package(format!("{file} is missing"))
        }
        other => other,
    })
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use loquet_crypto_core::sealed::seal;
    use tempfile::TempDir;

    const TEST_KEY: [u8; 32] = [0xAA; 32];

    fn test_dir() -> (TempDir, LoginDirectory, AccountNumber) {
        let tmp = TempDir::new().expect("tempdir should succeed");
        let dir = LoginDirectory::new(tmp.path());
        let account = dir.create_account("alice").expect("create should succeed");
        (tmp, dir, account)
    }

    fn test_pin_package() -> PinLocalPackage {
        PinLocalPackage {
            wrapped_master_key: seal(&[0u8; 32], &TEST_KEY).expect("seal should succeed"),
            device_id: BASE64.encode(&[0x42; DEVICE_ID_LEN]),
            expires_at: 4_102_444_800, // 2100-01-01
        }
    }

    #[test]
    fn pin_package_save_load_roundtrip() {
        let (_tmp, dir, account) = test_dir();
        let package = test_pin_package();
        package.save(&dir, account).expect("save should succeed");

        let loaded = PinLocalPackage::load(&dir, account).expect("load should succeed");
        assert_eq!(loaded.device_id, package.device_id);
        assert_eq!(loaded.expires_at, package.expires_at);
        assert_eq!(
            loaded.wrapped_master_key.ciphertext,
            package.wrapped_master_key.ciphertext
        );
    }

    #[test]
    fn pin_package_load_missing_is_not_set_up() {
        let (_tmp, dir, account) = test_dir();
        let result = PinLocalPackage::load(&dir, account);
        assert!(matches!(result, Err(LoginError::NotSetUp)));
    }

    #[test]
    fn pin_package_load_malformed_json_is_not_set_up() {
        let (_tmp, dir, account) = test_dir();
        dir.save(account, PIN_PACKAGE_FILE, "{ truncated")
            .expect("save should succeed");
        let result = PinLocalPackage::load(&dir, account);
        assert!(matches!(result, Err(LoginError::NotSetUp)));
    }

    #[test]
    fn pin_package_load_type_mismatch_is_not_set_up() {
        let (_tmp, dir, account) = test_dir();
        // expiresAt as a string instead of an integer.
        dir.save(
            account,
            PIN_PACKAGE_FILE,
            r#"{"wrappedMasterKey":{},"deviceId":"AA==","expiresAt":"soon"}"#,
        )
        .expect("save should succeed");
        let result = PinLocalPackage::load(&dir, account);
        assert!(matches!(result, Err(LoginError::NotSetUp)));
    }

    #[test]
    fn pin_package_load_bad_device_id_is_not_set_up() {
        let (_tmp, dir, account) = test_dir();
        let mut package = test_pin_package();
        package.device_id = "not base64!!!".into();
        package.save(&dir, account).expect("save should succeed");
        let result = PinLocalPackage::load(&dir, account);
        assert!(matches!(result, Err(LoginError::NotSetUp)));
    }

    #[test]
    fn pin_package_load_short_device_id_is_not_set_up() {
        let (_tmp, dir, account) = test_dir();
        let mut package = test_pin_package();
        package.device_id = BASE64.encode(&[0x42; 16]);
        package.save(&dir, account).expect("save should succeed");
        let result = PinLocalPackage::load(&dir, account);
        assert!(matches!(result, Err(LoginError::NotSetUp)));
    }

    #[test]
    fn pin_package_tolerates_unknown_fields() {
        let (_tmp, dir, account) = test_dir();
        let package = test_pin_package();
        package.save(&dir, account).expect("save should succeed");

        // Inject an extra field a future version might write.
        let raw = dir.load(account, PIN_PACKAGE_FILE).expect("load raw");
        let mut value: serde_json::Value = serde_json::from_str(&raw).expect("parse");
        value["futureField"] = serde_json::json!("ignored");
        dir.save(account, PIN_PACKAGE_FILE, &value.to_string())
            .expect("save should succeed");

        let loaded = PinLocalPackage::load(&dir, account).expect("load should still succeed");
        assert_eq!(loaded.device_id, package.device_id);
    }

    #[test]
    fn pin_package_device_id_bytes_roundtrip() {
        let package = test_pin_package();
        let bytes = package.device_id_bytes().expect("decode should succeed");
        assert_eq!(bytes, vec![0x42; DEVICE_ID_LEN]);
    }

    #[test]
    fn pin_package_delete_is_idempotent() {
        let (_tmp, dir, account) = test_dir();
        test_pin_package().save(&dir, account).expect("save should succeed");

        PinLocalPackage::delete(&dir, account).expect("first delete should succeed");
        PinLocalPackage::delete(&dir, account).expect("second delete should succeed");
        assert!(matches!(
            PinLocalPackage::load(&dir, account),
            Err(LoginError::NotSetUp)
        ));
    }

    #[test]
    fn care_package_save_load_roundtrip() {
        let (_tmp, dir, account) = test_dir();
        let care = CarePackage {
            auth_recipe: StretchRecipe::generate_scrypt(4, 2, 1).expect("generate"),
            local_recipe: StretchRecipe::generate_scrypt(4, 2, 1).expect("generate"),
        };
        care.save(&dir, account).expect("save should succeed");

        let loaded = CarePackage::load(&dir, account).expect("load should succeed");
        assert_eq!(loaded.auth_recipe, care.auth_recipe);
        assert_eq!(loaded.local_recipe, care.local_recipe);
    }

    #[test]
    fn care_package_missing_is_package_error() {
        let (_tmp, dir, account) = test_dir();
        let result = CarePackage::load(&dir, account);
        assert!(matches!(result, Err(LoginError::Package(_))));
    }

    #[test]
    fn login_package_unwraps_with_master_key() {
        let (_tmp, dir, account) = test_dir();
        let login = LoginPackage::create(&TEST_KEY, b"sync key bytes", b"password proof")
            .expect("create should succeed");
        login.save(&dir, account).expect("save should succeed");

        let loaded = LoginPackage::load(&dir, account).expect("load should succeed");
        assert_eq!(
            loaded.sync_key(&TEST_KEY).expect("unwrap").expose(),
            b"sync key bytes"
        );
        assert_eq!(
            loaded.password_proof(&TEST_KEY).expect("unwrap").expose(),
            b"password proof"
        );
    }

    #[test]
    fn login_package_wrong_master_key_fails() {
        let login = LoginPackage::create(&TEST_KEY, b"sync key bytes", b"password proof")
            .expect("create should succeed");
        let result = login.sync_key(&[0xBB; 32]);
        assert!(matches!(
            result,
            Err(LoginError::Crypto(loquet_crypto_core::CryptoError::Decryption))
        ));
    }
}
