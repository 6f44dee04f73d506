//! The login directory — on-disk home of every account known to this device.
//!
//! Layout: `<root>/account_<N>/` holds one account's files. `UserName.json`
//! inside each account directory records the normalized owner, so usernames
//! resolve to account numbers by scanning rather than by a central index
//! (no index file to corrupt or desync).
//!
//! All writes go through the atomic tmp-then-rename path so a crash can
//! never leave a partially written package behind.

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::LoginError;

/// File recording the normalized owner of an account directory.
const USERNAME_FILE: &str = "UserName.json";

/// Prefix of per-account directories under the root.
const ACCOUNT_DIR_PREFIX: &str = "account_";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Identifier of one account directory on this device.
///
/// Purely local — two devices holding the same user may assign different
/// numbers. Remote identity is carried by credentials, never by this.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AccountNumber(u32);

impl AccountNumber {
    /// The raw directory number.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for AccountNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserNameFile {
    user_name: String,
}

/// Handle to the login directory root.
#[derive(Clone, Debug)]
pub struct LoginDirectory {
    root: PathBuf,
}

impl LoginDirectory {
    /// Create a handle for the given root path.
    ///
    /// The root need not exist yet; it is created on the first
    /// [`create_account`](Self::create_account).
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Normalize a raw username to its canonical on-disk form.
    ///
    /// Trims surrounding whitespace and lowercases. The canonical form is
    /// what every derivation and lookup uses, so `"Alice "` and `"alice"`
    /// are the same account.
    ///
    /// # Errors
    ///
    /// Returns [`LoginError::AccountNotFound`] if the result is empty or
    /// contains interior whitespace — such a name can never name an account.
    pub fn normalize_username(raw: &str) -> Result<String, LoginError> {
        let fixed = raw.trim().to_lowercase();
        if fixed.is_empty() || fixed.contains(char::is_whitespace) {
            return Err(LoginError::AccountNotFound(raw.into()));
        }
        Ok(fixed)
    }

    /// Resolve a normalized username to its account number.
    ///
    /// Pure local scan; no side effects.
    ///
    /// # Errors
    ///
    /// Returns [`LoginError::AccountNotFound`] if no account directory
    /// claims this username (including when the root does not exist yet).
    pub fn account_number(&self, username: &str) -> Result<AccountNumber, LoginError> {
        for (number, path) in self.scan_accounts()? {
            let owner_file = path.join(USERNAME_FILE);
            let Ok(contents) = fs::read_to_string(&owner_file) else {
                continue;
            };
            let Ok(owner) = serde_json::from_str::<UserNameFile>(&contents) else {
                continue;
            };
            if owner.user_name == username {
                return Ok(AccountNumber(number));
            }
        }
        Err(LoginError::AccountNotFound(username.into()))
    }

    /// Create an account directory for a normalized username.
    ///
    /// Idempotent: if the username already resolves, the existing number
    /// is returned untouched.
    ///
    /// # Errors
    ///
    /// Returns [`LoginError::Storage`] if the directory or owner file
    /// cannot be written.
    pub fn create_account(&self, username: &str) -> Result<AccountNumber, LoginError> {
        if let Ok(existing) = self.account_number(username) {
            return Ok(existing);
        }

        let next = self
            .scan_accounts()?
            .into_iter()
            .map(|(number, _)| number)
            .max()
            .map_or(1, |highest| highest.saturating_add(1));

        let account = AccountNumber(next);
        fs::create_dir_all(self.account_dir(account))?;

        let owner = UserNameFile {
            user_name: username.into(),
        };
        let json = serde_json::to_string_pretty(&owner)
            .map_err(|e| LoginError::Package(format!("owner file serialization failed: {e}")))?;
        self.save(account, USERNAME_FILE, &json)?;

        Ok(account)
    }

    /// Load a named file from an account directory.
    ///
    /// # Errors
    ///
    /// Returns [`LoginError::Storage`] (carrying `NotFound`) when the file
    /// is absent; callers decide what absence means for their package.
    pub fn load(&self, account: AccountNumber, name: &str) -> Result<String, LoginError> {
        Ok(fs::read_to_string(self.account_dir(account).join(name))?)
    }

    /// Save a named file into an account directory, atomically.
    ///
    /// Writes to a temporary sibling, restricts permissions to owner-only
    /// on Unix, then renames into place — a crash mid-save leaves either
    /// the old file or the new one, never a torn mix.
    ///
    /// # Errors
    ///
    /// Returns [`LoginError::Storage`] if the file system rejects the
    /// write or rename.
    pub fn save(&self, account: AccountNumber, name: &str, contents: &str) -> Result<(), LoginError> {
        let dir = self.account_dir(account);
        let path = dir.join(name);
        let tmp = dir.join(format!(".{name}.tmp"));

        fs::write(&tmp, contents)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&tmp, fs::Permissions::from_mode(0o600))?;
        }

        fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Delete a named file from an account directory.
    ///
    /// Idempotent: deleting a file that does not exist is `Ok`.
    ///
    /// # Errors
    ///
    /// Returns [`LoginError::Storage`] for failures other than absence.
    pub fn delete(&self, account: AccountNumber, name: &str) -> Result<(), LoginError> {
        match fs::remove_file(self.account_dir(account).join(name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn account_dir(&self, account: AccountNumber) -> PathBuf {
        self.root.join(format!("{ACCOUNT_DIR_PREFIX}{}", account.0))
    }

    /// Numbered account directories currently under the root.
    fn scan_accounts(&self) -> Result<Vec<(u32, PathBuf)>, LoginError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut accounts = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let Some(number) = name
                .to_str()
                .and_then(|n| n.strip_prefix(ACCOUNT_DIR_PREFIX))
                .and_then(|n| n.parse::<u32>().ok())
            else {
                continue;
            };
            if entry.path().is_dir() {
                accounts.push((number, entry.path()));
            }
        }
        Ok(accounts)
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
