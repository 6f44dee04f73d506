//! `loquet-login` — Login business logic for LOQUET.
//!
//! Manages the login directory, the per-account packages, and the
//! PIN-based re-login protocol. Cryptographic primitives come from
//! `loquet-crypto-core`; the remote credential service is reached only
//! through the [`server::CredentialService`] trait.

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::arithmetic_side_effects))]

pub mod directory;
pub mod error;
pub mod package;
pub mod pin;
pub mod server;
pub mod session;

pub use directory::{AccountNumber, LoginDirectory};
pub use error::LoginError;
pub use package::{CarePackage, LoginPackage, PinLocalPackage, DEVICE_ID_LEN, PIN_PACKAGE_FILE};
pub use pin::{pin_delete, pin_login, pin_login_available, pin_setup, PIN_KEY_LEN};
pub use server::{CredentialService, MemoryCredentialService, OwnerCredentials, ServerError};
pub use session::{
    establish_account, establish_account_with_keys, Session, MASTER_KEY_LEN, SYNC_KEY_LEN,
};
