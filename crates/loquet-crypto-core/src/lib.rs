//! `loquet-crypto-core` — Pure cryptographic primitives for LOQUET.
//!
//! This crate is the audit target: zero network, zero async, zero UI
//! dependencies. It provides exactly what the login protocol consumes —
//! key stretching, authenticated sealing, and secure containers for key
//! material.

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::arithmetic_side_effects))]

pub mod error;
pub mod memory;

pub mod sealed;
pub mod stretch;

pub use error::CryptoError;
pub use memory::{disable_core_dumps, SecretBuffer, SecretKey};
pub use sealed::{open, seal, SealAlgorithm, SealedBox};
pub use stretch::{stretch, StretchRecipe, STRETCH_OUTPUT_LEN};
