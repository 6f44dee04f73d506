//! Deterministic key stretching behind self-describing recipes.
//!
//! This module provides:
//! - [`StretchRecipe`] — serializable algorithm + salt + cost bundle
//! - [`stretch`] — derive a 256-bit key from an input and a recipe
//!
//! # Recipe Model
//!
//! A recipe fully describes one derivation: which algorithm, which salt,
//! which cost parameters. Recipes are provisioned once per account during
//! the full-password login and are immutable afterwards, so the same input
//! stretches to the same key across devices and versions. Two independent
//! recipes over the same input yield two independent keys — the protocol
//! relies on that to split the authentication and decryption roles.

use crate::error::CryptoError;
use crate::memory::SecretBuffer;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

/// Output length of every stretch in bytes (256 bits).
pub const STRETCH_OUTPUT_LEN: usize = 32;

/// Minimum salt length in bytes.
const MIN_SALT_LEN: usize = 16;

/// Salt length used by freshly generated recipes.
const SALT_LEN: usize = 16;

/// Default scrypt cost: N = 2^15, r = 8, p = 1 (~32 MiB, interactive).
const SCRYPT_DEFAULT_LOG_N: u8 = 15;
const SCRYPT_DEFAULT_R: u32 = 8;
const SCRYPT_DEFAULT_P: u32 = 1;

/// Default Argon2id cost: 64 MiB, 3 iterations, 1 lane.
const ARGON2ID_DEFAULT_M_COST: u32 = 65_536;
const ARGON2ID_DEFAULT_T_COST: u32 = 3;
const ARGON2ID_DEFAULT_P_COST: u32 = 1;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Self-describing stretch parameter bundle.
///
/// Serialized with an `algorithm` tag so stored recipes remain readable
/// when new algorithms are added. Cost fields follow each algorithm's own
/// convention:
///
/// - scrypt: `log_n` is log2 of the CPU/memory cost N
/// - Argon2id: `m_cost` is memory in KiB, `t_cost` iterations, `p_cost` lanes
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "algorithm", rename_all = "camelCase")]
pub enum StretchRecipe {
    /// scrypt (RFC 7914).
    #[serde(rename_all = "camelCase")]
    Scrypt {
        /// Per-recipe random salt, at least 16 bytes.
        salt: Vec<u8>,
        /// log2 of the cost parameter N.
        log_n: u8,
        /// Block size parameter.
        r: u32,
        /// Parallelization parameter.
        p: u32,
    },
    /// Argon2id (RFC 9106).
    #[serde(rename_all = "camelCase")]
    Argon2id {
        /// Per-recipe random salt, at least 16 bytes.
        salt: Vec<u8>,
        /// Memory cost in kibibytes.
        m_cost: u32,
        /// Number of iterations.
        t_cost: u32,
        /// Degree of parallelism.
        p_cost: u32,
    },
}

impl StretchRecipe {
    /// Generate a fresh scrypt recipe at the default interactive cost.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::SecureMemory` if the CSPRNG fails.
    pub fn generate() -> Result<Self, CryptoError> {
        Self::generate_scrypt(SCRYPT_DEFAULT_LOG_N, SCRYPT_DEFAULT_R, SCRYPT_DEFAULT_P)
    }

    /// Generate a fresh scrypt recipe with explicit cost parameters.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::SecureMemory` if the CSPRNG fails.
    pub fn generate_scrypt(log_n: u8, r: u32, p: u32) -> Result<Self, CryptoError> {
        Ok(Self::Scrypt {
            salt: random_salt()?,
            log_n,
            r,
            p,
        })
    }

    /// Generate a fresh Argon2id recipe at the default cost.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::SecureMemory` if the CSPRNG fails.
    pub fn generate_argon2id() -> Result<Self, CryptoError> {
        Ok(Self::Argon2id {
            salt: random_salt()?,
            m_cost: ARGON2ID_DEFAULT_M_COST,
            t_cost: ARGON2ID_DEFAULT_T_COST,
            p_cost: ARGON2ID_DEFAULT_P_COST,
        })
    }

    fn salt(&self) -> &[u8] {
        match self {
            Self::Scrypt { salt, .. } | Self::Argon2id { salt, .. } => salt,
        }
    }
}

fn random_salt() -> Result<Vec<u8>, CryptoError> {
    let mut salt = vec![0u8; SALT_LEN];
    OsRng
        .try_fill_bytes(&mut salt)
        .map_err(|e| CryptoError::SecureMemory(format!("CSPRNG fill failed: {e}")))?;
    Ok(salt)
}

// ---------------------------------------------------------------------------
// Core stretch
// ---------------------------------------------------------------------------

/// Derive a 256-bit key from `input` using the given recipe.
///
/// Deterministic and side-effect-free: the same input and recipe always
/// produce the same key. Returns a [`SecretBuffer`] containing 32 bytes;
/// the intermediate output is zeroized after copying.
///
/// The input may be any byte string, including empty — PIN strength
/// policy is enforced by callers, not here.
///
/// # Errors
///
/// Returns `CryptoError::KeyStretch` if the salt is shorter than 16 bytes,
/// the cost parameters are invalid, or the derivation itself fails.
pub fn stretch(input: &[u8], recipe: &StretchRecipe) -> Result<SecretBuffer, CryptoError> {
    if recipe.salt().len() < MIN_SALT_LEN {
        return Err(CryptoError::KeyStretch(format!(
            "salt too short: {} bytes (minimum {MIN_SALT_LEN})",
            recipe.salt().len()
        )));
    }

    let mut output = [0u8; STRETCH_OUTPUT_LEN];
    let result = match recipe {
        StretchRecipe::Scrypt { salt, log_n, r, p } => {
            stretch_scrypt(input, salt, *log_n, *r, *p, &mut output)
        }
        StretchRecipe::Argon2id {
            salt,
            m_cost,
            t_cost,
            p_cost,
        } => stretch_argon2id(input, salt, *m_cost, *t_cost, *p_cost, &mut output),
    };
    if let Err(e) = result {
        output.zeroize();
        return Err(e);
    }

    let key = SecretBuffer::new(&output)
        .map_err(|e| CryptoError::KeyStretch(format!("secure buffer allocation failed: {e}")))?;
    output.zeroize();
    Ok(key)
}

fn stretch_scrypt(
    input: &[u8],
    salt: &[u8],
    log_n: u8,
    r: u32,
    p: u32,
    output: &mut [u8],
) -> Result<(), CryptoError> {
    let params = scrypt::Params::new(log_n, r, p, STRETCH_OUTPUT_LEN)
        .map_err(|e| CryptoError::KeyStretch(format!("invalid scrypt params: {e}")))?;
    scrypt::scrypt(input, salt, &params, output)
        .map_err(|e| CryptoError::KeyStretch(format!("scrypt derivation failed: {e}")))
}

fn stretch_argon2id(
    input: &[u8],
    salt: &[u8],
    m_cost: u32,
    t_cost: u32,
    p_cost: u32,
    output: &mut [u8],
) -> Result<(), CryptoError> {
    let params = argon2::Params::new(m_cost, t_cost, p_cost, Some(STRETCH_OUTPUT_LEN))
        .map_err(|e| CryptoError::KeyStretch(format!("invalid argon2 params: {e}")))?;
    let argon2 = argon2::Argon2::new(
        argon2::Algorithm::Argon2id,
        argon2::Version::V0x13,
        params,
    );
    argon2
        .hash_password_into(input, salt, output)
        .map_err(|e| CryptoError::KeyStretch(format!("argon2id derivation failed: {e}")))
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
