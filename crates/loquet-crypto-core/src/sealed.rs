//! AES-256-GCM authenticated sealing.
//!
//! This module provides:
//! - [`seal`] — encrypt plaintext with a random nonce, returning [`SealedBox`]
//! - [`open`] — decrypt and authenticate a [`SealedBox`], returning [`SecretBuffer`]
//! - [`SealedBox`] — self-describing algorithm + nonce + ciphertext + tag container
//!
//! A sealed box carries its own algorithm tag so persisted and
//! server-held packages stay decodable if the cipher suite ever grows.
//! Round-tripping a box through serde preserves it bit-exactly — the
//! login protocol relies on that when a box it cannot open locally (the
//! server half) travels through JSON.

use crate::error::CryptoError;
use crate::memory::SecretBuffer;
use rand::rngs::OsRng;
use rand::RngCore;
use ring::aead;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

/// AES-256-GCM nonce length in bytes (96 bits).
pub const NONCE_LEN: usize = 12;

/// AES-256-GCM authentication tag length in bytes (128 bits).
pub const TAG_LEN: usize = 16;

/// AES-256-GCM key length in bytes (256 bits).
pub const KEY_LEN: usize = 32;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Algorithm identifier carried inside every [`SealedBox`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SealAlgorithm {
    /// AES-256-GCM with a 96-bit nonce and 128-bit tag.
    #[serde(rename = "aes256gcm")]
    Aes256Gcm,
}

/// Authenticated ciphertext container.
///
/// The nonce is randomly generated per sealing call and travels with the
/// ciphertext. The tag authenticates algorithm-chosen data; any
/// modification to the nonce, ciphertext, or tag makes [`open`] fail.
#[must_use = "sealed data must be stored or transmitted"]
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SealedBox {
    /// Cipher used to produce this box.
    pub algorithm: SealAlgorithm,
    /// 96-bit random nonce, unique per sealing.
    pub nonce: [u8; NONCE_LEN],
    /// Encrypted data (same length as the original plaintext).
    pub ciphertext: Vec<u8>,
    /// 128-bit authentication tag.
    pub tag: [u8; TAG_LEN],
}

// ---------------------------------------------------------------------------
// Seal / open
// ---------------------------------------------------------------------------

/// Seal plaintext under a 256-bit key with a fresh random nonce.
///
/// # Errors
///
/// Returns `CryptoError::Encryption` if the key is not exactly 32 bytes
/// or the underlying encryption operation fails.
pub fn seal(plaintext: &[u8], key: &[u8]) -> Result<SealedBox, CryptoError> {
    let less_safe_key = gcm_key(key)?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = aead::Nonce::assume_unique_for_key(nonce_bytes);

    // Encrypt in place — the plaintext copy becomes the ciphertext.
    let mut in_out = plaintext.to_vec();
    let Ok(tag) =
        less_safe_key.seal_in_place_separate_tag(nonce, aead::Aad::empty(), &mut in_out)
    else {
        in_out.zeroize();
        return Err(CryptoError::Encryption(
            "AES-256-GCM encryption failed".into(),
        ));
    };

    let mut tag_bytes = [0u8; TAG_LEN];
    tag_bytes.copy_from_slice(tag.as_ref());

    Ok(SealedBox {
        algorithm: SealAlgorithm::Aes256Gcm,
        nonce: nonce_bytes,
        ciphertext: in_out,
        tag: tag_bytes,
    })
}

/// Open a [`SealedBox`], authenticating it against the key.
///
/// Returns the plaintext as a [`SecretBuffer`] (zeroized on drop); the
/// intermediate decryption buffer is zeroized after copying.
///
/// # Errors
///
/// Returns `CryptoError::Encryption` if the key is not exactly 32 bytes.
/// Returns `CryptoError::Decryption` if authentication fails — wrong key
/// or a tampered nonce, ciphertext, or tag.
pub fn open(sealed: &SealedBox, key: &[u8]) -> Result<SecretBuffer, CryptoError> {
    // Single algorithm today; the match keeps future tags from silently
    // decrypting with the wrong cipher.
    let SealAlgorithm::Aes256Gcm = sealed.algorithm;

    let less_safe_key = gcm_key(key)?;
    let nonce = aead::Nonce::assume_unique_for_key(sealed.nonce);

    // Build ciphertext || tag for open_in_place.
    let mut ct_tag = Vec::with_capacity(sealed.ciphertext.len().saturating_add(TAG_LEN));
    ct_tag.extend_from_slice(&sealed.ciphertext);
    ct_tag.extend_from_slice(&sealed.tag);

    let plaintext_slice = less_safe_key
        .open_in_place(nonce, aead::Aad::empty(), &mut ct_tag)
        .map_err(|_| CryptoError::Decryption)?;

    let result = SecretBuffer::new(plaintext_slice)
        .map_err(|e| CryptoError::SecureMemory(format!("secure buffer allocation failed: {e}")))?;
    ct_tag.zeroize();
    Ok(result)
}

fn gcm_key(key: &[u8]) -> Result<aead::LessSafeKey, CryptoError> {
    if key.len() != KEY_LEN {
        return Err(CryptoError::Encryption(format!(
            "invalid key length: {} bytes (expected {KEY_LEN})",
            key.len()
        )));
    }
    let unbound = aead::UnboundKey::new(&aead::AES_256_GCM, key)
        .map_err(|_| CryptoError::Encryption("failed to create AES-256-GCM key".into()))?;
    Ok(aead::LessSafeKey::new(unbound))
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_KEY: [u8; KEY_LEN] = [0xAA; KEY_LEN];
    const WRONG_KEY: [u8; KEY_LEN] = [0xBB; KEY_LEN];

    #[test]
    fn seal_produces_correct_lengths_and_tag() {
        let plaintext = b"pin key material";
        let sealed = seal(plaintext, &TEST_KEY).expect("seal should succeed");
        assert_eq!(sealed.algorithm, SealAlgorithm::Aes256Gcm);
        assert_eq!(sealed.nonce.len(), NONCE_LEN);
        assert_eq!(sealed.tag.len(), TAG_LEN);
        assert_eq!(sealed.ciphertext.len(), plaintext.len());
    }

    #[test]
    fn seal_open_roundtrip() {
        let plaintext = b"wrapped master key";
        let sealed = seal(plaintext, &TEST_KEY).expect("seal should succeed");
        let opened = open(&sealed, &TEST_KEY).expect("open should succeed");
        assert_eq!(opened.expose(), plaintext);
    }

    #[test]
    fn open_fails_on_tampered_ciphertext() {
        let mut tampered = seal(b"test data", &TEST_KEY).expect("seal should succeed");
        if let Some(byte) = tampered.ciphertext.first_mut() {
            *byte ^= 0xFF;
        }
        let result = open(&tampered, &TEST_KEY);
        assert!(matches!(result, Err(CryptoError::Decryption)));
    }

    #[test]
    fn open_fails_on_tampered_tag() {
        let mut tampered = seal(b"test data", &TEST_KEY).expect("seal should succeed");
        tampered.tag[0] ^= 0xFF;
        let result = open(&tampered, &TEST_KEY);
        assert!(matches!(result, Err(CryptoError::Decryption)));
    }

    #[test]
    fn open_fails_on_modified_nonce() {
        let mut tampered = seal(b"test data", &TEST_KEY).expect("seal should succeed");
        tampered.nonce[0] ^= 0xFF;
        let result = open(&tampered, &TEST_KEY);
        assert!(matches!(result, Err(CryptoError::Decryption)));
    }

    #[test]
    fn open_fails_with_wrong_key() {
        let sealed = seal(b"test data", &TEST_KEY).expect("seal should succeed");
        let result = open(&sealed, &WRONG_KEY);
        assert!(matches!(result, Err(CryptoError::Decryption)));
    }

    #[test]
    fn seal_rejects_wrong_key_length() {
        let err = seal(b"test", &[0u8; 31]).expect_err("short key should fail");
        assert!(format!("{err}").contains("invalid key length"));
        let err = open(
            &seal(b"test", &TEST_KEY).expect("seal should succeed"),
            &[0u8; 33],
        )
        .expect_err("long key should fail");
        assert!(format!("{err}").contains("invalid key length"));
    }

    #[test]
    fn seal_empty_plaintext_roundtrips() {
        let sealed = seal(&[], &TEST_KEY).expect("seal empty should succeed");
        assert!(sealed.ciphertext.is_empty());
        let opened = open(&sealed, &TEST_KEY).expect("open empty should succeed");
        assert!(opened.expose().is_empty());
    }

    #[test]
    fn two_seals_produce_different_nonces() {
        let a = seal(b"same data", &TEST_KEY).expect("seal should succeed");
        let b = seal(b"same data", &TEST_KEY).expect("seal should succeed");
        assert_ne!(a.nonce, b.nonce, "nonces should differ");
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn sealed_box_serde_roundtrip_still_opens() {
        let sealed = seal(b"serde test", &TEST_KEY).expect("seal should succeed");
        let json = serde_json::to_string(&sealed).expect("serialize should succeed");
        let restored: SealedBox = serde_json::from_str(&json).expect("deserialize should succeed");
        assert_eq!(restored.nonce, sealed.nonce);
        assert_eq!(restored.ciphertext, sealed.ciphertext);
        assert_eq!(restored.tag, sealed.tag);

        let opened = open(&restored, &TEST_KEY).expect("open should succeed");
        assert_eq!(opened.expose(), b"serde test");
    }

    #[test]
    fn sealed_box_json_names_its_algorithm() {
        let sealed = seal(b"tagged", &TEST_KEY).expect("seal should succeed");
        let json = serde_json::to_string(&sealed).expect("serialize should succeed");
        assert!(json.contains(r#""algorithm":"aes256gcm""#));
    }
}
