//! Secure containers for key material.
//!
//! Every secret the PIN protocol touches — the PIN input, both stretched
//! keys, the PIN key, the decrypted master key — lives in one of these
//! wrappers for its whole lifetime:
//!
//! - zeroed on drop via [`zeroize`], on success and error paths alike
//! - pinned in RAM with best-effort `mlock` so it cannot reach swap
//! - masked in `Debug`/`Display` output to prevent accidental leakage

use crate::error::CryptoError;
use rand::rngs::OsRng;
use rand::RngCore;
use secrecy::{ExposeSecret, SecretSlice};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

// ---------------------------------------------------------------------------
// mlock guard
// ---------------------------------------------------------------------------

/// RAII guard over an `mlock`'d region; `munlock`s on drop.
///
/// Locking is best-effort: if `mlock` fails (quota, privileges) the secret
/// still works, it just may be swapped. A one-time warning is printed so
/// operators can raise `RLIMIT_MEMLOCK`.
struct MemLock {
    ptr: *const u8,
    len: usize,
    locked: bool,
}

// SAFETY: The pointer is only passed to mlock/munlock system calls, which
// are thread-safe. The pointed-to data is owned by the enclosing secret
// container and never dereferenced through MemLock.
unsafe impl Send for MemLock {}
unsafe impl Sync for MemLock {}

impl MemLock {
    const fn unlocked() -> Self {
        Self {
            ptr: std::ptr::null(),
            len: 0,
            locked: false,
        }
    }

    fn try_lock(ptr: *const u8, len: usize) -> Self {
        let locked = platform::try_mlock(ptr, len);
        if !locked && len > 0 {
            static WARNED: std::sync::Once = std::sync::Once::new();
            WARNED.call_once(|| {
                eprintln!(
                    "[loquet-crypto-core] WARNING: mlock failed — \
                     secret data may be swapped to disk. \
                     Consider increasing RLIMIT_MEMLOCK."
                );
            });
        }
        Self { ptr, len, locked }
    }
}

impl Drop for MemLock {
    fn drop(&mut self) {
        if self.locked {
            platform::try_munlock(self.ptr, self.len);
        }
    }
}

// ---------------------------------------------------------------------------
// SecretBuffer — variable-length
// ---------------------------------------------------------------------------

/// Variable-length buffer for sensitive data.
///
/// Wraps [`SecretSlice<u8>`] from the `secrecy` crate, adding `mlock` on
/// allocation and masked `Debug`/`Display`. Zeroization on drop comes from
/// `secrecy` itself.
pub struct SecretBuffer {
    inner: SecretSlice<u8>,
    _lock: MemLock,
}

impl SecretBuffer {
    /// Copy `data` into a new locked allocation.
    ///
    /// The caller should zeroize the source after this returns.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::SecureMemory` if allocation fails.
    pub fn new(data: &[u8]) -> Result<Self, CryptoError> {
        let inner: SecretSlice<u8> = data.to_vec().into();
        let exposed = inner.expose_secret();
        let lock = MemLock::try_lock(exposed.as_ptr(), exposed.len());
        Ok(Self { inner, _lock: lock })
    }

    /// Create a `SecretBuffer` filled with cryptographically random bytes.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::SecureMemory` if the CSPRNG fails.
    pub fn random(len: usize) -> Result<Self, CryptoError> {
        let mut bytes = vec![0u8; len];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| CryptoError::SecureMemory(format!("CSPRNG fill failed: {e}")))?;
        let result = Self::new(&bytes);
        bytes.zeroize();
        result
    }

    /// Expose the underlying bytes for a cryptographic operation.
    ///
    /// Keep exposure minimal — prefer using the slice within a single
    /// expression rather than binding it to a long-lived variable.
    #[must_use]
    pub fn expose(&self) -> &[u8] {
        self.inner.expose_secret()
    }

    /// Number of bytes in the buffer.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.expose_secret().len()
    }

    /// Returns `true` if the buffer is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for SecretBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretBuffer(***)")
    }
}

impl fmt::Display for SecretBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretBuffer(***)")
    }
}

// ---------------------------------------------------------------------------
// SecretKey<N> — fixed-size
// ---------------------------------------------------------------------------

/// Fixed-size container for keys and other fixed-length secrets.
///
/// Derives `Zeroize` + `ZeroizeOnDrop` so the bytes are erased when the
/// value goes out of scope, on every exit path.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SecretKey<const N: usize> {
    bytes: [u8; N],
    // The mlock guard manages its own Drop; it must not be zeroized.
    #[zeroize(skip)]
    lock: MemLock,
}

impl<const N: usize> SecretKey<N> {
    /// Take ownership of a fixed-size array as a secret.
    ///
    /// **Note on `mlock`:** the region is locked at the current address.
    /// If the value is subsequently moved, the guard still references the
    /// original address; `munlock` on a stale address is a safe no-op and
    /// the zeroize-on-drop guarantee is unaffected.
    #[must_use]
    pub fn new(data: [u8; N]) -> Self {
        // Two-phase init so `bytes` has a stable address before locking.
        let mut s = Self {
            bytes: data,
            lock: MemLock::unlocked(),
        };
        s.lock = MemLock::try_lock(s.bytes.as_ptr(), N);
        s
    }

    /// Create a `SecretKey` filled with cryptographically random bytes.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::SecureMemory` if the CSPRNG fails.
    pub fn random() -> Result<Self, CryptoError> {
        let mut bytes = [0u8; N];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| CryptoError::SecureMemory(format!("CSPRNG fill failed: {e}")))?;
        Ok(Self::new(bytes))
    }

    /// Copy a slice of exactly `N` bytes into a new `SecretKey`.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::InvalidKeyMaterial` on a length mismatch.
    pub fn from_slice(data: &[u8]) -> Result<Self, CryptoError> {
        let bytes: [u8; N] = data.try_into().map_err(|_| {
            CryptoError::InvalidKeyMaterial(format!(
                "expected {N} bytes, got {}",
                data.len()
            ))
        })?;
        Ok(Self::new(bytes))
    }

    /// Expose the underlying bytes for a cryptographic operation.
    #[must_use]
    pub const fn expose(&self) -> &[u8; N] {
        &self.bytes
    }
}

impl<const N: usize> fmt::Debug for SecretKey<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretKey<{N}>(***)")
    }
}

impl<const N: usize> fmt::Display for SecretKey<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretKey<{N}>(***)")
    }
}

impl<const N: usize> From<[u8; N]> for SecretKey<N> {
    fn from(data: [u8; N]) -> Self {
        Self::new(data)
    }
}

// ---------------------------------------------------------------------------
// Core dump disabling
// ---------------------------------------------------------------------------

/// Disable core dumps for the current process.
///
/// On Unix: sets `RLIMIT_CORE` to 0 (both soft and hard limits).
/// On non-Unix: no-op.
///
/// # Errors
///
/// Returns `CryptoError::SecureMemory` if the `setrlimit` call fails.
pub fn disable_core_dumps() -> Result<(), CryptoError> {
    platform::disable_core_dumps_impl()
}

// ---------------------------------------------------------------------------
// Platform-specific implementations
// ---------------------------------------------------------------------------

#[cfg(unix)]
mod platform {
    use crate::error::CryptoError;

    pub(super) fn try_mlock(ptr: *const u8, len: usize) -> bool {
        if len == 0 {
            return true;
        }
        // SAFETY: mlock is safe to call with any valid pointer/length pair.
        // An invalid pointer yields ENOMEM, which we report as unlocked.
        unsafe { libc::mlock(ptr.cast(), len) == 0 }
    }

    pub(super) fn try_munlock(ptr: *const u8, len: usize) {
        if len == 0 {
            return;
        }
        // SAFETY: munlock is safe to call. Failure is non-critical.
        unsafe {
            libc::munlock(ptr.cast(), len);
        }
    }

    pub(super) fn disable_core_dumps_impl() -> Result<(), CryptoError> {
        let limit = libc::rlimit {
            rlim_cur: 0,
            rlim_max: 0,
        };
        // SAFETY: setrlimit with RLIMIT_CORE is a standard POSIX call.
        let ret = unsafe { libc::setrlimit(libc::RLIMIT_CORE, &raw const limit) };
        if ret != 0 {
            return Err(CryptoError::SecureMemory(
                "failed to disable core dumps via RLIMIT_CORE".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(not(unix))]
mod platform {
    use crate::error::CryptoError;

    pub(super) fn try_mlock(_ptr: *const u8, _len: usize) -> bool {
        false
    }

    pub(super) fn try_munlock(_ptr: *const u8, _len: usize) {}

    pub(super) fn disable_core_dumps_impl() -> Result<(), CryptoError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_buffer_stores_content() {
        let data = b"stretched key material";
        let buf = SecretBuffer::new(data).expect("allocation should succeed");
        assert_eq!(buf.expose(), data);
        assert_eq!(buf.len(), data.len());
        assert!(!buf.is_empty());
    }

    #[test]
    fn secret_buffer_empty() {
        let buf = SecretBuffer::new(b"").expect("allocation should succeed");
        assert!(buf.is_empty());
        assert_eq!(buf.len(), 0);
    }

    #[test]
    fn secret_buffer_random_produces_unique_buffers() {
        let a = SecretBuffer::random(32).expect("random should succeed");
        let b = SecretBuffer::random(32).expect("random should succeed");
        assert_eq!(a.len(), 32);
        assert_ne!(a.expose(), b.expose());
    }

    #[test]
    fn secret_buffer_debug_and_display_are_masked() {
        let buf = SecretBuffer::new(b"super secret").expect("allocation should succeed");
        assert_eq!(format!("{buf:?}"), "SecretBuffer(***)");
        assert_eq!(format!("{buf}"), "SecretBuffer(***)");
    }

    #[test]
    fn secret_key_roundtrip() {
        let data: [u8; 32] = [0xAB; 32];
        let key = SecretKey::new(data);
        assert_eq!(key.expose(), &data);
    }

    #[test]
    fn secret_key_random_correct_length() {
        let key = SecretKey::<32>::random().expect("random should succeed");
        assert_eq!(key.expose().len(), 32);
        assert!(key.expose().iter().any(|&b| b != 0));
    }

    #[test]
    fn secret_key_from_slice_accepts_exact_length() {
        let key = SecretKey::<32>::from_slice(&[0x42; 32]).expect("from_slice should succeed");
        assert_eq!(key.expose(), &[0x42; 32]);
    }

    #[test]
    fn secret_key_from_slice_rejects_wrong_length() {
        let result = SecretKey::<32>::from_slice(&[0u8; 31]);
        assert!(
            matches!(result, Err(CryptoError::InvalidKeyMaterial(_))),
            "31 bytes should yield CryptoError::InvalidKeyMaterial"
        );
        let result = SecretKey::<32>::from_slice(&[0u8; 33]);
        assert!(matches!(result, Err(CryptoError::InvalidKeyMaterial(_))));
    }

    #[test]
    fn secret_key_debug_is_masked() {
        let key = SecretKey::<32>::new([0xFF; 32]);
        let debug = format!("{key:?}");
        assert_eq!(debug, "SecretKey<32>(***)");
        assert!(!debug.contains("255"));
    }

    #[test]
    fn secret_key_from_array() {
        let data: [u8; 16] = [0x42; 16];
        let key: SecretKey<16> = data.into();
        assert_eq!(key.expose(), &data);
    }

    #[cfg(unix)]
    #[test]
    fn disable_core_dumps_succeeds() {
        disable_core_dumps().expect("disable_core_dumps should succeed");

        let mut limit = libc::rlimit {
            rlim_cur: 1,
            rlim_max: 1,
        };
        let ret = unsafe { libc::getrlimit(libc::RLIMIT_CORE, &raw mut limit) };
        assert_eq!(ret, 0);
        assert_eq!(limit.rlim_cur, 0);
        assert_eq!(limit.rlim_max, 0);
    }
}
