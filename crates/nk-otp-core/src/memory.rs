//! Secret-holding buffers for OTP keys, PINs and temporary passwords.
//!
//! Contents are zeroized on drop and masked in `Debug`/`Display` output.

use std::fmt;

use secrecy::{ExposeSecret, SecretSlice};
use zeroize::Zeroize;

use crate::OtpError;

/// Constant-time byte comparison.
///
/// Returns `true` iff both slices have equal length and identical contents.
/// The length itself is not treated as secret.
#[must_use]
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

// ---------------------------------------------------------------------------
// SecretBuffer
// ---------------------------------------------------------------------------

/// Variable-length buffer for sensitive data.
///
/// Wraps [`SecretSlice<u8>`] from the `secrecy` crate, which zeroizes the
/// allocation on drop.
pub struct SecretBuffer {
    inner: SecretSlice<u8>,
}

impl SecretBuffer {
    /// Copy `data` into a new secret allocation.
    ///
    /// The caller should zeroize the source afterwards if it owns it.
    #[must_use]
    pub fn new(data: &[u8]) -> Self {
        Self {
            inner: data.to_vec().into(),
        }
    }

    /// Take ownership of `data` without copying it.
    #[must_use]
    pub fn from_vec(data: Vec<u8>) -> Self {
        Self { inner: data.into() }
    }

    /// Expose the underlying bytes. Keep the borrow short.
    #[must_use]
    pub fn expose(&self) -> &[u8] {
        self.inner.expose_secret()
    }

    /// Returns the number of bytes in the buffer.
    #[must_use]
    pub fn len(&self) -> usize {
        self.expose().len()
    }

    /// Returns `true` if the buffer is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Constant-time comparison against `other`.
    #[must_use]
    pub fn ct_eq(&self, other: &[u8]) -> bool {
        constant_time_eq(self.expose(), other)
    }

    /// Copy into a buffer of exactly `width` bytes, padding with zeros.
    ///
    /// # Errors
    ///
    /// Returns `OtpError::SecretTooLong` if the contents exceed `width`.
    pub fn zero_padded(&self, width: usize) -> Result<Self, OtpError> {
        if self.len() > width {
            return Err(OtpError::SecretTooLong {
                len: self.len(),
                max: width,
            });
        }
        let mut bytes = vec![0u8; width];
        bytes[..self.len()].copy_from_slice(self.expose());
        Ok(Self::from_vec(bytes))
    }
}

impl Clone for SecretBuffer {
    fn clone(&self) -> Self {
        Self::new(self.expose())
    }
}

impl From<&str> for SecretBuffer {
    fn from(value: &str) -> Self {
        Self::new(value.as_bytes())
    }
}

impl From<&[u8]> for SecretBuffer {
    fn from(value: &[u8]) -> Self {
        Self::new(value)
    }
}

impl<const N: usize> From<&[u8; N]> for SecretBuffer {
    fn from(value: &[u8; N]) -> Self {
        Self::new(value)
    }
}

impl From<Vec<u8>> for SecretBuffer {
    fn from(mut value: Vec<u8>) -> Self {
        let buf = Self::new(&value);
        value.zeroize();
        buf
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
// Unit tests
// ---------------------------------------------------------------------------
