//! Hex decoding of OTP secrets as callers supply them.

use data_encoding::HEXLOWER_PERMISSIVE;
use zeroize::Zeroize;

use crate::memory::SecretBuffer;
use crate::OtpError;

/// Largest secret a 320-bit capable token stores, in bytes.
pub const MAX_SECRET_LEN: usize = 40;

/// Secret field width on tokens without 320-bit support.
pub const LEGACY_SECRET_LEN: usize = 20;

/// Decode a hex secret of at most `max_len` bytes.
///
/// An empty string decodes to an empty buffer: writers treat that as
/// "keep the stored secret". Upper- and lower-case digits are accepted.
///
/// # Errors
///
/// - [`OtpError::InvalidHex`] for odd length or non-hex characters
/// - [`OtpError::SecretTooLong`] when the decoded secret exceeds `max_len`
pub fn decode_secret(hex: &str, max_len: usize) -> Result<SecretBuffer, OtpError> {
    if hex.is_empty() {
        return Ok(SecretBuffer::new(&[]));
    }
    if hex.len() % 2 != 0 {
        return Err(OtpError::InvalidHex(format!(
            "odd number of digits ({})",
            hex.len()
        )));
    }

    let mut decoded = HEXLOWER_PERMISSIVE
        .decode(hex.as_bytes())
        .map_err(|e| OtpError::InvalidHex(e.to_string()))?;

    if decoded.len() > max_len {
        let len = decoded.len();
        decoded.zeroize();
        return Err(OtpError::SecretTooLong { len, max: max_len });
    }

    Ok(SecretBuffer::from_vec(decoded))
}
