//! Error types for `nk-otp-core`.

use thiserror::Error;

/// Errors produced by OTP derivation and secret decoding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OtpError {
    /// HMAC key material was empty.
    #[error("secret must not be empty")]
    EmptySecret,

    /// TOTP period of zero seconds.
    #[error("period must be > 0")]
    InvalidPeriod,

    /// Secret text is not an even-length hexadecimal string.
    #[error("invalid hex secret: {0}")]
    InvalidHex(String),

    /// Decoded secret does not fit the on-device secret field.
    #[error("secret is {len} bytes, maximum is {max}")]
    SecretTooLong {
        /// Decoded length in bytes.
        len: usize,
        /// Capacity of the target field.
        max: usize,
    },
}
