//! RFC 4226 HOTP and RFC 6238 TOTP derivation engine.
//!
//! Counters and time values are full 64-bit quantities here. Older firmware
//! that can only store 32-bit or decimal-string counters is a capability of
//! the device, not a limit of this engine.

use ring::hmac;

use crate::OtpError;

// ── Constants ───────────────────────────────────────────────────────

/// Default TOTP period in seconds (RFC 6238 §4).
pub const DEFAULT_PERIOD: u32 = 30;

// ── Types ───────────────────────────────────────────────────────────

/// HMAC algorithm used for OTP generation.
///
/// Tokens of this family only program HMAC-SHA1 slots.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OtpAlgorithm {
    /// HMAC-SHA1.
    #[default]
    Sha1,
}

impl OtpAlgorithm {
    /// Map to the corresponding `ring::hmac::Algorithm`.
    fn to_ring_algorithm(self) -> hmac::Algorithm {
        match self {
            Self::Sha1 => hmac::HMAC_SHA1_FOR_LEGACY_USE_ONLY,
        }
    }
}

/// Number of digits in an OTP code (6 or 8 only).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OtpDigits {
    /// 6-digit code (standard).
    #[default]
    Six,
    /// 8-digit code.
    Eight,
}

impl OtpDigits {
    /// Select the digit count from a slot's `use_8_digits` flag.
    #[must_use]
    pub const fn from_flag(use_8_digits: bool) -> Self {
        if use_8_digits {
            Self::Eight
        } else {
            Self::Six
        }
    }

    /// Return the numeric digit count.
    #[must_use]
    pub const fn value(self) -> u8 {
        match self {
            Self::Six => 6,
            Self::Eight => 8,
        }
    }

    /// Return the modulus value (10^digits) for truncation.
    #[must_use]
    const fn modulus(self) -> u32 {
        match self {
            Self::Six => 1_000_000,
            Self::Eight => 100_000_000,
        }
    }
}

/// The moving factor fed into HMAC: an event counter or a wall-clock time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MovingFactor {
    /// HOTP event counter.
    Counter(u64),
    /// TOTP Unix time in seconds and the step length.
    Time {
        /// Unix timestamp in seconds.
        time: u64,
        /// Time step in seconds.
        period: u32,
    },
}

// ── HOTP (RFC 4226) ────────────────────────────────────────────────

/// Compute the numeric HOTP value per RFC 4226, already reduced modulo
/// 10^digits.
///
/// This is the value a token reports on the wire; [`format_code`] turns it
/// into the caller-visible string.
///
/// # Errors
/// Returns [`OtpError::EmptySecret`] if the secret is empty.
pub fn hotp_value(
    secret: &[u8],
    counter: u64,
    digits: OtpDigits,
    algorithm: OtpAlgorithm,
) -> Result<u32, OtpError> {
    if secret.is_empty() {
        return Err(OtpError::EmptySecret);
    }

    // HMAC(K, C) where C is counter as 8-byte big-endian (RFC 4226 §5.2).
    // Trailing zero padding of K does not change the HMAC for keys shorter
    // than the hash block, so padded and unpadded secrets agree.
    let key = hmac::Key::new(algorithm.to_ring_algorithm(), secret);
    let tag = hmac::sign(&key, &counter.to_be_bytes());
    let hmac_result = tag.as_ref();

    // Dynamic Truncation (RFC 4226 §5.3).
    let offset = usize::from(hmac_result[hmac_result.len().wrapping_sub(1)] & 0x0F);
    let binary_code = u32::from_be_bytes([
        hmac_result[offset] & 0x7F,
        hmac_result[offset.wrapping_add(1)],
        hmac_result[offset.wrapping_add(2)],
        hmac_result[offset.wrapping_add(3)],
    ]);

    // modulus is always 1_000_000 or 100_000_000 (never zero).
    #[allow(clippy::arithmetic_side_effects)]
    let code = binary_code % digits.modulus();
    Ok(code)
}

/// Left-zero-pad a numeric code to the digit width.
#[must_use]
pub fn format_code(code: u32, digits: OtpDigits) -> String {
    let width = usize::from(digits.value());
    format!("{code:0>width$}")
}

/// Generate an HOTP code per RFC 4226.
///
/// # Arguments
/// - `secret`: Shared secret key bytes (from `SecretBuffer::expose()`)
/// - `counter`: 8-byte counter value (big-endian per RFC 4226 §5.2)
/// - `digits`: Number of output digits (6 or 8)
/// - `algorithm`: HMAC algorithm to use
///
/// # Errors
/// Returns [`OtpError::EmptySecret`] if the secret is empty.
#[must_use = "OTP code should be used or stored"]
pub fn generate_hotp(
    secret: &[u8],
    counter: u64,
    digits: OtpDigits,
    algorithm: OtpAlgorithm,
) -> Result<String, OtpError> {
    hotp_value(secret, counter, digits, algorithm).map(|code| format_code(code, digits))
}

// ── TOTP (RFC 6238) ────────────────────────────────────────────────

/// Compute the TOTP time step `T = floor(time / period)`.
///
/// # Errors
/// Returns [`OtpError::InvalidPeriod`] if `period` is 0.
pub fn time_step(time: u64, period: u32) -> Result<u64, OtpError> {
    time.checked_div(u64::from(period))
        .ok_or(OtpError::InvalidPeriod)
}

/// Generate a TOTP code per RFC 6238.
///
/// # Arguments
/// - `secret`: Shared secret key bytes
/// - `time`: Unix timestamp in seconds
/// - `digits`: Number of output digits (6 or 8)
/// - `period`: Time step in seconds (typically 30)
/// - `algorithm`: HMAC algorithm to use
///
/// # Errors
/// Returns [`OtpError::InvalidPeriod`] if `period` is 0 and
/// [`OtpError::EmptySecret`] if the secret is empty.
#[must_use = "OTP code should be used or stored"]
pub fn generate_totp(
    secret: &[u8],
    time: u64,
    digits: OtpDigits,
    period: u32,
    algorithm: OtpAlgorithm,
) -> Result<String, OtpError> {
    generate_hotp(secret, time_step(time, period)?, digits, algorithm)
}

/// Derive a code for either moving factor.
///
/// # Errors
/// Same as [`generate_hotp`] and [`generate_totp`].
#[must_use = "OTP code should be used or stored"]
pub fn derive_code(
    secret: &[u8],
    factor: MovingFactor,
    digits: OtpDigits,
    algorithm: OtpAlgorithm,
) -> Result<String, OtpError> {
    match factor {
        MovingFactor::Counter(counter) => generate_hotp(secret, counter, digits, algorithm),
        MovingFactor::Time { time, period } => {
            generate_totp(secret, time, digits, period, algorithm)
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────
