//! `nk-otp-core`: one-time password derivation for USB security tokens.
//!
//! Pure functions only: no device I/O, no hidden state. Everything here can be
//! checked against the RFC 4226 / RFC 6238 vectors without a token attached.

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::arithmetic_side_effects))]

pub mod error;
pub mod hex;
pub mod memory;
pub mod otp;

pub use error::OtpError;
pub use hex::{decode_secret, LEGACY_SECRET_LEN, MAX_SECRET_LEN};
pub use memory::{constant_time_eq, SecretBuffer};
pub use otp::{
    derive_code, format_code, generate_hotp, generate_totp, hotp_value, time_step, MovingFactor,
    OtpAlgorithm, OtpDigits, DEFAULT_PERIOD,
};
