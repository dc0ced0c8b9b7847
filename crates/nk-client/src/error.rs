//! Status codes and error types for `nk-client`.
//!
//! Every dispatched command ends in exactly one [`StatusCode`]. Device
//! failures, local precondition failures and transport failures are kept
//! apart in [`Error`] but all of them collapse to a status for the latch.

use std::fmt;

use nk_otp_core::OtpError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::codec::DecodeError;
use crate::transport::TransportError;

/// Outcome code of a command, as latched by the dispatcher.
///
/// Values 0..=14 are reported by the device, 100 and 255 describe the
/// channel, 200..=203 are raised by this library before anything is sent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusCode {
    Ok,
    /// Request CRC rejected by the device.
    WrongCrc,
    WrongSlot,
    NotProgrammed,
    WrongPassword,
    NotAuthorized,
    TimestampWarning,
    NoNameError,
    NotSupported,
    UnknownCommand,
    AesDecryptionFailed,
    AesCreateKeyFailed,
    ErrorChangingUserPassword,
    ErrorChangingAdminPassword,
    ErrorUnblockingPin,
    /// Device-status byte said busy. Shares the wire value of `WrongCrc`.
    Busy,
    UnknownError,
    Disconnected,
    TooLongString,
    InvalidSlot,
    InvalidHexString,
    TargetBufferSmallerThanSource,
}

impl StatusCode {
    /// Decode the last-command-status byte of a response.
    ///
    /// Unrecognised values become [`StatusCode::UnknownError`].
    #[must_use]
    pub const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Ok,
            1 => Self::WrongCrc,
            2 => Self::WrongSlot,
            3 => Self::NotProgrammed,
            4 => Self::WrongPassword,
            5 => Self::NotAuthorized,
            6 => Self::TimestampWarning,
            7 => Self::NoNameError,
            8 => Self::NotSupported,
            9 => Self::UnknownCommand,
            10 => Self::AesDecryptionFailed,
            11 => Self::AesCreateKeyFailed,
            12 => Self::ErrorChangingUserPassword,
            13 => Self::ErrorChangingAdminPassword,
            14 => Self::ErrorUnblockingPin,
            255 => Self::Disconnected,
            200 => Self::TooLongString,
            201 => Self::InvalidSlot,
            202 => Self::InvalidHexString,
            203 => Self::TargetBufferSmallerThanSource,
            _ => Self::UnknownError,
        }
    }

    /// Numeric value, as found on the wire or in the C-style API.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::Ok => 0,
            Self::WrongCrc | Self::Busy => 1,
            Self::WrongSlot => 2,
            Self::NotProgrammed => 3,
            Self::WrongPassword => 4,
            Self::NotAuthorized => 5,
            Self::TimestampWarning => 6,
            Self::NoNameError => 7,
            Self::NotSupported => 8,
            Self::UnknownCommand => 9,
            Self::AesDecryptionFailed => 10,
            Self::AesCreateKeyFailed => 11,
            Self::ErrorChangingUserPassword => 12,
            Self::ErrorChangingAdminPassword => 13,
            Self::ErrorUnblockingPin => 14,
            Self::UnknownError => 100,
            Self::TooLongString => 200,
            Self::InvalidSlot => 201,
            Self::InvalidHexString => 202,
            Self::TargetBufferSmallerThanSource => 203,
            Self::Disconnected => 255,
        }
    }

    #[must_use]
    pub const fn is_ok(self) -> bool {
        matches!(self, Self::Ok)
    }

    /// `true` for codes raised locally, before any transport round trip.
    #[must_use]
    pub const fn is_library_error(self) -> bool {
        matches!(
            self,
            Self::TooLongString
                | Self::InvalidSlot
                | Self::InvalidHexString
                | Self::TargetBufferSmallerThanSource
        )
    }

    const fn description(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::WrongCrc => "wrong CRC",
            Self::WrongSlot => "wrong slot",
            Self::NotProgrammed => "slot not programmed",
            Self::WrongPassword => "wrong password",
            Self::NotAuthorized => "not authorized",
            Self::TimestampWarning => "timestamp warning",
            Self::NoNameError => "no name",
            Self::NotSupported => "not supported",
            Self::UnknownCommand => "unknown command",
            Self::AesDecryptionFailed => "AES decryption failed",
            Self::AesCreateKeyFailed => "AES key creation failed",
            Self::ErrorChangingUserPassword => "error changing user password",
            Self::ErrorChangingAdminPassword => "error changing admin password",
            Self::ErrorUnblockingPin => "error unblocking PIN",
            Self::Busy => "device busy",
            Self::UnknownError => "unknown error",
            Self::Disconnected => "device disconnected",
            Self::TooLongString => "string too long",
            Self::InvalidSlot => "invalid slot",
            Self::InvalidHexString => "invalid hex string",
            Self::TargetBufferSmallerThanSource => "target buffer smaller than source",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.description(), self.as_u8())
    }
}

/// Precondition failures detected locally. Nothing is sent to the device.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LibraryError {
    #[error("{field} is {len} bytes, maximum is {max}")]
    TooLongString {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("{kind} slot index {index} is out of range")]
    InvalidSlot { kind: &'static str, index: u8 },

    #[error("secret is not a valid hex string")]
    InvalidHexString,

    #[error("secret is {len} bytes, device accepts at most {max}")]
    TargetBufferSmallerThanSource { len: usize, max: usize },

    /// Password Safe commands need a prior successful `enable_password_safe`.
    #[error("password safe is not enabled")]
    PasswordSafeDisabled,
}

impl LibraryError {
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::TooLongString { .. } => StatusCode::TooLongString,
            Self::InvalidSlot { .. } => StatusCode::InvalidSlot,
            Self::InvalidHexString => StatusCode::InvalidHexString,
            Self::TargetBufferSmallerThanSource { .. } => {
                StatusCode::TargetBufferSmallerThanSource
            }
            Self::PasswordSafeDisabled => StatusCode::NotAuthorized,
        }
    }
}

/// Every way a dispatched command can fail.
#[derive(Debug, Error)]
pub enum Error {
    /// The device answered with a non-`Ok` status.
    #[error("device reported {0}")]
    Device(StatusCode),

    #[error(transparent)]
    Library(#[from] LibraryError),

    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),

    #[error("OTP engine error: {0}")]
    Otp(OtpError),
}

impl Error {
    /// Status code written into the last-command-status latch.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Device(status) => *status,
            Self::Library(err) => err.status(),
            Self::Transport(err) => err.status(),
            Self::Otp(_) => StatusCode::UnknownError,
        }
    }
}

impl From<OtpError> for Error {
    fn from(err: OtpError) -> Self {
        match err {
            OtpError::InvalidHex(_) => Self::Library(LibraryError::InvalidHexString),
            OtpError::SecretTooLong { len, max } => {
                Self::Library(LibraryError::TargetBufferSmallerThanSource { len, max })
            }
            other => Self::Otp(other),
        }
    }
}

impl From<DecodeError> for Error {
    fn from(err: DecodeError) -> Self {
        Self::Transport(err.into())
    }
}

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;
