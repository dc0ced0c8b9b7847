//! Feature set of the connected token, derived once from its firmware version.
//!
//! Nothing else in the crate compares version numbers.

use std::fmt;

use nk_otp_core::{LEGACY_SECRET_LEN, MAX_SECRET_LEN};
use serde::{Deserialize, Serialize};

/// First 0.x firmware that stores HOTP counters as binary `u64`.
const BINARY_COUNTER_SINCE: u8 = 7;

/// First 0.x firmware that accepts 40-byte secrets.
const WIDE_SECRET_SINCE: u8 = 8;

/// Firmware version as reported by `GET_STATUS`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirmwareVersion {
    pub major: u8,
    pub minor: u8,
}

impl FirmwareVersion {
    #[must_use]
    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}.{}", self.major, self.minor)
    }
}

/// Counter encoding in `WRITE_TO_SLOT` and `READ_SLOT`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CounterEncoding {
    /// Little-endian `u64`.
    Binary,
    /// Up to 8 ASCII decimal digits, NUL padded.
    Ascii,
}

impl CounterEncoding {
    /// Largest HOTP counter the encoding can carry.
    #[must_use]
    pub const fn max_counter(self) -> u64 {
        match self {
            Self::Binary => u64::MAX,
            Self::Ascii => 99_999_999,
        }
    }
}

/// What the token can do.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    /// HOTP counters are 64-bit binary rather than ASCII decimal.
    pub has_binary_counter: bool,
    /// Secrets up to 40 bytes instead of 20.
    pub supports_320bit_secret: bool,
}

impl Capabilities {
    /// Everything current firmware supports.
    pub const FULL: Self = Self {
        has_binary_counter: true,
        supports_320bit_secret: true,
    };

    #[must_use]
    pub const fn detect(version: FirmwareVersion) -> Self {
        let modern = version.major > 0;
        Self {
            has_binary_counter: modern || version.minor >= BINARY_COUNTER_SINCE,
            supports_320bit_secret: modern || version.minor >= WIDE_SECRET_SINCE,
        }
    }

    /// Largest OTP secret the token stores, in bytes.
    #[must_use]
    pub const fn max_secret_len(self) -> usize {
        if self.supports_320bit_secret {
            MAX_SECRET_LEN
        } else {
            LEGACY_SECRET_LEN
        }
    }

    #[must_use]
    pub const fn counter_encoding(self) -> CounterEncoding {
        if self.has_binary_counter {
            CounterEncoding::Binary
        } else {
            CounterEncoding::Ascii
        }
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::FULL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_firmware_has_everything() {
        assert_eq!(Capabilities::detect(FirmwareVersion::new(0, 12)), Capabilities::FULL);
        assert_eq!(Capabilities::detect(FirmwareVersion::new(0, 8)), Capabilities::FULL);
        assert_eq!(Capabilities::detect(FirmwareVersion::new(1, 0)), Capabilities::FULL);
    }

    #[test]
    fn version_seven_lacks_wide_secrets_only() {
        let caps = Capabilities::detect(FirmwareVersion::new(0, 7));
        assert!(caps.has_binary_counter);
        assert!(!caps.supports_320bit_secret);
        assert_eq!(caps.max_secret_len(), 20);
    }

    #[test]
    fn legacy_firmware_uses_ascii_counters() {
        let caps = Capabilities::detect(FirmwareVersion::new(0, 6));
        assert_eq!(caps.counter_encoding(), CounterEncoding::Ascii);
        assert_eq!(caps.max_secret_len(), 20);
    }

    #[test]
    fn counter_ceiling_follows_encoding() {
        assert_eq!(CounterEncoding::Ascii.max_counter(), 99_999_999);
        assert_eq!(CounterEncoding::Binary.max_counter(), u64::MAX);
    }

    #[test]
    fn serializes_camel_case() {
        let json = serde_json::to_string(&Capabilities::FULL).unwrap();
        assert_eq!(
            json,
            r#"{"hasBinaryCounter":true,"supports320bitSecret":true}"#
        );
    }

    #[test]
    fn version_display() {
        assert_eq!(FirmwareVersion::new(0, 12).to_string(), "v0.12");
    }
}
