//! Host-side client for Nitrokey-style OTP tokens.
//!
//! A [`Device`] turns typed calls into 65-byte reports, sends them through a
//! [`Transport`], checks the answer and latches a [`StatusCode`]. The token
//! side (PIN session, HOTP/TOTP slots, Password Safe, config register) is
//! modelled by [`SoftToken`], an in-memory [`Transport`] used for tests and
//! offline tooling.
//!
//! PINs and secrets travel as [`nk_otp_core::SecretBuffer`] and are zeroized
//! on drop. They are never logged.

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::arithmetic_side_effects))]

pub mod capabilities;
pub mod codec;
pub mod device;
pub mod error;
pub mod options;
pub mod session;
pub mod slots;
pub mod soft_token;
pub mod transport;

pub use capabilities::{Capabilities, CounterEncoding, FirmwareVersion};
pub use device::{CommandOutcome, Device, DeviceStatus, OtpSlotData, SharedDevice};
pub use error::{Error, LibraryError, Result, StatusCode};
pub use options::ClientOptions;
pub use session::Role;
pub use slots::{Config, OtpKind, PasswordSafeStatus, SlotDetails, SlotFlags};
pub use soft_token::{SoftToken, SoftTokenConfig};
pub use transport::{Transport, TransportError};
