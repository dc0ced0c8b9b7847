//! Slot model: OTP slots, Password Safe slots and the config register.
//!
//! [`SlotStore`] is the authoritative state a token keeps (secrets included)
//! and is driven by the software token. [`SlotMirror`] is the secret-free
//! view the dispatcher keeps of what it has written and read back.

use std::array;

use nk_otp_core::{hotp_value, time_step, OtpAlgorithm, OtpDigits, SecretBuffer};
use serde::{Deserialize, Serialize};

use crate::error::{LibraryError, StatusCode};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

pub const HOTP_SLOT_COUNT: u8 = 3;
pub const TOTP_SLOT_COUNT: u8 = 15;
pub const PWS_SLOT_COUNT: u8 = 16;

/// OTP slot name field width.
pub const SLOT_NAME_LEN: usize = 15;
/// Token id field width on the wire.
pub const TOKEN_ID_FIELD_LEN: usize = 13;
/// Longest token id accepted from callers; the last byte stays NUL.
pub const TOKEN_ID_MAX_LEN: usize = 12;

pub const PWS_NAME_LEN: usize = 11;
pub const PWS_LOGIN_LEN: usize = 32;
pub const PWS_PASSWORD_LEN: usize = 20;

/// Size of the general config register.
pub const CONFIG_LEN: usize = 5;

const HOTP_SLOT_BASE: u8 = 0x10;
const TOTP_SLOT_BASE: u8 = 0x20;

// ---------------------------------------------------------------------------
// Slot addressing
// ---------------------------------------------------------------------------

/// Family of an OTP slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OtpKind {
    Hotp,
    Totp,
}

impl OtpKind {
    #[must_use]
    pub const fn capacity(self) -> u8 {
        match self {
            Self::Hotp => HOTP_SLOT_COUNT,
            Self::Totp => TOTP_SLOT_COUNT,
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Hotp => "HOTP",
            Self::Totp => "TOTP",
        }
    }

    const fn base(self) -> u8 {
        match self {
            Self::Hotp => HOTP_SLOT_BASE,
            Self::Totp => TOTP_SLOT_BASE,
        }
    }

    /// Device slot number for a zero-based index.
    ///
    /// # Errors
    ///
    /// [`LibraryError::InvalidSlot`] if `index` is out of range.
    pub const fn slot_number(self, index: u8) -> Result<u8, LibraryError> {
        if index >= self.capacity() {
            return Err(LibraryError::InvalidSlot {
                kind: self.label(),
                index,
            });
        }
        Ok(self.base() | index)
    }

    /// Inverse of [`slot_number`](Self::slot_number).
    #[must_use]
    pub const fn from_slot_number(number: u8) -> Option<(Self, u8)> {
        let index = number & 0x0F;
        let kind = match number & 0xF0 {
            HOTP_SLOT_BASE => Self::Hotp,
            TOTP_SLOT_BASE => Self::Totp,
            _ => return None,
        };
        if index < kind.capacity() {
            Some((kind, index))
        } else {
            None
        }
    }
}

/// Check a Password Safe index.
///
/// # Errors
///
/// [`LibraryError::InvalidSlot`] if `index` is out of range.
pub const fn check_pws_index(index: u8) -> Result<u8, LibraryError> {
    if index >= PWS_SLOT_COUNT {
        return Err(LibraryError::InvalidSlot {
            kind: "password safe",
            index,
        });
    }
    Ok(index)
}

// ---------------------------------------------------------------------------
// OTP slots
// ---------------------------------------------------------------------------

/// Per-slot flags, packed into one config byte on the wire.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotFlags {
    pub use_8_digits: bool,
    /// Send Enter after the code when typed as keystrokes.
    pub use_enter: bool,
    /// Prefix the code with the token id when typed.
    pub use_token_id: bool,
}

impl SlotFlags {
    const EIGHT_DIGITS: u8 = 0b001;
    const ENTER: u8 = 0b010;
    const TOKEN_ID: u8 = 0b100;

    #[must_use]
    pub const fn to_byte(self) -> u8 {
        let mut byte = 0;
        if self.use_8_digits {
            byte |= Self::EIGHT_DIGITS;
        }
        if self.use_enter {
            byte |= Self::ENTER;
        }
        if self.use_token_id {
            byte |= Self::TOKEN_ID;
        }
        byte
    }

    #[must_use]
    pub const fn from_byte(byte: u8) -> Self {
        Self {
            use_8_digits: byte & Self::EIGHT_DIGITS != 0,
            use_enter: byte & Self::ENTER != 0,
            use_token_id: byte & Self::TOKEN_ID != 0,
        }
    }

    #[must_use]
    pub const fn digits(self) -> OtpDigits {
        OtpDigits::from_flag(self.use_8_digits)
    }
}

/// A programmed OTP slot as the token stores it.
#[derive(Clone, Debug)]
pub struct OtpSlot {
    pub name: String,
    secret: SecretBuffer,
    /// HOTP: next counter value. TOTP: period in seconds.
    pub counter: u64,
    pub flags: SlotFlags,
    pub token_id: String,
}

impl OtpSlot {
    #[must_use]
    pub const fn secret(&self) -> &SecretBuffer {
        &self.secret
    }

    #[must_use]
    pub fn details(&self) -> SlotDetails {
        SlotDetails {
            name: self.name.clone(),
            flags: self.flags,
            token_id: self.token_id.clone(),
            counter: self.counter,
        }
    }
}

/// Everything needed to (re)program an OTP slot.
///
/// `secret: None` keeps the secret already in the slot.
#[derive(Clone, Debug)]
pub struct OtpSlotWrite {
    pub name: String,
    pub secret: Option<SecretBuffer>,
    pub counter: u64,
    pub flags: SlotFlags,
    pub token_id: String,
}

/// Read-back view of an OTP slot. Never carries the secret.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotDetails {
    pub name: String,
    pub flags: SlotFlags,
    pub token_id: String,
    /// HOTP counter, or TOTP period.
    pub counter: u64,
}

// ---------------------------------------------------------------------------
// Config register
// ---------------------------------------------------------------------------

/// The 5-byte general config register, kept verbatim.
///
/// Layout: numlock HOTP slot, capslock HOTP slot, scrolllock HOTP slot,
/// "enable user password" (OTP PIN protection), "delete user password".
/// A slot byte that is not a valid HOTP index disables that key binding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Config([u8; CONFIG_LEN]);

impl Config {
    #[must_use]
    pub const fn new(
        numlock: u8,
        capslock: u8,
        scrolllock: u8,
        enable_user_password: bool,
        delete_user_password: bool,
    ) -> Self {
        Self([
            numlock,
            capslock,
            scrolllock,
            enable_user_password as u8,
            delete_user_password as u8,
        ])
    }

    #[must_use]
    pub const fn from_bytes(bytes: [u8; CONFIG_LEN]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub const fn as_bytes(&self) -> [u8; CONFIG_LEN] {
        self.0
    }

    #[must_use]
    pub const fn numlock(&self) -> u8 {
        self.0[0]
    }

    #[must_use]
    pub const fn capslock(&self) -> u8 {
        self.0[1]
    }

    #[must_use]
    pub const fn scrolllock(&self) -> u8 {
        self.0[2]
    }

    /// OTP codes need a user temporary password.
    #[must_use]
    pub const fn otp_pin_protected(&self) -> bool {
        self.0[3] != 0
    }

    #[must_use]
    pub const fn delete_user_password(&self) -> bool {
        self.0[4] != 0
    }
}

impl Default for Config {
    fn default() -> Self {
        Self([0xFF, 0xFF, 0xFF, 0, 1])
    }
}

// ---------------------------------------------------------------------------
// Password Safe
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
pub struct PasswordSafeSlot {
    pub name: String,
    pub login: String,
    password: SecretBuffer,
}

impl PasswordSafeSlot {
    #[must_use]
    pub const fn password(&self) -> &SecretBuffer {
        &self.password
    }
}

/// Programmed flag per Password Safe slot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordSafeStatus([bool; PWS_SLOT_COUNT as usize]);

impl PasswordSafeStatus {
    #[must_use]
    pub fn from_bytes(bytes: [u8; PWS_SLOT_COUNT as usize]) -> Self {
        Self(bytes.map(|b| b != 0))
    }

    #[must_use]
    pub fn to_bytes(self) -> [u8; PWS_SLOT_COUNT as usize] {
        self.0.map(u8::from)
    }

    /// Bit `i` set when slot `i` is programmed.
    #[must_use]
    pub fn bitmap(self) -> u16 {
        self.0
            .iter()
            .enumerate()
            .filter(|(_, programmed)| **programmed)
            .fold(0u16, |acc, (i, _)| acc | 1u16.wrapping_shl(i as u32))
    }

    #[must_use]
    pub fn is_programmed(self, index: u8) -> bool {
        self.0.get(usize::from(index)).copied().unwrap_or(false)
    }

    fn set(&mut self, index: u8, programmed: bool) {
        if let Some(flag) = self.0.get_mut(usize::from(index)) {
            *flag = programmed;
        }
    }
}

// ---------------------------------------------------------------------------
// SlotStore (token side)
// ---------------------------------------------------------------------------

/// Authoritative slot state of one token.
#[derive(Debug)]
pub struct SlotStore {
    hotp: [Option<OtpSlot>; HOTP_SLOT_COUNT as usize],
    totp: [Option<OtpSlot>; TOTP_SLOT_COUNT as usize],
    pws: [Option<PasswordSafeSlot>; PWS_SLOT_COUNT as usize],
    config: Config,
}

impl Default for SlotStore {
    fn default() -> Self {
        Self {
            hotp: array::from_fn(|_| None),
            totp: array::from_fn(|_| None),
            pws: array::from_fn(|_| None),
            config: Config::default(),
        }
    }
}

impl SlotStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self, kind: OtpKind) -> &[Option<OtpSlot>] {
        match kind {
            OtpKind::Hotp => &self.hotp,
            OtpKind::Totp => &self.totp,
        }
    }

    fn entry_mut(&mut self, kind: OtpKind, index: u8) -> Result<&mut Option<OtpSlot>, StatusCode> {
        let table: &mut [Option<OtpSlot>] = match kind {
            OtpKind::Hotp => &mut self.hotp,
            OtpKind::Totp => &mut self.totp,
        };
        table
            .get_mut(usize::from(index))
            .ok_or(StatusCode::WrongSlot)
    }

    /// # Errors
    ///
    /// `WrongSlot` for a bad index, `NotProgrammed` for an empty slot.
    pub fn otp(&self, kind: OtpKind, index: u8) -> Result<&OtpSlot, StatusCode> {
        self.table(kind)
            .get(usize::from(index))
            .ok_or(StatusCode::WrongSlot)?
            .as_ref()
            .ok_or(StatusCode::NotProgrammed)
    }

    /// Program a slot, resetting its counter to `write.counter`.
    ///
    /// # Errors
    ///
    /// - `WrongSlot` for a bad index
    /// - `NoNameError` for an empty name
    /// - `NotSupported` for a TOTP period of zero
    /// - `NotProgrammed` when no secret is given and the slot holds none
    pub fn write_otp(
        &mut self,
        kind: OtpKind,
        index: u8,
        write: OtpSlotWrite,
    ) -> Result<(), StatusCode> {
        if write.name.is_empty() {
            return Err(StatusCode::NoNameError);
        }
        if kind == OtpKind::Totp && write.counter == 0 {
            return Err(StatusCode::NotSupported);
        }
        let entry = self.entry_mut(kind, index)?;
        let secret = match (write.secret, entry.take()) {
            (Some(secret), _) => secret,
            (None, Some(previous)) => previous.secret,
            (None, None) => return Err(StatusCode::NotProgrammed),
        };
        *entry = Some(OtpSlot {
            name: write.name,
            secret,
            counter: write.counter,
            flags: write.flags,
            token_id: write.token_id,
        });
        Ok(())
    }

    /// Erasing an empty slot succeeds.
    ///
    /// # Errors
    ///
    /// `WrongSlot` for a bad index.
    pub fn erase_otp(&mut self, kind: OtpKind, index: u8) -> Result<(), StatusCode> {
        *self.entry_mut(kind, index)? = None;
        Ok(())
    }

    /// Current HOTP value of a slot, then advance its counter by one.
    ///
    /// The counter never moves past `max_counter`; a slot resting there is
    /// exhausted.
    ///
    /// # Errors
    ///
    /// `WrongSlot`, `NotProgrammed`, `NotSupported` for an exhausted counter,
    /// or `UnknownError` if the stored secret cannot key an HMAC.
    pub fn next_hotp(
        &mut self,
        index: u8,
        max_counter: u64,
    ) -> Result<(u32, SlotFlags), StatusCode> {
        let slot = self
            .entry_mut(OtpKind::Hotp, index)?
            .as_mut()
            .ok_or(StatusCode::NotProgrammed)?;
        if slot.counter >= max_counter {
            return Err(StatusCode::NotSupported);
        }
        let code = hotp_value(
            slot.secret.expose(),
            slot.counter,
            slot.flags.digits(),
            OtpAlgorithm::Sha1,
        )
        .map_err(|_| StatusCode::UnknownError)?;
        slot.counter = slot.counter.saturating_add(1);
        Ok((code, slot.flags))
    }

    /// TOTP value of a slot at `time`, using the slot's own period.
    ///
    /// # Errors
    ///
    /// `WrongSlot`, `NotProgrammed`, or `UnknownError` for an unusable secret
    /// or period.
    pub fn totp(&self, index: u8, time: u64) -> Result<(u32, SlotFlags), StatusCode> {
        let slot = self.otp(OtpKind::Totp, index)?;
        let period = u32::try_from(slot.counter).map_err(|_| StatusCode::UnknownError)?;
        let step = time_step(time, period).map_err(|_| StatusCode::UnknownError)?;
        let code = hotp_value(
            slot.secret.expose(),
            step,
            slot.flags.digits(),
            OtpAlgorithm::Sha1,
        )
        .map_err(|_| StatusCode::UnknownError)?;
        Ok((code, slot.flags))
    }

    #[must_use]
    pub const fn config(&self) -> Config {
        self.config
    }

    pub fn set_config(&mut self, config: Config) {
        self.config = config;
    }

    fn pws_entry_mut(&mut self, index: u8) -> Result<&mut Option<PasswordSafeSlot>, StatusCode> {
        self.pws
            .get_mut(usize::from(index))
            .ok_or(StatusCode::WrongSlot)
    }

    /// `Ok(None)` for an unprogrammed slot.
    ///
    /// # Errors
    ///
    /// `WrongSlot` for a bad index.
    pub fn password_safe(&self, index: u8) -> Result<Option<&PasswordSafeSlot>, StatusCode> {
        self.pws
            .get(usize::from(index))
            .map(Option::as_ref)
            .ok_or(StatusCode::WrongSlot)
    }

    /// First half of a Password Safe write: name and password.
    ///
    /// # Errors
    ///
    /// `WrongSlot` for a bad index.
    pub fn write_password_safe_primary(
        &mut self,
        index: u8,
        name: String,
        password: SecretBuffer,
    ) -> Result<(), StatusCode> {
        let entry = self.pws_entry_mut(index)?;
        let login = entry.take().map(|slot| slot.login).unwrap_or_default();
        *entry = Some(PasswordSafeSlot {
            name,
            login,
            password,
        });
        Ok(())
    }

    /// Second half of a Password Safe write: the login.
    ///
    /// # Errors
    ///
    /// `WrongSlot` for a bad index.
    pub fn write_password_safe_login(&mut self, index: u8, login: String) -> Result<(), StatusCode> {
        let entry = self.pws_entry_mut(index)?;
        if let Some(slot) = entry.as_mut() {
            slot.login = login;
        } else {
            *entry = Some(PasswordSafeSlot {
                name: String::new(),
                login,
                password: SecretBuffer::new(&[]),
            });
        }
        Ok(())
    }

    /// # Errors
    ///
    /// `WrongSlot` for a bad index.
    pub fn erase_password_safe(&mut self, index: u8) -> Result<(), StatusCode> {
        *self.pws_entry_mut(index)? = None;
        Ok(())
    }

    #[must_use]
    pub fn password_safe_status(&self) -> PasswordSafeStatus {
        PasswordSafeStatus(self.pws.each_ref().map(Option::is_some))
    }

    /// Drop every Password Safe slot. OTP slots are untouched.
    pub fn clear_password_safe(&mut self) {
        self.pws = array::from_fn(|_| None);
    }

    /// Factory state: no slots, default config.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

// ---------------------------------------------------------------------------
// SlotMirror (host side)
// ---------------------------------------------------------------------------

/// What the host knows about the token's slots from its own round trips.
///
/// Updated only after a command completed successfully.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SlotMirror {
    hotp: [Option<SlotDetails>; HOTP_SLOT_COUNT as usize],
    totp: [Option<SlotDetails>; TOTP_SLOT_COUNT as usize],
    password_safe: Option<PasswordSafeStatus>,
    config: Option<Config>,
}

impl SlotMirror {
    fn table_mut(&mut self, kind: OtpKind) -> &mut [Option<SlotDetails>] {
        match kind {
            OtpKind::Hotp => &mut self.hotp,
            OtpKind::Totp => &mut self.totp,
        }
    }

    #[must_use]
    pub fn slot(&self, kind: OtpKind, index: u8) -> Option<&SlotDetails> {
        let table: &[Option<SlotDetails>] = match kind {
            OtpKind::Hotp => &self.hotp,
            OtpKind::Totp => &self.totp,
        };
        table.get(usize::from(index)).and_then(Option::as_ref)
    }

    #[must_use]
    pub const fn config(&self) -> Option<Config> {
        self.config
    }

    #[must_use]
    pub const fn password_safe(&self) -> Option<PasswordSafeStatus> {
        self.password_safe
    }

    pub(crate) fn record_slot(&mut self, kind: OtpKind, index: u8, details: SlotDetails) {
        if let Some(entry) = self.table_mut(kind).get_mut(usize::from(index)) {
            *entry = Some(details);
        }
    }

    pub(crate) fn record_erase(&mut self, kind: OtpKind, index: u8) {
        if let Some(entry) = self.table_mut(kind).get_mut(usize::from(index)) {
            *entry = None;
        }
    }

    pub(crate) fn record_hotp_use(&mut self, index: u8) {
        if let Some(Some(details)) = self.hotp.get_mut(usize::from(index)) {
            details.counter = details.counter.wrapping_add(1);
        }
    }

    pub(crate) fn record_config(&mut self, config: Config) {
        self.config = Some(config);
    }

    pub(crate) fn record_password_safe(&mut self, status: PasswordSafeStatus) {
        self.password_safe = Some(status);
    }

    pub(crate) fn record_password_safe_slot(&mut self, index: u8, programmed: bool) {
        if let Some(status) = self.password_safe.as_mut() {
            status.set(index, programmed);
        }
    }

    /// Password Safe contents are no longer known.
    pub(crate) fn forget_password_safe(&mut self) {
        self.password_safe = None;
    }

    pub(crate) fn clear(&mut self) {
        *self = Self::default();
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
