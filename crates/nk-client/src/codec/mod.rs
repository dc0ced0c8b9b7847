//! Report framing, CRC and fixed-width field access.
//!
//! # Report layout
//!
//! ```text
//! Request:  id (1) | command (1) | payload (59)                                     | CRC (4)
//! Response: id (1) | state (1)   | command (1) | request CRC (4) | status (1) | payload (53) | CRC (4)
//! ```
//!
//! - All integers are little-endian.
//! - The CRC covers bytes `1..61` and is the STM32 hardware CRC-32: polynomial
//!   `0x04C11DB7`, initial value `0xFFFF_FFFF`, fed one little-endian word at
//!   a time, no reflection, no final XOR.
//! - Text and PIN fields are NUL-padded to their width.
//!
//! Typed payloads live in [`command`] (host to token) and [`record`] (token
//! to host).

pub mod command;
pub mod record;

use crc::{Crc, CRC_32_MPEG_2};
use nk_otp_core::SecretBuffer;
use thiserror::Error;

use crate::error::LibraryError;
use crate::transport::TransportError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Size of every HID feature report exchanged with the token.
pub const REPORT_SIZE: usize = 65;

/// Command payload bytes in a request.
pub const REQUEST_PAYLOAD_SIZE: usize = 59;

/// Payload bytes in a response.
pub const RESPONSE_PAYLOAD_SIZE: usize = 53;

/// Offset of the trailing CRC in both directions.
const CRC_OFFSET: usize = 61;

const REQUEST_PAYLOAD_OFFSET: usize = 2;
const RESPONSE_PAYLOAD_OFFSET: usize = 8;

/// MPEG-2 CRC-32 has the STM32 parameters; only the word byte order differs.
const STM32_CRC: Crc<u32> = Crc::<u32>::new(&CRC_32_MPEG_2);

/// One raw report.
pub type Report = [u8; REPORT_SIZE];

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A report or payload that cannot be interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot decode {0}")]
pub struct DecodeError(pub String);

impl From<DecodeError> for TransportError {
    fn from(err: DecodeError) -> Self {
        Self::Malformed(err.0)
    }
}

// ---------------------------------------------------------------------------
// Command ids
// ---------------------------------------------------------------------------

/// Command byte of a request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CommandId {
    GetStatus = 0x00,
    WriteToSlot = 0x01,
    ReadSlotName = 0x02,
    ReadSlot = 0x03,
    GetCode = 0x04,
    WriteConfig = 0x05,
    EraseSlot = 0x06,
    FirstAuthenticate = 0x07,
    GetPasswordRetryCount = 0x09,
    SetTime = 0x0B,
    UserAuthenticate = 0x0E,
    GetUserPasswordRetryCount = 0x0F,
    UnlockUserPassword = 0x11,
    LockDevice = 0x12,
    FactoryReset = 0x13,
    ChangeUserPin = 0x14,
    ChangeAdminPin = 0x15,
    SendOtpData = 0x17,
    GetPwSafeSlotStatus = 0x60,
    GetPwSafeSlotName = 0x61,
    GetPwSafeSlotPassword = 0x62,
    GetPwSafeSlotLogin = 0x63,
    SetPwSafeSlotData1 = 0x64,
    SetPwSafeSlotData2 = 0x65,
    PwSafeEraseSlot = 0x66,
    PwSafeEnable = 0x67,
    DetectScAes = 0x6A,
    NewAesKey = 0x6B,
}

impl CommandId {
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for CommandId {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0x00 => Self::GetStatus,
            0x01 => Self::WriteToSlot,
            0x02 => Self::ReadSlotName,
            0x03 => Self::ReadSlot,
            0x04 => Self::GetCode,
            0x05 => Self::WriteConfig,
            0x06 => Self::EraseSlot,
            0x07 => Self::FirstAuthenticate,
            0x09 => Self::GetPasswordRetryCount,
            0x0B => Self::SetTime,
            0x0E => Self::UserAuthenticate,
            0x0F => Self::GetUserPasswordRetryCount,
            0x11 => Self::UnlockUserPassword,
            0x12 => Self::LockDevice,
            0x13 => Self::FactoryReset,
            0x14 => Self::ChangeUserPin,
            0x15 => Self::ChangeAdminPin,
            0x17 => Self::SendOtpData,
            0x60 => Self::GetPwSafeSlotStatus,
            0x61 => Self::GetPwSafeSlotName,
            0x62 => Self::GetPwSafeSlotPassword,
            0x63 => Self::GetPwSafeSlotLogin,
            0x64 => Self::SetPwSafeSlotData1,
            0x65 => Self::SetPwSafeSlotData2,
            0x66 => Self::PwSafeEraseSlot,
            0x67 => Self::PwSafeEnable,
            0x6A => Self::DetectScAes,
            0x6B => Self::NewAesKey,
            other => return Err(other),
        })
    }
}

// ---------------------------------------------------------------------------
// CRC
// ---------------------------------------------------------------------------

/// STM32 hardware CRC-32 over `data`, consumed as little-endian words.
///
/// A trailing partial word is zero-extended.
#[must_use]
pub fn stm_crc32(data: &[u8]) -> u32 {
    let mut digest = STM32_CRC.digest();
    for chunk in data.chunks(4) {
        let mut word = [0u8; 4];
        word[..chunk.len()].copy_from_slice(chunk);
        digest.update(&u32::from_le_bytes(word).to_be_bytes());
    }
    digest.finalize()
}

fn report_crc(report: &Report) -> u32 {
    stm_crc32(&report[1..CRC_OFFSET])
}

fn stored_crc(report: &Report) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&report[CRC_OFFSET..REPORT_SIZE]);
    u32::from_le_bytes(buf)
}

fn seal(report: &mut Report) -> u32 {
    let crc = report_crc(report);
    report[CRC_OFFSET..REPORT_SIZE].copy_from_slice(&crc.to_le_bytes());
    crc
}

// ---------------------------------------------------------------------------
// Frames
// ---------------------------------------------------------------------------

/// Host-to-token frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Request {
    pub command: u8,
    pub payload: [u8; REQUEST_PAYLOAD_SIZE],
}

impl Request {
    /// Serialize and seal with a CRC. Returns the report and that CRC, which
    /// the response must echo.
    #[must_use]
    pub fn to_report(&self) -> (Report, u32) {
        let mut report = [0u8; REPORT_SIZE];
        report[1] = self.command;
        report[REQUEST_PAYLOAD_OFFSET..CRC_OFFSET].copy_from_slice(&self.payload);
        let crc = seal(&mut report);
        (report, crc)
    }

    /// Parse a request report. Returns the frame and its stored CRC.
    ///
    /// # Errors
    ///
    /// [`DecodeError`] if the stored CRC does not match the contents.
    pub fn from_report(report: &Report) -> Result<(Self, u32), DecodeError> {
        let crc = stored_crc(report);
        let computed = report_crc(report);
        if crc != computed {
            return Err(DecodeError(format!(
                "request with CRC {crc:#010x}, computed {computed:#010x}"
            )));
        }
        let mut payload = [0u8; REQUEST_PAYLOAD_SIZE];
        payload.copy_from_slice(&report[REQUEST_PAYLOAD_OFFSET..CRC_OFFSET]);
        Ok((
            Self {
                command: report[1],
                payload,
            },
            crc,
        ))
    }
}

/// Device-status byte of a response.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum DeviceState {
    Ok = 0,
    Busy = 1,
    Error = 2,
    ReceivedReport = 3,
}

impl TryFrom<u8> for DeviceState {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, DecodeError> {
        match value {
            0 => Ok(Self::Ok),
            1 => Ok(Self::Busy),
            2 => Ok(Self::Error),
            3 => Ok(Self::ReceivedReport),
            other => Err(DecodeError(format!("device state {other}"))),
        }
    }
}

/// Token-to-host frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Response {
    pub device_state: DeviceState,
    pub command: u8,
    /// CRC of the request this answers.
    pub request_crc: u32,
    /// Raw last-command-status byte.
    pub status: u8,
    pub payload: [u8; RESPONSE_PAYLOAD_SIZE],
}

impl Response {
    #[must_use]
    pub fn to_report(&self) -> Report {
        let mut report = [0u8; REPORT_SIZE];
        report[1] = self.device_state as u8;
        report[2] = self.command;
        report[3..7].copy_from_slice(&self.request_crc.to_le_bytes());
        report[7] = self.status;
        report[RESPONSE_PAYLOAD_OFFSET..CRC_OFFSET].copy_from_slice(&self.payload);
        seal(&mut report);
        report
    }

    /// Parse a response report.
    ///
    /// # Errors
    ///
    /// - [`TransportError::CrcMismatch`] when `verify_crc` is set and the
    ///   stored CRC is wrong
    /// - [`TransportError::Malformed`] for an unknown device-state byte
    pub fn from_report(report: &Report, verify_crc: bool) -> Result<Self, TransportError> {
        if verify_crc {
            let actual = stored_crc(report);
            let expected = report_crc(report);
            if actual != expected {
                return Err(TransportError::CrcMismatch { expected, actual });
            }
        }
        let mut crc = [0u8; 4];
        crc.copy_from_slice(&report[3..7]);
        let mut payload = [0u8; RESPONSE_PAYLOAD_SIZE];
        payload.copy_from_slice(&report[RESPONSE_PAYLOAD_OFFSET..CRC_OFFSET]);
        Ok(Self {
            device_state: DeviceState::try_from(report[1])?,
            command: report[2],
            request_crc: u32::from_le_bytes(crc),
            status: report[7],
            payload,
        })
    }
}

// ---------------------------------------------------------------------------
// Field cursors
// ---------------------------------------------------------------------------

/// Sequential writer over a fixed payload buffer.
pub struct FieldWriter<const N: usize> {
    buf: [u8; N],
    cursor: usize,
}

impl<const N: usize> FieldWriter<N> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            buf: [0u8; N],
            cursor: 0,
        }
    }

    fn slot(&mut self, field: &'static str, width: usize) -> Result<&mut [u8], LibraryError> {
        let end = self
            .cursor
            .checked_add(width)
            .filter(|end| *end <= N)
            .ok_or(LibraryError::TooLongString {
                field,
                len: width,
                max: N.saturating_sub(self.cursor),
            })?;
        let start = self.cursor;
        self.cursor = end;
        Ok(&mut self.buf[start..end])
    }

    /// # Errors
    ///
    /// Only if the layout overflows the payload.
    pub fn u8(&mut self, field: &'static str, value: u8) -> Result<&mut Self, LibraryError> {
        self.slot(field, 1)?[0] = value;
        Ok(self)
    }

    /// # Errors
    ///
    /// Only if the layout overflows the payload.
    pub fn u32(&mut self, field: &'static str, value: u32) -> Result<&mut Self, LibraryError> {
        self.slot(field, 4)?.copy_from_slice(&value.to_le_bytes());
        Ok(self)
    }

    /// # Errors
    ///
    /// Only if the layout overflows the payload.
    pub fn u64(&mut self, field: &'static str, value: u64) -> Result<&mut Self, LibraryError> {
        self.slot(field, 8)?.copy_from_slice(&value.to_le_bytes());
        Ok(self)
    }

    /// Write `data` NUL-padded to `width`.
    ///
    /// # Errors
    ///
    /// [`LibraryError::TooLongString`] if `data` is longer than `width`.
    pub fn bytes(
        &mut self,
        field: &'static str,
        data: &[u8],
        width: usize,
    ) -> Result<&mut Self, LibraryError> {
        if data.len() > width {
            return Err(LibraryError::TooLongString {
                field,
                len: data.len(),
                max: width,
            });
        }
        self.slot(field, width)?[..data.len()].copy_from_slice(data);
        Ok(self)
    }

    #[must_use]
    pub const fn finish(self) -> [u8; N] {
        self.buf
    }
}

impl<const N: usize> Default for FieldWriter<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Sequential reader over a payload.
pub struct FieldReader<'a> {
    data: &'a [u8],
    cursor: usize,
}

impl<'a> FieldReader<'a> {
    #[must_use]
    pub const fn new(data: &'a [u8]) -> Self {
        Self { data, cursor: 0 }
    }

    /// Take the next `width` bytes, advancing the cursor.
    ///
    /// # Errors
    ///
    /// [`DecodeError`] if fewer than `width` bytes remain.
    pub fn take(&mut self, width: usize) -> Result<&'a [u8], DecodeError> {
        let end = self
            .cursor
            .checked_add(width)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| {
                DecodeError(format!(
                    "{width} bytes at offset {} of {}",
                    self.cursor,
                    self.data.len()
                ))
            })?;
        let field = &self.data[self.cursor..end];
        self.cursor = end;
        Ok(field)
    }

    /// # Errors
    ///
    /// [`DecodeError`] if the payload is exhausted.
    pub fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    /// # Errors
    ///
    /// [`DecodeError`] if the payload is exhausted.
    pub fn u32(&mut self) -> Result<u32, DecodeError> {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(buf))
    }

    /// # Errors
    ///
    /// [`DecodeError`] if the payload is exhausted.
    pub fn u64(&mut self) -> Result<u64, DecodeError> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(buf))
    }

    /// Fixed array of `N` bytes.
    ///
    /// # Errors
    ///
    /// [`DecodeError`] if the payload is exhausted.
    pub fn array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let mut buf = [0u8; N];
        buf.copy_from_slice(self.take(N)?);
        Ok(buf)
    }

    /// NUL-terminated text field of `width` bytes.
    ///
    /// # Errors
    ///
    /// [`DecodeError`] if the payload is exhausted.
    pub fn text(&mut self, width: usize) -> Result<String, DecodeError> {
        Ok(String::from_utf8_lossy(until_nul(self.take(width)?)).into_owned())
    }

    /// NUL-terminated credential field of `width` bytes.
    ///
    /// # Errors
    ///
    /// [`DecodeError`] if the payload is exhausted.
    pub fn secret(&mut self, width: usize) -> Result<SecretBuffer, DecodeError> {
        Ok(SecretBuffer::new(until_nul(self.take(width)?)))
    }
}

/// Prefix of `field` before the first NUL.
#[must_use]
pub fn until_nul(field: &[u8]) -> &[u8] {
    field
        .iter()
        .position(|b| *b == 0)
        .map_or(field, |end| &field[..end])
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc_matches_stm32_reference_values() {
        assert_eq!(stm_crc32(&[0, 0, 0, 0]), 0xC704_DD7B);
        assert_eq!(stm_crc32(&0x1234_5678_u32.to_le_bytes()), 0xDF8A_8A2B);
        assert_eq!(stm_crc32(&[0u8; 60]), 0xEF6E_B7DF);
    }

    #[test]
    fn crc_partial_word_is_zero_extended() {
        assert_eq!(stm_crc32(&[0x78, 0x56]), stm_crc32(&[0x78, 0x56, 0, 0]));
        assert_eq!(stm_crc32(&[]), 0xFFFF_FFFF);
    }

    #[test]
    fn request_report_layout() {
        let mut payload = [0u8; REQUEST_PAYLOAD_SIZE];
        payload[0] = 0xAB;
        let request = Request {
            command: CommandId::LockDevice.as_u8(),
            payload,
        };
        let (report, crc) = request.to_report();
        assert_eq!(report[0], 0, "report id");
        assert_eq!(report[1], 0x12);
        assert_eq!(report[2], 0xAB);
        assert_eq!(&report[61..65], &crc.to_le_bytes());

        let (parsed, parsed_crc) = Request::from_report(&report).unwrap();
        assert_eq!(parsed, request);
        assert_eq!(parsed_crc, crc);
    }

    #[test]
    fn bare_lock_device_request_crc() {
        let request = Request {
            command: CommandId::LockDevice.as_u8(),
            payload: [0u8; REQUEST_PAYLOAD_SIZE],
        };
        assert_eq!(request.to_report().1, 0x49C6_5D45);
    }

    #[test]
    fn corrupted_request_is_rejected() {
        let (mut report, _) = Request {
            command: 0x00,
            payload: [0u8; REQUEST_PAYLOAD_SIZE],
        }
        .to_report();
        report[10] ^= 0x01;
        assert!(Request::from_report(&report).is_err());
    }

    #[test]
    fn response_report_layout() {
        let mut payload = [0u8; RESPONSE_PAYLOAD_SIZE];
        payload[52] = 0x7F;
        let response = Response {
            device_state: DeviceState::Ok,
            command: 0x04,
            request_crc: 0xDEAD_BEEF,
            status: 3,
            payload,
        };
        let report = response.to_report();
        assert_eq!(report[1], 0);
        assert_eq!(report[2], 0x04);
        assert_eq!(&report[3..7], &[0xEF, 0xBE, 0xAD, 0xDE]);
        assert_eq!(report[7], 3);
        assert_eq!(report[60], 0x7F);
        assert_eq!(Response::from_report(&report, true).unwrap(), response);
    }

    #[test]
    fn response_crc_checked_only_when_asked() {
        let mut report = Response {
            device_state: DeviceState::Ok,
            command: 0x00,
            request_crc: 0,
            status: 0,
            payload: [0u8; RESPONSE_PAYLOAD_SIZE],
        }
        .to_report();
        report[20] = 0x55;
        assert!(matches!(
            Response::from_report(&report, true),
            Err(TransportError::CrcMismatch { .. })
        ));
        assert_eq!(Response::from_report(&report, false).unwrap().payload[12], 0x55);
    }

    #[test]
    fn unknown_device_state_is_malformed() {
        let mut report = [0u8; REPORT_SIZE];
        report[1] = 9;
        assert!(matches!(
            Response::from_report(&report, false),
            Err(TransportError::Malformed(_))
        ));
    }

    #[test]
    fn command_ids_round_trip() {
        for id in [0x00u8, 0x01, 0x0B, 0x17, 0x60, 0x67, 0x6B] {
            assert_eq!(CommandId::try_from(id).unwrap().as_u8(), id);
        }
        assert_eq!(CommandId::try_from(0x08), Err(0x08));
        assert_eq!(CommandId::try_from(0xFF), Err(0xFF));
    }

    #[test]
    fn writer_pads_and_bounds_fields() {
        let mut writer = FieldWriter::<8>::new();
        writer.bytes("name", b"ab", 4).unwrap().u8("flag", 7).unwrap();
        assert_eq!(&writer.finish()[..5], &[b'a', b'b', 0, 0, 7]);

        let mut writer = FieldWriter::<8>::new();
        assert_eq!(
            writer.bytes("name", b"abcde", 4).err(),
            Some(LibraryError::TooLongString {
                field: "name",
                len: 5,
                max: 4
            })
        );
    }

    #[test]
    fn writer_refuses_to_overflow_the_payload() {
        let mut writer = FieldWriter::<4>::new();
        writer.u32("word", 1).unwrap();
        assert!(writer.u8("extra", 1).is_err());
    }

    #[test]
    fn reader_stops_text_at_nul() {
        let data = [b'h', b'i', 0, b'x', 0x2A, 0, 0, 0];
        let mut reader = FieldReader::new(&data);
        assert_eq!(reader.text(4).unwrap(), "hi");
        assert_eq!(reader.u32().unwrap(), 0x2A);
        assert!(reader.u8().is_err());
    }

    #[test]
    fn full_width_text_has_no_terminator() {
        let mut reader = FieldReader::new(b"abcd");
        assert_eq!(reader.text(4).unwrap(), "abcd");
    }
}
