//! Fixed-layout response records, token to host.

use super::command::{read_counter, write_counter};
use super::{DecodeError, FieldReader, FieldWriter, RESPONSE_PAYLOAD_SIZE};
use crate::capabilities::{CounterEncoding, FirmwareVersion};
use crate::error::LibraryError;
use crate::slots::{
    Config, PasswordSafeStatus, SlotDetails, SlotFlags, PWS_SLOT_COUNT, SLOT_NAME_LEN,
    TOKEN_ID_FIELD_LEN,
};

/// Response payload buffer.
pub type Payload = [u8; RESPONSE_PAYLOAD_SIZE];

type Writer = FieldWriter<RESPONSE_PAYLOAD_SIZE>;

/// `GET_STATUS` response.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatusRecord {
    pub firmware: FirmwareVersion,
    pub serial: [u8; 4],
    pub config: Config,
    pub otp_password_config: [u8; 2],
}

impl StatusRecord {
    /// # Errors
    ///
    /// Never for this layout; kept fallible like every writer.
    pub fn encode(&self) -> Result<Payload, LibraryError> {
        let mut w = Writer::new();
        w.u8("firmware minor", self.firmware.minor)?
            .u8("firmware major", self.firmware.major)?
            .bytes("serial", &self.serial, 4)?
            .bytes("config", &self.config.as_bytes(), 5)?
            .bytes("OTP password config", &self.otp_password_config, 2)?;
        Ok(w.finish())
    }

    /// # Errors
    ///
    /// [`DecodeError`] for a truncated payload.
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let mut r = FieldReader::new(payload);
        let minor = r.u8()?;
        let major = r.u8()?;
        Ok(Self {
            firmware: FirmwareVersion::new(major, minor),
            serial: r.array()?,
            config: Config::from_bytes(r.array()?),
            otp_password_config: r.array()?,
        })
    }

    /// Card serial as eight lowercase hex digits.
    #[must_use]
    pub fn serial_number(&self) -> String {
        format!("{:08x}", u32::from_le_bytes(self.serial))
    }
}

/// `READ_SLOT` response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlotRecord(pub SlotDetails);

impl SlotRecord {
    /// # Errors
    ///
    /// [`LibraryError::TooLongString`] for oversized text or ASCII counter.
    pub fn encode(&self, encoding: CounterEncoding) -> Result<Payload, LibraryError> {
        let details = &self.0;
        let mut w = Writer::new();
        w.bytes("slot name", details.name.as_bytes(), SLOT_NAME_LEN)?
            .u8("slot config", details.flags.to_byte())?
            .bytes("token id", details.token_id.as_bytes(), TOKEN_ID_FIELD_LEN)?;
        write_counter(&mut w, details.counter, encoding)?;
        Ok(w.finish())
    }

    /// # Errors
    ///
    /// [`DecodeError`] for a truncated payload or bad ASCII counter.
    pub fn decode(payload: &[u8], encoding: CounterEncoding) -> Result<Self, DecodeError> {
        let mut r = FieldReader::new(payload);
        Ok(Self(SlotDetails {
            name: r.text(SLOT_NAME_LEN)?,
            flags: SlotFlags::from_byte(r.u8()?),
            token_id: r.text(TOKEN_ID_FIELD_LEN)?,
            counter: read_counter(&mut r, encoding)?,
        }))
    }
}

/// `GET_CODE` response: the numeric code and the slot flags that say how
/// many digits it has.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CodeRecord {
    pub code: u32,
    pub flags: SlotFlags,
}

impl CodeRecord {
    /// # Errors
    ///
    /// Never for this layout.
    pub fn encode(&self) -> Result<Payload, LibraryError> {
        let mut w = Writer::new();
        w.u32("code", self.code)?.u8("slot config", self.flags.to_byte())?;
        Ok(w.finish())
    }

    /// # Errors
    ///
    /// [`DecodeError`] for a truncated payload.
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let mut r = FieldReader::new(payload);
        Ok(Self {
            code: r.u32()?,
            flags: SlotFlags::from_byte(r.u8()?),
        })
    }
}

/// Single NUL-padded text field at the start of the payload.
///
/// # Errors
///
/// [`LibraryError::TooLongString`] if `text` exceeds `width`.
pub fn encode_text(field: &'static str, text: &[u8], width: usize) -> Result<Payload, LibraryError> {
    let mut w = Writer::new();
    w.bytes(field, text, width)?;
    Ok(w.finish())
}

/// # Errors
///
/// [`DecodeError`] for a truncated payload.
pub fn decode_text(payload: &[u8], width: usize) -> Result<String, DecodeError> {
    FieldReader::new(payload).text(width)
}

/// Single byte payload, as in the retry counter responses.
#[must_use]
pub fn encode_byte(value: u8) -> Payload {
    let mut payload = [0u8; RESPONSE_PAYLOAD_SIZE];
    payload[0] = value;
    payload
}

/// # Errors
///
/// [`DecodeError`] for an empty payload.
pub fn decode_byte(payload: &[u8]) -> Result<u8, DecodeError> {
    FieldReader::new(payload).u8()
}

#[must_use]
pub fn encode_password_safe_status(status: PasswordSafeStatus) -> Payload {
    let mut payload = [0u8; RESPONSE_PAYLOAD_SIZE];
    payload[..usize::from(PWS_SLOT_COUNT)].copy_from_slice(&status.to_bytes());
    payload
}

/// # Errors
///
/// [`DecodeError`] for a truncated payload.
pub fn decode_password_safe_status(payload: &[u8]) -> Result<PasswordSafeStatus, DecodeError> {
    Ok(PasswordSafeStatus::from_bytes(FieldReader::new(payload).array()?))
}
