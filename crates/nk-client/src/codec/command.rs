//! Typed command payloads, host to token.

use nk_otp_core::SecretBuffer;

use super::{until_nul, CommandId, DecodeError, FieldReader, FieldWriter, Request, REQUEST_PAYLOAD_SIZE};
use crate::capabilities::CounterEncoding;
use crate::error::{LibraryError, StatusCode};
use crate::slots::{
    Config, SlotFlags, CONFIG_LEN, PWS_LOGIN_LEN, PWS_NAME_LEN, PWS_PASSWORD_LEN,
    TOKEN_ID_FIELD_LEN,
};

/// PIN and temporary password field width in most commands.
pub const PASSWORD_FIELD_LEN: usize = 25;
/// Data bytes carried by one `SEND_OTP_DATA` chunk.
pub const OTP_CHUNK_LEN: usize = 30;
/// User PIN field of `PW_SAFE_ENABLE`.
pub const PWS_ENABLE_PIN_LEN: usize = 30;
/// PIN field of the AES and factory reset commands.
pub const AES_PIN_LEN: usize = 20;
/// Width of a legacy ASCII counter.
pub const ASCII_COUNTER_LEN: usize = 8;

/// What a `SEND_OTP_DATA` chunk carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum OtpDataKind {
    Name = b'N',
    Secret = b'S',
}

/// One command with its arguments.
#[derive(Clone, Debug)]
pub enum Command {
    GetStatus,
    SendOtpData {
        admin_temp: SecretBuffer,
        kind: OtpDataKind,
        chunk: u8,
        data: SecretBuffer,
    },
    WriteToSlot {
        admin_temp: SecretBuffer,
        slot: u8,
        counter: u64,
        flags: SlotFlags,
        token_id: String,
    },
    ReadSlotName {
        slot: u8,
    },
    ReadSlot {
        slot: u8,
    },
    GetCode {
        slot: u8,
        challenge: u64,
        last_totp_time: u64,
        last_interval: u8,
        user_temp: SecretBuffer,
    },
    WriteConfig {
        config: Config,
        admin_temp: SecretBuffer,
    },
    EraseSlot {
        slot: u8,
        admin_temp: SecretBuffer,
    },
    FirstAuthenticate {
        pin: SecretBuffer,
        temp: SecretBuffer,
    },
    UserAuthenticate {
        pin: SecretBuffer,
        temp: SecretBuffer,
    },
    GetPasswordRetryCount,
    GetUserPasswordRetryCount,
    SetTime {
        reset: bool,
        time: u64,
    },
    UnlockUserPassword {
        admin_pin: SecretBuffer,
        new_user_pin: SecretBuffer,
    },
    LockDevice,
    FactoryReset {
        admin_pin: SecretBuffer,
    },
    ChangeUserPin {
        old: SecretBuffer,
        new: SecretBuffer,
    },
    ChangeAdminPin {
        old: SecretBuffer,
        new: SecretBuffer,
    },
    GetPwSafeSlotStatus,
    GetPwSafeSlotName {
        slot: u8,
    },
    GetPwSafeSlotPassword {
        slot: u8,
    },
    GetPwSafeSlotLogin {
        slot: u8,
    },
    SetPwSafeSlotData1 {
        slot: u8,
        name: String,
        password: SecretBuffer,
    },
    SetPwSafeSlotData2 {
        slot: u8,
        login: String,
    },
    PwSafeEraseSlot {
        slot: u8,
    },
    PwSafeEnable {
        user_pin: SecretBuffer,
    },
    DetectScAes {
        user_pin: SecretBuffer,
    },
    NewAesKey {
        admin_pin: SecretBuffer,
    },
}

impl Command {
    #[must_use]
    pub const fn id(&self) -> CommandId {
        match self {
            Self::GetStatus => CommandId::GetStatus,
            Self::SendOtpData { .. } => CommandId::SendOtpData,
            Self::WriteToSlot { .. } => CommandId::WriteToSlot,
            Self::ReadSlotName { .. } => CommandId::ReadSlotName,
            Self::ReadSlot { .. } => CommandId::ReadSlot,
            Self::GetCode { .. } => CommandId::GetCode,
            Self::WriteConfig { .. } => CommandId::WriteConfig,
            Self::EraseSlot { .. } => CommandId::EraseSlot,
            Self::FirstAuthenticate { .. } => CommandId::FirstAuthenticate,
            Self::UserAuthenticate { .. } => CommandId::UserAuthenticate,
            Self::GetPasswordRetryCount => CommandId::GetPasswordRetryCount,
            Self::GetUserPasswordRetryCount => CommandId::GetUserPasswordRetryCount,
            Self::SetTime { .. } => CommandId::SetTime,
            Self::UnlockUserPassword { .. } => CommandId::UnlockUserPassword,
            Self::LockDevice => CommandId::LockDevice,
            Self::FactoryReset { .. } => CommandId::FactoryReset,
            Self::ChangeUserPin { .. } => CommandId::ChangeUserPin,
            Self::ChangeAdminPin { .. } => CommandId::ChangeAdminPin,
            Self::GetPwSafeSlotStatus => CommandId::GetPwSafeSlotStatus,
            Self::GetPwSafeSlotName { .. } => CommandId::GetPwSafeSlotName,
            Self::GetPwSafeSlotPassword { .. } => CommandId::GetPwSafeSlotPassword,
            Self::GetPwSafeSlotLogin { .. } => CommandId::GetPwSafeSlotLogin,
            Self::SetPwSafeSlotData1 { .. } => CommandId::SetPwSafeSlotData1,
            Self::SetPwSafeSlotData2 { .. } => CommandId::SetPwSafeSlotData2,
            Self::PwSafeEraseSlot { .. } => CommandId::PwSafeEraseSlot,
            Self::PwSafeEnable { .. } => CommandId::PwSafeEnable,
            Self::DetectScAes { .. } => CommandId::DetectScAes,
            Self::NewAesKey { .. } => CommandId::NewAesKey,
        }
    }

    /// Lay the arguments out in a request frame.
    ///
    /// # Errors
    ///
    /// [`LibraryError::TooLongString`] when an argument does not fit its
    /// field, including an ASCII counter of more than eight digits.
    pub fn to_request(&self, encoding: CounterEncoding) -> Result<Request, LibraryError> {
        let mut w = FieldWriter::<REQUEST_PAYLOAD_SIZE>::new();
        match self {
            Self::GetStatus
            | Self::GetPasswordRetryCount
            | Self::GetUserPasswordRetryCount
            | Self::LockDevice
            | Self::GetPwSafeSlotStatus => {}
            Self::SendOtpData {
                admin_temp,
                kind,
                chunk,
                data,
            } => {
                w.bytes("admin temporary password", admin_temp.expose(), PASSWORD_FIELD_LEN)?
                    .u8("data type", *kind as u8)?
                    .u8("chunk id", *chunk)?
                    .bytes("OTP data", data.expose(), OTP_CHUNK_LEN)?;
            }
            Self::WriteToSlot {
                admin_temp,
                slot,
                counter,
                flags,
                token_id,
            } => {
                w.bytes("admin temporary password", admin_temp.expose(), PASSWORD_FIELD_LEN)?
                    .u8("slot", *slot)?;
                write_counter(&mut w, *counter, encoding)?;
                w.u8("slot config", flags.to_byte())?
                    .bytes("token id", token_id.as_bytes(), TOKEN_ID_FIELD_LEN)?;
            }
            Self::ReadSlotName { slot }
            | Self::ReadSlot { slot }
            | Self::GetPwSafeSlotName { slot }
            | Self::GetPwSafeSlotPassword { slot }
            | Self::GetPwSafeSlotLogin { slot }
            | Self::PwSafeEraseSlot { slot } => {
                w.u8("slot", *slot)?;
            }
            Self::GetCode {
                slot,
                challenge,
                last_totp_time,
                last_interval,
                user_temp,
            } => {
                w.u8("slot", *slot)?
                    .u64("challenge", *challenge)?
                    .u64("last TOTP time", *last_totp_time)?
                    .u8("last interval", *last_interval)?
                    .bytes("user temporary password", user_temp.expose(), PASSWORD_FIELD_LEN)?;
            }
            Self::WriteConfig { config, admin_temp } => {
                w.bytes("config", &config.as_bytes(), CONFIG_LEN)?.bytes(
                    "admin temporary password",
                    admin_temp.expose(),
                    PASSWORD_FIELD_LEN,
                )?;
            }
            Self::EraseSlot { slot, admin_temp } => {
                w.u8("slot", *slot)?.bytes(
                    "admin temporary password",
                    admin_temp.expose(),
                    PASSWORD_FIELD_LEN,
                )?;
            }
            Self::FirstAuthenticate { pin, temp } | Self::UserAuthenticate { pin, temp } => {
                w.bytes("PIN", pin.expose(), PASSWORD_FIELD_LEN)?.bytes(
                    "temporary password",
                    temp.expose(),
                    PASSWORD_FIELD_LEN,
                )?;
            }
            Self::SetTime { reset, time } => {
                w.u8("reset", u8::from(*reset))?.u64("time", *time)?;
            }
            Self::UnlockUserPassword {
                admin_pin,
                new_user_pin,
            } => {
                w.bytes("admin PIN", admin_pin.expose(), PASSWORD_FIELD_LEN)?.bytes(
                    "new user PIN",
                    new_user_pin.expose(),
                    PASSWORD_FIELD_LEN,
                )?;
            }
            Self::ChangeUserPin { old, new } | Self::ChangeAdminPin { old, new } => {
                w.bytes("old PIN", old.expose(), PASSWORD_FIELD_LEN)?.bytes(
                    "new PIN",
                    new.expose(),
                    PASSWORD_FIELD_LEN,
                )?;
            }
            Self::FactoryReset { admin_pin } | Self::NewAesKey { admin_pin } => {
                w.bytes("admin PIN", admin_pin.expose(), AES_PIN_LEN)?;
            }
            Self::DetectScAes { user_pin } => {
                w.bytes("user PIN", user_pin.expose(), AES_PIN_LEN)?;
            }
            Self::PwSafeEnable { user_pin } => {
                w.bytes("user PIN", user_pin.expose(), PWS_ENABLE_PIN_LEN)?;
            }
            Self::SetPwSafeSlotData1 {
                slot,
                name,
                password,
            } => {
                w.u8("slot", *slot)?
                    .bytes("slot name", name.as_bytes(), PWS_NAME_LEN)?
                    .bytes("password", password.expose(), PWS_PASSWORD_LEN)?;
            }
            Self::SetPwSafeSlotData2 { slot, login } => {
                w.u8("slot", *slot)?
                    .bytes("login", login.as_bytes(), PWS_LOGIN_LEN)?;
            }
        }
        Ok(Request {
            command: self.id().as_u8(),
            payload: w.finish(),
        })
    }

    /// Token side: interpret a request frame.
    ///
    /// # Errors
    ///
    /// `UnknownCommand` for an unrecognised command byte, `UnknownError`
    /// for a payload that does not parse.
    pub fn parse(request: &Request, encoding: CounterEncoding) -> Result<Self, StatusCode> {
        let id = CommandId::try_from(request.command).map_err(|_| StatusCode::UnknownCommand)?;
        let mut r = FieldReader::new(&request.payload);
        Self::read(id, &mut r, encoding).map_err(|_| StatusCode::UnknownError)
    }

    fn read(
        id: CommandId,
        r: &mut FieldReader<'_>,
        encoding: CounterEncoding,
    ) -> Result<Self, DecodeError> {
        Ok(match id {
            CommandId::GetStatus => Self::GetStatus,
            CommandId::SendOtpData => {
                let admin_temp = r.secret(PASSWORD_FIELD_LEN)?;
                let kind = match r.u8()? {
                    b'N' => OtpDataKind::Name,
                    b'S' => OtpDataKind::Secret,
                    other => return Err(DecodeError(format!("OTP data type {other:#04x}"))),
                };
                let chunk = r.u8()?;
                let raw = r.take(OTP_CHUNK_LEN)?;
                let data = match kind {
                    OtpDataKind::Name => SecretBuffer::new(until_nul(raw)),
                    OtpDataKind::Secret => SecretBuffer::new(raw),
                };
                Self::SendOtpData {
                    admin_temp,
                    kind,
                    chunk,
                    data,
                }
            }
            CommandId::WriteToSlot => Self::WriteToSlot {
                admin_temp: r.secret(PASSWORD_FIELD_LEN)?,
                slot: r.u8()?,
                counter: read_counter(r, encoding)?,
                flags: SlotFlags::from_byte(r.u8()?),
                token_id: r.text(TOKEN_ID_FIELD_LEN)?,
            },
            CommandId::ReadSlotName => Self::ReadSlotName { slot: r.u8()? },
            CommandId::ReadSlot => Self::ReadSlot { slot: r.u8()? },
            CommandId::GetCode => Self::GetCode {
                slot: r.u8()?,
                challenge: r.u64()?,
                last_totp_time: r.u64()?,
                last_interval: r.u8()?,
                user_temp: r.secret(PASSWORD_FIELD_LEN)?,
            },
            CommandId::WriteConfig => Self::WriteConfig {
                config: Config::from_bytes(r.array()?),
                admin_temp: r.secret(PASSWORD_FIELD_LEN)?,
            },
            CommandId::EraseSlot => Self::EraseSlot {
                slot: r.u8()?,
                admin_temp: r.secret(PASSWORD_FIELD_LEN)?,
            },
            CommandId::FirstAuthenticate => Self::FirstAuthenticate {
                pin: r.secret(PASSWORD_FIELD_LEN)?,
                temp: r.secret(PASSWORD_FIELD_LEN)?,
            },
            CommandId::UserAuthenticate => Self::UserAuthenticate {
                pin: r.secret(PASSWORD_FIELD_LEN)?,
                temp: r.secret(PASSWORD_FIELD_LEN)?,
            },
            CommandId::GetPasswordRetryCount => Self::GetPasswordRetryCount,
            CommandId::GetUserPasswordRetryCount => Self::GetUserPasswordRetryCount,
            CommandId::SetTime => Self::SetTime {
                reset: r.u8()? != 0,
                time: r.u64()?,
            },
            CommandId::UnlockUserPassword => Self::UnlockUserPassword {
                admin_pin: r.secret(PASSWORD_FIELD_LEN)?,
                new_user_pin: r.secret(PASSWORD_FIELD_LEN)?,
            },
            CommandId::LockDevice => Self::LockDevice,
            CommandId::FactoryReset => Self::FactoryReset {
                admin_pin: r.secret(AES_PIN_LEN)?,
            },
            CommandId::ChangeUserPin => Self::ChangeUserPin {
                old: r.secret(PASSWORD_FIELD_LEN)?,
                new: r.secret(PASSWORD_FIELD_LEN)?,
            },
            CommandId::ChangeAdminPin => Self::ChangeAdminPin {
                old: r.secret(PASSWORD_FIELD_LEN)?,
                new: r.secret(PASSWORD_FIELD_LEN)?,
            },
            CommandId::GetPwSafeSlotStatus => Self::GetPwSafeSlotStatus,
            CommandId::GetPwSafeSlotName => Self::GetPwSafeSlotName { slot: r.u8()? },
            CommandId::GetPwSafeSlotPassword => Self::GetPwSafeSlotPassword { slot: r.u8()? },
            CommandId::GetPwSafeSlotLogin => Self::GetPwSafeSlotLogin { slot: r.u8()? },
            CommandId::SetPwSafeSlotData1 => Self::SetPwSafeSlotData1 {
                slot: r.u8()?,
                name: r.text(PWS_NAME_LEN)?,
                password: r.secret(PWS_PASSWORD_LEN)?,
            },
            CommandId::SetPwSafeSlotData2 => Self::SetPwSafeSlotData2 {
                slot: r.u8()?,
                login: r.text(PWS_LOGIN_LEN)?,
            },
            CommandId::PwSafeEraseSlot => Self::PwSafeEraseSlot { slot: r.u8()? },
            CommandId::PwSafeEnable => Self::PwSafeEnable {
                user_pin: r.secret(PWS_ENABLE_PIN_LEN)?,
            },
            CommandId::DetectScAes => Self::DetectScAes {
                user_pin: r.secret(AES_PIN_LEN)?,
            },
            CommandId::NewAesKey => Self::NewAesKey {
                admin_pin: r.secret(AES_PIN_LEN)?,
            },
        })
    }
}

/// Write an 8-byte counter field in the token's encoding.
///
/// # Errors
///
/// [`LibraryError::TooLongString`] for an ASCII counter above `99_999_999`.
pub fn write_counter<const N: usize>(
    w: &mut FieldWriter<N>,
    counter: u64,
    encoding: CounterEncoding,
) -> Result<(), LibraryError> {
    match encoding {
        CounterEncoding::Binary => {
            w.u64("counter", counter)?;
        }
        CounterEncoding::Ascii => {
            w.bytes("counter", counter.to_string().as_bytes(), ASCII_COUNTER_LEN)?;
        }
    }
    Ok(())
}

/// Read an 8-byte counter field in the token's encoding.
///
/// # Errors
///
/// [`DecodeError`] for a truncated payload or non-decimal ASCII counter.
pub fn read_counter(r: &mut FieldReader<'_>, encoding: CounterEncoding) -> Result<u64, DecodeError> {
    match encoding {
        CounterEncoding::Binary => r.u64(),
        CounterEncoding::Ascii => {
            let digits = until_nul(r.take(ASCII_COUNTER_LEN)?);
            if digits.is_empty() {
                return Ok(0);
            }
            std::str::from_utf8(digits)
                .ok()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| DecodeError("ASCII counter".into()))
        }
    }
}
