//! In-process token that answers reports the way device firmware does.
//!
//! [`SoftToken`] implements [`Transport`], so a [`Device`](crate::Device)
//! can be driven end to end without hardware. Its clock only moves when
//! `SET_TIME` moves it, which keeps TOTP codes reproducible.

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use nk_otp_core::SecretBuffer;

use crate::capabilities::{Capabilities, FirmwareVersion};
use crate::codec::command::{Command, OtpDataKind, OTP_CHUNK_LEN};
use crate::codec::record::{
    encode_byte, encode_password_safe_status, encode_text, CodeRecord, Payload, SlotRecord,
    StatusRecord,
};
use crate::codec::{DeviceState, Report, Request, Response, REPORT_SIZE, RESPONSE_PAYLOAD_SIZE};
use crate::error::StatusCode;
use crate::session::{Role, Session};
use crate::slots::{
    OtpKind, OtpSlotWrite, SlotStore, PWS_LOGIN_LEN, PWS_NAME_LEN, PWS_PASSWORD_LEN, SLOT_NAME_LEN,
};
use crate::transport::{Transport, TransportError};

// ── Configuration ──────────────────────────────────────────────────

/// Factory settings of a [`SoftToken`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SoftTokenConfig {
    #[serde(default = "default_admin_pin")]
    pub admin_pin: String,

    #[serde(default = "default_user_pin")]
    pub user_pin: String,

    #[serde(default = "default_firmware")]
    pub firmware: FirmwareVersion,

    /// Card serial as stored, little-endian.
    #[serde(default = "default_serial")]
    pub serial: [u8; 4],

    /// Leave Password Safe slots in place when the AES key is rebuilt, as
    /// some firmware revisions do.
    #[serde(default)]
    pub aes_rebuild_keeps_password_safe: bool,
}

impl Default for SoftTokenConfig {
    fn default() -> Self {
        Self {
            admin_pin: default_admin_pin(),
            user_pin: default_user_pin(),
            firmware: default_firmware(),
            serial: default_serial(),
            aes_rebuild_keeps_password_safe: false,
        }
    }
}

fn default_admin_pin() -> String {
    "12345678".into()
}
fn default_user_pin() -> String {
    "123456".into()
}
const fn default_firmware() -> FirmwareVersion {
    FirmwareVersion::new(0, 12)
}
const fn default_serial() -> [u8; 4] {
    [0x5A, 0x17, 0x00, 0x00]
}

// ── Token state ────────────────────────────────────────────────────

/// OTP slot data staged by `SEND_OTP_DATA` until `WRITE_TO_SLOT`.
#[derive(Default)]
struct PendingWrite {
    name: Option<String>,
    secret: Option<Zeroizing<Vec<u8>>>,
}

/// A token living in memory.
pub struct SoftToken {
    config: SoftTokenConfig,
    capabilities: Capabilities,
    session: Session,
    slots: SlotStore,
    clock: u64,
    password_safe_enabled: bool,
    aes_key_valid: bool,
    pending: PendingWrite,
    connected: bool,
}

impl SoftToken {
    #[must_use]
    pub fn new(config: SoftTokenConfig) -> Self {
        let session = Session::new(
            SecretBuffer::from(config.admin_pin.as_str()),
            SecretBuffer::from(config.user_pin.as_str()),
        );
        Self {
            capabilities: Capabilities::detect(config.firmware),
            config,
            session,
            slots: SlotStore::new(),
            clock: 0,
            password_safe_enabled: false,
            aes_key_valid: true,
            pending: PendingWrite::default(),
            connected: true,
        }
    }

    /// Every later `send` fails with [`TransportError::Disconnected`].
    pub fn unplug(&mut self) {
        self.connected = false;
    }

    pub fn plug_in(&mut self) {
        self.connected = true;
    }

    #[must_use]
    pub const fn clock(&self) -> u64 {
        self.clock
    }

    #[must_use]
    pub const fn password_safe_enabled(&self) -> bool {
        self.password_safe_enabled
    }

    #[must_use]
    pub const fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn status_record(&self) -> StatusRecord {
        StatusRecord {
            firmware: self.config.firmware,
            serial: self.config.serial,
            config: self.slots.config(),
            otp_password_config: [0, 0],
        }
    }

    fn require_password_safe(&self) -> Result<(), StatusCode> {
        if self.password_safe_enabled {
            Ok(())
        } else {
            Err(StatusCode::NotAuthorized)
        }
    }

    fn stage(&mut self, kind: OtpDataKind, chunk: u8, data: &[u8]) -> Result<(), StatusCode> {
        match kind {
            OtpDataKind::Name => {
                if data.len() > SLOT_NAME_LEN {
                    return Err(StatusCode::NotSupported);
                }
                self.pending = PendingWrite {
                    name: Some(String::from_utf8_lossy(data).into_owned()),
                    secret: None,
                };
            }
            OtpDataKind::Secret => {
                let capacity = self.capabilities.max_secret_len();
                let offset = usize::from(chunk)
                    .checked_mul(OTP_CHUNK_LEN)
                    .filter(|offset| *offset < capacity)
                    .ok_or(StatusCode::NotSupported)?;
                let end = offset.saturating_add(OTP_CHUNK_LEN).min(capacity);
                let staged = self
                    .pending
                    .secret
                    .get_or_insert_with(|| Zeroizing::new(vec![0u8; capacity]));
                let len = end.saturating_sub(offset).min(data.len());
                staged[offset..offset.saturating_add(len)].copy_from_slice(&data[..len]);
            }
        }
        Ok(())
    }

    fn otp_slot(slot: u8) -> Result<(OtpKind, u8), StatusCode> {
        OtpKind::from_slot_number(slot).ok_or(StatusCode::WrongSlot)
    }

    fn factory_pins(&self) -> (SecretBuffer, SecretBuffer) {
        (
            SecretBuffer::from(self.config.admin_pin.as_str()),
            SecretBuffer::from(self.config.user_pin.as_str()),
        )
    }

    #[allow(clippy::too_many_lines)]
    fn execute(&mut self, command: Command) -> Result<Payload, StatusCode> {
        let empty = [0u8; RESPONSE_PAYLOAD_SIZE];
        let encoding = self.capabilities.counter_encoding();
        match command {
            Command::GetStatus => self.status_record().encode().map_err(internal),

            // ── OTP ────────────────────────────────────────────────
            Command::SendOtpData {
                admin_temp,
                kind,
                chunk,
                data,
            } => {
                self.session.authorize(Role::Admin, admin_temp.expose())?;
                self.stage(kind, chunk, data.expose())?;
                Ok(empty)
            }
            Command::WriteToSlot {
                admin_temp,
                slot,
                counter,
                flags,
                token_id,
            } => {
                self.session.authorize(Role::Admin, admin_temp.expose())?;
                let pending = std::mem::take(&mut self.pending);
                let (kind, index) = Self::otp_slot(slot)?;
                let name = pending.name.ok_or(StatusCode::NoNameError)?;
                self.slots.write_otp(
                    kind,
                    index,
                    OtpSlotWrite {
                        name,
                        secret: pending.secret.map(|staged| SecretBuffer::new(&staged)),
                        counter,
                        flags,
                        token_id,
                    },
                )?;
                Ok(empty)
            }
            Command::ReadSlotName { slot } => {
                let (kind, index) = Self::otp_slot(slot)?;
                let name = &self.slots.otp(kind, index)?.name;
                encode_text("slot name", name.as_bytes(), SLOT_NAME_LEN).map_err(internal)
            }
            Command::ReadSlot { slot } => {
                let (kind, index) = Self::otp_slot(slot)?;
                SlotRecord(self.slots.otp(kind, index)?.details())
                    .encode(encoding)
                    .map_err(internal)
            }
            Command::GetCode {
                slot, user_temp, ..
            } => {
                if self.slots.config().otp_pin_protected() {
                    self.session.authorize(Role::User, user_temp.expose())?;
                }
                let (kind, index) = Self::otp_slot(slot)?;
                let (code, flags) = match kind {
                    OtpKind::Hotp => self.slots.next_hotp(index, encoding.max_counter())?,
                    OtpKind::Totp => self.slots.totp(index, self.clock)?,
                };
                CodeRecord { code, flags }.encode().map_err(internal)
            }
            Command::WriteConfig { config, admin_temp } => {
                self.session.authorize(Role::Admin, admin_temp.expose())?;
                self.slots.set_config(config);
                Ok(empty)
            }
            Command::EraseSlot { slot, admin_temp } => {
                self.session.authorize(Role::Admin, admin_temp.expose())?;
                let (kind, index) = Self::otp_slot(slot)?;
                self.slots.erase_otp(kind, index)?;
                self.session.invalidate(Role::Admin);
                Ok(empty)
            }
            Command::SetTime { reset, time } => {
                if !reset && self.clock > time {
                    return Err(StatusCode::TimestampWarning);
                }
                self.clock = time;
                Ok(empty)
            }

            // ── Authentication ─────────────────────────────────────
            Command::FirstAuthenticate { pin, temp } => {
                self.session.first_authenticate(pin.expose(), temp)?;
                Ok(empty)
            }
            Command::UserAuthenticate { pin, temp } => {
                self.session.user_authenticate(pin.expose(), temp)?;
                Ok(empty)
            }
            Command::GetPasswordRetryCount => Ok(encode_byte(self.session.retry_count(Role::Admin))),
            Command::GetUserPasswordRetryCount => {
                Ok(encode_byte(self.session.retry_count(Role::User)))
            }
            Command::UnlockUserPassword {
                admin_pin,
                new_user_pin,
            } => {
                self.session
                    .unlock_user_password(admin_pin.expose(), new_user_pin)?;
                Ok(empty)
            }
            Command::ChangeUserPin { old, new } => {
                self.session.change_pin(Role::User, old.expose(), new)?;
                Ok(empty)
            }
            Command::ChangeAdminPin { old, new } => {
                self.session.change_pin(Role::Admin, old.expose(), new)?;
                Ok(empty)
            }
            Command::LockDevice => {
                self.password_safe_enabled = false;
                self.session.invalidate(Role::User);
                Ok(empty)
            }
            Command::FactoryReset { admin_pin } => {
                self.session.verify_pin(Role::Admin, admin_pin.expose())?;
                let (admin, user) = self.factory_pins();
                self.session.reset(admin, user);
                self.slots.reset();
                self.pending = PendingWrite::default();
                self.password_safe_enabled = false;
                self.aes_key_valid = false;
                Ok(empty)
            }

            // ── Password Safe ──────────────────────────────────────
            Command::PwSafeEnable { user_pin } => {
                self.session.verify_pin(Role::User, user_pin.expose())?;
                if !self.aes_key_valid {
                    return Err(StatusCode::AesDecryptionFailed);
                }
                self.password_safe_enabled = true;
                Ok(empty)
            }
            Command::DetectScAes { user_pin } => {
                self.session.verify_pin(Role::User, user_pin.expose())?;
                Ok(encode_byte(1))
            }
            Command::NewAesKey { admin_pin } => {
                self.session.verify_pin(Role::Admin, admin_pin.expose())?;
                self.aes_key_valid = true;
                if !self.config.aes_rebuild_keeps_password_safe {
                    self.slots.clear_password_safe();
                }
                self.password_safe_enabled = false;
                self.session.invalidate(Role::Admin);
                Ok(empty)
            }
            Command::GetPwSafeSlotStatus => {
                self.require_password_safe()?;
                Ok(encode_password_safe_status(self.slots.password_safe_status()))
            }
            Command::GetPwSafeSlotName { slot } => {
                self.require_password_safe()?;
                let name = self
                    .slots
                    .password_safe(slot)?
                    .map_or(&[][..], |entry| entry.name.as_bytes());
                encode_text("slot name", name, PWS_NAME_LEN).map_err(internal)
            }
            Command::GetPwSafeSlotPassword { slot } => {
                self.require_password_safe()?;
                let password = self
                    .slots
                    .password_safe(slot)?
                    .map_or(&[][..], |entry| entry.password().expose());
                encode_text("password", password, PWS_PASSWORD_LEN).map_err(internal)
            }
            Command::GetPwSafeSlotLogin { slot } => {
                self.require_password_safe()?;
                let login = self
                    .slots
                    .password_safe(slot)?
                    .map_or(&[][..], |entry| entry.login.as_bytes());
                encode_text("login", login, PWS_LOGIN_LEN).map_err(internal)
            }
            Command::SetPwSafeSlotData1 {
                slot,
                name,
                password,
            } => {
                self.require_password_safe()?;
                self.slots.write_password_safe_primary(slot, name, password)?;
                Ok(empty)
            }
            Command::SetPwSafeSlotData2 { slot, login } => {
                self.require_password_safe()?;
                self.slots.write_password_safe_login(slot, login)?;
                Ok(empty)
            }
            Command::PwSafeEraseSlot { slot } => {
                self.require_password_safe()?;
                self.slots.erase_password_safe(slot)?;
                Ok(empty)
            }
        }
    }
}

impl Default for SoftToken {
    fn default() -> Self {
        Self::new(SoftTokenConfig::default())
    }
}

fn internal<E>(_: E) -> StatusCode {
    StatusCode::UnknownError
}

fn trailing_crc(report: &Report) -> u32 {
    let mut crc = [0u8; 4];
    crc.copy_from_slice(&report[REPORT_SIZE.saturating_sub(4)..]);
    u32::from_le_bytes(crc)
}

impl Transport for SoftToken {
    fn send(&mut self, report: &Report) -> Result<Report, TransportError> {
        if !self.connected {
            return Err(TransportError::Disconnected);
        }

        let Ok((request, crc)) = Request::from_report(report) else {
            tracing::debug!(command = report[1], "soft token rejected request CRC");
            return Ok(Response {
                device_state: DeviceState::Error,
                command: report[1],
                request_crc: trailing_crc(report),
                status: StatusCode::WrongCrc.as_u8(),
                payload: [0u8; RESPONSE_PAYLOAD_SIZE],
            }
            .to_report());
        };

        let outcome = Command::parse(&request, self.capabilities.counter_encoding())
            .and_then(|command| self.execute(command));
        let (status, payload) = match outcome {
            Ok(payload) => (StatusCode::Ok, payload),
            Err(status) => (status, [0u8; RESPONSE_PAYLOAD_SIZE]),
        };
        tracing::trace!(command = request.command, status = status.as_u8(), "soft token handled command");

        Ok(Response {
            device_state: DeviceState::Ok,
            command: request.command,
            request_crc: crc,
            status: status.as_u8(),
            payload,
        }
        .to_report())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::CounterEncoding;
    use crate::codec::record::decode_byte;

    fn call(token: &mut SoftToken, command: &Command) -> Response {
        let (report, crc) = command
            .to_request(CounterEncoding::Binary)
            .unwrap()
            .to_report();
        let response = Response::from_report(&token.send(&report).unwrap(), true).unwrap();
        assert_eq!(response.request_crc, crc, "response echoes request CRC");
        assert_eq!(response.command, command.id().as_u8());
        response
    }

    fn status(token: &mut SoftToken, command: &Command) -> StatusCode {
        StatusCode::from_u8(call(token, command).status)
    }

    fn admin_login(token: &mut SoftToken) {
        let command = Command::FirstAuthenticate {
            pin: SecretBuffer::from("12345678"),
            temp: SecretBuffer::from("123123123"),
        };
        assert_eq!(status(token, &command), StatusCode::Ok);
    }

    #[test]
    fn reports_firmware_and_config() {
        let mut token = SoftToken::default();
        let response = call(&mut token, &Command::GetStatus);
        let record = StatusRecord::decode(&response.payload).unwrap();
        assert_eq!(record.firmware, FirmwareVersion::new(0, 12));
        assert_eq!(record.config.as_bytes(), [255, 255, 255, 0, 1]);
    }

    #[test]
    fn corrupted_request_gets_wrong_crc() {
        let mut token = SoftToken::default();
        let (mut report, _) = Command::GetStatus
            .to_request(CounterEncoding::Binary)
            .unwrap()
            .to_report();
        report[30] ^= 0xFF;
        let response = Response::from_report(&token.send(&report).unwrap(), true).unwrap();
        assert_eq!(response.device_state, DeviceState::Error);
        assert_eq!(StatusCode::from_u8(response.status), StatusCode::WrongCrc);
    }

    #[test]
    fn unknown_command_is_reported() {
        let mut token = SoftToken::default();
        let (report, _) = Request {
            command: 0x08,
            payload: [0u8; crate::codec::REQUEST_PAYLOAD_SIZE],
        }
        .to_report();
        let response = Response::from_report(&token.send(&report).unwrap(), true).unwrap();
        assert_eq!(StatusCode::from_u8(response.status), StatusCode::UnknownCommand);
    }

    #[test]
    fn unplugged_token_disconnects() {
        let mut token = SoftToken::default();
        token.unplug();
        let (report, _) = Command::GetStatus
            .to_request(CounterEncoding::Binary)
            .unwrap()
            .to_report();
        assert!(matches!(
            token.send(&report),
            Err(TransportError::Disconnected)
        ));
        token.plug_in();
        assert!(token.send(&report).is_ok());
    }

    #[test]
    fn write_without_name_chunk_fails() {
        let mut token = SoftToken::default();
        admin_login(&mut token);
        let command = Command::WriteToSlot {
            admin_temp: SecretBuffer::from("123123123"),
            slot: 0x10,
            counter: 0,
            flags: crate::slots::SlotFlags::default(),
            token_id: String::new(),
        };
        assert_eq!(status(&mut token, &command), StatusCode::NoNameError);
    }

    #[test]
    fn secret_chunk_beyond_capacity_is_refused() {
        let mut token = SoftToken::default();
        admin_login(&mut token);
        let command = Command::SendOtpData {
            admin_temp: SecretBuffer::from("123123123"),
            kind: OtpDataKind::Secret,
            chunk: 2,
            data: SecretBuffer::new(&[1; 30]),
        };
        assert_eq!(status(&mut token, &command), StatusCode::NotSupported);
    }

    #[test]
    fn retry_count_responses() {
        let mut token = SoftToken::default();
        let wrong = Command::UserAuthenticate {
            pin: SecretBuffer::from("000000"),
            temp: SecretBuffer::from("234234234"),
        };
        assert_eq!(status(&mut token, &wrong), StatusCode::WrongPassword);
        let response = call(&mut token, &Command::GetUserPasswordRetryCount);
        assert_eq!(decode_byte(&response.payload).unwrap(), 2);
    }

    #[test]
    fn soft_time_refuses_to_go_back() {
        let mut token = SoftToken::default();
        assert_eq!(
            status(&mut token, &Command::SetTime { reset: true, time: 100 }),
            StatusCode::Ok
        );
        assert_eq!(
            status(&mut token, &Command::SetTime { reset: false, time: 50 }),
            StatusCode::TimestampWarning
        );
        assert_eq!(token.clock(), 100);
        assert_eq!(
            status(&mut token, &Command::SetTime { reset: false, time: 200 }),
            StatusCode::Ok
        );
        assert_eq!(token.clock(), 200);
    }

    #[test]
    fn config_serde_defaults() {
        let config: SoftTokenConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, SoftTokenConfig::default());
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"adminPin\":\"12345678\""));
        assert!(json.contains("\"aesRebuildKeepsPasswordSafe\":false"));
    }
}
