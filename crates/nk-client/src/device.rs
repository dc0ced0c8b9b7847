//! Command dispatcher: the typed API over one token.
//!
//! Every public operation runs the same sequence: check local
//! preconditions, encode, one transport round trip per command, decode,
//! update the host-side mirror, latch the status. Local failures never
//! reach the transport. Nothing is retried.

use std::sync::{Arc, Mutex};

use nk_otp_core::{decode_secret, format_code, SecretBuffer};
use serde::Serialize;

use crate::capabilities::{Capabilities, FirmwareVersion};
use crate::codec::command::{Command, OtpDataKind, OTP_CHUNK_LEN};
use crate::codec::record::{
    decode_byte, decode_password_safe_status, decode_text, CodeRecord, Payload, SlotRecord,
    StatusRecord,
};
use crate::codec::{DeviceState, Request, Response};
use crate::error::{Error, LibraryError, Result, StatusCode};
use crate::options::ClientOptions;
use crate::slots::{
    check_pws_index, Config, OtpKind, PasswordSafeStatus, SlotDetails, SlotFlags, SlotMirror,
    PWS_LOGIN_LEN, PWS_NAME_LEN, PWS_PASSWORD_LEN, SLOT_NAME_LEN, TOKEN_ID_MAX_LEN,
};
use crate::transport::{Transport, TransportError};

/// A device handle shared between threads. The mutex serializes commands.
pub type SharedDevice<T> = Arc<Mutex<Device<T>>>;

/// A value together with the status that produced it.
///
/// For callers that want the sentinel style: a failed getter yields the
/// default value (empty string, zero) next to the failure status.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandOutcome<V> {
    pub value: V,
    pub status: StatusCode,
}

impl<V> CommandOutcome<V> {
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        self.status.is_ok()
    }
}

impl<V: Default> From<Result<V>> for CommandOutcome<V> {
    fn from(result: Result<V>) -> Self {
        match result {
            Ok(value) => Self {
                value,
                status: StatusCode::Ok,
            },
            Err(err) => Self {
                value: V::default(),
                status: err.status(),
            },
        }
    }
}

/// Answer to `get_status`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceStatus {
    pub firmware: FirmwareVersion,
    /// Eight lowercase hex digits.
    pub serial_number: String,
    pub config: Config,
}

/// Parameters shared by HOTP and TOTP slot writes.
#[derive(Clone, Copy, Debug, Default)]
pub struct OtpSlotData<'a> {
    /// At most 15 bytes, must not be empty.
    pub name: &'a str,
    /// Hex secret. Empty keeps the secret already stored in the slot.
    pub secret: &'a str,
    pub flags: SlotFlags,
    /// At most 12 bytes.
    pub token_id: &'a str,
}

/// One connected token.
pub struct Device<T: Transport> {
    transport: T,
    options: ClientOptions,
    firmware: FirmwareVersion,
    capabilities: Capabilities,
    last_status: StatusCode,
    password_safe_enabled: bool,
    mirror: SlotMirror,
}

fn secret(bytes: impl AsRef<[u8]>) -> SecretBuffer {
    SecretBuffer::new(bytes.as_ref())
}

impl<T: Transport> Device<T> {
    // ── Connection ─────────────────────────────────────────────────

    /// Open a session over `transport` and detect capabilities.
    ///
    /// # Errors
    ///
    /// Whatever the initial `GET_STATUS` round trip fails with.
    pub fn connect(transport: T, options: ClientOptions) -> Result<Self> {
        let mut device = Self {
            transport,
            options,
            firmware: FirmwareVersion::new(0, 0),
            capabilities: Capabilities::FULL,
            last_status: StatusCode::Ok,
            password_safe_enabled: false,
            mirror: SlotMirror::default(),
        };
        let status = device.get_status()?;
        device.firmware = status.firmware;
        device.capabilities = device
            .options
            .capabilities
            .unwrap_or_else(|| Capabilities::detect(status.firmware));
        tracing::info!(
            firmware = %status.firmware,
            serial = %status.serial_number,
            binary_counter = device.capabilities.has_binary_counter,
            wide_secrets = device.capabilities.supports_320bit_secret,
            "connected to token"
        );
        Ok(device)
    }

    /// Wrap in an `Arc<Mutex<_>>` for use from several threads.
    #[must_use]
    pub fn shared(self) -> SharedDevice<T> {
        Arc::new(Mutex::new(self))
    }

    /// Status of the most recent operation on this handle.
    #[must_use]
    pub const fn last_command_status(&self) -> StatusCode {
        self.last_status
    }

    #[must_use]
    pub const fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// Firmware version seen at connect.
    #[must_use]
    pub const fn firmware_version(&self) -> FirmwareVersion {
        self.firmware
    }

    /// Whether this handle enabled the Password Safe and has not locked
    /// the device since.
    #[must_use]
    pub const fn password_safe_enabled(&self) -> bool {
        self.password_safe_enabled
    }

    /// Secret-free view of what this handle has written and read.
    #[must_use]
    pub const fn mirror(&self) -> &SlotMirror {
        &self.mirror
    }

    #[must_use]
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    #[must_use]
    pub fn into_transport(self) -> T {
        self.transport
    }

    // ── Plumbing ───────────────────────────────────────────────────

    /// Run one operation and latch its status.
    fn run<V>(&mut self, op: impl FnOnce(&mut Self) -> Result<V>) -> Result<V> {
        let result = op(self);
        self.last_status = match &result {
            Ok(_) => StatusCode::Ok,
            Err(err) => err.status(),
        };
        result
    }

    fn encode(&self, command: &Command) -> Result<Request> {
        Ok(command.to_request(self.capabilities.counter_encoding())?)
    }

    fn transact(&mut self, command: &Command) -> Result<Payload> {
        let request = self.encode(command)?;
        self.round_trip(&request)
    }

    fn round_trip(&mut self, request: &Request) -> Result<Payload> {
        let (report, crc) = request.to_report();
        tracing::debug!(command = request.command, "sending command");

        let raw = self.transport.send(&report)?;
        let response = Response::from_report(&raw, self.options.verify_response_crc)
            .inspect_err(|err| tracing::warn!(error = %err, "unusable response"))?;

        if response.device_state == DeviceState::Busy {
            return Err(Error::Device(StatusCode::Busy));
        }
        if response.command != request.command {
            return Err(TransportError::CommandMismatch {
                expected: request.command,
                actual: response.command,
            }
            .into());
        }
        if response.request_crc != crc {
            return Err(TransportError::StaleResponse {
                expected: crc,
                actual: response.request_crc,
            }
            .into());
        }

        let status = StatusCode::from_u8(response.status);
        if !status.is_ok() {
            tracing::warn!(command = request.command, %status, "device refused command");
            return Err(Error::Device(status));
        }
        Ok(response.payload)
    }

    fn require_password_safe(&self) -> Result<()> {
        if self.password_safe_enabled {
            Ok(())
        } else {
            Err(LibraryError::PasswordSafeDisabled.into())
        }
    }

    // ── Status and config ──────────────────────────────────────────

    /// # Errors
    ///
    /// Transport or decode failures.
    pub fn get_status(&mut self) -> Result<DeviceStatus> {
        self.run(|device| {
            let record = StatusRecord::decode(&device.transact(&Command::GetStatus)?)?;
            device.mirror.record_config(record.config);
            Ok(DeviceStatus {
                firmware: record.firmware,
                serial_number: record.serial_number(),
                config: record.config,
            })
        })
    }

    /// # Errors
    ///
    /// As [`get_status`](Self::get_status).
    pub fn get_serial_number(&mut self) -> Result<String> {
        self.get_status().map(|status| status.serial_number)
    }

    /// # Errors
    ///
    /// As [`get_status`](Self::get_status).
    pub fn get_major_firmware_version(&mut self) -> Result<u8> {
        self.get_status().map(|status| status.firmware.major)
    }

    /// # Errors
    ///
    /// As [`get_status`](Self::get_status).
    pub fn get_minor_firmware_version(&mut self) -> Result<u8> {
        self.get_status().map(|status| status.firmware.minor)
    }

    /// The config register exactly as stored.
    ///
    /// # Errors
    ///
    /// As [`get_status`](Self::get_status).
    pub fn read_config(&mut self) -> Result<Config> {
        self.get_status().map(|status| status.config)
    }

    /// # Errors
    ///
    /// `NotAuthorized` without a live admin temporary password.
    pub fn write_config(&mut self, config: Config, admin_temp: impl AsRef<[u8]>) -> Result<()> {
        let command = Command::WriteConfig {
            config,
            admin_temp: secret(admin_temp),
        };
        self.run(|device| {
            device.transact(&command)?;
            device.mirror.record_config(config);
            Ok(())
        })
    }

    /// Set the token clock unconditionally.
    ///
    /// # Errors
    ///
    /// Transport failures.
    pub fn set_time(&mut self, time: u64) -> Result<()> {
        self.run(|device| device.transact(&Command::SetTime { reset: true, time }).map(drop))
    }

    /// Set the token clock unless it is already ahead of `time`.
    ///
    /// # Errors
    ///
    /// `TimestampWarning` when the token clock is ahead.
    pub fn set_time_soft(&mut self, time: u64) -> Result<()> {
        self.run(|device| {
            device
                .transact(&Command::SetTime { reset: false, time })
                .map(drop)
        })
    }

    // ── Authentication ─────────────────────────────────────────────

    /// Admin login; `temp` becomes the admin temporary password.
    ///
    /// # Errors
    ///
    /// `WrongPassword`, which costs an admin retry unless already locked.
    pub fn first_authenticate(
        &mut self,
        admin_pin: impl AsRef<[u8]>,
        temp: impl AsRef<[u8]>,
    ) -> Result<()> {
        let command = Command::FirstAuthenticate {
            pin: secret(admin_pin),
            temp: secret(temp),
        };
        self.run(|device| {
            device.transact(&command)?;
            tracing::info!("admin authenticated");
            Ok(())
        })
    }

    /// User login; `temp` becomes the user temporary password.
    ///
    /// # Errors
    ///
    /// `WrongPassword`, which costs a user retry unless already locked.
    pub fn user_authenticate(
        &mut self,
        user_pin: impl AsRef<[u8]>,
        temp: impl AsRef<[u8]>,
    ) -> Result<()> {
        let command = Command::UserAuthenticate {
            pin: secret(user_pin),
            temp: secret(temp),
        };
        self.run(|device| {
            device.transact(&command)?;
            tracing::info!("user authenticated");
            Ok(())
        })
    }

    /// # Errors
    ///
    /// Transport failures.
    pub fn get_admin_retry_count(&mut self) -> Result<u8> {
        self.run(|device| Ok(decode_byte(&device.transact(&Command::GetPasswordRetryCount)?)?))
    }

    /// # Errors
    ///
    /// Transport failures.
    pub fn get_user_retry_count(&mut self) -> Result<u8> {
        self.run(|device| {
            Ok(decode_byte(
                &device.transact(&Command::GetUserPasswordRetryCount)?,
            )?)
        })
    }

    /// Reset the user PIN and its retries using the admin PIN.
    ///
    /// # Errors
    ///
    /// `WrongPassword` (costs an admin retry) or `ErrorUnblockingPin`.
    pub fn unlock_user_password(
        &mut self,
        admin_pin: impl AsRef<[u8]>,
        new_user_pin: impl AsRef<[u8]>,
    ) -> Result<()> {
        let command = Command::UnlockUserPassword {
            admin_pin: secret(admin_pin),
            new_user_pin: secret(new_user_pin),
        };
        self.run(|device| {
            device.transact(&command)?;
            tracing::info!("user PIN unblocked");
            Ok(())
        })
    }

    /// # Errors
    ///
    /// `WrongPassword` (costs an admin retry) or `ErrorChangingAdminPassword`.
    pub fn change_admin_pin(&mut self, old: impl AsRef<[u8]>, new: impl AsRef<[u8]>) -> Result<()> {
        let command = Command::ChangeAdminPin {
            old: secret(old),
            new: secret(new),
        };
        self.run(|device| device.transact(&command).map(drop))
    }

    /// # Errors
    ///
    /// `WrongPassword` (costs a user retry) or `ErrorChangingUserPassword`.
    pub fn change_user_pin(&mut self, old: impl AsRef<[u8]>, new: impl AsRef<[u8]>) -> Result<()> {
        let command = Command::ChangeUserPin {
            old: secret(old),
            new: secret(new),
        };
        self.run(|device| device.transact(&command).map(drop))
    }

    /// Disable the Password Safe and drop the user temporary password.
    ///
    /// # Errors
    ///
    /// Transport failures.
    pub fn lock_device(&mut self) -> Result<()> {
        self.run(|device| {
            device.transact(&Command::LockDevice)?;
            device.password_safe_enabled = false;
            tracing::info!("device locked");
            Ok(())
        })
    }

    /// Wipe OTP slots, config and Password Safe, and restore factory PINs.
    /// The Password Safe stays unusable until [`build_aes_key`](Self::build_aes_key).
    ///
    /// # Errors
    ///
    /// `WrongPassword`, which costs an admin retry.
    pub fn factory_reset(&mut self, admin_pin: impl AsRef<[u8]>) -> Result<()> {
        let command = Command::FactoryReset {
            admin_pin: secret(admin_pin),
        };
        self.run(|device| {
            device.transact(&command)?;
            device.password_safe_enabled = false;
            device.mirror.clear();
            tracing::info!("factory reset done");
            Ok(())
        })
    }

    /// Generate a new Password Safe key. Stored Password Safe data becomes
    /// unreadable; OTP slots are untouched.
    ///
    /// # Errors
    ///
    /// `WrongPassword`, which costs an admin retry.
    pub fn build_aes_key(&mut self, admin_pin: impl AsRef<[u8]>) -> Result<()> {
        let command = Command::NewAesKey {
            admin_pin: secret(admin_pin),
        };
        self.run(|device| {
            device.transact(&command)?;
            device.password_safe_enabled = false;
            // Some firmware keeps the old slots; only a status read tells.
            device.mirror.forget_password_safe();
            tracing::info!("AES key rebuilt");
            Ok(())
        })
    }

    /// # Errors
    ///
    /// `WrongPassword`, which costs a user retry.
    pub fn is_aes_supported(&mut self, user_pin: impl AsRef<[u8]>) -> Result<bool> {
        let command = Command::DetectScAes {
            user_pin: secret(user_pin),
        };
        self.run(|device| Ok(decode_byte(&device.transact(&command)?)? == 1))
    }

    // ── OTP slots ──────────────────────────────────────────────────

    fn write_otp_slot(
        &mut self,
        kind: OtpKind,
        index: u8,
        data: &OtpSlotData<'_>,
        counter: u64,
        admin_temp: &[u8],
    ) -> Result<()> {
        let slot = kind.slot_number(index)?;
        if data.name.len() > SLOT_NAME_LEN {
            return Err(LibraryError::TooLongString {
                field: "slot name",
                len: data.name.len(),
                max: SLOT_NAME_LEN,
            }
            .into());
        }
        if data.token_id.len() > TOKEN_ID_MAX_LEN {
            return Err(LibraryError::TooLongString {
                field: "token id",
                len: data.token_id.len(),
                max: TOKEN_ID_MAX_LEN,
            }
            .into());
        }
        let key = decode_secret(data.secret, self.capabilities.max_secret_len())?;

        let mut commands = vec![Command::SendOtpData {
            admin_temp: SecretBuffer::new(admin_temp),
            kind: OtpDataKind::Name,
            chunk: 0,
            data: SecretBuffer::from(data.name),
        }];
        for (chunk, bytes) in (0u8..).zip(key.expose().chunks(OTP_CHUNK_LEN)) {
            commands.push(Command::SendOtpData {
                admin_temp: SecretBuffer::new(admin_temp),
                kind: OtpDataKind::Secret,
                chunk,
                data: SecretBuffer::new(bytes),
            });
        }
        commands.push(Command::WriteToSlot {
            admin_temp: SecretBuffer::new(admin_temp),
            slot,
            counter,
            flags: data.flags,
            token_id: data.token_id.to_owned(),
        });

        // Encode everything first so a bad field never leaves a half write.
        let requests = commands
            .iter()
            .map(|command| self.encode(command))
            .collect::<Result<Vec<_>>>()?;
        for request in &requests {
            self.round_trip(request)?;
        }

        self.mirror.record_slot(
            kind,
            index,
            SlotDetails {
                name: data.name.to_owned(),
                flags: data.flags,
                token_id: data.token_id.to_owned(),
                counter,
            },
        );
        tracing::info!(kind = kind.label(), index, "OTP slot written");
        Ok(())
    }

    /// Program HOTP slot `index` (0..3) starting at `counter`.
    ///
    /// # Errors
    ///
    /// - `InvalidSlot`, `TooLongString`, `InvalidHexString`,
    ///   `TargetBufferSmallerThanSource` before anything is sent
    /// - `NotAuthorized` without a live admin temporary password
    pub fn write_hotp_slot(
        &mut self,
        index: u8,
        data: &OtpSlotData<'_>,
        counter: u64,
        admin_temp: impl AsRef<[u8]>,
    ) -> Result<()> {
        self.run(|device| {
            device.write_otp_slot(OtpKind::Hotp, index, data, counter, admin_temp.as_ref())
        })
    }

    /// Program TOTP slot `index` (0..15) with a period in seconds.
    ///
    /// # Errors
    ///
    /// As [`write_hotp_slot`](Self::write_hotp_slot); a zero period is
    /// `NotSupported`.
    pub fn write_totp_slot(
        &mut self,
        index: u8,
        data: &OtpSlotData<'_>,
        period: u16,
        admin_temp: impl AsRef<[u8]>,
    ) -> Result<()> {
        self.run(|device| {
            device.write_otp_slot(
                OtpKind::Totp,
                index,
                data,
                u64::from(period),
                admin_temp.as_ref(),
            )
        })
    }

    fn get_code(
        &mut self,
        kind: OtpKind,
        index: u8,
        challenge: u64,
        last_totp_time: u64,
        last_interval: u8,
        user_temp: &[u8],
    ) -> Result<String> {
        let command = Command::GetCode {
            slot: kind.slot_number(index)?,
            challenge,
            last_totp_time,
            last_interval,
            user_temp: SecretBuffer::new(user_temp),
        };
        let record = CodeRecord::decode(&self.transact(&command)?)?;
        if kind == OtpKind::Hotp {
            self.mirror.record_hotp_use(index);
        }
        Ok(format_code(record.code, record.flags.digits()))
    }

    /// Next HOTP code; advances the slot counter.
    ///
    /// # Errors
    ///
    /// `NotProgrammed`, `NotAuthorized` when OTP PIN protection is on, or
    /// `NotSupported` once the counter has reached its encoding's ceiling.
    pub fn get_hotp_code(&mut self, index: u8) -> Result<String> {
        self.run(|device| device.get_code(OtpKind::Hotp, index, 0, 0, 0, &[]))
    }

    /// Next HOTP code under OTP PIN protection.
    ///
    /// # Errors
    ///
    /// `NotProgrammed`, or `NotAuthorized` for a stale user temporary password.
    pub fn get_hotp_code_pin(&mut self, index: u8, user_temp: impl AsRef<[u8]>) -> Result<String> {
        self.run(|device| device.get_code(OtpKind::Hotp, index, 0, 0, 0, user_temp.as_ref()))
    }

    /// TOTP code at the token's own clock (see [`set_time`](Self::set_time)).
    ///
    /// `challenge`, `last_totp_time` and `last_interval` are passed through
    /// to the token, which does not use them for the code.
    ///
    /// # Errors
    ///
    /// `NotProgrammed`, or `NotAuthorized` when OTP PIN protection is on.
    pub fn get_totp_code(
        &mut self,
        index: u8,
        challenge: u64,
        last_totp_time: u64,
        last_interval: u8,
    ) -> Result<String> {
        self.run(|device| {
            device.get_code(
                OtpKind::Totp,
                index,
                challenge,
                last_totp_time,
                last_interval,
                &[],
            )
        })
    }

    /// # Errors
    ///
    /// As [`get_totp_code`](Self::get_totp_code), plus `NotAuthorized` for a
    /// stale user temporary password.
    pub fn get_totp_code_pin(
        &mut self,
        index: u8,
        challenge: u64,
        last_totp_time: u64,
        last_interval: u8,
        user_temp: impl AsRef<[u8]>,
    ) -> Result<String> {
        self.run(|device| {
            device.get_code(
                OtpKind::Totp,
                index,
                challenge,
                last_totp_time,
                last_interval,
                user_temp.as_ref(),
            )
        })
    }

    fn read_slot(&mut self, kind: OtpKind, index: u8) -> Result<SlotDetails> {
        let command = Command::ReadSlot {
            slot: kind.slot_number(index)?,
        };
        let payload = self.transact(&command)?;
        let SlotRecord(details) =
            SlotRecord::decode(&payload, self.capabilities.counter_encoding())?;
        self.mirror.record_slot(kind, index, details.clone());
        Ok(details)
    }

    /// Name, flags, token id and counter of a HOTP slot.
    ///
    /// # Errors
    ///
    /// `InvalidSlot` or `NotProgrammed`.
    pub fn read_hotp_slot(&mut self, index: u8) -> Result<SlotDetails> {
        self.run(|device| device.read_slot(OtpKind::Hotp, index))
    }

    /// Like [`read_hotp_slot`](Self::read_hotp_slot); `counter` is the period.
    ///
    /// # Errors
    ///
    /// `InvalidSlot` or `NotProgrammed`.
    pub fn read_totp_slot(&mut self, index: u8) -> Result<SlotDetails> {
        self.run(|device| device.read_slot(OtpKind::Totp, index))
    }

    fn slot_name(&mut self, kind: OtpKind, index: u8) -> Result<String> {
        let command = Command::ReadSlotName {
            slot: kind.slot_number(index)?,
        };
        Ok(decode_text(&self.transact(&command)?, SLOT_NAME_LEN)?)
    }

    /// # Errors
    ///
    /// `InvalidSlot` or `NotProgrammed`.
    pub fn get_hotp_slot_name(&mut self, index: u8) -> Result<String> {
        self.run(|device| device.slot_name(OtpKind::Hotp, index))
    }

    /// # Errors
    ///
    /// `InvalidSlot` or `NotProgrammed`.
    pub fn get_totp_slot_name(&mut self, index: u8) -> Result<String> {
        self.run(|device| device.slot_name(OtpKind::Totp, index))
    }

    fn erase_slot(&mut self, kind: OtpKind, index: u8, admin_temp: &[u8]) -> Result<()> {
        let command = Command::EraseSlot {
            slot: kind.slot_number(index)?,
            admin_temp: SecretBuffer::new(admin_temp),
        };
        self.transact(&command)?;
        self.mirror.record_erase(kind, index);
        tracing::info!(kind = kind.label(), index, "OTP slot erased");
        Ok(())
    }

    /// Erase a HOTP slot. The admin temporary password is spent.
    ///
    /// # Errors
    ///
    /// `InvalidSlot`, or `NotAuthorized` without a live admin temporary
    /// password.
    pub fn erase_hotp_slot(&mut self, index: u8, admin_temp: impl AsRef<[u8]>) -> Result<()> {
        self.run(|device| device.erase_slot(OtpKind::Hotp, index, admin_temp.as_ref()))
    }

    /// Erase a TOTP slot. The admin temporary password is spent.
    ///
    /// # Errors
    ///
    /// As [`erase_hotp_slot`](Self::erase_hotp_slot).
    pub fn erase_totp_slot(&mut self, index: u8, admin_temp: impl AsRef<[u8]>) -> Result<()> {
        self.run(|device| device.erase_slot(OtpKind::Totp, index, admin_temp.as_ref()))
    }

    // ── Password Safe ──────────────────────────────────────────────

    /// Unlock the Password Safe with the user PIN.
    ///
    /// # Errors
    ///
    /// `WrongPassword` (costs a user retry) or `AesDecryptionFailed` after a
    /// factory reset until the AES key is rebuilt.
    pub fn enable_password_safe(&mut self, user_pin: impl AsRef<[u8]>) -> Result<()> {
        let command = Command::PwSafeEnable {
            user_pin: secret(user_pin),
        };
        self.run(|device| {
            device.transact(&command)?;
            device.password_safe_enabled = true;
            tracing::info!("password safe enabled");
            Ok(())
        })
    }

    /// # Errors
    ///
    /// `NotAuthorized` while the Password Safe is disabled.
    pub fn get_password_safe_slot_status(&mut self) -> Result<PasswordSafeStatus> {
        self.run(|device| {
            device.require_password_safe()?;
            let status =
                decode_password_safe_status(&device.transact(&Command::GetPwSafeSlotStatus)?)?;
            device.mirror.record_password_safe(status);
            Ok(status)
        })
    }

    fn password_safe_field(&mut self, command: &Command, width: usize) -> Result<String> {
        Ok(decode_text(&self.transact(command)?, width)?)
    }

    /// An unprogrammed or erased slot reads back as an empty name with `Ok`.
    ///
    /// # Errors
    ///
    /// `NotAuthorized` while disabled, `InvalidSlot` for `index >= 16`.
    pub fn get_password_safe_slot_name(&mut self, index: u8) -> Result<String> {
        self.run(|device| {
            device.require_password_safe()?;
            let slot = check_pws_index(index)?;
            device.password_safe_field(&Command::GetPwSafeSlotName { slot }, PWS_NAME_LEN)
        })
    }

    /// # Errors
    ///
    /// `NotAuthorized` while disabled, `InvalidSlot` for `index >= 16`.
    pub fn get_password_safe_slot_login(&mut self, index: u8) -> Result<String> {
        self.run(|device| {
            device.require_password_safe()?;
            let slot = check_pws_index(index)?;
            device.password_safe_field(&Command::GetPwSafeSlotLogin { slot }, PWS_LOGIN_LEN)
        })
    }

    /// # Errors
    ///
    /// `NotAuthorized` while disabled, `InvalidSlot` for `index >= 16`.
    pub fn get_password_safe_slot_password(&mut self, index: u8) -> Result<String> {
        self.run(|device| {
            device.require_password_safe()?;
            let slot = check_pws_index(index)?;
            device.password_safe_field(
                &Command::GetPwSafeSlotPassword { slot },
                PWS_PASSWORD_LEN,
            )
        })
    }

    /// Store name (11), login (32) and password (20) in one slot.
    ///
    /// # Errors
    ///
    /// `NotAuthorized` while disabled, `InvalidSlot`, or `TooLongString`
    /// before anything is sent.
    pub fn write_password_safe_slot(
        &mut self,
        index: u8,
        name: &str,
        login: &str,
        password: &str,
    ) -> Result<()> {
        self.run(|device| {
            device.require_password_safe()?;
            let slot = check_pws_index(index)?;
            let requests = [
                Command::SetPwSafeSlotData1 {
                    slot,
                    name: name.to_owned(),
                    password: SecretBuffer::from(password),
                },
                Command::SetPwSafeSlotData2 {
                    slot,
                    login: login.to_owned(),
                },
            ]
            .iter()
            .map(|command| device.encode(command))
            .collect::<Result<Vec<_>>>()?;
            for request in &requests {
                device.round_trip(request)?;
            }
            device.mirror.record_password_safe_slot(index, true);
            Ok(())
        })
    }

    /// # Errors
    ///
    /// `NotAuthorized` while disabled, `InvalidSlot` for `index >= 16`.
    pub fn erase_password_safe_slot(&mut self, index: u8) -> Result<()> {
        self.run(|device| {
            device.require_password_safe()?;
            let slot = check_pws_index(index)?;
            device.transact(&Command::PwSafeEraseSlot { slot })?;
            device.mirror.record_password_safe_slot(index, false);
            Ok(())
        })
    }
}
