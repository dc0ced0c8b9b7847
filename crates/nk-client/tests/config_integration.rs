#![allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]

//! Integration tests for device status, the config register, client options
//! and connection loss.

use nk_client::{
    Capabilities, ClientOptions, Config, Device, Error, FirmwareVersion, SoftToken,
    SoftTokenConfig, StatusCode, TransportError,
};

const ADMIN_PIN: &str = "12345678";
const ADMIN_TEMP: &str = "123123123";

fn connect() -> Device<SoftToken> {
    Device::connect(SoftToken::default(), ClientOptions::default()).unwrap()
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

#[test]
fn status_reports_firmware_serial_and_config() {
    let mut device = Device::connect(
        SoftToken::new(SoftTokenConfig {
            firmware: FirmwareVersion::new(0, 9),
            serial: [0x78, 0x56, 0x34, 0x12],
            ..SoftTokenConfig::default()
        }),
        ClientOptions::default(),
    )
    .unwrap();

    let status = device.get_status().unwrap();
    assert_eq!(status.firmware, FirmwareVersion::new(0, 9));
    assert_eq!(status.serial_number, "12345678");
    assert_eq!(status.config, Config::default());

    assert_eq!(device.get_major_firmware_version().unwrap(), 0);
    assert_eq!(device.get_minor_firmware_version().unwrap(), 9);
    assert_eq!(device.get_serial_number().unwrap(), "12345678");
    assert_eq!(device.firmware_version().to_string(), "v0.9");
}

#[test]
fn default_serial_is_zero_padded_hex() {
    let mut device = connect();
    assert_eq!(device.get_serial_number().unwrap(), "0000175a");
}

#[test]
fn status_serializes_for_frontends() {
    let mut device = connect();
    let json = serde_json::to_string(&device.get_status().unwrap()).unwrap();
    assert!(json.contains("\"serialNumber\":\"0000175a\""));
}

// ---------------------------------------------------------------------------
// Config register
// ---------------------------------------------------------------------------

#[test]
fn config_round_trips_verbatim() {
    let mut device = connect();
    device.first_authenticate(ADMIN_PIN, ADMIN_TEMP).unwrap();
    device
        .write_config(Config::new(0, 1, 2, true, false), ADMIN_TEMP)
        .unwrap();

    let config = device.read_config().unwrap();
    assert_eq!(config.as_bytes(), [0, 1, 2, 1, 0]);
    assert_eq!(config.numlock(), 0);
    assert_eq!(config.capslock(), 1);
    assert_eq!(config.scrolllock(), 2);
    assert!(config.otp_pin_protected());
    assert!(!config.delete_user_password());
    assert_eq!(device.mirror().config(), Some(config));
}

#[test]
fn out_of_range_key_bindings_are_stored_as_given() {
    let mut device = connect();
    device.first_authenticate(ADMIN_PIN, ADMIN_TEMP).unwrap();
    let config = Config::from_bytes([7, 200, 255, 0, 1]);
    device.write_config(config, ADMIN_TEMP).unwrap();
    assert_eq!(device.read_config().unwrap(), config);
}

#[test]
fn config_write_needs_admin() {
    let mut device = connect();
    let err = device
        .write_config(Config::new(0, 0, 0, false, false), ADMIN_TEMP)
        .unwrap_err();
    assert_eq!(err.status(), StatusCode::NotAuthorized);
    assert_eq!(device.read_config().unwrap(), Config::default());
}

#[test]
fn factory_reset_restores_default_config() {
    let mut device = connect();
    device.first_authenticate(ADMIN_PIN, ADMIN_TEMP).unwrap();
    device
        .write_config(Config::new(0, 1, 2, true, false), ADMIN_TEMP)
        .unwrap();
    device.factory_reset(ADMIN_PIN).unwrap();
    assert_eq!(device.read_config().unwrap(), Config::default());
}

// ---------------------------------------------------------------------------
// Options and capabilities
// ---------------------------------------------------------------------------

#[test]
fn legacy_firmware_is_detected() {
    let device = Device::connect(
        SoftToken::new(SoftTokenConfig {
            firmware: FirmwareVersion::new(0, 7),
            ..SoftTokenConfig::default()
        }),
        ClientOptions::default(),
    )
    .unwrap();
    assert!(device.capabilities().has_binary_counter);
    assert!(!device.capabilities().supports_320bit_secret);
}

#[test]
fn options_from_disk_drive_connect() {
    let dir = tempfile::tempdir().unwrap();
    let options = ClientOptions {
        verify_response_crc: true,
        capabilities: Some(Capabilities {
            has_binary_counter: true,
            supports_320bit_secret: false,
        }),
    };
    options.save(dir.path()).unwrap();

    let device = Device::connect(SoftToken::default(), ClientOptions::load(dir.path())).unwrap();
    assert!(!device.capabilities().supports_320bit_secret);
}

// ---------------------------------------------------------------------------
// Connection loss
// ---------------------------------------------------------------------------

#[test]
fn unplugged_token_reports_disconnected() {
    let mut device = connect();
    device.transport_mut().unplug();

    let err = device.get_admin_retry_count().unwrap_err();
    assert!(matches!(err, Error::Transport(TransportError::Disconnected)));
    assert_eq!(device.last_command_status(), StatusCode::Disconnected);

    device.transport_mut().plug_in();
    assert_eq!(device.get_admin_retry_count().unwrap(), 3);
    assert_eq!(device.last_command_status(), StatusCode::Ok);
}

#[test]
fn connect_to_unplugged_token_fails() {
    let mut token = SoftToken::default();
    token.unplug();
    let err = Device::connect(token, ClientOptions::default()).err().unwrap();
    assert_eq!(err.status(), StatusCode::Disconnected);
}
