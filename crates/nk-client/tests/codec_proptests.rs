#![allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]

//! Property-based tests for report framing and for the dispatcher driven
//! against the in-memory token.

use nk_client::codec::{
    stm_crc32, DeviceState, Report, Request, Response, REPORT_SIZE, REQUEST_PAYLOAD_SIZE,
    RESPONSE_PAYLOAD_SIZE,
};
use nk_client::{
    ClientOptions, Device, OtpSlotData, SlotFlags, SoftToken, StatusCode, Transport,
    TransportError,
};
use nk_otp_core::{generate_hotp, OtpAlgorithm, OtpDigits};
use proptest::prelude::*;

const ADMIN_PIN: &str = "12345678";
const USER_PIN: &str = "123456";
const ADMIN_TEMP: &str = "123123123";

fn payload_strategy() -> impl Strategy<Value = [u8; REQUEST_PAYLOAD_SIZE]> {
    proptest::collection::vec(any::<u8>(), REQUEST_PAYLOAD_SIZE).prop_map(|bytes| {
        let mut payload = [0u8; REQUEST_PAYLOAD_SIZE];
        payload.copy_from_slice(&bytes);
        payload
    })
}

/// Word-at-a-time shift register, as the STM32 CRC unit computes it.
fn reference_crc(data: &[u8]) -> u32 {
    let mut crc = 0xFFFF_FFFF_u32;
    for chunk in data.chunks(4) {
        let mut word = [0u8; 4];
        word[..chunk.len()].copy_from_slice(chunk);
        crc ^= u32::from_le_bytes(word);
        for _ in 0..32 {
            crc = if crc & 0x8000_0000 != 0 {
                (crc << 1) ^ 0x04C1_1DB7
            } else {
                crc << 1
            };
        }
    }
    crc
}

fn flip(report: &Report, bit: usize) -> Report {
    let mut tampered = *report;
    tampered[bit / 8] ^= 1 << (bit % 8);
    tampered
}

proptest! {
    /// Flipping any single bit covered by the CRC, or of the CRC itself, is
    /// detected on the token side.
    #[test]
    fn request_tampering_is_detected(
        command in any::<u8>(),
        payload in payload_strategy(),
        bit in 8usize..REPORT_SIZE * 8,
    ) {
        let (report, _) = Request { command, payload }.to_report();
        prop_assert!(Request::from_report(&report).is_ok());
        prop_assert!(Request::from_report(&flip(&report, bit)).is_err());
    }

    /// The report id byte is outside the CRC.
    #[test]
    fn report_id_is_not_covered(
        command in any::<u8>(),
        payload in payload_strategy(),
        report_id in any::<u8>(),
    ) {
        let (mut report, crc) = Request { command, payload }.to_report();
        report[0] = report_id;
        let (_, stored) = Request::from_report(&report).unwrap();
        prop_assert_eq!(stored, crc);
    }

    /// The host notices a corrupted response when CRC checking is on, and
    /// not when it is off.
    #[test]
    fn response_tampering_is_detected(
        status in 0u8..=14,
        request_crc in any::<u32>(),
        bit in 8usize..(REPORT_SIZE - 4) * 8,
    ) {
        let report = Response {
            device_state: DeviceState::Ok,
            command: 0x0B,
            request_crc,
            status,
            payload: [0xA5; RESPONSE_PAYLOAD_SIZE],
        }
        .to_report();
        let tampered = flip(&report, bit);
        let checked = Response::from_report(&tampered, true);
        prop_assert!(
            matches!(checked, Err(TransportError::CrcMismatch { .. })),
            "expected a CRC mismatch"
        );
        // Without checking, only an invalid device state can fail.
        if bit / 8 != 1 {
            prop_assert!(Response::from_report(&tampered, false).is_ok());
        }
    }

    /// CRC over a buffer padded to whole words equals the CRC of the buffer.
    #[test]
    fn partial_word_is_zero_extended(data in proptest::collection::vec(any::<u8>(), 0..64)) {
        let mut padded = data.clone();
        while padded.len() % 4 != 0 {
            padded.push(0);
        }
        prop_assert_eq!(stm_crc32(&data), stm_crc32(&padded));
    }

    /// The table-driven CRC agrees with the hardware shift register.
    #[test]
    fn crc_matches_shift_register(data in proptest::collection::vec(any::<u8>(), 0..64)) {
        prop_assert_eq!(stm_crc32(&data), reference_crc(&data));
    }

    /// A corrupted request gets a `WrongCrc` answer from the token.
    #[test]
    fn soft_token_answers_wrong_crc(
        payload in payload_strategy(),
        bit in 8usize..REPORT_SIZE * 8,
    ) {
        let mut token = SoftToken::default();
        let (report, _) = Request { command: 0x00, payload }.to_report();
        let answer = token.send(&flip(&report, bit)).unwrap();
        let response = Response::from_report(&answer, true).unwrap();
        prop_assert_eq!(response.device_state, DeviceState::Error);
        prop_assert_eq!(StatusCode::from_u8(response.status), StatusCode::WrongCrc);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Any secret that fits a slot yields the engine's HOTP sequence.
    #[test]
    fn hotp_slot_matches_engine(
        secret in proptest::collection::vec(any::<u8>(), 1..=40),
        start in 0u64..1_000_000,
        use_8_digits in any::<bool>(),
    ) {
        let mut device = Device::connect(SoftToken::default(), ClientOptions::default()).unwrap();
        device.first_authenticate(ADMIN_PIN, ADMIN_TEMP).unwrap();
        let hex = data_encoding::HEXLOWER.encode(&secret);
        let slot = OtpSlotData {
            name: "prop",
            secret: &hex,
            flags: SlotFlags { use_8_digits, ..SlotFlags::default() },
            token_id: "",
        };
        device.write_hotp_slot(0, &slot, start, ADMIN_TEMP).unwrap();

        let digits = OtpDigits::from_flag(use_8_digits);
        for counter in start..start + 3 {
            let expected = generate_hotp(&secret, counter, digits, OtpAlgorithm::Sha1).unwrap();
            prop_assert_eq!(device.get_hotp_code(0).unwrap(), expected);
        }
    }

    /// Password Safe fields come back as written, for any printable value
    /// that fits its field.
    #[test]
    fn password_safe_fields_round_trip(
        index in 0u8..16,
        name in "[ -~]{1,11}",
        login in "[ -~]{0,32}",
        password in "[ -~]{0,20}",
    ) {
        let mut device = Device::connect(SoftToken::default(), ClientOptions::default()).unwrap();
        device.enable_password_safe(USER_PIN).unwrap();
        device.write_password_safe_slot(index, &name, &login, &password).unwrap();
        prop_assert_eq!(device.get_password_safe_slot_name(index).unwrap(), name);
        prop_assert_eq!(device.get_password_safe_slot_login(index).unwrap(), login);
        prop_assert_eq!(device.get_password_safe_slot_password(index).unwrap(), password);
    }
}
