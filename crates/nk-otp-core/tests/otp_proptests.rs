#![allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]

//! Property-based tests for the HOTP/TOTP engine and secret decoding.

use nk_otp_core::otp::{
    derive_code, format_code, generate_hotp, generate_totp, hotp_value, MovingFactor,
    OtpAlgorithm, OtpDigits,
};
use nk_otp_core::{decode_secret, MAX_SECRET_LEN};
use proptest::prelude::*;

/// Strategy for `OtpDigits`.
fn digits_strategy() -> impl Strategy<Value = OtpDigits> {
    prop_oneof![Just(OtpDigits::Six), Just(OtpDigits::Eight),]
}

proptest! {
    /// HOTP output length always equals the digit count.
    #[test]
    fn hotp_output_length_matches_digits(
        secret in proptest::collection::vec(any::<u8>(), 1..64),
        counter in any::<u64>(),
        digits in digits_strategy(),
    ) {
        let code = generate_hotp(&secret, counter, digits, OtpAlgorithm::Sha1)
            .expect("HOTP generation should succeed");
        prop_assert_eq!(code.len(), usize::from(digits.value()));
        prop_assert!(code.bytes().all(|b| b.is_ascii_digit()));
    }

    /// The numeric value and the formatted string describe the same code.
    #[test]
    fn formatted_code_parses_back_to_value(
        secret in proptest::collection::vec(any::<u8>(), 1..41),
        counter in any::<u64>(),
        digits in digits_strategy(),
    ) {
        let value = hotp_value(&secret, counter, digits, OtpAlgorithm::Sha1).unwrap();
        let code = format_code(value, digits);
        prop_assert_eq!(code.parse::<u32>().unwrap(), value);
    }

    /// TOTP at time T equals HOTP at counter T/period for any period.
    #[test]
    fn totp_equals_hotp_at_time_step(
        secret in proptest::collection::vec(any::<u8>(), 1..64),
        time in any::<u64>(),
        period in 1u32..=3600,
        digits in digits_strategy(),
    ) {
        let totp = generate_totp(&secret, time, digits, period, OtpAlgorithm::Sha1).unwrap();
        let hotp = generate_hotp(&secret, time / u64::from(period), digits, OtpAlgorithm::Sha1)
            .unwrap();
        prop_assert_eq!(&totp, &hotp);

        let derived = derive_code(
            &secret,
            MovingFactor::Time { time, period },
            digits,
            OtpAlgorithm::Sha1,
        ).unwrap();
        prop_assert_eq!(totp, derived);
    }

    /// Zero padding a secret up to the token field never changes its codes.
    #[test]
    fn zero_padding_is_transparent(
        secret in proptest::collection::vec(any::<u8>(), 1..=MAX_SECRET_LEN),
        counter in any::<u64>(),
    ) {
        let mut padded = secret.clone();
        padded.resize(MAX_SECRET_LEN, 0);
        let a = generate_hotp(&secret, counter, OtpDigits::Six, OtpAlgorithm::Sha1).unwrap();
        let b = generate_hotp(&padded, counter, OtpDigits::Six, OtpAlgorithm::Sha1).unwrap();
        prop_assert_eq!(a, b);
    }

    /// Lower-case hex of any secret up to the field width decodes to itself.
    #[test]
    fn hex_secret_decodes_to_its_bytes(
        secret in proptest::collection::vec(any::<u8>(), 0..=MAX_SECRET_LEN),
    ) {
        let hex: String = secret.iter().map(|b| format!("{b:02x}")).collect();
        let decoded = decode_secret(&hex, MAX_SECRET_LEN).unwrap();
        prop_assert_eq!(decoded.expose(), secret.as_slice());
    }
}
