//! PMBus linear numeric codecs.
//!
//! Two compact encodings carry every analog quantity on the bus. Linear11
//! packs an 11-bit two's-complement mantissa together with a 5-bit
//! two's-complement exponent into a single word (value = mantissa * 2^exp).
//! Linear16 is a plain 16-bit mantissa whose exponent is supplied externally,
//! normally from the low five bits of the VOUT_MODE register.

/// Largest mantissa representable in the signed 11-bit field.
pub const LINEAR11_MANTISSA_MAX: i32 = 1023;
/// Smallest mantissa representable in the signed 11-bit field.
pub const LINEAR11_MANTISSA_MIN: i32 = -1024;

const MANTISSA_MASK: u16 = 0x07FF;
const EXPONENT_SHIFT: u16 = 11;

/// Sign-extend the 5-bit exponent field shared by both formats.
pub fn sign_extend_exponent(raw: u8) -> i8 {
    let exp = (raw & 0x1F) as i8;
    if exp > 15 {
        exp - 32
    } else {
        exp
    }
}

/// Decode a Linear11 word into a floating-point value.
pub fn linear11_to_f64(word: u16) -> f64 {
    let mut mantissa = i32::from(word & MANTISSA_MASK);
    if mantissa > LINEAR11_MANTISSA_MAX {
        mantissa -= 2048;
    }
    let exponent = sign_extend_exponent((word >> EXPONENT_SHIFT) as u8);
    f64::from(mantissa) * 2f64.powi(i32::from(exponent))
}

/// Encode a value as Linear11 using the caller-chosen exponent.
///
/// The mantissa is clamped to the signed 11-bit range, so values outside
/// `[-1024, 1023] * 2^exp` saturate instead of wrapping.
pub fn f64_to_linear11(value: f64, exponent: i8) -> u16 {
    let mantissa = (value / 2f64.powi(i32::from(exponent))).round();
    let mantissa = if mantissa > f64::from(LINEAR11_MANTISSA_MAX) {
        LINEAR11_MANTISSA_MAX
    } else if mantissa < f64::from(LINEAR11_MANTISSA_MIN) {
        LINEAR11_MANTISSA_MIN
    } else {
        mantissa as i32
    };
    (u16::from(exponent as u8 & 0x1F) << EXPONENT_SHIFT) | (mantissa as u16 & MANTISSA_MASK)
}

/// Decode a Linear16 mantissa with an externally supplied exponent.
pub fn linear16_to_f64(mantissa: u16, exponent: i8) -> f64 {
    f64::from(mantissa) * 2f64.powi(i32::from(exponent))
}

/// Encode a value as a Linear16 mantissa; saturates at the 16-bit bounds.
pub fn f64_to_linear16(value: f64, exponent: i8) -> u16 {
    let mantissa = (value / 2f64.powi(i32::from(exponent))).round();
    if mantissa <= 0.0 {
        0
    } else if mantissa >= f64::from(u16::MAX) {
        u16::MAX
    } else {
        mantissa as u16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponent_sign_extension() {
        assert_eq!(sign_extend_exponent(0x00), 0);
        assert_eq!(sign_extend_exponent(0x0F), 15);
        assert_eq!(sign_extend_exponent(0x10), -16);
        assert_eq!(sign_extend_exponent(0x1F), -1);
        assert_eq!(sign_extend_exponent(0x17), -9);
    }

    #[test]
    fn linear11_round_trips_representable_values() {
        for &(value, exp) in &[(230.0, -2), (1.5, -6), (-12.25, -4), (650.0, 0), (0.0, -8)] {
            let word = f64_to_linear11(value, exp);
            let back = linear11_to_f64(word);
            let step = 2f64.powi(i32::from(exp));
            assert!(
                (back - value).abs() <= step / 2.0,
                "{value} @ 2^{exp} -> {back}"
            );
        }
    }

    #[test]
    fn linear11_clamps_mantissa() {
        // 5000 / 2^0 exceeds the 11-bit range; result saturates at 1023.
        assert_eq!(linear11_to_f64(f64_to_linear11(5000.0, 0)), 1023.0);
        assert_eq!(linear11_to_f64(f64_to_linear11(-5000.0, 0)), -1024.0);
    }

    #[test]
    fn linear11_negative_mantissa() {
        let word = f64_to_linear11(-34.5, -2);
        assert!((linear11_to_f64(word) + 34.5).abs() < 2f64.powi(-2));
    }

    #[test]
    fn linear16_round_trips_integral_mantissas() {
        for exp in [-13i8, -9, -2, 0, 3] {
            for mantissa in [0u16, 1, 614, 6144, 65535] {
                let value = linear16_to_f64(mantissa, exp);
                assert_eq!(f64_to_linear16(value, exp), mantissa);
            }
        }
    }

    #[test]
    fn linear16_saturates() {
        assert_eq!(f64_to_linear16(-1.0, 0), 0);
        assert_eq!(f64_to_linear16(1e9, 0), u16::MAX);
    }
}
