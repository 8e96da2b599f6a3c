//! Order-preserving float to `u32` key encoding.
//!
//! Unsigned comparison of encoded keys matches float comparison of the
//! inputs, so a radix sort over the key bits orders floats correctly. The
//! GPU sort consumes the same encoding.

const SIGN_BIT: u32 = 0x8000_0000;

/// Encodes a signed value for ascending order.
///
/// Non-negative values get the sign bit set; negative values are inverted
/// so larger magnitudes sort first.
#[inline]
#[must_use]
pub fn encode_ascending(value: f32) -> u32 {
    let bits = value.to_bits();
    if bits & SIGN_BIT == 0 {
        bits | SIGN_BIT
    } else {
        !bits
    }
}

/// Encodes a signed value for descending order.
#[inline]
#[must_use]
pub fn encode_descending(value: f32) -> u32 {
    !encode_ascending(value)
}

/// Encodes a value known to be non-negative for ascending order.
#[inline]
#[must_use]
pub fn encode_non_negative(value: f32) -> u32 {
    value.to_bits() | SIGN_BIT
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLES: [f32; 11] = [
        f32::NEG_INFINITY,
        -1.0e30,
        -42.5,
        -1.0,
        -f32::MIN_POSITIVE,
        0.0,
        f32::MIN_POSITIVE,
        0.5,
        1.0,
        1.0e30,
        f32::INFINITY,
    ];

    #[test]
    fn test_ascending_preserves_order() {
        for pair in SAMPLES.windows(2) {
            assert!(
                encode_ascending(pair[0]) < encode_ascending(pair[1]),
                "{} vs {}",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn test_descending_reverses_order() {
        for pair in SAMPLES.windows(2) {
            assert!(encode_descending(pair[0]) > encode_descending(pair[1]));
        }
    }

    #[test]
    fn test_non_negative_matches_ascending() {
        for &value in SAMPLES.iter().filter(|v| **v >= 0.0) {
            assert_eq!(encode_non_negative(value), encode_ascending(value));
        }
    }

    #[test]
    fn test_zero_sits_above_negatives() {
        assert_eq!(encode_ascending(0.0), SIGN_BIT);
        assert!(encode_ascending(-0.0) < encode_ascending(0.0));
        assert!(encode_ascending(-1.0e-40) < encode_ascending(0.0));
    }
}
