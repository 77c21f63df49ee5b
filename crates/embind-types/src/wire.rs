//! Wire-word helpers.
//!
//! Every value crossing the embind ABI occupies one 8-byte slot (a "wire
//! word"). These helpers define the single encoding used everywhere: 32-bit
//! payloads are zero-extended into the low half of the word, floats travel as
//! their IEEE-754 bit patterns.

/// Encode an `i32` into the low 32 bits of a wire word.
pub fn encode_i32(value: i32) -> u64 {
    u64::from(value as u32)
}

/// Decode the low 32 bits of a wire word as an `i32`.
pub fn decode_i32(word: u64) -> i32 {
    word as u32 as i32
}

/// Encode a `u32` into the low 32 bits of a wire word.
pub fn encode_u32(value: u32) -> u64 {
    u64::from(value)
}

/// Decode the low 32 bits of a wire word as a `u32`.
pub fn decode_u32(word: u64) -> u32 {
    word as u32
}

/// Encode an `i64` as a wire word.
pub fn encode_i64(value: i64) -> u64 {
    value as u64
}

/// Decode a wire word as an `i64`.
pub fn decode_i64(word: u64) -> i64 {
    word as i64
}

/// Encode an `f32` as its bit pattern in the low 32 bits.
pub fn encode_f32(value: f32) -> u64 {
    u64::from(value.to_bits())
}

/// Decode the low 32 bits of a wire word as an `f32`.
pub fn decode_f32(word: u64) -> f32 {
    f32::from_bits(word as u32)
}

/// Encode an `f64` as its bit pattern.
pub fn encode_f64(value: f64) -> u64 {
    value.to_bits()
}

/// Decode a wire word as an `f64`.
pub fn decode_f64(word: u64) -> f64 {
    f64::from_bits(word)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn i32_round_trips_bit_exactly() {
        for v in [0, 1, -1, i32::MIN, i32::MAX, 0x7eadbeef] {
            assert_eq!(decode_i32(encode_i32(v)), v);
        }
    }

    #[test]
    fn negative_i32_is_zero_extended_not_sign_extended() {
        assert_eq!(encode_i32(-1), 0xffff_ffff);
    }

    #[test]
    fn floats_keep_their_bit_patterns() {
        for v in [0.0f64, -0.0, 1.5, f64::INFINITY, f64::MIN_POSITIVE] {
            assert_eq!(decode_f64(encode_f64(v)).to_bits(), v.to_bits());
        }
        for v in [0.0f32, -1.5, f32::NEG_INFINITY] {
            assert_eq!(decode_f32(encode_f32(v)).to_bits(), v.to_bits());
        }
    }

    #[test]
    fn i64_uses_the_full_word() {
        assert_eq!(decode_i64(encode_i64(i64::MIN)), i64::MIN);
        assert_eq!(encode_i64(-1), u64::MAX);
    }
}
