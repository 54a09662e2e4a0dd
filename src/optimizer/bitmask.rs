//! Bit-range helpers over native-width affinity masks
//!
//! All bit operations count from the least significant bit: bit 0 is core 0.

use thiserror::Error;

/// Number of bits in a native (pointer-sized) integer.
pub const NATIVE_WIDTH: u32 = usize::BITS;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BitMaskError {
    /// `start + count` runs past the native width
    #[error("bit range {start}+{count} exceeds the {width}-bit native width")]
    Range { start: u32, count: u32, width: u32 },

    #[error("binary strings differ in length ({left} vs {right})")]
    LengthMismatch { left: usize, right: usize },

    #[error("'{0}' is not a binary string")]
    NotBinary(String),
}

/// Sets the bit at `index`. Indices past the native width are ignored.
pub fn set_bit(value: usize, index: u32) -> usize {
    value | 1usize.checked_shl(index).unwrap_or(0)
}

/// Clears the bit at `index`. Indices past the native width are ignored.
pub fn unset_bit(value: usize, index: u32) -> usize {
    value & !1usize.checked_shl(index).unwrap_or(0)
}

/// Sets `count` bits starting at `start`.
pub fn set_bit_range(value: usize, start: u32, count: u32) -> Result<usize, BitMaskError> {
    modify_bit_range(value, start, count, true)
}

/// Clears `count` bits starting at `start`.
pub fn unset_bit_range(value: usize, start: u32, count: u32) -> Result<usize, BitMaskError> {
    modify_bit_range(value, start, count, false)
}

/// Sets (`set_bits == true`) or clears `count` bits starting at `start`.
///
/// Fails when `start + count` exceeds [`NATIVE_WIDTH`]. A negative start is
/// unrepresentable.
pub fn modify_bit_range(
    value: usize,
    start: u32,
    count: u32,
    set_bits: bool,
) -> Result<usize, BitMaskError> {
    let end = start.checked_add(count).filter(|end| *end <= NATIVE_WIDTH);
    if end.is_none() {
        return Err(BitMaskError::Range {
            start,
            count,
            width: NATIVE_WIDTH,
        });
    }

    if count == 0 {
        return Ok(value);
    }

    let ones = if count == NATIVE_WIDTH {
        usize::MAX
    } else {
        (1usize << count) - 1
    };
    let mask = ones << start;

    Ok(if set_bits { value | mask } else { value & !mask })
}

/// Renders `value` as a binary string zero-padded to the native width.
pub fn padded_binary(value: usize) -> String {
    format!("{:0width$b}", value, width = NATIVE_WIDTH as usize)
}

/// Whether two equal-length binary strings are bitwise complements over
/// their meaningful range.
///
/// Leading zeros shared by both strings are trimmed first (the shorter
/// leading-zero run decides where), then every aligned digit pair must differ.
pub fn logical_binary_complement(a: &str, b: &str) -> Result<bool, BitMaskError> {
    if a.len() != b.len() {
        return Err(BitMaskError::LengthMismatch {
            left: a.len(),
            right: b.len(),
        });
    }

    for s in [a, b] {
        if !s.bytes().all(|c| c == b'0' || c == b'1') {
            return Err(BitMaskError::NotBinary(s.to_string()));
        }
    }

    let leading_zeros = |s: &str| s.bytes().take_while(|c| *c == b'0').count();
    let trim = leading_zeros(a).min(leading_zeros(b));

    Ok(a.bytes()
        .zip(b.bytes())
        .skip(trim)
        .all(|(x, y)| x != y))
}
