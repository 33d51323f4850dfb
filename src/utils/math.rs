//! Mathematical utility functions.

use crate::Result;

/// Rounds `value` up to the next multiple of `alignment`.
///
/// PE alignments are powers of two, which makes the mask form exact. An alignment of zero
/// leaves the value untouched.
///
/// # Errors
///
/// Returns [`crate::Error::Malformed`] if `alignment` is not a power of two or the result
/// overflows `u32`.
///
/// # Examples
///
/// ```rust
/// use dotsign::utils::align_up;
///
/// assert_eq!(align_up(432, 0x200)?, 0x200);
/// assert_eq!(align_up(0x200, 0x200)?, 0x200);
/// # Ok::<(), dotsign::Error>(())
/// ```
pub fn align_up(value: u32, alignment: u32) -> Result<u32> {
    if alignment == 0 {
        return Ok(value);
    }
    if is_power_of_two(i64::from(alignment)).is_none() {
        return Err(malformed_error!(
            "Alignment {} is not a power of two",
            alignment
        ));
    }

    let Some(padded) = value.checked_add(alignment - 1) else {
        return Err(malformed_error!(
            "Aligning {} to {} overflows u32",
            value,
            alignment
        ));
    };

    Ok(padded & !(alignment - 1))
}

/// Checks if a value is a power of two and returns the exponent.
///
/// Returns `Some(n)` if `value == 2^n`, `None` otherwise.
/// Only works for positive values.
#[must_use]
#[allow(clippy::cast_sign_loss)] // value > 0 verified above
#[allow(clippy::cast_possible_truncation)] // trailing_zeros <= 63 for u64
pub fn is_power_of_two(value: i64) -> Option<u8> {
    if value <= 0 {
        return None;
    }
    let value = value as u64;
    if value.is_power_of_two() {
        Some(value.trailing_zeros() as u8)
    } else {
        None
    }
}
