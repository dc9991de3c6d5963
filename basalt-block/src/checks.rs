//! Fail-fast validation of positions and regions.
//!
//! These checks are the block layer's only input validation; a failure is a
//! caller bug or upstream corruption and aborts immediately rather than
//! propagating a silently wrong answer.

use basalt_error::basalt_panic;

/// Panic unless `position` addresses a readable entry.
#[inline]
pub fn check_readable_position(position_count: usize, position: usize) {
    if position >= position_count {
        basalt_panic!(
            OutOfBounds: "position {} out of range for block of {} positions",
            position,
            position_count
        );
    }
}

/// Panic unless `[position, position + length)` lies within the block.
#[inline]
pub fn check_valid_region(position_count: usize, position: usize, length: usize) {
    if position.checked_add(length).is_none_or(|end| end > position_count) {
        basalt_panic!(
            OutOfBounds: "region [{}, {}+{}) out of range for block of {} positions",
            position,
            position,
            length,
            position_count
        );
    }
}

/// Panic unless every requested position addresses a readable entry.
#[inline]
pub fn check_valid_positions(positions: &[usize], position_count: usize) {
    for &position in positions {
        check_readable_position(position_count, position);
    }
}

/// Panic unless a fixed-width accessor was called with the byte offset the
/// representation expects (0, or 8 for the second lane of a wide value).
#[inline]
pub(crate) fn check_value_offset(name: &str, offset: usize, expected: &[usize]) {
    if !expected.contains(&offset) {
        basalt_panic!(
            InvalidArgument: "{} does not support value offset {}",
            name,
            offset
        );
    }
}

/// Panic for an operation the representation does not support.
#[inline]
pub(crate) fn unsupported_op(name: &str, op: &str) -> ! {
    basalt_panic!(Unsupported: "{} does not support {}", name, op)
}

#[cfg(test)]
mod tests {
    use crate::checks::{check_readable_position, check_valid_region};

    #[test]
    fn in_range_positions_pass() {
        check_readable_position(3, 2);
        check_valid_region(3, 1, 2);
        check_valid_region(3, 3, 0);
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn position_at_count_fails() {
        check_readable_position(3, 3);
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn region_overflow_fails() {
        check_valid_region(usize::MAX, usize::MAX, 2);
    }
}
