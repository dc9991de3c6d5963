//! Compaction helpers shared by `copy_region`/`copy_positions` implementations.
//!
//! A compact block retains no data outside its logical range. The helpers fast
//! path the common case where the requested range already spans the entire
//! backing allocation: the same buffer is returned, no copy, and the caller
//! can detect that via [`Buffer::same_backing`].

use basalt_buffer::Buffer;

/// Copy `[start, start + length)` of `buffer` unless that range already *is*
/// the whole backing allocation.
pub(crate) fn compact_buffer<T: Clone>(buffer: &Buffer<T>, start: usize, length: usize) -> Buffer<T> {
    if start == 0 && length == buffer.len() && buffer.is_whole() {
        return buffer.clone();
    }
    Buffer::copy_from(&buffer.as_slice()[start..start + length])
}

/// Compact an offset vector for positions `[start, start + length)`, rebasing
/// so the first retained offset is zero. Returns `length + 1` offsets.
pub(crate) fn compact_offsets(offsets: &Buffer<i32>, start: usize, length: usize) -> Buffer<i32> {
    let base = offsets[start];
    if base == 0 {
        return compact_buffer(offsets, start, length + 1);
    }
    offsets.as_slice()[start..start + length + 1]
        .iter()
        .map(|offset| offset - base)
        .collect()
}

/// Compact an optional null vector over positions `[start, start + length)`.
pub(crate) fn compact_nulls(
    nulls: Option<&Buffer<bool>>,
    start: usize,
    length: usize,
) -> Option<Buffer<bool>> {
    nulls.map(|nulls| compact_buffer(nulls, start, length))
}

#[cfg(test)]
mod tests {
    use basalt_buffer::Buffer;

    use crate::compact::{compact_buffer, compact_offsets};

    #[test]
    fn whole_range_is_returned_unchanged() {
        let buffer = Buffer::from_vec(vec![1i64, 2, 3]);
        let compacted = compact_buffer(&buffer, 0, 3);
        assert!(compacted.same_backing(&buffer));
    }

    #[test]
    fn subrange_is_copied_out() {
        let buffer = Buffer::from_vec(vec![1i64, 2, 3, 4]);
        let compacted = compact_buffer(&buffer, 1, 2);
        assert!(!compacted.same_backing(&buffer));
        assert_eq!(compacted.as_slice(), &[2, 3]);
    }

    #[test]
    fn view_of_whole_is_still_copied() {
        // The view covers its range but the backing allocation is larger, so
        // a compact copy must detach from it.
        let buffer = Buffer::from_vec(vec![1i32, 2, 3, 4]).slice(1..3);
        let compacted = compact_buffer(&buffer, 0, 2);
        assert!(!compacted.same_backing(&buffer));
        assert_eq!(compacted.as_slice(), &[2, 3]);
    }

    #[test]
    fn offsets_are_rebased() {
        let offsets = Buffer::from_vec(vec![0i32, 2, 5, 5, 9]);
        let compacted = compact_offsets(&offsets, 1, 3);
        assert_eq!(compacted.as_slice(), &[0, 3, 3, 7]);
    }

    #[test]
    fn zero_based_whole_offsets_share_backing() {
        let offsets = Buffer::from_vec(vec![0i32, 2, 5]);
        let compacted = compact_offsets(&offsets, 0, 2);
        assert!(compacted.same_backing(&offsets));
    }
}
