//! Shared immutable typed buffers.
//!
//! Every immutable block in the engine stores its backing arrays as
//! [`Buffer<T>`]: a cheaply cloneable view over `Arc<[T]>` storage. Slicing is
//! zero-copy, so a region view and its source block share the same allocation;
//! safety comes from immutability, not from copying. [`BufferMut<T>`] is the
//! builder-side growable counterpart, frozen exactly once into a `Buffer`.

mod buffer;
mod buffer_mut;

pub use buffer::Buffer;
pub use buffer_mut::BufferMut;

/// Largest number of elements a single buffer may hold. Offsets into buffers
/// are stored as `i32` throughout the engine, so the cap mirrors that range
/// (with headroom for the allocator, as JVM-lineage columnar engines do).
pub const MAX_BUFFER_SIZE: usize = i32::MAX as usize - 8;

/// Initial capacity used when a builder grows from empty and the caller gave
/// no expectation.
pub const DEFAULT_CAPACITY: usize = 64;

/// Geometric growth schedule shared by all builders: half-again growth from
/// the current capacity, at least the requested minimum, at least the default,
/// capped at [`MAX_BUFFER_SIZE`].
pub fn grown_capacity(current: usize, min_required: usize) -> usize {
    let grown = current + current / 2;
    grown.max(min_required).max(DEFAULT_CAPACITY).min(MAX_BUFFER_SIZE)
}

#[cfg(test)]
mod tests {
    use crate::{DEFAULT_CAPACITY, MAX_BUFFER_SIZE, grown_capacity};

    #[test]
    fn growth_from_empty_uses_default() {
        assert_eq!(grown_capacity(0, 1), DEFAULT_CAPACITY);
    }

    #[test]
    fn growth_is_half_again() {
        assert_eq!(grown_capacity(1024, 1025), 1536);
    }

    #[test]
    fn growth_is_capped() {
        assert_eq!(grown_capacity(MAX_BUFFER_SIZE, MAX_BUFFER_SIZE), MAX_BUFFER_SIZE);
    }
}
