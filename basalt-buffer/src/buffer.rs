use std::fmt::{Debug, Formatter};
use std::ops::{Deref, Range};
use std::sync::Arc;

use basalt_error::basalt_panic;

use crate::BufferMut;

/// An immutable, cheaply cloneable buffer of items of `T`.
///
/// A `Buffer` is a `(storage, offset, len)` view over shared `Arc<[T]>`
/// storage. Cloning and slicing never copy; two buffers produced from the same
/// storage alias the same allocation, which is safe because the storage is
/// never mutated after construction.
pub struct Buffer<T> {
    storage: Arc<[T]>,
    offset: usize,
    len: usize,
}

impl<T> Clone for Buffer<T> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
            offset: self.offset,
            len: self.len,
        }
    }
}

impl<T> Buffer<T> {
    /// Create an empty buffer.
    pub fn empty() -> Self {
        Self::from_vec(Vec::new())
    }

    /// Returns a new `Buffer<T>` copied from the provided slice.
    pub fn copy_from(values: impl AsRef<[T]>) -> Self
    where
        T: Clone,
    {
        Self::from_vec(values.as_ref().to_vec())
    }

    /// Take zero-copy ownership of a `Vec<T>`.
    pub fn from_vec(values: Vec<T>) -> Self {
        let len = values.len();
        Self {
            storage: Arc::from(values),
            offset: 0,
            len,
        }
    }

    /// Create a buffer holding `len` copies of `item`.
    pub fn full(item: T, len: usize) -> Self
    where
        T: Clone,
    {
        Self::from_vec(vec![item; len])
    }

    /// The number of elements visible through this view.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The visible elements as a slice.
    #[inline]
    pub fn as_slice(&self) -> &[T] {
        &self.storage[self.offset..self.offset + self.len]
    }

    /// Zero-copy subview. The result shares this buffer's storage.
    ///
    /// ## Panics
    ///
    /// Panics if the range extends past the end of the buffer.
    pub fn slice(&self, range: Range<usize>) -> Self {
        if range.start > range.end || range.end > self.len {
            basalt_panic!(
                OutOfBounds: "slice {}..{} out of range for buffer of length {}",
                range.start,
                range.end,
                self.len
            );
        }
        Self {
            storage: Arc::clone(&self.storage),
            offset: self.offset + range.start,
            len: range.end - range.start,
        }
    }

    /// True if `self` and `other` are views over the same allocation.
    #[inline]
    pub fn same_backing(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.storage, &other.storage)
    }

    /// True if this view spans its entire backing allocation. A whole view is
    /// by definition compact: no retained element lies outside the view.
    #[inline]
    pub fn is_whole(&self) -> bool {
        self.offset == 0 && self.len == self.storage.len()
    }

    /// Number of elements retained by the backing allocation, counting
    /// elements outside this view. Feeds retained-size accounting.
    #[inline]
    pub fn retained_len(&self) -> usize {
        self.storage.len()
    }

    /// Bytes retained by the backing allocation.
    #[inline]
    pub fn retained_size_in_bytes(&self) -> usize {
        self.storage.len() * size_of::<T>()
    }
}

impl<T> Deref for Buffer<T> {
    type Target = [T];

    fn deref(&self) -> &Self::Target {
        self.as_slice()
    }
}

impl<T> AsRef<[T]> for Buffer<T> {
    fn as_ref(&self) -> &[T] {
        self.as_slice()
    }
}

impl<T: Debug> Debug for Buffer<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("len", &self.len)
            .field("values", &self.as_slice())
            .finish()
    }
}

impl<T: PartialEq> PartialEq for Buffer<T> {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl<T: Eq> Eq for Buffer<T> {}

impl<T> From<Vec<T>> for Buffer<T> {
    fn from(values: Vec<T>) -> Self {
        Self::from_vec(values)
    }
}

impl<T> From<BufferMut<T>> for Buffer<T> {
    fn from(values: BufferMut<T>) -> Self {
        values.freeze()
    }
}

impl<T> FromIterator<T> for Buffer<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::from_vec(iter.into_iter().collect())
    }
}

impl<'a, T> IntoIterator for &'a Buffer<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.as_slice().iter()
    }
}

#[cfg(test)]
mod tests {
    use crate::Buffer;

    #[test]
    fn slice_is_zero_copy() {
        let buf = Buffer::from_vec((0i32..100).collect());
        let sub = buf.slice(10..20);
        assert_eq!(sub.as_slice(), (10i32..20).collect::<Vec<_>>());
        assert!(sub.same_backing(&buf));
        assert!(!sub.is_whole());
        assert_eq!(sub.retained_len(), 100);
    }

    #[test]
    fn whole_view_is_compact() {
        let buf = Buffer::from_vec(vec![1i64, 2, 3]);
        assert!(buf.is_whole());
        assert!(buf.slice(0..3).is_whole());
    }

    #[test]
    fn slice_of_slice_composes_offsets() {
        let buf = Buffer::from_vec((0i32..10).collect());
        let sub = buf.slice(2..8).slice(1..4);
        assert_eq!(sub.as_slice(), &[3, 4, 5]);
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn slice_past_end_panics() {
        Buffer::from_vec(vec![1u8, 2]).slice(1..3).slice(1..3);
    }
}
