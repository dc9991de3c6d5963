use std::ops::{Deref, DerefMut};

use basalt_error::basalt_panic;

use crate::{Buffer, MAX_BUFFER_SIZE, grown_capacity};

/// A mutable, growable buffer of items of `T`, frozen into an immutable
/// [`Buffer<T>`] once building completes.
///
/// Growth follows the engine-wide geometric schedule ([`grown_capacity`]) and
/// is capped at [`MAX_BUFFER_SIZE`]; exceeding the cap is a fail-fast error
/// since downstream offsets are `i32`.
#[derive(Debug, Default)]
pub struct BufferMut<T> {
    values: Vec<T>,
}

impl<T> BufferMut<T> {
    pub fn empty() -> Self {
        Self { values: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            values: Vec::with_capacity(capacity.min(MAX_BUFFER_SIZE)),
        }
    }

    /// Returns a new `BufferMut<T>` copied from the provided slice.
    pub fn copy_from(values: impl AsRef<[T]>) -> Self
    where
        T: Clone,
    {
        Self {
            values: values.as_ref().to_vec(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.values.capacity()
    }

    /// Append one element, growing geometrically on first overflow.
    #[inline]
    pub fn push(&mut self, value: T) {
        if self.values.len() == self.values.capacity() {
            self.grow(self.values.len() + 1);
        }
        self.values.push(value);
    }

    /// Append `n` copies of `value`.
    pub fn push_n(&mut self, value: T, n: usize)
    where
        T: Clone,
    {
        self.reserve(n);
        for _ in 0..n {
            self.values.push(value.clone());
        }
    }

    pub fn extend_from_slice(&mut self, other: &[T])
    where
        T: Clone,
    {
        self.reserve(other.len());
        self.values.extend_from_slice(other);
    }

    /// Ensure capacity for `additional` further elements.
    pub fn reserve(&mut self, additional: usize) {
        let required = self.values.len() + additional;
        if required > self.values.capacity() {
            self.grow(required);
        }
    }

    fn grow(&mut self, min_capacity: usize) {
        if min_capacity > MAX_BUFFER_SIZE {
            basalt_panic!(
                OutOfBounds: "buffer capacity {} exceeds maximum {}",
                min_capacity,
                MAX_BUFFER_SIZE
            );
        }
        let new_capacity = grown_capacity(self.values.capacity(), min_capacity);
        self.values.reserve_exact(new_capacity - self.values.len());
    }

    #[inline]
    pub fn as_slice(&self) -> &[T] {
        &self.values
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.values
    }

    /// Freeze into an immutable [`Buffer`]. Trailing spare capacity is
    /// released; the frozen buffer is whole (compact) by construction.
    pub fn freeze(self) -> Buffer<T> {
        Buffer::from_vec(self.values)
    }
}

impl<T> Deref for BufferMut<T> {
    type Target = [T];

    fn deref(&self) -> &Self::Target {
        self.as_slice()
    }
}

impl<T> DerefMut for BufferMut<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.as_mut_slice()
    }
}

impl<T> Extend<T> for BufferMut<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        self.values.extend(iter);
    }
}

impl<T> FromIterator<T> for BufferMut<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{BufferMut, DEFAULT_CAPACITY};

    #[test]
    fn push_grows_geometrically() {
        let mut buf = BufferMut::<i64>::empty();
        buf.push(1);
        assert_eq!(buf.capacity(), DEFAULT_CAPACITY);
        for i in 0..DEFAULT_CAPACITY as i64 {
            buf.push(i);
        }
        assert_eq!(buf.capacity(), DEFAULT_CAPACITY + DEFAULT_CAPACITY / 2);
    }

    #[test]
    fn freeze_round_trips_values() {
        let mut buf = BufferMut::with_capacity(4);
        buf.extend_from_slice(&[1i32, 2, 3]);
        let frozen = buf.freeze();
        assert_eq!(frozen.as_slice(), &[1, 2, 3]);
        assert!(frozen.is_whole());
    }

    #[test]
    fn push_n_repeats() {
        let mut buf = BufferMut::empty();
        buf.push_n(7u8, 5);
        assert_eq!(buf.as_slice(), &[7, 7, 7, 7, 7]);
    }
}
