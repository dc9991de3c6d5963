use std::fmt::Debug;
use std::hash::{Hash, Hasher};
use std::mem;
use std::sync::Arc;

use basalt_buffer::{Buffer, BufferMut};
use basalt_error::{BasaltResult, BasaltUnwrap, basalt_bail};
use rustc_hash::FxHasher;

use crate::block::{Block, BlockRef};
use crate::builder::BlockBuilder;
use crate::checks::{
    check_readable_position, check_valid_positions, check_valid_region, check_value_offset,
    unsupported_op,
};
use crate::compact::{compact_buffer, compact_nulls};
use crate::status::BlockBuilderStatus;

/// A fixed-width primitive stored in a flat lane by [`PrimitiveBlock`].
///
/// The trait bridges each width onto the exact [`Block`] accessor it
/// supports; mismatched accessors fall through to the unsupported-operation
/// default, mirroring the one-accessor-per-width contract.
pub trait NativeValue:
    Copy + Debug + Default + PartialEq + Hash + Send + Sync + 'static
{
    const WIDTH_IN_BYTES: usize;
    const BLOCK_NAME: &'static str;
    const BUILDER_NAME: &'static str;

    /// Read a value of this width from any block, via the matching accessor.
    fn read_block(block: &dyn Block, position: usize) -> Self;

    fn as_byte(self, name: &str) -> i8 {
        unsupported_op(name, "get_byte")
    }

    fn as_short(self, name: &str) -> i16 {
        unsupported_op(name, "get_short")
    }

    fn as_int(self, name: &str) -> i32 {
        unsupported_op(name, "get_int")
    }

    fn as_long(self, name: &str) -> i64 {
        unsupported_op(name, "get_long")
    }

    fn from_byte(_value: i8, name: &str) -> Self {
        unsupported_op(name, "write_byte")
    }

    fn from_short(_value: i16, name: &str) -> Self {
        unsupported_op(name, "write_short")
    }

    fn from_int(_value: i32, name: &str) -> Self {
        unsupported_op(name, "write_int")
    }

    fn from_long(_value: i64, name: &str) -> Self {
        unsupported_op(name, "write_long")
    }
}

impl NativeValue for i8 {
    const WIDTH_IN_BYTES: usize = 1;
    const BLOCK_NAME: &'static str = "ByteBlock";
    const BUILDER_NAME: &'static str = "ByteBlockBuilder";

    fn read_block(block: &dyn Block, position: usize) -> Self {
        block.get_byte(position, 0)
    }

    fn as_byte(self, _name: &str) -> i8 {
        self
    }

    fn from_byte(value: i8, _name: &str) -> Self {
        value
    }
}

impl NativeValue for i16 {
    const WIDTH_IN_BYTES: usize = 2;
    const BLOCK_NAME: &'static str = "ShortBlock";
    const BUILDER_NAME: &'static str = "ShortBlockBuilder";

    fn read_block(block: &dyn Block, position: usize) -> Self {
        block.get_short(position, 0)
    }

    fn as_short(self, _name: &str) -> i16 {
        self
    }

    fn from_short(value: i16, _name: &str) -> Self {
        value
    }
}

impl NativeValue for i32 {
    const WIDTH_IN_BYTES: usize = 4;
    const BLOCK_NAME: &'static str = "IntBlock";
    const BUILDER_NAME: &'static str = "IntBlockBuilder";

    fn read_block(block: &dyn Block, position: usize) -> Self {
        block.get_int(position, 0)
    }

    fn as_int(self, _name: &str) -> i32 {
        self
    }

    fn from_int(value: i32, _name: &str) -> Self {
        value
    }
}

impl NativeValue for i64 {
    const WIDTH_IN_BYTES: usize = 8;
    const BLOCK_NAME: &'static str = "LongBlock";
    const BUILDER_NAME: &'static str = "LongBlockBuilder";

    fn read_block(block: &dyn Block, position: usize) -> Self {
        block.get_long(position, 0)
    }

    fn as_long(self, _name: &str) -> i64 {
        self
    }

    fn from_long(value: i64, _name: &str) -> Self {
        value
    }
}

/// Flat fixed-width block: one primitive lane plus an optional null vector.
/// An absent null vector guarantees no nulls.
#[derive(Clone, Debug)]
pub struct PrimitiveBlock<T> {
    values: Buffer<T>,
    nulls: Option<Buffer<bool>>,
}

pub type ByteBlock = PrimitiveBlock<i8>;
pub type ShortBlock = PrimitiveBlock<i16>;
pub type IntBlock = PrimitiveBlock<i32>;
pub type LongBlock = PrimitiveBlock<i64>;

impl<T: NativeValue> PrimitiveBlock<T> {
    pub fn try_new(values: Buffer<T>, nulls: Option<Buffer<bool>>) -> BasaltResult<Self> {
        if let Some(nulls) = &nulls {
            if nulls.len() != values.len() {
                basalt_bail!(
                    "null vector length {} does not match value count {}",
                    nulls.len(),
                    values.len()
                );
            }
        }
        Ok(Self { values, nulls })
    }

    /// A block over `values` with no nulls possible.
    pub fn from_values(values: impl Into<Buffer<T>>) -> Self {
        Self {
            values: values.into(),
            nulls: None,
        }
    }

    /// A block from optional values, tracking the null pattern.
    pub fn from_option_iter<I: IntoIterator<Item = Option<T>>>(iter: I) -> Self {
        let mut values = BufferMut::empty();
        let mut nulls = BufferMut::empty();
        for item in iter {
            nulls.push(item.is_none());
            values.push(item.unwrap_or_default());
        }
        Self {
            values: values.freeze(),
            nulls: Some(nulls.freeze()),
        }
    }

    /// A one-position null block, the canonical all-null RLE value.
    pub fn single_null() -> Self {
        Self {
            values: Buffer::full(T::default(), 1),
            nulls: Some(Buffer::full(true, 1)),
        }
    }

    pub fn values(&self) -> &Buffer<T> {
        &self.values
    }

    #[inline]
    fn value(&self, position: usize) -> T {
        check_readable_position(self.values.len(), position);
        self.values[position]
    }

    #[inline]
    fn entry_size() -> usize {
        // One value lane plus one null byte per position.
        T::WIDTH_IN_BYTES + 1
    }
}

impl<T: NativeValue> Block for PrimitiveBlock<T> {
    fn block_name(&self) -> &'static str {
        T::BLOCK_NAME
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn position_count(&self) -> usize {
        self.values.len()
    }

    fn size_in_bytes(&self) -> usize {
        Self::entry_size() * self.values.len()
    }

    fn retained_size_in_bytes(&self) -> usize {
        size_of::<Self>()
            + self.values.retained_size_in_bytes()
            + self.nulls.as_ref().map_or(0, Buffer::retained_size_in_bytes)
    }

    fn region_size_in_bytes(&self, position: usize, length: usize) -> usize {
        check_valid_region(self.values.len(), position, length);
        Self::entry_size() * length
    }

    fn positions_size_in_bytes(&self, positions: &[bool], selected_count: usize) -> usize {
        check_valid_region(self.values.len(), 0, positions.len());
        Self::entry_size() * selected_count
    }

    fn estimated_data_size_for_stats(&self, position: usize) -> usize {
        if self.is_null(position) {
            0
        } else {
            T::WIDTH_IN_BYTES
        }
    }

    fn may_have_null(&self) -> bool {
        self.nulls.is_some()
    }

    fn is_null(&self, position: usize) -> bool {
        check_readable_position(self.values.len(), position);
        self.nulls.as_ref().is_some_and(|nulls| nulls[position])
    }

    fn get_byte(&self, position: usize, offset: usize) -> i8 {
        check_value_offset(self.block_name(), offset, &[0]);
        self.value(position).as_byte(self.block_name())
    }

    fn get_short(&self, position: usize, offset: usize) -> i16 {
        check_value_offset(self.block_name(), offset, &[0]);
        self.value(position).as_short(self.block_name())
    }

    fn get_int(&self, position: usize, offset: usize) -> i32 {
        check_value_offset(self.block_name(), offset, &[0]);
        self.value(position).as_int(self.block_name())
    }

    fn get_long(&self, position: usize, offset: usize) -> i64 {
        check_value_offset(self.block_name(), offset, &[0]);
        self.value(position).as_long(self.block_name())
    }

    fn hash_position(&self, position: usize) -> u64 {
        check_readable_position(self.values.len(), position);
        let mut hasher = FxHasher::default();
        self.values[position].hash(&mut hasher);
        hasher.finish()
    }

    fn positions_equal(&self, position: usize, other: &dyn Block, other_position: usize) -> bool {
        if self.is_null(position) || other.is_null(other_position) {
            return self.is_null(position) == other.is_null(other_position);
        }
        self.values[position] == T::read_block(other, other_position)
    }

    fn get_region(&self, position: usize, length: usize) -> BlockRef {
        check_valid_region(self.values.len(), position, length);
        Arc::new(Self {
            values: self.values.slice(position..position + length),
            nulls: self
                .nulls
                .as_ref()
                .map(|nulls| nulls.slice(position..position + length)),
        })
    }

    fn copy_region(&self, position: usize, length: usize) -> BlockRef {
        check_valid_region(self.values.len(), position, length);
        Arc::new(Self {
            values: compact_buffer(&self.values, position, length),
            nulls: compact_nulls(self.nulls.as_ref(), position, length),
        })
    }

    fn copy_positions(&self, positions: &[usize]) -> BlockRef {
        check_valid_positions(positions, self.values.len());
        let values = positions.iter().map(|&p| self.values[p]).collect();
        let nulls = self
            .nulls
            .as_ref()
            .map(|nulls| positions.iter().map(|&p| nulls[p]).collect());
        Arc::new(Self { values, nulls })
    }

    fn get_single_value_block(&self, position: usize) -> BlockRef {
        check_readable_position(self.values.len(), position);
        if self.is_null(position) {
            return Arc::new(Self::single_null());
        }
        Arc::new(Self {
            values: Buffer::full(self.values[position], 1),
            nulls: self.nulls.as_ref().map(|_| Buffer::full(false, 1)),
        })
    }

    fn loaded_block(self: Arc<Self>) -> BlockRef {
        self
    }
}

/// Builder for [`PrimitiveBlock`].
#[derive(Debug)]
pub struct PrimitiveBlockBuilder<T> {
    status: Option<BlockBuilderStatus>,
    values: BufferMut<T>,
    nulls: BufferMut<bool>,
    has_null_value: bool,
    has_non_null_value: bool,
}

pub type ByteBlockBuilder = PrimitiveBlockBuilder<i8>;
pub type ShortBlockBuilder = PrimitiveBlockBuilder<i16>;
pub type IntBlockBuilder = PrimitiveBlockBuilder<i32>;
pub type LongBlockBuilder = PrimitiveBlockBuilder<i64>;

impl<T: NativeValue> PrimitiveBlockBuilder<T> {
    pub fn new(status: Option<BlockBuilderStatus>, expected_entries: usize) -> Self {
        Self {
            status,
            values: BufferMut::with_capacity(expected_entries),
            nulls: BufferMut::with_capacity(expected_entries),
            has_null_value: false,
            has_non_null_value: false,
        }
    }

    pub fn append_value(&mut self, value: T) {
        self.values.push(value);
        self.nulls.push(false);
        self.has_non_null_value = true;
        self.report_entry();
    }

    pub fn append_option(&mut self, value: Option<T>) {
        match value {
            Some(value) => self.append_value(value),
            None => self.append_null_value(),
        }
    }

    fn append_null_value(&mut self) {
        self.values.push(T::default());
        self.nulls.push(true);
        self.has_null_value = true;
        self.report_entry();
    }

    fn report_entry(&mut self) {
        if let Some(status) = &mut self.status {
            status.add_bytes(PrimitiveBlock::<T>::entry_size());
        }
    }
}

impl<T: NativeValue> BlockBuilder for PrimitiveBlockBuilder<T> {
    fn builder_name(&self) -> &'static str {
        T::BUILDER_NAME
    }

    fn position_count(&self) -> usize {
        self.values.len()
    }

    fn size_in_bytes(&self) -> usize {
        PrimitiveBlock::<T>::entry_size() * self.values.len()
    }

    fn retained_size_in_bytes(&self) -> usize {
        size_of::<Self>()
            + self.values.capacity() * size_of::<T>()
            + self.nulls.capacity()
    }

    fn write_byte(&mut self, value: i8) {
        self.append_value(T::from_byte(value, self.builder_name()));
    }

    fn write_short(&mut self, value: i16) {
        self.append_value(T::from_short(value, self.builder_name()));
    }

    fn write_int(&mut self, value: i32) {
        self.append_value(T::from_int(value, self.builder_name()));
    }

    fn write_long(&mut self, value: i64) {
        self.append_value(T::from_long(value, self.builder_name()));
    }

    fn append_null(&mut self) {
        self.append_null_value();
    }

    fn build(&mut self) -> BlockRef {
        let position_count = self.values.len();
        let values = mem::take(&mut self.values).freeze();
        let nulls = mem::take(&mut self.nulls).freeze();

        // A column that never saw a non-null value collapses to a single
        // canonical null repeated position_count times.
        let block: BlockRef = if !self.has_non_null_value && position_count > 0 {
            Arc::new(
                crate::blocks::RunLengthEncodedBlock::try_new(
                    Arc::new(PrimitiveBlock::<T>::single_null()),
                    position_count,
                )
                .basalt_unwrap(),
            )
        } else {
            Arc::new(PrimitiveBlock {
                values,
                nulls: self.has_null_value.then_some(nulls),
            })
        };
        self.has_null_value = false;
        self.has_non_null_value = false;
        block
    }

    fn new_block_builder_like(&self, status: Option<BlockBuilderStatus>) -> Box<dyn BlockBuilder> {
        Box::new(Self::new(status, self.values.capacity()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::blocks::{IntBlock, IntBlockBuilder, LongBlock, RunLengthEncodedBlock};
    use crate::{Block, BlockBuilder};

    #[test]
    fn round_trip_with_nulls() {
        let mut builder = IntBlockBuilder::new(None, 3);
        builder.append_value(5);
        builder.append_null();
        builder.append_value(-3);
        let block = builder.build();

        assert_eq!(block.position_count(), 3);
        assert_eq!(block.get_int(0, 0), 5);
        assert!(block.is_null(1));
        assert_eq!(block.get_int(2, 0), -3);
    }

    #[test]
    fn all_null_build_collapses_to_rle() {
        let mut builder = IntBlockBuilder::new(None, 4);
        for _ in 0..4 {
            builder.append_null();
        }
        let block = builder.build();
        assert_eq!(block.position_count(), 4);
        assert!(block.is_null(3));
        assert!(
            block
                .as_any()
                .downcast_ref::<RunLengthEncodedBlock>()
                .is_some()
        );
    }

    #[test]
    fn region_shares_backing_and_copy_detaches() {
        let block = LongBlock::from_values(vec![1i64, 2, 3, 4, 5]);
        let region = block.get_region(1, 3);
        let region = region
            .as_any()
            .downcast_ref::<LongBlock>()
            .unwrap();
        assert!(region.values().same_backing(block.values()));
        assert_eq!(region.get_long(0, 0), 2);

        let copied = Block::copy_region(region, 0, 3);
        let copied = copied.as_any().downcast_ref::<LongBlock>().unwrap();
        assert!(!copied.values().same_backing(block.values()));
        assert_eq!(copied.get_long(2, 0), 4);
    }

    #[test]
    fn full_copy_region_keeps_backing() {
        let block = LongBlock::from_values(vec![7i64, 8]);
        let copied = block.copy_region(0, 2);
        let copied = copied.as_any().downcast_ref::<LongBlock>().unwrap();
        assert!(copied.values().same_backing(block.values()));
    }

    #[test]
    fn copy_positions_gathers() {
        let block = IntBlock::from_option_iter([Some(10), None, Some(30)]);
        let copied = block.copy_positions(&[2, 0, 2]);
        assert_eq!(copied.get_int(0, 0), 30);
        assert_eq!(copied.get_int(1, 0), 10);
        assert_eq!(copied.get_int(2, 0), 30);
        assert!(!copied.is_null(0));
    }

    #[test]
    fn size_accounting() {
        let block = IntBlock::from_values(vec![1, 2, 3, 4]);
        assert_eq!(block.size_in_bytes(), (4 + 1) * 4);
        assert_eq!(block.region_size_in_bytes(1, 2), (4 + 1) * 2);
        assert_eq!(block.estimated_data_size_for_stats(0), 4);
        assert!(!block.may_have_null());
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn out_of_range_read_panics() {
        let block = IntBlock::from_values(vec![1]);
        block.get_int(1, 0);
    }

    #[test]
    #[should_panic(expected = "unsupported")]
    fn mismatched_accessor_panics() {
        let block = IntBlock::from_values(vec![1]);
        block.get_long(0, 0);
    }

    #[test]
    #[should_panic(expected = "does not support value offset")]
    fn mismatched_offset_panics() {
        let block = IntBlock::from_values(vec![1]);
        block.get_int(0, 4);
    }

    #[test]
    fn builder_like_is_empty_same_shape() {
        let mut builder = IntBlockBuilder::new(None, 2);
        builder.append_value(1);
        let like = builder.new_block_builder_like(None);
        assert_eq!(like.position_count(), 0);
        assert_eq!(builder.position_count(), 1);
    }

    #[test]
    fn single_value_block() {
        let block = Arc::new(IntBlock::from_option_iter([Some(4), None]));
        let one = block.get_single_value_block(0);
        assert_eq!(one.position_count(), 1);
        assert_eq!(one.get_int(0, 0), 4);
        let none = block.get_single_value_block(1);
        assert!(none.is_null(0));
    }
}
