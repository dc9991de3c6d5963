use std::mem;
use std::sync::Arc;

use basalt_buffer::{Buffer, BufferMut};
use basalt_error::{BasaltResult, basalt_panic};

use crate::block::{Block, BlockRef};
use crate::blocks::nested::{PER_POSITION_OVERHEAD, check_offsets};
use crate::builder::BlockBuilder;
use crate::checks::{check_readable_position, check_valid_positions, check_valid_region};
use crate::compact::{compact_nulls, compact_offsets};
use crate::status::BlockBuilderStatus;

/// Arrays of values backed by a single flat element block and an offset
/// vector: position `i`'s elements are positions `[offsets[i], offsets[i + 1])`
/// of the element block. Offsets are absolute, so a region view slices the
/// offset vector and shares the element block untouched. A null array is
/// zero-width.
#[derive(Debug)]
pub struct ArrayBlock {
    raw_elements: BlockRef,
    offsets: Buffer<i32>,
    nulls: Option<Buffer<bool>>,
}

impl ArrayBlock {
    pub fn try_new(
        raw_elements: BlockRef,
        offsets: Buffer<i32>,
        nulls: Option<Buffer<bool>>,
    ) -> BasaltResult<Self> {
        check_offsets("array", &offsets, nulls.as_ref(), raw_elements.position_count())?;
        Ok(Self {
            raw_elements,
            offsets,
            nulls,
        })
    }

    /// The flat element block shared by every position.
    pub fn raw_elements(&self) -> &BlockRef {
        &self.raw_elements
    }

    pub fn offsets(&self) -> &Buffer<i32> {
        &self.offsets
    }

    #[inline]
    fn element_range(&self, position: usize) -> (usize, usize) {
        check_readable_position(self.position_count(), position);
        (
            self.offsets[position] as usize,
            self.offsets[position + 1] as usize,
        )
    }

    fn elements_in_region(&self, position: usize, length: usize) -> (usize, usize) {
        let start = self.offsets[position] as usize;
        let end = self.offsets[position + length] as usize;
        (start, end - start)
    }
}

impl Block for ArrayBlock {
    fn block_name(&self) -> &'static str {
        "ArrayBlock"
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn position_count(&self) -> usize {
        self.offsets.len() - 1
    }

    fn size_in_bytes(&self) -> usize {
        self.region_size_in_bytes(0, self.position_count())
    }

    fn retained_size_in_bytes(&self) -> usize {
        size_of::<Self>()
            + self.raw_elements.retained_size_in_bytes()
            + self.offsets.retained_size_in_bytes()
            + self.nulls.as_ref().map_or(0, Buffer::retained_size_in_bytes)
    }

    fn region_size_in_bytes(&self, position: usize, length: usize) -> usize {
        check_valid_region(self.position_count(), position, length);
        let (start, count) = self.elements_in_region(position, length);
        self.raw_elements.region_size_in_bytes(start, count) + PER_POSITION_OVERHEAD * length
    }

    fn positions_size_in_bytes(&self, positions: &[bool], selected_count: usize) -> usize {
        check_valid_region(self.position_count(), 0, positions.len());
        let mut used = vec![false; self.raw_elements.position_count()];
        let mut used_count = 0;
        for (position, &selected) in positions.iter().enumerate() {
            if selected {
                let (start, end) = self.element_range(position);
                for flag in &mut used[start..end] {
                    if !*flag {
                        *flag = true;
                        used_count += 1;
                    }
                }
            }
        }
        self.raw_elements.positions_size_in_bytes(&used, used_count)
            + PER_POSITION_OVERHEAD * selected_count
    }

    fn estimated_data_size_for_stats(&self, position: usize) -> usize {
        let (start, end) = self.element_range(position);
        (start..end)
            .map(|p| self.raw_elements.estimated_data_size_for_stats(p))
            .sum()
    }

    fn may_have_null(&self) -> bool {
        self.nulls.is_some()
    }

    fn is_null(&self, position: usize) -> bool {
        check_readable_position(self.position_count(), position);
        self.nulls.as_ref().is_some_and(|nulls| nulls[position])
    }

    fn get_block(&self, position: usize) -> BlockRef {
        let (start, end) = self.element_range(position);
        self.raw_elements.get_region(start, end - start)
    }

    fn children(&self) -> Vec<BlockRef> {
        vec![self.raw_elements.clone()]
    }

    fn get_region(&self, position: usize, length: usize) -> BlockRef {
        check_valid_region(self.position_count(), position, length);
        Arc::new(Self {
            raw_elements: self.raw_elements.clone(),
            offsets: self.offsets.slice(position..position + length + 1),
            nulls: self
                .nulls
                .as_ref()
                .map(|nulls| nulls.slice(position..position + length)),
        })
    }

    fn copy_region(&self, position: usize, length: usize) -> BlockRef {
        check_valid_region(self.position_count(), position, length);
        let (start, count) = self.elements_in_region(position, length);
        Arc::new(Self {
            raw_elements: self.raw_elements.copy_region(start, count),
            offsets: compact_offsets(&self.offsets, position, length),
            nulls: compact_nulls(self.nulls.as_ref(), position, length),
        })
    }

    fn copy_positions(&self, positions: &[usize]) -> BlockRef {
        check_valid_positions(positions, self.position_count());
        // One batched copy of the element block instead of a copy per array.
        let mut element_positions = Vec::new();
        let mut offsets = BufferMut::with_capacity(positions.len() + 1);
        offsets.push(0i32);
        for &p in positions {
            let (start, end) = self.element_range(p);
            element_positions.extend(start..end);
            offsets.push(element_positions.len() as i32);
        }
        let nulls = self
            .nulls
            .as_ref()
            .map(|nulls| positions.iter().map(|&p| nulls[p]).collect());
        Arc::new(Self {
            raw_elements: self.raw_elements.copy_positions(&element_positions),
            offsets: offsets.freeze(),
            nulls,
        })
    }

    fn get_single_value_block(&self, position: usize) -> BlockRef {
        self.copy_region(position, 1)
    }

    fn is_loaded(&self) -> bool {
        self.raw_elements.is_loaded()
    }

    fn loaded_block(self: Arc<Self>) -> BlockRef {
        if self.raw_elements.is_loaded() {
            return self;
        }
        Arc::new(Self {
            raw_elements: self.raw_elements.clone().loaded_block(),
            offsets: self.offsets.clone(),
            nulls: self.nulls.clone(),
        })
    }
}

/// Builder for [`ArrayBlock`]. Array entries follow the open/close protocol:
/// `begin_block_entry` hands out the element builder, elements are written to
/// it, and `close_entry` seals the array.
#[derive(Debug)]
pub struct ArrayBlockBuilder {
    status: Option<BlockBuilderStatus>,
    element_builder: Box<dyn BlockBuilder>,
    offsets: BufferMut<i32>,
    nulls: BufferMut<bool>,
    has_null_value: bool,
    entry_open: bool,
}

impl ArrayBlockBuilder {
    pub fn new(
        element_builder: Box<dyn BlockBuilder>,
        status: Option<BlockBuilderStatus>,
        expected_entries: usize,
    ) -> Self {
        let mut offsets = BufferMut::with_capacity(expected_entries + 1);
        offsets.push(0i32);
        Self {
            status,
            element_builder,
            offsets,
            nulls: BufferMut::with_capacity(expected_entries),
            has_null_value: false,
            entry_open: false,
        }
    }

    fn finish_entry(&mut self, null: bool) {
        self.offsets.push(self.element_builder.position_count() as i32);
        self.nulls.push(null);
        self.has_null_value |= null;
        if let Some(status) = &mut self.status {
            status.add_bytes(PER_POSITION_OVERHEAD);
        }
    }
}

impl BlockBuilder for ArrayBlockBuilder {
    fn builder_name(&self) -> &'static str {
        "ArrayBlockBuilder"
    }

    fn position_count(&self) -> usize {
        self.offsets.len() - 1
    }

    fn size_in_bytes(&self) -> usize {
        self.element_builder.size_in_bytes() + PER_POSITION_OVERHEAD * self.position_count()
    }

    fn retained_size_in_bytes(&self) -> usize {
        size_of::<Self>()
            + self.element_builder.retained_size_in_bytes()
            + self.offsets.capacity() * size_of::<i32>()
            + self.nulls.capacity()
    }

    fn append_null(&mut self) {
        if self.entry_open {
            basalt_panic!("append_null while an array entry is open");
        }
        self.finish_entry(true);
    }

    fn begin_block_entry(&mut self) -> &mut dyn BlockBuilder {
        if self.entry_open {
            basalt_panic!("array entry already open");
        }
        self.entry_open = true;
        &mut *self.element_builder
    }

    fn close_entry(&mut self) {
        if !self.entry_open {
            basalt_panic!("close_entry without an open array entry");
        }
        self.entry_open = false;
        self.finish_entry(false);
    }

    fn build(&mut self) -> BlockRef {
        if self.entry_open {
            basalt_panic!("build while an array entry is open");
        }
        let raw_elements = self.element_builder.build();
        let offsets = mem::take(&mut self.offsets).freeze();
        let nulls = mem::take(&mut self.nulls).freeze();
        self.offsets.push(0i32);
        let has_null_value = mem::take(&mut self.has_null_value);
        Arc::new(ArrayBlock {
            raw_elements,
            offsets,
            nulls: has_null_value.then_some(nulls),
        })
    }

    fn new_block_builder_like(&self, status: Option<BlockBuilderStatus>) -> Box<dyn BlockBuilder> {
        let element_status = status.as_ref().map(BlockBuilderStatus::sibling);
        Box::new(Self::new(
            self.element_builder.new_block_builder_like(element_status),
            status,
            self.nulls.capacity(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use basalt_buffer::Buffer;

    use crate::blocks::{ArrayBlock, ArrayBlockBuilder, IntBlock, PrimitiveBlockBuilder};
    use crate::{Block, BlockBuilder, BlockRef};

    /// `[[1, 2], [], null, [3]]`
    fn sample() -> BlockRef {
        let mut builder = ArrayBlockBuilder::new(
            Box::new(PrimitiveBlockBuilder::<i32>::new(None, 4)),
            None,
            4,
        );
        let entry = builder.begin_block_entry();
        entry.write_int(1);
        entry.write_int(2);
        builder.close_entry();
        builder.begin_block_entry();
        builder.close_entry();
        builder.append_null();
        builder.begin_block_entry().write_int(3);
        builder.close_entry();
        builder.build()
    }

    fn as_array(block: &BlockRef) -> &ArrayBlock {
        block.as_any().downcast_ref::<ArrayBlock>().unwrap()
    }

    #[test]
    fn entries_read_back_as_regions() {
        let block = sample();
        assert_eq!(block.position_count(), 4);
        let first = block.get_block(0);
        assert_eq!(first.position_count(), 2);
        assert_eq!(first.get_int(0, 0), 1);
        assert_eq!(first.get_int(1, 0), 2);
        assert_eq!(block.get_block(1).position_count(), 0);
        assert!(block.is_null(2));
        assert_eq!(block.get_block(3).get_int(0, 0), 3);
    }

    #[test]
    fn copy_region_rebases_offsets() {
        let block = sample();
        let copied = block.copy_region(1, 3);
        let copied = as_array(&copied);
        assert_eq!(copied.offsets().as_slice(), &[0, 0, 0, 1]);
        assert_eq!(copied.raw_elements().position_count(), 1);
        assert_eq!(copied.get_block(2).get_int(0, 0), 3);
    }

    #[test]
    fn region_shares_elements() {
        let block = sample();
        let elements_before = Arc::as_ptr(as_array(&block).raw_elements());
        let region = block.get_region(0, 2);
        let region = as_array(&region);
        assert_eq!(Arc::as_ptr(region.raw_elements()), elements_before);
        assert_eq!(region.position_count(), 2);
    }

    #[test]
    fn copy_positions_batches_element_copy() {
        let block = sample();
        let copied = block.copy_positions(&[3, 0]);
        let copied = as_array(&copied);
        assert_eq!(copied.raw_elements().position_count(), 3);
        assert_eq!(copied.get_block(0).get_int(0, 0), 3);
        assert_eq!(copied.get_block(1).get_int(1, 0), 2);
    }

    #[test]
    fn null_entries_must_be_zero_width() {
        let elements: BlockRef = Arc::new(IntBlock::from_values(vec![1, 2]));
        let err = ArrayBlock::try_new(
            elements,
            Buffer::from_vec(vec![0, 2]),
            Some(Buffer::from_vec(vec![true])),
        )
        .unwrap_err();
        assert!(err.to_string().contains("zero-width"));
    }

    #[test]
    #[should_panic(expected = "entry already open")]
    fn double_open_panics() {
        let mut builder = ArrayBlockBuilder::new(
            Box::new(PrimitiveBlockBuilder::<i32>::new(None, 1)),
            None,
            1,
        );
        builder.begin_block_entry();
        builder.begin_block_entry();
    }

    #[test]
    fn size_counts_elements_and_overhead() {
        let block = sample();
        // 3 elements * 5 bytes + 4 positions * 5 bytes of offsets/nulls.
        assert_eq!(block.size_in_bytes(), 3 * 5 + 4 * 5);
    }
}
