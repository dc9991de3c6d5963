use std::mem;
use std::sync::Arc;

use basalt_buffer::{Buffer, BufferMut};
use basalt_error::{BasaltResult, BasaltUnwrap, basalt_bail};
use rustc_hash::FxHasher;

use crate::block::{Block, BlockRef};
use crate::builder::BlockBuilder;
use crate::checks::{
    check_readable_position, check_valid_positions, check_valid_region, check_value_offset,
};
use crate::compact::{compact_buffer, compact_nulls};
use crate::status::BlockBuilderStatus;

const WIDTH_IN_BYTES: usize = 12;
const ENTRY_SIZE: usize = WIDTH_IN_BYTES + 1;

/// Fixed 96-bit values in split lanes: a signed 64-bit high lane and an
/// unsigned 32-bit low lane. `get_long(p, 0)` reads the high lane and
/// `get_int(p, 8)` the low lane, so the generic accessor surface can address
/// the halves.
#[derive(Clone, Debug)]
pub struct Int96Block {
    hi: Buffer<i64>,
    lo: Buffer<u32>,
    nulls: Option<Buffer<bool>>,
}

impl Int96Block {
    pub fn try_new(
        hi: Buffer<i64>,
        lo: Buffer<u32>,
        nulls: Option<Buffer<bool>>,
    ) -> BasaltResult<Self> {
        if hi.len() != lo.len() {
            basalt_bail!("lane lengths differ: hi={}, lo={}", hi.len(), lo.len());
        }
        if let Some(nulls) = &nulls {
            if nulls.len() != hi.len() {
                basalt_bail!(
                    "null vector length {} does not match value count {}",
                    nulls.len(),
                    hi.len()
                );
            }
        }
        Ok(Self { hi, lo, nulls })
    }

    fn single_null() -> Self {
        Self {
            hi: Buffer::full(0, 1),
            lo: Buffer::full(0, 1),
            nulls: Some(Buffer::full(true, 1)),
        }
    }

    pub fn hi_values(&self) -> &Buffer<i64> {
        &self.hi
    }

    pub fn lo_values(&self) -> &Buffer<u32> {
        &self.lo
    }
}

impl Block for Int96Block {
    fn block_name(&self) -> &'static str {
        "Int96Block"
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn position_count(&self) -> usize {
        self.hi.len()
    }

    fn size_in_bytes(&self) -> usize {
        ENTRY_SIZE * self.hi.len()
    }

    fn retained_size_in_bytes(&self) -> usize {
        size_of::<Self>()
            + self.hi.retained_size_in_bytes()
            + self.lo.retained_size_in_bytes()
            + self.nulls.as_ref().map_or(0, Buffer::retained_size_in_bytes)
    }

    fn region_size_in_bytes(&self, position: usize, length: usize) -> usize {
        check_valid_region(self.hi.len(), position, length);
        ENTRY_SIZE * length
    }

    fn positions_size_in_bytes(&self, positions: &[bool], selected_count: usize) -> usize {
        check_valid_region(self.hi.len(), 0, positions.len());
        ENTRY_SIZE * selected_count
    }

    fn estimated_data_size_for_stats(&self, position: usize) -> usize {
        if self.is_null(position) {
            0
        } else {
            WIDTH_IN_BYTES
        }
    }

    fn may_have_null(&self) -> bool {
        self.nulls.is_some()
    }

    fn is_null(&self, position: usize) -> bool {
        check_readable_position(self.hi.len(), position);
        self.nulls.as_ref().is_some_and(|nulls| nulls[position])
    }

    fn get_long(&self, position: usize, offset: usize) -> i64 {
        check_value_offset(self.block_name(), offset, &[0]);
        check_readable_position(self.hi.len(), position);
        self.hi[position]
    }

    fn get_int(&self, position: usize, offset: usize) -> i32 {
        check_value_offset(self.block_name(), offset, &[8]);
        check_readable_position(self.lo.len(), position);
        self.lo[position] as i32
    }

    fn get_int96(&self, position: usize) -> (i64, u32) {
        check_readable_position(self.hi.len(), position);
        (self.hi[position], self.lo[position])
    }

    fn hash_position(&self, position: usize) -> u64 {
        use std::hash::{Hash, Hasher};
        check_readable_position(self.hi.len(), position);
        let mut hasher = FxHasher::default();
        (self.hi[position], self.lo[position]).hash(&mut hasher);
        hasher.finish()
    }

    fn positions_equal(&self, position: usize, other: &dyn Block, other_position: usize) -> bool {
        if self.is_null(position) || other.is_null(other_position) {
            return self.is_null(position) == other.is_null(other_position);
        }
        self.get_int96(position) == other.get_int96(other_position)
    }

    fn get_region(&self, position: usize, length: usize) -> BlockRef {
        check_valid_region(self.hi.len(), position, length);
        Arc::new(Self {
            hi: self.hi.slice(position..position + length),
            lo: self.lo.slice(position..position + length),
            nulls: self
                .nulls
                .as_ref()
                .map(|nulls| nulls.slice(position..position + length)),
        })
    }

    fn copy_region(&self, position: usize, length: usize) -> BlockRef {
        check_valid_region(self.hi.len(), position, length);
        Arc::new(Self {
            hi: compact_buffer(&self.hi, position, length),
            lo: compact_buffer(&self.lo, position, length),
            nulls: compact_nulls(self.nulls.as_ref(), position, length),
        })
    }

    fn copy_positions(&self, positions: &[usize]) -> BlockRef {
        check_valid_positions(positions, self.hi.len());
        Arc::new(Self {
            hi: positions.iter().map(|&p| self.hi[p]).collect(),
            lo: positions.iter().map(|&p| self.lo[p]).collect(),
            nulls: self
                .nulls
                .as_ref()
                .map(|nulls| positions.iter().map(|&p| nulls[p]).collect()),
        })
    }

    fn get_single_value_block(&self, position: usize) -> BlockRef {
        check_readable_position(self.hi.len(), position);
        if self.is_null(position) {
            return Arc::new(Self::single_null());
        }
        Arc::new(Self {
            hi: Buffer::full(self.hi[position], 1),
            lo: Buffer::full(self.lo[position], 1),
            nulls: self.nulls.as_ref().map(|_| Buffer::full(false, 1)),
        })
    }

    fn loaded_block(self: Arc<Self>) -> BlockRef {
        self
    }
}

/// Builder for [`Int96Block`].
#[derive(Debug)]
pub struct Int96BlockBuilder {
    status: Option<BlockBuilderStatus>,
    hi: BufferMut<i64>,
    lo: BufferMut<u32>,
    nulls: BufferMut<bool>,
    has_null_value: bool,
    has_non_null_value: bool,
}

impl Int96BlockBuilder {
    pub fn new(status: Option<BlockBuilderStatus>, expected_entries: usize) -> Self {
        Self {
            status,
            hi: BufferMut::with_capacity(expected_entries),
            lo: BufferMut::with_capacity(expected_entries),
            nulls: BufferMut::with_capacity(expected_entries),
            has_null_value: false,
            has_non_null_value: false,
        }
    }

    pub fn append_value(&mut self, hi: i64, lo: u32) {
        self.hi.push(hi);
        self.lo.push(lo);
        self.nulls.push(false);
        self.has_non_null_value = true;
        self.report_entry();
    }

    fn report_entry(&mut self) {
        if let Some(status) = &mut self.status {
            status.add_bytes(ENTRY_SIZE);
        }
    }
}

impl BlockBuilder for Int96BlockBuilder {
    fn builder_name(&self) -> &'static str {
        "Int96BlockBuilder"
    }

    fn position_count(&self) -> usize {
        self.hi.len()
    }

    fn size_in_bytes(&self) -> usize {
        ENTRY_SIZE * self.hi.len()
    }

    fn retained_size_in_bytes(&self) -> usize {
        size_of::<Self>()
            + self.hi.capacity() * size_of::<i64>()
            + self.lo.capacity() * size_of::<u32>()
            + self.nulls.capacity()
    }

    fn write_int96(&mut self, hi: i64, lo: u32) {
        self.append_value(hi, lo);
    }

    fn append_null(&mut self) {
        self.hi.push(0);
        self.lo.push(0);
        self.nulls.push(true);
        self.has_null_value = true;
        self.report_entry();
    }

    fn build(&mut self) -> BlockRef {
        let position_count = self.hi.len();
        let hi = mem::take(&mut self.hi).freeze();
        let lo = mem::take(&mut self.lo).freeze();
        let nulls = mem::take(&mut self.nulls).freeze();

        let block: BlockRef = if !self.has_non_null_value && position_count > 0 {
            Arc::new(
                crate::blocks::RunLengthEncodedBlock::try_new(
                    Arc::new(Int96Block::single_null()),
                    position_count,
                )
                .basalt_unwrap(),
            )
        } else {
            Arc::new(Int96Block {
                hi,
                lo,
                nulls: self.has_null_value.then_some(nulls),
            })
        };
        self.has_null_value = false;
        self.has_non_null_value = false;
        block
    }

    fn new_block_builder_like(&self, status: Option<BlockBuilderStatus>) -> Box<dyn BlockBuilder> {
        Box::new(Self::new(status, self.hi.capacity()))
    }
}
