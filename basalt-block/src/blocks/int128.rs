use std::mem;
use std::sync::Arc;

use basalt_buffer::{Buffer, BufferMut};
use basalt_error::{BasaltResult, BasaltUnwrap, basalt_bail};
use basalt_i128::I128;
use rustc_hash::FxHasher;

use crate::block::{Block, BlockRef};
use crate::builder::BlockBuilder;
use crate::checks::{
    check_readable_position, check_valid_positions, check_valid_region, check_value_offset,
};
use crate::compact::{compact_buffer, compact_nulls};
use crate::status::BlockBuilderStatus;

const WIDTH_IN_BYTES: usize = 16;
const ENTRY_SIZE: usize = WIDTH_IN_BYTES + 1;

/// Fixed 128-bit values ([`I128`]) in split hi/lo lanes, the physical
/// encoding for decimals wider than 64 bits. `get_long(p, 0)` reads the high
/// lane and `get_long(p, 8)` the low lane reinterpreted as `i64`.
#[derive(Clone, Debug)]
pub struct Int128Block {
    hi: Buffer<i64>,
    lo: Buffer<u64>,
    nulls: Option<Buffer<bool>>,
}

impl Int128Block {
    pub fn try_new(
        hi: Buffer<i64>,
        lo: Buffer<u64>,
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

    pub fn from_values(values: impl IntoIterator<Item = I128>) -> Self {
        let (hi, lo): (Vec<i64>, Vec<u64>) =
            values.into_iter().map(|v| (v.hi(), v.lo())).unzip();
        Self {
            hi: Buffer::from_vec(hi),
            lo: Buffer::from_vec(lo),
            nulls: None,
        }
    }

    fn single_null() -> Self {
        Self {
            hi: Buffer::full(0, 1),
            lo: Buffer::full(0, 1),
            nulls: Some(Buffer::full(true, 1)),
        }
    }

    #[inline]
    fn value(&self, position: usize) -> I128 {
        check_readable_position(self.hi.len(), position);
        I128::from_parts(self.hi[position], self.lo[position])
    }
}

impl Block for Int128Block {
    fn block_name(&self) -> &'static str {
        "Int128Block"
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
        check_value_offset(self.block_name(), offset, &[0, 8]);
        check_readable_position(self.hi.len(), position);
        if offset == 0 {
            self.hi[position]
        } else {
            self.lo[position] as i64
        }
    }

    fn get_i128(&self, position: usize) -> I128 {
        self.value(position)
    }

    fn hash_position(&self, position: usize) -> u64 {
        use std::hash::{Hash, Hasher};
        check_readable_position(self.hi.len(), position);
        let mut hasher = FxHasher::default();
        self.value(position).hash(&mut hasher);
        hasher.finish()
    }

    fn positions_equal(&self, position: usize, other: &dyn Block, other_position: usize) -> bool {
        if self.is_null(position) || other.is_null(other_position) {
            return self.is_null(position) == other.is_null(other_position);
        }
        self.value(position) == other.get_i128(other_position)
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

/// Builder for [`Int128Block`].
#[derive(Debug)]
pub struct Int128BlockBuilder {
    status: Option<BlockBuilderStatus>,
    hi: BufferMut<i64>,
    lo: BufferMut<u64>,
    nulls: BufferMut<bool>,
    has_null_value: bool,
    has_non_null_value: bool,
}

impl Int128BlockBuilder {
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

    pub fn append_value(&mut self, value: I128) {
        self.hi.push(value.hi());
        self.lo.push(value.lo());
        self.nulls.push(false);
        self.has_non_null_value = true;
        self.report_entry();
    }

    /// Append a value checked against a maximum absolute magnitude, for
    /// columns narrower than the full 128-bit range (e.g. a decimal
    /// precision bound). Out-of-range values are rejected rather than
    /// aborting the batch.
    pub fn append_value_checked(&mut self, value: I128, max_abs_exclusive: I128) -> BasaltResult<()> {
        if value >= max_abs_exclusive || value <= I128::ZERO.wrapping_sub(max_abs_exclusive) {
            basalt_bail!(
                ValueOutOfRange: "value {} exceeds column range (+/-{})",
                value,
                max_abs_exclusive
            );
        }
        self.append_value(value);
        Ok(())
    }

    fn report_entry(&mut self) {
        if let Some(status) = &mut self.status {
            status.add_bytes(ENTRY_SIZE);
        }
    }
}

impl BlockBuilder for Int128BlockBuilder {
    fn builder_name(&self) -> &'static str {
        "Int128BlockBuilder"
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
            + self.lo.capacity() * size_of::<u64>()
            + self.nulls.capacity()
    }

    fn write_i128(&mut self, value: I128) {
        self.append_value(value);
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
                    Arc::new(Int128Block::single_null()),
                    position_count,
                )
                .basalt_unwrap(),
            )
        } else {
            Arc::new(Int128Block {
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

#[cfg(test)]
mod tests {
    use basalt_i128::I128;

    use crate::blocks::{Int128Block, Int128BlockBuilder};
    use crate::{Block, BlockBuilder};

    #[test]
    fn round_trip_wide_values() {
        let mut builder = Int128BlockBuilder::new(None, 3);
        builder.append_value(I128::from_i128(1i128 << 100));
        builder.append_null();
        builder.append_value(I128::MIN);
        let block = builder.build();

        assert_eq!(block.get_i128(0).as_i128(), 1i128 << 100);
        assert!(block.is_null(1));
        assert_eq!(block.get_i128(2), I128::MIN);
        assert_eq!(block.get_long(2, 0), i64::MIN);
        assert_eq!(block.get_long(2, 8), 0);
    }

    #[test]
    fn checked_append_rejects_wide_value() {
        let mut builder = Int128BlockBuilder::new(None, 1);
        let bound = I128::from_i128(10i128.pow(18));
        builder
            .append_value_checked(I128::from_i64(5), bound)
            .unwrap();
        let err = builder
            .append_value_checked(I128::from_i128(10i128.pow(20)), bound)
            .unwrap_err();
        assert!(err.to_string().contains("value out of range"));
        assert_eq!(builder.position_count(), 1);
    }

    #[test]
    fn positions_equal_across_blocks() {
        let a = Int128Block::from_values([I128::from_i64(3), I128::from_i64(4)]);
        let b = Int128Block::from_values([I128::from_i64(4)]);
        assert!(a.positions_equal(1, &b, 0));
        assert!(!a.positions_equal(0, &b, 0));
    }
}
