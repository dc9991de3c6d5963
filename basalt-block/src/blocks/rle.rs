use std::sync::Arc;

use basalt_buffer::Buffer;
use basalt_error::{BasaltResult, basalt_bail};
use basalt_i128::I128;

use crate::block::{Block, BlockRef};
use crate::checks::{check_readable_position, check_valid_positions, check_valid_region};

/// A single logical value repeated `position_count` times.
///
/// Every position-indexed read ignores the requested position (after range
/// checking it) and reads logical position 0 of the wrapped value. Wrapping
/// an RLE block in another RLE block collapses at construction; the value is
/// never itself run-length encoded.
#[derive(Clone, Debug)]
pub struct RunLengthEncodedBlock {
    value: BlockRef,
    position_count: usize,
}

impl RunLengthEncodedBlock {
    pub fn try_new(value: BlockRef, position_count: usize) -> BasaltResult<Self> {
        // Collapse one level: the inner value of an RLE block already has a
        // single position.
        let value = match value.as_any().downcast_ref::<RunLengthEncodedBlock>() {
            Some(rle) => rle.value.clone(),
            None => value,
        };
        if value.position_count() != 1 {
            basalt_bail!(
                "run-length value must have exactly one position, got {}",
                value.position_count()
            );
        }
        Ok(Self {
            value,
            position_count,
        })
    }

    /// The single-position block every read resolves to.
    pub fn value(&self) -> &BlockRef {
        &self.value
    }
}

impl Block for RunLengthEncodedBlock {
    fn block_name(&self) -> &'static str {
        "RunLengthEncodedBlock"
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn position_count(&self) -> usize {
        self.position_count
    }

    fn size_in_bytes(&self) -> usize {
        self.value.size_in_bytes()
    }

    fn retained_size_in_bytes(&self) -> usize {
        size_of::<Self>() + self.value.retained_size_in_bytes()
    }

    fn logical_size_in_bytes(&self) -> usize {
        self.position_count * self.value.logical_size_in_bytes()
    }

    fn region_size_in_bytes(&self, position: usize, length: usize) -> usize {
        check_valid_region(self.position_count, position, length);
        self.value.size_in_bytes()
    }

    fn positions_size_in_bytes(&self, positions: &[bool], _selected_count: usize) -> usize {
        check_valid_region(self.position_count, 0, positions.len());
        self.value.size_in_bytes()
    }

    fn estimated_data_size_for_stats(&self, position: usize) -> usize {
        check_readable_position(self.position_count, position);
        self.value.estimated_data_size_for_stats(0)
    }

    fn may_have_null(&self) -> bool {
        self.position_count > 0 && self.value.may_have_null()
    }

    fn is_null(&self, position: usize) -> bool {
        check_readable_position(self.position_count, position);
        self.value.is_null(0)
    }

    fn get_byte(&self, position: usize, offset: usize) -> i8 {
        check_readable_position(self.position_count, position);
        self.value.get_byte(0, offset)
    }

    fn get_short(&self, position: usize, offset: usize) -> i16 {
        check_readable_position(self.position_count, position);
        self.value.get_short(0, offset)
    }

    fn get_int(&self, position: usize, offset: usize) -> i32 {
        check_readable_position(self.position_count, position);
        self.value.get_int(0, offset)
    }

    fn get_long(&self, position: usize, offset: usize) -> i64 {
        check_readable_position(self.position_count, position);
        self.value.get_long(0, offset)
    }

    fn get_int96(&self, position: usize) -> (i64, u32) {
        check_readable_position(self.position_count, position);
        self.value.get_int96(0)
    }

    fn get_i128(&self, position: usize) -> I128 {
        check_readable_position(self.position_count, position);
        self.value.get_i128(0)
    }

    fn get_slice(&self, position: usize, offset: usize, length: usize) -> Buffer<u8> {
        check_readable_position(self.position_count, position);
        self.value.get_slice(0, offset, length)
    }

    fn get_slice_length(&self, position: usize) -> usize {
        check_readable_position(self.position_count, position);
        self.value.get_slice_length(0)
    }

    fn get_block(&self, position: usize) -> BlockRef {
        check_readable_position(self.position_count, position);
        self.value.get_block(0)
    }

    fn hash_position(&self, position: usize) -> u64 {
        check_readable_position(self.position_count, position);
        self.value.hash_position(0)
    }

    fn positions_equal(&self, position: usize, other: &dyn Block, other_position: usize) -> bool {
        check_readable_position(self.position_count, position);
        self.value.positions_equal(0, other, other_position)
    }

    fn children(&self) -> Vec<BlockRef> {
        vec![self.value.clone()]
    }

    fn get_region(&self, position: usize, length: usize) -> BlockRef {
        check_valid_region(self.position_count, position, length);
        Arc::new(Self {
            value: self.value.clone(),
            position_count: length,
        })
    }

    fn copy_region(&self, position: usize, length: usize) -> BlockRef {
        check_valid_region(self.position_count, position, length);
        Arc::new(Self {
            value: self.value.copy_region(0, 1),
            position_count: length,
        })
    }

    fn copy_positions(&self, positions: &[usize]) -> BlockRef {
        check_valid_positions(positions, self.position_count);
        Arc::new(Self {
            value: self.value.copy_region(0, 1),
            position_count: positions.len(),
        })
    }

    fn get_single_value_block(&self, position: usize) -> BlockRef {
        check_readable_position(self.position_count, position);
        self.value.get_single_value_block(0)
    }

    fn is_loaded(&self) -> bool {
        self.value.is_loaded()
    }

    fn loaded_block(self: Arc<Self>) -> BlockRef {
        if self.value.is_loaded() {
            return self;
        }
        Arc::new(Self {
            value: self.value.clone().loaded_block(),
            position_count: self.position_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use basalt_error::BasaltUnwrap;

    use crate::blocks::{IntBlock, RunLengthEncodedBlock};
    use crate::{Block, BlockRef};

    fn rle_over(value: i32, count: usize) -> RunLengthEncodedBlock {
        RunLengthEncodedBlock::try_new(Arc::new(IntBlock::from_values(vec![value])), count)
            .basalt_unwrap()
    }

    #[test]
    fn every_position_reads_the_value() {
        let block = rle_over(42, 5);
        assert_eq!(block.position_count(), 5);
        for p in 0..5 {
            assert_eq!(block.get_int(p, 0), 42);
            assert!(!block.is_null(p));
        }
    }

    #[test]
    fn nested_wrap_collapses() {
        let inner: BlockRef = Arc::new(rle_over(42, 5));
        let outer = RunLengthEncodedBlock::try_new(inner, 9).basalt_unwrap();
        assert_eq!(outer.position_count(), 9);
        // The wrapped value must be the original single-position block, not
        // the first RLE wrapper.
        assert!(
            outer
                .value()
                .as_any()
                .downcast_ref::<IntBlock>()
                .is_some()
        );
    }

    #[test]
    fn sizes_compact_vs_logical() {
        let block = rle_over(7, 10);
        assert_eq!(block.size_in_bytes(), 5);
        assert_eq!(block.logical_size_in_bytes(), 50);
    }

    #[test]
    fn multi_position_value_rejected() {
        let value: BlockRef = Arc::new(IntBlock::from_values(vec![1, 2]));
        assert!(RunLengthEncodedBlock::try_new(value, 3).is_err());
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn out_of_range_still_checked() {
        rle_over(1, 3).get_int(3, 0);
    }
}
