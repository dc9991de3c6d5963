use std::sync::Arc;

use basalt_buffer::Buffer;
use basalt_i128::I128;

use crate::block::{Block, BlockRef};
use crate::checks::{check_readable_position, unsupported_op};

/// Read-only view of one logical row: position `f` is field `f` of the row.
///
/// The view shares the parent's field blocks; it is a cursor, not a block in
/// its own right, so region and copy operations are unsupported.
#[derive(Debug)]
pub struct SingleRowBlock {
    field_blocks: Vec<BlockRef>,
    row: usize,
}

impl SingleRowBlock {
    pub(crate) fn new(field_blocks: Vec<BlockRef>, row: usize) -> Self {
        Self { field_blocks, row }
    }

    #[inline]
    fn field(&self, position: usize) -> &dyn Block {
        check_readable_position(self.field_blocks.len(), position);
        &*self.field_blocks[position]
    }
}

impl Block for SingleRowBlock {
    fn block_name(&self) -> &'static str {
        "SingleRowBlock"
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn position_count(&self) -> usize {
        self.field_blocks.len()
    }

    fn size_in_bytes(&self) -> usize {
        self.field_blocks
            .iter()
            .map(|field| field.region_size_in_bytes(self.row, 1))
            .sum()
    }

    fn retained_size_in_bytes(&self) -> usize {
        size_of::<Self>()
            + self
                .field_blocks
                .iter()
                .map(|field| field.retained_size_in_bytes())
                .sum::<usize>()
    }

    fn region_size_in_bytes(&self, _position: usize, _length: usize) -> usize {
        unsupported_op(self.block_name(), "region_size_in_bytes")
    }

    fn positions_size_in_bytes(&self, _positions: &[bool], _selected_count: usize) -> usize {
        unsupported_op(self.block_name(), "positions_size_in_bytes")
    }

    fn estimated_data_size_for_stats(&self, position: usize) -> usize {
        self.field(position).estimated_data_size_for_stats(self.row)
    }

    fn may_have_null(&self) -> bool {
        self.field_blocks.iter().any(|field| field.may_have_null())
    }

    fn is_null(&self, position: usize) -> bool {
        self.field(position).is_null(self.row)
    }

    fn get_byte(&self, position: usize, offset: usize) -> i8 {
        self.field(position).get_byte(self.row, offset)
    }

    fn get_short(&self, position: usize, offset: usize) -> i16 {
        self.field(position).get_short(self.row, offset)
    }

    fn get_int(&self, position: usize, offset: usize) -> i32 {
        self.field(position).get_int(self.row, offset)
    }

    fn get_long(&self, position: usize, offset: usize) -> i64 {
        self.field(position).get_long(self.row, offset)
    }

    fn get_int96(&self, position: usize) -> (i64, u32) {
        self.field(position).get_int96(self.row)
    }

    fn get_i128(&self, position: usize) -> I128 {
        self.field(position).get_i128(self.row)
    }

    fn get_slice(&self, position: usize, offset: usize, length: usize) -> Buffer<u8> {
        self.field(position).get_slice(self.row, offset, length)
    }

    fn get_slice_length(&self, position: usize) -> usize {
        self.field(position).get_slice_length(self.row)
    }

    fn get_block(&self, position: usize) -> BlockRef {
        self.field(position).get_block(self.row)
    }

    fn get_region(&self, _position: usize, _length: usize) -> BlockRef {
        unsupported_op(self.block_name(), "get_region")
    }

    fn copy_region(&self, _position: usize, _length: usize) -> BlockRef {
        unsupported_op(self.block_name(), "copy_region")
    }

    fn copy_positions(&self, _positions: &[usize]) -> BlockRef {
        unsupported_op(self.block_name(), "copy_positions")
    }

    fn get_single_value_block(&self, position: usize) -> BlockRef {
        self.field(position).get_single_value_block(self.row)
    }

    fn is_loaded(&self) -> bool {
        self.field_blocks.iter().all(|field| field.is_loaded())
    }

    fn loaded_block(self: Arc<Self>) -> BlockRef {
        if self.is_loaded() {
            return self;
        }
        Arc::new(Self {
            field_blocks: self
                .field_blocks
                .iter()
                .map(|field| field.clone().loaded_block())
                .collect(),
            row: self.row,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::blocks::{LongBlock, SingleRowBlock};
    use crate::{Block, BlockRef};

    fn view() -> SingleRowBlock {
        let a: BlockRef = Arc::new(LongBlock::from_values(vec![10i64, 20]));
        let b: BlockRef = Arc::new(LongBlock::from_option_iter([None, Some(2i64)]));
        SingleRowBlock::new(vec![a, b], 1)
    }

    #[test]
    fn fields_read_at_the_row() {
        let row = view();
        assert_eq!(row.position_count(), 2);
        assert_eq!(row.get_long(0, 0), 20);
        assert_eq!(row.get_long(1, 0), 2);
        assert!(!row.is_null(1));
    }

    #[test]
    #[should_panic(expected = "does not support copy_region")]
    fn copies_unsupported() {
        view().copy_region(0, 1);
    }
}
