mod builder;
mod single;

pub use builder::RowBlockBuilder;
pub use single::SingleRowBlock;

use std::sync::Arc;

use basalt_buffer::{Buffer, BufferMut};
use basalt_error::{BasaltResult, basalt_bail};

use crate::block::{Block, BlockRef};
use crate::blocks::nested::{PER_POSITION_OVERHEAD, check_offsets};
use crate::checks::{check_readable_position, check_valid_positions, check_valid_region};
use crate::compact::{compact_nulls, compact_offsets};

/// Rows (structs) stored as parallel field blocks plus an offset vector
/// mapping each logical row to its index in every field block. Null rows are
/// zero-width: they occupy no slot in the field blocks, so the field blocks
/// hold exactly one entry per non-null row.
#[derive(Debug)]
pub struct RowBlock {
    field_blocks: Vec<BlockRef>,
    offsets: Buffer<i32>,
    nulls: Option<Buffer<bool>>,
}

impl RowBlock {
    pub fn try_new(
        field_blocks: Vec<BlockRef>,
        offsets: Buffer<i32>,
        nulls: Option<Buffer<bool>>,
    ) -> BasaltResult<Self> {
        if field_blocks.is_empty() {
            basalt_bail!("row block requires at least one field");
        }
        let field_rows = field_blocks[0].position_count();
        for field in &field_blocks[1..] {
            if field.position_count() != field_rows {
                basalt_bail!(
                    DataIntegrity: "field blocks disagree on row count: {} vs {}",
                    field_rows,
                    field.position_count()
                );
            }
        }
        check_offsets("row", &offsets, nulls.as_ref(), field_rows)?;
        // A non-null row occupies exactly one field slot.
        let position_count = offsets.len() - 1;
        for i in 0..position_count {
            let width = offsets[i + 1] - offsets[i];
            if width > 1 {
                basalt_bail!(
                    DataIntegrity: "row position {} spans {} field slots, expected at most 1",
                    i,
                    width
                );
            }
        }
        Ok(Self {
            field_blocks,
            offsets,
            nulls,
        })
    }

    pub fn field_blocks(&self) -> &[BlockRef] {
        &self.field_blocks
    }

    pub fn offsets(&self) -> &Buffer<i32> {
        &self.offsets
    }

    #[inline]
    fn field_row(&self, position: usize) -> usize {
        check_readable_position(self.position_count(), position);
        self.offsets[position] as usize
    }

    fn field_rows_in_region(&self, position: usize, length: usize) -> (usize, usize) {
        let start = self.offsets[position] as usize;
        let end = self.offsets[position + length] as usize;
        (start, end - start)
    }
}

impl Block for RowBlock {
    fn block_name(&self) -> &'static str {
        "RowBlock"
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
            + self
                .field_blocks
                .iter()
                .map(|field| field.retained_size_in_bytes())
                .sum::<usize>()
            + self.offsets.retained_size_in_bytes()
            + self.nulls.as_ref().map_or(0, Buffer::retained_size_in_bytes)
    }

    fn region_size_in_bytes(&self, position: usize, length: usize) -> usize {
        check_valid_region(self.position_count(), position, length);
        let (start, count) = self.field_rows_in_region(position, length);
        self.field_blocks
            .iter()
            .map(|field| field.region_size_in_bytes(start, count))
            .sum::<usize>()
            + PER_POSITION_OVERHEAD * length
    }

    fn positions_size_in_bytes(&self, positions: &[bool], selected_count: usize) -> usize {
        check_valid_region(self.position_count(), 0, positions.len());
        let field_rows = self.field_blocks[0].position_count();
        let mut used = vec![false; field_rows];
        let mut used_count = 0;
        for (position, &selected) in positions.iter().enumerate() {
            if selected && !self.is_null(position) {
                let row = self.offsets[position] as usize;
                if !used[row] {
                    used[row] = true;
                    used_count += 1;
                }
            }
        }
        self.field_blocks
            .iter()
            .map(|field| field.positions_size_in_bytes(&used, used_count))
            .sum::<usize>()
            + PER_POSITION_OVERHEAD * selected_count
    }

    fn estimated_data_size_for_stats(&self, position: usize) -> usize {
        if self.is_null(position) {
            return 0;
        }
        let row = self.field_row(position);
        self.field_blocks
            .iter()
            .map(|field| field.estimated_data_size_for_stats(row))
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
        let row = self.field_row(position);
        Arc::new(SingleRowBlock::new(self.field_blocks.clone(), row))
    }

    fn children(&self) -> Vec<BlockRef> {
        self.field_blocks.clone()
    }

    fn get_region(&self, position: usize, length: usize) -> BlockRef {
        check_valid_region(self.position_count(), position, length);
        Arc::new(Self {
            field_blocks: self.field_blocks.clone(),
            offsets: self.offsets.slice(position..position + length + 1),
            nulls: self
                .nulls
                .as_ref()
                .map(|nulls| nulls.slice(position..position + length)),
        })
    }

    fn copy_region(&self, position: usize, length: usize) -> BlockRef {
        check_valid_region(self.position_count(), position, length);
        let (start, count) = self.field_rows_in_region(position, length);
        Arc::new(Self {
            field_blocks: self
                .field_blocks
                .iter()
                .map(|field| field.copy_region(start, count))
                .collect(),
            offsets: compact_offsets(&self.offsets, position, length),
            nulls: compact_nulls(self.nulls.as_ref(), position, length),
        })
    }

    fn copy_positions(&self, positions: &[usize]) -> BlockRef {
        check_valid_positions(positions, self.position_count());
        // One batched copy per field instead of a copy per row.
        let mut field_rows = Vec::new();
        let mut offsets = BufferMut::with_capacity(positions.len() + 1);
        offsets.push(0i32);
        for &p in positions {
            if !self.is_null(p) {
                field_rows.push(self.offsets[p] as usize);
            }
            offsets.push(field_rows.len() as i32);
        }
        let nulls = self
            .nulls
            .as_ref()
            .map(|nulls| positions.iter().map(|&p| nulls[p]).collect());
        Arc::new(Self {
            field_blocks: self
                .field_blocks
                .iter()
                .map(|field| field.copy_positions(&field_rows))
                .collect(),
            offsets: offsets.freeze(),
            nulls,
        })
    }

    fn get_single_value_block(&self, position: usize) -> BlockRef {
        self.copy_region(position, 1)
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
            offsets: self.offsets.clone(),
            nulls: self.nulls.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::blocks::{PrimitiveBlockBuilder, RowBlock, RowBlockBuilder, VariableWidthBlockBuilder};
    use crate::{Block, BlockBuilder, BlockRef};

    /// `[(1, "one"), null, (3, "three")]`
    fn sample() -> BlockRef {
        let mut builder = RowBlockBuilder::new(
            vec![
                Box::new(PrimitiveBlockBuilder::<i64>::new(None, 3)),
                Box::new(VariableWidthBlockBuilder::new(None, 3, 16)),
            ],
            None,
            3,
        );
        {
            let row = builder.begin_block_entry();
            row.write_long(1);
            row.write_bytes(b"one");
        }
        builder.close_entry();
        builder.append_null();
        {
            let row = builder.begin_block_entry();
            row.write_long(3);
            row.write_bytes(b"three");
        }
        builder.close_entry();
        builder.build()
    }

    fn as_row(block: &BlockRef) -> &RowBlock {
        block.as_any().downcast_ref::<RowBlock>().unwrap()
    }

    #[test]
    fn rows_read_back_as_single_row_views() {
        let block = sample();
        assert_eq!(block.position_count(), 3);
        let first = block.get_block(0);
        assert_eq!(first.position_count(), 2);
        assert_eq!(first.get_long(0, 0), 1);
        assert_eq!(first.get_slice(1, 0, 3).as_slice(), b"one");
        assert!(block.is_null(1));
        assert_eq!(block.get_block(2).get_long(0, 0), 3);
    }

    #[test]
    fn null_rows_are_zero_width() {
        let block = sample();
        let row = as_row(&block);
        assert_eq!(row.offsets().as_slice(), &[0, 1, 1, 2]);
        assert_eq!(row.field_blocks()[0].position_count(), 2);
    }

    #[test]
    fn copy_region_compacts_fields() {
        let block = sample();
        let copied = block.copy_region(1, 2);
        let copied = as_row(&copied);
        assert_eq!(copied.offsets().as_slice(), &[0, 0, 1]);
        assert_eq!(copied.field_blocks()[0].position_count(), 1);
        assert!(copied.is_null(0));
        assert_eq!(copied.get_block(1).get_long(0, 0), 3);
    }

    #[test]
    fn copy_positions_reorders_rows() {
        let block = sample();
        let copied = block.copy_positions(&[2, 0]);
        assert_eq!(copied.get_block(0).get_long(0, 0), 3);
        assert_eq!(copied.get_block(1).get_long(0, 0), 1);
    }

    #[test]
    fn region_shares_fields() {
        let block = sample();
        let fields_before = Arc::as_ptr(&as_row(&block).field_blocks()[0]);
        let region = block.get_region(0, 2);
        assert_eq!(Arc::as_ptr(&as_row(&region).field_blocks()[0]), fields_before);
    }
}
