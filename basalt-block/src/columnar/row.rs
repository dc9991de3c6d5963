use basalt_buffer::Buffer;
use basalt_error::{BasaltResult, basalt_bail};

use crate::block::{Block, BlockRef};
use crate::blocks::{DictionaryBlock, RowBlock, RunLengthEncodedBlock};
use crate::checks::check_readable_position;
use crate::columnar::array::{dictionary_over, expand_offsets};
use crate::columnar::resolve;
use crate::compact::compact_offsets;

/// Flat view of a row-typed block: per-field blocks aligned on field rows,
/// independent of the input's encoding. Null rows occupy no field row.
#[derive(Debug)]
pub struct ColumnarRow {
    null_check: BlockRef,
    offsets: Buffer<i32>,
    fields: Vec<BlockRef>,
}

impl ColumnarRow {
    pub fn position_count(&self) -> usize {
        self.offsets.len() - 1
    }

    pub fn is_null(&self, position: usize) -> bool {
        self.null_check.is_null(position)
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    pub fn field(&self, field: usize) -> &BlockRef {
        &self.fields[field]
    }

    /// Field-row index backing `position`, or `None` for a null row.
    pub fn field_position(&self, position: usize) -> Option<usize> {
        check_readable_position(self.position_count(), position);
        if self.offsets[position + 1] == self.offsets[position] {
            None
        } else {
            Some(self.offsets[position] as usize)
        }
    }
}

/// Normalize a row-typed block of any encoding into a [`ColumnarRow`].
pub fn to_columnar_row(block: &BlockRef) -> BasaltResult<ColumnarRow> {
    let block = resolve(block);

    if let Some(row) = block.as_any().downcast_ref::<RowBlock>() {
        let position_count = row.position_count();
        let first = row.offsets()[0] as usize;
        let span = row.offsets()[position_count] as usize - first;
        return Ok(ColumnarRow {
            offsets: compact_offsets(row.offsets(), 0, position_count),
            fields: row
                .field_blocks()
                .iter()
                .map(|field| field.get_region(first, span))
                .collect(),
            null_check: block,
        });
    }

    if let Some(dictionary) = block.as_any().downcast_ref::<DictionaryBlock>() {
        let inner = to_columnar_row(dictionary.dictionary())?;
        let (offsets, row_ids) = expand_offsets(
            &inner.offsets,
            dictionary.ids().iter().map(|&id| id as usize),
            dictionary.ids().len(),
        );
        return Ok(ColumnarRow {
            offsets,
            fields: inner
                .fields
                .iter()
                .map(|field| dictionary_over(field.clone(), row_ids.clone()))
                .collect(),
            null_check: block,
        });
    }

    if let Some(rle) = block.as_any().downcast_ref::<RunLengthEncodedBlock>() {
        let inner = to_columnar_row(rle.value())?;
        let position_count = rle.position_count();
        let (offsets, row_ids) = expand_offsets(
            &inner.offsets,
            std::iter::repeat_n(0, position_count),
            position_count,
        );
        return Ok(ColumnarRow {
            offsets,
            fields: inner
                .fields
                .iter()
                .map(|field| dictionary_over(field.clone(), row_ids.clone()))
                .collect(),
            null_check: block,
        });
    }

    basalt_bail!("expected a row block, got {}", block.block_name())
}
