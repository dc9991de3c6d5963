use std::sync::Arc;

use basalt_buffer::{Buffer, BufferMut};
use basalt_error::{BasaltResult, basalt_bail};

use crate::block::{Block, BlockRef};
use crate::blocks::{ArrayBlock, DictionaryBlock, RunLengthEncodedBlock};
use crate::checks::check_readable_position;
use crate::columnar::resolve;
use crate::compact::compact_offsets;

/// Flat view of an array-typed block: zero-based offsets plus one element
/// block, independent of the input's encoding.
#[derive(Debug)]
pub struct ColumnarArray {
    null_check: BlockRef,
    offsets: Buffer<i32>,
    elements: BlockRef,
}

impl ColumnarArray {
    pub fn position_count(&self) -> usize {
        self.offsets.len() - 1
    }

    pub fn is_null(&self, position: usize) -> bool {
        self.null_check.is_null(position)
    }

    /// First element position of the array at `position`.
    pub fn offset(&self, position: usize) -> usize {
        check_readable_position(self.position_count(), position);
        self.offsets[position] as usize
    }

    /// Element count of the array at `position`.
    pub fn length(&self, position: usize) -> usize {
        check_readable_position(self.position_count(), position);
        (self.offsets[position + 1] - self.offsets[position]) as usize
    }

    pub fn elements(&self) -> &BlockRef {
        &self.elements
    }
}

/// Normalize an array-typed block of any encoding into a [`ColumnarArray`].
pub fn to_columnar_array(block: &BlockRef) -> BasaltResult<ColumnarArray> {
    let block = resolve(block);

    if let Some(array) = block.as_any().downcast_ref::<ArrayBlock>() {
        let position_count = array.position_count();
        let first = array.offsets()[0] as usize;
        let span = array.offsets()[position_count] as usize - first;
        return Ok(ColumnarArray {
            offsets: compact_offsets(array.offsets(), 0, position_count),
            elements: array.raw_elements().get_region(first, span),
            null_check: block,
        });
    }

    if let Some(dictionary) = block.as_any().downcast_ref::<DictionaryBlock>() {
        let inner = to_columnar_array(dictionary.dictionary())?;
        let (offsets, element_ids) = expand_offsets(
            &inner.offsets,
            dictionary.ids().iter().map(|&id| id as usize),
            dictionary.ids().len(),
        );
        return Ok(ColumnarArray {
            offsets,
            elements: dictionary_over(inner.elements.clone(), element_ids),
            null_check: block,
        });
    }

    if let Some(rle) = block.as_any().downcast_ref::<RunLengthEncodedBlock>() {
        let inner = to_columnar_array(rle.value())?;
        let position_count = rle.position_count();
        let (offsets, element_ids) = expand_offsets(
            &inner.offsets,
            std::iter::repeat_n(0, position_count),
            position_count,
        );
        return Ok(ColumnarArray {
            offsets,
            elements: dictionary_over(inner.elements.clone(), element_ids),
            null_check: block,
        });
    }

    basalt_bail!("expected an array block, got {}", block.block_name())
}

/// Walk `ids` through zero-based `inner_offsets`, producing the expanded
/// offset vector and the per-element dictionary ids.
pub(super) fn expand_offsets(
    inner_offsets: &Buffer<i32>,
    ids: impl Iterator<Item = usize>,
    position_count: usize,
) -> (Buffer<i32>, Vec<i32>) {
    let mut offsets = BufferMut::with_capacity(position_count + 1);
    offsets.push(0i32);
    let mut element_ids = Vec::new();
    for id in ids {
        let start = inner_offsets[id];
        let end = inner_offsets[id + 1];
        element_ids.extend(start..end);
        offsets.push(element_ids.len() as i32);
    }
    (offsets.freeze(), element_ids)
}

/// Wrap `child` in a dictionary over `ids`, the shared-repetition element
/// view for encoded inputs.
pub(super) fn dictionary_over(child: BlockRef, ids: Vec<i32>) -> BlockRef {
    Arc::new(DictionaryBlock::from_parts(child, Buffer::from_vec(ids)))
}
