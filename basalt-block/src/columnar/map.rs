use basalt_buffer::Buffer;
use basalt_error::{BasaltResult, basalt_bail};

use crate::block::{Block, BlockRef};
use crate::blocks::{DictionaryBlock, MapBlock, RunLengthEncodedBlock};
use crate::checks::check_readable_position;
use crate::columnar::array::{dictionary_over, expand_offsets};
use crate::columnar::resolve;
use crate::compact::compact_offsets;

/// Flat view of a map-typed block: zero-based entry offsets plus parallel
/// key and value blocks, independent of the input's encoding.
#[derive(Debug)]
pub struct ColumnarMap {
    null_check: BlockRef,
    offsets: Buffer<i32>,
    keys: BlockRef,
    values: BlockRef,
}

impl ColumnarMap {
    pub fn position_count(&self) -> usize {
        self.offsets.len() - 1
    }

    pub fn is_null(&self, position: usize) -> bool {
        self.null_check.is_null(position)
    }

    /// First entry position of the map at `position`.
    pub fn offset(&self, position: usize) -> usize {
        check_readable_position(self.position_count(), position);
        self.offsets[position] as usize
    }

    /// Entry count of the map at `position`.
    pub fn entry_count(&self, position: usize) -> usize {
        check_readable_position(self.position_count(), position);
        (self.offsets[position + 1] - self.offsets[position]) as usize
    }

    pub fn keys(&self) -> &BlockRef {
        &self.keys
    }

    pub fn values(&self) -> &BlockRef {
        &self.values
    }
}

/// Normalize a map-typed block of any encoding into a [`ColumnarMap`].
pub fn to_columnar_map(block: &BlockRef) -> BasaltResult<ColumnarMap> {
    let block = resolve(block);

    if let Some(map) = block.as_any().downcast_ref::<MapBlock>() {
        let position_count = map.position_count();
        let first = map.offsets()[0] as usize;
        let span = map.offsets()[position_count] as usize - first;
        return Ok(ColumnarMap {
            offsets: compact_offsets(map.offsets(), 0, position_count),
            keys: map.raw_keys().get_region(first, span),
            values: map.raw_values().get_region(first, span),
            null_check: block,
        });
    }

    if let Some(dictionary) = block.as_any().downcast_ref::<DictionaryBlock>() {
        let inner = to_columnar_map(dictionary.dictionary())?;
        let (offsets, entry_ids) = expand_offsets(
            &inner.offsets,
            dictionary.ids().iter().map(|&id| id as usize),
            dictionary.ids().len(),
        );
        return Ok(ColumnarMap {
            offsets,
            keys: dictionary_over(inner.keys.clone(), entry_ids.clone()),
            values: dictionary_over(inner.values.clone(), entry_ids),
            null_check: block,
        });
    }

    if let Some(rle) = block.as_any().downcast_ref::<RunLengthEncodedBlock>() {
        let inner = to_columnar_map(rle.value())?;
        let position_count = rle.position_count();
        let (offsets, entry_ids) = expand_offsets(
            &inner.offsets,
            std::iter::repeat_n(0, position_count),
            position_count,
        );
        return Ok(ColumnarMap {
            offsets,
            keys: dictionary_over(inner.keys.clone(), entry_ids.clone()),
            values: dictionary_over(inner.values.clone(), entry_ids),
            null_check: block,
        });
    }

    basalt_bail!("expected a map block, got {}", block.block_name())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use basalt_buffer::Buffer;
    use basalt_error::BasaltUnwrap;

    use crate::blocks::{DictionaryBlock, IntBlock, MapBlock, VariableWidthBlock};
    use crate::columnar::to_columnar_map;
    use crate::BlockRef;

    /// `[{"a": 1, "b": 2}, {"c": 3}]`
    fn plain() -> BlockRef {
        let keys: BlockRef = Arc::new(VariableWidthBlock::try_new(
            Buffer::from_vec(b"abc".to_vec()),
            Buffer::from_vec(vec![0, 1, 2, 3]),
            None,
        )
        .basalt_unwrap());
        let values: BlockRef = Arc::new(IntBlock::from_values(vec![1, 2, 3]));
        Arc::new(
            MapBlock::try_new(keys, values, Buffer::from_vec(vec![0, 2, 3]), None)
                .basalt_unwrap(),
        )
    }

    #[test]
    fn plain_map_passthrough() {
        let columnar = to_columnar_map(&plain()).basalt_unwrap();
        assert_eq!(columnar.position_count(), 2);
        assert_eq!(columnar.entry_count(0), 2);
        assert_eq!(columnar.keys().get_slice(2, 0, 1).as_slice(), b"c");
        assert_eq!(columnar.values().get_int(2, 0), 3);
    }

    #[test]
    fn dictionary_wrapped_agrees_with_plain() {
        let dictionary: BlockRef = Arc::new(
            DictionaryBlock::try_new(plain(), Buffer::from_vec(vec![1, 1, 0])).basalt_unwrap(),
        );
        let columnar = to_columnar_map(&dictionary).basalt_unwrap();
        assert_eq!(columnar.position_count(), 3);
        // {"c": 3}, {"c": 3}, {"a": 1, "b": 2}
        assert_eq!(columnar.entry_count(0), 1);
        assert_eq!(columnar.entry_count(2), 2);
        let last = columnar.offset(2);
        assert_eq!(columnar.keys().get_slice(last, 0, 1).as_slice(), b"a");
        assert_eq!(columnar.values().get_int(last, 0), 1);
        assert_eq!(columnar.values().get_int(last + 1, 0), 2);
    }

    #[test]
    fn non_map_rejected() {
        let block: BlockRef = Arc::new(IntBlock::from_values(vec![1]));
        assert!(to_columnar_map(&block).is_err());
    }
}
