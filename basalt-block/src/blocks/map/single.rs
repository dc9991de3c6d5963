use std::sync::Arc;

use basalt_buffer::Buffer;
use basalt_i128::I128;

use crate::block::{Block, BlockRef};
use crate::blocks::MapHashTables;
use crate::blocks::map::hash_tables::seek_window;
use crate::checks::{check_readable_position, unsupported_op};

/// Read-only view of one map as an interleaved sequence: position `2i` is
/// key `i`, position `2i + 1` is value `i`.
///
/// Shares the parent's entry storage and hash index; like the single-row
/// view, it is a cursor and does not support region or copy operations.
#[derive(Debug)]
pub struct SingleMapBlock {
    raw_keys: BlockRef,
    raw_values: BlockRef,
    start: usize,
    count: usize,
    hash_tables: Arc<MapHashTables>,
}

impl SingleMapBlock {
    pub(crate) fn new(
        raw_keys: BlockRef,
        raw_values: BlockRef,
        start: usize,
        count: usize,
        hash_tables: Arc<MapHashTables>,
    ) -> Self {
        Self {
            raw_keys,
            raw_values,
            start,
            count,
            hash_tables,
        }
    }

    /// Find the entry whose key equals `key` at `key_position` and return the
    /// interleaved position of its value. Builds the shared hash index on
    /// first use.
    pub fn seek_key(&self, key: &dyn Block, key_position: usize) -> Option<usize> {
        let tables = self.hash_tables.get_or_build();
        seek_window(
            tables.as_slice(),
            &*self.raw_keys,
            self.start,
            self.count,
            key,
            key_position,
        )
        .map(|entry| 2 * entry + 1)
    }

    /// Route an interleaved position to the underlying entry block.
    #[inline]
    fn underlying(&self, position: usize) -> (&dyn Block, usize) {
        check_readable_position(self.count * 2, position);
        let entry = self.start + position / 2;
        if position % 2 == 0 {
            (&*self.raw_keys, entry)
        } else {
            (&*self.raw_values, entry)
        }
    }
}

impl Block for SingleMapBlock {
    fn block_name(&self) -> &'static str {
        "SingleMapBlock"
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn position_count(&self) -> usize {
        self.count * 2
    }

    fn size_in_bytes(&self) -> usize {
        self.raw_keys.region_size_in_bytes(self.start, self.count)
            + self.raw_values.region_size_in_bytes(self.start, self.count)
    }

    fn retained_size_in_bytes(&self) -> usize {
        size_of::<Self>()
            + self.raw_keys.retained_size_in_bytes()
            + self.raw_values.retained_size_in_bytes()
            + self.hash_tables.retained_size_in_bytes()
    }

    fn region_size_in_bytes(&self, _position: usize, _length: usize) -> usize {
        unsupported_op(self.block_name(), "region_size_in_bytes")
    }

    fn positions_size_in_bytes(&self, _positions: &[bool], _selected_count: usize) -> usize {
        unsupported_op(self.block_name(), "positions_size_in_bytes")
    }

    fn estimated_data_size_for_stats(&self, position: usize) -> usize {
        let (block, entry) = self.underlying(position);
        block.estimated_data_size_for_stats(entry)
    }

    fn may_have_null(&self) -> bool {
        self.raw_values.may_have_null()
    }

    fn is_null(&self, position: usize) -> bool {
        let (block, entry) = self.underlying(position);
        let null = block.is_null(entry);
        if null && position % 2 == 0 {
            basalt_error::basalt_panic!(DataIntegrity: "map key at entry {} is null", position / 2);
        }
        null
    }

    fn get_byte(&self, position: usize, offset: usize) -> i8 {
        let (block, entry) = self.underlying(position);
        block.get_byte(entry, offset)
    }

    fn get_short(&self, position: usize, offset: usize) -> i16 {
        let (block, entry) = self.underlying(position);
        block.get_short(entry, offset)
    }

    fn get_int(&self, position: usize, offset: usize) -> i32 {
        let (block, entry) = self.underlying(position);
        block.get_int(entry, offset)
    }

    fn get_long(&self, position: usize, offset: usize) -> i64 {
        let (block, entry) = self.underlying(position);
        block.get_long(entry, offset)
    }

    fn get_int96(&self, position: usize) -> (i64, u32) {
        let (block, entry) = self.underlying(position);
        block.get_int96(entry)
    }

    fn get_i128(&self, position: usize) -> I128 {
        let (block, entry) = self.underlying(position);
        block.get_i128(entry)
    }

    fn get_slice(&self, position: usize, offset: usize, length: usize) -> Buffer<u8> {
        let (block, entry) = self.underlying(position);
        block.get_slice(entry, offset, length)
    }

    fn get_slice_length(&self, position: usize) -> usize {
        let (block, entry) = self.underlying(position);
        block.get_slice_length(entry)
    }

    fn get_block(&self, position: usize) -> BlockRef {
        let (block, entry) = self.underlying(position);
        block.get_block(entry)
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
        let (block, entry) = self.underlying(position);
        block.get_single_value_block(entry)
    }

    fn is_loaded(&self) -> bool {
        self.raw_keys.is_loaded() && self.raw_values.is_loaded()
    }

    fn loaded_block(self: Arc<Self>) -> BlockRef {
        if self.is_loaded() {
            return self;
        }
        Arc::new(Self {
            raw_keys: self.raw_keys.clone().loaded_block(),
            raw_values: self.raw_values.clone().loaded_block(),
            start: self.start,
            count: self.count,
            hash_tables: self.hash_tables.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use basalt_buffer::Buffer;

    use crate::blocks::{LongBlock, MapHashTables, SingleMapBlock, VariableWidthBlock};
    use crate::{Block, BlockRef};

    fn view() -> SingleMapBlock {
        let keys: BlockRef =
            Arc::new(VariableWidthBlock::from_strings([Some("x"), Some("y")]));
        let values: BlockRef = Arc::new(LongBlock::from_values(vec![1i64, 2]));
        let offsets = Buffer::from_vec(vec![0, 2]);
        let hash_tables = Arc::new(MapHashTables::new(keys.clone(), offsets));
        SingleMapBlock::new(keys, values, 0, 2, hash_tables)
    }

    #[test]
    fn interleaved_addressing() {
        let map = view();
        assert_eq!(map.position_count(), 4);
        assert_eq!(map.get_slice(2, 0, 1).as_slice(), b"y");
        assert_eq!(map.get_long(3, 0), 2);
    }

    #[test]
    fn seek_key_probes_the_window() {
        let map = view();
        let probe = VariableWidthBlock::from_strings([Some("y")]);
        assert_eq!(map.seek_key(&probe, 0), Some(3));
        let miss = VariableWidthBlock::from_strings([Some("q")]);
        assert_eq!(map.seek_key(&miss, 0), None);
    }

    #[test]
    #[should_panic(expected = "does not support get_region")]
    fn regions_unsupported() {
        view().get_region(0, 1);
    }
}
