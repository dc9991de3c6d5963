mod builder;
mod hash_tables;
mod single;

pub use builder::MapBlockBuilder;
pub use hash_tables::{MAP_HASH_MULTIPLIER, MapHashTables};
pub use single::SingleMapBlock;

use std::sync::Arc;

use basalt_buffer::{Buffer, BufferMut};
use basalt_error::BasaltResult;

use crate::block::{Block, BlockRef};
use crate::blocks::nested::{PER_POSITION_OVERHEAD, check_offsets};
use crate::checks::{check_readable_position, check_valid_positions, check_valid_region};
use crate::compact::{compact_nulls, compact_offsets};

/// Maps stored as flat key and value blocks plus an entry offset vector:
/// position `p`'s entries are positions `[offsets[p], offsets[p + 1])` of both
/// the key and the value block. Keys are never null; a null map is zero-width.
///
/// Key lookup goes through a lazily built open-addressing hash index shared by
/// every view of the same entry storage (see [`MapHashTables`]).
#[derive(Debug)]
pub struct MapBlock {
    raw_keys: BlockRef,
    raw_values: BlockRef,
    offsets: Buffer<i32>,
    nulls: Option<Buffer<bool>>,
    hash_tables: Arc<MapHashTables>,
}

impl MapBlock {
    pub fn try_new(
        raw_keys: BlockRef,
        raw_values: BlockRef,
        offsets: Buffer<i32>,
        nulls: Option<Buffer<bool>>,
    ) -> BasaltResult<Self> {
        if raw_keys.position_count() != raw_values.position_count() {
            basalt_error::basalt_bail!(
                DataIntegrity: "key block has {} entries but value block has {}",
                raw_keys.position_count(),
                raw_values.position_count()
            );
        }
        check_offsets("map", &offsets, nulls.as_ref(), raw_keys.position_count())?;
        let hash_tables = Arc::new(MapHashTables::new(raw_keys.clone(), offsets.clone()));
        Ok(Self {
            raw_keys,
            raw_values,
            offsets,
            nulls,
            hash_tables,
        })
    }

    pub fn raw_keys(&self) -> &BlockRef {
        &self.raw_keys
    }

    pub fn raw_values(&self) -> &BlockRef {
        &self.raw_values
    }

    pub fn offsets(&self) -> &Buffer<i32> {
        &self.offsets
    }

    pub fn hash_tables(&self) -> &Arc<MapHashTables> {
        &self.hash_tables
    }

    #[inline]
    fn entry_range(&self, position: usize) -> (usize, usize) {
        check_readable_position(self.position_count(), position);
        (
            self.offsets[position] as usize,
            self.offsets[position + 1] as usize,
        )
    }

    fn entries_in_region(&self, position: usize, length: usize) -> (usize, usize) {
        let start = self.offsets[position] as usize;
        let end = self.offsets[position + length] as usize;
        (start, end - start)
    }
}

impl Block for MapBlock {
    fn block_name(&self) -> &'static str {
        "MapBlock"
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
            + self.raw_keys.retained_size_in_bytes()
            + self.raw_values.retained_size_in_bytes()
            + self.offsets.retained_size_in_bytes()
            + self.nulls.as_ref().map_or(0, Buffer::retained_size_in_bytes)
            + self.hash_tables.retained_size_in_bytes()
    }

    fn region_size_in_bytes(&self, position: usize, length: usize) -> usize {
        check_valid_region(self.position_count(), position, length);
        let (start, count) = self.entries_in_region(position, length);
        self.raw_keys.region_size_in_bytes(start, count)
            + self.raw_values.region_size_in_bytes(start, count)
            + size_of::<i32>() * MAP_HASH_MULTIPLIER * count
            + PER_POSITION_OVERHEAD * length
    }

    fn positions_size_in_bytes(&self, positions: &[bool], selected_count: usize) -> usize {
        check_valid_region(self.position_count(), 0, positions.len());
        let mut used = vec![false; self.raw_keys.position_count()];
        let mut used_count = 0;
        for (position, &selected) in positions.iter().enumerate() {
            if selected {
                let (start, end) = self.entry_range(position);
                for flag in &mut used[start..end] {
                    if !*flag {
                        *flag = true;
                        used_count += 1;
                    }
                }
            }
        }
        self.raw_keys.positions_size_in_bytes(&used, used_count)
            + self.raw_values.positions_size_in_bytes(&used, used_count)
            + size_of::<i32>() * MAP_HASH_MULTIPLIER * used_count
            + PER_POSITION_OVERHEAD * selected_count
    }

    fn estimated_data_size_for_stats(&self, position: usize) -> usize {
        let (start, end) = self.entry_range(position);
        (start..end)
            .map(|e| {
                self.raw_keys.estimated_data_size_for_stats(e)
                    + self.raw_values.estimated_data_size_for_stats(e)
            })
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
        let (start, end) = self.entry_range(position);
        Arc::new(SingleMapBlock::new(
            self.raw_keys.clone(),
            self.raw_values.clone(),
            start,
            end - start,
            self.hash_tables.clone(),
        ))
    }

    fn children(&self) -> Vec<BlockRef> {
        vec![self.raw_keys.clone(), self.raw_values.clone()]
    }

    fn get_region(&self, position: usize, length: usize) -> BlockRef {
        check_valid_region(self.position_count(), position, length);
        Arc::new(Self {
            raw_keys: self.raw_keys.clone(),
            raw_values: self.raw_values.clone(),
            offsets: self.offsets.slice(position..position + length + 1),
            nulls: self
                .nulls
                .as_ref()
                .map(|nulls| nulls.slice(position..position + length)),
            hash_tables: self.hash_tables.clone(),
        })
    }

    fn copy_region(&self, position: usize, length: usize) -> BlockRef {
        check_valid_region(self.position_count(), position, length);
        let (start, count) = self.entries_in_region(position, length);
        let raw_keys = self.raw_keys.copy_region(start, count);
        let raw_values = self.raw_values.copy_region(start, count);
        let offsets = compact_offsets(&self.offsets, position, length);
        // Slots are map-relative, so a built index survives the copy.
        let hash_tables = Arc::new(self.hash_tables.copy_range(
            start,
            count,
            raw_keys.clone(),
            offsets.clone(),
        ));
        Arc::new(Self {
            raw_keys,
            raw_values,
            offsets,
            nulls: compact_nulls(self.nulls.as_ref(), position, length),
            hash_tables,
        })
    }

    fn copy_positions(&self, positions: &[usize]) -> BlockRef {
        check_valid_positions(positions, self.position_count());
        let mut entry_positions = Vec::new();
        let mut offsets = BufferMut::with_capacity(positions.len() + 1);
        offsets.push(0i32);
        for &p in positions {
            let (start, end) = self.entry_range(p);
            entry_positions.extend(start..end);
            offsets.push(entry_positions.len() as i32);
        }
        let nulls = self
            .nulls
            .as_ref()
            .map(|nulls| positions.iter().map(|&p| nulls[p]).collect());
        let raw_keys = self.raw_keys.copy_positions(&entry_positions);
        let raw_values = self.raw_values.copy_positions(&entry_positions);
        let offsets = offsets.freeze();
        let hash_tables = Arc::new(MapHashTables::new(raw_keys.clone(), offsets.clone()));
        Arc::new(Self {
            raw_keys,
            raw_values,
            offsets,
            nulls,
            hash_tables,
        })
    }

    fn get_single_value_block(&self, position: usize) -> BlockRef {
        // Deep copy, exposed through the interleaved single-map view.
        self.copy_region(position, 1).get_block(0)
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
            offsets: self.offsets.clone(),
            nulls: self.nulls.clone(),
            hash_tables: self.hash_tables.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::blocks::{
        MapBlock, MapBlockBuilder, PrimitiveBlockBuilder, SingleMapBlock,
        VariableWidthBlock, VariableWidthBlockBuilder,
    };
    use crate::{Block, BlockBuilder, BlockRef};

    /// `[{"a": 1, "b": 2}, null, {"c": 3}]`
    fn sample() -> BlockRef {
        let mut builder = MapBlockBuilder::new(
            Box::new(VariableWidthBlockBuilder::new(None, 3, 16)),
            Box::new(PrimitiveBlockBuilder::<i64>::new(None, 3)),
            None,
            3,
            false,
        );
        {
            let entry = builder.begin_block_entry();
            entry.write_bytes(b"a");
            entry.write_long(1);
            entry.write_bytes(b"b");
            entry.write_long(2);
        }
        builder.close_entry();
        builder.append_null();
        {
            let entry = builder.begin_block_entry();
            entry.write_bytes(b"c");
            entry.write_long(3);
        }
        builder.close_entry();
        builder.build()
    }

    fn as_map(block: &BlockRef) -> &MapBlock {
        block.as_any().downcast_ref::<MapBlock>().unwrap()
    }

    fn key_block(key: &str) -> VariableWidthBlock {
        VariableWidthBlock::from_strings([Some(key)])
    }

    #[test]
    fn entries_read_back_interleaved() {
        let block = sample();
        assert_eq!(block.position_count(), 3);
        let first = block.get_block(0);
        // Interleaved view: key, value, key, value.
        assert_eq!(first.position_count(), 4);
        assert_eq!(first.get_slice(0, 0, 1).as_slice(), b"a");
        assert_eq!(first.get_long(1, 0), 1);
        assert_eq!(first.get_slice(2, 0, 1).as_slice(), b"b");
        assert_eq!(first.get_long(3, 0), 2);
        assert!(block.is_null(1));
    }

    #[test]
    fn seek_key_finds_value_position() {
        let block = sample();
        let first = block.get_block(0);
        let first = first.as_any().downcast_ref::<SingleMapBlock>().unwrap();
        assert_eq!(first.seek_key(&key_block("b"), 0), Some(3));
        assert_eq!(first.seek_key(&key_block("z"), 0), None);
    }

    #[test]
    fn region_shares_hash_tables() {
        let block = sample();
        let map = as_map(&block);
        let region = block.get_region(2, 1);
        let region = as_map(&region);
        assert!(Arc::ptr_eq(region.hash_tables(), map.hash_tables()));
        let single = region.get_block(0);
        let single = single.as_any().downcast_ref::<SingleMapBlock>().unwrap();
        assert_eq!(single.seek_key(&key_block("c"), 0), Some(1));
    }

    #[test]
    fn copy_region_keeps_lookup_working() {
        let block = sample();
        // Force the index to exist before the copy.
        let single = block.get_block(0);
        let single = single.as_any().downcast_ref::<SingleMapBlock>().unwrap();
        assert_eq!(single.seek_key(&key_block("a"), 0), Some(1));

        let copied = block.copy_region(0, 1);
        let copied = as_map(&copied);
        assert_eq!(copied.raw_keys().position_count(), 2);
        let single = copied.get_block(0);
        let single = single.as_any().downcast_ref::<SingleMapBlock>().unwrap();
        assert_eq!(single.seek_key(&key_block("b"), 0), Some(3));
    }

    #[test]
    fn copy_positions_reorders_maps() {
        let block = sample();
        let copied = block.copy_positions(&[2, 0]);
        let copied = as_map(&copied);
        assert_eq!(copied.position_count(), 2);
        let single = copied.get_block(0);
        assert_eq!(single.get_slice(0, 0, 1).as_slice(), b"c");
        assert_eq!(single.get_long(1, 0), 3);
    }

    #[test]
    fn size_counts_entries_offsets_and_tables() {
        let block = sample();
        let map = as_map(&block);
        let keys = map.raw_keys().size_in_bytes();
        let values = map.raw_values().size_in_bytes();
        // 3 entries * 2 slots * 4 bytes of hash table, 3 positions * 5 bytes.
        assert_eq!(block.size_in_bytes(), keys + values + 3 * 2 * 4 + 3 * 5);
    }
}
