use std::mem;
use std::sync::Arc;

use basalt_buffer::BufferMut;
use basalt_error::basalt_panic;
use basalt_i128::I128;

use crate::blocks::MapHashTables;
use crate::blocks::map::MapBlock;
use crate::blocks::map::hash_tables::check_no_duplicate_keys;
use crate::blocks::nested::PER_POSITION_OVERHEAD;
use crate::builder::BlockBuilder;
use crate::{BlockBuilderStatus, BlockRef};

/// Builder for [`MapBlock`]. A map entry writes alternating keys and values
/// through the writer returned by `begin_block_entry`; `close_entry` checks
/// that the last key received a value. In strict mode, `build` verifies that
/// no map holds duplicate keys and panics if one does.
#[derive(Debug)]
pub struct MapBlockBuilder {
    status: Option<BlockBuilderStatus>,
    entry: KeyValueWriter,
    offsets: BufferMut<i32>,
    nulls: BufferMut<bool>,
    has_null_value: bool,
    entry_open: bool,
    strict: bool,
}

/// Routes alternating writes of one map entry: even writes go to the key
/// builder, odd writes to the value builder. Null keys are rejected.
#[derive(Debug)]
struct KeyValueWriter {
    key_builder: Box<dyn BlockBuilder>,
    value_builder: Box<dyn BlockBuilder>,
    writes: usize,
}

impl KeyValueWriter {
    fn writing_key(&self) -> bool {
        self.writes % 2 == 0
    }

    fn current(&mut self) -> &mut dyn BlockBuilder {
        if self.writing_key() {
            &mut *self.key_builder
        } else {
            &mut *self.value_builder
        }
    }
}

impl BlockBuilder for KeyValueWriter {
    fn builder_name(&self) -> &'static str {
        "MapEntryWriter"
    }

    fn position_count(&self) -> usize {
        self.writes
    }

    fn size_in_bytes(&self) -> usize {
        self.key_builder.size_in_bytes() + self.value_builder.size_in_bytes()
    }

    fn retained_size_in_bytes(&self) -> usize {
        size_of::<Self>()
            + self.key_builder.retained_size_in_bytes()
            + self.value_builder.retained_size_in_bytes()
    }

    fn write_byte(&mut self, value: i8) {
        self.current().write_byte(value);
        self.writes += 1;
    }

    fn write_short(&mut self, value: i16) {
        self.current().write_short(value);
        self.writes += 1;
    }

    fn write_int(&mut self, value: i32) {
        self.current().write_int(value);
        self.writes += 1;
    }

    fn write_long(&mut self, value: i64) {
        self.current().write_long(value);
        self.writes += 1;
    }

    fn write_int96(&mut self, hi: i64, lo: u32) {
        self.current().write_int96(hi, lo);
        self.writes += 1;
    }

    fn write_i128(&mut self, value: I128) {
        self.current().write_i128(value);
        self.writes += 1;
    }

    fn write_bytes(&mut self, bytes: &[u8]) {
        self.current().write_bytes(bytes);
        self.writes += 1;
    }

    fn append_null(&mut self) {
        if self.writing_key() {
            basalt_panic!("map keys may not be null");
        }
        self.current().append_null();
        self.writes += 1;
    }

    fn begin_block_entry(&mut self) -> &mut dyn BlockBuilder {
        self.current().begin_block_entry()
    }

    fn close_entry(&mut self) {
        self.current().close_entry();
        self.writes += 1;
    }

    fn build(&mut self) -> BlockRef {
        basalt_panic!("map entry writer cannot build a block")
    }

    fn new_block_builder_like(&self, _status: Option<BlockBuilderStatus>) -> Box<dyn BlockBuilder> {
        basalt_panic!("map entry writer cannot be cloned")
    }
}

impl MapBlockBuilder {
    pub fn new(
        key_builder: Box<dyn BlockBuilder>,
        value_builder: Box<dyn BlockBuilder>,
        status: Option<BlockBuilderStatus>,
        expected_entries: usize,
        strict: bool,
    ) -> Self {
        let mut offsets = BufferMut::with_capacity(expected_entries + 1);
        offsets.push(0i32);
        Self {
            status,
            entry: KeyValueWriter {
                key_builder,
                value_builder,
                writes: 0,
            },
            offsets,
            nulls: BufferMut::with_capacity(expected_entries),
            has_null_value: false,
            entry_open: false,
            strict,
        }
    }

    fn finish_entry(&mut self, null: bool) {
        self.offsets
            .push(self.entry.key_builder.position_count() as i32);
        self.nulls.push(null);
        self.has_null_value |= null;
        if let Some(status) = &mut self.status {
            status.add_bytes(PER_POSITION_OVERHEAD);
        }
    }
}

impl BlockBuilder for MapBlockBuilder {
    fn builder_name(&self) -> &'static str {
        "MapBlockBuilder"
    }

    fn position_count(&self) -> usize {
        self.offsets.len() - 1
    }

    fn size_in_bytes(&self) -> usize {
        self.entry.size_in_bytes() + PER_POSITION_OVERHEAD * self.position_count()
    }

    fn retained_size_in_bytes(&self) -> usize {
        size_of::<Self>()
            + self.entry.retained_size_in_bytes()
            + self.offsets.capacity() * size_of::<i32>()
            + self.nulls.capacity()
    }

    fn append_null(&mut self) {
        if self.entry_open {
            basalt_panic!("append_null while a map entry is open");
        }
        self.finish_entry(true);
    }

    fn begin_block_entry(&mut self) -> &mut dyn BlockBuilder {
        if self.entry_open {
            basalt_panic!("map entry already open");
        }
        self.entry_open = true;
        self.entry.writes = 0;
        &mut self.entry
    }

    fn close_entry(&mut self) {
        if !self.entry_open {
            basalt_panic!("close_entry without an open map entry");
        }
        if !self.entry.writing_key() {
            basalt_panic!("map entry closed with a key awaiting its value");
        }
        self.entry_open = false;
        self.finish_entry(false);
    }

    fn build(&mut self) -> BlockRef {
        if self.entry_open {
            basalt_panic!("build while a map entry is open");
        }
        let raw_keys = self.entry.key_builder.build();
        let raw_values = self.entry.value_builder.build();
        let offsets = mem::take(&mut self.offsets).freeze();
        let nulls = mem::take(&mut self.nulls).freeze();
        self.offsets.push(0i32);
        let has_null_value = mem::take(&mut self.has_null_value);
        if self.strict {
            if let Err(err) = check_no_duplicate_keys(&*raw_keys, offsets.as_slice()) {
                basalt_panic!(DataIntegrity: "{}", err);
            }
        }
        let hash_tables = Arc::new(MapHashTables::new(raw_keys.clone(), offsets.clone()));
        Arc::new(MapBlock {
            raw_keys,
            raw_values,
            offsets,
            nulls: has_null_value.then_some(nulls),
            hash_tables,
        })
    }

    fn new_block_builder_like(&self, status: Option<BlockBuilderStatus>) -> Box<dyn BlockBuilder> {
        Box::new(Self::new(
            self.entry
                .key_builder
                .new_block_builder_like(status.as_ref().map(BlockBuilderStatus::sibling)),
            self.entry
                .value_builder
                .new_block_builder_like(status.as_ref().map(BlockBuilderStatus::sibling)),
            status,
            self.nulls.capacity(),
            self.strict,
        ))
    }
}

#[cfg(test)]
mod tests {
    use crate::BlockBuilder;
    use crate::blocks::{MapBlockBuilder, PrimitiveBlockBuilder, VariableWidthBlockBuilder};

    fn string_to_long(strict: bool) -> MapBlockBuilder {
        MapBlockBuilder::new(
            Box::new(VariableWidthBlockBuilder::new(None, 4, 16)),
            Box::new(PrimitiveBlockBuilder::<i64>::new(None, 4)),
            None,
            4,
            strict,
        )
    }

    #[test]
    #[should_panic(expected = "duplicate map key")]
    fn strict_mode_rejects_duplicate_keys() {
        let mut builder = string_to_long(true);
        let entry = builder.begin_block_entry();
        entry.write_bytes(b"a");
        entry.write_long(1);
        entry.write_bytes(b"a");
        entry.write_long(2);
        builder.close_entry();
        builder.build();
    }

    #[test]
    fn lenient_mode_keeps_first_duplicate() {
        let mut builder = string_to_long(false);
        let entry = builder.begin_block_entry();
        entry.write_bytes(b"a");
        entry.write_long(1);
        entry.write_bytes(b"a");
        entry.write_long(2);
        builder.close_entry();
        let block = builder.build();
        let single = block.get_block(0);
        let single = single
            .as_any()
            .downcast_ref::<crate::blocks::SingleMapBlock>()
            .unwrap();
        let probe = crate::blocks::VariableWidthBlock::from_strings([Some("a")]);
        assert_eq!(single.seek_key(&probe, 0), Some(1));
    }

    #[test]
    #[should_panic(expected = "map keys may not be null")]
    fn null_keys_rejected() {
        let mut builder = string_to_long(false);
        builder.begin_block_entry().append_null();
    }

    #[test]
    #[should_panic(expected = "key awaiting its value")]
    fn dangling_key_rejected() {
        let mut builder = string_to_long(false);
        builder.begin_block_entry().write_bytes(b"a");
        builder.close_entry();
    }

    #[test]
    fn empty_map_entries_allowed() {
        let mut builder = string_to_long(false);
        builder.begin_block_entry();
        builder.close_entry();
        builder.append_null();
        let block = builder.build();
        assert_eq!(block.position_count(), 2);
        assert_eq!(block.get_block(0).position_count(), 0);
    }
}
