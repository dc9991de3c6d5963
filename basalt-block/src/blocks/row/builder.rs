use std::mem;
use std::sync::Arc;

use basalt_buffer::BufferMut;
use basalt_error::basalt_panic;
use basalt_i128::I128;

use crate::blocks::nested::PER_POSITION_OVERHEAD;
use crate::blocks::row::RowBlock;
use crate::builder::BlockBuilder;
use crate::{BlockBuilderStatus, BlockRef};

/// Builder for [`RowBlock`]. A row entry writes one value to each field, in
/// declaration order, through the writer returned by `begin_block_entry`;
/// `close_entry` checks that every field was written.
#[derive(Debug)]
pub struct RowBlockBuilder {
    status: Option<BlockBuilderStatus>,
    entry: RowEntryWriter,
    offsets: BufferMut<i32>,
    nulls: BufferMut<bool>,
    has_null_value: bool,
    entry_open: bool,
}

/// Routes sequential writes of one row to the field builders in order.
///
/// Implements [`BlockBuilder`] so nested field values follow the same
/// open/close protocol as top-level entries; `build` and friends are not
/// meaningful on the writer and panic.
#[derive(Debug)]
struct RowEntryWriter {
    field_builders: Vec<Box<dyn BlockBuilder>>,
    cursor: usize,
}

impl RowEntryWriter {
    fn current(&mut self) -> &mut dyn BlockBuilder {
        if self.cursor >= self.field_builders.len() {
            basalt_panic!(
                "row entry already has all {} fields",
                self.field_builders.len()
            );
        }
        &mut *self.field_builders[self.cursor]
    }
}

impl BlockBuilder for RowEntryWriter {
    fn builder_name(&self) -> &'static str {
        "RowEntryWriter"
    }

    fn position_count(&self) -> usize {
        self.cursor
    }

    fn size_in_bytes(&self) -> usize {
        self.field_builders
            .iter()
            .map(|field| field.size_in_bytes())
            .sum()
    }

    fn retained_size_in_bytes(&self) -> usize {
        size_of::<Self>()
            + self
                .field_builders
                .iter()
                .map(|field| field.retained_size_in_bytes())
                .sum::<usize>()
    }

    fn write_byte(&mut self, value: i8) {
        self.current().write_byte(value);
        self.cursor += 1;
    }

    fn write_short(&mut self, value: i16) {
        self.current().write_short(value);
        self.cursor += 1;
    }

    fn write_int(&mut self, value: i32) {
        self.current().write_int(value);
        self.cursor += 1;
    }

    fn write_long(&mut self, value: i64) {
        self.current().write_long(value);
        self.cursor += 1;
    }

    fn write_int96(&mut self, hi: i64, lo: u32) {
        self.current().write_int96(hi, lo);
        self.cursor += 1;
    }

    fn write_i128(&mut self, value: I128) {
        self.current().write_i128(value);
        self.cursor += 1;
    }

    fn write_bytes(&mut self, bytes: &[u8]) {
        self.current().write_bytes(bytes);
        self.cursor += 1;
    }

    fn append_null(&mut self) {
        self.current().append_null();
        self.cursor += 1;
    }

    fn begin_block_entry(&mut self) -> &mut dyn BlockBuilder {
        self.current().begin_block_entry()
    }

    fn close_entry(&mut self) {
        self.current().close_entry();
        self.cursor += 1;
    }

    fn build(&mut self) -> BlockRef {
        basalt_panic!("row entry writer cannot build a block")
    }

    fn new_block_builder_like(&self, _status: Option<BlockBuilderStatus>) -> Box<dyn BlockBuilder> {
        basalt_panic!("row entry writer cannot be cloned")
    }
}

impl RowBlockBuilder {
    pub fn new(
        field_builders: Vec<Box<dyn BlockBuilder>>,
        status: Option<BlockBuilderStatus>,
        expected_entries: usize,
    ) -> Self {
        if field_builders.is_empty() {
            basalt_panic!("row block builder requires at least one field");
        }
        let mut offsets = BufferMut::with_capacity(expected_entries + 1);
        offsets.push(0i32);
        Self {
            status,
            entry: RowEntryWriter {
                field_builders,
                cursor: 0,
            },
            offsets,
            nulls: BufferMut::with_capacity(expected_entries),
            has_null_value: false,
            entry_open: false,
        }
    }

    fn finish_entry(&mut self, null: bool) {
        self.offsets
            .push(self.entry.field_builders[0].position_count() as i32);
        self.nulls.push(null);
        self.has_null_value |= null;
        if let Some(status) = &mut self.status {
            status.add_bytes(PER_POSITION_OVERHEAD);
        }
    }
}

impl BlockBuilder for RowBlockBuilder {
    fn builder_name(&self) -> &'static str {
        "RowBlockBuilder"
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
            basalt_panic!("append_null while a row entry is open");
        }
        self.finish_entry(true);
    }

    fn begin_block_entry(&mut self) -> &mut dyn BlockBuilder {
        if self.entry_open {
            basalt_panic!("row entry already open");
        }
        self.entry_open = true;
        self.entry.cursor = 0;
        &mut self.entry
    }

    fn close_entry(&mut self) {
        if !self.entry_open {
            basalt_panic!("close_entry without an open row entry");
        }
        if self.entry.cursor != self.entry.field_builders.len() {
            basalt_panic!(
                "row entry closed after {} of {} fields",
                self.entry.cursor,
                self.entry.field_builders.len()
            );
        }
        self.entry_open = false;
        self.finish_entry(false);
    }

    fn build(&mut self) -> BlockRef {
        if self.entry_open {
            basalt_panic!("build while a row entry is open");
        }
        let field_blocks = self
            .entry
            .field_builders
            .iter_mut()
            .map(|field| field.build())
            .collect();
        let offsets = mem::take(&mut self.offsets).freeze();
        let nulls = mem::take(&mut self.nulls).freeze();
        self.offsets.push(0i32);
        let has_null_value = mem::take(&mut self.has_null_value);
        Arc::new(RowBlock {
            field_blocks,
            offsets,
            nulls: has_null_value.then_some(nulls),
        })
    }

    fn new_block_builder_like(&self, status: Option<BlockBuilderStatus>) -> Box<dyn BlockBuilder> {
        let field_builders = self
            .entry
            .field_builders
            .iter()
            .map(|field| field.new_block_builder_like(status.as_ref().map(BlockBuilderStatus::sibling)))
            .collect();
        Box::new(Self::new(field_builders, status, self.nulls.capacity()))
    }
}

#[cfg(test)]
mod tests {
    use crate::BlockBuilder;
    use crate::blocks::{PrimitiveBlockBuilder, RowBlockBuilder};

    fn two_long_fields() -> RowBlockBuilder {
        RowBlockBuilder::new(
            vec![
                Box::new(PrimitiveBlockBuilder::<i64>::new(None, 2)),
                Box::new(PrimitiveBlockBuilder::<i64>::new(None, 2)),
            ],
            None,
            2,
        )
    }

    #[test]
    #[should_panic(expected = "row entry closed after 1 of 2 fields")]
    fn partial_row_rejected() {
        let mut builder = two_long_fields();
        builder.begin_block_entry().write_long(1);
        builder.close_entry();
    }

    #[test]
    #[should_panic(expected = "already has all 2 fields")]
    fn extra_field_rejected() {
        let mut builder = two_long_fields();
        let row = builder.begin_block_entry();
        row.write_long(1);
        row.write_long(2);
        row.write_long(3);
    }

    #[test]
    fn null_fields_within_a_row() {
        let mut builder = two_long_fields();
        let row = builder.begin_block_entry();
        row.write_long(1);
        row.append_null();
        builder.close_entry();
        let block = builder.build();
        let row = block.get_block(0);
        assert_eq!(row.get_long(0, 0), 1);
        assert!(row.is_null(1));
    }

    #[test]
    fn builder_like_replicates_fields() {
        let mut builder = two_long_fields();
        let row = builder.begin_block_entry();
        row.write_long(1);
        row.write_long(2);
        builder.close_entry();
        let like = builder.new_block_builder_like(None);
        assert_eq!(like.position_count(), 0);
    }
}
