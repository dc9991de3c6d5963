use std::fmt::Debug;

use basalt_i128::I128;

use crate::BlockRef;
use crate::checks::unsupported_op;
use crate::status::BlockBuilderStatus;

/// Mutable, append-only counterpart to [`crate::Block`].
///
/// A builder is owned by a single writer. Fixed- and variable-width writes
/// (`write_*`) each complete one entry. Nested values follow the open/close
/// protocol: `begin_block_entry` returns the writer for the entry's content,
/// and exactly one `close_entry` or `append_null` must follow before the next
/// entry begins; violations panic.
///
/// `build` freezes the accumulated content into an immutable block and leaves
/// the builder drained; `new_block_builder_like` produces a fresh empty
/// builder of the same shape for the next batch.
pub trait BlockBuilder: Debug {
    /// Short builder name used in error messages.
    fn builder_name(&self) -> &'static str;

    /// Number of entries appended so far.
    fn position_count(&self) -> usize;

    /// Compacted size of the content written so far.
    fn size_in_bytes(&self) -> usize;

    /// Heap footprint of the builder including spare capacity.
    fn retained_size_in_bytes(&self) -> usize;

    fn write_byte(&mut self, _value: i8) {
        unsupported_op(self.builder_name(), "write_byte")
    }

    fn write_short(&mut self, _value: i16) {
        unsupported_op(self.builder_name(), "write_short")
    }

    fn write_int(&mut self, _value: i32) {
        unsupported_op(self.builder_name(), "write_int")
    }

    fn write_long(&mut self, _value: i64) {
        unsupported_op(self.builder_name(), "write_long")
    }

    fn write_int96(&mut self, _hi: i64, _lo: u32) {
        unsupported_op(self.builder_name(), "write_int96")
    }

    fn write_i128(&mut self, _value: I128) {
        unsupported_op(self.builder_name(), "write_i128")
    }

    /// Append one variable-width value.
    fn write_bytes(&mut self, _bytes: &[u8]) {
        unsupported_op(self.builder_name(), "write_bytes")
    }

    /// Append a null entry.
    fn append_null(&mut self);

    /// Open a nested entry and return the writer for its content.
    fn begin_block_entry(&mut self) -> &mut dyn BlockBuilder {
        unsupported_op(self.builder_name(), "begin_block_entry")
    }

    /// Close the entry opened by [`BlockBuilder::begin_block_entry`].
    fn close_entry(&mut self) {
        unsupported_op(self.builder_name(), "close_entry")
    }

    /// Freeze the accumulated content into an immutable block, draining the
    /// builder.
    fn build(&mut self) -> BlockRef;

    /// A fresh, empty builder of the same shape.
    fn new_block_builder_like(&self, status: Option<BlockBuilderStatus>) -> Box<dyn BlockBuilder>;
}
