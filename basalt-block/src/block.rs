use std::any::Any;
use std::fmt::Debug;
use std::sync::Arc;

use basalt_buffer::Buffer;
use basalt_i128::I128;

use crate::checks::unsupported_op;

/// Shared handle to an immutable block.
///
/// Blocks are immutable after construction and freely aliased across threads
/// and across other blocks (a region view shares its source's storage; a
/// dictionary's entries are shared by every block referencing them).
pub type BlockRef = Arc<dyn Block>;

/// An immutable, position-addressed sequence of values (possibly null) of one
/// nominal type.
///
/// Positions are zero-based logical row indices in `[0, position_count())`;
/// every accessor panics on an out-of-range position. Value accessors carry a
/// byte `offset` so the generic interface can address sub-fields of wider
/// types uniformly: it must be the representation's expected offset (0, or 8
/// for the second lane of a 96/128-bit value) and anything else panics.
///
/// Value accessors the representation does not support panic as unsupported;
/// concrete blocks override the ones that apply to their storage.
pub trait Block: Debug + Send + Sync + 'static {
    /// Short representation name used in error messages.
    fn block_name(&self) -> &'static str;

    /// Self as [`Any`], for encoding-specific downcasts (dictionary
    /// unnesting, RLE collapse, columnar normalization).
    fn as_any(&self) -> &dyn Any;

    /// Number of logical entries.
    fn position_count(&self) -> usize;

    /// Compacted size: the bytes this block would occupy with all
    /// over-allocation and unreferenced data removed.
    fn size_in_bytes(&self) -> usize;

    /// Actual heap footprint including over-allocated capacity and data
    /// retained by views. Called on critical paths, so O(1) amortized.
    fn retained_size_in_bytes(&self) -> usize;

    /// Size as if every repeated value were fully expanded. Differs from
    /// [`Block::size_in_bytes`] for dictionary and run-length encodings.
    fn logical_size_in_bytes(&self) -> usize {
        self.size_in_bytes()
    }

    /// Compacted size of the region `[position, position + length)`, computed
    /// without materializing it.
    fn region_size_in_bytes(&self, position: usize, length: usize) -> usize;

    /// Compacted size of the selected positions (`positions[i] == true`),
    /// computed without materializing them. `selected_count` is the number of
    /// `true` entries, passed so implementations need not recount.
    fn positions_size_in_bytes(&self, positions: &[bool], selected_count: usize) -> usize;

    /// Approximate byte width of the value at `position` as seen by
    /// statistics collection: 0 for null, the data width otherwise.
    fn estimated_data_size_for_stats(&self, position: usize) -> usize;

    /// Fast-path hint: `false` guarantees no nulls; `true` promises nothing.
    fn may_have_null(&self) -> bool;

    /// Whether the value at `position` is null.
    fn is_null(&self, position: usize) -> bool;

    fn get_byte(&self, _position: usize, _offset: usize) -> i8 {
        unsupported_op(self.block_name(), "get_byte")
    }

    fn get_short(&self, _position: usize, _offset: usize) -> i16 {
        unsupported_op(self.block_name(), "get_short")
    }

    fn get_int(&self, _position: usize, _offset: usize) -> i32 {
        unsupported_op(self.block_name(), "get_int")
    }

    fn get_long(&self, _position: usize, _offset: usize) -> i64 {
        unsupported_op(self.block_name(), "get_long")
    }

    /// Read a 96-bit value as its `(hi, lo)` lanes.
    fn get_int96(&self, _position: usize) -> (i64, u32) {
        unsupported_op(self.block_name(), "get_int96")
    }

    fn get_i128(&self, _position: usize) -> I128 {
        unsupported_op(self.block_name(), "get_i128")
    }

    /// Zero-copy view of `length` bytes of the variable-width value at
    /// `position`, starting `offset` bytes in.
    fn get_slice(&self, _position: usize, _offset: usize, _length: usize) -> Buffer<u8> {
        unsupported_op(self.block_name(), "get_slice")
    }

    /// Byte length of the variable-width value at `position`.
    fn get_slice_length(&self, _position: usize) -> usize {
        unsupported_op(self.block_name(), "get_slice_length")
    }

    /// The nested value at `position` as a block: an array's element region,
    /// a map's interleaved single-map view, or a row's single-row view.
    fn get_block(&self, _position: usize) -> BlockRef {
        unsupported_op(self.block_name(), "get_block")
    }

    /// Hash of the native value at `position`, for map key indexing.
    /// Unsupported on nested representations.
    fn hash_position(&self, _position: usize) -> u64 {
        unsupported_op(self.block_name(), "hash_position")
    }

    /// Whether the native value at `position` equals the value at
    /// `other_position` of `other` (which must hold the same nominal type).
    fn positions_equal(&self, _position: usize, _other: &dyn Block, _other_position: usize) -> bool {
        unsupported_op(self.block_name(), "positions_equal")
    }

    /// The nested blocks this block owns; empty for leaf blocks.
    fn children(&self) -> Vec<BlockRef> {
        Vec::new()
    }

    /// View over `[position, position + length)`. May share storage with this
    /// block; both are immutable so aliasing is safe by construction.
    fn get_region(&self, position: usize, length: usize) -> BlockRef;

    /// Compact copy of `[position, position + length)`: the result retains no
    /// data outside the requested range.
    fn copy_region(&self, position: usize, length: usize) -> BlockRef;

    /// Compact copy of the given positions, in the given order.
    fn copy_positions(&self, positions: &[usize]) -> BlockRef;

    /// The value at `position` materialized as a standalone one-position
    /// block (a deep copy for nested types).
    fn get_single_value_block(&self, position: usize) -> BlockRef;

    /// Whether this block and all of its children are materialized. Only lazy
    /// blocks (and containers holding them) return `false`.
    fn is_loaded(&self) -> bool {
        true
    }

    /// This block with every lazy descendant materialized.
    fn loaded_block(self: Arc<Self>) -> BlockRef;
}
