use crate::blocks::{
    Int96BlockBuilder, Int128BlockBuilder, PrimitiveBlockBuilder, VariableWidthBlockBuilder,
};
use crate::builder::BlockBuilder;
use crate::status::BlockBuilderStatus;

/// Physical storage kind of a leaf column.
///
/// The logical type layer maps each of its types onto one of these closed
/// variants to pick a block representation; the engine matches on them
/// exhaustively instead of inspecting runtime type tags.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum NativeKind {
    Byte,
    Short,
    Int,
    Long,
    Int96,
    Int128,
    Bytes,
}

impl NativeKind {
    /// Fixed storage width in bytes; `None` for variable-width values.
    pub fn fixed_width(self) -> Option<usize> {
        match self {
            NativeKind::Byte => Some(1),
            NativeKind::Short => Some(2),
            NativeKind::Int => Some(4),
            NativeKind::Long => Some(8),
            NativeKind::Int96 => Some(12),
            NativeKind::Int128 => Some(16),
            NativeKind::Bytes => None,
        }
    }
}

/// Create a leaf block builder for `kind`.
///
/// `expected_entries` presizes the value lanes; `expected_bytes_per_entry`
/// presizes the byte arena of variable-width builders and is ignored for
/// fixed-width kinds. Nested builders (array/map/row) are constructed
/// directly from their child builders.
pub fn create_block_builder(
    kind: NativeKind,
    status: Option<BlockBuilderStatus>,
    expected_entries: usize,
    expected_bytes_per_entry: usize,
) -> Box<dyn BlockBuilder> {
    match kind {
        NativeKind::Byte => {
            Box::new(PrimitiveBlockBuilder::<i8>::new(status, expected_entries))
        }
        NativeKind::Short => {
            Box::new(PrimitiveBlockBuilder::<i16>::new(status, expected_entries))
        }
        NativeKind::Int => Box::new(PrimitiveBlockBuilder::<i32>::new(status, expected_entries)),
        NativeKind::Long => Box::new(PrimitiveBlockBuilder::<i64>::new(status, expected_entries)),
        NativeKind::Int96 => Box::new(Int96BlockBuilder::new(status, expected_entries)),
        NativeKind::Int128 => Box::new(Int128BlockBuilder::new(status, expected_entries)),
        NativeKind::Bytes => Box::new(VariableWidthBlockBuilder::new(
            status,
            expected_entries,
            expected_entries.saturating_mul(expected_bytes_per_entry),
        )),
    }
}
