//! Encoding-agnostic views of nested blocks.
//!
//! Vectorized consumers want direct offset+child access to arrays, maps, and
//! rows regardless of whether the block arrived plain, dictionary-encoded,
//! run-length encoded, or lazy. The `to_columnar_*` normalizers produce that
//! view without expanding the data: for encoded inputs the child blocks are
//! synthesized as dictionaries over the underlying children, so repetition
//! stays shared.

mod array;
mod map;
mod row;

pub use array::{ColumnarArray, to_columnar_array};
pub use map::{ColumnarMap, to_columnar_map};
pub use row::{ColumnarRow, to_columnar_row};

use crate::block::BlockRef;
use crate::blocks::LazyBlock;

/// Materialize a lazy input; anything else passes through.
fn resolve(block: &BlockRef) -> BlockRef {
    match block.as_any().downcast_ref::<LazyBlock>() {
        Some(lazy) => lazy.block().clone(),
        None => block.clone(),
    }
}
