//! In-memory columnar block representation and encoding engine.
//!
//! A [`Block`] is an immutable, position-addressed sequence of values of one
//! nominal type. Leaf blocks store flat primitive lanes; nested blocks
//! (array/map/row) flatten compound values into a child block plus an offset
//! vector; [`DictionaryBlock`] and [`RunLengthEncodedBlock`] compress repeated
//! or low-cardinality data in memory; [`LazyBlock`] defers materialization
//! until first touch. The `columnar` module normalizes any of these encodings
//! into flat offset+children views for vectorized consumers.
//!
//! Blocks are built through [`BlockBuilder`]s, which report their byte usage
//! into a shared [`PageBuilderStatus`] so a caller assembling many columns can
//! stop at a page boundary.

mod block;
mod builder;
mod checks;
mod compact;
mod kind;
mod status;

pub mod blocks;
pub mod columnar;

pub use block::{Block, BlockRef};
pub use builder::BlockBuilder;
pub use checks::{check_readable_position, check_valid_positions, check_valid_region};
pub use kind::{NativeKind, create_block_builder};
pub use status::{
    BlockBuilderStatus, DEFAULT_MAX_PAGE_SIZE_IN_BYTES, PageBuilderStatus,
};
