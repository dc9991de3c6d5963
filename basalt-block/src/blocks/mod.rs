//! Concrete block representations.

mod array;
mod dictionary;
mod int96;
mod int128;
mod lazy;
mod map;
mod nested;
mod primitive;
mod rle;
mod row;
mod varwidth;

pub use array::{ArrayBlock, ArrayBlockBuilder};
pub use dictionary::{DictionaryBlock, DictionaryId};
pub use int96::{Int96Block, Int96BlockBuilder};
pub use int128::{Int128Block, Int128BlockBuilder};
pub use lazy::{LazyBlock, LazyBlockLoader, LoadListener, attach_load_listeners};
pub use map::{MAP_HASH_MULTIPLIER, MapBlock, MapBlockBuilder, MapHashTables, SingleMapBlock};
pub use primitive::{
    ByteBlock, ByteBlockBuilder, IntBlock, IntBlockBuilder, LongBlock, LongBlockBuilder,
    NativeValue, PrimitiveBlock, PrimitiveBlockBuilder, ShortBlock, ShortBlockBuilder,
};
pub use rle::RunLengthEncodedBlock;
pub use row::{RowBlock, RowBlockBuilder, SingleRowBlock};
pub use varwidth::{VariableWidthBlock, VariableWidthBlockBuilder};
