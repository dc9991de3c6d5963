use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use basalt_buffer::Buffer;
use basalt_error::{BasaltResult, BasaltUnwrap, basalt_bail};
use basalt_i128::I128;
use log::debug;

use crate::block::{Block, BlockRef};
use crate::checks::{check_readable_position, check_valid_positions, check_valid_region};

/// Identity of a dictionary instance, used by downstream consumers to detect
/// that two blocks share the same dictionary without comparing contents.
///
/// Ids are process-unique and never reused; compaction and copying allocate a
/// fresh id because the resulting dictionary is a different object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DictionaryId(u64);

impl DictionaryId {
    pub fn new() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for DictionaryId {
    fn default() -> Self {
        Self::new()
    }
}

/// Sizes and structural facts about a dictionary block that require a full
/// scan of the id array, computed once on demand.
#[derive(Clone, Copy, Debug)]
struct DictionarySizes {
    size_in_bytes: usize,
    unique_ids: usize,
    /// True when the ids are exactly `0..position_count`, i.e. the dictionary
    /// indirection is the identity mapping.
    is_sequential_ids: bool,
}

/// Positions stored as indices into a shared dictionary of distinct values.
///
/// Reads map the requested position through the id array and delegate to the
/// dictionary. Nested dictionaries are flattened at construction so the
/// indirection is always exactly one level deep.
#[derive(Debug)]
pub struct DictionaryBlock {
    dictionary: BlockRef,
    ids: Buffer<i32>,
    source_id: DictionaryId,
    sizes: OnceLock<DictionarySizes>,
    logical_size: OnceLock<usize>,
}

impl DictionaryBlock {
    pub fn try_new(dictionary: BlockRef, ids: Buffer<i32>) -> BasaltResult<Self> {
        // Flatten one level of nesting by composing the id mappings. The
        // inner dictionary cannot itself be nested, so one step suffices.
        if let Some(inner) = dictionary.as_any().downcast_ref::<DictionaryBlock>() {
            debug!(
                "unnesting dictionary {} through {}",
                inner.source_id.0,
                inner.dictionary.block_name()
            );
            let remapped: Buffer<i32> = ids
                .iter()
                .map(|&id| {
                    check_readable_position(inner.ids.len(), id as usize);
                    inner.ids[id as usize]
                })
                .collect();
            return Ok(Self::new_unchecked(inner.dictionary.clone(), remapped));
        }
        let dictionary_count = dictionary.position_count();
        for &id in ids.iter() {
            if id < 0 || id as usize >= dictionary_count {
                basalt_bail!(
                    OutOfBounds: "dictionary id {} out of range for dictionary of {} positions",
                    id,
                    dictionary_count
                );
            }
        }
        Ok(Self::new_unchecked(dictionary, ids))
    }

    fn new_unchecked(dictionary: BlockRef, ids: Buffer<i32>) -> Self {
        Self {
            dictionary,
            ids,
            source_id: DictionaryId::new(),
            sizes: OnceLock::new(),
            logical_size: OnceLock::new(),
        }
    }

    pub fn dictionary(&self) -> &BlockRef {
        &self.dictionary
    }

    pub fn ids(&self) -> &Buffer<i32> {
        &self.ids
    }

    pub fn source_id(&self) -> DictionaryId {
        self.source_id
    }

    /// Id for `position`, after a bounds check.
    pub fn id(&self, position: usize) -> usize {
        check_readable_position(self.ids.len(), position);
        self.ids[position] as usize
    }

    fn sizes(&self) -> &DictionarySizes {
        self.sizes.get_or_init(|| {
            let dictionary_count = self.dictionary.position_count();
            let mut used = vec![false; dictionary_count];
            let mut unique_ids = 0;
            let mut is_sequential_ids = true;
            for (position, &id) in self.ids.iter().enumerate() {
                let id = id as usize;
                if !used[id] {
                    used[id] = true;
                    unique_ids += 1;
                }
                is_sequential_ids &= id == position;
            }
            DictionarySizes {
                size_in_bytes: self.dictionary.positions_size_in_bytes(&used, unique_ids)
                    + self.ids.len() * size_of::<i32>(),
                unique_ids,
                is_sequential_ids,
            }
        })
    }

    /// Number of distinct dictionary entries the ids actually reference.
    pub fn unique_ids(&self) -> usize {
        self.sizes().unique_ids
    }

    /// True when every dictionary entry is referenced, i.e. compacting would
    /// not shrink the dictionary.
    pub fn is_compact(&self) -> bool {
        self.unique_ids() == self.dictionary.position_count()
    }

    /// Rebuild the dictionary with only the referenced entries, in order of
    /// first reference, and remap the ids accordingly. Returns a clone of the
    /// id array over the existing dictionary when already compact.
    pub fn compact(&self) -> DictionaryBlock {
        if self.is_compact() {
            return Self::new_unchecked(self.dictionary.clone(), self.ids.clone());
        }
        let dictionary_count = self.dictionary.position_count();
        debug!(
            "compacting dictionary {}: {} of {} entries referenced",
            self.source_id.0,
            self.unique_ids(),
            dictionary_count
        );
        // -1 marks a dictionary entry not yet assigned a slot in the
        // compacted dictionary.
        let mut remap = vec![-1i32; dictionary_count];
        let mut positions_to_copy = Vec::with_capacity(self.unique_ids());
        let mut new_ids = Vec::with_capacity(self.ids.len());
        for &id in self.ids.iter() {
            let id = id as usize;
            if remap[id] < 0 {
                remap[id] = positions_to_copy.len() as i32;
                positions_to_copy.push(id);
            }
            new_ids.push(remap[id]);
        }
        Self::new_unchecked(
            self.dictionary.copy_positions(&positions_to_copy),
            Buffer::from_vec(new_ids),
        )
    }
}

impl Block for DictionaryBlock {
    fn block_name(&self) -> &'static str {
        "DictionaryBlock"
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn position_count(&self) -> usize {
        self.ids.len()
    }

    fn size_in_bytes(&self) -> usize {
        self.sizes().size_in_bytes
    }

    fn retained_size_in_bytes(&self) -> usize {
        size_of::<Self>()
            + self.ids.retained_size_in_bytes()
            + self.dictionary.retained_size_in_bytes()
    }

    fn logical_size_in_bytes(&self) -> usize {
        *self.logical_size.get_or_init(|| {
            self.ids
                .iter()
                .map(|&id| self.dictionary.region_size_in_bytes(id as usize, 1))
                .sum()
        })
    }

    fn region_size_in_bytes(&self, position: usize, length: usize) -> usize {
        check_valid_region(self.ids.len(), position, length);
        if length == 0 {
            return 0;
        }
        let dictionary_count = self.dictionary.position_count();
        let mut used = vec![false; dictionary_count];
        let mut unique_ids = 0;
        for &id in self.ids[position..position + length].iter() {
            let id = id as usize;
            if !used[id] {
                used[id] = true;
                unique_ids += 1;
            }
        }
        self.dictionary.positions_size_in_bytes(&used, unique_ids) + length * size_of::<i32>()
    }

    fn positions_size_in_bytes(&self, positions: &[bool], selected_count: usize) -> usize {
        check_valid_region(self.ids.len(), 0, positions.len());
        let dictionary_count = self.dictionary.position_count();
        let mut used = vec![false; dictionary_count];
        let mut unique_ids = 0;
        for (position, &selected) in positions.iter().enumerate() {
            if selected {
                let id = self.ids[position] as usize;
                if !used[id] {
                    used[id] = true;
                    unique_ids += 1;
                }
            }
        }
        self.dictionary.positions_size_in_bytes(&used, unique_ids)
            + selected_count * size_of::<i32>()
    }

    fn estimated_data_size_for_stats(&self, position: usize) -> usize {
        self.dictionary.estimated_data_size_for_stats(self.id(position))
    }

    fn may_have_null(&self) -> bool {
        !self.ids.is_empty() && self.dictionary.may_have_null()
    }

    fn is_null(&self, position: usize) -> bool {
        self.dictionary.is_null(self.id(position))
    }

    fn get_byte(&self, position: usize, offset: usize) -> i8 {
        self.dictionary.get_byte(self.id(position), offset)
    }

    fn get_short(&self, position: usize, offset: usize) -> i16 {
        self.dictionary.get_short(self.id(position), offset)
    }

    fn get_int(&self, position: usize, offset: usize) -> i32 {
        self.dictionary.get_int(self.id(position), offset)
    }

    fn get_long(&self, position: usize, offset: usize) -> i64 {
        self.dictionary.get_long(self.id(position), offset)
    }

    fn get_int96(&self, position: usize) -> (i64, u32) {
        self.dictionary.get_int96(self.id(position))
    }

    fn get_i128(&self, position: usize) -> I128 {
        self.dictionary.get_i128(self.id(position))
    }

    fn get_slice(&self, position: usize, offset: usize, length: usize) -> Buffer<u8> {
        self.dictionary.get_slice(self.id(position), offset, length)
    }

    fn get_slice_length(&self, position: usize) -> usize {
        self.dictionary.get_slice_length(self.id(position))
    }

    fn get_block(&self, position: usize) -> BlockRef {
        self.dictionary.get_block(self.id(position))
    }

    fn hash_position(&self, position: usize) -> u64 {
        self.dictionary.hash_position(self.id(position))
    }

    fn positions_equal(&self, position: usize, other: &dyn Block, other_position: usize) -> bool {
        self.dictionary
            .positions_equal(self.id(position), other, other_position)
    }

    fn children(&self) -> Vec<BlockRef> {
        vec![self.dictionary.clone()]
    }

    fn get_region(&self, position: usize, length: usize) -> BlockRef {
        check_valid_region(self.ids.len(), position, length);
        Arc::new(Self::new_unchecked(
            self.dictionary.clone(),
            self.ids.slice(position..position + length),
        ))
    }

    fn copy_region(&self, position: usize, length: usize) -> BlockRef {
        check_valid_region(self.ids.len(), position, length);
        // A copy this small carries no indirection worth keeping, and when
        // the ids are the identity mapping over a compact dictionary the
        // requested range is a contiguous dictionary slice. Either way the
        // dictionary copies it directly.
        if length <= 1 || (self.is_compact() && self.sizes().is_sequential_ids) {
            let start = if length == 0 { 0 } else { self.id(position) };
            return self.dictionary.copy_region(start, length);
        }
        let ids: Buffer<i32> = Buffer::copy_from(&self.ids[position..position + length]);
        Arc::new(Self::new_unchecked(self.dictionary.clone(), ids).compact())
    }

    fn copy_positions(&self, positions: &[usize]) -> BlockRef {
        check_valid_positions(positions, self.ids.len());
        let ids: Buffer<i32> = positions.iter().map(|&p| self.ids[p]).collect();
        Arc::new(Self::new_unchecked(self.dictionary.clone(), ids).compact())
    }

    fn get_single_value_block(&self, position: usize) -> BlockRef {
        self.dictionary.get_single_value_block(self.id(position))
    }

    fn is_loaded(&self) -> bool {
        self.dictionary.is_loaded()
    }

    fn loaded_block(self: Arc<Self>) -> BlockRef {
        if self.dictionary.is_loaded() {
            return self;
        }
        Arc::new(Self::new_unchecked(
            self.dictionary.clone().loaded_block(),
            self.ids.clone(),
        ))
    }
}

impl DictionaryBlock {
    /// Convenience for columnar adapters that already validated the ids.
    pub(crate) fn from_parts(dictionary: BlockRef, ids: Buffer<i32>) -> Self {
        Self::try_new(dictionary, ids).basalt_unwrap()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use basalt_buffer::Buffer;
    use basalt_error::BasaltUnwrap;

    use crate::blocks::{DictionaryBlock, IntBlock};
    use crate::{Block, BlockRef};

    fn dict_over(values: Vec<i32>, ids: Vec<i32>) -> DictionaryBlock {
        DictionaryBlock::try_new(
            Arc::new(IntBlock::from_values(values)),
            Buffer::from_vec(ids),
        )
        .basalt_unwrap()
    }

    #[test]
    fn reads_indirect_through_ids() {
        let block = dict_over(vec![10, 20, 30], vec![2, 0, 2, 1]);
        assert_eq!(block.position_count(), 4);
        assert_eq!(block.get_int(0, 0), 30);
        assert_eq!(block.get_int(1, 0), 10);
        assert_eq!(block.get_int(2, 0), 30);
        assert_eq!(block.get_int(3, 0), 20);
    }

    #[test]
    fn unique_ids_counted_once() {
        let block = dict_over(vec![10, 20, 30], vec![2, 0, 2, 1]);
        assert_eq!(block.unique_ids(), 3);
        assert!(block.is_compact());
        // 3 unique 5-byte entries plus 4 ids.
        assert_eq!(block.size_in_bytes(), 3 * 5 + 4 * 4);
    }

    #[test]
    fn compact_drops_unreferenced_entries() {
        let block = dict_over(vec![10, 20, 30, 40], vec![3, 1, 3]);
        assert!(!block.is_compact());
        let compacted = block.compact();
        assert_eq!(compacted.dictionary().position_count(), 2);
        assert_eq!(compacted.get_int(0, 0), 40);
        assert_eq!(compacted.get_int(1, 0), 20);
        assert_eq!(compacted.get_int(2, 0), 40);
        // First-reference order: 40 then 20.
        assert_eq!(compacted.ids().as_slice(), &[0, 1, 0]);
    }

    #[test]
    fn nested_dictionary_flattens() {
        let inner: BlockRef = Arc::new(dict_over(vec![10, 20, 30], vec![2, 1, 0]));
        let outer =
            DictionaryBlock::try_new(inner, Buffer::from_vec(vec![0, 0, 2])).basalt_unwrap();
        assert!(
            outer
                .dictionary()
                .as_any()
                .downcast_ref::<IntBlock>()
                .is_some()
        );
        assert_eq!(outer.get_int(0, 0), 30);
        assert_eq!(outer.get_int(2, 0), 10);
    }

    #[test]
    fn region_shares_ids_copy_compacts() {
        let block = dict_over(vec![10, 20, 30], vec![0, 1, 1, 2]);
        let region = block.get_region(1, 2);
        let region = region.as_any().downcast_ref::<DictionaryBlock>().unwrap();
        assert!(region.ids().same_backing(block.ids()));
        assert_eq!(region.get_int(0, 0), 20);

        let copy = block.copy_region(1, 2);
        let copy = copy.as_any().downcast_ref::<DictionaryBlock>().unwrap();
        assert_eq!(copy.dictionary().position_count(), 1);
        assert_eq!(copy.get_int(0, 0), 20);
        assert_eq!(copy.get_int(1, 0), 20);
    }

    #[test]
    fn sequential_compact_copy_delegates_to_dictionary() {
        let block = dict_over(vec![10, 20, 30, 40], vec![0, 1, 2, 3]);
        let copy = block.copy_region(0, 4);
        assert!(copy.as_any().downcast_ref::<IntBlock>().is_some());
        assert_eq!(copy.position_count(), 4);
        assert_eq!(copy.get_int(2, 0), 30);
    }

    #[test]
    fn single_position_copy_delegates_to_dictionary() {
        let block = dict_over(vec![10, 20, 30], vec![2, 0, 2, 1]);
        let copy = block.copy_region(2, 1);
        assert!(copy.as_any().downcast_ref::<IntBlock>().is_some());
        assert_eq!(copy.get_int(0, 0), 30);

        let empty = block.copy_region(4, 0);
        assert_eq!(empty.position_count(), 0);
    }

    #[test]
    fn out_of_range_id_rejected() {
        let dictionary: BlockRef = Arc::new(IntBlock::from_values(vec![10]));
        assert!(DictionaryBlock::try_new(dictionary, Buffer::from_vec(vec![0, 1])).is_err());
    }

    #[test]
    fn source_ids_are_distinct() {
        let a = dict_over(vec![1], vec![0]);
        let b = dict_over(vec![1], vec![0]);
        assert_ne!(a.source_id(), b.source_id());
    }
}
