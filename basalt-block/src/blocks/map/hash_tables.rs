use std::sync::OnceLock;

use basalt_buffer::Buffer;
use basalt_error::{BasaltResult, basalt_bail};

use crate::block::{Block, BlockRef};
use crate::compact::compact_buffer;

/// Hash table slots per map entry. Load factor is therefore at most 1/2,
/// which guarantees an empty slot terminates every probe sequence.
pub const MAP_HASH_MULTIPLIER: usize = 2;

/// Slot value marking an empty hash table position.
const EMPTY_SLOT: i32 = -1;

/// Lazily built open-addressing key index shared by every view of one map
/// entry storage.
///
/// The index is a single `i32` buffer parallel to the raw key entries, scaled
/// by [`MAP_HASH_MULTIPLIER`]: the map whose entries are `[start, end)` owns
/// slots `[start * 2, end * 2)`. Slots hold map-relative entry indices, so a
/// built index stays valid across region views and compact copies of the
/// entry storage.
#[derive(Debug)]
pub struct MapHashTables {
    raw_keys: BlockRef,
    offsets: Buffer<i32>,
    tables: OnceLock<Buffer<i32>>,
}

impl MapHashTables {
    pub(crate) fn new(raw_keys: BlockRef, offsets: Buffer<i32>) -> Self {
        Self {
            raw_keys,
            offsets,
            tables: OnceLock::new(),
        }
    }

    /// Whether the index has been built yet.
    pub fn is_built(&self) -> bool {
        self.tables.get().is_some()
    }

    /// The index, building it on first use. Duplicate keys within a map keep
    /// the first occurrence; later duplicates are simply never inserted.
    pub fn get_or_build(&self) -> &Buffer<i32> {
        self.tables.get_or_init(|| {
            let mut tables =
                vec![EMPTY_SLOT; self.raw_keys.position_count() * MAP_HASH_MULTIPLIER];
            for w in self.offsets.as_slice().windows(2) {
                let (start, end) = (w[0] as usize, w[1] as usize);
                fill_window(&mut tables, &*self.raw_keys, start, end);
            }
            Buffer::from_vec(tables)
        })
    }

    pub fn retained_size_in_bytes(&self) -> usize {
        size_of::<Self>()
            + self.offsets.retained_size_in_bytes()
            + self.tables.get().map_or(0, Buffer::retained_size_in_bytes)
    }

    /// Index for a compact copy of entries `[start, start + count)`, carrying
    /// over the built slots when they exist. The copy's maps tile the same
    /// relative windows, so the slot values transfer unchanged.
    pub(crate) fn copy_range(
        &self,
        start: usize,
        count: usize,
        raw_keys: BlockRef,
        offsets: Buffer<i32>,
    ) -> Self {
        let copied = Self::new(raw_keys, offsets);
        if let Some(tables) = self.tables.get() {
            let window = compact_buffer(
                tables,
                start * MAP_HASH_MULTIPLIER,
                count * MAP_HASH_MULTIPLIER,
            );
            // The copy is fresh, so the lock cannot already be set.
            let _ = copied.tables.set(window);
        }
        copied
    }
}

/// Insert the entries of the map `[start, end)` into its table window.
fn fill_window(tables: &mut [i32], raw_keys: &dyn Block, start: usize, end: usize) {
    let size = (end - start) * MAP_HASH_MULTIPLIER;
    for entry in 0..end - start {
        let mut slot = initial_slot(raw_keys.hash_position(start + entry), size);
        loop {
            let stored = tables[start * MAP_HASH_MULTIPLIER + slot];
            if stored == EMPTY_SLOT {
                tables[start * MAP_HASH_MULTIPLIER + slot] = entry as i32;
                break;
            }
            if raw_keys.positions_equal(start + stored as usize, raw_keys, start + entry) {
                // First occurrence wins; drop the duplicate.
                break;
            }
            slot = (slot + 1) % size;
        }
    }
}

/// Probe the window of the map `[start, start + count)` for `key` at
/// `key_position`, returning the map-relative entry index.
pub(crate) fn seek_window(
    tables: &[i32],
    raw_keys: &dyn Block,
    start: usize,
    count: usize,
    key: &dyn Block,
    key_position: usize,
) -> Option<usize> {
    if count == 0 {
        return None;
    }
    let size = count * MAP_HASH_MULTIPLIER;
    let mut slot = initial_slot(key.hash_position(key_position), size);
    loop {
        let stored = tables[start * MAP_HASH_MULTIPLIER + slot];
        if stored == EMPTY_SLOT {
            return None;
        }
        if raw_keys.positions_equal(start + stored as usize, key, key_position) {
            return Some(stored as usize);
        }
        slot = (slot + 1) % size;
    }
}

/// Scan every map for duplicate keys, for builders in strict mode.
pub(crate) fn check_no_duplicate_keys(
    raw_keys: &dyn Block,
    offsets: &[i32],
) -> BasaltResult<()> {
    for w in offsets.windows(2) {
        let (start, end) = (w[0] as usize, w[1] as usize);
        let size = (end - start) * MAP_HASH_MULTIPLIER;
        let mut window = vec![EMPTY_SLOT; size];
        for entry in 0..end - start {
            let mut slot = initial_slot(raw_keys.hash_position(start + entry), size);
            loop {
                let stored = window[slot];
                if stored == EMPTY_SLOT {
                    window[slot] = entry as i32;
                    break;
                }
                if raw_keys.positions_equal(start + stored as usize, raw_keys, start + entry) {
                    basalt_bail!(
                        DataIntegrity: "duplicate map key at entries {} and {}",
                        stored,
                        entry
                    );
                }
                slot = (slot + 1) % size;
            }
        }
    }
    Ok(())
}

/// Multiplicative 64-to-32-bit mix of `hash`, scaled to `[0, size)`.
#[inline]
fn initial_slot(hash: u64, size: usize) -> usize {
    ((((hash.wrapping_mul(0x9E37_79B9_7F4A_7C15)) >> 32) * size as u64) >> 32) as usize
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use basalt_buffer::Buffer;

    use super::{MapHashTables, check_no_duplicate_keys, seek_window};
    use crate::BlockRef;
    use crate::blocks::LongBlock;

    fn keys(values: Vec<i64>) -> BlockRef {
        Arc::new(LongBlock::from_values(values))
    }

    #[test]
    fn built_once_and_seekable() {
        let raw_keys = keys(vec![7, 8, 9]);
        let tables = MapHashTables::new(raw_keys.clone(), Buffer::from_vec(vec![0, 2, 3]));
        assert!(!tables.is_built());
        let built = tables.get_or_build().clone();
        assert!(tables.is_built());
        assert_eq!(built.len(), 6);

        let probe = keys(vec![8]);
        assert_eq!(
            seek_window(built.as_slice(), &*raw_keys, 0, 2, &*probe, 0),
            Some(1)
        );
        assert_eq!(
            seek_window(built.as_slice(), &*raw_keys, 2, 1, &*probe, 0),
            None
        );
    }

    #[test]
    fn first_duplicate_wins_on_build() {
        let raw_keys = keys(vec![5, 5]);
        let tables = MapHashTables::new(raw_keys.clone(), Buffer::from_vec(vec![0, 2]));
        let built = tables.get_or_build().clone();
        let probe = keys(vec![5]);
        assert_eq!(
            seek_window(built.as_slice(), &*raw_keys, 0, 2, &*probe, 0),
            Some(0)
        );
    }

    #[test]
    fn duplicate_detection_reports() {
        let raw_keys = keys(vec![5, 6, 5]);
        let err = check_no_duplicate_keys(&*raw_keys, &[0, 3]).unwrap_err();
        assert!(err.to_string().contains("duplicate map key"));
        assert!(check_no_duplicate_keys(&*raw_keys, &[0, 2]).is_ok());
    }
}
