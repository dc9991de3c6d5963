use std::fmt::Debug;
use std::sync::{Arc, Mutex, OnceLock};

use basalt_buffer::Buffer;
use basalt_error::{BasaltExpect, basalt_panic};
use basalt_i128::I128;
use log::trace;

use crate::block::{Block, BlockRef};
use crate::checks::{check_valid_positions, check_valid_region};

/// Produces the block a [`LazyBlock`] stands in for. Invoked at most once.
pub trait LazyBlockLoader: Debug + Send + Sync {
    fn load(&self) -> BlockRef;
}

/// Callback invoked with the materialized block when a lazy block loads.
pub type LoadListener = Arc<dyn Fn(&BlockRef) + Send + Sync>;

struct LazyData {
    position_count: usize,
    loader: Mutex<Option<Box<dyn LazyBlockLoader>>>,
    block: OnceLock<BlockRef>,
    listeners: Mutex<Vec<LoadListener>>,
}

// Listener closures are opaque; report only the structural state.
impl Debug for LazyData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LazyData")
            .field("position_count", &self.position_count)
            .field("loaded", &self.block.get().is_some())
            .finish_non_exhaustive()
    }
}

impl LazyData {
    /// Materialize (at most once) and return the delegate.
    fn load(&self) -> &BlockRef {
        let block = self.block.get_or_init(|| {
            let loader = self
                .loader
                .lock()
                .basalt_expect("poisoned lock")
                .take()
                .basalt_expect("lazy loader already consumed");
            trace!("materializing lazy block of {} positions", self.position_count);
            loader.load()
        });
        if block.position_count() != self.position_count {
            basalt_panic!(
                DataIntegrity: "lazy loader produced {} positions, expected {}",
                block.position_count(),
                self.position_count
            );
        }
        let listeners = {
            let mut listeners = self.listeners.lock().basalt_expect("poisoned lock");
            std::mem::take(&mut *listeners)
        };
        for listener in &listeners {
            listener(block);
        }
        // A freshly loaded block may itself contain lazy descendants; they
        // inherit the listeners.
        if !listeners.is_empty() {
            attach_load_listeners(block, &listeners);
        }
        block
    }
}

/// A block whose content is produced on first touch.
///
/// All value accessors and size queries force materialization; only
/// `position_count`, `is_loaded`, `get_region`, and `copy_positions` are
/// answerable without it. A region or positional copy of an unloaded lazy
/// block is itself lazy, loading the parent on first touch and carving out
/// the requested positions.
#[derive(Clone, Debug)]
pub struct LazyBlock {
    data: Arc<LazyData>,
}

impl LazyBlock {
    pub fn new(position_count: usize, loader: Box<dyn LazyBlockLoader>) -> Self {
        Self {
            data: Arc::new(LazyData {
                position_count,
                loader: Mutex::new(Some(loader)),
                block: OnceLock::new(),
                listeners: Mutex::new(Vec::new()),
            }),
        }
    }

    /// The materialized delegate, loading it if needed.
    pub fn block(&self) -> &BlockRef {
        self.data.load()
    }

    fn add_listener(&self, listener: LoadListener) {
        trace!(
            "attaching load listener to lazy block of {} positions",
            self.data.position_count
        );
        if let Some(block) = self.data.block.get() {
            // Already loaded: notify now and fall through to any lazy
            // descendants of the result.
            listener(block);
            attach_load_listeners(block, std::slice::from_ref(&listener));
            return;
        }
        self.data
            .listeners
            .lock()
            .basalt_expect("poisoned lock")
            .push(listener);
    }
}

/// Register `listeners` on every lazy descendant of `block`, to fire when it
/// materializes.
pub fn attach_load_listeners(block: &BlockRef, listeners: &[LoadListener]) {
    if let Some(lazy) = block.as_any().downcast_ref::<LazyBlock>() {
        for listener in listeners {
            lazy.add_listener(listener.clone());
        }
        return;
    }
    for child in block.children() {
        attach_load_listeners(&child, listeners);
    }
}

/// Loader for a lazy region of a lazy parent.
#[derive(Debug)]
struct RegionLoader {
    parent: Arc<LazyData>,
    position: usize,
    length: usize,
}

impl LazyBlockLoader for RegionLoader {
    fn load(&self) -> BlockRef {
        self.parent.load().get_region(self.position, self.length)
    }
}

/// Loader for a lazy positional copy of a lazy parent.
#[derive(Debug)]
struct PositionsLoader {
    parent: Arc<LazyData>,
    positions: Vec<usize>,
}

impl LazyBlockLoader for PositionsLoader {
    fn load(&self) -> BlockRef {
        self.parent.load().copy_positions(&self.positions)
    }
}

impl Block for LazyBlock {
    fn block_name(&self) -> &'static str {
        "LazyBlock"
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn position_count(&self) -> usize {
        self.data.position_count
    }

    fn size_in_bytes(&self) -> usize {
        self.block().size_in_bytes()
    }

    fn retained_size_in_bytes(&self) -> usize {
        size_of::<Self>()
            + self
                .data
                .block
                .get()
                .map_or(0, |block| block.retained_size_in_bytes())
    }

    fn logical_size_in_bytes(&self) -> usize {
        self.block().logical_size_in_bytes()
    }

    fn region_size_in_bytes(&self, position: usize, length: usize) -> usize {
        self.block().region_size_in_bytes(position, length)
    }

    fn positions_size_in_bytes(&self, positions: &[bool], selected_count: usize) -> usize {
        self.block().positions_size_in_bytes(positions, selected_count)
    }

    fn estimated_data_size_for_stats(&self, position: usize) -> usize {
        self.block().estimated_data_size_for_stats(position)
    }

    fn may_have_null(&self) -> bool {
        self.block().may_have_null()
    }

    fn is_null(&self, position: usize) -> bool {
        self.block().is_null(position)
    }

    fn get_byte(&self, position: usize, offset: usize) -> i8 {
        self.block().get_byte(position, offset)
    }

    fn get_short(&self, position: usize, offset: usize) -> i16 {
        self.block().get_short(position, offset)
    }

    fn get_int(&self, position: usize, offset: usize) -> i32 {
        self.block().get_int(position, offset)
    }

    fn get_long(&self, position: usize, offset: usize) -> i64 {
        self.block().get_long(position, offset)
    }

    fn get_int96(&self, position: usize) -> (i64, u32) {
        self.block().get_int96(position)
    }

    fn get_i128(&self, position: usize) -> I128 {
        self.block().get_i128(position)
    }

    fn get_slice(&self, position: usize, offset: usize, length: usize) -> Buffer<u8> {
        self.block().get_slice(position, offset, length)
    }

    fn get_slice_length(&self, position: usize) -> usize {
        self.block().get_slice_length(position)
    }

    fn get_block(&self, position: usize) -> BlockRef {
        self.block().get_block(position)
    }

    fn hash_position(&self, position: usize) -> u64 {
        self.block().hash_position(position)
    }

    fn positions_equal(&self, position: usize, other: &dyn Block, other_position: usize) -> bool {
        self.block().positions_equal(position, other, other_position)
    }

    fn children(&self) -> Vec<BlockRef> {
        match self.data.block.get() {
            Some(block) => vec![block.clone()],
            None => Vec::new(),
        }
    }

    fn get_region(&self, position: usize, length: usize) -> BlockRef {
        check_valid_region(self.data.position_count, position, length);
        if let Some(block) = self.data.block.get() {
            return block.get_region(position, length);
        }
        Arc::new(Self::new(
            length,
            Box::new(RegionLoader {
                parent: self.data.clone(),
                position,
                length,
            }),
        ))
    }

    fn copy_region(&self, position: usize, length: usize) -> BlockRef {
        self.block().copy_region(position, length)
    }

    fn copy_positions(&self, positions: &[usize]) -> BlockRef {
        check_valid_positions(positions, self.data.position_count);
        if let Some(block) = self.data.block.get() {
            return block.copy_positions(positions);
        }
        Arc::new(Self::new(
            positions.len(),
            Box::new(PositionsLoader {
                parent: self.data.clone(),
                positions: positions.to_vec(),
            }),
        ))
    }

    fn get_single_value_block(&self, position: usize) -> BlockRef {
        self.block().get_single_value_block(position)
    }

    fn is_loaded(&self) -> bool {
        self.data
            .block
            .get()
            .is_some_and(|block| block.is_loaded())
    }

    fn loaded_block(self: Arc<Self>) -> BlockRef {
        self.block().clone().loaded_block()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::{LazyBlock, LazyBlockLoader, attach_load_listeners};
    use crate::blocks::IntBlock;
    use crate::{Block, BlockRef};

    #[derive(Debug)]
    struct CountingLoader {
        loads: Arc<AtomicUsize>,
        values: Vec<i32>,
    }

    impl LazyBlockLoader for CountingLoader {
        fn load(&self) -> BlockRef {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Arc::new(IntBlock::from_values(self.values.clone()))
        }
    }

    fn lazy_ints(values: Vec<i32>, loads: Arc<AtomicUsize>) -> LazyBlock {
        LazyBlock::new(values.len(), Box::new(CountingLoader { loads, values }))
    }

    #[test]
    fn loads_once_on_first_touch() {
        let loads = Arc::new(AtomicUsize::new(0));
        let block = lazy_ints(vec![1, 2, 3], loads.clone());
        assert!(!block.is_loaded());
        assert_eq!(block.position_count(), 3);
        assert_eq!(loads.load(Ordering::SeqCst), 0);

        assert_eq!(block.get_int(1, 0), 2);
        assert_eq!(block.get_int(2, 0), 3);
        assert!(block.is_loaded());
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn region_of_unloaded_stays_lazy() {
        let loads = Arc::new(AtomicUsize::new(0));
        let block = lazy_ints(vec![1, 2, 3, 4], loads.clone());
        let region = block.get_region(1, 2);
        assert_eq!(region.position_count(), 2);
        assert_eq!(loads.load(Ordering::SeqCst), 0);

        assert_eq!(region.get_int(0, 0), 2);
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn positions_copy_of_unloaded_stays_lazy() {
        let loads = Arc::new(AtomicUsize::new(0));
        let block = lazy_ints(vec![1, 2, 3, 4], loads.clone());
        let copy = block.copy_positions(&[3, 0, 3]);
        assert_eq!(copy.position_count(), 3);
        assert_eq!(loads.load(Ordering::SeqCst), 0);

        assert_eq!(copy.get_int(0, 0), 4);
        assert_eq!(copy.get_int(1, 0), 1);
        assert_eq!(copy.get_int(2, 0), 4);
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn positions_copy_of_loaded_delegates() {
        let loads = Arc::new(AtomicUsize::new(0));
        let block = lazy_ints(vec![1, 2, 3], loads.clone());
        block.get_int(0, 0);
        let copy = block.copy_positions(&[2, 1]);
        assert!(copy.as_any().downcast_ref::<IntBlock>().is_some());
        assert_eq!(copy.get_int(0, 0), 3);
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn lazy_block_state_is_debuggable() {
        fn assert_debuggable<T: std::fmt::Debug>(_: &T) {}
        let loads = Arc::new(AtomicUsize::new(0));
        let block = lazy_ints(vec![1], loads);
        assert_debuggable(&block);
    }

    #[test]
    fn listeners_fire_on_load() {
        let loads = Arc::new(AtomicUsize::new(0));
        let block: BlockRef = Arc::new(lazy_ints(vec![5], loads));
        let fired = Arc::new(AtomicUsize::new(0));
        let seen = fired.clone();
        attach_load_listeners(
            &block,
            &[Arc::new(move |loaded: &BlockRef| {
                assert_eq!(loaded.position_count(), 1);
                seen.fetch_add(1, Ordering::SeqCst);
            })],
        );
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        block.get_int(0, 0);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn listener_on_loaded_block_fires_immediately() {
        let loads = Arc::new(AtomicUsize::new(0));
        let block: BlockRef = Arc::new(lazy_ints(vec![5], loads));
        block.get_int(0, 0);
        let fired = Arc::new(AtomicUsize::new(0));
        let seen = fired.clone();
        attach_load_listeners(
            &block,
            &[Arc::new(move |_: &BlockRef| {
                seen.fetch_add(1, Ordering::SeqCst);
            })],
        );
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn loaded_block_unwraps_to_delegate() {
        let loads = Arc::new(AtomicUsize::new(0));
        let block = Arc::new(lazy_ints(vec![7, 8], loads));
        let loaded = block.loaded_block();
        assert!(loaded.as_any().downcast_ref::<IntBlock>().is_some());
        assert_eq!(loaded.get_int(1, 0), 8);
    }
}
