//! Byte-budget tracking for page assembly.
//!
//! A caller assembling many columns into one page creates a single
//! [`PageBuilderStatus`] and hands each block builder a
//! [`BlockBuilderStatus`] created from it. Builders report every write's
//! bytes; the page status only *reports* fullness, it never enforces it —
//! stopping is the caller's decision.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Default page budget: 1 MiB.
pub const DEFAULT_MAX_PAGE_SIZE_IN_BYTES: usize = 1024 * 1024;

/// Shared byte budget for one page under assembly.
#[derive(Debug)]
pub struct PageBuilderStatus {
    max_page_size_in_bytes: usize,
    current_size: AtomicUsize,
}

impl Default for PageBuilderStatus {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PAGE_SIZE_IN_BYTES)
    }
}

impl PageBuilderStatus {
    pub fn new(max_page_size_in_bytes: usize) -> Self {
        Self {
            max_page_size_in_bytes,
            current_size: AtomicUsize::new(0),
        }
    }

    /// A per-builder reporter feeding this page.
    pub fn create_block_builder_status(self: &Arc<Self>) -> BlockBuilderStatus {
        BlockBuilderStatus {
            page_status: Arc::clone(self),
            bytes_reported: 0,
        }
    }

    pub fn max_page_size_in_bytes(&self) -> usize {
        self.max_page_size_in_bytes
    }

    pub fn size_in_bytes(&self) -> usize {
        self.current_size.load(Ordering::Relaxed)
    }

    pub fn is_full(&self) -> bool {
        self.size_in_bytes() >= self.max_page_size_in_bytes
    }

    fn add_bytes(&self, bytes: usize) {
        self.current_size.fetch_add(bytes, Ordering::Relaxed);
    }
}

/// One builder's reporter into a [`PageBuilderStatus`].
#[derive(Debug)]
pub struct BlockBuilderStatus {
    page_status: Arc<PageBuilderStatus>,
    bytes_reported: usize,
}

impl BlockBuilderStatus {
    /// Report `bytes` written by the owning builder.
    pub fn add_bytes(&mut self, bytes: usize) {
        self.bytes_reported += bytes;
        self.page_status.add_bytes(bytes);
    }

    /// Bytes this builder has reported so far.
    pub fn bytes_reported(&self) -> usize {
        self.bytes_reported
    }

    /// A sibling reporter into the same page, for child builders.
    pub fn sibling(&self) -> BlockBuilderStatus {
        self.page_status.create_block_builder_status()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::status::PageBuilderStatus;

    #[test]
    fn builders_report_into_one_page() {
        let page = Arc::new(PageBuilderStatus::new(100));
        let mut a = page.create_block_builder_status();
        let mut b = a.sibling();

        a.add_bytes(60);
        assert!(!page.is_full());
        b.add_bytes(41);
        assert!(page.is_full());
        assert_eq!(page.size_in_bytes(), 101);
        assert_eq!(a.bytes_reported(), 60);
        assert_eq!(b.bytes_reported(), 41);
    }
}
