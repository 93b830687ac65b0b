use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Page identifier, allocated monotonically from zero by the buffer pool.
pub type PageId = u32;

/// Index of a frame slot in the buffer pool, in `[0, pool_size)`.
pub type FrameId = usize;

/// Size of a data page in bytes.
pub const PAGE_SIZE: usize = 4096;

/// Page id held by a frame with no valid page in it.
pub const INVALID_PAGE_ID: PageId = PageId::MAX;

/// Fixed-size page image.
pub type PageBuf = [u8; PAGE_SIZE];

/// In-memory bookkeeping for one frame: which page occupies it, how many
/// clients hold it pinned, and whether its image diverged from disk.
pub struct PageMeta {
    pub id: PageId,
    pub pin_count: u32,
    pub is_dirty: bool,
}

impl PageMeta {
    fn new() -> PageMeta {
        PageMeta { id: INVALID_PAGE_ID, pin_count: 0, is_dirty: false }
    }

    /// Forget the current occupant, leaving the slot as if freshly built.
    pub fn clear(&mut self) {
        self.id = INVALID_PAGE_ID;
        self.pin_count = 0;
        self.is_dirty = false;
    }
}

/// A buffer pool frame: a page image plus its metadata, each behind its
/// own lock. The metadata mutex serializes pin and dirty transitions; the
/// data latch is what page guards hold, shared for readers and exclusive
/// for writers. Paths that take both must take the metadata lock first.
pub struct Page {
    meta: Mutex<PageMeta>,
    data: Arc<RwLock<PageBuf>>,
}

impl Page {
    pub fn new() -> Page {
        Page {
            meta: Mutex::new(PageMeta::new()),
            data: Arc::new(RwLock::new([0; PAGE_SIZE])),
        }
    }

    pub fn meta(&self) -> MutexGuard<'_, PageMeta> {
        self.meta.lock()
    }

    pub fn read(&self) -> RwLockReadGuard<'_, PageBuf> {
        self.data.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, PageBuf> {
        self.data.write()
    }

    /// Shared handle to the data latch, for guards that must keep the
    /// latch held beyond a borrow of the page itself.
    pub fn data(&self) -> &Arc<RwLock<PageBuf>> {
        &self.data
    }
}

impl Default for Page {
    fn default() -> Self {
        Page::new()
    }
}
