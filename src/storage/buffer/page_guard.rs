use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use log::warn;
use parking_lot::{
    ArcRwLockReadGuard, ArcRwLockWriteGuard, RawRwLock, RwLockReadGuard, RwLockWriteGuard,
};

use crate::storage::buffer::bufferpool::BufferPoolManager;
use crate::storage::page::{Page, PageBuf, PageId};

/// A pinned page holding no data latch. Callers lock explicitly through
/// `read`/`write`; taking the write latch marks the guard mutated, so
/// the drop-time unpin reports the page dirty.
///
/// Every guard releases its pin exactly once, when dropped.
pub struct BasicPageGuard<'a> {
    bpm: &'a BufferPoolManager,
    page: Arc<Page>,
    page_id: PageId,
    is_dirty: bool,
}

impl<'a> BasicPageGuard<'a> {
    pub(crate) fn new(bpm: &'a BufferPoolManager, page_id: PageId, page: Arc<Page>) -> Self {
        BasicPageGuard { bpm, page, page_id, is_dirty: false }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn read(&self) -> RwLockReadGuard<'_, PageBuf> {
        self.page.read()
    }

    pub fn write(&mut self) -> RwLockWriteGuard<'_, PageBuf> {
        self.is_dirty = true;
        self.page.write()
    }
}

impl Drop for BasicPageGuard<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.bpm.unpin_page(self.page_id, self.is_dirty) {
            warn!("unpin of page {} failed: {}", self.page_id, err);
        }
    }
}

/// A pinned page holding its data latch shared for the guard's
/// lifetime. Dereferences to the page image; any number of read guards
/// on one page may coexist.
pub struct ReadPageGuard<'a> {
    bpm: &'a BufferPoolManager,
    page_id: PageId,
    data: Option<ArcRwLockReadGuard<RawRwLock, PageBuf>>,
}

impl<'a> ReadPageGuard<'a> {
    pub(crate) fn new(bpm: &'a BufferPoolManager, page_id: PageId, page: &Arc<Page>) -> Self {
        let data = page.data().read_arc();
        ReadPageGuard { bpm, page_id, data: Some(data) }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }
}

impl Deref for ReadPageGuard<'_> {
    type Target = PageBuf;

    fn deref(&self) -> &PageBuf {
        self.data.as_ref().expect("data latch held until drop")
    }
}

impl Drop for ReadPageGuard<'_> {
    fn drop(&mut self) {
        // release the data latch before unpinning; unpinning takes the
        // frame's metadata lock
        drop(self.data.take());
        if let Err(err) = self.bpm.unpin_page(self.page_id, false) {
            warn!("unpin of page {} failed: {}", self.page_id, err);
        }
    }
}

/// A pinned page holding its data latch exclusively. A write guard is
/// assumed to have mutated the page: dropping it unpins dirty.
pub struct WritePageGuard<'a> {
    bpm: &'a BufferPoolManager,
    page_id: PageId,
    data: Option<ArcRwLockWriteGuard<RawRwLock, PageBuf>>,
}

impl<'a> WritePageGuard<'a> {
    pub(crate) fn new(bpm: &'a BufferPoolManager, page_id: PageId, page: &Arc<Page>) -> Self {
        let data = page.data().write_arc();
        WritePageGuard { bpm, page_id, data: Some(data) }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }
}

impl Deref for WritePageGuard<'_> {
    type Target = PageBuf;

    fn deref(&self) -> &PageBuf {
        self.data.as_ref().expect("data latch held until drop")
    }
}

impl DerefMut for WritePageGuard<'_> {
    fn deref_mut(&mut self) -> &mut PageBuf {
        self.data.as_mut().expect("data latch held until drop")
    }
}

impl Drop for WritePageGuard<'_> {
    fn drop(&mut self) {
        drop(self.data.take());
        if let Err(err) = self.bpm.unpin_page(self.page_id, true) {
            warn!("unpin of page {} failed: {}", self.page_id, err);
        }
    }
}
