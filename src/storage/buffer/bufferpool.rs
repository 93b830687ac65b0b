use std::collections::{HashMap, VecDeque};
use std::sync::mpsc;
use std::sync::Arc;

use log::debug;
use parking_lot::{Mutex, RwLock};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::storage::buffer::page_guard::{BasicPageGuard, ReadPageGuard, WritePageGuard};
use crate::storage::buffer::replacer::{AccessType, LRUKReplacer, Replacer};
use crate::storage::disk::scheduler::{DiskData, DiskRequest, DiskScheduler};
use crate::storage::disk::{new_disk_manager, DiskManager};
use crate::storage::page::{FrameId, Page, PageId, PageMeta, INVALID_PAGE_ID, PAGE_SIZE};

/// Page table, free list and page id allocator, guarded together by the
/// pool's global lock. A page id maps to a frame iff the page is
/// resident; a frame is on the free list iff it holds no mapping.
struct PoolInner {
    page_table: HashMap<PageId, FrameId>,
    free_list: VecDeque<FrameId>,
    next_page_id: PageId,
}

/// The buffer pool is responsible for moving physical pages back and
/// forth from main memory to disk. It allows the system to operate on
/// databases larger than the memory available to it.
///
/// The pool's operations are transparent to the rest of the system: a
/// caller asks for a page by its id and does not know whether the page
/// was already in memory or had to be fetched from disk.
///
/// Locking is two-tier. The global reader-writer lock over `PoolInner`
/// is taken shared by resident-page fast paths and exclusively by any
/// path that installs or removes a mapping; each frame additionally has
/// its own metadata lock and data latch (see `Page`). Paths that pin or
/// unpin acquire the pool lock, then the frame's metadata lock, then
/// update the replacer, and only then release the pool lock, so an
/// eviction (which needs the exclusive pool lock) can never select a
/// frame whose pin is mid-transition.
pub struct BufferPoolManager {
    pool_size: usize,
    pages: Vec<Arc<Page>>,
    inner: RwLock<PoolInner>,
    replacer: Box<dyn Replacer>,
    disk_scheduler: DiskScheduler,
}

impl BufferPoolManager {
    pub fn new(
        pool_size: usize,
        replacer_k: usize,
        disk_manager: Arc<dyn DiskManager>,
    ) -> Result<BufferPoolManager> {
        let mut pages = Vec::with_capacity(pool_size);
        let mut free_list = VecDeque::with_capacity(pool_size);
        for frame_id in 0..pool_size {
            pages.push(Arc::new(Page::new()));
            // initially, every frame is free
            free_list.push_back(frame_id);
        }
        Ok(BufferPoolManager {
            pool_size,
            pages,
            inner: RwLock::new(PoolInner {
                page_table: HashMap::new(),
                free_list,
                next_page_id: 0,
            }),
            replacer: Box::new(LRUKReplacer::new(pool_size, replacer_k)),
            disk_scheduler: DiskScheduler::new(disk_manager)?,
        })
    }

    pub fn from_config(cfg: &Config) -> Result<BufferPoolManager> {
        let disk_manager = new_disk_manager(&cfg.disk_type)?;
        BufferPoolManager::new(cfg.buffer_pool_size, cfg.replacer_k, disk_manager)
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Create a new zero-filled page in the buffer pool, pinned once.
    /// Returns None if every frame is in use and none is evictable.
    pub fn new_page(&self) -> Result<Option<(PageId, Arc<Page>)>> {
        let mut inner = self.inner.write();
        let frame_id = match self.find_free_frame(&mut inner)? {
            Some(frame_id) => frame_id,
            None => return Ok(None),
        };
        let page_id = inner.next_page_id;
        inner.next_page_id += 1;
        inner.page_table.insert(page_id, frame_id);

        let page = &self.pages[frame_id];
        let mut meta = page.meta();
        self.replacer.record_access(frame_id, AccessType::Unknown)?;
        self.replacer.set_evictable(frame_id, false)?;
        drop(inner);

        meta.id = page_id;
        meta.is_dirty = false;
        meta.pin_count = 1;
        Ok(Some((page_id, Arc::clone(page))))
    }

    /// Fetch the requested page, pinning it. A resident page is returned
    /// under the shared pool lock; a miss acquires the exclusive lock,
    /// re-checks the table, claims a frame and blocks on the disk read.
    /// Returns None if the page is not resident and every frame is
    /// pinned.
    pub fn fetch_page(&self, page_id: PageId) -> Result<Option<Arc<Page>>> {
        self.fetch_page_with(page_id, AccessType::Unknown)
    }

    /// `fetch_page` with a caller-provided hint describing the kind of
    /// access, recorded with the frame's history for the replacement
    /// policy.
    pub fn fetch_page_with(
        &self,
        page_id: PageId,
        access_type: AccessType,
    ) -> Result<Option<Arc<Page>>> {
        let inner = self.inner.read();
        if let Some(&frame_id) = inner.page_table.get(&page_id) {
            let page = &self.pages[frame_id];
            let mut meta = page.meta();
            self.replacer.record_access(frame_id, access_type)?;
            self.replacer.set_evictable(frame_id, false)?;
            drop(inner);
            meta.pin_count += 1;
            return Ok(Some(Arc::clone(page)));
        }
        drop(inner);

        let mut inner = self.inner.write();
        // double-checked: another thread may have brought the page in
        // while we upgraded to the exclusive lock
        if let Some(&frame_id) = inner.page_table.get(&page_id) {
            let page = &self.pages[frame_id];
            let mut meta = page.meta();
            self.replacer.record_access(frame_id, access_type)?;
            self.replacer.set_evictable(frame_id, false)?;
            drop(inner);
            meta.pin_count += 1;
            return Ok(Some(Arc::clone(page)));
        }

        let frame_id = match self.find_free_frame(&mut inner)? {
            Some(frame_id) => frame_id,
            None => return Ok(None),
        };
        inner.page_table.insert(page_id, frame_id);

        let page = &self.pages[frame_id];
        let mut meta = page.meta();

        let buf = Arc::new(Mutex::new(vec![0u8; PAGE_SIZE]));
        let (done, wait) = mpsc::channel();
        self.disk_scheduler.schedule(DiskRequest {
            data: DiskData::Read(Arc::clone(&buf)),
            page_id,
            done,
        });
        if !wait.recv()? {
            inner.page_table.remove(&page_id);
            inner.free_list.push_front(frame_id);
            return Err(Error::internal(format!("disk read of page {} failed", page_id)));
        }
        page.write().copy_from_slice(&buf.lock());

        self.replacer.record_access(frame_id, access_type)?;
        self.replacer.set_evictable(frame_id, false)?;
        drop(inner);

        meta.id = page_id;
        meta.is_dirty = false;
        meta.pin_count = 1;
        Ok(Some(Arc::clone(page)))
    }

    /// Unpin a page, recording whether the caller mutated it. Returns
    /// false if the page is not resident or was not pinned; the last
    /// unpin makes the frame evictable.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> Result<bool> {
        let inner = self.inner.read();
        let frame_id = match inner.page_table.get(&page_id) {
            Some(&frame_id) => frame_id,
            None => return Ok(false),
        };
        // the pool lock stays held: set_evictable below must not race
        // with an eviction picking this frame
        let mut meta = self.pages[frame_id].meta();
        if meta.pin_count == 0 {
            return Ok(false);
        }
        meta.is_dirty = meta.is_dirty || is_dirty;
        meta.pin_count -= 1;
        if meta.pin_count == 0 {
            self.replacer.set_evictable(frame_id, true)?;
        }
        Ok(true)
    }

    /// Write a page's image to disk regardless of its dirty flag, then
    /// clear the flag. Returns false if the page is not resident.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        let inner = self.inner.read();
        let frame_id = match inner.page_table.get(&page_id) {
            Some(&frame_id) => frame_id,
            None => return Ok(false),
        };
        let page = &self.pages[frame_id];
        let mut meta = page.meta();
        drop(inner);
        self.flush_frame(&mut meta, page)?;
        Ok(true)
    }

    /// Flush every resident frame. Writes are scheduled first so the
    /// shards can run them in parallel, then all completions are
    /// awaited. Assumes no concurrent mutators.
    pub fn flush_all_pages(&self) -> Result<()> {
        let mut metas: Vec<_> = self.pages.iter().map(|page| page.meta()).collect();
        let mut waits = Vec::new();
        for (frame_id, meta) in metas.iter().enumerate() {
            if meta.id == INVALID_PAGE_ID {
                continue;
            }
            let (done, wait) = mpsc::channel();
            self.disk_scheduler.schedule(DiskRequest {
                data: DiskData::Write(self.pages[frame_id].read().to_vec()),
                page_id: meta.id,
                done,
            });
            waits.push((meta.id, wait));
        }
        for (page_id, wait) in waits {
            if !wait.recv()? {
                return Err(Error::internal(format!("disk write of page {} failed", page_id)));
            }
        }
        for meta in metas.iter_mut() {
            if meta.id != INVALID_PAGE_ID {
                meta.is_dirty = false;
            }
        }
        Ok(())
    }

    /// Drop a page from the buffer pool, freeing its frame. Returns true
    /// if the page was not resident to begin with, false if it is still
    /// pinned.
    pub fn delete_page(&self, page_id: PageId) -> Result<bool> {
        let inner = self.inner.read();
        let frame_id = match inner.page_table.get(&page_id) {
            Some(&frame_id) => frame_id,
            None => return Ok(true),
        };
        drop(inner);

        let mut inner = self.inner.write();
        let page = &self.pages[frame_id];
        let mut meta = page.meta();
        // double-checked: the frame may have been recycled while we
        // upgraded to the exclusive lock
        if meta.id != page_id {
            return Ok(true);
        }
        if meta.pin_count > 0 {
            return Ok(false);
        }
        inner.page_table.remove(&page_id);
        self.replacer.remove(frame_id)?;
        inner.free_list.push_back(frame_id);
        meta.clear();
        page.write().fill(0);
        Ok(true)
    }

    /// Fetch a page wrapped in a guard that unpins on drop and holds no
    /// data latch.
    pub fn fetch_page_basic(&self, page_id: PageId) -> Result<Option<BasicPageGuard<'_>>> {
        Ok(self
            .fetch_page(page_id)?
            .map(|page| BasicPageGuard::new(self, page_id, page)))
    }

    /// Fetch a page wrapped in a guard holding its data latch shared.
    pub fn fetch_page_read(&self, page_id: PageId) -> Result<Option<ReadPageGuard<'_>>> {
        Ok(self
            .fetch_page(page_id)?
            .map(|page| ReadPageGuard::new(self, page_id, &page)))
    }

    /// Fetch a page wrapped in a guard holding its data latch
    /// exclusively.
    pub fn fetch_page_write(&self, page_id: PageId) -> Result<Option<WritePageGuard<'_>>> {
        Ok(self
            .fetch_page(page_id)?
            .map(|page| WritePageGuard::new(self, page_id, &page)))
    }

    /// Create a new page wrapped in a guard that unpins on drop.
    pub fn new_page_guarded(&self) -> Result<Option<BasicPageGuard<'_>>> {
        Ok(self
            .new_page()?
            .map(|(page_id, page)| BasicPageGuard::new(self, page_id, page)))
    }

    /// Produce a frame holding no mapping, preferring the free list and
    /// falling back to eviction; dirty victims are flushed first. The
    /// caller must hold the exclusive pool lock. The returned frame has
    /// cleared metadata and a zeroed image.
    fn find_free_frame(&self, inner: &mut PoolInner) -> Result<Option<FrameId>> {
        if let Some(frame_id) = inner.free_list.pop_front() {
            return Ok(Some(frame_id));
        }
        let frame_id = match self.replacer.evict() {
            Some(frame_id) => frame_id,
            None => return Ok(None),
        };
        let page = &self.pages[frame_id];
        let mut meta = page.meta();
        debug!("evicting page {} from frame {}", meta.id, frame_id);
        if meta.is_dirty {
            self.flush_frame(&mut meta, page)?;
        }
        inner.page_table.remove(&meta.id);
        meta.clear();
        page.write().fill(0);
        Ok(Some(frame_id))
    }

    /// Write a frame's current image out and clear its dirty bit. The
    /// caller holds the frame's metadata lock across the scheduling and
    /// the wait, so the frame cannot be repinned or repurposed
    /// mid-flight.
    fn flush_frame(&self, meta: &mut PageMeta, page: &Page) -> Result<()> {
        let (done, wait) = mpsc::channel();
        self.disk_scheduler.schedule(DiskRequest {
            data: DiskData::Write(page.read().to_vec()),
            page_id: meta.id,
            done,
        });
        if !wait.recv()? {
            return Err(Error::internal(format!("disk write of page {} failed", meta.id)));
        }
        meta.is_dirty = false;
        Ok(())
    }
}
