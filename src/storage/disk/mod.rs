use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::storage::page::PageId;

pub mod channel;
pub mod file;
pub mod memory;
pub mod scheduler;

/// A disk manager moves fixed-size pages between memory and a backing
/// medium, addressed by page id. Reads and writes are blocking and
/// operate on exactly `PAGE_SIZE` bytes.
///
/// The trait is `trait object` compatible and implementations
/// synchronize internally, so the scheduler's worker threads can share
/// one manager behind an `Arc`.
pub trait DiskManager: Send + Sync {
    /// Read the given page into `buf`. A page that was never written
    /// reads back as zeroes.
    fn read_page(&self, page_id: PageId, buf: &mut [u8]) -> Result<()>;

    /// Write the full page image in `buf` to the given page.
    fn write_page(&self, page_id: PageId, buf: &[u8]) -> Result<()>;
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiskType {
    Memory,
    File(PathBuf),
}

pub fn new_disk_manager(typ: &DiskType) -> Result<Arc<dyn DiskManager>> {
    match typ {
        DiskType::Memory => Ok(Arc::new(memory::Memory::new())),
        DiskType::File(path) => Ok(Arc::new(file::FileDisk::open(path)?)),
    }
}
