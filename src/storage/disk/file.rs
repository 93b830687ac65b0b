use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use parking_lot::Mutex;

use super::memory::check_page_buf;
use super::DiskManager;
use crate::error::Result;
use crate::storage::page::{PageId, PAGE_SIZE};

/// File-backed disk manager. Page `p` lives at offset `p * PAGE_SIZE` in
/// a single database file. Reads past the current end of the file yield
/// zeroes, so a freshly allocated page reads back empty; writes extend
/// the file as needed.
pub struct FileDisk {
    file: Mutex<File>,
}

impl FileDisk {
    /// Open the database file at `path`, creating it if absent.
    pub fn open(path: &Path) -> Result<FileDisk> {
        let file = OpenOptions::new().read(true).write(true).create(true).open(path)?;
        Ok(FileDisk { file: Mutex::new(file) })
    }

    fn page_offset(page_id: PageId) -> u64 {
        page_id as u64 * PAGE_SIZE as u64
    }
}

impl DiskManager for FileDisk {
    fn read_page(&self, page_id: PageId, buf: &mut [u8]) -> Result<()> {
        check_page_buf(buf.len())?;
        let mut file = self.file.lock();
        let offset = Self::page_offset(page_id);
        if offset >= file.metadata()?.len() {
            buf.fill(0);
            return Ok(());
        }
        file.seek(SeekFrom::Start(offset))?;
        // pages are written whole, so a resident page is never truncated
        file.read_exact(buf)?;
        Ok(())
    }

    fn write_page(&self, page_id: PageId, buf: &[u8]) -> Result<()> {
        check_page_buf(buf.len())?;
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(Self::page_offset(page_id)))?;
        file.write_all(buf)?;
        Ok(())
    }
}
