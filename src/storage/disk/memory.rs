use std::collections::BTreeMap;

use parking_lot::Mutex;

use super::DiskManager;
use crate::error::{Error, Result};
use crate::storage::page::{PageId, PAGE_SIZE};

/// In-memory disk manager backed by a map of page images. Useful for
/// tests and as the default backing of a throwaway database.
pub struct Memory {
    pages: Mutex<BTreeMap<PageId, Vec<u8>>>,
}

impl Memory {
    pub fn new() -> Memory {
        Memory { pages: Mutex::new(BTreeMap::new()) }
    }
}

impl Default for Memory {
    fn default() -> Self {
        Memory::new()
    }
}

impl DiskManager for Memory {
    fn read_page(&self, page_id: PageId, buf: &mut [u8]) -> Result<()> {
        check_page_buf(buf.len())?;
        match self.pages.lock().get(&page_id) {
            Some(image) => buf.copy_from_slice(image),
            None => buf.fill(0),
        }
        Ok(())
    }

    fn write_page(&self, page_id: PageId, buf: &[u8]) -> Result<()> {
        check_page_buf(buf.len())?;
        self.pages.lock().insert(page_id, buf.to_vec());
        Ok(())
    }
}

pub(super) fn check_page_buf(len: usize) -> Result<()> {
    if len != PAGE_SIZE {
        return Err(Error::invalid_argument(format!(
            "page buffer must be {} bytes, got {}",
            PAGE_SIZE, len
        )));
    }
    Ok(())
}
