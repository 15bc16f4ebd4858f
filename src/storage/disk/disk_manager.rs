use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;

use crate::common::{PageId, Result, PAGE_SIZE};

/// DiskManager reads and writes fixed-size pages against a single
/// database file and hands out page ids. Deallocated ids are recycled
/// through a free list before the file is grown.
pub struct DiskManager {
    file: Mutex<File>,
    /// Next never-used page id; page 0 is reserved for the header page
    next_page_id: AtomicU32,
    /// Ids returned by deallocate_page, reused first
    free_pages: Mutex<Vec<PageId>>,
    /// Number of disk reads performed
    num_reads: AtomicU32,
    /// Number of disk writes performed
    num_writes: AtomicU32,
}

impl DiskManager {
    /// Opens (or creates) the database file at `db_path`.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(db_path.as_ref())?;

        let file_size = file.metadata()?.len();
        let pages_on_disk = (file_size / PAGE_SIZE as u64) as u32;

        Ok(Self {
            file: Mutex::new(file),
            // Never hand out the header page id
            next_page_id: AtomicU32::new(pages_on_disk.max(1)),
            free_pages: Mutex::new(Vec::new()),
            num_reads: AtomicU32::new(0),
            num_writes: AtomicU32::new(0),
        })
    }

    /// Reads a page into the provided buffer. Reading past the end of
    /// the file yields zeroed bytes.
    pub fn read_page(&self, page_id: PageId, data: &mut [u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE, "Buffer must be PAGE_SIZE bytes");

        let offset = page_id.as_u32() as u64 * PAGE_SIZE as u64;
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;

        let mut filled = 0;
        while filled < PAGE_SIZE {
            let n = file.read(&mut data[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        data[filled..].fill(0);

        self.num_reads.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Writes a page from the provided buffer.
    pub fn write_page(&self, page_id: PageId, data: &[u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE, "Buffer must be PAGE_SIZE bytes");

        let offset = page_id.as_u32() as u64 * PAGE_SIZE as u64;
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)?;
        file.flush()?;

        self.num_writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Allocates a page id, preferring previously deallocated ids,
    /// and zeroes its bytes on disk.
    pub fn allocate_page(&self) -> Result<PageId> {
        let page_id = match self.free_pages.lock().pop() {
            Some(recycled) => recycled,
            None => PageId::new(self.next_page_id.fetch_add(1, Ordering::SeqCst)),
        };

        let zeros = [0u8; PAGE_SIZE];
        self.write_page(page_id, &zeros)?;

        Ok(page_id)
    }

    /// Returns a page id to the free list for reuse.
    pub fn deallocate_page(&self, page_id: PageId) -> Result<()> {
        self.free_pages.lock().push(page_id);
        Ok(())
    }

    pub fn num_pages(&self) -> u32 {
        self.next_page_id.load(Ordering::Relaxed)
    }

    pub fn num_reads(&self) -> u32 {
        self.num_reads.load(Ordering::Relaxed)
    }

    pub fn num_writes(&self) -> u32 {
        self.num_writes.load(Ordering::Relaxed)
    }

    pub fn sync(&self) -> Result<()> {
        self.file.lock().sync_all()?;
        Ok(())
    }
}

impl Drop for DiskManager {
    fn drop(&mut self) {
        let _ = self.file.get_mut().sync_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_allocate_skips_header_page() {
        let temp = NamedTempFile::new().unwrap();
        let dm = DiskManager::new(temp.path()).unwrap();

        let page_id = dm.allocate_page().unwrap();
        assert_eq!(page_id, PageId::new(1));
    }

    #[test]
    fn test_read_write_round_trip() {
        let temp = NamedTempFile::new().unwrap();
        let dm = DiskManager::new(temp.path()).unwrap();

        let page_id = dm.allocate_page().unwrap();

        let mut data = [0u8; PAGE_SIZE];
        data[0] = 42;
        data[PAGE_SIZE - 1] = 128;
        dm.write_page(page_id, &data).unwrap();

        let mut readback = [0u8; PAGE_SIZE];
        dm.read_page(page_id, &mut readback).unwrap();
        assert_eq!(readback[0], 42);
        assert_eq!(readback[PAGE_SIZE - 1], 128);
    }

    #[test]
    fn test_read_past_eof_is_zeroed() {
        let temp = NamedTempFile::new().unwrap();
        let dm = DiskManager::new(temp.path()).unwrap();

        let mut data = [7u8; PAGE_SIZE];
        dm.read_page(PageId::new(50), &mut data).unwrap();
        assert!(data.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_deallocated_id_is_recycled() {
        let temp = NamedTempFile::new().unwrap();
        let dm = DiskManager::new(temp.path()).unwrap();

        let first = dm.allocate_page().unwrap();
        dm.deallocate_page(first).unwrap();
        assert_eq!(dm.allocate_page().unwrap(), first);
    }

    #[test]
    fn test_reopen_preserves_next_page_id() {
        let temp = NamedTempFile::new().unwrap();

        {
            let dm = DiskManager::new(temp.path()).unwrap();
            dm.allocate_page().unwrap();
            dm.allocate_page().unwrap();
        }

        let dm = DiskManager::new(temp.path()).unwrap();
        let next = dm.allocate_page().unwrap();
        assert_eq!(next, PageId::new(3));
    }
}
