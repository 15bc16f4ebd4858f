use std::sync::Arc;

use parking_lot::Mutex;

use crate::common::{
    FrameId, PageId, Result, SiltError, DEFAULT_BUCKET_SIZE, INVALID_PAGE_ID, PAGE_SIZE,
};
use crate::storage::disk::{DiskManager, DiskScheduler};

use super::{ExtendibleHashTable, Frame, LruReplacer, ReadPageGuard, WritePageGuard};

/// Pool bookkeeping shared with the page guards, which unpin through
/// it when they drop.
pub(crate) struct PoolState {
    /// The buffer pool frames
    frames: Vec<Arc<Frame>>,
    /// Page table: maps resident page ids to frame ids
    page_table: ExtendibleHashTable<PageId, FrameId>,
    /// Frames that hold no page at all
    free_list: Mutex<Vec<FrameId>>,
    /// Unpinned resident frames, in eviction order
    replacer: LruReplacer<FrameId>,
}

impl PoolState {
    /// Releases one pin on a resident page, folding `was_dirty` into
    /// the frame's dirty flag. When the last pin goes away the frame
    /// becomes an eviction candidate. Returns false if the page is not
    /// resident or not pinned.
    pub(crate) fn unpin_page(&self, page_id: PageId, was_dirty: bool) -> bool {
        let Some(frame_id) = self.page_table.find(&page_id) else {
            return false;
        };
        let frame = &self.frames[frame_id.as_usize()];
        match frame.unpin() {
            Some(0) => {
                frame.mark_dirty(was_dirty);
                self.replacer.touch(frame_id);
                true
            }
            Some(_) => {
                frame.mark_dirty(was_dirty);
                true
            }
            None => false,
        }
    }
}

/// BufferPoolManager caches disk pages in a fixed set of frames,
/// handing out pinned RAII guards and evicting the least recently
/// used unpinned page when a frame is needed.
pub struct BufferPoolManager {
    pool_size: usize,
    state: Arc<PoolState>,
    disk_scheduler: DiskScheduler,
}

impl BufferPoolManager {
    pub fn new(pool_size: usize, disk_manager: Arc<DiskManager>) -> Self {
        let mut frames = Vec::with_capacity(pool_size);
        let mut free_list = Vec::with_capacity(pool_size);

        for i in 0..pool_size {
            let frame_id = FrameId::new(i as u32);
            frames.push(Arc::new(Frame::new(frame_id)));
            free_list.push(frame_id);
        }
        // Pop from the back; keep ascending allocation order
        free_list.reverse();

        let state = Arc::new(PoolState {
            frames,
            page_table: ExtendibleHashTable::new(DEFAULT_BUCKET_SIZE),
            free_list: Mutex::new(free_list),
            replacer: LruReplacer::new(),
        });

        Self {
            pool_size,
            state,
            disk_scheduler: DiskScheduler::new(disk_manager),
        }
    }

    /// Allocates a fresh page on disk and pins it into a zeroed frame.
    /// The returned guard carries the new page id.
    pub fn new_page(&self) -> Result<WritePageGuard> {
        let frame_id = self.acquire_frame()?;
        let frame = &self.state.frames[frame_id.as_usize()];

        let page_id = self.disk_scheduler.disk_manager().allocate_page()?;

        frame.set_page_id(page_id);
        frame.pin();
        self.state.page_table.insert(page_id, frame_id);

        let guard = unsafe {
            WritePageGuard::new(page_id, Arc::clone(&self.state), Arc::clone(frame))
        };
        Ok(guard)
    }

    /// Fetches a page for shared read access, pinning it for the
    /// lifetime of the guard.
    pub fn fetch_page_read(&self, page_id: PageId) -> Result<ReadPageGuard> {
        let frame_id = self.fetch_frame(page_id)?;
        let frame = Arc::clone(&self.state.frames[frame_id.as_usize()]);
        let guard = unsafe { ReadPageGuard::new(page_id, Arc::clone(&self.state), frame) };
        Ok(guard)
    }

    /// Fetches a page for exclusive access, pinning it for the
    /// lifetime of the guard.
    pub fn fetch_page_write(&self, page_id: PageId) -> Result<WritePageGuard> {
        let frame_id = self.fetch_frame(page_id)?;
        let frame = Arc::clone(&self.state.frames[frame_id.as_usize()]);
        let guard = unsafe { WritePageGuard::new(page_id, Arc::clone(&self.state), frame) };
        Ok(guard)
    }

    /// Writes a resident page out to disk and clears its dirty flag.
    /// Returns false if the page is not resident.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        if page_id == INVALID_PAGE_ID {
            return Err(SiltError::InvalidPageId(page_id));
        }

        let Some(frame_id) = self.state.page_table.find(&page_id) else {
            return Ok(false);
        };
        let frame = &self.state.frames[frame_id.as_usize()];

        let mut data = [0u8; PAGE_SIZE];
        frame.copy_to(&mut data);
        self.disk_scheduler.schedule_write_sync(page_id, &data)?;
        frame.set_dirty(false);

        Ok(true)
    }

    /// Writes every dirty resident page out to disk.
    pub fn flush_all_pages(&self) -> Result<()> {
        for frame in &self.state.frames {
            let page_id = frame.page_id();
            if page_id == INVALID_PAGE_ID || !frame.is_dirty() {
                continue;
            }
            let mut data = [0u8; PAGE_SIZE];
            frame.copy_to(&mut data);
            self.disk_scheduler.schedule_write_sync(page_id, &data)?;
            frame.set_dirty(false);
        }
        Ok(())
    }

    /// Drops a page from the pool and deallocates it on disk. Fails
    /// while the page is pinned; returns false if it is not resident.
    pub fn delete_page(&self, page_id: PageId) -> Result<bool> {
        let Some(frame_id) = self.state.page_table.find(&page_id) else {
            return Ok(false);
        };
        let frame = &self.state.frames[frame_id.as_usize()];

        if frame.pin_count() > 0 {
            return Err(SiltError::PageStillPinned(page_id));
        }

        self.state.page_table.remove(&page_id);
        self.state.replacer.erase(&frame_id);
        frame.reset();
        self.state.free_list.lock().push(frame_id);

        self.disk_scheduler.disk_manager().deallocate_page(page_id)?;
        log::debug!("deleted page {} from frame {}", page_id, frame_id);

        Ok(true)
    }

    /// Returns the pin count of a resident page.
    pub fn get_pin_count(&self, page_id: PageId) -> Option<u32> {
        self.state
            .page_table
            .find(&page_id)
            .map(|frame_id| self.state.frames[frame_id.as_usize()].pin_count())
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn free_frame_count(&self) -> usize {
        self.state.free_list.lock().len()
    }

    pub fn replacer_size(&self) -> usize {
        self.state.replacer.size()
    }

    /// Brings a page into the pool (if not already resident) and pins
    /// its frame.
    fn fetch_frame(&self, page_id: PageId) -> Result<FrameId> {
        if page_id == INVALID_PAGE_ID {
            return Err(SiltError::InvalidPageId(page_id));
        }

        if let Some(frame_id) = self.state.page_table.find(&page_id) {
            let frame = &self.state.frames[frame_id.as_usize()];
            if frame.pin() == 1 {
                self.state.replacer.erase(&frame_id);
            }
            return Ok(frame_id);
        }

        let frame_id = self.acquire_frame()?;
        let frame = &self.state.frames[frame_id.as_usize()];

        let mut data = [0u8; PAGE_SIZE];
        self.disk_scheduler.schedule_read_sync(page_id, &mut data)?;

        frame.copy_from(&data);
        frame.set_page_id(page_id);
        frame.set_dirty(false);
        frame.pin();
        self.state.page_table.insert(page_id, frame_id);

        Ok(frame_id)
    }

    /// Obtains an empty frame: from the free list when possible,
    /// otherwise by evicting the LRU unpinned page, writing it back
    /// first if dirty.
    fn acquire_frame(&self) -> Result<FrameId> {
        if let Some(frame_id) = self.state.free_list.lock().pop() {
            return Ok(frame_id);
        }

        let Some(frame_id) = self.state.replacer.victim() else {
            return Err(SiltError::PoolExhausted);
        };
        let frame = &self.state.frames[frame_id.as_usize()];
        let old_page_id = frame.page_id();

        if frame.is_dirty() {
            let mut data = [0u8; PAGE_SIZE];
            frame.copy_to(&mut data);
            self.disk_scheduler.schedule_write_sync(old_page_id, &data)?;
            log::debug!("evicted dirty page {} from frame {}", old_page_id, frame_id);
        }

        self.state.page_table.remove(&old_page_id);
        frame.reset();

        Ok(frame_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn create_bpm(pool_size: usize) -> (BufferPoolManager, NamedTempFile) {
        let temp_file = NamedTempFile::new().unwrap();
        let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
        (BufferPoolManager::new(pool_size, dm), temp_file)
    }

    #[test]
    fn test_new_pool_is_all_free() {
        let (bpm, _temp) = create_bpm(10);
        assert_eq!(bpm.pool_size(), 10);
        assert_eq!(bpm.free_frame_count(), 10);
    }

    #[test]
    fn test_new_page_is_pinned_until_drop() {
        let (bpm, _temp) = create_bpm(10);

        let page_id = {
            let guard = bpm.new_page().unwrap();
            assert_eq!(bpm.get_pin_count(guard.page_id()), Some(1));
            guard.page_id()
        };

        assert_eq!(bpm.get_pin_count(page_id), Some(0));
        assert_eq!(bpm.free_frame_count(), 9);
    }

    #[test]
    fn test_read_back_written_bytes() {
        let (bpm, _temp) = create_bpm(10);

        let page_id = {
            let mut guard = bpm.new_page().unwrap();
            guard.data_mut()[0] = 42;
            guard.data_mut()[100] = 255;
            guard.page_id()
        };

        let guard = bpm.fetch_page_read(page_id).unwrap();
        assert_eq!(guard.data()[0], 42);
        assert_eq!(guard.data()[100], 255);
    }

    #[test]
    fn test_flush_persists_across_pools() {
        let (bpm, temp) = create_bpm(10);

        let page_id = {
            let mut guard = bpm.new_page().unwrap();
            guard.data_mut()[0] = 42;
            guard.page_id()
        };
        bpm.flush_page(page_id).unwrap();
        drop(bpm);

        let dm = Arc::new(DiskManager::new(temp.path()).unwrap());
        let bpm2 = BufferPoolManager::new(10, dm);
        let guard = bpm2.fetch_page_read(page_id).unwrap();
        assert_eq!(guard.data()[0], 42);
    }

    #[test]
    fn test_delete_page() {
        let (bpm, _temp) = create_bpm(10);

        let page_id = {
            let guard = bpm.new_page().unwrap();
            guard.page_id()
        };

        {
            let _guard = bpm.fetch_page_read(page_id).unwrap();
            assert!(matches!(
                bpm.delete_page(page_id),
                Err(SiltError::PageStillPinned(_))
            ));
        }

        assert!(bpm.delete_page(page_id).unwrap());
        assert_eq!(bpm.get_pin_count(page_id), None);
        assert!(!bpm.delete_page(page_id).unwrap());
    }

    #[test]
    fn test_pool_exhausted_when_all_pinned() {
        let (bpm, _temp) = create_bpm(2);

        let _g1 = bpm.new_page().unwrap();
        let _g2 = bpm.new_page().unwrap();

        assert!(matches!(bpm.new_page(), Err(SiltError::PoolExhausted)));
    }

    #[test]
    fn test_eviction_writes_back_dirty_page() {
        let (bpm, _temp) = create_bpm(1);

        let page_id = {
            let mut guard = bpm.new_page().unwrap();
            guard.data_mut()[7] = 99;
            guard.page_id()
        };

        // Force the only frame to be recycled
        let other = {
            let guard = bpm.new_page().unwrap();
            guard.page_id()
        };
        assert_ne!(page_id, other);

        let guard = bpm.fetch_page_read(page_id).unwrap();
        assert_eq!(guard.data()[7], 99);
    }
}
