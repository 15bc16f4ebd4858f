use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::{Mutex, RwLock};

use crate::common::{FrameId, PageId, INVALID_PAGE_ID, PAGE_SIZE};

struct FrameMeta {
    /// The page stored in this frame (INVALID_PAGE_ID when free)
    page_id: PageId,
    /// Whether the page has been modified since it was read from disk
    dirty: bool,
}

/// One slot of the buffer pool: a page-sized byte buffer plus the
/// metadata the pool needs to manage it.
pub struct Frame {
    frame_id: FrameId,
    meta: Mutex<FrameMeta>,
    /// Number of outstanding pins; a pinned frame must not be evicted
    pin_count: AtomicU32,
    pub(crate) data: RwLock<Box<[u8; PAGE_SIZE]>>,
}

impl Frame {
    pub fn new(frame_id: FrameId) -> Self {
        Self {
            frame_id,
            meta: Mutex::new(FrameMeta {
                page_id: INVALID_PAGE_ID,
                dirty: false,
            }),
            pin_count: AtomicU32::new(0),
            data: RwLock::new(Box::new([0u8; PAGE_SIZE])),
        }
    }

    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }

    pub fn page_id(&self) -> PageId {
        self.meta.lock().page_id
    }

    pub fn set_page_id(&self, page_id: PageId) {
        self.meta.lock().page_id = page_id;
    }

    pub fn is_dirty(&self) -> bool {
        self.meta.lock().dirty
    }

    pub fn set_dirty(&self, dirty: bool) {
        self.meta.lock().dirty = dirty;
    }

    /// ORs `dirty` into the flag, so a clean release never clears a
    /// previous writer's mark.
    pub fn mark_dirty(&self, dirty: bool) {
        if dirty {
            self.meta.lock().dirty = true;
        }
    }

    pub fn pin_count(&self) -> u32 {
        self.pin_count.load(Ordering::Acquire)
    }

    /// Increments the pin count and returns the new value.
    pub fn pin(&self) -> u32 {
        self.pin_count.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Decrements the pin count and returns the new value, or `None`
    /// if the count was already zero.
    pub fn unpin(&self) -> Option<u32> {
        loop {
            let current = self.pin_count.load(Ordering::Acquire);
            if current == 0 {
                return None;
            }
            if self
                .pin_count
                .compare_exchange(current, current - 1, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                return Some(current - 1);
            }
        }
    }

    pub fn copy_from(&self, src: &[u8]) {
        assert_eq!(src.len(), PAGE_SIZE);
        self.data.write().copy_from_slice(src);
    }

    pub fn copy_to(&self, dst: &mut [u8]) {
        assert_eq!(dst.len(), PAGE_SIZE);
        dst.copy_from_slice(&**self.data.read());
    }

    /// Returns the frame to its initial free state.
    pub fn reset(&self) {
        {
            let mut meta = self.meta.lock();
            meta.page_id = INVALID_PAGE_ID;
            meta.dirty = false;
        }
        self.pin_count.store(0, Ordering::Release);
        self.data.write().fill(0);
    }
}
