use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::{RwLockReadGuard, RwLockWriteGuard};

use crate::common::{PageId, PAGE_SIZE};

use super::buffer_pool_manager::PoolState;
use super::Frame;

/// RAII guard for read access to a pinned page. Dropping the guard
/// releases the data lock and unpins the page exactly once.
pub struct ReadPageGuard {
    page_id: PageId,
    pool: Arc<PoolState>,
    /// Keeps the frame alive for as long as the data lock is held
    _frame: Arc<Frame>,
    data: Option<RwLockReadGuard<'static, Box<[u8; PAGE_SIZE]>>>,
}

impl ReadPageGuard {
    /// # Safety
    /// The transmuted lock guard must not outlive `frame`; the guard
    /// holds the `Arc` for its whole lifetime, which guarantees that.
    pub(crate) unsafe fn new(page_id: PageId, pool: Arc<PoolState>, frame: Arc<Frame>) -> Self {
        let data = frame.data.read();
        let data: RwLockReadGuard<'static, Box<[u8; PAGE_SIZE]>> = std::mem::transmute(data);
        Self {
            page_id,
            pool,
            _frame: frame,
            data: Some(data),
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn data(&self) -> &[u8] {
        &self.data.as_ref().unwrap()[..]
    }
}

impl Deref for ReadPageGuard {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

impl Drop for ReadPageGuard {
    fn drop(&mut self) {
        // Release the data lock before unpinning
        self.data.take();
        self.pool.unpin_page(self.page_id, false);
    }
}

/// RAII guard for exclusive access to a pinned page. Tracks whether
/// the bytes were touched and reports that to the pool on drop.
pub struct WritePageGuard {
    page_id: PageId,
    pool: Arc<PoolState>,
    _frame: Arc<Frame>,
    data: Option<RwLockWriteGuard<'static, Box<[u8; PAGE_SIZE]>>>,
    dirtied: bool,
}

impl WritePageGuard {
    /// # Safety
    /// Same contract as [`ReadPageGuard::new`].
    pub(crate) unsafe fn new(page_id: PageId, pool: Arc<PoolState>, frame: Arc<Frame>) -> Self {
        let data = frame.data.write();
        let data: RwLockWriteGuard<'static, Box<[u8; PAGE_SIZE]>> = std::mem::transmute(data);
        Self {
            page_id,
            pool,
            _frame: frame,
            data: Some(data),
            dirtied: false,
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn data(&self) -> &[u8] {
        &self.data.as_ref().unwrap()[..]
    }

    /// Marks the page dirty and hands out the bytes.
    pub fn data_mut(&mut self) -> &mut [u8] {
        self.dirtied = true;
        &mut self.data.as_mut().unwrap()[..]
    }
}

impl Deref for WritePageGuard {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

impl DerefMut for WritePageGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.data_mut()
    }
}

impl Drop for WritePageGuard {
    fn drop(&mut self) {
        self.data.take();
        self.pool.unpin_page(self.page_id, self.dirtied);
    }
}
