//! Silt - the disk-backed index and buffer core of an embedded
//! storage engine.
//!
//! The crate caches fixed-size pages from a backing file in a buffer
//! pool and builds a B+ tree index on top of it. Pages only ever move
//! through the pool: the tree holds page ids and borrows frames via
//! pinned RAII guards.
//!
//! # Architecture
//!
//! - **Storage Layer** (`storage`): raw page I/O and the catalog page
//!   - `DiskManager`: reads, writes and allocates pages in one file
//!   - `DiskScheduler`: background worker thread for disk requests
//!   - `HeaderPage`: page 0, mapping index names to root page ids
//!
//! - **Buffer Pool** (`buffer`): memory management for pages
//!   - `BufferPoolManager`: fetches pages and caches them in frames
//!   - `ExtendibleHashTable`: the page table (page id -> frame id)
//!   - `LruReplacer`: least-recently-used eviction ordering
//!   - `ReadPageGuard`/`WritePageGuard`: pin guards, unpin on drop
//!
//! - **Index** (`index`): the B+ tree
//!   - `BPlusTree`: search, insert with split, remove with
//!     coalesce/redistribute, ordered iteration
//!   - `LeafPage`/`InternalPage`: typed views over node pages
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use silt::buffer::BufferPoolManager;
//! use silt::index::{BPlusTree, IndexKey, IntegerComparator};
//! use silt::storage::disk::DiskManager;
//! use silt::common::{PageId, RecordId, SlotId};
//!
//! let disk_manager = Arc::new(DiskManager::new("test.db").unwrap());
//! let bpm = Arc::new(BufferPoolManager::new(64, disk_manager));
//!
//! let mut index = BPlusTree::new("orders_pk", bpm, IntegerComparator).unwrap();
//! let rid = RecordId::new(PageId::new(7), SlotId::new(0));
//! index.insert(&IndexKey::from_u64(42), &rid).unwrap();
//! assert_eq!(index.get_value(&IndexKey::from_u64(42)).unwrap(), Some(rid));
//! ```

pub mod buffer;
pub mod common;
pub mod index;
pub mod storage;

// Re-export commonly used types at the crate root
pub use common::{PageId, RecordId, Result, SiltError, SlotId};
