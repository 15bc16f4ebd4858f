/// Size of a page in bytes (4 KB)
pub const PAGE_SIZE: usize = 4096;

/// Invalid page ID constant
pub const INVALID_PAGE_ID: PageId = PageId(u32::MAX);

/// Invalid frame ID constant
pub const INVALID_FRAME_ID: FrameId = FrameId(u32::MAX);

/// Page holding the index-name -> root-page-id catalog
pub const HEADER_PAGE_ID: PageId = PageId(0);

/// Fixed width of index keys in bytes
pub const KEY_SIZE: usize = 8;

/// Default buffer pool size (number of frames)
pub const DEFAULT_BUFFER_POOL_SIZE: usize = 10;

/// Default capacity of an extendible-hash bucket
pub const DEFAULT_BUCKET_SIZE: usize = 32;

use super::types::{FrameId, PageId};
