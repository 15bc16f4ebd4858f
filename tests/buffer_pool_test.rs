//! Integration tests for the buffer pool manager

use std::sync::Arc;

use silt::buffer::BufferPoolManager;
use silt::common::{PageId, SiltError};
use silt::storage::disk::DiskManager;

use tempfile::NamedTempFile;

fn create_bpm(pool_size: usize) -> (Arc<BufferPoolManager>, NamedTempFile) {
    let temp_file = NamedTempFile::new().unwrap();
    let disk_manager = Arc::new(DiskManager::new(temp_file.path()).unwrap());
    let bpm = Arc::new(BufferPoolManager::new(pool_size, disk_manager));
    (bpm, temp_file)
}

/// Creates a page, writes a marker byte into it, and unpins it.
fn seed_page(bpm: &BufferPoolManager, marker: u8) -> PageId {
    let mut guard = bpm.new_page().unwrap();
    guard.data_mut()[0] = marker;
    guard.page_id()
}

#[test]
fn test_write_read_across_guards() {
    let (bpm, _temp) = create_bpm(10);

    let page_id = seed_page(&bpm, 42);
    {
        let mut guard = bpm.fetch_page_write(page_id).unwrap();
        guard.data_mut()[100] = 7;
    }

    let guard = bpm.fetch_page_read(page_id).unwrap();
    assert_eq!(guard.data()[0], 42);
    assert_eq!(guard.data()[100], 7);
}

#[test]
fn test_pin_counts_follow_guards() {
    let (bpm, _temp) = create_bpm(10);

    let page_id = seed_page(&bpm, 1);
    assert_eq!(bpm.get_pin_count(page_id), Some(0));

    {
        let _g1 = bpm.fetch_page_read(page_id).unwrap();
        assert_eq!(bpm.get_pin_count(page_id), Some(1));
    }
    assert_eq!(bpm.get_pin_count(page_id), Some(0));
}

#[test]
fn test_lru_eviction_order() {
    // Pool of three frames; pages fill it, then each new page claims
    // the least recently used unpinned frame.
    let (bpm, _temp) = create_bpm(3);

    let p1 = seed_page(&bpm, 1);
    let p2 = seed_page(&bpm, 2);
    let p3 = seed_page(&bpm, 3);
    assert_eq!(bpm.free_frame_count(), 0);

    // p1 is the LRU page and gets evicted for p4
    let p4 = seed_page(&bpm, 4);
    assert_eq!(bpm.get_pin_count(p1), None);
    assert_eq!(bpm.get_pin_count(p2), Some(0));

    // Pinning p2 removes it from the eviction candidates
    let _p2_guard = bpm.fetch_page_read(p2).unwrap();

    // Next victim is p3, the least recent among the unpinned
    let _p5 = seed_page(&bpm, 5);
    assert_eq!(bpm.get_pin_count(p3), None);
    assert_eq!(bpm.get_pin_count(p4), Some(0));
    assert_eq!(bpm.get_pin_count(p2), Some(1));
}

#[test]
fn test_evicted_page_can_be_fetched_back() {
    let (bpm, _temp) = create_bpm(2);

    let p1 = seed_page(&bpm, 11);
    let _p2 = seed_page(&bpm, 22);
    let _p3 = seed_page(&bpm, 33); // evicts p1, which is dirty

    let guard = bpm.fetch_page_read(p1).unwrap();
    assert_eq!(guard.data()[0], 11);
}

#[test]
fn test_pool_exhausted_when_every_frame_pinned() {
    let (bpm, _temp) = create_bpm(2);

    let _g1 = bpm.new_page().unwrap();
    let _g2 = bpm.new_page().unwrap();

    assert!(matches!(bpm.new_page(), Err(SiltError::PoolExhausted)));

    let p = seed_page(&bpm, 9);
    assert!(bpm.fetch_page_read(p).is_ok());
}

#[test]
fn test_delete_page_requires_unpinned() {
    let (bpm, _temp) = create_bpm(5);

    let page_id = seed_page(&bpm, 5);
    {
        let _guard = bpm.fetch_page_write(page_id).unwrap();
        assert!(matches!(
            bpm.delete_page(page_id),
            Err(SiltError::PageStillPinned(_))
        ));
    }

    assert!(bpm.delete_page(page_id).unwrap());
    assert_eq!(bpm.get_pin_count(page_id), None);
    assert_eq!(bpm.free_frame_count(), 5);
}

#[test]
fn test_flush_all_persists_every_dirty_page() {
    let temp_file = NamedTempFile::new().unwrap();
    let path = temp_file.path().to_path_buf();

    let page_ids: Vec<PageId> = {
        let disk_manager = Arc::new(DiskManager::new(&path).unwrap());
        let bpm = BufferPoolManager::new(8, disk_manager);
        let ids: Vec<PageId> = (0..5).map(|i| seed_page(&bpm, 100 + i)).collect();
        bpm.flush_all_pages().unwrap();
        ids
    };

    let disk_manager = Arc::new(DiskManager::new(&path).unwrap());
    let bpm = BufferPoolManager::new(8, disk_manager);
    for (i, page_id) in page_ids.iter().enumerate() {
        let guard = bpm.fetch_page_read(*page_id).unwrap();
        assert_eq!(guard.data()[0], 100 + i as u8);
    }
}

#[test]
fn test_pin_conservation() {
    // With every guard dropped, each frame is either free or an
    // eviction candidate; nothing stays pinned.
    let (bpm, _temp) = create_bpm(4);

    let pages: Vec<PageId> = (0..8).map(|i| seed_page(&bpm, i)).collect();
    for page_id in pages.iter().rev().take(3) {
        if bpm.get_pin_count(*page_id).is_some() {
            let _ = bpm.fetch_page_read(*page_id).unwrap();
        }
    }

    assert_eq!(bpm.free_frame_count() + bpm.replacer_size(), 4);
    for page_id in &pages {
        if let Some(count) = bpm.get_pin_count(*page_id) {
            assert_eq!(count, 0);
        }
    }
}
