//! Integration tests for the disk layer

use std::sync::Arc;

use silt::common::{PageId, PAGE_SIZE};
use silt::storage::disk::{DiskManager, DiskScheduler};

use tempfile::NamedTempFile;

#[test]
fn test_pages_survive_reopen() {
    let temp = NamedTempFile::new().unwrap();
    let path = temp.path().to_path_buf();

    let page_id = {
        let dm = DiskManager::new(&path).unwrap();
        let page_id = dm.allocate_page().unwrap();
        let mut data = [0u8; PAGE_SIZE];
        data[0] = 123;
        data[PAGE_SIZE - 1] = 45;
        dm.write_page(page_id, &data).unwrap();
        dm.sync().unwrap();
        page_id
    };

    let dm = DiskManager::new(&path).unwrap();
    let mut data = [0u8; PAGE_SIZE];
    dm.read_page(page_id, &mut data).unwrap();
    assert_eq!(data[0], 123);
    assert_eq!(data[PAGE_SIZE - 1], 45);
}

#[test]
fn test_io_counters() {
    let temp = NamedTempFile::new().unwrap();
    let dm = DiskManager::new(temp.path()).unwrap();

    let page_id = dm.allocate_page().unwrap(); // one write for zeroing
    let data = [9u8; PAGE_SIZE];
    dm.write_page(page_id, &data).unwrap();

    let mut readback = [0u8; PAGE_SIZE];
    dm.read_page(page_id, &mut readback).unwrap();

    assert_eq!(dm.num_writes(), 2);
    assert_eq!(dm.num_reads(), 1);
}

#[test]
fn test_scheduler_round_trip_through_worker() {
    let temp = NamedTempFile::new().unwrap();
    let dm = Arc::new(DiskManager::new(temp.path()).unwrap());
    let scheduler = DiskScheduler::new(Arc::clone(&dm));

    let pages: Vec<PageId> = (0..4).map(|_| dm.allocate_page().unwrap()).collect();
    for (i, page_id) in pages.iter().enumerate() {
        let data = [i as u8 + 1; PAGE_SIZE];
        scheduler.schedule_write_sync(*page_id, &data).unwrap();
    }

    for (i, page_id) in pages.iter().enumerate() {
        let mut data = [0u8; PAGE_SIZE];
        scheduler.schedule_read_sync(*page_id, &mut data).unwrap();
        assert!(data.iter().all(|&b| b == i as u8 + 1));
    }
}
