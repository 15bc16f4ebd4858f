use std::sync::Arc;

use silt::buffer::BufferPoolManager;
use silt::common::{PageId, RecordId, SlotId};
use silt::index::{BPlusTree, IndexKey, IntegerComparator};
use silt::storage::disk::DiskManager;

fn main() {
    println!("Silt - disk-backed index and buffer core");
    println!("========================================\n");

    // Create a database file for demonstration
    let db_path = "demo.db";

    // Initialize the disk manager
    let disk_manager = Arc::new(DiskManager::new(db_path).expect("Failed to create disk manager"));
    println!("Created disk manager for: {}", db_path);

    // Create buffer pool manager with 16 frames and LRU replacement
    let bpm = Arc::new(BufferPoolManager::new(16, disk_manager));
    println!("Created buffer pool manager with 16 frames\n");

    // Open a B+ tree index over the pool, keyed by u64
    let mut index =
        BPlusTree::new("demo_index", Arc::clone(&bpm), IntegerComparator).expect("open index");

    // Insert some keys out of order
    for key in [42u64, 7, 19, 3, 25, 88, 61, 14] {
        let rid = RecordId::new(PageId::new(key as u32), SlotId::new(0));
        index.insert(&IndexKey::from_u64(key), &rid).expect("insert");
        println!("Inserted key {}", key);
    }

    // Point lookups, including a miss
    println!("\nPoint lookups:");
    for key in [7u64, 88, 100] {
        match index.get_value(&IndexKey::from_u64(key)).expect("lookup") {
            Some(rid) => println!("  key {} -> {}", key, rid),
            None => println!("  key {} -> not found", key),
        }
    }

    // Walk the leaf chain in key order
    println!("\nOrdered scan:");
    let mut iter = index.iter().expect("iterator");
    while let Some((key, rid)) = iter.next().expect("advance") {
        println!("  {} -> {}", key.to_u64(), rid);
    }

    // Remove a key, then scan a bounded range
    index.remove(&IndexKey::from_u64(19)).expect("remove");
    println!("\nRemoved key 19; range 1..=30 now:");
    let results = index
        .range_scan(&IndexKey::from_u64(1), &IndexKey::from_u64(30))
        .expect("range scan");
    for (key, rid) in results {
        println!("  {} -> {}", key.to_u64(), rid);
    }

    // Flush everything to disk
    bpm.flush_all_pages().expect("flush");
    println!("\nFlushed all pages to disk");

    // Clean up
    std::fs::remove_file(db_path).ok();
    println!("Demo completed successfully!");
}
