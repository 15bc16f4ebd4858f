use parking_lot::Mutex;

use crate::common::{FrameId, PageId};

/// Width of a fingerprint in bits. A bucket whose local depth has
/// reached this cap can no longer be split and is allowed to exceed
/// its nominal capacity instead.
const FINGERPRINT_BITS: u32 = 64;

/// Fixed-width hash address for a key. Fingerprints are used only for
/// bucket addressing; key equality is decided by `Eq`.
pub trait Fingerprint {
    fn fingerprint(&self) -> u64;
}

impl Fingerprint for u32 {
    fn fingerprint(&self) -> u64 {
        *self as u64
    }
}

impl Fingerprint for u64 {
    fn fingerprint(&self) -> u64 {
        *self
    }
}

impl Fingerprint for usize {
    fn fingerprint(&self) -> u64 {
        *self as u64
    }
}

impl Fingerprint for PageId {
    fn fingerprint(&self) -> u64 {
        self.as_u32() as u64
    }
}

impl Fingerprint for FrameId {
    fn fingerprint(&self) -> u64 {
        self.as_u32() as u64
    }
}

fn low_bits(fp: u64, depth: u32) -> u64 {
    if depth >= FINGERPRINT_BITS {
        fp
    } else {
        fp & ((1u64 << depth) - 1)
    }
}

struct Bucket<K, V> {
    /// Number of low fingerprint bits shared by every key in here
    local_depth: u32,
    /// The shared low bits themselves
    bucket_val: u64,
    entries: Vec<(K, V)>,
}

struct HashTableState<K, V> {
    /// Directory slot -> index into `buckets`; len == 1 << global_depth.
    /// A slot is `None` when no bucket covers its bit pattern yet; the
    /// bucket is created lazily on first insert through that slot.
    directory: Vec<Option<usize>>,
    /// Buckets are created at construction, by splits, or lazily for an
    /// uncovered slot. They are never destroyed (no shrink).
    buckets: Vec<Bucket<K, V>>,
    global_depth: u32,
}

/// Extendible hash table, used as the buffer pool's page table.
///
/// The directory is indexed by the low `global_depth` bits of the key's
/// fingerprint. Each bucket covers the keys whose low `local_depth`
/// bits equal its `bucket_val`; an over-full bucket raises its local
/// depth until the partition actually separates its entries, doubling
/// the directory whenever the local depth passes the global one.
pub struct ExtendibleHashTable<K, V> {
    max_bucket_size: usize,
    state: Mutex<HashTableState<K, V>>,
}

impl<K, V> ExtendibleHashTable<K, V>
where
    K: Fingerprint + Eq + Copy,
    V: Copy,
{
    pub fn new(max_bucket_size: usize) -> Self {
        assert!(max_bucket_size > 0);
        Self {
            max_bucket_size,
            state: Mutex::new(HashTableState {
                directory: vec![Some(0)],
                buckets: vec![Bucket {
                    local_depth: 0,
                    bucket_val: 0,
                    entries: Vec::new(),
                }],
                global_depth: 0,
            }),
        }
    }

    pub fn find(&self, key: &K) -> Option<V> {
        let state = self.state.lock();
        let idx = state.slot_of(key.fingerprint())?;
        state.buckets[idx]
            .entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| *v)
    }

    pub fn remove(&self, key: &K) -> bool {
        let mut state = self.state.lock();
        let Some(idx) = state.slot_of(key.fingerprint()) else {
            return false;
        };
        let bucket = &mut state.buckets[idx];
        if let Some(pos) = bucket.entries.iter().position(|(k, _)| k == key) {
            bucket.entries.swap_remove(pos);
            true
        } else {
            false
        }
    }

    /// Inserts or updates an entry, splitting the target bucket as many
    /// times as needed to bring every bucket back under capacity.
    pub fn insert(&self, key: K, value: V) {
        let mut state = self.state.lock();
        let fp = key.fingerprint();
        let mut idx = match state.slot_of(fp) {
            Some(idx) => idx,
            None => state.cover_slot(fp),
        };

        if let Some(entry) = state.buckets[idx]
            .entries
            .iter_mut()
            .find(|(k, _)| *k == key)
        {
            entry.1 = value;
            return;
        }
        state.buckets[idx].entries.push((key, value));

        // At most one of the two halves of a split can still be over
        // capacity, so a single chain of splits suffices.
        while state.buckets[idx].entries.len() > self.max_bucket_size {
            match state.split_bucket(idx) {
                Some((left, right)) => {
                    idx = if state.buckets[left].entries.len() > self.max_bucket_size {
                        left
                    } else {
                        right
                    };
                }
                // Identical fingerprints can never be separated; the
                // bucket overflows in place once the depth cap is hit.
                None => break,
            }
        }
    }

    pub fn global_depth(&self) -> u32 {
        self.state.lock().global_depth
    }

    /// Local depth of the bucket behind a directory slot, or `None`
    /// for an out-of-range or uncovered slot.
    pub fn local_depth(&self, directory_index: usize) -> Option<u32> {
        let state = self.state.lock();
        let idx = (*state.directory.get(directory_index)?)?;
        Some(state.buckets[idx].local_depth)
    }

    /// Number of distinct buckets (not directory slots).
    pub fn num_buckets(&self) -> usize {
        self.state.lock().buckets.len()
    }

    pub fn len(&self) -> usize {
        let state = self.state.lock();
        state.buckets.iter().map(|b| b.entries.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K, V> HashTableState<K, V>
where
    K: Fingerprint + Eq + Copy,
    V: Copy,
{
    fn slot_of(&self, fp: u64) -> Option<usize> {
        self.directory[low_bits(fp, self.global_depth) as usize]
    }

    /// Creates a bucket for a directory slot that no bucket covers.
    fn cover_slot(&mut self, fp: u64) -> usize {
        let slot = low_bits(fp, self.global_depth) as usize;
        self.buckets.push(Bucket {
            local_depth: self.global_depth,
            bucket_val: slot as u64,
            entries: Vec::new(),
        });
        let idx = self.buckets.len() - 1;
        self.directory[slot] = Some(idx);
        idx
    }

    /// Splits the bucket at `idx`, raising its local depth until the
    /// partition by the newly significant fingerprint bit leaves both
    /// halves non-empty. Returns the two resulting bucket indices, or
    /// `None` when the fingerprint width is exhausted first.
    fn split_bucket(&mut self, idx: usize) -> Option<(usize, usize)> {
        let old_val = self.buckets[idx].bucket_val;
        let old_depth = self.buckets[idx].local_depth;
        let mut moved: Vec<(K, V)> = Vec::new();

        loop {
            let bucket = &mut self.buckets[idx];
            if bucket.local_depth >= FINGERPRINT_BITS {
                // Nothing separated at any level; put the provisional
                // depth raises back so the directory stays consistent.
                bucket.local_depth = old_depth;
                bucket.bucket_val = old_val;
                return None;
            }
            bucket.local_depth += 1;
            let bit = 1u64 << (bucket.local_depth - 1);

            let entries = std::mem::take(&mut bucket.entries);
            for (k, v) in entries {
                if k.fingerprint() & bit != 0 {
                    moved.push((k, v));
                } else {
                    bucket.entries.push((k, v));
                }
            }

            if moved.is_empty() {
                continue;
            }
            if bucket.entries.is_empty() {
                // Everything carries the new bit: adopt the sibling
                // identity and keep raising the depth.
                bucket.entries = std::mem::take(&mut moved);
                bucket.bucket_val |= bit;
                continue;
            }

            let new_val = bucket.bucket_val | bit;
            let depth = bucket.local_depth;
            self.buckets.push(Bucket {
                local_depth: depth,
                bucket_val: new_val,
                entries: std::mem::take(&mut moved),
            });
            let new_idx = self.buckets.len() - 1;

            while self.global_depth < depth {
                // Mirroring keeps every existing slot pointing at the
                // bucket whose bucket_val it matches.
                let mirrored: Vec<Option<usize>> = self
                    .directory
                    .iter()
                    .chain(self.directory.iter())
                    .copied()
                    .collect();
                self.directory = mirrored;
                self.global_depth += 1;
            }

            // Slots that addressed the old bucket are re-pointed at
            // whichever half matches their bit pattern; patterns that
            // match neither (skipped intermediate levels) go uncovered.
            let mask = (1u64 << depth) - 1;
            let old_mask = if old_depth == 0 {
                0
            } else {
                (1u64 << old_depth) - 1
            };
            for (slot, target) in self.directory.iter_mut().enumerate() {
                if slot as u64 & old_mask != old_val {
                    continue;
                }
                let tag = slot as u64 & mask;
                *target = if tag == self.buckets[idx].bucket_val {
                    Some(idx)
                } else if tag == new_val {
                    Some(new_idx)
                } else {
                    None
                };
            }

            return Some((idx, new_idx));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_find_remove() {
        let table: ExtendibleHashTable<u64, u32> = ExtendibleHashTable::new(4);

        for i in 0..64u64 {
            table.insert(i, (i * 10) as u32);
        }
        for i in 0..64u64 {
            assert_eq!(table.find(&i), Some((i * 10) as u32));
        }
        assert_eq!(table.find(&100), None);

        assert!(table.remove(&7));
        assert!(!table.remove(&7));
        assert_eq!(table.find(&7), None);
        assert_eq!(table.len(), 63);
    }

    #[test]
    fn test_insert_updates_existing_key() {
        let table: ExtendibleHashTable<u64, u32> = ExtendibleHashTable::new(2);
        table.insert(1, 10);
        table.insert(1, 20);
        assert_eq!(table.find(&1), Some(20));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_split_raises_depth_until_entries_separate() {
        let table: ExtendibleHashTable<u64, u32> = ExtendibleHashTable::new(2);
        assert_eq!(table.global_depth(), 0);
        assert_eq!(table.num_buckets(), 1);

        // All three fingerprints share bit 0, so the split must go two
        // levels deep before 0b010 parts from the others.
        table.insert(0b000, 0);
        table.insert(0b100, 1);
        table.insert(0b010, 2);

        assert_eq!(table.global_depth(), 2);
        assert_eq!(table.num_buckets(), 2);
        for key in [0b000u64, 0b100, 0b010] {
            assert!(table.find(&key).is_some());
        }
    }

    #[test]
    fn test_global_depth_bounds_local_depths() {
        let table: ExtendibleHashTable<u64, u32> = ExtendibleHashTable::new(2);
        for i in 0..128u64 {
            table.insert(i, i as u32);
        }
        let global = table.global_depth();
        for slot in 0..(1usize << global) {
            if let Some(local) = table.local_depth(slot) {
                assert!(local <= global);
            }
        }
    }

    #[test]
    fn test_identical_fingerprints_overflow_in_place() {
        #[derive(Clone, Copy, PartialEq, Eq)]
        struct Clash(u32);
        impl Fingerprint for Clash {
            fn fingerprint(&self) -> u64 {
                0
            }
        }

        let table: ExtendibleHashTable<Clash, u32> = ExtendibleHashTable::new(2);
        for i in 0..10 {
            table.insert(Clash(i), i);
        }
        for i in 0..10 {
            assert_eq!(table.find(&Clash(i)), Some(i));
        }
    }
}
