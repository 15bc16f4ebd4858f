use std::cmp::Ordering;
use std::fmt;

use crate::common::KEY_SIZE;

/// Fixed-width index key. The byte content is opaque to the tree;
/// ordering is decided by the comparator the tree was built with.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct IndexKey([u8; KEY_SIZE]);

impl IndexKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn from_u64(value: u64) -> Self {
        Self(value.to_le_bytes())
    }

    pub fn to_u64(&self) -> u64 {
        u64::from_le_bytes(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    /// Reads a key out of a page buffer.
    pub fn read_from(buf: &[u8]) -> Self {
        Self(buf[..KEY_SIZE].try_into().unwrap())
    }
}

impl fmt::Debug for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IndexKey({})", self.to_u64())
    }
}

pub trait KeyComparator: Send + Sync {
    fn compare(&self, a: &IndexKey, b: &IndexKey) -> Ordering;
}

/// Compares keys as little-endian u64 values.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntegerComparator;

impl KeyComparator for IntegerComparator {
    fn compare(&self, a: &IndexKey, b: &IndexKey) -> Ordering {
        a.to_u64().cmp(&b.to_u64())
    }
}

/// Compares keys lexicographically over their raw bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct BytewiseComparator;

impl KeyComparator for BytewiseComparator {
    fn compare(&self, a: &IndexKey, b: &IndexKey) -> Ordering {
        a.as_bytes().cmp(b.as_bytes())
    }
}
