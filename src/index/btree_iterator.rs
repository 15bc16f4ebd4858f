use std::sync::Arc;

use crate::buffer::{BufferPoolManager, ReadPageGuard};
use crate::common::{RecordId, Result, INVALID_PAGE_ID};

use super::key::IndexKey;
use super::leaf_page::LeafPageRef;

/// Forward iterator over the leaf chain. Holds the current leaf
/// pinned; advancing past its last entry unpins it and follows
/// `next_page_id`. Dropping the iterator releases the held leaf.
pub struct BTreeIterator {
    bpm: Arc<BufferPoolManager>,
    current: Option<(ReadPageGuard, usize)>,
}

impl BTreeIterator {
    pub(crate) fn exhausted(bpm: Arc<BufferPoolManager>) -> Self {
        Self { bpm, current: None }
    }

    pub(crate) fn at(bpm: Arc<BufferPoolManager>, leaf: ReadPageGuard, index: usize) -> Self {
        Self {
            bpm,
            current: Some((leaf, index)),
        }
    }

    pub fn next(&mut self) -> Result<Option<(IndexKey, RecordId)>> {
        loop {
            let Some((guard, index)) = self.current.take() else {
                return Ok(None);
            };

            let next_page_id = {
                let leaf = LeafPageRef::new(guard.data());
                if index < leaf.size() as usize {
                    let item = leaf.item_at(index);
                    self.current = Some((guard, index + 1));
                    return Ok(Some(item));
                }
                leaf.next_page_id()
            };

            // Unpin the exhausted leaf before pinning its sibling
            drop(guard);
            if next_page_id == INVALID_PAGE_ID {
                return Ok(None);
            }
            let next_guard = self.bpm.fetch_page_read(next_page_id)?;
            self.current = Some((next_guard, 0));
        }
    }
}

impl Iterator for BTreeIterator {
    type Item = Result<(IndexKey, RecordId)>;

    fn next(&mut self) -> Option<Self::Item> {
        match BTreeIterator::next(self) {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}
