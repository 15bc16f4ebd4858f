use std::sync::Arc;

use crate::buffer::{BufferPoolManager, WritePageGuard};
use crate::common::{PageId, RecordId, Result, SiltError, HEADER_PAGE_ID, INVALID_PAGE_ID};
use crate::storage::page::{HeaderPage, HeaderPageRef};

use super::btree_page::{node_kind, NodeKind};
use super::btree_iterator::BTreeIterator;
use super::internal_page::{InternalPage, InternalPageRef};
use super::key::{IndexKey, KeyComparator};
use super::leaf_page::{LeafPage, LeafPageRef};

/// A B+ tree index over the buffer pool. Keys live in sort order
/// across a forest of internal and leaf pages; leaves are chained
/// through `next_page_id` for ordered scans. The tree holds only page
/// ids and borrows frames from the pool one pinned guard at a time.
///
/// The tree takes no locks of its own; concurrent mutation is not
/// supported.
pub struct BPlusTree<C: KeyComparator> {
    index_name: String,
    root_page_id: PageId,
    bpm: Arc<BufferPoolManager>,
    comparator: C,
    /// Test hooks: when set, freshly initialized nodes get this
    /// capacity instead of the page-derived one.
    leaf_max_size: Option<u32>,
    internal_max_size: Option<u32>,
}

impl<C: KeyComparator> BPlusTree<C> {
    /// Opens the index named `name`, picking up its root page id from
    /// the header catalog if it was created before.
    pub fn new(name: &str, bpm: Arc<BufferPoolManager>, comparator: C) -> Result<Self> {
        let root_page_id = {
            let guard = bpm.fetch_page_read(HEADER_PAGE_ID)?;
            let header = HeaderPageRef::new(guard.data());
            if header.is_valid() {
                header.get_root_id(name).unwrap_or(INVALID_PAGE_ID)
            } else {
                INVALID_PAGE_ID
            }
        };

        Ok(Self {
            index_name: name.to_string(),
            root_page_id,
            bpm,
            comparator,
            leaf_max_size: None,
            internal_max_size: None,
        })
    }

    /// Like [`BPlusTree::new`] but with reduced node capacities, so
    /// tests can force splits and merges with a handful of keys.
    pub fn with_node_capacity(
        name: &str,
        bpm: Arc<BufferPoolManager>,
        comparator: C,
        leaf_max_size: u32,
        internal_max_size: u32,
    ) -> Result<Self> {
        let mut tree = Self::new(name, bpm, comparator)?;
        tree.leaf_max_size = Some(leaf_max_size);
        tree.internal_max_size = Some(internal_max_size);
        Ok(tree)
    }

    pub fn is_empty(&self) -> bool {
        self.root_page_id == INVALID_PAGE_ID
    }

    pub fn root_page_id(&self) -> PageId {
        self.root_page_id
    }

    /// Point lookup. An empty tree answers `None` rather than failing.
    pub fn get_value(&self, key: &IndexKey) -> Result<Option<RecordId>> {
        if self.is_empty() {
            return Ok(None);
        }
        let leaf_id = self.find_leaf(key, false)?;
        let guard = self.bpm.fetch_page_read(leaf_id)?;
        let leaf = LeafPageRef::new(guard.data());
        Ok(leaf.lookup(key, &self.comparator))
    }

    /// Inserts a key/record pair. Returns false on a duplicate key.
    pub fn insert(&mut self, key: &IndexKey, value: &RecordId) -> Result<bool> {
        if self.is_empty() {
            self.start_new_tree(key, value)?;
            return Ok(true);
        }

        let leaf_id = self.find_leaf(key, false)?;
        let mut guard = self.bpm.fetch_page_write(leaf_id)?;
        let overflow = {
            let mut leaf = LeafPage::new(guard.data_mut());
            if leaf.lookup(key, &self.comparator).is_some() {
                return Ok(false);
            }
            leaf.insert(key, value, &self.comparator) > leaf.max_size()
        };

        if overflow {
            self.split_leaf(leaf_id, guard)?;
        }
        Ok(true)
    }

    /// Removes a key. Absent keys and an empty tree are no-ops.
    pub fn remove(&mut self, key: &IndexKey) -> Result<()> {
        if self.is_empty() {
            return Ok(());
        }

        let leaf_id = self.find_leaf(key, false)?;
        let underflow = {
            let mut guard = self.bpm.fetch_page_write(leaf_id)?;
            let mut leaf = LeafPage::new(guard.data_mut());
            let old_size = leaf.size();
            let new_size = leaf.remove(key, &self.comparator);
            if new_size == old_size {
                return Ok(());
            }
            // The root may underflow freely
            leaf.parent_page_id() != INVALID_PAGE_ID && new_size < leaf.min_size()
        };

        if underflow {
            self.coalesce_or_redistribute(leaf_id)?;
        }
        Ok(())
    }

    /// Iterator over all entries in key order, starting at the
    /// leftmost leaf.
    pub fn iter(&self) -> Result<BTreeIterator> {
        if self.is_empty() {
            return Ok(BTreeIterator::exhausted(Arc::clone(&self.bpm)));
        }
        let leaf_id = self.find_leaf(&IndexKey::default(), true)?;
        let guard = self.bpm.fetch_page_read(leaf_id)?;
        Ok(BTreeIterator::at(Arc::clone(&self.bpm), guard, 0))
    }

    /// Iterator positioned at the first entry with key >= `key`.
    pub fn iter_from(&self, key: &IndexKey) -> Result<BTreeIterator> {
        if self.is_empty() {
            return Ok(BTreeIterator::exhausted(Arc::clone(&self.bpm)));
        }
        let leaf_id = self.find_leaf(key, false)?;
        let guard = self.bpm.fetch_page_read(leaf_id)?;
        let index = LeafPageRef::new(guard.data()).key_index(key, &self.comparator);
        Ok(BTreeIterator::at(Arc::clone(&self.bpm), guard, index))
    }

    /// Collects the entries with keys in `[start, end]`.
    pub fn range_scan(
        &self,
        start: &IndexKey,
        end: &IndexKey,
    ) -> Result<Vec<(IndexKey, RecordId)>> {
        let mut iter = self.iter_from(start)?;
        let mut results = Vec::new();
        while let Some((key, value)) = iter.next()? {
            if self.comparator.compare(&key, end) == std::cmp::Ordering::Greater {
                break;
            }
            results.push((key, value));
        }
        Ok(results)
    }

    /// Descends from the root to the leaf that covers `key` (or the
    /// leftmost leaf), unpinning each parent before fetching its
    /// child. The returned leaf is not pinned.
    fn find_leaf(&self, key: &IndexKey, leftmost: bool) -> Result<PageId> {
        let mut current = self.root_page_id;
        loop {
            let next = {
                let guard = self.bpm.fetch_page_read(current)?;
                match node_kind(guard.data()) {
                    Some(NodeKind::Leaf) => return Ok(current),
                    Some(NodeKind::Internal) => {
                        let node = InternalPageRef::new(guard.data());
                        if leftmost {
                            node.value_at(0)
                        } else {
                            node.lookup(key, &self.comparator)
                        }
                    }
                    None => {
                        return Err(SiltError::IndexCorrupted(format!(
                            "page {} is not a tree node",
                            current
                        )))
                    }
                }
            };
            current = next;
        }
    }

    fn start_new_tree(&mut self, key: &IndexKey, value: &RecordId) -> Result<()> {
        let mut guard = self.bpm.new_page()?;
        let root_id = guard.page_id();
        {
            let mut leaf = LeafPage::new(guard.data_mut());
            leaf.init(root_id, INVALID_PAGE_ID);
            if let Some(max) = self.leaf_max_size {
                leaf.set_max_size(max);
            }
            leaf.insert(key, value, &self.comparator);
        }
        drop(guard);

        self.root_page_id = root_id;
        self.sync_root_to_header()
    }

    /// Splits an over-full leaf: the upper half moves to a fresh right
    /// sibling, the sibling chain is relinked, and the right node's
    /// first key goes up to the parent.
    fn split_leaf(&mut self, leaf_id: PageId, mut left_guard: WritePageGuard) -> Result<()> {
        let mut right_guard = self.bpm.new_page()?;
        let right_id = right_guard.page_id();

        let (separator, parent_id) = {
            let mut left = LeafPage::new(left_guard.data_mut());
            let mut right = LeafPage::new(right_guard.data_mut());
            right.init(right_id, left.parent_page_id());
            if let Some(max) = self.leaf_max_size {
                right.set_max_size(max);
            }
            left.move_half_to(&mut right);
            right.set_next_page_id(left.next_page_id());
            left.set_next_page_id(right_id);
            (right.key_at(0), left.parent_page_id())
        };
        drop(left_guard);
        drop(right_guard);
        log::debug!("split leaf {} into {}", leaf_id, right_id);

        self.insert_into_parent(leaf_id, &separator, right_id, parent_id)
    }

    /// Installs the separator for a freshly split pair into the
    /// parent, growing a new root or splitting the parent in turn as
    /// needed.
    fn insert_into_parent(
        &mut self,
        left_id: PageId,
        separator: &IndexKey,
        right_id: PageId,
        parent_id: PageId,
    ) -> Result<()> {
        if parent_id == INVALID_PAGE_ID {
            let mut root_guard = self.bpm.new_page()?;
            let root_id = root_guard.page_id();
            {
                let mut root = InternalPage::new(root_guard.data_mut());
                root.init(root_id, INVALID_PAGE_ID);
                if let Some(max) = self.internal_max_size {
                    root.set_max_size(max);
                }
                root.populate_new_root(left_id, separator, right_id);
            }
            drop(root_guard);

            self.set_parent_of(left_id, root_id)?;
            self.set_parent_of(right_id, root_id)?;
            self.root_page_id = root_id;
            log::debug!("grew new root {} over {} and {}", root_id, left_id, right_id);
            return self.sync_root_to_header();
        }

        let mut parent_guard = self.bpm.fetch_page_write(parent_id)?;
        let overflow = {
            let mut parent = InternalPage::new(parent_guard.data_mut());
            parent.insert_after(left_id, separator, right_id) > parent.max_size()
        };
        if !overflow {
            return Ok(());
        }

        // Split the parent and push its median further up
        let mut right_guard = self.bpm.new_page()?;
        let new_internal_id = right_guard.page_id();
        let (median, moved_children, grandparent_id) = {
            let mut parent = InternalPage::new(parent_guard.data_mut());
            let mut right = InternalPage::new(right_guard.data_mut());
            right.init(new_internal_id, parent.parent_page_id());
            if let Some(max) = self.internal_max_size {
                right.set_max_size(max);
            }
            let (median, moved) = parent.move_half_to(&mut right);
            (median, moved, parent.parent_page_id())
        };
        drop(parent_guard);
        drop(right_guard);
        log::debug!("split internal {} into {}", parent_id, new_internal_id);

        for child in moved_children {
            self.set_parent_of(child, new_internal_id)?;
        }
        self.insert_into_parent(parent_id, &median, new_internal_id, grandparent_id)
    }

    /// Restores the minimum-occupancy invariant for an underfull
    /// non-root node by borrowing from or merging with an adjacent
    /// sibling under the same parent.
    fn coalesce_or_redistribute(&mut self, node_id: PageId) -> Result<()> {
        let parent_id = {
            let guard = self.bpm.fetch_page_read(node_id)?;
            match node_kind(guard.data()) {
                Some(NodeKind::Leaf) => LeafPageRef::new(guard.data()).parent_page_id(),
                Some(NodeKind::Internal) => {
                    InternalPageRef::new(guard.data()).parent_page_id()
                }
                None => {
                    return Err(SiltError::IndexCorrupted(format!(
                        "page {} is not a tree node",
                        node_id
                    )))
                }
            }
        };
        if parent_id == INVALID_PAGE_ID {
            return Ok(());
        }

        let mut parent_guard = self.bpm.fetch_page_write(parent_id)?;
        let (node_index, sibling_index, sibling_id) = {
            let parent = InternalPageRef::new(parent_guard.data());
            if parent.size() < 2 {
                return Ok(());
            }
            let node_index = parent.value_index(node_id).ok_or_else(|| {
                SiltError::IndexCorrupted(format!(
                    "page {} missing from its parent {}",
                    node_id, parent_id
                ))
            })?;
            // The right sibling, unless this is the last child
            let sibling_index = if node_index == parent.size() as usize - 1 {
                node_index - 1
            } else {
                node_index + 1
            };
            (node_index, sibling_index, parent.value_at(sibling_index))
        };

        let mut node_guard = self.bpm.fetch_page_write(node_id)?;
        let mut sibling_guard = self.bpm.fetch_page_write(sibling_id)?;
        let kind = node_kind(node_guard.data()).ok_or_else(|| {
            SiltError::IndexCorrupted(format!("page {} is not a tree node", node_id))
        })?;

        let (node_size, sibling_size, node_max) = match kind {
            NodeKind::Leaf => {
                let node = LeafPageRef::new(node_guard.data());
                let sibling = LeafPageRef::new(sibling_guard.data());
                (node.size(), sibling.size(), node.max_size())
            }
            NodeKind::Internal => {
                let node = InternalPageRef::new(node_guard.data());
                let sibling = InternalPageRef::new(sibling_guard.data());
                (node.size(), sibling.size(), node.max_size())
            }
        };

        if node_size + sibling_size > node_max {
            // Redistribute: move one entry from the sibling over and
            // patch the separator between the two in the parent.
            let moved_child = {
                let mut parent = InternalPage::new(parent_guard.data_mut());
                match kind {
                    NodeKind::Leaf => {
                        let mut node = LeafPage::new(node_guard.data_mut());
                        let mut sibling = LeafPage::new(sibling_guard.data_mut());
                        if sibling_index > node_index {
                            let new_sep = sibling.move_first_to_end_of(&mut node);
                            parent.set_key_at(sibling_index, &new_sep);
                        } else {
                            let moved = sibling.move_last_to_front_of(&mut node);
                            parent.set_key_at(node_index, &moved);
                        }
                        None
                    }
                    NodeKind::Internal => {
                        let mut node = InternalPage::new(node_guard.data_mut());
                        let mut sibling = InternalPage::new(sibling_guard.data_mut());
                        if sibling_index > node_index {
                            let middle = parent.key_at(sibling_index);
                            let (new_sep, moved) =
                                sibling.move_first_to_end_of(&mut node, &middle);
                            parent.set_key_at(sibling_index, &new_sep);
                            Some(moved)
                        } else {
                            let middle = parent.key_at(node_index);
                            let (new_sep, moved) =
                                sibling.move_last_to_front_of(&mut node, &middle);
                            parent.set_key_at(node_index, &new_sep);
                            Some(moved)
                        }
                    }
                }
            };
            drop(node_guard);
            drop(sibling_guard);
            drop(parent_guard);

            // A relocated child now answers to the node it moved into
            if let Some(child) = moved_child {
                self.set_parent_of(child, node_id)?;
            }
            return Ok(());
        }

        // Coalesce: fold the right node of the pair into the left one
        // and drop the separator that kept them apart.
        let (left_id, right_id, right_index) = if sibling_index < node_index {
            (sibling_id, node_id, node_index)
        } else {
            (node_id, sibling_id, sibling_index)
        };

        let (moved_children, parent_size, parent_parent_id, parent_min) = {
            let (left_guard, right_guard) = if sibling_index < node_index {
                (&mut sibling_guard, &mut node_guard)
            } else {
                (&mut node_guard, &mut sibling_guard)
            };
            let mut parent = InternalPage::new(parent_guard.data_mut());
            let moved = match kind {
                NodeKind::Leaf => {
                    let mut left = LeafPage::new(left_guard.data_mut());
                    let mut right = LeafPage::new(right_guard.data_mut());
                    right.move_all_to(&mut left);
                    Vec::new()
                }
                NodeKind::Internal => {
                    let middle = parent.key_at(right_index);
                    let mut left = InternalPage::new(left_guard.data_mut());
                    let mut right = InternalPage::new(right_guard.data_mut());
                    right.move_all_to(&mut left, &middle)
                }
            };
            parent.remove(right_index);
            (
                moved,
                parent.size(),
                parent.parent_page_id(),
                parent.min_size(),
            )
        };
        drop(node_guard);
        drop(sibling_guard);
        drop(parent_guard);

        for child in moved_children {
            self.set_parent_of(child, left_id)?;
        }
        self.bpm.delete_page(right_id)?;
        log::debug!("coalesced {} into {}", right_id, left_id);

        if parent_parent_id == INVALID_PAGE_ID {
            // A root left with a single child hands the tree down
            if parent_size == 1 && parent_id == self.root_page_id {
                self.collapse_root(parent_id)?;
            }
        } else if parent_size < parent_min {
            self.coalesce_or_redistribute(parent_id)?;
        }
        Ok(())
    }

    fn collapse_root(&mut self, old_root_id: PageId) -> Result<()> {
        let new_root_id = {
            let guard = self.bpm.fetch_page_read(old_root_id)?;
            InternalPageRef::new(guard.data()).value_at(0)
        };

        self.set_parent_of(new_root_id, INVALID_PAGE_ID)?;
        self.bpm.delete_page(old_root_id)?;
        self.root_page_id = new_root_id;
        log::debug!("root collapsed: {} -> {}", old_root_id, new_root_id);
        self.sync_root_to_header()
    }

    fn set_parent_of(&self, page_id: PageId, parent_id: PageId) -> Result<()> {
        let mut guard = self.bpm.fetch_page_write(page_id)?;
        match node_kind(guard.data()) {
            Some(NodeKind::Leaf) => {
                LeafPage::new(guard.data_mut()).set_parent_page_id(parent_id)
            }
            Some(NodeKind::Internal) => {
                InternalPage::new(guard.data_mut()).set_parent_page_id(parent_id)
            }
            None => {
                return Err(SiltError::IndexCorrupted(format!(
                    "page {} is not a tree node",
                    page_id
                )))
            }
        }
        Ok(())
    }

    /// Records the current root page id in the header catalog.
    fn sync_root_to_header(&self) -> Result<()> {
        let mut guard = self.bpm.fetch_page_write(HEADER_PAGE_ID)?;
        let mut header = HeaderPage::new(guard.data_mut());
        if !header.is_valid() {
            header.init();
        }
        if !header.update_record(&self.index_name, self.root_page_id) {
            header.insert_record(&self.index_name, self.root_page_id)?;
        }
        Ok(())
    }
}
