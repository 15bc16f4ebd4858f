pub mod btree_index;
pub mod btree_iterator;
pub mod btree_page;
pub mod internal_page;
pub mod key;
pub mod leaf_page;

pub use btree_index::BPlusTree;
pub use btree_iterator::BTreeIterator;
pub use btree_page::{node_kind, NodeKind};
pub use internal_page::{InternalPage, InternalPageRef};
pub use key::{BytewiseComparator, IndexKey, IntegerComparator, KeyComparator};
pub use leaf_page::{LeafPage, LeafPageRef};
