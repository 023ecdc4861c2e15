mod btree;
mod btree_iterator;
mod comparator;
mod context;
mod debug;
mod generic_key;

pub use btree::BPlusTree;
pub use btree_iterator::IndexIterator;
pub use comparator::{DefaultComparator, KeyComparator};
pub use generic_key::GenericKey;
pub use crate::pages::indexes::b_plus_tree::Rid;
