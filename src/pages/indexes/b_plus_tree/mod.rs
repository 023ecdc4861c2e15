pub mod internal;
pub mod leaf;
pub mod leaf_value;

use crate::errors::Error;
use crate::pages::traits::{read_at, write_at, Storable};
use crate::pages::{PageId, INVALID_PAGE, PAGE_SIZE};
use anyhow::Result;
use std::ops::{Deref, DerefMut};

pub use internal::InternalPage;
pub use leaf::LeafPage;
pub use leaf_value::Rid;

// Header layout, shared between leaves and internal pages:
//  | page type (4) | size (4) | max size (4) | parent id (8) | page id (8) | next id (8) |
// next id is only meaningful for leaves.
const PAGE_TYPE_OFFSET: usize = 0;
const SIZE_OFFSET: usize = 4;
const MAX_SIZE_OFFSET: usize = 8;
const PARENT_OFFSET: usize = 12;
const PAGE_ID_OFFSET: usize = 20;
const NEXT_OFFSET: usize = 28;
pub const TREE_PAGE_HEADER_SIZE: usize = 36;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum PageType {
    /// new empty pages (all zeroes) will automatically
    /// be read as this variant
    Invalid = 0,
    Leaf = 1,
    Internal = 2,
}

impl From<u32> for PageType {
    fn from(value: u32) -> Self {
        match value {
            1 => PageType::Leaf,
            2 => PageType::Internal,
            _ => PageType::Invalid,
        }
    }
}

/// Maximum number of (key, value) slots a leaf page can physically hold.
pub fn leaf_capacity<K: Storable, V: Storable>() -> usize {
    (PAGE_SIZE - TREE_PAGE_HEADER_SIZE) / (K::SIZE + V::SIZE)
}

/// Maximum number of (key, child) slots an internal page can physically hold.
pub fn internal_capacity<K: Storable>() -> usize {
    (PAGE_SIZE - TREE_PAGE_HEADER_SIZE) / (K::SIZE + PageId::SIZE)
}

/// Header accessors common to every tree page.
pub struct TreePage<B> {
    data: B,
}

impl<B: Deref<Target = [u8]>> TreePage<B> {
    pub fn new(data: B) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        Self { data }
    }

    pub fn get_page_type(&self) -> PageType {
        PageType::from(read_at::<u32>(&self.data, PAGE_TYPE_OFFSET))
    }

    pub fn is_leaf(&self) -> bool {
        self.get_page_type() == PageType::Leaf
    }

    pub fn is_root(&self) -> bool {
        self.get_parent_page_id() == INVALID_PAGE
    }

    pub fn size(&self) -> usize {
        read_at::<u32>(&self.data, SIZE_OFFSET) as usize
    }

    pub fn max_size(&self) -> usize {
        read_at::<u32>(&self.data, MAX_SIZE_OFFSET) as usize
    }

    /// Leaves split on reaching `max_size`, internal pages on exceeding it,
    /// hence the different floors.
    pub fn min_size(&self) -> usize {
        match self.get_page_type() {
            PageType::Internal => self.max_size().div_ceil(2),
            _ => self.max_size() / 2,
        }
    }

    pub fn get_parent_page_id(&self) -> PageId {
        read_at(&self.data, PARENT_OFFSET)
    }

    pub fn get_page_id(&self) -> PageId {
        read_at(&self.data, PAGE_ID_OFFSET)
    }

    fn get_next_id(&self) -> PageId {
        read_at(&self.data, NEXT_OFFSET)
    }

    fn bytes(&self) -> &[u8] {
        &self.data
    }

    fn expect_type(&self, expected: PageType) -> Result<()> {
        let actual = self.get_page_type();
        if actual != expected {
            return Err(Error::PageTypeMismatch {
                page_id: self.get_page_id(),
                expected,
                actual,
            }
            .into());
        }
        Ok(())
    }
}

impl<B: DerefMut<Target = [u8]>> TreePage<B> {
    fn init(&mut self, page_type: PageType, page_id: PageId, parent_id: PageId, max_size: usize) {
        write_at(&mut self.data, PAGE_TYPE_OFFSET, page_type as u32);
        self.set_size(0);
        write_at(&mut self.data, MAX_SIZE_OFFSET, max_size as u32);
        self.set_parent_page_id(parent_id);
        write_at(&mut self.data, PAGE_ID_OFFSET, page_id);
        self.set_next_id(INVALID_PAGE);
    }

    pub fn set_size(&mut self, size: usize) {
        write_at(&mut self.data, SIZE_OFFSET, size as u32);
    }

    pub fn set_parent_page_id(&mut self, parent_id: PageId) {
        write_at(&mut self.data, PARENT_OFFSET, parent_id);
    }

    fn set_next_id(&mut self, next_id: PageId) {
        write_at(&mut self.data, NEXT_OFFSET, next_id);
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

/// A tree page viewed through the type tag in its header.
pub enum TreePageView<B, K, V> {
    Leaf(LeafPage<B, K, V>),
    Internal(InternalPage<B, K>),
}

impl<B, K, V> TreePageView<B, K, V>
where
    B: Deref<Target = [u8]>,
    K: Storable,
    V: Storable,
{
    pub fn new(data: B) -> Result<Self> {
        let page = TreePage::new(data);
        match page.get_page_type() {
            PageType::Leaf => Ok(TreePageView::Leaf(LeafPage::new(page.data)?)),
            PageType::Internal => Ok(TreePageView::Internal(InternalPage::new(page.data)?)),
            PageType::Invalid => Err(Error::PageTypeMismatch {
                page_id: page.get_page_id(),
                expected: PageType::Leaf,
                actual: PageType::Invalid,
            }
            .into()),
        }
    }
}
