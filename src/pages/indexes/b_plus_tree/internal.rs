use super::{PageType, TreePage, TREE_PAGE_HEADER_SIZE};
use crate::errors::Error;
use crate::indexes::b_plus_tree::KeyComparator;
use crate::pages::traits::{read_at, write_at, Storable};
use crate::pages::PageId;
use anyhow::Result;
use std::cmp::Ordering;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};

/// Internal page: `(key, child page id)` slots. Slot 0's key is never compared,
/// its child covers everything below `key_at(1)`; child `i` covers
/// `[key_at(i), key_at(i + 1))`.
///
///  | HEADER | KEY(0) + CHILD(0) | KEY(1) + CHILD(1) | ... | KEY(n-1) + CHILD(n-1) |
pub struct InternalPage<B, K> {
    page: TreePage<B>,
    _marker: PhantomData<K>,
}

impl<B, K> Deref for InternalPage<B, K> {
    type Target = TreePage<B>;

    fn deref(&self) -> &Self::Target {
        &self.page
    }
}

impl<B, K> DerefMut for InternalPage<B, K> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.page
    }
}

impl<B, K> InternalPage<B, K>
where
    B: Deref<Target = [u8]>,
    K: Storable,
{
    const SLOT_SIZE: usize = K::SIZE + PageId::SIZE;

    pub fn new(data: B) -> Result<Self> {
        let page = TreePage::new(data);
        page.expect_type(PageType::Internal)?;
        Ok(Self {
            page,
            _marker: PhantomData,
        })
    }

    fn slot_offset(index: usize) -> usize {
        TREE_PAGE_HEADER_SIZE + index * Self::SLOT_SIZE
    }

    pub fn key_at(&self, index: usize) -> K {
        assert!(index < self.size(), "internal slot {index} out of bounds");
        read_at(self.page.bytes(), Self::slot_offset(index))
    }

    pub fn value_at(&self, index: usize) -> PageId {
        assert!(index < self.size(), "internal slot {index} out of bounds");
        read_at(self.page.bytes(), Self::slot_offset(index) + K::SIZE)
    }

    pub fn value_index(&self, child: PageId) -> Option<usize> {
        (0..self.size()).find(|&i| self.value_at(i) == child)
    }

    /// Child whose range covers `key`: the greatest slot `i >= 1` with
    /// `key_at(i) <= key`, or slot 0.
    pub fn lookup(&self, key: &K, comparator: &impl KeyComparator<K>) -> PageId {
        assert!(self.size() > 0, "lookup on empty internal page");
        let (mut lo, mut hi) = (1, self.size());
        while lo < hi {
            let mid = (lo + hi) / 2;
            if comparator.compare(&self.key_at(mid), key) == Ordering::Greater {
                hi = mid;
            } else {
                lo = mid + 1;
            }
        }
        self.value_at(lo - 1)
    }
}

impl<B, K> InternalPage<B, K>
where
    B: DerefMut<Target = [u8]>,
    K: Storable,
{
    /// Formats `data` as an empty internal page.
    pub fn init(data: B, page_id: PageId, parent_id: PageId, max_size: usize) -> Self {
        let mut page = TreePage::new(data);
        page.init(PageType::Internal, page_id, parent_id, max_size);
        Self {
            page,
            _marker: PhantomData,
        }
    }

    pub fn set_key_at(&mut self, index: usize, key: &K) {
        assert!(index < self.size(), "internal slot {index} out of bounds");
        write_at(self.page.bytes_mut(), Self::slot_offset(index), *key);
    }

    pub fn set_value_at(&mut self, index: usize, child: PageId) {
        assert!(index < self.size(), "internal slot {index} out of bounds");
        write_at(self.page.bytes_mut(), Self::slot_offset(index) + K::SIZE, child);
    }

    fn set_item(&mut self, index: usize, key: &K, child: PageId) {
        self.set_key_at(index, key);
        self.set_value_at(index, child);
    }

    fn shift(&mut self, from: usize, delta: isize) {
        let size = self.size();
        let start = Self::slot_offset(from);
        let end = Self::slot_offset(size);
        let dest = (start as isize + delta * Self::SLOT_SIZE as isize) as usize;
        self.page.bytes_mut().copy_within(start..end, dest);
    }

    fn push_back(&mut self, key: &K, child: PageId) {
        let size = self.size();
        self.set_size(size + 1);
        self.set_item(size, key, child);
    }

    /// Fills a fresh root after the old root split into `old_child` and `new_child`.
    pub fn populate_new_root(&mut self, old_child: PageId, key: &K, new_child: PageId) {
        assert_eq!(self.size(), 0);
        self.set_size(2);
        self.set_value_at(0, old_child);
        self.set_item(1, key, new_child);
    }

    /// Inserts `(key, new_child)` right after the slot pointing at `old_child`.
    /// Returns the new size.
    pub fn insert_node_after(
        &mut self,
        old_child: PageId,
        key: &K,
        new_child: PageId,
    ) -> Result<usize> {
        let index = self.value_index(old_child).ok_or_else(|| {
            Error::Internal(format!(
                "page {old_child} is not a child of page {}",
                self.get_page_id()
            ))
        })?;
        let size = self.size();
        assert!(
            Self::slot_offset(size + 1) <= self.page.bytes().len(),
            "internal page {} is out of slots",
            self.get_page_id()
        );

        self.shift(index + 1, 1);
        self.set_size(size + 1);
        self.set_item(index + 1, key, new_child);
        Ok(size + 1)
    }

    pub fn remove(&mut self, index: usize) {
        assert!(index < self.size(), "internal slot {index} out of bounds");
        self.shift(index + 1, -1);
        let size = self.size();
        self.set_size(size - 1);
    }

    /// Empties a root that is left with one child and returns that child.
    pub fn remove_and_return_only_child(&mut self) -> PageId {
        assert_eq!(self.size(), 1);
        let child = self.value_at(0);
        self.set_size(0);
        child
    }

    /// Split: moves slots `[min_size, size)` into the empty `recipient`.
    /// `recipient.key_at(0)` then holds the separator to push up.
    /// The caller re-parents the moved children.
    pub fn move_half_to<R>(&mut self, recipient: &mut InternalPage<R, K>)
    where
        R: DerefMut<Target = [u8]>,
    {
        assert_eq!(recipient.size(), 0);
        let size = self.size();
        let split = self.min_size().min(size);

        for index in split..size {
            recipient.push_back(&self.key_at(index), self.value_at(index));
        }
        self.set_size(split);
    }

    /// Merge: appends every slot onto the left neighbour `recipient`. The parent's
    /// separator `middle_key` becomes the key of the first moved slot.
    /// The caller re-parents the moved children.
    pub fn move_all_to<R>(&mut self, recipient: &mut InternalPage<R, K>, middle_key: &K)
    where
        R: DerefMut<Target = [u8]>,
    {
        let size = self.size();
        for index in 0..size {
            let key = if index == 0 {
                *middle_key
            } else {
                self.key_at(index)
            };
            recipient.push_back(&key, self.value_at(index));
        }
        self.set_size(0);
    }

    /// Redistribute: moves the first child to the end of the left neighbour under
    /// `middle_key`. Returns the moved child; `key_at(0)` afterwards is the new
    /// separator for the parent.
    pub fn move_first_to_end_of<R>(
        &mut self,
        recipient: &mut InternalPage<R, K>,
        middle_key: &K,
    ) -> PageId
    where
        R: DerefMut<Target = [u8]>,
    {
        let child = self.value_at(0);
        recipient.push_back(middle_key, child);
        self.shift(1, -1);
        let size = self.size();
        self.set_size(size - 1);
        child
    }

    /// Redistribute: moves the last child to the front of the right neighbour,
    /// whose old first child now sits under `middle_key`. Returns the moved child;
    /// `recipient.key_at(0)` afterwards is the new separator for the parent.
    pub fn move_last_to_front_of<R>(
        &mut self,
        recipient: &mut InternalPage<R, K>,
        middle_key: &K,
    ) -> PageId
    where
        R: DerefMut<Target = [u8]>,
    {
        let last = self.size() - 1;
        let (key, child) = (self.key_at(last), self.value_at(last));
        self.set_size(last);

        recipient.shift(0, 1);
        let size = recipient.size();
        recipient.set_size(size + 1);
        recipient.set_key_at(1, middle_key);
        recipient.set_item(0, &key, child);
        child
    }
}
