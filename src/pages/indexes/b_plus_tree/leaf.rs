use super::{PageType, TreePage, TREE_PAGE_HEADER_SIZE};
use crate::indexes::b_plus_tree::KeyComparator;
use crate::pages::traits::{read_at, write_at, Storable};
use crate::pages::PageId;
use anyhow::Result;
use std::cmp::Ordering;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};

/// Leaf page: sorted, unique `(key, value)` slots plus a link to the next leaf.
///
///  | HEADER | KEY(0) + VALUE(0) | KEY(1) + VALUE(1) | ... | KEY(n-1) + VALUE(n-1) |
pub struct LeafPage<B, K, V> {
    page: TreePage<B>,
    _marker: PhantomData<(K, V)>,
}

impl<B, K, V> Deref for LeafPage<B, K, V> {
    type Target = TreePage<B>;

    fn deref(&self) -> &Self::Target {
        &self.page
    }
}

impl<B, K, V> DerefMut for LeafPage<B, K, V> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.page
    }
}

impl<B, K, V> LeafPage<B, K, V>
where
    B: Deref<Target = [u8]>,
    K: Storable,
    V: Storable,
{
    const SLOT_SIZE: usize = K::SIZE + V::SIZE;

    pub fn new(data: B) -> Result<Self> {
        let page = TreePage::new(data);
        page.expect_type(PageType::Leaf)?;
        Ok(Self {
            page,
            _marker: PhantomData,
        })
    }

    fn slot_offset(index: usize) -> usize {
        TREE_PAGE_HEADER_SIZE + index * Self::SLOT_SIZE
    }

    pub fn get_next_page_id(&self) -> PageId {
        self.page.get_next_id()
    }

    pub fn key_at(&self, index: usize) -> K {
        assert!(index < self.size(), "leaf slot {index} out of bounds");
        read_at(self.page.bytes(), Self::slot_offset(index))
    }

    pub fn value_at(&self, index: usize) -> V {
        assert!(index < self.size(), "leaf slot {index} out of bounds");
        read_at(self.page.bytes(), Self::slot_offset(index) + K::SIZE)
    }

    pub fn get_item(&self, index: usize) -> (K, V) {
        (self.key_at(index), self.value_at(index))
    }

    /// First slot whose key is `>= key`, `size()` if there is none.
    pub fn key_index(&self, key: &K, comparator: &impl KeyComparator<K>) -> usize {
        let (mut lo, mut hi) = (0, self.size());
        while lo < hi {
            let mid = (lo + hi) / 2;
            if comparator.compare(&self.key_at(mid), key) == Ordering::Less {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        lo
    }

    pub fn lookup(&self, key: &K, comparator: &impl KeyComparator<K>) -> Option<V> {
        let index = self.key_index(key, comparator);
        if index < self.size() && comparator.compare(&self.key_at(index), key) == Ordering::Equal {
            Some(self.value_at(index))
        } else {
            None
        }
    }
}

impl<B, K, V> LeafPage<B, K, V>
where
    B: DerefMut<Target = [u8]>,
    K: Storable,
    V: Storable,
{
    /// Formats `data` as an empty leaf.
    pub fn init(data: B, page_id: PageId, parent_id: PageId, max_size: usize) -> Self {
        let mut page = TreePage::new(data);
        page.init(PageType::Leaf, page_id, parent_id, max_size);
        Self {
            page,
            _marker: PhantomData,
        }
    }

    pub fn set_next_page_id(&mut self, next_page_id: PageId) {
        self.page.set_next_id(next_page_id);
    }

    fn set_item(&mut self, index: usize, key: &K, value: &V) {
        let offset = Self::slot_offset(index);
        write_at(self.page.bytes_mut(), offset, *key);
        write_at(self.page.bytes_mut(), offset + K::SIZE, *value);
    }

    /// Moves slots `[from, size)` by `delta` slots, left if negative.
    fn shift(&mut self, from: usize, delta: isize) {
        let size = self.size();
        let start = Self::slot_offset(from);
        let end = Self::slot_offset(size);
        let dest = (start as isize + delta * Self::SLOT_SIZE as isize) as usize;
        self.page.bytes_mut().copy_within(start..end, dest);
    }

    /// Inserts in key order. Returns false, leaving the page untouched, if the key exists.
    pub fn insert(&mut self, key: &K, value: &V, comparator: &impl KeyComparator<K>) -> bool {
        let size = self.size();
        let index = self.key_index(key, comparator);
        if index < size && comparator.compare(&self.key_at(index), key) == Ordering::Equal {
            return false;
        }
        assert!(
            Self::slot_offset(size + 1) <= self.page.bytes().len(),
            "leaf page {} is out of slots",
            self.get_page_id()
        );

        self.shift(index, 1);
        self.set_size(size + 1);
        self.set_item(index, key, value);
        true
    }

    /// Returns false if the key was not found.
    pub fn remove(&mut self, key: &K, comparator: &impl KeyComparator<K>) -> bool {
        let index = self.key_index(key, comparator);
        if index >= self.size() || comparator.compare(&self.key_at(index), key) != Ordering::Equal
        {
            return false;
        }
        self.shift(index + 1, -1);
        let size = self.size();
        self.set_size(size - 1);
        true
    }

    fn push_back(&mut self, key: &K, value: &V) {
        let size = self.size();
        self.set_size(size + 1);
        self.set_item(size, key, value);
    }

    fn push_front(&mut self, key: &K, value: &V) {
        self.shift(0, 1);
        let size = self.size();
        self.set_size(size + 1);
        self.set_item(0, key, value);
    }

    /// Split: moves the upper half into the empty `recipient` and links it
    /// in right after this page.
    pub fn move_half_to<R>(&mut self, recipient: &mut LeafPage<R, K, V>)
    where
        R: DerefMut<Target = [u8]>,
    {
        assert_eq!(recipient.size(), 0);
        let size = self.size();
        let split = self.max_size().div_ceil(2).min(size);

        for index in split..size {
            let (key, value) = self.get_item(index);
            recipient.push_back(&key, &value);
        }
        self.set_size(split);

        recipient.set_next_page_id(self.get_next_page_id());
        self.set_next_page_id(recipient.get_page_id());
    }

    /// Merge: appends every slot onto `recipient`, which must be the left neighbour,
    /// and hands it this page's place in the leaf chain.
    pub fn move_all_to<R>(&mut self, recipient: &mut LeafPage<R, K, V>)
    where
        R: DerefMut<Target = [u8]>,
    {
        for index in 0..self.size() {
            let (key, value) = self.get_item(index);
            recipient.push_back(&key, &value);
        }
        recipient.set_next_page_id(self.get_next_page_id());
        self.set_size(0);
    }

    /// Redistribute: moves this page's first slot to the end of its left neighbour.
    pub fn move_first_to_end_of<R>(&mut self, recipient: &mut LeafPage<R, K, V>)
    where
        R: DerefMut<Target = [u8]>,
    {
        let (key, value) = self.get_item(0);
        self.shift(1, -1);
        let size = self.size();
        self.set_size(size - 1);
        recipient.push_back(&key, &value);
    }

    /// Redistribute: moves this page's last slot to the front of its right neighbour.
    pub fn move_last_to_front_of<R>(&mut self, recipient: &mut LeafPage<R, K, V>)
    where
        R: DerefMut<Target = [u8]>,
    {
        let last = self.size() - 1;
        let (key, value) = self.get_item(last);
        self.set_size(last);
        recipient.push_front(&key, &value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexes::b_plus_tree::DefaultComparator;
    use crate::pages::{PageData, INVALID_PAGE, PAGE_SIZE};

    type Leaf<'a> = LeafPage<&'a mut [u8], i64, i64>;

    fn keys<B: Deref<Target = [u8]>>(leaf: &LeafPage<B, i64, i64>) -> Vec<i64> {
        (0..leaf.size()).map(|i| leaf.key_at(i)).collect()
    }

    #[test]
    fn test_insert_keeps_order_and_rejects_duplicates() {
        let mut data: PageData = [0; PAGE_SIZE];
        let mut leaf = Leaf::init(&mut data[..], 1, INVALID_PAGE, 8);

        for key in [5, 1, 3, 4, 2] {
            assert!(leaf.insert(&key, &(key * 10), &DefaultComparator));
        }
        assert!(!leaf.insert(&3, &0, &DefaultComparator));

        assert_eq!(keys(&leaf), vec![1, 2, 3, 4, 5]);
        assert_eq!(leaf.lookup(&3, &DefaultComparator), Some(30));
        assert_eq!(leaf.lookup(&6, &DefaultComparator), None);
        assert_eq!(leaf.key_index(&0, &DefaultComparator), 0);
        assert_eq!(leaf.key_index(&6, &DefaultComparator), 5);
    }

    #[test]
    fn test_remove() {
        let mut data: PageData = [0; PAGE_SIZE];
        let mut leaf = Leaf::init(&mut data[..], 1, INVALID_PAGE, 8);
        for key in 1..=4 {
            leaf.insert(&key, &key, &DefaultComparator);
        }

        assert!(leaf.remove(&2, &DefaultComparator));
        assert!(!leaf.remove(&2, &DefaultComparator));
        assert_eq!(keys(&leaf), vec![1, 3, 4]);
        assert_eq!(leaf.value_at(1), 3);
    }

    #[test]
    fn test_split_relinks_chain() {
        let mut left_data: PageData = [0; PAGE_SIZE];
        let mut right_data: PageData = [0; PAGE_SIZE];
        let mut left = Leaf::init(&mut left_data[..], 1, INVALID_PAGE, 4);
        left.set_next_page_id(9);
        for key in 1..=4 {
            left.insert(&key, &key, &DefaultComparator);
        }

        let mut right = Leaf::init(&mut right_data[..], 2, INVALID_PAGE, 4);
        left.move_half_to(&mut right);

        assert_eq!(keys(&left), vec![1, 2]);
        assert_eq!(keys(&right), vec![3, 4]);
        assert_eq!(left.get_next_page_id(), 2);
        assert_eq!(right.get_next_page_id(), 9);
    }

    #[test]
    fn test_merge_and_redistribute() {
        let mut left_data: PageData = [0; PAGE_SIZE];
        let mut right_data: PageData = [0; PAGE_SIZE];
        let mut left = Leaf::init(&mut left_data[..], 1, INVALID_PAGE, 6);
        let mut right = Leaf::init(&mut right_data[..], 2, INVALID_PAGE, 6);
        left.set_next_page_id(2);
        right.set_next_page_id(7);
        for key in 1..=3 {
            left.insert(&key, &key, &DefaultComparator);
        }
        for key in 4..=6 {
            right.insert(&key, &key, &DefaultComparator);
        }

        left.move_last_to_front_of(&mut right);
        assert_eq!(keys(&left), vec![1, 2]);
        assert_eq!(keys(&right), vec![3, 4, 5, 6]);

        right.move_first_to_end_of(&mut left);
        assert_eq!(keys(&left), vec![1, 2, 3]);
        assert_eq!(keys(&right), vec![4, 5, 6]);

        right.move_all_to(&mut left);
        assert_eq!(keys(&left), vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(right.size(), 0);
        assert_eq!(left.get_next_page_id(), 7);
    }
}
