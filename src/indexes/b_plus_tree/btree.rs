use super::btree_iterator::IndexIterator;
use super::comparator::{DefaultComparator, KeyComparator};
use super::context::Context;
use crate::buffer_pool::{ArcBufferPool, ReadPageGuard, WritePageGuard};
use crate::config::HEADER_PAGE_ID;
use crate::errors::Error;
use crate::pages::header_page::HeaderPage;
use crate::pages::indexes::b_plus_tree::{
    internal_capacity, leaf_capacity, InternalPage, LeafPage, TreePage,
};
use crate::pages::traits::Storable;
use crate::pages::{PageId, INVALID_PAGE};
use crate::printdbg;
use anyhow::Result;
use parking_lot::Mutex;
use std::marker::PhantomData;
use std::ops::Deref;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Insert,
    Delete,
}

/// Concurrent B+ tree over pages of the buffer pool, with unique keys.
///
/// Readers crab down with shared latches, holding at most two pages at a time.
/// Writers keep every unsafe ancestor write latched (and the root lock) until
/// they reach a page the operation can't propagate out of.
/// The root page id is persisted in the header page under `index_name`.
pub struct BPlusTree<K, V, C = DefaultComparator> {
    index_name: String,
    root_page_id: Mutex<PageId>,
    pub(super) bpm: ArcBufferPool,
    pub(super) comparator: C,
    leaf_max_size: usize,
    internal_max_size: usize,
    _marker: PhantomData<(K, V)>,
}

impl<K, V, C> BPlusTree<K, V, C>
where
    K: Storable,
    V: Storable,
    C: KeyComparator<K>,
{
    /// Opens the index called `index_name`, picking up its root from the header
    /// page if it was persisted before.
    pub fn new(
        index_name: impl Into<String>,
        bpm: ArcBufferPool,
        comparator: C,
        leaf_max_size: usize,
        internal_max_size: usize,
    ) -> Result<Self> {
        if !(2..=leaf_capacity::<K, V>()).contains(&leaf_max_size) {
            return Err(Error::Unsupported(format!(
                "leaf max size {leaf_max_size} must be between 2 and {}",
                leaf_capacity::<K, V>()
            ))
            .into());
        }
        // internal pages briefly hold one extra slot before splitting
        if !(3..internal_capacity::<K>()).contains(&internal_max_size) {
            return Err(Error::Unsupported(format!(
                "internal max size {internal_max_size} must be between 3 and {}",
                internal_capacity::<K>() - 1
            ))
            .into());
        }

        let index_name = index_name.into();
        let root_page_id = {
            let header = bpm.fetch_page_read(HEADER_PAGE_ID)?;
            HeaderPage::new(&header[..])
                .get_root_id(&index_name)?
                .unwrap_or(INVALID_PAGE)
        };

        printdbg!("Opened index {} with root {}", index_name, root_page_id);

        Ok(Self {
            index_name,
            root_page_id: Mutex::new(root_page_id),
            bpm,
            comparator,
            leaf_max_size,
            internal_max_size,
            _marker: PhantomData,
        })
    }

    /// Sizes every page to its physical capacity.
    pub fn with_default_sizes(
        index_name: impl Into<String>,
        bpm: ArcBufferPool,
        comparator: C,
    ) -> Result<Self> {
        Self::new(
            index_name,
            bpm,
            comparator,
            leaf_capacity::<K, V>(),
            internal_capacity::<K>() - 1,
        )
    }

    pub fn get_index_name(&self) -> &str {
        &self.index_name
    }

    pub fn get_root_page_id(&self) -> PageId {
        *self.root_page_id.lock()
    }

    pub fn is_empty(&self) -> bool {
        self.get_root_page_id() == INVALID_PAGE
    }

    pub fn get_value(&self, key: &K) -> Result<Option<V>> {
        let Some(leaf) = self.find_leaf_for_read(Some(key))? else {
            return Ok(None);
        };
        Ok(LeafPage::<_, K, V>::new(&leaf[..])?.lookup(key, &self.comparator))
    }

    /// Returns false, changing nothing, if the key is already present.
    pub fn insert(&self, key: &K, value: &V) -> Result<bool> {
        let mut ctx = Context::new(&self.bpm);

        if !self.find_leaf_for_write(key, Operation::Insert, &mut ctx)? {
            self.start_new_tree(key, value, &mut ctx)?;
            ctx.release()?;
            return Ok(true);
        }

        let mut leaf_guard = ctx.pop_leaf()?;
        if LeafPage::<_, K, V>::new(&leaf_guard[..])?
            .lookup(key, &self.comparator)
            .is_some()
        {
            return Ok(false);
        }

        let splits = {
            let leaf = TreePage::new(&leaf_guard[..]);
            !Self::is_safe(&leaf, Operation::Insert)
        };
        if splits {
            // every latched ancestor that isn't safe splits too, and so does
            // the root if its lock is still held
            let uncles = ctx
                .write_set
                .iter()
                .filter(|guard| !Self::is_safe(&TreePage::new(&guard[..]), Operation::Insert))
                .count();
            let new_root = usize::from(ctx.root_guard.is_some());
            ctx.reserve(1 + uncles + new_root)?;
        }

        let mut leaf = LeafPage::<_, K, V>::new(&mut leaf_guard[..])?;
        leaf.insert(key, value, &self.comparator);
        if leaf.size() < leaf.max_size() {
            drop(leaf_guard);
            ctx.release()?;
            return Ok(true);
        }

        let mut sibling_guard = ctx.take_spare()?;
        let sibling_id = sibling_guard.page_id();
        let mut sibling = LeafPage::<_, K, V>::init(
            &mut sibling_guard[..],
            sibling_id,
            leaf.get_parent_page_id(),
            self.leaf_max_size,
        );
        leaf.move_half_to(&mut sibling);
        let separator = sibling.key_at(0);

        printdbg!("Split leaf {} into {}", leaf.get_page_id(), sibling_id);

        self.insert_into_parent(leaf_guard, &separator, sibling_guard, &mut ctx)?;
        ctx.release()?;
        Ok(true)
    }

    /// Returns false if the key was not present.
    pub fn remove(&self, key: &K) -> Result<bool> {
        let mut ctx = Context::new(&self.bpm);

        if !self.find_leaf_for_write(key, Operation::Delete, &mut ctx)? {
            return Ok(false);
        }

        let mut leaf_guard = ctx.pop_leaf()?;
        if LeafPage::<_, K, V>::new(&leaf_guard[..])?
            .lookup(key, &self.comparator)
            .is_none()
        {
            return Ok(false);
        }

        let mut leaf = LeafPage::<_, K, V>::new(&mut leaf_guard[..])?;
        leaf.remove(key, &self.comparator);
        let underflow = if leaf.is_root() {
            leaf.size() == 0
        } else {
            leaf.size() < leaf.min_size()
        };

        if underflow {
            self.coalesce_or_redistribute(leaf_guard, &mut ctx)?;
        } else {
            drop(leaf_guard);
        }
        ctx.release()?;
        Ok(true)
    }

    /// Iterator positioned at the smallest key.
    pub fn begin(&self) -> Result<IndexIterator<'_, K, V>> {
        match self.find_leaf_for_read(None)? {
            Some(leaf) => IndexIterator::new(&self.bpm, leaf.into_pinned(), 0),
            None => Ok(self.end()),
        }
    }

    /// Iterator positioned at the first key `>= key`.
    pub fn begin_at(&self, key: &K) -> Result<IndexIterator<'_, K, V>> {
        match self.find_leaf_for_read(Some(key))? {
            Some(leaf) => {
                let index = LeafPage::<_, K, V>::new(&leaf[..])?.key_index(key, &self.comparator);
                IndexIterator::new(&self.bpm, leaf.into_pinned(), index)
            }
            None => Ok(self.end()),
        }
    }

    pub fn end(&self) -> IndexIterator<'_, K, V> {
        IndexIterator::end(&self.bpm)
    }

    /// Shared-latch descent to the leaf covering `key`, or the leftmost leaf.
    /// None if the tree is empty.
    pub(super) fn find_leaf_for_read(&self, key: Option<&K>) -> Result<Option<ReadPageGuard<'_>>> {
        let root = self.root_page_id.lock();
        if *root == INVALID_PAGE {
            return Ok(None);
        }
        let mut guard = self.bpm.fetch_page_read(*root)?;
        drop(root);

        while !TreePage::new(&guard[..]).is_leaf() {
            let page = InternalPage::<_, K>::new(&guard[..])?;
            let child_id = match key {
                Some(key) => page.lookup(key, &self.comparator),
                None => page.value_at(0),
            };
            // latch the child before letting go of the parent
            guard = self.bpm.fetch_page_read(child_id)?;
        }
        Ok(Some(guard))
    }

    /// Exclusive-latch descent; the leaf ends up on top of `ctx.write_set`.
    /// Returns false if the tree is empty, with the root lock still held.
    fn find_leaf_for_write<'a>(
        &'a self,
        key: &K,
        op: Operation,
        ctx: &mut Context<'a>,
    ) -> Result<bool> {
        let root = self.root_page_id.lock();
        let mut page_id = *root;
        ctx.root_guard = Some(root);
        if page_id == INVALID_PAGE {
            return Ok(false);
        }

        loop {
            let guard = self.bpm.fetch_page_write(page_id)?;
            let page = TreePage::new(&guard[..]);
            let safe = Self::is_safe(&page, op);
            let child_id = if page.is_leaf() {
                None
            } else {
                Some(InternalPage::<_, K>::new(&guard[..])?.lookup(key, &self.comparator))
            };

            if safe {
                ctx.release_ancestors();
            }
            ctx.write_set.push(guard);

            match child_id {
                Some(child_id) => page_id = child_id,
                None => return Ok(true),
            }
        }
    }

    /// Whether `op` on this page is guaranteed not to reach its parent.
    fn is_safe<B: Deref<Target = [u8]>>(page: &TreePage<B>, op: Operation) -> bool {
        match op {
            Operation::Insert if page.is_leaf() => page.size() + 1 < page.max_size(),
            Operation::Insert => page.size() < page.max_size(),
            Operation::Delete if page.is_root() => {
                if page.is_leaf() {
                    page.size() > 1
                } else {
                    page.size() > 2
                }
            }
            Operation::Delete => page.size() > page.min_size(),
        }
    }

    fn start_new_tree(&self, key: &K, value: &V, ctx: &mut Context<'_>) -> Result<()> {
        let mut guard = self.bpm.new_page_guarded()?;
        let page_id = guard.page_id();
        let mut leaf =
            LeafPage::<_, K, V>::init(&mut guard[..], page_id, INVALID_PAGE, self.leaf_max_size);
        leaf.insert(key, value, &self.comparator);
        drop(guard);

        ctx.set_root(page_id)?;
        self.update_root_record(page_id)?;
        printdbg!("Started index {} at page {}", self.index_name, page_id);
        Ok(())
    }

    /// Links a freshly split `new` page into the parent of `old`, splitting
    /// the parent in turn if it overflows.
    fn insert_into_parent<'a>(
        &'a self,
        mut old: WritePageGuard<'a>,
        key: &K,
        mut new: WritePageGuard<'a>,
        ctx: &mut Context<'a>,
    ) -> Result<()> {
        let (old_id, new_id) = (old.page_id(), new.page_id());

        if TreePage::new(&old[..]).is_root() {
            let mut root_guard = ctx.take_spare()?;
            let root_id = root_guard.page_id();
            InternalPage::<_, K>::init(
                &mut root_guard[..],
                root_id,
                INVALID_PAGE,
                self.internal_max_size,
            )
            .populate_new_root(old_id, key, new_id);
            TreePage::new(&mut old[..]).set_parent_page_id(root_id);
            TreePage::new(&mut new[..]).set_parent_page_id(root_id);
            // the header page needs a frame of its own
            drop(root_guard);
            drop(old);
            drop(new);

            ctx.set_root(root_id)?;
            self.update_root_record(root_id)?;
            printdbg!("Grew index {} to new root {}", self.index_name, root_id);
            return Ok(());
        }

        let mut parent_guard = ctx.pop_parent(old_id)?;
        // both may have to be re-latched below to fix their parent pointers
        drop(old);
        drop(new);

        let mut parent = InternalPage::<_, K>::new(&mut parent_guard[..])?;
        if parent.insert_node_after(old_id, key, new_id)? <= parent.max_size() {
            return Ok(());
        }

        let mut uncle_guard = ctx.take_spare()?;
        let uncle_id = uncle_guard.page_id();
        let mut uncle = InternalPage::<_, K>::init(
            &mut uncle_guard[..],
            uncle_id,
            parent.get_parent_page_id(),
            self.internal_max_size,
        );
        parent.move_half_to(&mut uncle);
        let separator = uncle.key_at(0);
        for index in 0..uncle.size() {
            self.set_parent(uncle.value_at(index), uncle_id)?;
        }

        printdbg!(
            "Split internal page {} into {}",
            parent.get_page_id(),
            uncle_id
        );

        self.insert_into_parent(parent_guard, &separator, uncle_guard, ctx)
    }

    /// Fixes an underflowing `node` by borrowing from or merging with a sibling.
    fn coalesce_or_redistribute<'a>(
        &'a self,
        mut node: WritePageGuard<'a>,
        ctx: &mut Context<'a>,
    ) -> Result<()> {
        let node_id = node.page_id();
        if TreePage::new(&node[..]).is_root() {
            return self.adjust_root(node, ctx);
        }

        let mut parent_guard = ctx.pop_parent(node_id)?;
        let mut parent = InternalPage::<_, K>::new(&mut parent_guard[..])?;
        let index = parent.value_index(node_id).ok_or_else(|| {
            Error::Internal(format!(
                "page {node_id} is not a child of page {}",
                parent.get_page_id()
            ))
        })?;

        // left sibling when there is one
        let sibling_index = if index == 0 { 1 } else { index - 1 };
        let mut sibling = self.bpm.fetch_page_write(parent.value_at(sibling_index))?;

        let (node_page, sibling_page) = (TreePage::new(&node[..]), TreePage::new(&sibling[..]));
        let total = node_page.size() + sibling_page.size();
        let is_leaf = node_page.is_leaf();
        let fits = if is_leaf {
            total < node_page.max_size()
        } else {
            total <= node_page.max_size()
        };

        if !fits {
            if is_leaf {
                self.redistribute_leaf(&mut sibling, &mut node, &mut parent, index)?;
            } else {
                self.redistribute_internal(&mut sibling, &mut node, &mut parent, index)?;
            }
            return Ok(());
        }

        // merge the right page of the pair into the left one
        let (mut left, mut right, right_index) = if index == 0 {
            (node, sibling, 1)
        } else {
            (sibling, node, index)
        };
        let (left_id, right_id) = (left.page_id(), right.page_id());

        let moved = if is_leaf {
            LeafPage::<_, K, V>::new(&mut right[..])?
                .move_all_to(&mut LeafPage::<_, K, V>::new(&mut left[..])?);
            vec![]
        } else {
            let middle_key = parent.key_at(right_index);
            let mut right_page = InternalPage::<_, K>::new(&mut right[..])?;
            let moved = (0..right_page.size())
                .map(|i| right_page.value_at(i))
                .collect::<Vec<_>>();
            right_page.move_all_to(&mut InternalPage::<_, K>::new(&mut left[..])?, &middle_key);
            moved
        };
        // unlatch both before anything below re-latches them
        drop(right);
        drop(left);
        for child in moved {
            self.set_parent(child, left_id)?;
        }
        parent.remove(right_index);
        ctx.deleted.push(right_id);

        printdbg!(
            "Merged page {} into {}, parent {} left with {}",
            right_id,
            left_id,
            parent.get_page_id(),
            parent.size()
        );

        let parent_underflow = if parent.is_root() {
            parent.size() == 1
        } else {
            parent.size() < parent.min_size()
        };
        if parent_underflow {
            self.coalesce_or_redistribute(parent_guard, ctx)?;
        }
        Ok(())
    }

    fn redistribute_leaf(
        &self,
        sibling: &mut WritePageGuard<'_>,
        node: &mut WritePageGuard<'_>,
        parent: &mut InternalPage<&mut [u8], K>,
        index: usize,
    ) -> Result<()> {
        let mut sibling = LeafPage::<_, K, V>::new(&mut sibling[..])?;
        let mut node = LeafPage::<_, K, V>::new(&mut node[..])?;

        if index == 0 {
            sibling.move_first_to_end_of(&mut node);
            parent.set_key_at(1, &sibling.key_at(0));
        } else {
            sibling.move_last_to_front_of(&mut node);
            parent.set_key_at(index, &node.key_at(0));
        }
        Ok(())
    }

    fn redistribute_internal(
        &self,
        sibling: &mut WritePageGuard<'_>,
        node: &mut WritePageGuard<'_>,
        parent: &mut InternalPage<&mut [u8], K>,
        index: usize,
    ) -> Result<()> {
        let node_id = node.page_id();
        let mut sibling = InternalPage::<_, K>::new(&mut sibling[..])?;
        let mut node = InternalPage::<_, K>::new(&mut node[..])?;

        let moved = if index == 0 {
            let moved = sibling.move_first_to_end_of(&mut node, &parent.key_at(1));
            parent.set_key_at(1, &sibling.key_at(0));
            moved
        } else {
            let moved = sibling.move_last_to_front_of(&mut node, &parent.key_at(index));
            parent.set_key_at(index, &node.key_at(0));
            moved
        };
        self.set_parent(moved, node_id)
    }

    /// Shrinks the tree when the root runs out of keys or children.
    fn adjust_root<'a>(
        &'a self,
        mut root: WritePageGuard<'a>,
        ctx: &mut Context<'a>,
    ) -> Result<()> {
        let root_id = root.page_id();
        let page = TreePage::new(&root[..]);

        if page.is_leaf() {
            if page.size() == 0 {
                ctx.set_root(INVALID_PAGE)?;
                self.delete_root_record()?;
                ctx.deleted.push(root_id);
                printdbg!("Index {} is now empty", self.index_name);
            }
        } else if page.size() == 1 {
            let child = InternalPage::<_, K>::new(&mut root[..])?.remove_and_return_only_child();
            drop(root);
            self.set_parent(child, INVALID_PAGE)?;
            ctx.set_root(child)?;
            self.update_root_record(child)?;
            ctx.deleted.push(root_id);
            printdbg!("Collapsed root {} into {}", root_id, child);
        }
        Ok(())
    }

    fn set_parent(&self, page_id: PageId, parent_id: PageId) -> Result<()> {
        let mut guard = self.bpm.fetch_page_write(page_id)?;
        TreePage::new(&mut guard[..]).set_parent_page_id(parent_id);
        Ok(())
    }

    fn update_root_record(&self, root_page_id: PageId) -> Result<()> {
        let mut guard = self.bpm.fetch_page_write(HEADER_PAGE_ID)?;
        let mut header = HeaderPage::new(&mut guard[..]);
        if !header.update_record(&self.index_name, root_page_id)? {
            header.insert_record(&self.index_name, root_page_id)?;
        }
        Ok(())
    }

    fn delete_root_record(&self) -> Result<()> {
        let mut guard = self.bpm.fetch_page_write(HEADER_PAGE_ID)?;
        HeaderPage::new(&mut guard[..]).delete_record(&self.index_name)?;
        Ok(())
    }
}

impl<K, V, C> BPlusTree<K, V, C>
where
    K: Storable + From<i64>,
    V: Storable + From<i64>,
    C: KeyComparator<K>,
{
    /// Inserts every whitespace-separated integer in the file, using it as both
    /// key and value. Returns how many were new.
    pub fn insert_from_file(&self, path: impl AsRef<Path>) -> Result<usize> {
        let mut inserted = 0;
        for n in read_integers(path.as_ref())? {
            if self.insert(&K::from(n), &V::from(n))? {
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    /// Removes every whitespace-separated integer key in the file.
    /// Returns how many were present.
    pub fn remove_from_file(&self, path: impl AsRef<Path>) -> Result<usize> {
        let mut removed = 0;
        for n in read_integers(path.as_ref())? {
            if self.remove(&K::from(n))? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

fn read_integers(path: &Path) -> Result<Vec<i64>> {
    let content = std::fs::read_to_string(path)?;
    content
        .split_whitespace()
        .map(|s| {
            s.parse::<i64>().map_err(|e| {
                anyhow::Error::from(Error::Unsupported(format!("bad key {s:?} in {path:?}: {e}")))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer_pool::tests::test_arc_bpm;
    use crate::buffer_pool::BufferPoolManager;
    use crate::disk_manager::{test_path, FileDiskManager};
    use crate::indexes::b_plus_tree::{GenericKey, Rid};
    use rand::seq::SliceRandom;
    use std::cmp::Ordering;
    use std::sync::Arc;
    use std::thread;

    type Tree = BPlusTree<i64, i64>;

    fn small_tree(name: &str, pool_size: usize) -> Result<Tree> {
        BPlusTree::new(name, test_arc_bpm(pool_size), DefaultComparator, 4, 4)
    }

    fn scan(tree: &Tree) -> Result<Vec<i64>> {
        tree.begin()?.map(|entry| entry.map(|(key, _)| key)).collect()
    }

    fn assert_unpinned<K: Storable, V: Storable, C: KeyComparator<K>>(tree: &BPlusTree<K, V, C>) {
        let bpm = &tree.bpm;
        assert_eq!(
            bpm.evictable_count() + bpm.free_frame_count(),
            bpm.get_pool_size(),
            "some page is still pinned"
        );
    }

    fn leaf_keys(tree: &Tree, page_id: PageId) -> Result<Vec<i64>> {
        let guard = tree.bpm.fetch_page_read(page_id)?;
        let leaf = LeafPage::<_, i64, i64>::new(&guard[..])?;
        Ok((0..leaf.size()).map(|i| leaf.key_at(i)).collect())
    }

    /// (separators, children) of an internal page
    fn internal_slots(tree: &Tree, page_id: PageId) -> Result<(Vec<i64>, Vec<PageId>)> {
        let guard = tree.bpm.fetch_page_read(page_id)?;
        let page = InternalPage::<_, i64>::new(&guard[..])?;
        Ok((
            (1..page.size()).map(|i| page.key_at(i)).collect(),
            (0..page.size()).map(|i| page.value_at(i)).collect(),
        ))
    }

    fn insert_all(tree: &Tree, keys: impl IntoIterator<Item = i64>) -> Result<()> {
        for key in keys {
            assert!(tree.insert(&key, &(key * 10))?, "key {key} was rejected");
        }
        Ok(())
    }

    #[test]
    fn test_empty_tree() -> Result<()> {
        let tree = small_tree("empty", 8)?;

        assert!(tree.is_empty());
        assert_eq!(tree.get_value(&1)?, None);
        assert!(!tree.remove(&1)?);
        assert!(tree.begin()?.is_end());
        assert!(tree.begin()? == tree.end());
        assert!(tree.begin_at(&5)?.is_end());
        tree.check_integrity()?;
        assert_unpinned(&tree);

        Ok(())
    }

    #[test]
    fn test_invalid_sizes() {
        assert!(BPlusTree::<i64, i64>::new("a", test_arc_bpm(4), DefaultComparator, 1, 4).is_err());
        assert!(BPlusTree::<i64, i64>::new("b", test_arc_bpm(4), DefaultComparator, 4, 2).is_err());
        assert!(
            BPlusTree::<i64, i64>::new("c", test_arc_bpm(4), DefaultComparator, 4, 10_000)
                .is_err()
        );
        assert!(BPlusTree::<i64, i64>::with_default_sizes("d", test_arc_bpm(4), DefaultComparator)
            .is_ok());
    }

    #[test]
    fn test_leaf_split_creates_root() -> Result<()> {
        let tree = small_tree("split", 16)?;

        insert_all(&tree, [1, 2, 3])?;
        let first_root = tree.get_root_page_id();
        assert_eq!(leaf_keys(&tree, first_root)?, vec![1, 2, 3]);

        insert_all(&tree, [4])?;
        let root = tree.get_root_page_id();
        assert_ne!(root, first_root);

        let (separators, children) = internal_slots(&tree, root)?;
        assert_eq!(separators, vec![3]);
        assert_eq!(children[0], first_root);
        assert_eq!(leaf_keys(&tree, children[0])?, vec![1, 2]);
        assert_eq!(leaf_keys(&tree, children[1])?, vec![3, 4]);

        let left = tree.bpm.fetch_page_read(children[0])?;
        assert_eq!(
            LeafPage::<_, i64, i64>::new(&left[..])?.get_next_page_id(),
            children[1]
        );
        drop(left);

        assert!(!tree.insert(&3, &0)?);
        assert_eq!(tree.get_value(&3)?, Some(30));

        tree.check_integrity()?;
        assert_unpinned(&tree);

        Ok(())
    }

    #[test]
    fn test_coalesce_collapses_root() -> Result<()> {
        let tree = small_tree("coalesce", 16)?;
        insert_all(&tree, 1..=4)?;

        let old_root = tree.get_root_page_id();
        let (_, children) = internal_slots(&tree, old_root)?;

        assert!(tree.remove(&4)?);

        let root = tree.get_root_page_id();
        assert_eq!(root, children[0]);
        assert_eq!(leaf_keys(&tree, root)?, vec![1, 2, 3]);
        assert!(!tree.bpm.is_resident(old_root));
        assert!(!tree.bpm.is_resident(children[1]));

        tree.check_integrity()?;
        assert_unpinned(&tree);

        Ok(())
    }

    #[test]
    fn test_merge_leftmost_child() -> Result<()> {
        let tree = small_tree("leftmost", 16)?;
        insert_all(&tree, 1..=4)?;

        assert!(tree.remove(&1)?);

        let root = tree.get_root_page_id();
        assert_eq!(leaf_keys(&tree, root)?, vec![2, 3, 4]);
        tree.check_integrity()?;

        Ok(())
    }

    #[test]
    fn test_redistribute_from_right_sibling() -> Result<()> {
        let tree = small_tree("borrow_right", 16)?;
        insert_all(&tree, 1..=5)?;

        // the leftmost leaf borrows from its right neighbour
        assert!(tree.remove(&1)?);

        let (separators, children) = internal_slots(&tree, tree.get_root_page_id())?;
        assert_eq!(separators, vec![4]);
        assert_eq!(leaf_keys(&tree, children[0])?, vec![2, 3]);
        assert_eq!(leaf_keys(&tree, children[1])?, vec![4, 5]);
        tree.check_integrity()?;

        Ok(())
    }

    #[test]
    fn test_redistribute_from_left_sibling() -> Result<()> {
        let tree = small_tree("borrow_left", 16)?;
        insert_all(&tree, [1, 2, 3, 4, 0])?;

        // the rightmost leaf borrows from its left neighbour
        assert!(tree.remove(&4)?);

        let (separators, children) = internal_slots(&tree, tree.get_root_page_id())?;
        assert_eq!(separators, vec![2]);
        assert_eq!(leaf_keys(&tree, children[0])?, vec![0, 1]);
        assert_eq!(leaf_keys(&tree, children[1])?, vec![2, 3]);
        tree.check_integrity()?;

        Ok(())
    }

    #[test]
    fn test_internal_rebalancing_at_both_ends() -> Result<()> {
        for descending in [false, true] {
            let tree = small_tree("internal", 32)?;
            insert_all(&tree, 0..200)?;
            tree.check_integrity()?;

            let mut keys = (0..200).collect::<Vec<i64>>();
            if descending {
                keys.reverse();
            }
            for (removed, key) in keys.iter().enumerate() {
                assert!(tree.remove(key)?);
                tree.check_integrity()?;
                assert_eq!(scan(&tree)?.len(), 199 - removed);
            }

            assert!(tree.is_empty());
            assert_unpinned(&tree);
        }

        Ok(())
    }

    #[test]
    fn test_random_round_trip() -> Result<()> {
        let tree = small_tree("random", 64)?;
        let mut rng = rand::thread_rng();

        let mut keys = (0..1000).collect::<Vec<i64>>();
        keys.shuffle(&mut rng);
        for (i, key) in keys.iter().enumerate() {
            assert!(tree.insert(key, &(key * 10))?);
            if i % 100 == 0 {
                tree.check_integrity()?;
            }
        }
        tree.check_integrity()?;

        for key in &keys {
            assert_eq!(tree.get_value(key)?, Some(key * 10));
            assert!(!tree.insert(key, &0)?);
        }
        assert_eq!(tree.get_value(&1000)?, None);
        assert_eq!(scan(&tree)?, (0..1000).collect::<Vec<_>>());

        keys.shuffle(&mut rng);
        let (gone, kept) = keys.split_at(500);
        for key in gone {
            assert!(tree.remove(key)?);
        }
        tree.check_integrity()?;

        for key in gone {
            assert_eq!(tree.get_value(key)?, None);
            assert!(!tree.remove(key)?);
        }
        for key in kept {
            assert_eq!(tree.get_value(key)?, Some(key * 10));
        }
        let mut expected = kept.to_vec();
        expected.sort();
        assert_eq!(scan(&tree)?, expected);

        let root = tree.get_root_page_id();
        for key in kept {
            assert!(tree.remove(key)?);
        }
        assert!(tree.is_empty());
        assert!(!tree.bpm.is_resident(root));
        assert!(tree.begin()?.is_end());
        assert_unpinned(&tree);

        // the root record is gone too
        let reopened: Tree = BPlusTree::new("random", tree.bpm.clone(), DefaultComparator, 4, 4)?;
        assert!(reopened.is_empty());

        Ok(())
    }

    #[test]
    fn test_iterator_positions() -> Result<()> {
        let tree = small_tree("iter", 32)?;
        insert_all(&tree, (0..200).step_by(2))?;

        let mut iter = tree.begin_at(&51)?;
        assert_eq!(iter.entry()?, (52, 520));
        iter.advance()?;
        assert_eq!(iter.entry()?.0, 54);

        assert_eq!(tree.begin_at(&-5)?.entry()?.0, 0);
        assert_eq!(tree.begin_at(&100)?.entry()?.0, 100);
        assert_eq!(tree.begin_at(&198)?.count(), 1);

        let past_end = tree.begin_at(&199)?;
        assert!(past_end.is_end());
        assert!(past_end == tree.end());
        assert!(past_end.entry().is_err());

        assert!(tree.begin()? == tree.begin_at(&0)?);
        assert!(tree.begin()? != tree.begin_at(&1)?);
        drop(iter);

        assert_eq!(tree.begin_at(&150)?.count(), 25);
        assert_unpinned(&tree);

        Ok(())
    }

    #[test]
    fn test_root_persists_across_restarts() -> Result<()> {
        let path = test_path();

        {
            let bpm = Arc::new(BufferPoolManager::new(64, FileDiskManager::new(&path)?));
            let tree: Tree = BPlusTree::new("persist", bpm.clone(), DefaultComparator, 4, 4)?;
            let other: Tree = BPlusTree::new("other", bpm, DefaultComparator, 4, 4)?;
            insert_all(&tree, 0..300)?;
            insert_all(&other, [7])?;
        }

        let bpm = Arc::new(BufferPoolManager::new(64, FileDiskManager::new(&path)?));
        let tree: Tree = BPlusTree::new("persist", bpm.clone(), DefaultComparator, 4, 4)?;
        let other: Tree = BPlusTree::new("other", bpm.clone(), DefaultComparator, 4, 4)?;

        assert!(!tree.is_empty());
        tree.check_integrity()?;
        assert_eq!(scan(&tree)?, (0..300).collect::<Vec<_>>());
        assert_eq!(other.get_value(&7)?, Some(70));

        drop(tree);
        drop(other);
        drop(bpm);
        std::fs::remove_dir_all(&path)?;

        Ok(())
    }

    #[test]
    fn test_concurrent_disjoint_inserts() -> Result<()> {
        let tree: Tree = BPlusTree::new("concurrent", test_arc_bpm(64), DefaultComparator, 8, 8)?;
        let threads = 4;
        let per_thread = 500;

        thread::scope(|s| {
            for t in 0..threads {
                let tree = &tree;
                s.spawn(move || {
                    // interleave the ranges so threads fight over the same leaves
                    for i in 0..per_thread {
                        let key = i * threads + t;
                        assert!(tree.insert(&key, &(key * 10)).unwrap());
                    }
                });
            }
        });

        tree.check_integrity()?;
        assert_eq!(scan(&tree)?, (0..threads * per_thread).collect::<Vec<_>>());
        assert_unpinned(&tree);

        Ok(())
    }

    #[test]
    fn test_concurrent_mixed_workload() -> Result<()> {
        let tree: Tree = BPlusTree::new("mixed", test_arc_bpm(64), DefaultComparator, 6, 6)?;
        insert_all(&tree, 0..1000)?;

        thread::scope(|s| {
            let tree = &tree;
            // removers and inserters work on disjoint ranges
            s.spawn(move || {
                for key in 0..500 {
                    assert!(tree.remove(&key).unwrap());
                }
            });
            s.spawn(move || {
                for key in (0..500).rev() {
                    assert!(tree.insert(&(key + 1000), &0).unwrap());
                }
            });
            s.spawn(move || {
                for key in 500..1000 {
                    assert_eq!(tree.get_value(&key).unwrap(), Some(key * 10));
                }
            });
            s.spawn(move || {
                for key in (1500..2000).step_by(3) {
                    assert!(tree.insert(&key, &0).unwrap());
                    assert!(tree.remove(&key).unwrap());
                }
            });
        });

        tree.check_integrity()?;
        assert_eq!(scan(&tree)?, (500..1500).collect::<Vec<_>>());
        assert_unpinned(&tree);

        Ok(())
    }

    #[test]
    fn test_pool_exhaustion_leaves_tree_intact() -> Result<()> {
        let tree: Tree = BPlusTree::new("tiny", test_arc_bpm(2), DefaultComparator, 2, 3)?;
        assert!(tree.insert(&1, &1)?);

        // splitting needs the leaf, its sibling and a new root at once
        let err = tree.insert(&2, &2).unwrap_err();
        assert_eq!(
            err.downcast_ref::<crate::errors::Error>(),
            Some(&crate::errors::Error::PoolExhausted)
        );
        assert_unpinned(&tree);

        assert_eq!(tree.get_value(&2)?, None);
        assert_eq!(scan(&tree)?, vec![1]);
        tree.check_integrity()?;

        // one more frame is enough to grow a root
        let tree: Tree = BPlusTree::new("small", test_arc_bpm(3), DefaultComparator, 2, 3)?;
        insert_all(&tree, [1, 2])?;
        assert_eq!(scan(&tree)?, vec![1, 2]);
        tree.check_integrity()?;
        assert_unpinned(&tree);

        Ok(())
    }

    #[test]
    fn test_deep_split_without_frames_changes_nothing() -> Result<()> {
        let tree = small_tree("squeezed", 32)?;
        insert_all(&tree, 0..100)?;

        // leave too few frames for a split that cascades several levels
        let held = (0..22)
            .map(|_| tree.bpm.new_page_guarded())
            .collect::<Result<Vec<_>>>()?;

        let mut inserted = (0..100).collect::<Vec<i64>>();
        let mut failures = 0;
        for key in 100..300 {
            match tree.insert(&key, &(key * 10)) {
                Ok(new) => {
                    assert!(new);
                    inserted.push(key);
                }
                Err(err) => {
                    assert_eq!(
                        err.downcast_ref::<crate::errors::Error>(),
                        Some(&crate::errors::Error::PoolExhausted)
                    );
                    assert_eq!(tree.get_value(&key)?, None);
                    failures += 1;
                }
            }
            tree.check_integrity()?;
        }
        assert!(failures > 0);
        assert_eq!(scan(&tree)?, inserted);

        drop(held);
        assert_unpinned(&tree);

        Ok(())
    }

    #[test]
    fn test_custom_comparator() -> Result<()> {
        let tree = BPlusTree::<i64, i64, _>::new(
            "reversed",
            test_arc_bpm(16),
            |a: &i64, b: &i64| b.cmp(a),
            4,
            4,
        )?;
        for key in 0..20 {
            tree.insert(&key, &key)?;
        }

        let keys = tree
            .begin()?
            .map(|entry| entry.map(|(key, _)| key))
            .collect::<Result<Vec<_>>>()?;
        assert_eq!(keys, (0..20).rev().collect::<Vec<_>>());
        assert_eq!(tree.comparator.compare(&1, &2), Ordering::Greater);
        tree.check_integrity()?;

        Ok(())
    }

    #[test]
    fn test_generic_keys_from_file() -> Result<()> {
        let dir = test_path();
        std::fs::create_dir_all(&dir)?;
        let inserts = format!("{dir}insert.txt");
        let removals = format!("{dir}remove.txt");
        std::fs::write(&inserts, "5 3 9\n1 3\n-4\n")?;
        std::fs::write(&removals, "3 7")?;

        let tree = BPlusTree::<GenericKey<16>, Rid>::with_default_sizes(
            "generic",
            test_arc_bpm(8),
            DefaultComparator,
        )?;
        assert_eq!(tree.insert_from_file(&inserts)?, 5);
        assert_eq!(tree.remove_from_file(&removals)?, 1);

        assert_eq!(
            tree.get_value(&GenericKey::from(9))?,
            Some(Rid::from(9))
        );
        assert_eq!(tree.get_value(&GenericKey::from(3))?, None);

        let keys = tree
            .begin()?
            .map(|entry| entry.map(|(key, _)| key.to_integer()))
            .collect::<Result<Vec<_>>>()?;
        assert_eq!(keys, vec![-4, 1, 5, 9]);

        std::fs::write(&removals, "1 x")?;
        assert!(tree.remove_from_file(&removals).is_err());

        std::fs::remove_dir_all(&dir)?;

        Ok(())
    }
}
