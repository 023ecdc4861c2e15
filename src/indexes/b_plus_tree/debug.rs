use super::btree::BPlusTree;
use super::comparator::KeyComparator;
use crate::pages::indexes::b_plus_tree::{TreePage, TreePageView};
use crate::pages::traits::Storable;
use crate::pages::{PageId, INVALID_PAGE};
use anyhow::{ensure, Result};
use std::cmp::Ordering;
use std::fmt::{self, Write};

struct PageSummary<K> {
    page_id: PageId,
    parent_id: PageId,
    depth: usize,
    next_page_id: PageId,
    /// separators only for internal pages, slot 0 is skipped
    keys: Vec<K>,
    /// empty for leaves
    children: Vec<PageId>,
}

impl<K> PageSummary<K> {
    fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// Inspection helpers. They latch one page at a time (or one path for
/// `check_integrity`), so only run them while the tree is quiescent.
impl<K, V, C> BPlusTree<K, V, C>
where
    K: Storable + fmt::Debug,
    V: Storable,
    C: KeyComparator<K>,
{
    /// Pages in pre-order.
    fn collect_pages(&self) -> Result<Vec<PageSummary<K>>> {
        let mut pages = vec![];
        let root = self.get_root_page_id();
        if root == INVALID_PAGE {
            return Ok(pages);
        }

        let mut stack = vec![(root, 0)];
        while let Some((page_id, depth)) = stack.pop() {
            let guard = self.bpm.fetch_page_read(page_id)?;
            let summary = match TreePageView::<_, K, V>::new(&guard[..])? {
                TreePageView::Leaf(leaf) => PageSummary {
                    page_id,
                    parent_id: leaf.get_parent_page_id(),
                    depth,
                    next_page_id: leaf.get_next_page_id(),
                    keys: (0..leaf.size()).map(|i| leaf.key_at(i)).collect(),
                    children: vec![],
                },
                TreePageView::Internal(page) => PageSummary {
                    page_id,
                    parent_id: page.get_parent_page_id(),
                    depth,
                    next_page_id: INVALID_PAGE,
                    keys: (1..page.size()).map(|i| page.key_at(i)).collect(),
                    children: (0..page.size()).map(|i| page.value_at(i)).collect(),
                },
            };
            stack.extend(summary.children.iter().rev().map(|c| (*c, depth + 1)));
            pages.push(summary);
        }
        Ok(pages)
    }

    /// Indented dump, one page per line.
    pub fn draw(&self) -> Result<String> {
        let mut out = String::new();
        for page in self.collect_pages()? {
            let indent = "  ".repeat(page.depth);
            if page.is_leaf() {
                writeln!(
                    out,
                    "{indent}Leaf({}) parent={} next={} {:?}",
                    page.page_id, page.parent_id, page.next_page_id, page.keys
                )?;
            } else {
                writeln!(
                    out,
                    "{indent}Internal({}) parent={} {:?} -> {:?}",
                    page.page_id, page.parent_id, page.keys, page.children
                )?;
            }
        }
        if out.is_empty() {
            out.push_str("Empty tree\n");
        }
        Ok(out)
    }

    /// Graphviz rendering of the tree, leaf chain included.
    pub fn to_graph(&self) -> Result<String> {
        let pages = self.collect_pages()?;
        let mut out = String::from("digraph G {\n  node [shape=record];\n");

        for page in &pages {
            if page.is_leaf() {
                let keys = page
                    .keys
                    .iter()
                    .map(|k| format!("{k:?}"))
                    .collect::<Vec<_>>()
                    .join("|");
                writeln!(
                    out,
                    "  P{} [color=green, label=\"P{}|{}\"];",
                    page.page_id, page.page_id, keys
                )?;
                if page.next_page_id != INVALID_PAGE {
                    writeln!(
                        out,
                        "  P{} -> P{} [style=dashed];",
                        page.page_id, page.next_page_id
                    )?;
                }
            } else {
                let mut slots = vec!["<c0> ".to_string()];
                slots.extend(
                    page.keys
                        .iter()
                        .enumerate()
                        .map(|(i, k)| format!("<c{}>{k:?}", i + 1)),
                );
                writeln!(
                    out,
                    "  P{} [color=pink, label=\"P{}|{}\"];",
                    page.page_id,
                    page.page_id,
                    slots.join("|")
                )?;
                for (i, child) in page.children.iter().enumerate() {
                    writeln!(out, "  P{}:c{} -> P{};", page.page_id, i, child)?;
                }
            }
        }

        let max_depth = pages.iter().map(|p| p.depth).max().unwrap_or(0);
        for depth in 0..=max_depth {
            let row = pages
                .iter()
                .filter(|p| p.depth == depth)
                .map(|p| format!("P{}", p.page_id))
                .collect::<Vec<_>>();
            if row.len() > 1 {
                writeln!(out, "  {{rank=same; {}}}", row.join(" "))?;
            }
        }

        out.push_str("}\n");
        Ok(out)
    }

    /// Verifies the structural invariants: page occupancy, parent links, key
    /// order and bounds, uniform leaf depth, and a leaf chain that visits every
    /// leaf in key order.
    pub fn check_integrity(&self) -> Result<()> {
        let root = self.get_root_page_id();
        if root == INVALID_PAGE {
            return Ok(());
        }

        let mut leaves = vec![];
        self.check_subtree(root, INVALID_PAGE, None, None, &mut leaves)?;

        for pair in leaves.windows(2) {
            let guard = self.bpm.fetch_page_read(pair[0])?;
            let next = match TreePageView::<_, K, V>::new(&guard[..])? {
                TreePageView::Leaf(leaf) => leaf.get_next_page_id(),
                TreePageView::Internal(_) => INVALID_PAGE,
            };
            ensure!(
                next == pair[1],
                "leaf {} links to {} instead of {}",
                pair[0],
                next,
                pair[1]
            );
        }
        if let Some(last) = leaves.last() {
            let guard = self.bpm.fetch_page_read(*last)?;
            if let TreePageView::Leaf(leaf) = TreePageView::<_, K, V>::new(&guard[..])? {
                ensure!(
                    leaf.get_next_page_id() == INVALID_PAGE,
                    "last leaf {} links to {}",
                    last,
                    leaf.get_next_page_id()
                );
            }
        }
        Ok(())
    }

    fn in_bounds(&self, key: &K, lower: Option<&K>, upper: Option<&K>) -> bool {
        lower.map_or(true, |l| self.comparator.compare(l, key) != Ordering::Greater)
            && upper.map_or(true, |u| self.comparator.compare(key, u) == Ordering::Less)
    }

    /// Returns the height of the subtree rooted at `page_id`.
    fn check_subtree(
        &self,
        page_id: PageId,
        parent_id: PageId,
        lower: Option<&K>,
        upper: Option<&K>,
        leaves: &mut Vec<PageId>,
    ) -> Result<usize> {
        let guard = self.bpm.fetch_page_read(page_id)?;
        let page = TreePage::new(&guard[..]);

        ensure!(
            page.get_page_id() == page_id,
            "page {} claims to be page {}",
            page_id,
            page.get_page_id()
        );
        ensure!(
            page.get_parent_page_id() == parent_id,
            "page {} points to parent {} instead of {}",
            page_id,
            page.get_parent_page_id(),
            parent_id
        );

        let (size, min, max) = (page.size(), page.min_size(), page.max_size());
        match (page.is_root(), page.is_leaf()) {
            (true, true) => ensure!(size >= 1, "root leaf {} is empty", page_id),
            (true, false) => ensure!(size >= 2, "root {} has {} children", page_id, size),
            (false, _) => ensure!(
                size >= min,
                "page {} has {} entries, below {}",
                page_id,
                size,
                min
            ),
        }
        if page.is_leaf() {
            ensure!(size < max, "leaf {} has {} entries, max {}", page_id, size, max);
        } else {
            ensure!(size <= max, "page {} has {} children, max {}", page_id, size, max);
        }

        match TreePageView::<_, K, V>::new(&guard[..])? {
            TreePageView::Leaf(leaf) => {
                for i in 0..leaf.size() {
                    let key = leaf.key_at(i);
                    ensure!(
                        self.in_bounds(&key, lower, upper),
                        "key {:?} of leaf {} is out of its parent's bounds",
                        key,
                        page_id
                    );
                    if i > 0 {
                        ensure!(
                            self.comparator.compare(&leaf.key_at(i - 1), &key) == Ordering::Less,
                            "leaf {} is not sorted at slot {}",
                            page_id,
                            i
                        );
                    }
                }
                leaves.push(page_id);
                Ok(1)
            }
            TreePageView::Internal(internal) => {
                let size = internal.size();
                let keys = (0..size).map(|i| internal.key_at(i)).collect::<Vec<_>>();
                for i in 1..size {
                    ensure!(
                        self.in_bounds(&keys[i], lower, upper),
                        "separator {:?} of page {} is out of its parent's bounds",
                        keys[i],
                        page_id
                    );
                    if i > 1 {
                        ensure!(
                            self.comparator.compare(&keys[i - 1], &keys[i]) == Ordering::Less,
                            "page {} is not sorted at slot {}",
                            page_id,
                            i
                        );
                    }
                }

                let mut height = None;
                for i in 0..size {
                    let child_lower = if i == 0 { lower } else { Some(&keys[i]) };
                    let child_upper = if i + 1 < size { Some(&keys[i + 1]) } else { upper };
                    let child_height = self.check_subtree(
                        internal.value_at(i),
                        page_id,
                        child_lower,
                        child_upper,
                        leaves,
                    )?;
                    ensure!(
                        *height.get_or_insert(child_height) == child_height,
                        "leaves under page {} are at different depths",
                        page_id
                    );
                }
                Ok(height.unwrap_or(0) + 1)
            }
        }
    }
}
