use crate::buffer_pool::{BufferPoolManager, PinnedPage};
use crate::errors::Error;
use crate::pages::indexes::b_plus_tree::LeafPage;
use crate::pages::traits::Storable;
use crate::pages::INVALID_PAGE;
use anyhow::Result;
use std::marker::PhantomData;

/// Forward cursor over the leaf chain.
///
/// Keeps its leaf pinned but not latched, taking a shared latch only for the
/// duration of each access. Concurrent writers may therefore move entries
/// under it; positions are not stable across structural changes.
pub struct IndexIterator<'a, K, V> {
    bpm: &'a BufferPoolManager,
    page: Option<PinnedPage<'a>>,
    index: usize,
    _marker: PhantomData<(K, V)>,
}

impl<'a, K, V> IndexIterator<'a, K, V>
where
    K: Storable,
    V: Storable,
{
    /// Starts at slot `index` of an already pinned leaf.
    pub(super) fn new(bpm: &'a BufferPoolManager, page: PinnedPage<'a>, index: usize) -> Result<Self> {
        let mut iter = Self {
            bpm,
            page: Some(page),
            index,
            _marker: PhantomData,
        };
        iter.skip_exhausted()?;
        Ok(iter)
    }

    pub(super) fn end(bpm: &'a BufferPoolManager) -> Self {
        Self {
            bpm,
            page: None,
            index: 0,
            _marker: PhantomData,
        }
    }

    pub fn is_end(&self) -> bool {
        self.page.is_none()
    }

    /// Entry under the cursor.
    pub fn entry(&self) -> Result<(K, V)> {
        let Some(page) = &self.page else {
            return Err(Error::Internal("dereferenced an exhausted index iterator".into()).into());
        };

        let data = page.read();
        let leaf = LeafPage::<_, K, V>::new(&data[..])?;
        if self.index >= leaf.size() {
            return Err(Error::Internal(format!(
                "leaf {} shrank under the iterator",
                page.page_id()
            ))
            .into());
        }
        Ok(leaf.get_item(self.index))
    }

    pub fn advance(&mut self) -> Result<()> {
        if self.page.is_some() {
            self.index += 1;
            self.skip_exhausted()?;
        }
        Ok(())
    }

    /// Moves along the chain until the cursor points at an entry or runs off the end.
    fn skip_exhausted(&mut self) -> Result<()> {
        while let Some(page) = &self.page {
            let (size, next_page_id) = {
                let data = page.read();
                let leaf = LeafPage::<_, K, V>::new(&data[..])?;
                (leaf.size(), leaf.get_next_page_id())
            };
            if self.index < size {
                break;
            }

            self.index = 0;
            self.page = if next_page_id == INVALID_PAGE {
                None
            } else {
                Some(self.bpm.fetch_page_pinned(next_page_id)?)
            };
        }
        Ok(())
    }
}

impl<K, V> Iterator for IndexIterator<'_, K, V>
where
    K: Storable,
    V: Storable,
{
    type Item = Result<(K, V)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.is_end() {
            return None;
        }

        let item = self.entry().and_then(|entry| {
            self.advance()?;
            Ok(entry)
        });
        if item.is_err() {
            self.page = None;
        }
        Some(item)
    }
}

impl<K, V> PartialEq for IndexIterator<'_, K, V> {
    fn eq(&self, other: &Self) -> bool {
        match (&self.page, &other.page) {
            (None, None) => true,
            (Some(a), Some(b)) => a.page_id() == b.page_id() && self.index == other.index,
            _ => false,
        }
    }
}
