use crate::buffer_pool::{BufferPoolManager, WritePageGuard};
use crate::errors::Error;
use crate::pages::PageId;
use crate::printdbg;
use anyhow::Result;
use parking_lot::MutexGuard;

/// Latches held by one write operation while it descends and rebalances.
///
/// `write_set` is ordered root first; the page on top is the deepest one.
/// `spares` are blank pages reserved up front for a split, so running out of
/// frames can't interrupt it halfway.
/// Everything still held is released on drop, and pages scheduled in
/// `deleted` (unused spares included) are freed only after that.
///
/// A deleted page that some other thread still has pinned, such as the leaf an
/// iterator sits on, is left allocated on disk and is never reclaimed.
pub(super) struct Context<'a> {
    pub root_guard: Option<MutexGuard<'a, PageId>>,
    pub write_set: Vec<WritePageGuard<'a>>,
    pub deleted: Vec<PageId>,
    spares: Vec<WritePageGuard<'a>>,
    bpm: &'a BufferPoolManager,
}

impl<'a> Context<'a> {
    pub fn new(bpm: &'a BufferPoolManager) -> Self {
        Self {
            root_guard: None,
            write_set: vec![],
            deleted: vec![],
            spares: vec![],
            bpm,
        }
    }

    /// Called once a safe page is latched: nothing above it can change anymore.
    pub fn release_ancestors(&mut self) {
        self.write_set.clear();
        self.root_guard = None;
    }

    pub fn set_root(&mut self, root_page_id: PageId) -> Result<()> {
        let guard = self
            .root_guard
            .as_mut()
            .ok_or_else(|| Error::Internal("root changed without holding the root lock".into()))?;
        **guard = root_page_id;
        Ok(())
    }

    /// Allocates `count` blank pages for [`Context::take_spare`]. On failure the
    /// ones already allocated are given back when the context is released.
    pub fn reserve(&mut self, count: usize) -> Result<()> {
        for _ in 0..count {
            let guard = self.bpm.new_page_guarded()?;
            self.spares.push(guard);
        }
        Ok(())
    }

    pub fn take_spare(&mut self) -> Result<WritePageGuard<'a>> {
        self.spares
            .pop()
            .ok_or_else(|| Error::Internal("split ran out of reserved pages".into()).into())
    }

    /// The page a descent stopped at.
    pub fn pop_leaf(&mut self) -> Result<WritePageGuard<'a>> {
        self.write_set
            .pop()
            .ok_or_else(|| Error::Internal("descent ended without a latched leaf".into()).into())
    }

    pub fn pop_parent(&mut self, child: PageId) -> Result<WritePageGuard<'a>> {
        self.write_set
            .pop()
            .ok_or_else(|| Error::Internal(format!("parent of page {child} is not latched")).into())
    }

    pub fn release(&mut self) -> Result<()> {
        self.release_ancestors();
        for spare in std::mem::take(&mut self.spares) {
            self.deleted.push(spare.page_id());
        }
        for page_id in std::mem::take(&mut self.deleted) {
            if !self.bpm.delete_page(page_id)? {
                // an iterator still has it pinned
                printdbg!("Page {} is still pinned, leaving it allocated", page_id);
            }
        }
        Ok(())
    }
}

impl Drop for Context<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            printdbg!("Failed to release tree context: {}", e);
        }
    }
}
