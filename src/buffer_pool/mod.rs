mod frame;
mod guard;
mod replacer;

pub use frame::Frame;
pub use guard::{PinnedPage, ReadPageGuard, WritePageGuard};

use crate::config::DEFAULT_POOL_SIZE;
use crate::disk_manager::{DiskManager, FileDiskManager};
use crate::errors::Error;
use crate::pages::{PageId, INVALID_PAGE};
use crate::{get_caller_name, printdbg};
use anyhow::Result;
use parking_lot::{FairMutex, Mutex};
use replacer::{LruReplacer, Replacer};
use std::collections::{HashMap, LinkedList};
use std::sync::Arc;

pub type FrameId = usize;
pub type ArcBufferPool = Arc<BufferPoolManager>;

struct PoolState {
    /// frames that have never held a page, or whose page was deleted
    free_frames: LinkedList<FrameId>,
    page_table: HashMap<PageId, FrameId>,
}

/// Caches disk pages in a fixed set of frames.
///
/// Every page handed out is pinned and must be unpinned exactly once, either
/// by calling [`BufferPoolManager::unpin_page`] or by dropping one of the guards.
/// The pool lock only covers bookkeeping; page content is protected by each
/// frame's own latch, which callers take themselves.
///
/// Lock order: pool lock, then a frame latch, then the disk lock. The pool only
/// latches frames nobody has pinned while it holds its own lock.
pub struct BufferPoolManager {
    frames: Vec<Frame>,
    state: FairMutex<PoolState>,
    replacer: Box<dyn Replacer>,
    disk_manager: Mutex<Box<dyn DiskManager>>,
}

impl BufferPoolManager {
    pub fn new(pool_size: usize, disk_manager: impl DiskManager + 'static) -> Self {
        let frames = (0..pool_size).map(Frame::new).collect::<Vec<_>>();

        Self {
            frames,
            state: FairMutex::new(PoolState {
                free_frames: LinkedList::from_iter(0..pool_size),
                page_table: HashMap::new(),
            }),
            replacer: Box::new(LruReplacer::new(pool_size)),
            disk_manager: Mutex::new(Box::new(disk_manager)),
        }
    }

    /// A pool of [`DEFAULT_POOL_SIZE`] frames over the default data directory.
    pub fn with_defaults() -> Result<Self> {
        Ok(Self::new(
            DEFAULT_POOL_SIZE,
            FileDiskManager::with_default_path()?,
        ))
    }

    pub fn get_pool_size(&self) -> usize {
        self.frames.len()
    }

    /// None if the page is not resident.
    pub fn get_pin_count(&self, page_id: PageId) -> Option<u32> {
        let state = self.state.lock();
        let frame_id = *state.page_table.get(&page_id)?;
        Some(self.frames[frame_id].get_pin_count())
    }

    pub fn is_resident(&self, page_id: PageId) -> bool {
        self.state.lock().page_table.contains_key(&page_id)
    }

    pub fn free_frame_count(&self) -> usize {
        self.state.lock().free_frames.len()
    }

    /// Number of frames the replacer may currently evict.
    pub fn evictable_count(&self) -> usize {
        self.replacer.size()
    }

    /// Picks a frame to repurpose: the free list first, then the replacer.
    /// A dirty victim is written back and unmapped before it is returned.
    fn acquire_frame(&self, state: &mut PoolState) -> Result<Option<FrameId>> {
        if let Some(frame_id) = state.free_frames.pop_front() {
            return Ok(Some(frame_id));
        }

        let frame_id = loop {
            let Some(frame_id) = self.replacer.victim() else {
                printdbg!("No free or evictable frames left");
                return Ok(None);
            };
            // a flush pins without leaving the replacer; its unpin puts the frame back
            if self.frames[frame_id].get_pin_count() == 0 {
                break frame_id;
            }
        };

        let frame = &self.frames[frame_id];
        let old_page_id = frame.get_page_id();
        debug_assert_eq!(frame.get_pin_count(), 0);

        printdbg!(
            "Page {} chosen for eviction, is dirty: {}",
            old_page_id,
            frame.is_dirty()
        );
        if frame.is_dirty() {
            let data = frame.read();
            if let Err(e) = self.disk_manager.lock().write_page(old_page_id, &data) {
                // leave the page resident and evictable
                self.replacer.unpin(frame_id);
                return Err(e);
            }
        }

        state.page_table.remove(&old_page_id);
        frame.reset(INVALID_PAGE);
        Ok(Some(frame_id))
    }

    /// Pins `page_id`, reading it from disk if needed.
    /// `Ok(None)` means every frame is pinned.
    pub fn fetch_page(&self, page_id: PageId) -> Result<Option<&Frame>> {
        if page_id == INVALID_PAGE {
            return Err(Error::InvalidPageId(page_id).into());
        }

        let mut state = self.state.lock();
        if let Some(&frame_id) = state.page_table.get(&page_id) {
            let frame = &self.frames[frame_id];
            frame.pin();
            self.replacer.pin(frame_id);
            drop(state);

            // wait out a concurrent miss that may still be reading the page in
            drop(frame.read());
            if frame.get_page_id() != page_id {
                self.release_unmapped(&mut self.state.lock(), frame_id);
                return Err(Error::PageLoadFailed(page_id).into());
            }

            printdbg!(
                "{} Fetched page {} with pin count {}",
                get_caller_name!(),
                page_id,
                frame.get_pin_count()
            );
            return Ok(Some(frame));
        }

        let Some(frame_id) = self.acquire_frame(&mut state)? else {
            return Ok(None);
        };
        let frame = &self.frames[frame_id];
        frame.reset(page_id);
        frame.pin();
        state.page_table.insert(page_id, frame_id);

        // latch before publishing so nobody sees a half-read page
        let mut data = frame.write();
        drop(state);

        printdbg!("{} Reading page {} from disk", get_caller_name!(), page_id);
        let read = self.disk_manager.lock().read_page(page_id, &mut data);
        if let Err(e) = read {
            data.fill(0);
            // before unlatching, so fetchers waiting on the latch see it
            frame.unmap();
            drop(data);

            let mut state = self.state.lock();
            if state.page_table.get(&page_id) == Some(&frame_id) {
                state.page_table.remove(&page_id);
            }
            self.release_unmapped(&mut state, frame_id);
            printdbg!("Failed to read page {}: {}", page_id, e);
            return Err(e);
        }

        Ok(Some(frame))
    }

    /// Drops one pin on a frame that lost its page to a failed read.
    /// The last pin hands the frame back to the free list.
    fn release_unmapped(&self, state: &mut PoolState, frame_id: FrameId) {
        if self.frames[frame_id].unpin() == 0 {
            state.free_frames.push_back(frame_id);
        }
    }

    /// Returns false if the page is not resident or not pinned.
    /// `is_dirty` can only set the dirty flag, never clear it.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let state = self.state.lock();
        let Some(&frame_id) = state.page_table.get(&page_id) else {
            return false;
        };

        let frame = &self.frames[frame_id];
        if frame.get_pin_count() == 0 {
            return false;
        }
        if is_dirty {
            frame.set_dirty(true);
        }

        let pin_count = frame.unpin();
        printdbg!(
            "{} page {} unpinned, pin count: {}",
            get_caller_name!(),
            page_id,
            pin_count
        );

        if pin_count == 0 {
            self.replacer.unpin(frame_id);
        }
        true
    }

    /// Allocates a page on disk and pins a zeroed frame for it.
    /// `Ok(None)` means every frame is pinned; the allocation is rolled back.
    pub fn new_page(&self) -> Result<Option<&Frame>> {
        let page_id = self.disk_manager.lock().allocate_page()?;

        let mut state = self.state.lock();
        let frame_id = match self.acquire_frame(&mut state) {
            Ok(Some(frame_id)) => frame_id,
            acquired => {
                drop(state);
                self.disk_manager.lock().deallocate_page(page_id)?;
                return acquired.map(|_| None);
            }
        };

        let frame = &self.frames[frame_id];
        frame.reset(page_id);
        frame.pin();
        state.page_table.insert(page_id, frame_id);

        let mut data = frame.write();
        drop(state);
        data.fill(0);

        printdbg!("{} Created page {}", get_caller_name!(), page_id);
        Ok(Some(frame))
    }

    /// Returns false if the page is pinned. Deleting a page that is not
    /// resident only deallocates it on disk.
    pub fn delete_page(&self, page_id: PageId) -> Result<bool> {
        let mut state = self.state.lock();

        if let Some(&frame_id) = state.page_table.get(&page_id) {
            let frame = &self.frames[frame_id];
            if frame.get_pin_count() > 0 {
                printdbg!(
                    "Page {} still has pin count {}, not deleting",
                    page_id,
                    frame.get_pin_count()
                );
                return Ok(false);
            }

            state.page_table.remove(&page_id);
            frame.reset(INVALID_PAGE);
            state.free_frames.push_back(frame_id);
            self.replacer.pin(frame_id);
        }

        self.disk_manager.lock().deallocate_page(page_id)?;
        printdbg!("Deleted page {}", page_id);
        Ok(true)
    }

    /// Writes the page back whether or not it is dirty. Returns false if it is not resident.
    /// The page keeps its place in the eviction order.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        // pinned so the frame can't be repurposed once the pool lock is gone,
        // but left in the replacer
        let (frame_id, frame) = {
            let state = self.state.lock();
            let Some(&frame_id) = state.page_table.get(&page_id) else {
                return Ok(false);
            };
            let frame = &self.frames[frame_id];
            frame.pin();
            (frame_id, frame)
        };

        let written = {
            let data = frame.read();
            if frame.get_page_id() != page_id {
                drop(data);
                self.release_unmapped(&mut self.state.lock(), frame_id);
                return Ok(false);
            }
            let was_dirty = frame.is_dirty();
            frame.set_dirty(false);
            let written = self.disk_manager.lock().write_page(page_id, &data);
            if written.is_err() && was_dirty {
                frame.set_dirty(true);
            }
            written
        };

        self.unpin_page(page_id, false);
        written.map(|_| true)
    }

    pub fn flush_all_pages(&self) -> Result<()> {
        let page_ids = self
            .state
            .lock()
            .page_table
            .keys()
            .copied()
            .collect::<Vec<_>>();

        for page_id in page_ids {
            self.flush_page(page_id)?;
        }
        Ok(())
    }

    pub fn fetch_page_pinned(&self, page_id: PageId) -> Result<PinnedPage<'_>> {
        let frame = self.fetch_page(page_id)?.ok_or(Error::PoolExhausted)?;
        Ok(PinnedPage::new(self, frame, page_id))
    }

    pub fn fetch_page_read(&self, page_id: PageId) -> Result<ReadPageGuard<'_>> {
        Ok(self.fetch_page_pinned(page_id)?.into_read())
    }

    pub fn fetch_page_write(&self, page_id: PageId) -> Result<WritePageGuard<'_>> {
        Ok(self.fetch_page_pinned(page_id)?.into_write())
    }

    /// [`BufferPoolManager::new_page`], returned write latched.
    pub fn new_page_guarded(&self) -> Result<WritePageGuard<'_>> {
        let frame = self.new_page()?.ok_or(Error::PoolExhausted)?;
        Ok(PinnedPage::new(self, frame, frame.get_page_id()).into_write())
    }
}

impl Drop for BufferPoolManager {
    fn drop(&mut self) {
        if let Err(e) = self.flush_all_pages() {
            printdbg!("Failed to flush pages on shutdown: {}", e);
        }
    }
}
