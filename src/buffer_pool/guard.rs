use super::frame::Frame;
use super::BufferPoolManager;
use crate::pages::{PageData, PageId};
use parking_lot::{RwLockReadGuard, RwLockWriteGuard};
use std::ops::{Deref, DerefMut};

/// A pin on a resident page, released on drop.
pub struct PinnedPage<'a> {
    bpm: &'a BufferPoolManager,
    frame: &'a Frame,
    page_id: PageId,
    is_dirty: bool,
}

impl<'a> PinnedPage<'a> {
    pub(super) fn new(bpm: &'a BufferPoolManager, frame: &'a Frame, page_id: PageId) -> Self {
        Self {
            bpm,
            frame,
            page_id,
            is_dirty: false,
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Briefly borrow the content under a shared latch.
    pub fn read(&self) -> RwLockReadGuard<'a, Box<PageData>> {
        self.frame.read()
    }

    pub fn into_read(self) -> ReadPageGuard<'a> {
        let frame = self.frame;
        ReadPageGuard {
            data: frame.read(),
            pin: self,
        }
    }

    pub fn into_write(self) -> WritePageGuard<'a> {
        let frame = self.frame;
        WritePageGuard {
            data: frame.write(),
            pin: self,
        }
    }
}

impl Drop for PinnedPage<'_> {
    fn drop(&mut self) {
        self.bpm.unpin_page(self.page_id, self.is_dirty);
    }
}

// Field order matters in both guards: the latch is released before the pin.

/// Pinned page held under a shared latch.
pub struct ReadPageGuard<'a> {
    data: RwLockReadGuard<'a, Box<PageData>>,
    pin: PinnedPage<'a>,
}

impl<'a> ReadPageGuard<'a> {
    pub fn page_id(&self) -> PageId {
        self.pin.page_id
    }

    /// Drops the latch but keeps the page pinned.
    pub fn into_pinned(self) -> PinnedPage<'a> {
        let ReadPageGuard { data, pin } = self;
        drop(data);
        pin
    }
}

impl Deref for ReadPageGuard<'_> {
    type Target = PageData;

    fn deref(&self) -> &Self::Target {
        &self.data
    }
}

/// Pinned page held under an exclusive latch. Any mutable access marks it dirty.
pub struct WritePageGuard<'a> {
    data: RwLockWriteGuard<'a, Box<PageData>>,
    pin: PinnedPage<'a>,
}

impl<'a> WritePageGuard<'a> {
    pub fn page_id(&self) -> PageId {
        self.pin.page_id
    }

    pub fn into_pinned(self) -> PinnedPage<'a> {
        let WritePageGuard { data, pin } = self;
        drop(data);
        pin
    }
}

impl Deref for WritePageGuard<'_> {
    type Target = PageData;

    fn deref(&self) -> &Self::Target {
        &self.data
    }
}

impl DerefMut for WritePageGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.pin.is_dirty = true;
        &mut self.data
    }
}
