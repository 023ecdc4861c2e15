use super::FrameId;
use crate::pages::{PageData, PageId, INVALID_PAGE, PAGE_SIZE};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};

/// One slot of the pool. Metadata is atomic so it can be inspected without the
/// page latch; the page bytes sit behind the latch itself.
///
/// `page_id` and the pin count only change while the pool lock is held, except
/// for a failed read, which unmaps the frame while still holding its latch.
pub struct Frame {
    id: FrameId,
    page_id: AtomicI64,
    pin_count: AtomicU32,
    is_dirty: AtomicBool,
    data: RwLock<Box<PageData>>,
}

impl Frame {
    pub(super) fn new(id: FrameId) -> Self {
        Self {
            id,
            page_id: AtomicI64::new(INVALID_PAGE),
            pin_count: AtomicU32::new(0),
            is_dirty: AtomicBool::new(false),
            data: RwLock::new(Box::new([0; PAGE_SIZE])),
        }
    }

    pub fn get_page_id(&self) -> PageId {
        self.page_id.load(Ordering::Acquire)
    }

    pub fn get_pin_count(&self) -> u32 {
        self.pin_count.load(Ordering::Acquire)
    }

    pub fn is_dirty(&self) -> bool {
        self.is_dirty.load(Ordering::Acquire)
    }

    /// Shared page latch.
    pub fn read(&self) -> RwLockReadGuard<'_, Box<PageData>> {
        self.data.read()
    }

    /// Exclusive page latch.
    pub fn write(&self) -> RwLockWriteGuard<'_, Box<PageData>> {
        self.data.write()
    }

    pub(super) fn pin(&self) {
        self.pin_count.fetch_add(1, Ordering::AcqRel);
    }

    /// Returns the pin count after the decrement.
    pub(super) fn unpin(&self) -> u32 {
        let prev = self.pin_count.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "frame {} unpinned below zero", self.id);
        prev - 1
    }

    pub(super) fn set_dirty(&self, is_dirty: bool) {
        self.is_dirty.store(is_dirty, Ordering::Release);
    }

    /// Marks the frame as holding no page. Pins are left alone.
    pub(super) fn unmap(&self) {
        self.page_id.store(INVALID_PAGE, Ordering::Release);
        self.is_dirty.store(false, Ordering::Release);
    }

    /// Rebinds the frame to `page_id`, unpinned and clean. Does not touch the bytes.
    pub(super) fn reset(&self, page_id: PageId) {
        self.page_id.store(page_id, Ordering::Release);
        self.pin_count.store(0, Ordering::Release);
        self.is_dirty.store(false, Ordering::Release);
    }
}
