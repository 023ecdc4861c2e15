use super::FrameId;
use parking_lot::Mutex;

/// Tracks the frames that may be evicted. The pool calls it under its own
/// lock, but implementations are still internally synchronized.
pub(crate) trait Replacer: Send + Sync {
    /// Removes and returns the frame to evict, if any.
    fn victim(&self) -> Option<FrameId>;

    /// The frame is in use and must not be evicted.
    fn pin(&self, frame_id: FrameId);

    /// The frame's pin count dropped to zero. No-op if it is already tracked.
    fn unpin(&self, frame_id: FrameId);

    /// Number of evictable frames.
    fn size(&self) -> usize;
}

const NIL: usize = usize::MAX;

#[derive(Clone, Copy)]
struct Link {
    prev: usize,
    next: usize,
    tracked: bool,
}

/// Doubly linked list threaded through a vec indexed by frame id.
/// `head` is the most recently unpinned frame, `tail` the victim.
struct LruList {
    links: Vec<Link>,
    head: usize,
    tail: usize,
    len: usize,
}

impl LruList {
    fn detach(&mut self, frame_id: FrameId) {
        let Link { prev, next, .. } = self.links[frame_id];
        match prev {
            NIL => self.head = next,
            prev => self.links[prev].next = next,
        }
        match next {
            NIL => self.tail = prev,
            next => self.links[next].prev = prev,
        }
        self.links[frame_id] = Link {
            prev: NIL,
            next: NIL,
            tracked: false,
        };
        self.len -= 1;
    }

    fn push_front(&mut self, frame_id: FrameId) {
        self.links[frame_id] = Link {
            prev: NIL,
            next: self.head,
            tracked: true,
        };
        match self.head {
            NIL => self.tail = frame_id,
            head => self.links[head].prev = frame_id,
        }
        self.head = frame_id;
        self.len += 1;
    }
}

/// Least-recently-unpinned replacement, O(1) for every operation.
pub(crate) struct LruReplacer {
    inner: Mutex<LruList>,
}

impl LruReplacer {
    pub fn new(num_frames: usize) -> Self {
        Self {
            inner: Mutex::new(LruList {
                links: vec![
                    Link {
                        prev: NIL,
                        next: NIL,
                        tracked: false,
                    };
                    num_frames
                ],
                head: NIL,
                tail: NIL,
                len: 0,
            }),
        }
    }
}

impl Replacer for LruReplacer {
    fn victim(&self) -> Option<FrameId> {
        let mut list = self.inner.lock();
        let frame_id = list.tail;
        if frame_id == NIL {
            return None;
        }
        list.detach(frame_id);
        Some(frame_id)
    }

    fn pin(&self, frame_id: FrameId) {
        let mut list = self.inner.lock();
        if list.links.get(frame_id).is_some_and(|l| l.tracked) {
            list.detach(frame_id);
        }
    }

    fn unpin(&self, frame_id: FrameId) {
        let mut list = self.inner.lock();
        // the capacity check only matters for ids the pool never handed out
        if list.len >= list.links.len() {
            return;
        }
        if list.links.get(frame_id).is_some_and(|l| !l.tracked) {
            list.push_front(frame_id);
        }
    }

    fn size(&self) -> usize {
        self.inner.lock().len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_victim_order() {
        let replacer = LruReplacer::new(7);

        for frame in [1, 2, 3, 4, 5, 6, 1] {
            replacer.unpin(frame);
        }
        assert_eq!(replacer.size(), 6);

        assert_eq!(replacer.victim(), Some(1));
        assert_eq!(replacer.victim(), Some(2));
        assert_eq!(replacer.victim(), Some(3));

        replacer.pin(3);
        replacer.pin(4);
        assert_eq!(replacer.size(), 2);

        replacer.unpin(4);
        assert_eq!(replacer.victim(), Some(5));
        assert_eq!(replacer.victim(), Some(6));
        assert_eq!(replacer.victim(), Some(4));
        assert_eq!(replacer.victim(), None);
        assert_eq!(replacer.size(), 0);
    }

    #[test]
    fn test_pin_untracked_and_out_of_range() {
        let replacer = LruReplacer::new(2);
        replacer.pin(0);
        replacer.unpin(9);
        assert_eq!(replacer.size(), 0);

        replacer.unpin(0);
        replacer.unpin(1);
        replacer.pin(0);
        assert_eq!(replacer.victim(), Some(1));
        assert_eq!(replacer.victim(), None);
    }
}
