//! Frame scheduling primitives.
//!
//! A [`FrameScheduler`] hands out opaque handles for one-shot "before next
//! paint" callbacks. [`FrameQueue`] is the in-process implementation: the host
//! calls [`FrameQueue::fire`] once per display refresh.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::time::Duration;

use tracing::trace;

/// Identifies one pending frame request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FrameHandle(u64);

pub type FrameCallback = Box<dyn FnOnce(Duration)>;

/// Source of one-shot frame callbacks.
pub trait FrameScheduler {
    /// Queues `callback` to run with the frame timestamp at the next refresh.
    fn request(&self, callback: FrameCallback) -> FrameHandle;
    /// Drops a pending request. Unknown or already-fired handles are ignored.
    fn cancel(&self, handle: FrameHandle);
}

/// Callbacks queued for the next refresh, fired in request order.
#[derive(Default)]
pub struct FrameQueue {
    pending: RefCell<BTreeMap<FrameHandle, FrameCallback>>,
    next_id: Cell<u64>,
}

impl FrameQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs every callback that was pending when the call began.
    ///
    /// Callbacks requested while firing wait for the next call. Returns the
    /// number of callbacks invoked.
    pub fn fire(&self, timestamp: Duration) -> usize {
        let due = std::mem::take(&mut *self.pending.borrow_mut());
        let count = due.len();
        for (handle, callback) in due {
            trace!(?handle, ?timestamp, "firing frame callback");
            callback(timestamp);
        }
        count
    }

    pub fn pending(&self) -> usize {
        self.pending.borrow().len()
    }
}

impl FrameScheduler for FrameQueue {
    fn request(&self, callback: FrameCallback) -> FrameHandle {
        let id = self.next_id.get();
        self.next_id.set(id.wrapping_add(1));
        let handle = FrameHandle(id);
        self.pending.borrow_mut().insert(handle, callback);
        handle
    }

    fn cancel(&self, handle: FrameHandle) {
        self.pending.borrow_mut().remove(&handle);
    }
}
