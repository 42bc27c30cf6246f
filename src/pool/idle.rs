//! The idle-connection queue: the one lock-free piece of the pool,
//! modeled on sqlx's `pool::idle::IdleQueue` (a bounded, FIFO, concurrent
//! queue of ready-to-borrow handles).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_queue::ArrayQueue;

use super::handle::HandleCore;
use super::backend::PoolBackend;

pub(crate) struct IdleQueue<B: PoolBackend> {
    queue: ArrayQueue<Arc<HandleCore<B>>>,
    len: AtomicUsize,
}

impl<B: PoolBackend> IdleQueue<B> {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            queue: ArrayQueue::new(capacity.max(1)),
            len: AtomicUsize::new(0),
        }
    }

    pub(crate) fn try_pop(&self) -> Option<Arc<HandleCore<B>>> {
        let handle = self.queue.pop()?;
        self.len.fetch_sub(1, Ordering::AcqRel);
        Some(handle)
    }

    pub(crate) fn push(&self, handle: Arc<HandleCore<B>>) {
        if self.queue.push(handle).is_err() {
            log::warn!("idle queue at capacity; dropping a ready connection handle");
            return;
        }
        self.len.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    /// Removes `target` from the queue if present, preserving the relative
    /// order of everything else. Used by maintenance eviction, which needs
    /// to pull a specific idle (but not necessarily front-of-queue) handle.
    pub(crate) fn remove(&self, target: &Arc<HandleCore<B>>) -> bool {
        let mut drained = Vec::with_capacity(self.len());
        let mut found = false;
        while let Some(handle) = self.try_pop() {
            if !found && Arc::ptr_eq(&handle, target) {
                found = true;
                continue;
            }
            drained.push(handle);
        }
        for handle in drained {
            self.push(handle);
        }
        found
    }

    pub(crate) fn clear(&self) {
        while self.try_pop().is_some() {}
    }
}
