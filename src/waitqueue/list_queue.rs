//! FIFO wait queue (spec.md §4.3.1).

use std::sync::Arc;

use super::Waiter;
use crate::ds::list::{Handle, List};

/// An ordered collection of sleepers, woken oldest-first.
pub struct ListWaitQueue {
    waiters: List<Arc<Waiter>>,
}

impl Default for ListWaitQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl ListWaitQueue {
    pub const fn new() -> Self {
        Self { waiters: List::new() }
    }

    pub fn len(&self) -> usize {
        self.waiters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }

    /// Appends `waiter`; its back-pointer (here, simply "present in this
    /// list") becomes non-null (spec.md §3).
    pub fn push(&mut self, waiter: Arc<Waiter>) -> Handle {
        self.waiters.push_back(waiter)
    }

    /// Detaches a specific still-enqueued waiter, e.g. for the
    /// self-removal step of `wait_in_state` after an asynchronous wake.
    pub fn remove(&mut self, handle: Handle) -> Arc<Waiter> {
        self.waiters.remove(handle)
    }

    /// Pops the head, records its result, and hands back the woken PCB's
    /// index so the caller can mark it runnable.
    pub fn wakeup_one(&mut self, errno: i32, data: u64) -> Option<usize> {
        let waiter = self.waiters.pop_front()?;
        waiter.set_result(errno, data);
        Some(waiter.proc_index)
    }

    /// Drains the queue by repeated `wakeup_one`, per spec.md §4.3.1.
    pub fn wakeup_all(&mut self, errno: i32, data: u64) -> Vec<usize> {
        let mut woken = Vec::new();
        while let Some(idx) = self.wakeup_one(errno, data) {
            woken.push(idx);
        }
        woken
    }

    /// Splices every waiter of `other` into `self` in O(1); `self` must be
    /// empty beforehand (spec.md §4.3.1 `bulk_move`).
    pub fn bulk_move_from(&mut self, other: &mut ListWaitQueue) {
        self.waiters.bulk_move_from(&mut other.waiters);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_wakeup_order() {
        let mut q = ListWaitQueue::new();
        let a = Arc::new(Waiter::new(10));
        let b = Arc::new(Waiter::new(20));
        let c = Arc::new(Waiter::new(30));
        q.push(Arc::clone(&a));
        q.push(Arc::clone(&b));
        q.push(Arc::clone(&c));

        assert_eq!(q.wakeup_one(0, 0), Some(10));
        assert_eq!(q.wakeup_one(0, 0), Some(20));
        assert_eq!(q.wakeup_one(0, 0), Some(30));
        assert_eq!(q.wakeup_one(0, 0), None);
        assert_eq!(a.result(), (0, 0));
    }

    #[test]
    fn wakeup_all_drains_in_order() {
        let mut q = ListWaitQueue::new();
        for i in 0..5u64 {
            q.push(Arc::new(Waiter::new(i as usize)));
        }
        let order = q.wakeup_all(0, 7);
        assert_eq!(order, vec![0, 1, 2, 3, 4]);
        assert!(q.is_empty());
    }

    #[test]
    fn remove_specific_waiter_before_wakeup() {
        let mut q = ListWaitQueue::new();
        let a = Arc::new(Waiter::new(1));
        let h = q.push(Arc::clone(&a));
        q.push(Arc::new(Waiter::new(2)));
        let removed = q.remove(h);
        assert_eq!(removed.proc_index, 1);
        assert_eq!(q.len(), 1);
    }
}
