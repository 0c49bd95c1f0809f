//! Key-ordered wait queue (spec.md §4.3.2), keyed by a caller-supplied
//! `u64` priority (a timer deadline, in `sched::timer`'s case).

use std::sync::Arc;

use super::Waiter;
use crate::ds::rbtree::{Handle, RbTree};

/// An ordered collection of sleepers, woken in ascending key order; ties
/// are broken by arena-index order (spec.md §5(b), the address-tiebreak
/// stand-in `ds::rbtree` documents).
pub struct TreeWaitQueue {
    waiters: RbTree<Arc<Waiter>>,
}

impl Default for TreeWaitQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl TreeWaitQueue {
    pub const fn new() -> Self {
        Self { waiters: RbTree::new() }
    }

    pub fn len(&self) -> usize {
        self.waiters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }

    pub fn push(&mut self, key: u64, waiter: Arc<Waiter>) -> Handle {
        self.waiters.insert(key, waiter)
    }

    pub fn remove(&mut self, handle: Handle) -> Arc<Waiter> {
        self.waiters.remove(handle)
    }

    /// Peeks the minimum key without removing it (spec.md §4.3.2 `first`
    /// / `key_min`).
    pub fn key_min(&self) -> Option<u64> {
        self.waiters.min_handle().map(|h| self.waiters.key_of(h))
    }

    /// Wakes the minimum-address waiter whose key equals `key`, if any.
    pub fn wakeup_one_key(&mut self, key: u64, errno: i32, data: u64) -> Option<usize> {
        let handle = self.waiters.find_first_with_key(key)?;
        let (_, waiter) = (key, self.waiters.remove(handle));
        waiter.set_result(errno, data);
        Some(waiter.proc_index)
    }

    /// Wakes every waiter whose key equals `key`.
    pub fn wakeup_key(&mut self, key: u64, errno: i32, data: u64) -> Vec<usize> {
        let mut woken = Vec::new();
        while let Some(idx) = self.wakeup_one_key(key, errno, data) {
            woken.push(idx);
        }
        woken
    }

    /// Wakes the globally minimum-keyed waiter.
    pub fn wakeup_one(&mut self, errno: i32, data: u64) -> Option<usize> {
        let (_, waiter) = self.waiters.remove_min()?;
        waiter.set_result(errno, data);
        Some(waiter.proc_index)
    }

    /// Drains every waiter in ascending key order (spec.md §4.3.2
    /// `wakeup_all`).
    pub fn wakeup_all(&mut self, errno: i32, data: u64) -> Vec<usize> {
        let mut woken = Vec::new();
        while let Some(idx) = self.wakeup_one(errno, data) {
            woken.push(idx);
        }
        woken
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wakes_minimum_key_first() {
        let mut q = TreeWaitQueue::new();
        let ten = Arc::new(Waiter::new(100));
        let five = Arc::new(Waiter::new(200));
        let seven = Arc::new(Waiter::new(300));
        q.push(10, Arc::clone(&ten));
        q.push(5, Arc::clone(&five));
        q.push(7, Arc::clone(&seven));

        assert_eq!(q.wakeup_one(0, 0), Some(200));
        assert_eq!(q.wakeup_one(0, 0), Some(300));
        assert_eq!(q.wakeup_one(0, 0), Some(100));
    }

    #[test]
    fn wakeup_one_key_picks_first_inserted_duplicate() {
        let mut q = TreeWaitQueue::new();
        q.push(5, Arc::new(Waiter::new(1)));
        q.push(5, Arc::new(Waiter::new(2)));
        assert_eq!(q.wakeup_one_key(5, 0, 0), Some(1));
        assert_eq!(q.wakeup_one_key(5, 0, 0), Some(2));
        assert_eq!(q.wakeup_one_key(5, 0, 0), None);
    }
}
