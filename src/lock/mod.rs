//! Lock types and the traits that express their behavior.
//!
//! Generalizes the teacher's `lock::{RawLock, Lock, Guard}` triad
//! (`examples/kaist-cp-rv6/kernel-rs/src/lock/mod.rs`,
//! `lock/spinlock.rs`): a `RawLock` is a bare acquire/release/holding
//! primitive, and `Lock<R, T>` pairs one with the data it protects so that
//! the data can only be reached through a `Guard`.

use std::cell::UnsafeCell;
use std::ops::{Deref, DerefMut};

mod spinlock;
pub use spinlock::{RawSpinlock, Spinlock, SpinlockGuard};

pub mod rwlock;
pub use rwlock::RwSpinLock;

pub mod sleepable;
pub use sleepable::{SleepableLock, SleepableLockGuard};

/// A bare mutual-exclusion primitive: acquire, release, and a way to ask
/// whether the calling thread currently holds it.
pub trait RawLock {
    fn acquire(&self);
    fn release(&self);
    fn holding(&self) -> bool;
}

/// A lock that owns both a `RawLock` and the data it protects.
pub struct Lock<R: RawLock, T> {
    lock: R,
    data: UnsafeCell<T>,
}

// The lock itself serializes access to `data`; sharing a `&Lock<R, T>`
// across threads is safe as long as `T: Send`, exactly as the teacher's
// `unsafe impl<R: RawLock, T: Send> Sync for Lock<R, T>` asserts.
unsafe impl<R: RawLock, T: Send> Sync for Lock<R, T> {}

/// An RAII guard granting exclusive access to a `Lock<R, T>`'s data.
pub struct Guard<'s, R: RawLock, T> {
    lock: &'s Lock<R, T>,
}

impl<R: RawLock, T> Lock<R, T> {
    pub const fn new(lock: R, data: T) -> Self {
        Self {
            lock,
            data: UnsafeCell::new(data),
        }
    }

    pub fn lock(&self) -> Guard<'_, R, T> {
        self.lock.acquire();
        Guard { lock: self }
    }

    /// Returns a raw pointer to the protected data without acquiring the
    /// lock. The caller must already hold the lock (e.g. because it is
    /// reconstructing a `Guard` after `mem::forget`-ing the original one).
    pub fn get_mut_raw(&self) -> *mut T {
        self.data.get()
    }

    /// Unlocks a lock that was acquired and then `mem::forget`-ten, the
    /// way `ProcGuard::drop` does in the teacher.
    ///
    /// # Safety
    /// Must pair with exactly one outstanding, forgotten acquisition.
    pub unsafe fn unlock(&self) {
        self.lock.release();
    }

    pub fn holding(&self) -> bool {
        self.lock.holding()
    }

    pub fn raw(&self) -> &R {
        &self.lock
    }
}

impl<'s, R: RawLock, T> Guard<'s, R, T> {
    /// Temporarily releases the inner raw lock for the duration of `f`,
    /// then reacquires it. Used by the wait-queue sleep path to drop a
    /// caller-supplied lock around the suspend point, mirroring
    /// `ProcGuard::reacquire_after` in the teacher.
    pub fn reacquire_after<Func, Out>(&mut self, f: Func) -> Out
    where
        Func: FnOnce() -> Out,
    {
        self.lock.lock.release();
        let out = f();
        self.lock.lock.acquire();
        out
    }

    pub fn raw_release(&mut self) {
        self.lock.lock.release();
    }

    pub fn raw_acquire(&mut self) {
        self.lock.lock.acquire();
    }

    /// The raw lock backing this guard. Used by lock variants that stash
    /// extra state (e.g. a wait queue) alongside the acquire/release pair,
    /// the way `lock::sleepable::SleepableLockGuard` reaches its queue.
    pub(crate) fn raw(&self) -> &R {
        &self.lock.lock
    }
}

impl<R: RawLock, T> Deref for Guard<'_, R, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: holding the guard implies holding the lock.
        unsafe { &*self.lock.data.get() }
    }
}

impl<R: RawLock, T> DerefMut for Guard<'_, R, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: holding the guard implies exclusive access to the data.
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<R: RawLock, T> Drop for Guard<'_, R, T> {
    fn drop(&mut self) {
        self.lock.lock.release();
    }
}
