//! Spin locks (spec.md §4.2).
//!
//! Transposes the teacher's `RawSpinlock`
//! (`examples/kaist-cp-rv6/kernel-rs/src/lock/spinlock.rs`): the lock word
//! holds the id of the owning execution context (there: a `*mut Cpu`;
//! here: the numeric id from `crate::cpu::current_execution_id`) instead
//! of `null`/non-null, so `holding()` can tell self-recursion apart from
//! contention. Acquiring disables the nesting-counted "interrupts" via
//! `push_off`; releasing restores them via `pop_off`, exactly as in the
//! teacher.

use std::hint::spin_loop;
use std::sync::atomic::{AtomicU64, Ordering};

use super::{Lock, RawLock};
use crate::cpu::{current_execution_id, pop_off, push_off};

const UNLOCKED: u64 = 0;

/// Mutual exclusion lock that busy-waits.
pub struct RawSpinlock {
    name: &'static str,
    /// 0 when unlocked; otherwise the holder's execution id.
    locked: AtomicU64,
}

pub type Spinlock<T> = Lock<RawSpinlock, T>;
pub type SpinlockGuard<'s, T> = super::Guard<'s, RawSpinlock, T>;

impl RawSpinlock {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            locked: AtomicU64::new(UNLOCKED),
        }
    }
}

impl RawLock for RawSpinlock {
    /// Acquires the lock. Spins until successful.
    ///
    /// # Panics
    /// Fatal (spec.md §4.2) if the calling thread already holds this lock.
    fn acquire(&self) {
        push_off();
        assert!(!self.holding(), "acquire: already holding {}", self.name);

        let me = current_execution_id();
        while self
            .locked
            .compare_exchange(UNLOCKED, me, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            spin_loop();
        }
    }

    fn release(&self) {
        assert!(self.holding(), "release: not holding {}", self.name);
        self.locked.store(UNLOCKED, Ordering::Release);
        pop_off();
    }

    fn holding(&self) -> bool {
        self.locked.load(Ordering::Relaxed) == current_execution_id()
    }
}

impl<T> Spinlock<T> {
    pub const fn new_named(name: &'static str, data: T) -> Self {
        Lock::new(RawSpinlock::new(name), data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn mutual_exclusion_across_threads() {
        let lock = Arc::new(Spinlock::new_named("counter", 0_u64));
        let mut handles = vec![];
        for _ in 0..8 {
            let lock = Arc::clone(&lock);
            handles.push(thread::spawn(move || {
                for _ in 0..1000 {
                    *lock.lock() += 1;
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(*lock.lock(), 8000);
    }

    #[test]
    #[should_panic(expected = "already holding")]
    fn reacquire_by_same_thread_is_fatal() {
        let lock = Spinlock::new_named("reentrant", ());
        let _g1 = lock.lock();
        let _g2 = lock.lock();
    }
}
