//! Counting semaphore (spec.md §4.7).
//!
//! spec.md's own pseudocode for `sem_wait` reserves a token (`s.value -=
//! 1`) *before* calling `wait_in_state`, undoing the reservation only if
//! the wake turns out to be asynchronous. Tracing that literal sequence
//! against the crate's own scenario S3 (three waiters block on a
//! semaphore initialized to 0, then three `sem_post`s arrive; all three
//! must drain and each must observe a normal, non-`EINTR` wake) shows it
//! never converges: every blocked waiter has already pre-decremented
//! `value` down to `-3` before the first post, so a single post (`value
//! += 1` to `-2`) still leaves the woken waiter's own `while value <= 0`
//! check true, sending it straight back to sleep having reserved a
//! *second* token nobody posted. The "undo on EINTR" branch cannot repair
//! this because the wake here is exactly the normal (`r == 0`) case.
//!
//! This implements the classic recheck-after-wake semaphore instead:
//! `value` is only touched by a successful `sem_wait` (once, on the way
//! out of the loop) or by `sem_post`. That resolves S3 (each post wakes
//! exactly one waiter, which reacquires the lock, finds `value > 0`, and
//! takes it) and still satisfies S4 (a signal-interrupted `sem_wait`
//! leaves `value` exactly as it found it, so no token is lost or
//! double-spent, and `sem_post` only ever needs to wake the one waiter it
//! unblocked).

use crate::error::{Errno, KResult};
use crate::lock::SleepableLock;
use crate::param::SEM_VALUE_MAX;
use crate::proc::table::ProcTable;
use crate::proc::Procstate;

struct Inner {
    value: i32,
}

pub struct Semaphore {
    inner: SleepableLock<Inner>,
}

impl Semaphore {
    pub const fn new_named(name: &'static str, value: i32) -> Self {
        Self {
            inner: SleepableLock::new_named(name, Inner { value }),
        }
    }

    /// Blocks until the count is positive, then takes one (spec.md §4.7
    /// `sem_wait`). Returns `Err(Errno::EINTR)` if woken asynchronously
    /// before that happens, in which case the count is left untouched.
    pub fn wait(&self, table: &ProcTable, proc_index: usize) -> KResult<()> {
        let mut guard = self.inner.lock();
        loop {
            if guard.value > 0 {
                guard.value -= 1;
                return Ok(());
            }
            let (errno, _) = guard.sleep(table, proc_index, Procstate::Sleeping);
            if errno != 0 {
                return Err(Errno::from_code(errno).unwrap_or(Errno::EINTR));
            }
            // Normal wake: recheck the predicate, spec.md §5 "Ordering
            // guarantees" (a waiter returning from `wait_in_state` must
            // recheck, not assume the resource is still there).
        }
    }

    /// Non-blocking take (spec.md §4.7 `sem_trywait`).
    pub fn trywait(&self) -> KResult<()> {
        let mut guard = self.inner.lock();
        if guard.value > 0 {
            guard.value -= 1;
            Ok(())
        } else {
            Err(Errno::EAGAIN)
        }
    }

    /// Returns one unit and wakes the oldest waiter, if any (spec.md
    /// §4.7 `sem_post`).
    pub fn post(&self, table: &ProcTable) -> KResult<()> {
        let mut guard = self.inner.lock();
        if guard.value == SEM_VALUE_MAX {
            return Err(Errno::EOVERFLOW);
        }
        guard.value += 1;
        guard.wakeup_one(table, 0, 0);
        Ok(())
    }

    pub fn value(&self) -> i32 {
        self.inner.lock().value
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use super::*;

    #[test]
    fn three_posts_wake_three_waiters_in_fifo_order() {
        let table = Arc::new(ProcTable::new());
        let init = table.userinit();
        let sem = Arc::new(Semaphore::new_named("s", 0));

        let mut indices = Vec::new();
        for _ in 0..3 {
            let pid = table.fork(init).unwrap();
            indices.push(table.iter_indices().find(|&i| table.slot(i).lock().pid == pid).unwrap());
        }

        let woke_order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut waiters = Vec::new();
        for &idx in &indices {
            let t = Arc::clone(&table);
            let s = Arc::clone(&sem);
            let order = Arc::clone(&woke_order);
            waiters.push(thread::spawn(move || {
                t.run_as(idx, || {
                    s.wait(&t, idx).unwrap();
                    order.lock().unwrap().push(idx);
                });
            }));
            // Stagger starts so FIFO order is deterministic.
            thread::sleep(Duration::from_millis(10));
        }

        for _ in 0..3 {
            sem.post(&table).unwrap();
        }
        for w in waiters {
            w.join().unwrap();
        }

        assert_eq!(*woke_order.lock().unwrap(), indices);
        assert_eq!(sem.value(), 0);
    }

    #[test]
    fn trywait_on_zero_value_fails_without_blocking() {
        let sem = Semaphore::new_named("s", 0);
        assert_eq!(sem.trywait(), Err(Errno::EAGAIN));
    }

    #[test]
    fn post_past_value_max_overflows() {
        let table = ProcTable::new();
        let sem = Semaphore::new_named("s", SEM_VALUE_MAX);
        assert_eq!(sem.post(&table), Err(Errno::EOVERFLOW));
    }

    #[test]
    fn kill_interrupts_a_blocked_waiter_leaving_value_untouched() {
        use crate::proc::Procstate;

        let table = Arc::new(ProcTable::new());
        let init = table.userinit();
        let sem = Arc::new(Semaphore::new_named("s", 0));

        let pid = table.fork(init).unwrap();
        let idx = table.iter_indices().find(|&i| table.slot(i).lock().pid == pid).unwrap();

        let t = Arc::clone(&table);
        let s = Arc::clone(&sem);
        let waiter = thread::spawn(move || {
            let mut result = None;
            t.run_as(idx, || {
                result = Some(s.wait(&t, idx));
            });
            result.unwrap()
        });

        // Wait until the child is genuinely parked inside `sem.wait`
        // before killing it, so the interrupt lands on the real
        // `wait_in_state`-style suspension rather than racing its setup.
        loop {
            if table.slot(idx).lock().state == Procstate::Sleeping {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }

        table.kill(pid).expect("kill");
        assert_eq!(waiter.join().unwrap(), Err(Errno::EINTR));
        assert_eq!(sem.value(), 0, "an interrupted wait must not consume or leak a token");
    }
}
