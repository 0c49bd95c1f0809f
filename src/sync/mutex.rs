//! Sleeping mutex (spec.md §4.8).
//!
//! `lock` spins/sleeps on `locked` through the lock's own wait queue;
//! `unlock` pops the oldest waiter, which becomes the new holder upon
//! return from its wait. `holder` is diagnostic only (spec.md §3
//! "`holder` is for diagnostics") — nothing enforces that the unlocker is
//! the holder, mirroring the teacher leaving that to caller discipline.

use crate::error::{Errno, KResult};
use crate::lock::SleepableLock;
use crate::proc::table::ProcTable;
use crate::proc::{Pid, Procstate};

struct Inner {
    locked: bool,
    holder: Pid,
}

pub struct SleepMutex {
    inner: SleepableLock<Inner>,
}

impl SleepMutex {
    pub const fn new_named(name: &'static str) -> Self {
        Self {
            inner: SleepableLock::new_named(
                name,
                Inner {
                    locked: false,
                    holder: 0,
                },
            ),
        }
    }

    /// Blocks until the mutex is free, then takes it (spec.md §4.8
    /// `mutex_lock`). Returns `Err(Errno::EINTR)` on an asynchronous wake
    /// without ever having taken the lock.
    pub fn lock(&self, table: &ProcTable, proc_index: usize) -> KResult<()> {
        let mut guard = self.inner.lock();
        while guard.locked {
            let (errno, _) = guard.sleep(table, proc_index, Procstate::Sleeping);
            if errno != 0 {
                return Err(Errno::from_code(errno).unwrap_or(Errno::EINTR));
            }
        }
        guard.locked = true;
        guard.holder = table.pid_of(proc_index);
        Ok(())
    }

    /// Releases the mutex and wakes the oldest waiter, which becomes the
    /// new holder upon its own return from `lock` (spec.md §4.8
    /// `mutex_unlock`).
    pub fn unlock(&self, table: &ProcTable) {
        let mut guard = self.inner.lock();
        guard.locked = false;
        guard.holder = 0;
        guard.wakeup_one(table, 0, 0);
    }

    pub fn holder(&self) -> Pid {
        self.inner.lock().holder
    }

    pub fn is_locked(&self) -> bool {
        self.inner.lock().locked
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use super::*;

    #[test]
    fn second_locker_blocks_until_first_unlocks() {
        let table = Arc::new(ProcTable::new());
        let init = table.userinit();
        let mutex = Arc::new(SleepMutex::new_named("m"));

        let pid1 = table.fork(init).unwrap();
        let idx1 = table.iter_indices().find(|&i| table.slot(i).lock().pid == pid1).unwrap();
        let pid2 = table.fork(init).unwrap();
        let idx2 = table.iter_indices().find(|&i| table.slot(i).lock().pid == pid2).unwrap();

        mutex.lock(&table, idx1).unwrap();
        assert_eq!(mutex.holder(), pid1);

        let t = Arc::clone(&table);
        let m = Arc::clone(&mutex);
        let second = thread::spawn(move || {
            t.run_as(idx2, || {
                m.lock(&t, idx2).unwrap();
            });
        });

        thread::sleep(Duration::from_millis(20));
        assert!(mutex.is_locked());
        assert_eq!(mutex.holder(), pid1);

        mutex.unlock(&table);
        second.join().unwrap();
        assert_eq!(mutex.holder(), pid2);
    }
}
