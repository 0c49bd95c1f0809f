//! Completion (spec.md §4.8): a one-shot-or-repeatable event a waiter can
//! block on until someone signals it.

use crate::error::{Errno, KResult};
use crate::lock::SleepableLock;
use crate::param::DONE_MAX;
use crate::proc::table::ProcTable;
use crate::proc::Procstate;

struct Inner {
    done: u64,
}

pub struct Completion {
    inner: SleepableLock<Inner>,
}

impl Completion {
    pub const fn new_named(name: &'static str) -> Self {
        Self {
            inner: SleepableLock::new_named(name, Inner { done: 0 }),
        }
    }

    /// Blocks until a completion is available, consuming one, unless the
    /// completion has been latched by `complete_all` in which case every
    /// call returns immediately without consuming anything (spec.md §4.8).
    pub fn wait(&self, table: &ProcTable, proc_index: usize) -> KResult<()> {
        let mut guard = self.inner.lock();
        loop {
            if guard.done == DONE_MAX {
                return Ok(());
            }
            if guard.done > 0 {
                guard.done -= 1;
                return Ok(());
            }
            let (errno, _) = guard.sleep(table, proc_index, Procstate::Sleeping);
            if errno != 0 {
                return Err(Errno::from_code(errno).unwrap_or(Errno::EINTR));
            }
        }
    }

    /// Signals one waiter (spec.md §4.8 `complete`).
    pub fn complete(&self, table: &ProcTable) {
        let mut guard = self.inner.lock();
        if guard.done != DONE_MAX {
            guard.done += 1;
        }
        guard.wakeup_one(table, 0, 0);
    }

    /// Wakes every current and future waiter until `reinit` (spec.md §4.8
    /// `complete_all`).
    pub fn complete_all(&self, table: &ProcTable) {
        let mut guard = self.inner.lock();
        guard.done = DONE_MAX;
        guard.wakeup_all(table, 0, 0);
    }

    /// Resets the completion to its initial, unsignaled state (spec.md
    /// §4.8 `completion_reinit`). Holding the lock for the whole
    /// operation is what satisfies "must not race with waiters".
    pub fn reinit(&self) {
        self.inner.lock().done = 0;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use super::*;

    #[test]
    fn complete_all_latches_until_reinit() {
        let table = Arc::new(ProcTable::new());
        let init = table.userinit();
        let completion = Arc::new(Completion::new_named("c"));
        completion.complete_all(&table);

        completion.wait(&table, init).expect("latched completion returns immediately");
        completion.wait(&table, init).expect("still latched after one consumer");

        completion.reinit();
        assert!(completion.inner.lock().done == 0);
    }

    #[test]
    fn single_complete_wakes_exactly_one_waiter() {
        let table = Arc::new(ProcTable::new());
        let init = table.userinit();
        let completion = Arc::new(Completion::new_named("c"));

        let pid1 = table.fork(init).unwrap();
        let idx1 = table.iter_indices().find(|&i| table.slot(i).lock().pid == pid1).unwrap();
        let pid2 = table.fork(init).unwrap();
        let idx2 = table.iter_indices().find(|&i| table.slot(i).lock().pid == pid2).unwrap();

        let t1 = Arc::clone(&table);
        let c1 = Arc::clone(&completion);
        let w1 = thread::spawn(move || t1.run_as(idx1, || c1.wait(&t1, idx1).unwrap()));
        let t2 = Arc::clone(&table);
        let c2 = Arc::clone(&completion);
        let w2 = thread::spawn(move || t2.run_as(idx2, || c2.wait(&t2, idx2).unwrap()));

        thread::sleep(Duration::from_millis(20));
        completion.complete(&table);

        thread::sleep(Duration::from_millis(20));
        assert_eq!(completion.inner.lock().done, 0);

        completion.complete(&table);
        w1.join().unwrap();
        w2.join().unwrap();
    }
}
