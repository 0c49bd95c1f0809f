//! Wait queues: the FIFO and key-ordered variants of spec.md §3/§4.3, and
//! the shared `Waiter` node both build on.
//!
//! The teacher has no standalone wait-queue type — `WaitChannel`
//! (`kernel-rs/src/proc/wait_channel.rs`) is a zero-sized rendezvous
//! token and the actual queueing is "scan the whole process pool". §3
//! upgrades that into real queues with FIFO and tree-ordered variants, so
//! these containers are new, built directly on the `ds::list`/`ds::rbtree`
//! arenas and the `Waiter` shape spec.md §3 lays out: "queue-kind tag,
//! embedded list/tree hook, back-pointer to the queue, an error code slot
//! ..., a 64-bit data payload, and a pointer to the waiting PCB."

pub mod list_queue;
pub mod tree_queue;

pub use list_queue::ListWaitQueue;
pub use tree_queue::TreeWaitQueue;

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering};

use crate::error::Errno;

/// One blocked caller. Lives for the duration of a single `wait_in_state`
/// call; shared (via `Arc`) between the queue slot that may hold it and
/// the stack frame of the thread that is sleeping on it, so that an
/// asynchronous wake (signal, timer, direct channel wake) can record a
/// result without needing the waiting thread's cooperation.
pub struct Waiter {
    /// Arena index of the PCB this waiter represents (spec.md §3,
    /// "a pointer to the waiting PCB" — an index plays that role here,
    /// per spec.md §9's "arenas + indices" design note).
    pub proc_index: usize,
    /// Preset to `EINTR` before suspension (spec.md §4.3.3 step 1).
    errno: AtomicI32,
    data: AtomicU64,
    /// Whether some `wakeup_*` call has already popped this waiter out of
    /// its queue. `wait_in_state`'s step 6 ("if the waiter is still
    /// enqueued, self-remove it") needs this to tell a normal wakeup apart
    /// from an asynchronous one without touching the queue's internal
    /// slots twice.
    dequeued: AtomicBool,
}

impl Waiter {
    pub fn new(proc_index: usize) -> Self {
        Self {
            proc_index,
            errno: AtomicI32::new(Errno::EINTR.code()),
            data: AtomicU64::new(0),
            dequeued: AtomicBool::new(false),
        }
    }

    /// Recorded by whichever `wakeup_*` call removes this waiter from its
    /// queue (or by a timeout/signal path that never touches the queue at
    /// all).
    pub fn set_result(&self, errno: i32, data: u64) {
        self.data.store(data, Ordering::Relaxed);
        self.errno.store(errno, Ordering::Release);
        self.dequeued.store(true, Ordering::Release);
    }

    /// Read back by the waiting thread once it resumes.
    pub fn result(&self) -> (i32, u64) {
        (self.errno.load(Ordering::Acquire), self.data.load(Ordering::Relaxed))
    }

    /// Whether a `wakeup_*` call has already popped this waiter. `false`
    /// means the caller woke for some other reason (signal, direct
    /// channel wake) and must self-remove from the queue.
    pub fn is_dequeued(&self) -> bool {
        self.dequeued.load(Ordering::Acquire)
    }
}
