//! Synchronization primitives layered on the wait queues (spec.md §4.7,
//! §4.8): a counting semaphore, a sleeping mutex, and a one-shot/latching
//! completion. All three share the same shape the teacher's own
//! `Sleepablelock`-based primitives do: a small struct of plain fields
//! guarded by a `SleepableLock`, with the blocking behavior itself coming
//! entirely from `crate::lock::sleepable`.

pub mod completion;
pub mod mutex;
pub mod semaphore;

pub use completion::Completion;
pub use mutex::SleepMutex;
pub use semaphore::Semaphore;
