//! A process table, wait queues, and the blocking synchronization
//! primitives layered on them for a small POSIX-style RISC-V kernel
//! (spec.md §1 OVERVIEW).
//!
//! Ported from the teacher kernel's equivalent modules
//! (`examples/kaist-cp-rv6/kernel-rs`), generalizing its raw-pointer
//! intrusive containers into arena-indexed ones and its per-CPU dispatch
//! loop into the `crate::carrier`/`crate::sched` pairing described in
//! each module's own doc comment. The outer surfaces the teacher's
//! kernel needs to actually boot and run processes — the VFS, user-space
//! memory, trap handling, the RISC-V boot sequence itself — are out of
//! scope (spec.md §1 Non-goals); what is here is the process-control
//! core plus everything it cannot be tested without: a PCB/process
//! table, wait queues, a spinlock/RW-spinlock family, a scheduler
//! wrapper around the host thread scheduler, timers, a semaphore/mutex/
//! completion family, and signal delivery.

pub mod carrier;
pub mod cpu;
pub mod ds;
pub mod error;
pub mod lock;
pub mod param;
pub mod proc;
pub mod sched;
pub mod signal;
pub mod sync;
pub mod waitqueue;

pub use error::{Errno, KResult};
pub use proc::table::ProcTable;
pub use proc::{Pid, Procstate};
