//! Compile-time kernel configuration.
//!
//! Mirrors the teacher kernel's flat `param.rs`: a handful of `pub const`
//! sizes chosen once, rather than a runtime config file. The process
//! control core has no filesystem to read a config from (the VFS is out of
//! scope, see spec.md §1), so this is the entire configuration surface.

/// Maximum number of processes live at once.
pub const NPROC: usize = 64;

/// Maximum number of CPUs simulated by the scheduler.
pub const NCPU: usize = 8;

/// Open files per process.
pub const NOFILE: usize = 16;

/// Maximum length of a process name, including the NUL terminator.
pub const MAXPROCNAME: usize = 16;

/// Number of buckets in the pid hash table. Kept prime to spread pids
/// evenly regardless of allocation pattern (spec.md §3, "Process table").
pub const PID_BUCKETS: usize = 31;

/// Largest value a semaphore may be initialized with (spec.md §3,
/// "Semaphore"). One below `i32::MAX` so that a single `sem_post` past the
/// bound is still detectable without wrapping.
pub const SEM_VALUE_MAX: i32 = 2_147_483_640;

/// How long a blocking writer spins before switching the RW spin lock into
/// expedite mode (spec.md §4.6).
pub const WRITER_EXPEDITE_SPIN_MS: u64 = 4;

/// Number of signal numbers a `sigaction` table covers.
pub const NSIG: usize = 32;

/// The latched value `complete_all` drives a completion's `done` counter
/// to, so that every subsequent `wait_for_completion` returns immediately
/// without actually queueing (spec.md §4.8).
pub const DONE_MAX: u64 = u64::MAX;
