//! The "execution carrier": an abstraction over the hardware
//! `swtch(prev_ctx, next_ctx)` primitive (spec.md §6, §9 "coroutine-like
//! cooperative switching").
//!
//! The teacher kernel's `swtch` (`kernel-rs/src/proc/mod.rs`, `swtch.S`)
//! saves callee-saved registers into one context and restores them from
//! another; it is hand-written RISC-V assembly and has no meaning on a
//! host build. Design Notes §9 anticipates exactly this: "implementations
//! use either hand-rolled assembly (bare-metal) or green-thread libraries
//! (host tests)". This module provides both behind one trait, selected at
//! compile time with `cfg_if` the way the rest of the pack selects
//! platform backends.
//!
//! `ThreadCarrier`, the host implementation, does not multiplex many PCBs
//! onto one OS thread the way the teacher's scheduler multiplexes PCBs
//! onto one hart. Each dispatched PCB owns one parked OS thread for its
//! entire lifetime; "switching in" is unparking that thread, and
//! "switching out" is the same thread parking itself. This is a
//! deliberate simplification from the teacher's per-CPU dispatch loop,
//! recorded in DESIGN.md: on a host, the OS thread scheduler already
//! performs the real multiplexing, so the kernel-level scheduler only
//! needs to track runnability and hand out wakeups, not perform the
//! context switch itself.

use std::thread::Thread;
use std::time::Duration;

/// A carrier is responsible for parking the calling execution context and
/// resuming some other one. `Token` is the opaque word `swtch` returns in
/// the teacher's contract (spec.md §6).
pub trait ExecutionCarrier {
    type Token;

    /// Suspends the calling context until explicitly resumed.
    fn park(&self);

    /// Suspends the calling context until resumed or `timeout` elapses,
    /// whichever comes first. Backs `sched::sleep_ms` (spec.md §6
    /// `sleep(ms)`), which the bare-metal carrier would instead implement
    /// with a timer interrupt.
    fn park_timeout(&self, timeout: Duration);

    /// Resumes a previously parked context.
    fn unpark(&self);
}

/// Host carrier: backs a PCB with a real OS thread and uses
/// `std::thread::park`/`unpark` as the switch primitive. `Thread::unpark`
/// is a one-bit saturating permit, so a wakeup that arrives before the
/// corresponding `park` call is never lost — the exact property
/// `scheduler_sleep`/`wait_in_state` depend on (spec.md §4.4 "Atomic
/// sleep").
pub struct ThreadCarrier {
    thread: Thread,
}

impl ThreadCarrier {
    pub fn current() -> Self {
        Self {
            thread: std::thread::current(),
        }
    }

    pub fn for_thread(thread: Thread) -> Self {
        Self { thread }
    }
}

impl ExecutionCarrier for ThreadCarrier {
    type Token = ();

    fn park(&self) {
        std::thread::park();
    }

    fn park_timeout(&self, timeout: Duration) {
        std::thread::park_timeout(timeout);
    }

    fn unpark(&self) {
        self.thread.unpark();
    }
}

cfg_if::cfg_if! {
    if #[cfg(target_arch = "riscv64")] {
        /// Bare-metal carrier: declares the real `swtch` symbol the
        /// teacher links against (`kernel-rs/src/proc/mod.rs`). Not
        /// exercised by this crate's test suite, which only ever builds
        /// for the host target; provided so a future bare-metal build has
        /// somewhere to hang the real context-switch assembly.
        #[repr(C)]
        #[derive(Default)]
        pub struct Context {
            pub ra: usize,
            pub sp: usize,
            pub s: [usize; 12],
        }

        extern "C" {
            fn swtch(old: *mut Context, new: *mut Context);
        }

        pub struct RiscvCarrier;

        impl RiscvCarrier {
            /// # Safety
            /// `old` and `new` must be valid, non-aliasing `Context`
            /// pointers belonging to contexts that are not concurrently
            /// switched elsewhere.
            pub unsafe fn swtch(old: *mut Context, new: *mut Context) {
                unsafe { swtch(old, new) };
            }
        }
    }
}
