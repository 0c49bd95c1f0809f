//! Per-CPU bookkeeping and the `push_off`/`pop_off` interrupt-nesting
//! facility (spec.md §4.2, §6 "CPU glue").
//!
//! The teacher kernel identifies "the current CPU" with `cpuid()`, a
//! hart-id register read that is only valid with interrupts disabled, and
//! keeps one `Cpu` struct per hart in a fixed `[Cpu; NCPU]` array
//! (`cpu.rs`). On a host build there are no harts, only OS threads, so the
//! role of "the current CPU" is played by the calling thread: each thread
//! that touches a spinlock is assigned a stable numeric id the first time
//! it does so, exactly as `RawSpinlock` in the teacher records the owning
//! `Cpu`'s address.

use std::cell::Cell;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_EXECUTION_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static EXECUTION_ID: u64 = NEXT_EXECUTION_ID.fetch_add(1, Ordering::Relaxed);
    static CPU: Cpu = Cpu::new();
}

/// Returns a stable id for the calling thread, standing in for `cpuid()`.
pub fn current_execution_id() -> u64 {
    EXECUTION_ID.with(|id| *id)
}

/// Per-CPU (here, per-thread) scheduling bookkeeping.
///
/// Mirrors the teacher's `Cpu`: `noff` counts nested `push_off` calls, and
/// `interrupt_enabled` is the interrupt-enable flag saved across the
/// outermost `push_off`/`pop_off` pair. There is no real hardware
/// interrupt line on a host build, so "interrupts" here are a bookkeeping
/// fiction used solely to enforce the nesting contract the spinlock relies
/// on: test code can still call `push_off`/`pop_off` unbalanced and the
/// same assertions the teacher has will fire.
struct Cpu {
    noff: Cell<u32>,
    interrupt_enabled: Cell<bool>,
}

impl Cpu {
    fn new() -> Self {
        Self {
            noff: Cell::new(0),
            interrupt_enabled: Cell::new(true),
        }
    }
}

/// Simulated interrupt-enable flag, per thread. Since there is no real
/// hardware IRQ line on a host build, `intr_off`/`intr_on` only flip this
/// flag; they exist so `push_off`/`pop_off` can be written exactly as the
/// teacher writes them.
thread_local! {
    static INTR_ENABLED: Cell<bool> = Cell::new(true);
}

fn intr_get() -> bool {
    INTR_ENABLED.with(|f| f.get())
}

fn intr_off() {
    INTR_ENABLED.with(|f| f.set(false));
}

fn intr_on() {
    INTR_ENABLED.with(|f| f.set(true));
}

/// Like `intr_off`/`intr_on`, except matched: it takes two `pop_off`s to
/// undo two `push_off`s. If interrupts are initially off, `push_off` then
/// `pop_off` leaves them off.
pub fn push_off() {
    let old = intr_get();
    intr_off();
    CPU.with(|cpu| {
        if cpu.noff.get() == 0 {
            cpu.interrupt_enabled.set(old);
        }
        cpu.noff.set(cpu.noff.get() + 1);
    });
}

/// Must be paired with `push_off`. Fatal (panics) if called without a
/// matching `push_off`, mirroring the teacher's `assert!` in `pop_off`.
pub fn pop_off() {
    assert!(!intr_get(), "pop_off - interruptible");
    CPU.with(|cpu| {
        assert!(cpu.noff.get() >= 1, "pop_off");
        cpu.noff.set(cpu.noff.get() - 1);
        if cpu.noff.get() == 0 && cpu.interrupt_enabled.get() {
            intr_on();
        }
    });
}

/// Current `push_off` nesting depth of the calling thread.
pub fn noff() -> u32 {
    CPU.with(|cpu| cpu.noff.get())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nesting_matches_depth() {
        assert_eq!(noff(), 0);
        push_off();
        push_off();
        assert_eq!(noff(), 2);
        pop_off();
        assert_eq!(noff(), 1);
        pop_off();
        assert_eq!(noff(), 0);
    }

    #[test]
    fn restores_interrupts_only_at_depth_zero() {
        push_off();
        push_off();
        pop_off();
        // Still nested once; interrupts must remain off.
        assert!(!intr_get());
        pop_off();
        assert!(intr_get());
    }

    #[test]
    #[should_panic(expected = "pop_off")]
    fn unbalanced_pop_off_is_fatal() {
        pop_off();
    }
}
