//! Signal delivery (spec.md §3 "Signal state", §4.9).
//!
//! The teacher kernel has no signal subsystem at all — xv6-riscv's only
//! asynchronous-delivery mechanism is the `killed` flag `Procs::kill`
//! sets and `usertrap` checks on return to user space
//! (`examples/kaist-cp-rv6/kernel-rs/src/proc/procs.rs`,
//! `trap.rs`). `spec.md` §4.9 layers a full pending/blocked/ignored
//! POSIX-style signal set on top of that, so this module is new. It
//! reuses the teacher's two load-bearing ideas rather than inventing its
//! own: a flat bitmask per disposition (the same shape as `killed: bool`,
//! generalized to 32 bits), and "check at the point of returning to user
//! space" (`signal_take`, mirroring `usertrap`'s post-trap check).
//!
//! Bitmasks use `bitflags` (kept from the teacher's `Cargo.toml`, used
//! there for `FcntlFlags`/`OpenFlags` in the syscall layer) rather than a
//! hand-rolled newtype, since this is exactly the flat, named-bit
//! scenario the crate is for.

use bitflags::bitflags;
use static_assertions::const_assert;

use crate::error::{Errno, KResult};
use crate::proc::table::ProcTable;
use crate::proc::Pid;

/// Number of distinct signal numbers a `sigaction` table covers
/// (spec.md §3); re-exported from `param` so the bitmask width below
/// stays in lockstep with it.
pub use crate::param::NSIG;

const_assert!(NSIG <= 32);

bitflags! {
    /// A set of signal numbers, one bit per signal (bit `n` is signal
    /// `n`; signal `0` is unused, matching POSIX numbering).
    #[derive(Default)]
    pub struct SignalSet: u32 {
        const SIGHUP    = 1 << 1;
        const SIGINT    = 1 << 2;
        const SIGQUIT   = 1 << 3;
        const SIGILL    = 1 << 4;
        const SIGTRAP   = 1 << 5;
        const SIGABRT   = 1 << 6;
        const SIGBUS    = 1 << 7;
        const SIGFPE    = 1 << 8;
        const SIGKILL   = 1 << 9;
        const SIGUSR1   = 1 << 10;
        const SIGSEGV   = 1 << 11;
        const SIGUSR2   = 1 << 12;
        const SIGPIPE   = 1 << 13;
        const SIGALRM   = 1 << 14;
        const SIGTERM   = 1 << 15;
        const SIGCHLD   = 1 << 17;
        const SIGCONT   = 1 << 18;
        const SIGSTOP   = 1 << 19;
        const SIGTSTP   = 1 << 20;
        const SIGTTIN   = 1 << 21;
        const SIGTTOU   = 1 << 22;
    }
}

impl SignalSet {
    /// `SIGKILL | SIGSTOP`: cannot be blocked or ignored (spec.md §3,
    /// GLOSSARY "Mandatory signal").
    pub const MANDATORY: SignalSet = SignalSet::SIGKILL.union(SignalSet::SIGSTOP);

    pub fn from_signo(signo: i32) -> Option<SignalSet> {
        if signo <= 0 || signo as usize >= NSIG {
            return None;
        }
        SignalSet::from_bits(1 << signo)
    }

    pub fn lowest(self) -> Option<i32> {
        if self.is_empty() {
            None
        } else {
            Some(self.bits().trailing_zeros() as i32)
        }
    }
}

bitflags! {
    /// `sigaction` flags (spec.md §3's `sigaction` array entries; only
    /// the two flags `signal_take` actually consults are modeled).
    #[derive(Default)]
    pub struct SaFlags: u32 {
        /// Don't add the delivered signal to the blocked mask while its
        /// handler runs.
        const NODEFER = 1 << 0;
        /// Reset the action to `Default` after one delivery.
        const RESETHAND = 1 << 1;
    }
}

/// What happens when a signal is delivered.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Disposition {
    /// The kernel's built-in default (terminate, for every signal this
    /// crate models; see GLOSSARY — stop/continue semantics are out of
    /// scope, spec.md §1).
    Default,
    Ignore,
    /// A user-space handler address. Opaque to the kernel core; the trap
    /// gate collaborator (spec.md §6) is responsible for actually
    /// transferring control there.
    Handler(usize),
}

#[derive(Copy, Clone, Debug)]
pub struct SigAction {
    pub disposition: Disposition,
    pub flags: SaFlags,
    /// Additional signals to block while this handler runs (merged into
    /// the blocked mask at delivery unless `NODEFER` is set).
    pub mask: SignalSet,
}

impl SigAction {
    pub const fn default_action() -> Self {
        Self {
            disposition: Disposition::Default,
            flags: SaFlags::empty(),
            mask: SignalSet::empty(),
        }
    }
}

/// How `sigprocmask` combines the caller's `set` with the current mask.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MaskHow {
    Block,
    Unblock,
    SetMask,
}

/// Per-process signal state (spec.md §3 "Signal state").
#[derive(Clone)]
pub struct SignalState {
    actions: [SigAction; NSIG],
    blocked: SignalSet,
    ignored: SignalSet,
    pending: SignalSet,
    /// The mask in effect before the most recent delivery, restored by
    /// `sigreturn`.
    saved_mask: SignalSet,
}

impl SignalState {
    pub const fn new() -> Self {
        Self {
            actions: [SigAction::default_action(); NSIG],
            blocked: SignalSet::empty(),
            ignored: SignalSet::empty(),
            pending: SignalSet::empty(),
            saved_mask: SignalSet::empty(),
        }
    }

    pub fn pending(&self) -> SignalSet {
        self.pending
    }

    pub fn blocked(&self) -> SignalSet {
        self.blocked
    }
}

impl Default for SignalState {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_signo(signo: i32) -> KResult<SignalSet> {
    SignalSet::from_signo(signo).ok_or(Errno::EINVAL)
}

/// Installs `new` as the action for `signo` and returns the previous one
/// (spec.md §6 `sigaction`). Rejects `SIGKILL`/`SIGSTOP` (mandatory,
/// cannot be redirected) and out-of-range signal numbers.
pub fn sigaction(table: &ProcTable, proc_index: usize, signo: i32, new: SigAction) -> KResult<SigAction> {
    let bit = validate_signo(signo)?;
    if bit.intersects(SignalSet::MANDATORY) {
        return Err(Errno::EINVAL);
    }
    let mut slot = table.slot(proc_index).lock();
    let old = slot.signals.actions[signo as usize];
    slot.signals.actions[signo as usize] = new;
    match new.disposition {
        Disposition::Ignore => slot.signals.ignored |= bit,
        _ => slot.signals.ignored -= bit,
    }
    Ok(old)
}

/// Combines `set` into the blocked mask per `how` and returns the mask in
/// effect beforehand (spec.md §6 `sigprocmask`, §8 testable property 7:
/// a `SetMask` round trip restores the mask exactly, and `SIGKILL`/
/// `SIGSTOP` are never present in the result).
pub fn sigprocmask(table: &ProcTable, proc_index: usize, how: MaskHow, set: SignalSet) -> SignalSet {
    let mut slot = table.slot(proc_index).lock();
    let old = slot.signals.blocked;
    let requested = set - SignalSet::MANDATORY;
    slot.signals.blocked = match how {
        MaskHow::Block => old | requested,
        MaskHow::Unblock => old - requested,
        MaskHow::SetMask => requested,
    };
    old
}

/// The set of signals currently pending (spec.md §6 `sigpending`).
pub fn sigpending(table: &ProcTable, proc_index: usize) -> SignalSet {
    table.slot(proc_index).lock().signals.pending
}

/// Posts `signo` to `pid` (spec.md §4.9 `signal_send`): rejects a target
/// that is `UNUSED`/`ZOMBIE`/`EXITING`, sets the pending bit, and wakes
/// whatever channel the target is sleeping on.
pub fn signal_send(table: &ProcTable, pid: Pid, signo: i32) -> KResult<()> {
    use crate::proc::Procstate;

    let bit = validate_signo(signo)?;
    let index = table.find_by_pid(pid)?;
    let chan = {
        let mut slot = table.slot(index).lock();
        if matches!(slot.state, Procstate::Unused | Procstate::Zombie | Procstate::Exiting) {
            return Err(Errno::ESRCH);
        }
        slot.signals.pending |= bit;
        slot.chan
    };
    if chan != 0 {
        crate::sched::wakeup_on_chan(table, chan);
    }
    Ok(())
}

/// Selects the lowest-numbered pending-and-deliverable signal (pending,
/// not blocked, not ignored — mandatory signals bypass both blocking and
/// ignoring), clears its pending bit, updates the blocked mask for the
/// duration of the handler, and returns it (spec.md §4.9 `signal_take`).
/// Called at the point of returning to user space.
pub fn signal_take(table: &ProcTable, proc_index: usize) -> Option<(i32, SigAction)> {
    let mut slot = table.slot(proc_index).lock();
    let sig = &mut slot.signals;

    let mandatory_ready = sig.pending & SignalSet::MANDATORY;
    let deliverable = if !mandatory_ready.is_empty() {
        mandatory_ready
    } else {
        sig.pending & !sig.blocked & !sig.ignored
    };
    let signo = deliverable.lowest()?;
    let bit = SignalSet::from_signo(signo).expect("signo came from a valid SignalSet");

    sig.pending -= bit;
    let action = sig.actions[signo as usize];
    sig.saved_mask = sig.blocked;
    if !action.flags.contains(SaFlags::NODEFER) {
        sig.blocked |= (action.mask | bit) - SignalSet::MANDATORY;
    }
    if action.flags.contains(SaFlags::RESETHAND) {
        sig.actions[signo as usize] = SigAction::default_action();
    }
    Some((signo, action))
}

/// Restores the mask captured by the most recent `signal_take` (spec.md
/// §6 `sigreturn`).
pub fn sigreturn(table: &ProcTable, proc_index: usize) {
    let mut slot = table.slot(proc_index).lock();
    slot.signals.blocked = slot.signals.saved_mask;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boot() -> (ProcTable, usize) {
        let table = ProcTable::new();
        let init = table.userinit();
        (table, init)
    }

    #[test]
    fn procmask_round_trip_restores_exactly() {
        let (table, init) = boot();
        let requested = SignalSet::SIGUSR1 | SignalSet::SIGTERM;
        let old = sigprocmask(&table, init, MaskHow::SetMask, requested);
        assert_eq!(old, SignalSet::empty());

        let mid = sigprocmask(&table, init, MaskHow::SetMask, SignalSet::SIGCHLD);
        assert_eq!(mid, requested);

        let restored = sigprocmask(&table, init, MaskHow::SetMask, mid);
        assert_eq!(restored, SignalSet::SIGCHLD);
        assert_eq!(sigprocmask(&table, init, MaskHow::SetMask, SignalSet::empty()), requested);
    }

    #[test]
    fn mandatory_signals_never_end_up_blocked() {
        let (table, init) = boot();
        let requested = SignalSet::SIGKILL | SignalSet::SIGSTOP | SignalSet::SIGTERM;
        sigprocmask(&table, init, MaskHow::SetMask, requested);
        let blocked = table.slot(init).lock().signals.blocked();
        assert!(!blocked.intersects(SignalSet::MANDATORY));
        assert!(blocked.contains(SignalSet::SIGTERM));
    }

    #[test]
    fn blocked_signal_stays_pending_until_unblocked() {
        let (table, init) = boot();
        let sigterm = SignalSet::SIGTERM.lowest().unwrap();
        sigprocmask(&table, init, MaskHow::Block, SignalSet::SIGTERM);
        signal_send(&table, table.pid_of(init), sigterm).unwrap();
        assert!(signal_take(&table, init).is_none(), "blocked signal must not be delivered");

        sigprocmask(&table, init, MaskHow::Unblock, SignalSet::SIGTERM);
        let (signo, _) = signal_take(&table, init).expect("now deliverable");
        assert_eq!(signo, sigterm);
    }

    #[test]
    fn sigkill_bypasses_blocking() {
        let (table, init) = boot();
        sigprocmask(&table, init, MaskHow::Block, SignalSet::SIGKILL);
        let sigkill = SignalSet::SIGKILL.lowest().unwrap();
        signal_send(&table, table.pid_of(init), sigkill).unwrap();
        let (signo, _) = signal_take(&table, init).expect("SIGKILL always deliverable");
        assert_eq!(signo, sigkill);
    }

    #[test]
    fn lowest_numbered_pending_signal_wins() {
        let (table, init) = boot();
        let pid = table.pid_of(init);
        signal_send(&table, pid, SignalSet::SIGTERM.lowest().unwrap()).unwrap();
        signal_send(&table, pid, SignalSet::SIGHUP.lowest().unwrap()).unwrap();
        let (signo, _) = signal_take(&table, init).unwrap();
        assert_eq!(signo, SignalSet::SIGHUP.lowest().unwrap());
    }
}
