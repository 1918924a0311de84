use std::io;

use nix::sys::resource::{Resource, getrlimit, setrlimit};
use nix::sys::signal::{self, SigHandler, SigSet, SigmaskHow, Signal, pthread_sigmask, raise};
use tracing::debug;

use crate::{ProcessError, Result};

/// The signals a terminal delivers to the whole foreground process group.
fn interrupt_signals() -> SigSet {
    let mut set = SigSet::empty();
    set.add(Signal::SIGINT);
    set.add(Signal::SIGQUIT);
    set
}

/// Blocks SIGINT and SIGQUIT until dropped; dropping restores the mask that
/// was in force before, at which point any signal that arrived meanwhile is
/// delivered.
#[must_use = "the signals are unblocked again as soon as the guard is dropped"]
pub struct SignalMask {
    previous: SigSet,
}

impl SignalMask {
    pub fn block() -> Result<Self> {
        let mut previous = SigSet::empty();
        pthread_sigmask(
            SigmaskHow::SIG_BLOCK,
            Some(&interrupt_signals()),
            Some(&mut previous),
        )?;
        Ok(Self { previous })
    }
}

impl Drop for SignalMask {
    fn drop(&mut self) {
        let _ = pthread_sigmask(SigmaskHow::SIG_SETMASK, Some(&self.previous), None);
    }
}

/// Runs in the forked child just before exec.
///
/// Only async-signal-safe calls are allowed here.
pub(crate) fn restore_child_signals() -> io::Result<()> {
    pthread_sigmask(SigmaskHow::SIG_UNBLOCK, Some(&interrupt_signals()), None)
        .map_err(io::Error::from)
}

/// SIGINT or SIGQUIT if one is pending (which implies it is blocked).
pub fn pending_interrupt() -> Option<Signal> {
    // SAFETY: the set is initialised by sigemptyset before sigpending fills it.
    unsafe {
        let mut pending: libc::sigset_t = std::mem::zeroed();
        libc::sigemptyset(&mut pending);
        if libc::sigpending(&mut pending) != 0 {
            return None;
        }
        [Signal::SIGINT, Signal::SIGQUIT]
            .into_iter()
            .find(|sig| libc::sigismember(&pending, *sig as libc::c_int) == 1)
    }
}

/// Non-blocking check for an interrupt that arrived while masked.
///
/// The signal stays pending, so it is still delivered once the mask is lifted.
pub fn poll_pending_signals() -> Result<()> {
    match pending_interrupt() {
        Some(sig) => Err(ProcessError::Interrupted {
            signal: sig as i32,
        }),
        None => Ok(()),
    }
}

/// Consume any pending SIGINT/SIGQUIT so lifting the mask does not deliver it.
///
/// Used once a child has already dealt with the interrupt itself.
pub fn discard_pending_interrupts() {
    while let Some(sig) = pending_interrupt() {
        let mut set = SigSet::empty();
        set.add(sig);
        // pending, so this returns at once
        if set.wait().is_err() {
            break;
        }
        debug!(signal = sig.as_str(), "discarded pending signal");
    }
}

/// Signals whose default action writes a core file.
pub fn dumps_core(sig: Signal) -> bool {
    matches!(
        sig,
        Signal::SIGQUIT
            | Signal::SIGILL
            | Signal::SIGTRAP
            | Signal::SIGABRT
            | Signal::SIGBUS
            | Signal::SIGFPE
            | Signal::SIGSEGV
            | Signal::SIGSYS
            | Signal::SIGXCPU
            | Signal::SIGXFSZ
    )
}

pub fn signal_name(signum: i32) -> String {
    Signal::try_from(signum)
        .map(|sig| sig.as_str().to_string())
        .unwrap_or_else(|_| format!("signal {signum}"))
}

/// Die from `signum` the way the child did.
///
/// The child already left a core file if it was going to, so ours is
/// suppressed. Exits with `128 + signum` only if the signal fails to kill us.
pub fn reraise(signum: i32) -> ! {
    if let Ok(sig) = Signal::try_from(signum) {
        if dumps_core(sig)
            && let Ok((_, hard)) = getrlimit(Resource::RLIMIT_CORE)
        {
            let _ = setrlimit(Resource::RLIMIT_CORE, 0, hard);
        }

        debug!(signal = sig.as_str(), "re-raising child termination signal");

        // SAFETY: restoring the default disposition installs no handler code.
        let _ = unsafe { signal::signal(sig, SigHandler::SigDfl) };
        let _ = raise(sig);

        let mut set = SigSet::empty();
        set.add(sig);
        let _ = pthread_sigmask(SigmaskHow::SIG_UNBLOCK, Some(&set), None);
    }

    std::process::exit(128 + signum)
}
