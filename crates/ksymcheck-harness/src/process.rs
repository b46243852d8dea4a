//! Child process control for symbol-table tool invocations.
//!
//! Every tool runs as the leader of its own process group, so a timeout or
//! an interrupt takes down whatever the tool forked along with the tool
//! itself. A forked helper that kept our pipes open would otherwise keep the
//! drain threads (and the audit) waiting after the tool was killed.

use std::process::{Child, Command};
use std::sync::atomic::{AtomicBool, Ordering};

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Make the spawned child the leader of a fresh process group.
pub(crate) fn isolate(command: &mut Command) -> &mut Command {
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }
    command
}

/// Kill a still-running child together with its process group, then reap it.
pub(crate) fn kill_tree(child: &mut Child) {
    signal_group(child.id());
    let _ = child.kill();
    let _ = child.wait();
}

/// Kill anything left in the group of a child that exited on its own.
///
/// The leader is reaped by then, but its pid stays reserved as a process
/// group id for as long as any member is alive.
pub(crate) fn kill_stragglers(child: &Child) {
    signal_group(child.id());
}

#[cfg(unix)]
#[allow(unsafe_code)]
fn signal_group(group: u32) {
    let Ok(pgid) = libc::pid_t::try_from(group) else {
        return;
    };
    if pgid <= 1 {
        return;
    }
    // SAFETY: killpg takes plain integers and touches no memory. ESRCH (the
    // group is already gone) is the common case and is ignored.
    unsafe {
        libc::killpg(pgid, libc::SIGKILL);
    }
}

#[cfg(not(unix))]
fn signal_group(_group: u32) {}

/// Whether SIGINT or SIGTERM arrived since [`install_interrupt_handler`].
#[must_use]
pub fn interrupted() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

/// Route SIGINT and SIGTERM to a flag the tool wait loop polls.
///
/// Tool children live in their own process groups and no longer see a
/// terminal Ctrl-C, so the audit kills them itself once the flag is set. The
/// handler restores the default disposition, so a second signal terminates
/// immediately.
#[cfg(unix)]
#[allow(unsafe_code)]
pub fn install_interrupt_handler() {
    extern "C" fn on_signal(signum: libc::c_int) {
        INTERRUPTED.store(true, Ordering::SeqCst);
        // SAFETY: signal(2) is async-signal-safe.
        unsafe {
            libc::signal(signum, libc::SIG_DFL);
        }
    }

    let handler = on_signal as extern "C" fn(libc::c_int) as libc::sighandler_t;
    // SAFETY: the handler only stores to an atomic and calls signal(2).
    unsafe {
        libc::signal(libc::SIGINT, handler);
        libc::signal(libc::SIGTERM, handler);
    }
}

#[cfg(not(unix))]
pub fn install_interrupt_handler() {}
