//! SIGINT/SIGTERM handling
//!
//! The first signal sets a process-wide flag; the engine checks it before
//! each step and between retry attempts, so the current action finishes and
//! the record file stays consistent. A second signal restores the default
//! disposition and terminates the process.

use std::sync::atomic::{AtomicBool, Ordering};

static CANCELLED: AtomicBool = AtomicBool::new(false);

/// Flag set once a termination signal arrived
pub fn cancel_flag() -> &'static AtomicBool {
    &CANCELLED
}

#[cfg(unix)]
extern "C" fn handle_signal(signal: libc::c_int) {
    if CANCELLED.swap(true, Ordering::SeqCst) {
        // SAFETY: signal and raise are async-signal-safe
        unsafe {
            libc::signal(signal, libc::SIG_DFL);
            libc::raise(signal);
        }
    }
}

/// Install the handlers for SIGINT and SIGTERM
#[cfg(unix)]
pub fn install() {
    let handler = handle_signal as extern "C" fn(libc::c_int) as libc::sighandler_t;
    for signal in [libc::SIGINT, libc::SIGTERM] {
        // SAFETY: the handler only touches an atomic and async-signal-safe calls
        let previous = unsafe { libc::signal(signal, handler) };
        if previous == libc::SIG_ERR {
            log::warn!("Could not install handler for signal {signal}");
        }
    }
    log::debug!("Installed SIGINT/SIGTERM handlers");
}

#[cfg(not(unix))]
pub fn install() {}
