//! Process-exit hook for the global profiler.
//!
//! Registered with `atexit` the first time [`PROFILER`] starts a session. At normal process
//! termination it stops the running session, if any, and dumps it to the configured default
//! destination. A session that was already stopped makes it a no-op.

use std::panic::{self, AssertUnwindSafe};

use once_cell::sync::OnceCell;

use crate::session::PROFILER;

static REGISTERED: OnceCell<()> = OnceCell::new();

/// Registers the exit hook, at most once per process. A failure is logged and not retried.
pub(crate) fn register() {
    REGISTERED.get_or_init(|| {
        // SAFETY: `on_exit` is an `extern "C" fn()` that catches any unwinding itself.
        if unsafe { libc::atexit(on_exit) } == 0 {
            debug!("Registered process-exit hook");
        } else {
            warn!("Failed to register the process-exit hook; stop the profiler before exiting to keep the profile");
        }
    });
}

extern "C" fn on_exit() {
    let _ = panic::catch_unwind(AssertUnwindSafe(|| {
        // Failures were already logged by `stop`.
        let _ = PROFILER.stop(None, true);
    }));
}
