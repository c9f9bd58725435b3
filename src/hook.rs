//! Entry points called from instrumented function prologues.
//!
//! All of them forward to [`PROFILER`]. They take no locks, never block once a session exists,
//! and never panic into the caller: when profiling is off or failed to start they return after a
//! couple of atomic loads.
//!
//! The first call on a process that never started the profiler starts a session using the
//! options set with [`configure`](crate::configure), or [`Options::from_env`] otherwise.
//!
//!   [`Options::from_env`]: crate::Options::from_env

use crate::session::PROFILER;

/// Records a call from `frompc` into `selfpc` on the global profiler.
///
/// Both addresses are runtime addresses; the configured address bias is removed before they are
/// range checked.
#[inline]
pub fn record_call(frompc: usize, selfpc: usize) {
    PROFILER.record_call(frompc, selfpc);
}

/// C ABI entry point for an `mcount` trampoline.
///
/// The trampoline recovers the caller's return address (`frompc`) and the instrumented
/// function's own address (`selfpc`) and calls this.
#[no_mangle]
pub extern "C" fn gmonprof_mcount_internal(frompc: usize, selfpc: usize) {
    record_call(frompc, selfpc);
}

/// Entry hook emitted by `-finstrument-functions`.
#[cfg(feature = "cyg-profile")]
#[no_mangle]
pub extern "C" fn __cyg_profile_func_enter(
    this_fn: *const libc::c_void,
    call_site: *const libc::c_void,
) {
    record_call(call_site as usize, this_fn as usize);
}

/// Exit hook emitted by `-finstrument-functions`. Only entries are profiled.
#[cfg(feature = "cyg-profile")]
#[no_mangle]
pub extern "C" fn __cyg_profile_func_exit(
    _this_fn: *const libc::c_void,
    _call_site: *const libc::c_void,
) {
}
