//! gmonprof is an embedded, low-overhead profiler that builds a statistical call graph and a
//! PC-sampled histogram of a running program, and writes them out as a classic [`gmon.out`] file
//! for [gprof]-style tools to analyse.
//!
//! Profiling has three moving parts:
//!
//! - The **instrumentation hook** ([`hook`]) is called from the prologue of every instrumented
//!   function with the caller's and the callee's addresses. It counts the call in the callee's
//!   bucket of the arc table and publishes the callee as the "current" program counter.
//! - The **sampler** ([`sampler`]) is a background thread that wakes up at a fixed rate (1 kHz by
//!   default) and bumps the histogram bucket of whatever program counter was published last.
//! - The **lifecycle controller** ([`Profiler`]) allocates the buffers, starts and stops the
//!   sampler, and serializes everything with the [`gmon`] writer when the session ends.
//!
//! The hook and the sampler share the buffers with no locking whatsoever. Concurrent updates
//! may be lost or interleaved; the profile is statistical, and keeping the hook down to a few
//! memory operations matters more than exact counts.
//!
//! # Usage
//!
//! ```no_run
//! use gmonprof::{Options, TextRange};
//! use std::path::Path;
//!
//! # fn instrumented_work() {}
//! gmonprof::configure(Options {
//!     text_range: Some(TextRange::new(0x40_0000, 0x48_0000)),
//!     ..Options::default()
//! });
//! gmonprof::start()?;
//! instrumented_work();
//! gmonprof::stop(Some(Path::new("gmon.out")), true)?;
//! # Ok::<(), gmonprof::Error>(())
//! ```
//!
//! If the program never calls [`start`], the first hook invocation starts a session on its own,
//! and a process-exit hook dumps it to `gmon.out` (or `$GMON_OUT`) when the program exits.
//!
//!   [`gmon.out`]: https://sourceware.org/binutils/docs/gprof/
//!   [gprof]: https://sourceware.org/binutils/docs/gprof/

#![deny(missing_docs)]

#[macro_use]
extern crate log;

pub mod buffers;

mod error;
mod exit;

pub mod gmon;

pub mod hook;

/// The instrumented address range and its division into buckets.
pub mod range;

pub mod sampler;

mod session;

pub use error::Error;
pub use range::{TextRange, HISTFRACTION};
pub use session::{
    Options, Profiler, Session, State, DEFAULT_OUTPUT, DEFAULT_SAMPLE_RATE, DEFAULT_STOP_TIMEOUT,
    ENV_ADDRESS_BIAS, ENV_OUTPUT, ENV_SAMPLE_RATE, PROFILER,
};

use std::path::Path;

/// Sets the options used by the next start of the global profiler, including a start triggered
/// by the first hook call.
pub fn configure(options: Options) {
    PROFILER.configure(options);
}

/// Starts a session on the global profiler, discarding any session already running.
pub fn start() -> Result<(), Error> {
    PROFILER.start()
}

/// Stops the global profiler's session, dumping it to `destination` (or the configured default)
/// if `dump` is set.
pub fn stop(destination: Option<&Path>, dump: bool) -> Result<(), Error> {
    PROFILER.stop(destination, dump)
}

/// Lifecycle state of the global profiler.
pub fn state() -> State {
    PROFILER.state()
}
