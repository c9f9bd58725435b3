use std::io;
use std::path::PathBuf;

/// Errors raised while starting or stopping a profiling session.
///
/// None of these ever reach the instrumented program through the hook: a failed start leaves the
/// profiler in [`State::Error`](crate::State::Error), where the hook does nothing.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The arc or histogram table could not be allocated.
    #[error("failed to allocate {bytes} bytes of profiling buffers")]
    Allocation {
        /// Size of the failed request, both tables included.
        bytes: usize,
    },

    /// The sampler thread could not be spawned.
    #[error("failed to spawn the sampler thread")]
    Spawn(#[source] io::Error),

    /// No instrumented range was configured and none could be read from the linker symbols.
    #[error("no instrumented text range is configured")]
    NoTextRange,

    /// The options cannot describe a usable session.
    #[error("invalid profiler options: {0}")]
    InvalidOptions(&'static str),

    /// The dump file could not be written.
    #[error("failed to write profile to {}", path.display())]
    Dump {
        /// Destination of the dump.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },
}
