mod options;

pub use options::{
    Options, DEFAULT_OUTPUT, DEFAULT_SAMPLE_RATE, DEFAULT_STOP_TIMEOUT, ENV_ADDRESS_BIAS,
    ENV_OUTPUT, ENV_SAMPLE_RATE,
};

use std::io;
use std::path::{Path, PathBuf};
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use arc_swap::ArcSwapOption;

use crate::buffers::Buffers;
use crate::error::Error;
use crate::exit;
use crate::gmon::{self, WordSize};
use crate::range::TextRange;
use crate::sampler::{SamplerHandle, Termination};

/// The process-wide profiler driven by the instrumentation hook and the process-exit hook.
pub static PROFILER: Profiler = Profiler::new();

/// Lifecycle state of a profiler.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum State {
    /// A session is collecting data.
    On = 0,
    /// A session is being set up.
    Busy = 1,
    /// The last start failed; profiling stays disabled until the next start.
    Error = 2,
    /// No session is running.
    Off = 3,
}

impl State {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => State::On,
            1 => State::Busy,
            2 => State::Error,
            _ => State::Off,
        }
    }
}

/// A single profiling session: the instrumented range, its buffers and the shared program
/// counter the sampler reads.
///
/// The hook and the sampler read and write a session concurrently with no locking at all; see
/// the [`buffers`](crate::buffers) module for what that means for the recorded counts.
#[derive(Debug)]
pub struct Session {
    state: AtomicU8,
    range: TextRange,
    hist_fraction: usize,
    address_bias: usize,
    sample_rate: u32,
    word_size: WordSize,
    current_pc: AtomicUsize,
    buffers: Buffers,
}

impl Session {
    /// Validates `options`, resolves the instrumented range and allocates the buffers.
    ///
    /// The returned session is already [`State::On`].
    pub(crate) fn create(options: &Options) -> Result<Self, Error> {
        options.validate()?;
        let range = options
            .text_range
            .or_else(TextRange::from_link_markers)
            .ok_or(Error::NoTextRange)?;
        if range.is_empty() {
            return Err(Error::InvalidOptions("instrumented text range is empty"));
        }

        let buckets = range.bucket_count(options.hist_fraction);
        let bytes = Buffers::footprint(buckets);
        let buffers = Buffers::allocate(buckets).ok_or(Error::Allocation { bytes })?;
        debug!("{} bytes allocated for {} buckets over {}", bytes, buckets, range);

        Ok(Self {
            state: AtomicU8::new(State::On as u8),
            range,
            hist_fraction: options.hist_fraction,
            address_bias: options.address_bias,
            sample_rate: options.sample_rate,
            word_size: options.word_size,
            current_pc: AtomicUsize::new(0),
            buffers,
        })
    }

    /// Current lifecycle state of this session.
    #[inline]
    pub fn state(&self) -> State {
        State::from_u8(self.state.load(Ordering::Relaxed))
    }

    pub(crate) fn set_state(&self, state: State) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// The instrumented range, in link-time addresses.
    pub fn range(&self) -> TextRange {
        self.range
    }

    /// Bytes of text per bucket.
    pub fn hist_fraction(&self) -> usize {
        self.hist_fraction
    }

    /// Histogram sampling frequency in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Time between two sampler ticks.
    pub fn sample_period(&self) -> Duration {
        Duration::from_secs(1) / self.sample_rate
    }

    /// Address width used when this session is dumped.
    pub fn word_size(&self) -> WordSize {
        self.word_size
    }

    /// Number of buckets in each table.
    pub fn bucket_count(&self) -> usize {
        self.buffers.len()
    }

    /// The arc table and histogram.
    pub fn buffers(&self) -> &Buffers {
        &self.buffers
    }

    /// The program counter most recently published by the hook, in link-time addresses.
    pub fn current_pc(&self) -> usize {
        self.current_pc.load(Ordering::Relaxed)
    }

    /// Records a call from `frompc` into `selfpc`, both given as runtime addresses.
    ///
    /// Does nothing unless the session is on and the corrected callee is in range.
    #[inline]
    pub fn record_call(&self, frompc: usize, selfpc: usize) {
        if self.state() != State::On {
            return;
        }

        let frompc = frompc.wrapping_sub(self.address_bias);
        let selfpc = selfpc.wrapping_sub(self.address_bias);
        if let Some(bucket) = self.range.bucket_of(selfpc, self.hist_fraction) {
            self.current_pc.store(selfpc, Ordering::Relaxed);
            self.buffers.record_arc(bucket, frompc, selfpc);
        }
    }

    /// Takes one histogram sample of the current program counter.
    ///
    /// The read of the program counter races with the hook; whatever value is seen is used.
    #[inline]
    pub(crate) fn sample_tick(&self) {
        let pc = self.current_pc.load(Ordering::Relaxed);
        if let Some(bucket) = self.range.bucket_of(pc, self.hist_fraction) {
            self.buffers.record_sample(bucket);
        }
    }

    /// Writes this session in `gmon.out` format to `writer`.
    pub fn dump<W: io::Write>(&self, writer: W) -> io::Result<()> {
        gmon::write(self, writer)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        debug!(
            "{} total bytes were freed",
            Buffers::footprint(self.buffers.len())
        );
    }
}

#[derive(Debug)]
struct Active {
    sampler: SamplerHandle,
    stop_timeout: Duration,
    output: PathBuf,
}

#[derive(Debug)]
struct Control {
    options: Option<Options>,
    active: Option<Active>,
}

/// The session lifecycle controller.
///
/// A `Profiler` owns at most one running [`Session`]. Starting and stopping are serialized
/// through an internal mutex. The hot path, [`Profiler::record_call`], never touches that mutex:
/// it loads the published session through a lock-free atomic pointer and writes straight into its
/// buffers.
///
/// Most programs use the global [`PROFILER`] through the crate-level functions. Standalone
/// profilers are useful for embedding and tests; they stop (without dumping) when dropped.
#[derive(Debug)]
pub struct Profiler {
    current: ArcSwapOption<Session>,
    status: AtomicU8,
    started: AtomicBool,
    control: Mutex<Control>,
}

impl Default for Profiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Profiler {
    /// Creates an idle profiler.
    ///
    /// Until [`configure`](Profiler::configure) is called, sessions use [`Options::from_env`].
    pub const fn new() -> Self {
        Self {
            current: ArcSwapOption::const_empty(),
            status: AtomicU8::new(State::Off as u8),
            started: AtomicBool::new(false),
            control: Mutex::new(Control {
                options: None,
                active: None,
            }),
        }
    }

    /// Creates an idle profiler that will use `options`.
    pub fn with_options(options: Options) -> Self {
        let profiler = Self::new();
        profiler.configure(options);
        profiler
    }

    /// Sets the options used by subsequent starts. A running session is not affected.
    pub fn configure(&self, options: Options) {
        self.lock().options = Some(options);
    }

    /// The options the next start will use.
    pub fn options(&self) -> Options {
        self.lock().options.clone().unwrap_or_else(Options::from_env)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> State {
        match self.current.load().as_ref() {
            Some(session) => session.state(),
            None => State::from_u8(self.status.load(Ordering::Acquire)),
        }
    }

    /// The running session, if any.
    pub fn session(&self) -> Option<Arc<Session>> {
        self.current.load_full()
    }

    /// Starts a new session.
    ///
    /// A session that is already running is stopped first and its data discarded, without a dump.
    /// On failure the profiler is left in [`State::Error`] and the hook stays disabled.
    pub fn start(&self) -> Result<(), Error> {
        let mut control = self.lock();
        self.started.store(true, Ordering::Relaxed);
        self.start_locked(&mut control)
    }

    /// Stops the running session, optionally dumping it first.
    ///
    /// Does nothing unless a session is [`State::On`]. The dump goes to `destination`, or to
    /// [`Options::output`] if it is `None`. The session's buffers are released whether or not the
    /// dump succeeds; a failed dump is logged and returned as [`Error::Dump`].
    pub fn stop(&self, destination: Option<&Path>, dump: bool) -> Result<(), Error> {
        let mut control = self.lock();
        self.stop_locked(&mut control, destination, dump)
    }

    /// The instrumentation hook.
    ///
    /// Records a call from `frompc` into `selfpc` in the running session. The very first call on
    /// a profiler that was never started starts a session.
    #[inline]
    pub fn record_call(&self, frompc: usize, selfpc: usize) {
        if !self.started.load(Ordering::Relaxed) {
            self.start_lazily();
        }

        let current = self.current.load();
        if let Some(session) = current.as_ref() {
            session.record_call(frompc, selfpc);
        }
    }

    #[cold]
    #[inline(never)]
    fn start_lazily(&self) {
        // Only the caller that flips the flag starts; concurrent first calls see no session yet
        // and return without blocking.
        if self.started.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut control = self.lock();
        // An explicit start may have run while we waited for the lock.
        if self.current.load().is_some() || self.status.load(Ordering::Acquire) != State::Off as u8
        {
            return;
        }
        // The error has already been logged and leaves the profiler in `State::Error`.
        let _ = self.start_locked(&mut control);
    }

    fn start_locked(&self, control: &mut Control) -> Result<(), Error> {
        if self.state() == State::On {
            info!("Discarding the running session");
            self.stop_locked(control, None, false)?;
        }

        self.status.store(State::Busy as u8, Ordering::Release);
        info!("Initializing");

        let options = control.options.clone().unwrap_or_else(Options::from_env);
        match self.spawn_session(control, &options) {
            Ok(()) => {
                self.status.store(State::On as u8, Ordering::Release);
                if options.exit_hook && self.is_global() {
                    exit::register();
                }
                Ok(())
            }
            Err(e) => {
                error!("Profiling disabled: {}", e);
                self.status.store(State::Error as u8, Ordering::Release);
                Err(e)
            }
        }
    }

    fn spawn_session(&self, control: &mut Control, options: &Options) -> Result<(), Error> {
        let session = Arc::new(Session::create(options)?);
        // On failure the closure holding the sampler's clone is dropped along with `session`,
        // which releases the buffers.
        let sampler = SamplerHandle::spawn(Arc::clone(&session)).map_err(Error::Spawn)?;
        info!(
            "Profiling {} at {} Hz",
            session.range(),
            session.sample_rate()
        );

        control.active = Some(Active {
            sampler,
            stop_timeout: options.stop_timeout,
            output: options.output.clone(),
        });
        self.current.store(Some(session));
        Ok(())
    }

    fn stop_locked(
        &self,
        control: &mut Control,
        destination: Option<&Path>,
        dump: bool,
    ) -> Result<(), Error> {
        let session = match self.current.load_full() {
            Some(session) if session.state() == State::On => session,
            _ => return Ok(()),
        };

        // Signals the sampler, and turns the hook into a no-op for anyone still holding the
        // session.
        session.set_state(State::Off);
        info!("Stopping");

        let active = control.active.take();
        let mut output = None;
        if let Some(active) = active {
            match active.sampler.join_timeout(active.stop_timeout) {
                Termination::Exited => debug!("Sampler exited"),
                Termination::Abnormal => warn!("Sampler thread exited abnormally"),
                Termination::TimedOut => warn!(
                    "Sampler did not exit within {:?}; tearing down anyway",
                    active.stop_timeout
                ),
            }
            output = Some(active.output);
        }

        self.current.store(None);
        self.status.store(State::Off as u8, Ordering::Release);

        let result = if dump {
            let path = match destination {
                Some(path) => path.to_path_buf(),
                None => output.unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT)),
            };
            dump_to(&session, path)
        } else {
            Ok(())
        };

        drop(session);
        info!("Stopped");
        result
    }

    fn is_global(&self) -> bool {
        ptr::eq(self, &PROFILER)
    }

    fn lock(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Profiler {
    fn drop(&mut self) {
        let _ = self.stop(None, false);
    }
}

fn dump_to(session: &Session, path: PathBuf) -> Result<(), Error> {
    info!("Dumping data to {}", path.display());
    match gmon::write_file(session, &path) {
        Ok(()) => {
            info!("Dumping data done");
            Ok(())
        }
        Err(source) => {
            error!("Failed to write profile to {}: {}", path.display(), source);
            Err(Error::Dump { path, source })
        }
    }
}
