//! The periodic PC sampler.
//!
//! A dedicated thread wakes up once per sampling period, reads the session's current program
//! counter and bumps the matching histogram bucket. It polls the session state between ticks and
//! exits once the session leaves [`State::On`], so shutdown latency is bounded by one period.
//!
//! `std` has no join-with-timeout, so the thread reports its exit on a bounded channel before it
//! returns and [`SamplerHandle::join_timeout`] waits on that channel instead.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{self as channel, Receiver, RecvTimeoutError};

use crate::session::{Session, State};

const THREAD_NAME: &str = "gmonprof-sampler";

/// How a sampler thread ended, as observed by [`SamplerHandle::join_timeout`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Termination {
    /// The thread saw the session stop and returned normally.
    Exited,
    /// The thread went away without signalling completion, e.g. it panicked.
    Abnormal,
    /// The thread did not finish within the timeout and was left running.
    TimedOut,
}

/// Handle to a running sampler thread.
#[derive(Debug)]
pub struct SamplerHandle {
    thread: JoinHandle<()>,
    done: Receiver<()>,
}

impl SamplerHandle {
    /// Spawns a sampler for `session`, ticking once per `session.sample_period()`.
    pub fn spawn(session: Arc<Session>) -> io::Result<Self> {
        let (tx, done) = channel::bounded(1);
        let period = session.sample_period();
        let thread = thread::Builder::new()
            .name(THREAD_NAME.into())
            .spawn(move || {
                run(&session, period);
                let _ = tx.send(());
            })?;
        Ok(Self { thread, done })
    }

    /// Waits up to `timeout` for the thread to finish.
    ///
    /// On [`Termination::TimedOut`] the thread is detached. It keeps its own reference to the
    /// session, so the buffers it samples into stay alive until it notices the stop and exits.
    pub fn join_timeout(self, timeout: Duration) -> Termination {
        match self.done.recv_timeout(timeout) {
            Ok(()) => match self.thread.join() {
                Ok(()) => Termination::Exited,
                Err(_) => Termination::Abnormal,
            },
            Err(RecvTimeoutError::Disconnected) => {
                // The sender is dropped without a message only when the thread unwinds.
                let _ = self.thread.join();
                Termination::Abnormal
            }
            Err(RecvTimeoutError::Timeout) => Termination::TimedOut,
        }
    }
}

fn run(session: &Session, period: Duration) {
    while session.state() == State::On {
        session.sample_tick();
        thread::sleep(period);
    }
}
