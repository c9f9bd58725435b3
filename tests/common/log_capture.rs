// Records emitted by the profiler come from several threads: the caller of `start`/`stop`, the
// sampler (which may drop the last reference to a session) and the hook callers. A process-wide
// sink behind a mutex sees all of them. Tests sharing a binary would see each other's records,
// so a binary that captures logs holds a single test.

use std::mem;
use std::sync::{Mutex, MutexGuard, Once, PoisonError};

use log::{Level, LevelFilter, Log, Metadata, Record};

static INSTALL: Once = Once::new();
static SINK: Capture = Capture {
    records: Mutex::new(Vec::new()),
};

/// A log record emitted by this crate.
#[derive(Clone, Debug)]
pub struct Captured {
    pub level: Level,
    pub module: String,
    pub message: String,
}

impl Captured {
    pub fn is(&self, level: Level, needle: &str) -> bool {
        self.level == level && self.message.contains(needle)
    }
}

struct Capture {
    records: Mutex<Vec<Captured>>,
}

impl Capture {
    fn records(&self) -> MutexGuard<'_, Vec<Captured>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Log for Capture {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.target().starts_with("gmonprof")
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        self.records().push(Captured {
            level: record.level(),
            module: record.module_path().unwrap_or_default().to_string(),
            message: record.args().to_string(),
        });
    }

    fn flush(&self) {}
}

/// Installs the capturing logger, if needed, and forgets everything captured so far.
pub fn install() {
    INSTALL.call_once(|| {
        log::set_logger(&SINK).unwrap();
        log::set_max_level(LevelFilter::Trace);
    });
    SINK.records().clear();
}

/// Returns and forgets the records captured since the last call.
pub fn take() -> Vec<Captured> {
    mem::take(&mut *SINK.records())
}

/// Asserts that `expected` records appear in `logs` in this order, possibly with others between.
pub fn assert_in_order(logs: &[Captured], expected: &[(Level, &str)]) {
    let mut remaining = logs.iter();
    for &(level, needle) in expected {
        assert!(
            remaining.any(|log| log.is(level, needle)),
            "no {} record containing {:?} (in order) among {:#?}",
            level,
            needle,
            logs
        );
    }
}
