// Exercises the process-wide profiler. Everything runs in one test since `PROFILER` and its
// one-shot lazy start are shared by the whole test binary.

mod common;

use common::{options, read_dump, LOWPC};
use gmonprof::hook::{self, gmonprof_mcount_internal};
use gmonprof::{Options, State, PROFILER};
use pretty_assertions::assert_eq;

#[test]
fn global_profiler_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let lazy_out = dir.path().join("lazy.out");
    gmonprof::configure(Options {
        output: lazy_out.clone(),
        ..options(4096)
    });
    assert_eq!(gmonprof::state(), State::Off);

    // The first hook call starts the session.
    gmonprof_mcount_internal(LOWPC + 0x80, LOWPC + 8);
    assert_eq!(gmonprof::state(), State::On);
    hook::record_call(LOWPC + 0x80, LOWPC + 8);
    let session = PROFILER.session().unwrap();
    assert_eq!(session.buffers().arcs()[2].count(), 2);
    drop(session);

    gmonprof::stop(None, true).unwrap();
    assert_eq!(gmonprof::state(), State::Off);
    let dump = read_dump(&lazy_out);
    assert_eq!(dump.arcs.len(), 1);
    assert_eq!(dump.arcs[0].selfpc, (LOWPC + 8) as u64);
    assert_eq!(dump.arcs[0].count, 2);

    // Later calls do not bring it back.
    gmonprof_mcount_internal(LOWPC, LOWPC + 8);
    assert_eq!(gmonprof::state(), State::Off);
    assert!(PROFILER.session().is_none());

    // An explicit start does.
    let explicit_out = dir.path().join("explicit.out");
    gmonprof::configure(options(64));
    gmonprof::start().unwrap();
    assert_eq!(gmonprof::state(), State::On);
    hook::record_call(LOWPC, LOWPC + 60);
    gmonprof::stop(Some(&explicit_out), true).unwrap();

    let dump = read_dump(&explicit_out);
    assert_eq!(dump.samples.len(), 16);
    assert_eq!(dump.arcs.len(), 1);
    assert_eq!(dump.arcs[0].selfpc, (LOWPC + 60) as u64);
    assert!(!dir.path().join("gmon.out").exists());
}
