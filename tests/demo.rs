use std::fs::{self, File};
use std::path::Path;
use std::process::{Command, Output};

use assert_cmd::cargo::CommandCargoExt;
use gmonprof::gmon::{Dump, Header, RawArc, WordSize, COUNTER_SIZE, GMON_VERSION};
use pretty_assertions::assert_eq;

fn run_demo(dir: &Path, output: &Path, extra: &[&str]) -> Output {
    Command::cargo_bin("gmonprof-demo")
        .unwrap()
        .args(["-q", "-i", "3", "--millis", "20", "-o"])
        .arg(output)
        .args(extra)
        .current_dir(dir)
        .env_remove(gmonprof::ENV_OUTPUT)
        .env_remove(gmonprof::ENV_SAMPLE_RATE)
        .env_remove(gmonprof::ENV_ADDRESS_BIAS)
        .output()
        .expect("failed to execute process")
}

fn check_profile(path: &Path) {
    let word = WordSize::native();
    let dump = Dump::read_from(word, File::open(path).unwrap()).unwrap();
    assert_eq!(dump.header.version, GMON_VERSION);
    assert_eq!(dump.header.profrate, 1000);
    assert_eq!(
        dump.header.ncnt as usize,
        Header::size(word) + dump.samples.len() * COUNTER_SIZE
    );

    // spin and compute were both entered, compute many times.
    assert!(dump.arcs.len() >= 2, "{:?}", dump.arcs);
    assert!(dump.arcs.iter().any(|arc| arc.count > 1));
    assert!(dump.arcs.iter().all(|arc| arc.count > 0
        && arc.selfpc >= dump.header.lowpc
        && arc.selfpc < dump.header.highpc));

    let len = fs::metadata(path).unwrap().len() as usize;
    assert_eq!(
        len,
        dump.header.ncnt as usize + dump.arcs.len() * RawArc::size(word)
    );
}

#[test]
fn demo_writes_profile_on_stop() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stop.out");
    let output = run_demo(dir.path(), &path, &[]);
    assert!(output.status.success());
    check_profile(&path);
}

#[test]
fn exit_hook_dumps_running_session() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("exit.out");
    let output = run_demo(dir.path(), &path, &["--leave-running"]);
    assert!(output.status.success());
    check_profile(&path);
    assert!(!dir.path().join("gmon.out").exists());
}

#[test]
fn exit_hook_skips_stopped_session() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("discarded.out");
    let output = run_demo(dir.path(), &path, &["--discard"]);
    assert!(output.status.success());
    assert!(!path.exists());
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}
