#![allow(dead_code)]

pub mod log_capture;

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use gmonprof::gmon::{Dump, WordSize};
use gmonprof::{Options, TextRange};

/// Start of the fake instrumented range used throughout the tests.
pub const LOWPC: usize = 0x40_0000;

/// Options for a session over `[LOWPC, LOWPC + textsize)` that never installs the exit hook.
pub fn options(textsize: usize) -> Options {
    Options {
        text_range: Some(TextRange::new(LOWPC, LOWPC + textsize)),
        exit_hook: false,
        ..Options::default()
    }
}

pub fn read_dump<P: AsRef<Path>>(path: P) -> Dump {
    let file = File::open(path.as_ref())
        .unwrap_or_else(|e| panic!("dump {} not found: {}", path.as_ref().display(), e));
    Dump::read_from(WordSize::native(), BufReader::new(file)).unwrap()
}
