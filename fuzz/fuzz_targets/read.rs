#![no_main]

use gmonprof::gmon::{Dump, WordSize};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    Dump::read_from(WordSize::Four, data).ok();
    Dump::read_from(WordSize::Eight, data).ok();
});
