use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::{ArgAction, Parser};
use env_logger::Env;
use gmonprof::{hook, Options, TextRange};

#[derive(Debug, Parser)]
#[command(
    name = "gmonprof-demo",
    about = "Profile a small hand-instrumented workload and write a gmon.out file"
)]
struct Opt {
    /// Number of workload iterations
    #[arg(short = 'i', long = "iterations", default_value = "10", value_name = "UINT")]
    iterations: u32,

    /// Milliseconds spent busy in each iteration
    #[arg(long = "millis", default_value = "100", value_name = "UINT")]
    millis: u64,

    /// Histogram sampling rate in Hz
    #[arg(short = 'r', long = "rate", default_value = "1000", value_name = "HZ")]
    rate: u32,

    /// Where to write the profile
    #[arg(short = 'o', long = "output", default_value = "gmon.out", value_name = "PATH")]
    output: PathBuf,

    /// Return without stopping the profiler, leaving the dump to the process-exit hook
    #[arg(long = "leave-running", conflicts_with = "discard")]
    leave_running: bool,

    /// Stop the profiler without writing a profile
    #[arg(long = "discard")]
    discard: bool,

    /// Silence all log output
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,

    /// Verbose logging mode (-v, -vv, -vvv)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,
}

// Each workload function calls the hook by hand, standing in for a compiler-inserted prologue.

#[inline(never)]
fn compute(a: u32, b: u32) -> u32 {
    hook::record_call(spin as usize, compute as usize);
    a.wrapping_mul(b).rotate_left(5)
}

#[inline(never)]
fn spin(until: Instant, a: u32, b: u32) -> u32 {
    hook::record_call(main as usize, spin as usize);
    let mut acc = a;
    while Instant::now() < until {
        acc = compute(acc ^ a, b);
    }
    acc
}

/// A range spanning the workload functions, padded out to whole pages.
fn workload_range() -> TextRange {
    let addrs = [main as usize, spin as usize, compute as usize];
    let lowpc = addrs.iter().copied().min().unwrap_or(0) & !0xfff;
    let highpc = (addrs.iter().copied().max().unwrap_or(0) | 0xfff) + 1;
    TextRange::new(lowpc, highpc)
}

fn main() -> Result<(), gmonprof::Error> {
    let opt = Opt::parse();

    // Initialize logger
    if !opt.quiet {
        env_logger::Builder::from_env(Env::default().default_filter_or(match opt.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }))
        .format_timestamp(None)
        .init();
    }

    gmonprof::configure(Options {
        text_range: Some(TextRange::from_link_markers().unwrap_or_else(workload_range)),
        sample_rate: opt.rate,
        output: opt.output.clone(),
        ..Options::from_env()
    });
    gmonprof::start()?;

    let (a, b) = (7, 2);
    let mut result = 0;
    for _ in 0..opt.iterations {
        result = spin(Instant::now() + Duration::from_millis(opt.millis), a, b);
    }
    log::info!("Workload result: {}", result);

    if opt.leave_running {
        log::info!("Leaving {} to the exit hook", opt.output.display());
        return Ok(());
    }
    if opt.discard {
        return gmonprof::stop(None, false);
    }
    gmonprof::stop(Some(&opt.output), true)
}
