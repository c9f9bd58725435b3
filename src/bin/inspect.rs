use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::PathBuf;

use clap::{ArgAction, Parser};
use env_logger::Env;
use gmonprof::gmon::{Dump, WordSize, GMON_VERSION};

#[derive(Debug, Parser)]
#[command(
    name = "gmonprof-inspect",
    about = "Print the header, hottest buckets and arcs of a gmon.out profile"
)]
struct Opt {
    /// Width in bytes of addresses in the profile, 4 or 8 [default: host pointer width]
    #[arg(short = 'w', long = "word-size", value_name = "BYTES", value_parser = parse_word_size)]
    word_size: Option<WordSize>,

    /// Number of buckets and arcs to list
    #[arg(short = 'n', long = "top", default_value = "10", value_name = "UINT")]
    top: usize,

    /// Silence all log output
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,

    /// Verbose logging mode (-v, -vv, -vvv)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,

    /// Profile to read
    #[arg(value_name = "PATH", default_value = "gmon.out")]
    infile: PathBuf,
}

fn parse_word_size(s: &str) -> Result<WordSize, String> {
    match s {
        "4" => Ok(WordSize::Four),
        "8" => Ok(WordSize::Eight),
        _ => Err(format!("expected 4 or 8, got {}", s)),
    }
}

fn main() -> io::Result<()> {
    let opt = Opt::parse();

    // Initialize logger
    if !opt.quiet {
        env_logger::Builder::from_env(Env::default().default_filter_or(match opt.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }))
        .format_timestamp(None)
        .init();
    }

    let word = opt.word_size.unwrap_or_default();
    let reader = BufReader::new(File::open(&opt.infile)?);
    let dump = Dump::read_from(word, reader)?;
    if dump.header.version != GMON_VERSION {
        log::warn!(
            "Unexpected format version {:#010x} in {}",
            dump.header.version,
            opt.infile.display()
        );
    }

    print(&dump, opt.top, io::stdout().lock())
}

fn print<W: Write>(dump: &Dump, top: usize, mut out: W) -> io::Result<()> {
    let header = &dump.header;
    let buckets = dump.samples.len();
    let textsize = header.highpc.saturating_sub(header.lowpc);
    let width = match buckets as u64 {
        0 => 0,
        n => (textsize + n - 1) / n,
    };

    writeln!(out, "lowpc:    {:#x}", header.lowpc)?;
    writeln!(out, "highpc:   {:#x}", header.highpc)?;
    writeln!(out, "version:  {:#010x}", header.version)?;
    writeln!(out, "profrate: {} Hz", header.profrate)?;
    writeln!(out, "buckets:  {} ({} bytes each)", buckets, width)?;
    writeln!(
        out,
        "samples:  {} in {} buckets",
        dump.total_samples(),
        dump.samples.iter().filter(|&&s| s > 0).count()
    )?;
    writeln!(out, "arcs:     {}", dump.arcs.len())?;

    let mut hot: Vec<_> = dump
        .samples
        .iter()
        .enumerate()
        .filter(|&(_, &s)| s > 0)
        .collect();
    hot.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    if !hot.is_empty() {
        writeln!(out)?;
        writeln!(out, "{:>18} {:>10}", "address", "samples")?;
        for (bucket, samples) in hot.into_iter().take(top) {
            let address = header.lowpc + bucket as u64 * width;
            writeln!(out, "{:>#18x} {:>10}", address, samples)?;
        }
    }

    let mut arcs = dump.arcs.clone();
    arcs.sort_by(|a, b| b.count.cmp(&a.count));
    if !arcs.is_empty() {
        writeln!(out)?;
        writeln!(out, "{:>18} {:>18} {:>10}", "frompc", "selfpc", "calls")?;
        for arc in arcs.into_iter().take(top) {
            writeln!(
                out,
                "{:>#18x} {:>#18x} {:>10}",
                arc.frompc, arc.selfpc, arc.count
            )?;
        }
    }

    Ok(())
}
