//! The `gmon.out` dump format.
//!
//! A dump is three consecutive sections, every field in native byte order:
//!
//! ```text
//! HEADER:
//!   lowpc: word, highpc: word,
//!   ncnt: u32 (header size + 4 * bucket count),
//!   version: u32 (0x00051879), profrate: u32 (Hz), reserved: [u32; 3]
//!
//! HISTOGRAM:
//!   samples: [u32; bucket count], in bucket order
//!
//! ARCS (only buckets with a non-zero count, in bucket order):
//!   frompc: word, selfpc: word, count: word
//! ```
//!
//! `word` is 4 or 8 bytes, see [`WordSize`]. With 4-byte words the header is 32 bytes and each
//! arc 12; with 8-byte words, 40 and 24.

mod read;

pub use read::Dump;

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::session::Session;

/// Version stamped into every header.
pub const GMON_VERSION: u32 = 0x0005_1879;

/// Width in bytes of one histogram counter.
pub const COUNTER_SIZE: usize = 4;

const WRITE_BUFFER: usize = 4 * 1024 * COUNTER_SIZE;

/// Width of address and arc count fields in a dump.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WordSize {
    /// 4-byte words, the layout produced for 32-bit targets.
    Four,
    /// 8-byte words, the layout produced for 64-bit targets.
    Eight,
}

impl WordSize {
    /// The pointer width of the host.
    pub const fn native() -> Self {
        if cfg!(target_pointer_width = "64") {
            WordSize::Eight
        } else {
            WordSize::Four
        }
    }

    /// Number of bytes in one word.
    pub const fn bytes(self) -> usize {
        match self {
            WordSize::Four => 4,
            WordSize::Eight => 8,
        }
    }

    // Addresses are truncated to the word; counts saturate.
    fn write_addr<W: Write>(self, writer: &mut W, value: u64) -> io::Result<()> {
        match self {
            WordSize::Four => writer.write_all(&(value as u32).to_ne_bytes()),
            WordSize::Eight => writer.write_all(&value.to_ne_bytes()),
        }
    }

    fn write_count<W: Write>(self, writer: &mut W, value: u64) -> io::Result<()> {
        match self {
            WordSize::Four => {
                let value = u32::try_from(value).unwrap_or(u32::MAX);
                writer.write_all(&value.to_ne_bytes())
            }
            WordSize::Eight => writer.write_all(&value.to_ne_bytes()),
        }
    }
}

impl Default for WordSize {
    fn default() -> Self {
        Self::native()
    }
}

/// The fixed-size record at the start of every dump.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Header {
    /// Lowest instrumented address.
    pub lowpc: u64,
    /// One past the highest instrumented address.
    pub highpc: u64,
    /// Size in bytes of the header plus the histogram.
    pub ncnt: u32,
    /// Format version, [`GMON_VERSION`].
    pub version: u32,
    /// Sampling rate of the histogram in Hz.
    pub profrate: u32,
    /// Reserved, always zero.
    pub reserved: [u32; 3],
}

impl Header {
    /// Size in bytes of an encoded header.
    pub const fn size(word: WordSize) -> usize {
        2 * word.bytes() + 6 * 4
    }

    /// The header describing `session`.
    pub fn for_session(session: &Session) -> Self {
        let range = session.range();
        let histogram = session.bucket_count().saturating_mul(COUNTER_SIZE);
        let ncnt = Self::size(session.word_size()).saturating_add(histogram);
        Self {
            lowpc: range.lowpc as u64,
            highpc: range.highpc as u64,
            ncnt: u32::try_from(ncnt).unwrap_or(u32::MAX),
            version: GMON_VERSION,
            profrate: session.sample_rate(),
            reserved: [0; 3],
        }
    }

    /// Number of histogram buckets announced by `ncnt`.
    pub fn bucket_count(&self, word: WordSize) -> Option<usize> {
        let histogram = (self.ncnt as usize).checked_sub(Self::size(word))?;
        if histogram % COUNTER_SIZE == 0 {
            Some(histogram / COUNTER_SIZE)
        } else {
            None
        }
    }

    /// Encodes the header.
    pub fn write_to<W: Write>(&self, word: WordSize, mut writer: W) -> io::Result<()> {
        word.write_addr(&mut writer, self.lowpc)?;
        word.write_addr(&mut writer, self.highpc)?;
        writer.write_all(&self.ncnt.to_ne_bytes())?;
        writer.write_all(&self.version.to_ne_bytes())?;
        writer.write_all(&self.profrate.to_ne_bytes())?;
        for reserved in &self.reserved {
            writer.write_all(&reserved.to_ne_bytes())?;
        }
        Ok(())
    }
}

/// One call-graph edge as stored in a dump.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RawArc {
    /// Address of the caller.
    pub frompc: u64,
    /// Address of the callee.
    pub selfpc: u64,
    /// Number of recorded calls.
    pub count: u64,
}

impl RawArc {
    /// Size in bytes of an encoded arc.
    pub const fn size(word: WordSize) -> usize {
        3 * word.bytes()
    }

    /// Encodes the arc.
    pub fn write_to<W: Write>(&self, word: WordSize, mut writer: W) -> io::Result<()> {
        word.write_addr(&mut writer, self.frompc)?;
        word.write_addr(&mut writer, self.selfpc)?;
        word.write_count(&mut writer, self.count)
    }
}

/// Writes `session` in `gmon.out` format to `writer`.
///
/// The buffers are read while the session may still be written to; callers that want a
/// consistent snapshot stop the session first.
pub fn write<W: Write>(session: &Session, mut writer: W) -> io::Result<()> {
    let word = session.word_size();
    Header::for_session(session).write_to(word, &mut writer)?;

    for sample in session.buffers().samples() {
        writer.write_all(&sample.to_ne_bytes())?;
    }

    for slot in session.buffers().arcs() {
        let count = slot.count();
        if count == 0 {
            continue;
        }
        let arc = RawArc {
            frompc: slot.frompc() as u64,
            selfpc: slot.selfpc() as u64,
            count: count as u64,
        };
        arc.write_to(word, &mut writer)?;
    }

    Ok(())
}

/// Creates (or truncates) `path` and writes `session` to it.
pub fn write_file(session: &Session, path: &Path) -> io::Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::with_capacity(WRITE_BUFFER, file);
    write(session, &mut writer)?;
    writer.flush()?;
    writer.get_ref().sync_all()
}
