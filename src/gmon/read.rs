use std::io::{self, Read};

use super::{Header, RawArc, WordSize, COUNTER_SIZE};

/// A decoded `gmon.out` dump.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Dump {
    /// The dump header.
    pub header: Header,
    /// One counter per bucket, in bucket order.
    pub samples: Vec<u32>,
    /// The recorded call-graph edges.
    pub arcs: Vec<RawArc>,
}

impl Dump {
    /// Decodes a dump written with `word`-sized addresses.
    ///
    /// Fails with [`io::ErrorKind::InvalidData`] if `ncnt` does not describe a whole number of
    /// counters or trailing bytes do not form a whole arc record, and with
    /// [`io::ErrorKind::UnexpectedEof`] if the histogram is truncated.
    pub fn read_from<R: Read>(word: WordSize, mut reader: R) -> io::Result<Self> {
        let header = read_header(word, &mut reader)?;
        let buckets = header.bucket_count(word).ok_or_else(|| {
            invalid_data(format!(
                "ncnt {} does not cover a {}-byte header plus whole counters",
                header.ncnt,
                Header::size(word)
            ))
        })?;

        let mut samples = Vec::new();
        let mut counter = [0; COUNTER_SIZE];
        for _ in 0..buckets {
            reader.read_exact(&mut counter)?;
            samples.push(u32::from_ne_bytes(counter));
        }

        let mut rest = Vec::new();
        reader.read_to_end(&mut rest)?;
        let record = RawArc::size(word);
        if rest.len() % record != 0 {
            return Err(invalid_data(format!(
                "{} trailing bytes do not form whole {}-byte arc records",
                rest.len(),
                record
            )));
        }

        let arcs = rest
            .chunks_exact(record)
            .map(|chunk| {
                let mut fields = chunk.chunks_exact(word.bytes()).map(|f| decode_word(word, f));
                RawArc {
                    frompc: fields.next().unwrap_or(0),
                    selfpc: fields.next().unwrap_or(0),
                    count: fields.next().unwrap_or(0),
                }
            })
            .collect();

        Ok(Self {
            header,
            samples,
            arcs,
        })
    }

    /// Sum of all histogram counters.
    pub fn total_samples(&self) -> u64 {
        self.samples.iter().map(|&s| u64::from(s)).sum()
    }
}

fn read_header<R: Read>(word: WordSize, reader: &mut R) -> io::Result<Header> {
    let mut buf = [0; 8];
    let addr = &mut buf[..word.bytes()];
    reader.read_exact(addr)?;
    let lowpc = decode_word(word, addr);
    reader.read_exact(addr)?;
    let highpc = decode_word(word, addr);

    let mut ints = [0u32; 6];
    let mut int = [0; 4];
    for v in &mut ints {
        reader.read_exact(&mut int)?;
        *v = u32::from_ne_bytes(int);
    }

    Ok(Header {
        lowpc,
        highpc,
        ncnt: ints[0],
        version: ints[1],
        profrate: ints[2],
        reserved: [ints[3], ints[4], ints[5]],
    })
}

fn decode_word(word: WordSize, bytes: &[u8]) -> u64 {
    match word {
        WordSize::Four => {
            let mut b = [0; 4];
            b.copy_from_slice(&bytes[..4]);
            u64::from(u32::from_ne_bytes(b))
        }
        WordSize::Eight => {
            let mut b = [0; 8];
            b.copy_from_slice(&bytes[..8]);
            u64::from_ne_bytes(b)
        }
    }
}

fn invalid_data(msg: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gmon::GMON_VERSION;

    fn header(ncnt: u32) -> Header {
        Header {
            lowpc: 0x400,
            highpc: 0x410,
            ncnt,
            version: GMON_VERSION,
            profrate: 100,
            reserved: [0; 3],
        }
    }

    #[test]
    fn reads_what_was_written() {
        let word = WordSize::Four;
        let mut bytes = Vec::new();
        header(32 + 4 * 4).write_to(word, &mut bytes).unwrap();
        for s in [0u32, 7, 0, 1] {
            bytes.extend_from_slice(&s.to_ne_bytes());
        }
        let arc = RawArc {
            frompc: 0x404,
            selfpc: 0x408,
            count: 3,
        };
        arc.write_to(word, &mut bytes).unwrap();

        let dump = Dump::read_from(word, &bytes[..]).unwrap();
        assert_eq!(dump.header, header(48));
        assert_eq!(dump.samples, vec![0, 7, 0, 1]);
        assert_eq!(dump.arcs, vec![arc]);
        assert_eq!(dump.total_samples(), 8);
    }

    #[test]
    fn rejects_ncnt_smaller_than_header() {
        let mut bytes = Vec::new();
        header(8).write_to(WordSize::Four, &mut bytes).unwrap();
        let err = Dump::read_from(WordSize::Four, &bytes[..]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn rejects_truncated_histogram() {
        let mut bytes = Vec::new();
        header(32 + 4 * 4).write_to(WordSize::Four, &mut bytes).unwrap();
        bytes.extend_from_slice(&[0; 6]);
        let err = Dump::read_from(WordSize::Four, &bytes[..]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn rejects_partial_arc() {
        let mut bytes = Vec::new();
        header(40).write_to(WordSize::Eight, &mut bytes).unwrap();
        bytes.extend_from_slice(&[0; 10]);
        let err = Dump::read_from(WordSize::Eight, &bytes[..]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
