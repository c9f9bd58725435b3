use std::fmt;

/// The default number of bytes of text covered by a single bucket.
///
/// One histogram counter and one arc slot per four bytes of text.
pub const HISTFRACTION: usize = 4;

/// The contiguous span of instrumented code, in link-time addresses.
///
/// The range is half-open: `lowpc` is the first instrumented byte and `highpc` is one past the
/// last. An address equal to `highpc` is therefore out of range and is never recorded, which keeps
/// every computed bucket index strictly below [`TextRange::bucket_count`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextRange {
    /// Lowest instrumented address.
    pub lowpc: usize,
    /// One past the highest instrumented address.
    pub highpc: usize,
}

impl TextRange {
    /// Creates a range covering `[lowpc, highpc)`.
    pub const fn new(lowpc: usize, highpc: usize) -> Self {
        Self { lowpc, highpc }
    }

    /// Number of bytes in the range, or 0 if the bounds are inverted.
    pub const fn textsize(&self) -> usize {
        self.highpc.saturating_sub(self.lowpc)
    }

    /// Whether the range covers no bytes at all.
    pub const fn is_empty(&self) -> bool {
        self.textsize() == 0
    }

    /// Number of `hist_fraction`-byte buckets needed to cover the range, rounded up.
    pub const fn bucket_count(&self, hist_fraction: usize) -> usize {
        let textsize = self.textsize();
        textsize / hist_fraction + (textsize % hist_fraction != 0) as usize
    }

    /// Whether `addr` falls inside `[lowpc, highpc)`.
    #[inline]
    pub const fn contains(&self, addr: usize) -> bool {
        addr >= self.lowpc && addr < self.highpc
    }

    /// Maps `addr` to its bucket index, or `None` if it is out of range.
    #[inline]
    pub fn bucket_of(&self, addr: usize, hist_fraction: usize) -> Option<usize> {
        if self.contains(addr) {
            Some((addr - self.lowpc) / hist_fraction)
        } else {
            None
        }
    }

    /// Reads the instrumented range from the linker-provided boundary symbols.
    ///
    /// `__executable_start` marks the start of the text segment and `etext` the first byte past
    /// it. Both are runtime addresses, so no address bias applies to them. Returns `None` off
    /// Linux, or when the default `link-markers` feature is disabled.
    pub fn from_link_markers() -> Option<Self> {
        link_markers::read()
    }
}

impl fmt::Display for TextRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}..{:#x}", self.lowpc, self.highpc)
    }
}

#[cfg(all(feature = "link-markers", target_os = "linux"))]
mod link_markers {
    use super::TextRange;

    extern "C" {
        static __executable_start: u8;
        static etext: u8;
    }

    pub(super) fn read() -> Option<TextRange> {
        // SAFETY: only the addresses of the linker symbols are taken, they are never read.
        let (lowpc, highpc) = unsafe {
            (
                std::ptr::addr_of!(__executable_start) as usize,
                std::ptr::addr_of!(etext) as usize,
            )
        };
        let range = TextRange::new(lowpc, highpc);
        if range.is_empty() {
            None
        } else {
            Some(range)
        }
    }
}

#[cfg(not(all(feature = "link-markers", target_os = "linux")))]
mod link_markers {
    use super::TextRange;

    pub(super) fn read() -> Option<TextRange> {
        None
    }
}
