//! The shared profiling buffers.
//!
//! Both arrays are written concurrently and without locking: the arc table by every thread that
//! runs through the instrumentation hook, the histogram by the sampler thread. Counters are
//! updated with a `Relaxed` load followed by a `Relaxed` store rather than a read-modify-write, so
//! concurrent increments of the same bucket may be lost. The profile is statistical and that loss
//! is accepted in exchange for keeping the hook down to a handful of plain memory operations.

use std::alloc::{self, Layout};
use std::mem;
use std::ptr;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

/// A `frompc -> selfpc` call-graph edge and how many times it was taken.
///
/// There is one slot per bucket. Distinct callers that land in the same bucket overwrite
/// `frompc`/`selfpc`, while `count` keeps accumulating across all of them.
#[derive(Debug, Default)]
pub struct ArcSlot {
    frompc: AtomicUsize,
    selfpc: AtomicUsize,
    count: AtomicUsize,
}

impl ArcSlot {
    #[inline]
    pub(crate) fn record(&self, frompc: usize, selfpc: usize) {
        self.frompc.store(frompc, Ordering::Relaxed);
        self.selfpc.store(selfpc, Ordering::Relaxed);
        let count = self.count.load(Ordering::Relaxed);
        self.count.store(count.wrapping_add(1), Ordering::Relaxed);
    }

    /// Address of the most recent caller recorded in this bucket.
    pub fn frompc(&self) -> usize {
        self.frompc.load(Ordering::Relaxed)
    }

    /// Address of the most recent callee recorded in this bucket.
    pub fn selfpc(&self) -> usize {
        self.selfpc.load(Ordering::Relaxed)
    }

    /// Number of calls recorded in this bucket.
    pub fn count(&self) -> usize {
        self.count.load(Ordering::Relaxed)
    }
}

/// The arc table and the PC histogram, always allocated and freed as a pair.
#[derive(Debug)]
pub struct Buffers {
    arcs: Box<[ArcSlot]>,
    samples: Box<[AtomicU32]>,
}

impl Buffers {
    /// Allocates zeroed arc and histogram tables with `buckets` entries each.
    ///
    /// Both tables come straight from the allocator's zeroed memory, so pages of buckets that are
    /// never hit are never touched. Returns `None` if either allocation fails, in which case the
    /// table allocated first has already been freed.
    pub fn allocate(buckets: usize) -> Option<Self> {
        let arcs = zeroed::<ArcSlot>(buckets)?;
        let samples = zeroed::<AtomicU32>(buckets)?;
        Some(Self { arcs, samples })
    }

    /// Number of bytes needed to hold both tables for `buckets` buckets.
    pub fn footprint(buckets: usize) -> usize {
        buckets.saturating_mul(mem::size_of::<ArcSlot>() + mem::size_of::<AtomicU32>())
    }

    /// Number of buckets in each table.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the tables have no buckets.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// The arc table, in bucket order.
    pub fn arcs(&self) -> &[ArcSlot] {
        &self.arcs
    }

    /// Current value of every histogram bucket, in bucket order.
    pub fn samples(&self) -> impl ExactSizeIterator<Item = u32> + '_ {
        self.samples.iter().map(|s| s.load(Ordering::Relaxed))
    }

    /// Current value of a single histogram bucket.
    pub fn sample(&self, bucket: usize) -> Option<u32> {
        self.samples
            .get(bucket)
            .map(|s| s.load(Ordering::Relaxed))
    }

    #[inline]
    pub(crate) fn record_arc(&self, bucket: usize, frompc: usize, selfpc: usize) {
        if let Some(slot) = self.arcs.get(bucket) {
            slot.record(frompc, selfpc);
        }
    }

    #[inline]
    pub(crate) fn record_sample(&self, bucket: usize) {
        if let Some(slot) = self.samples.get(bucket) {
            let n = slot.load(Ordering::Relaxed);
            slot.store(n.wrapping_add(1), Ordering::Relaxed);
        }
    }
}

/// Types for which the all-zero bit pattern is a valid value.
///
/// # Safety
///
/// Implementors must be valid when every byte is zero.
unsafe trait Zeroable {}

// SAFETY: atomics of integers have the same in-memory representation as the integers.
unsafe impl Zeroable for AtomicU32 {}
// SAFETY: three `AtomicUsize`s and nothing else.
unsafe impl Zeroable for ArcSlot {}

fn zeroed<T: Zeroable>(len: usize) -> Option<Box<[T]>> {
    let layout = Layout::array::<T>(len).ok()?;
    if layout.size() == 0 {
        return Some(Box::default());
    }

    // SAFETY: `layout` has a non-zero size.
    let data = unsafe { alloc::alloc_zeroed(layout) }.cast::<T>();
    if data.is_null() {
        return None;
    }
    // SAFETY: `data` was allocated by the global allocator with the layout of `[T; len]` and is
    // zeroed, which is a valid `T` for every element.
    Some(unsafe { Box::from_raw(ptr::slice_from_raw_parts_mut(data, len)) })
}
