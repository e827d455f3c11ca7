//! Active-Vertex Frontiers
//!
//! The frontier records which vertices participate in the current iteration.
//! It is physically per-socket: each socket worker allocates a bitmap over
//! its own id range in socket-local memory and installs it in the global
//! [`Frontier`] object, which provides the cross-socket view (bit lookup for
//! arbitrary ids, global population count).
//!
//! During an iteration the *input* frontier is read-only and the *output*
//! frontier starts cleared and accumulates. Bits are atomic words, so
//! cross-socket sets from push-forward traversal and word-sharing at shard
//! boundaries are both safe; each subworker still clears only its own
//! sub-range.

use std::ops::Range;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;

use crate::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

const WORD_BITS: usize = 64;

/// One socket's bitmap over its vertex range `[lo, hi)`.
#[derive(Debug)]
pub struct LocalFrontier {
    range: Range<usize>,
    words: Box<[AtomicU64]>,
    m: AtomicUsize,
}

impl LocalFrontier {
    /// Creates a bitmap with every vertex of `range` active.
    pub fn full(range: Range<usize>) -> Self {
        let lf = Self::empty(range);
        let len = lf.len();
        for (i, word) in lf.words.iter().enumerate() {
            word.store(tail_mask(len, i), Ordering::Relaxed);
        }
        lf.m.store(len, Ordering::Relaxed);
        lf
    }

    /// Creates a bitmap with every vertex of `range` inactive.
    pub fn empty(range: Range<usize>) -> Self {
        let len = range.end - range.start;
        let words = (0..len.div_ceil(WORD_BITS))
            .map(|_| AtomicU64::new(0))
            .collect();
        Self {
            range,
            words,
            m: AtomicUsize::new(0),
        }
    }

    /// The global id range covered.
    #[inline]
    pub fn range(&self) -> Range<usize> {
        self.range.clone()
    }

    /// Number of vertices covered.
    #[inline]
    pub fn len(&self) -> usize {
        self.range.end - self.range.start
    }

    /// Whether the covered range is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }

    /// Tests the bit of global id `v`.
    #[inline]
    pub fn get(&self, v: usize) -> bool {
        debug_assert!(self.range.contains(&v));
        let bit = v - self.range.start;
        self.words[bit / WORD_BITS].load(Ordering::Relaxed) & (1 << (bit % WORD_BITS)) != 0
    }

    /// Sets or clears the bit of global id `v`.
    ///
    /// The cached count is not maintained here; call [`Self::recount`] at the
    /// iteration boundary.
    #[inline]
    pub fn set(&self, v: usize, active: bool) {
        debug_assert!(self.range.contains(&v));
        let bit = v - self.range.start;
        let mask = 1u64 << (bit % WORD_BITS);
        if active {
            self.words[bit / WORD_BITS].fetch_or(mask, Ordering::Relaxed);
        } else {
            self.words[bit / WORD_BITS].fetch_and(!mask, Ordering::Relaxed);
        }
    }

    /// Clears all bits of the global id sub-range `sub`.
    ///
    /// Partial boundary words are masked, so adjacent subworkers clearing
    /// their own sub-ranges may share a word.
    pub fn clear_range(&self, sub: Range<usize>) {
        if sub.end <= self.range.start || sub.start >= self.range.end {
            return;
        }
        let lo = sub.start.max(self.range.start) - self.range.start;
        let hi = sub.end.min(self.range.end) - self.range.start;
        if lo >= hi {
            return;
        }
        let (first, last) = (lo / WORD_BITS, (hi - 1) / WORD_BITS);
        for w in first..=last {
            let mut keep = 0u64;
            if w == first && lo % WORD_BITS != 0 {
                keep |= (1u64 << (lo % WORD_BITS)) - 1;
            }
            if w == last && hi % WORD_BITS != 0 {
                keep |= !((1u64 << (hi % WORD_BITS)) - 1);
            }
            self.words[w].fetch_and(keep, Ordering::Relaxed);
        }
    }

    /// Recomputes the active count from the bitmap and caches it.
    pub fn recount(&self) -> usize {
        let count: usize = self
            .words
            .iter()
            .map(|w| w.load(Ordering::Relaxed).count_ones() as usize)
            .sum();
        self.m.store(count, Ordering::Relaxed);
        count
    }

    /// The count cached by the last [`Self::recount`].
    #[inline]
    pub fn count(&self) -> usize {
        self.m.load(Ordering::Relaxed)
    }
}

/// Valid-bit mask for word `i` of a bitmap covering `len` bits.
fn tail_mask(len: usize, i: usize) -> u64 {
    let used = len - i * WORD_BITS;
    if used >= WORD_BITS {
        !0
    } else {
        (1u64 << used) - 1
    }
}

struct Frozen {
    locals: Box<[Arc<LocalFrontier>]>,
    starts: Box<[usize]>,
    n: usize,
}

/// The global frontier: one [`LocalFrontier`] per socket plus the id
/// translation needed for cross-socket bit access.
///
/// Lifecycle: each socket worker calls [`Frontier::register`] once, then the
/// master calls [`Frontier::calculate_offsets`]; from that point the
/// structure is immutable and all accessors are lock-free.
pub struct Frontier {
    sockets: usize,
    staging: Mutex<Vec<Option<Arc<LocalFrontier>>>>,
    frozen: OnceLock<Frozen>,
}

impl Frontier {
    /// Creates a frontier awaiting `sockets` registrations.
    pub fn new(sockets: usize) -> Self {
        Self {
            sockets,
            staging: Mutex::new(vec![None; sockets]),
            frozen: OnceLock::new(),
        }
    }

    /// Installs socket `s`'s bitmap. Called once per socket at startup.
    ///
    /// # Panics
    ///
    /// Panics on double registration or an out-of-range socket index.
    pub fn register(&self, socket: usize, lf: Arc<LocalFrontier>) {
        let mut staging = self.staging.lock();
        assert!(socket < self.sockets, "socket index out of range");
        assert!(
            staging[socket].replace(lf).is_none(),
            "socket {} registered twice",
            socket
        );
    }

    /// Freezes the registrations and computes the bit-to-id translation.
    /// Called once, from the master, after every socket has registered.
    ///
    /// # Panics
    ///
    /// Panics if a registration is missing or the ranges do not tile the id
    /// space contiguously in socket order.
    pub fn calculate_offsets(&self) {
        let staging = self.staging.lock();
        let mut locals = Vec::with_capacity(self.sockets);
        let mut starts = Vec::with_capacity(self.sockets);
        let mut expect = 0usize;
        for (socket, slot) in staging.iter().enumerate() {
            let lf = slot
                .as_ref()
                .unwrap_or_else(|| panic!("socket {} never registered", socket));
            assert_eq!(
                lf.range().start,
                expect,
                "socket {} range does not continue the partition",
                socket
            );
            starts.push(lf.range().start);
            expect = lf.range().end;
            locals.push(Arc::clone(lf));
        }
        let frozen = Frozen {
            locals: locals.into_boxed_slice(),
            starts: starts.into_boxed_slice(),
            n: expect,
        };
        assert!(
            self.frozen.set(frozen).is_ok(),
            "offsets calculated twice"
        );
    }

    /// Number of sockets.
    #[inline]
    pub fn sockets(&self) -> usize {
        self.sockets
    }

    /// Total vertices covered (valid after [`Self::calculate_offsets`]).
    #[inline]
    pub fn len(&self) -> usize {
        self.frozen().n
    }

    /// Whether the frontier covers no vertices.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The bitmap of socket `s`.
    #[inline]
    pub fn local(&self, socket: usize) -> &Arc<LocalFrontier> {
        &self.frozen().locals[socket]
    }

    /// Recomputes socket `s`'s cached count from its bitmap.
    pub fn calculate_non_zero(&self, socket: usize) -> usize {
        self.frozen().locals[socket].recount()
    }

    /// Tests the bit of an arbitrary global id.
    #[inline]
    pub fn get(&self, v: usize) -> bool {
        let f = self.frozen();
        f.locals[socket_of(f, v)].get(v)
    }

    /// Sets the bit of an arbitrary global id, routing to the owning socket.
    #[inline]
    pub fn set(&self, v: usize, active: bool) {
        let f = self.frozen();
        f.locals[socket_of(f, v)].set(v, active);
    }

    /// Global population count: the sum of the per-socket cached counts.
    pub fn global_count(&self) -> usize {
        self.frozen().locals.iter().map(|lf| lf.count()).sum()
    }

    #[inline]
    fn frozen(&self) -> &Frozen {
        self.frozen
            .get()
            .expect("frontier offsets not calculated")
    }
}

#[inline]
fn socket_of(f: &Frozen, v: usize) -> usize {
    debug_assert!(v < f.n);
    f.starts.partition_point(|&lo| lo <= v) - 1
}
