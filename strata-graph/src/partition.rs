//! Socket and Core-Shard Partitioning
//!
//! The vertex id space `[0, n)` is cut twice. The socket split produces `S`
//! contiguous ranges whose record counts are multiples of the records that
//! fit one page (so the striped arena's `mbind` boundaries fall on page
//! boundaries); the last socket absorbs the remainder. Within a socket, the
//! core split walks the retained per-vertex degrees and opens a new shard
//! each time the cumulative degree crosses the next `1/C` threshold, so the
//! subworkers of a socket do roughly equal edge work over contiguous id
//! ranges.
//!
//! [`ShardHasher`] is the id permutation that justifies the page-aligned
//! socket split: it scatters consecutive original ids round-robin across the
//! sockets so degree mass is already spread when the equal-size split runs.

use crate::config::PAGE_SIZE;
use crate::graph::Graph;

/// Page-aligned equal split (mode A).
///
/// `q = (n / sockets)` rounded down to a multiple of the records per page;
/// the first `S - 1` sockets get `q`, the last absorbs the remainder.
/// With `n < sockets * records_per_page` the leading sockets are empty and
/// all vertices land on the last one; callers wanting a different layout for
/// small inputs pass an explicit partition.
pub fn page_aligned(n: usize, sockets: usize, state_size: usize) -> Vec<usize> {
    assert!(sockets > 0, "socket count must be positive");
    assert!(
        state_size > 0 && state_size <= PAGE_SIZE,
        "state record must fit a page"
    );
    let per_page = PAGE_SIZE / state_size;
    let q = n / sockets / per_page * per_page;
    let mut sizes = vec![q; sockets];
    sizes[sockets - 1] = n - q * (sockets - 1);
    sizes
}

/// Degree-balanced socket split (mode B).
///
/// Closes socket `s` once the cumulative out-degree passes `s + 1` shares of
/// the total, with each boundary rounded down to a page multiple so the
/// alignment invariant of mode A still holds. Balances edge work directly,
/// whether or not a [`ShardHasher`] permutation ran first.
pub fn by_degree(graph: &Graph, sockets: usize, state_size: usize) -> Vec<usize> {
    assert!(sockets > 0, "socket count must be positive");
    let per_page = (PAGE_SIZE / state_size).max(1);
    let n = graph.n();
    let total: u64 = (0..n).map(|v| graph.out_degree(v) as u64).sum();

    let mut sizes = vec![0usize; sockets];
    let mut boundary_prev = 0usize;
    let mut cum = 0u64;
    let mut socket = 0usize;
    for v in 0..n {
        cum += graph.out_degree(v) as u64;
        if socket + 1 < sockets && cum * sockets as u64 >= total * (socket + 1) as u64 {
            let boundary = (v + 1) / per_page * per_page;
            if boundary > boundary_prev {
                sizes[socket] = boundary - boundary_prev;
                boundary_prev = boundary;
                socket += 1;
            }
        }
    }
    sizes[socket] = n - boundary_prev;
    sizes
}

/// Core-shard split within one socket (both modes).
///
/// Walks the socket's local vertices accumulating `fake_degree` and starts
/// shard `k + 1` when the cumulative degree reaches `(total / C) * (k + 1)`.
/// Shards are contiguous in vertex id and sum to the socket's size; trailing
/// shards may be empty when the socket has fewer vertices than cores.
pub fn sub_partition_by_degree(fake_degrees: &[u32], cores: usize) -> Vec<usize> {
    assert!(cores > 0, "core count must be positive");
    let total: u64 = fake_degrees.iter().map(|&d| d as u64).sum();

    let mut sizes = vec![0usize; cores];
    let mut shard = 0usize;
    let mut cum = 0u64;
    for &d in fake_degrees {
        cum += d as u64;
        sizes[shard] += 1;
        if shard + 1 < cores && cum * cores as u64 >= total * (shard + 1) as u64 {
            shard += 1;
        }
    }
    sizes
}

/// The socket partition: per-socket sizes and derived `[lo, hi)` ranges.
#[derive(Debug, Clone)]
pub struct Partition {
    sizes: Vec<usize>,
    starts: Vec<usize>,
}

impl Partition {
    /// Wraps explicit per-socket sizes.
    pub fn from_sizes(sizes: Vec<usize>) -> Self {
        let mut starts = Vec::with_capacity(sizes.len() + 1);
        let mut acc = 0usize;
        starts.push(0);
        for &s in &sizes {
            acc += s;
            starts.push(acc);
        }
        Self { sizes, starts }
    }

    /// Number of sockets.
    #[inline]
    pub fn sockets(&self) -> usize {
        self.sizes.len()
    }

    /// Total vertex count covered.
    #[inline]
    pub fn total(&self) -> usize {
        *self.starts.last().unwrap_or(&0)
    }

    /// Size of socket `s`'s range.
    #[inline]
    pub fn size(&self, socket: usize) -> usize {
        self.sizes[socket]
    }

    /// `[lo, hi)` of socket `s`.
    #[inline]
    pub fn range(&self, socket: usize) -> core::ops::Range<usize> {
        self.starts[socket]..self.starts[socket + 1]
    }

    /// Per-socket sizes, for striped-arena construction.
    #[inline]
    pub fn sizes(&self) -> &[usize] {
        &self.sizes
    }
}

/// Round-robin vertex id permutation over the socket ranges.
///
/// `hash` sends original id `i` to shard `i % S`, position `i / S`; ids past
/// the divisible prefix map to themselves. `hash_back` inverts it exactly:
/// `hash_back(hash(i)) == i` for all `i < n`.
#[derive(Debug, Clone, Copy)]
pub struct ShardHasher {
    n: usize,
    shards: usize,
    per_shard: usize,
}

impl ShardHasher {
    /// Creates the permutation for `n` vertices over `shards` sockets.
    pub fn new(n: usize, shards: usize) -> Self {
        assert!(shards > 0, "shard count must be positive");
        Self {
            n,
            shards,
            per_shard: n / shards,
        }
    }

    /// Original id to scattered id.
    #[inline]
    pub fn hash(&self, index: usize) -> usize {
        if index >= self.shards * self.per_shard {
            return index;
        }
        (index % self.shards) * self.per_shard + index / self.shards
    }

    /// Scattered id back to original id.
    #[inline]
    pub fn hash_back(&self, index: usize) -> usize {
        if index >= self.shards * self.per_shard {
            return index;
        }
        index / self.per_shard + (index % self.per_shard) * self.shards
    }

    /// Number of vertices covered.
    #[inline]
    pub fn len(&self) -> usize {
        self.n
    }

    /// Whether the permutation is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.n == 0
    }
}
