//! Immutable CSR Graphs
//!
//! A graph is loaded once, optionally permuted by a [`crate::ShardHasher`],
//! and never mutated during iteration. Both edge directions are kept in CSR
//! form: the forward CSR answers out-neighbour queries for push-style
//! traversal, the reverse CSR answers in-neighbour queries for pull-style
//! traversal. Symmetric graphs share one CSR for both directions.
//!
//! Edge weights are stored alongside the targets (`1` everywhere for
//! unweighted inputs); per-algorithm edge payloads larger than a weight (BP's
//! messages) live in socket-local arenas addressed through per-vertex offsets
//! rather than in the graph itself.

mod filter;
mod io;

pub use filter::{graph_filter, graph_filter_two_direction, ShardGraph};
pub use io::{load_graph, LoadError};

use std::sync::Arc;

use crate::partition::ShardHasher;

/// Vertex identifier. Graphs beyond `u32::MAX` vertices are unsupported.
pub type VertexId = u32;

/// One direction of adjacency in compressed sparse row form.
///
/// `offsets` has `n + 1` entries; vertex `v`'s edges occupy
/// `targets[offsets[v]..offsets[v + 1]]` with parallel `weights`.
#[derive(Debug, Clone)]
pub struct Csr {
    offsets: Box<[usize]>,
    targets: Box<[VertexId]>,
    weights: Box<[i32]>,
}

impl Csr {
    /// Builds a CSR from per-vertex `(target, weight)` lists.
    pub fn from_adjacency(adj: &[Vec<(VertexId, i32)>]) -> Self {
        let mut offsets = Vec::with_capacity(adj.len() + 1);
        let mut targets = Vec::new();
        let mut weights = Vec::new();
        offsets.push(0);
        for list in adj {
            for &(t, w) in list {
                targets.push(t);
                weights.push(w);
            }
            offsets.push(targets.len());
        }
        Self {
            offsets: offsets.into_boxed_slice(),
            targets: targets.into_boxed_slice(),
            weights: weights.into_boxed_slice(),
        }
    }

    /// Builds a CSR from raw parts (loader path).
    pub(crate) fn from_parts(offsets: Box<[usize]>, targets: Box<[VertexId]>, weights: Box<[i32]>) -> Self {
        debug_assert_eq!(*offsets.last().unwrap_or(&0), targets.len());
        debug_assert_eq!(targets.len(), weights.len());
        Self {
            offsets,
            targets,
            weights,
        }
    }

    /// Number of vertices.
    #[inline]
    pub fn n(&self) -> usize {
        self.offsets.len() - 1
    }

    /// Number of edges.
    #[inline]
    pub fn m(&self) -> usize {
        self.targets.len()
    }

    /// Degree of vertex `v`.
    #[inline]
    pub fn degree(&self, v: usize) -> usize {
        self.offsets[v + 1] - self.offsets[v]
    }

    /// Edge targets of vertex `v`.
    #[inline]
    pub fn targets(&self, v: usize) -> &[VertexId] {
        &self.targets[self.offsets[v]..self.offsets[v + 1]]
    }

    /// Edge weights of vertex `v`, parallel to [`Self::targets`].
    #[inline]
    pub fn weights(&self, v: usize) -> &[i32] {
        &self.weights[self.offsets[v]..self.offsets[v + 1]]
    }

    /// `(target, weight)` pairs of vertex `v`.
    #[inline]
    pub fn edges(&self, v: usize) -> impl Iterator<Item = (VertexId, i32)> + '_ {
        self.targets(v)
            .iter()
            .copied()
            .zip(self.weights(v).iter().copied())
    }

    /// The transpose of this CSR.
    pub fn transpose(&self) -> Self {
        let n = self.n();
        let mut adj: Vec<Vec<(VertexId, i32)>> = vec![Vec::new(); n];
        for v in 0..n {
            for (t, w) in self.edges(v) {
                adj[t as usize].push((v as VertexId, w));
            }
        }
        Self::from_adjacency(&adj)
    }
}

/// An immutable graph with both adjacency directions.
///
/// Symmetric graphs store a single CSR shared by both directions; asymmetric
/// graphs carry the forward CSR and its transpose.
#[derive(Debug, Clone)]
pub struct Graph {
    out: Arc<Csr>,
    inc: Arc<Csr>,
    symmetric: bool,
    weighted: bool,
}

impl Graph {
    /// Wraps a symmetric adjacency; in- and out-edges are the same lists.
    pub fn symmetric(csr: Csr, weighted: bool) -> Self {
        let csr = Arc::new(csr);
        Self {
            out: Arc::clone(&csr),
            inc: csr,
            symmetric: true,
            weighted,
        }
    }

    /// Wraps a forward CSR, deriving the reverse direction by transposition.
    pub fn asymmetric(out: Csr, weighted: bool) -> Self {
        let inc = Arc::new(out.transpose());
        Self {
            out: Arc::new(out),
            inc,
            symmetric: false,
            weighted,
        }
    }

    /// Builds a directed graph from an edge list (test and driver helper).
    pub fn from_edges(n: usize, edges: &[(VertexId, VertexId, i32)]) -> Self {
        let mut adj: Vec<Vec<(VertexId, i32)>> = vec![Vec::new(); n];
        for &(s, d, w) in edges {
            adj[s as usize].push((d, w));
        }
        Self::asymmetric(Csr::from_adjacency(&adj), true)
    }

    /// Number of vertices.
    #[inline]
    pub fn n(&self) -> usize {
        self.out.n()
    }

    /// Number of directed edges.
    #[inline]
    pub fn m(&self) -> usize {
        self.out.m()
    }

    /// Whether the graph was declared symmetric at load time.
    #[inline]
    pub fn is_symmetric(&self) -> bool {
        self.symmetric
    }

    /// Whether edge weights carry information (false means all ones).
    #[inline]
    pub fn is_weighted(&self) -> bool {
        self.weighted
    }

    /// Forward (out-edge) adjacency.
    #[inline]
    pub fn out_csr(&self) -> &Csr {
        &self.out
    }

    /// Reverse (in-edge) adjacency.
    #[inline]
    pub fn in_csr(&self) -> &Csr {
        &self.inc
    }

    /// Out-degree of `v`.
    #[inline]
    pub fn out_degree(&self, v: usize) -> usize {
        self.out.degree(v)
    }

    /// In-degree of `v`.
    #[inline]
    pub fn in_degree(&self, v: usize) -> usize {
        self.inc.degree(v)
    }

    /// Relabels every vertex `v` to `hasher.hash(v)`.
    ///
    /// Scatters consecutive original ids round-robin across the socket
    /// ranges so heavy prefixes of the input numbering spread out. The
    /// result dump translates back through the same hasher.
    pub fn permute(&self, hasher: &ShardHasher) -> Self {
        let n = self.n();
        let relabel = |csr: &Csr| {
            let mut adj: Vec<Vec<(VertexId, i32)>> = vec![Vec::new(); n];
            for v in 0..n {
                let nv = hasher.hash(v);
                let list = &mut adj[nv];
                for (t, w) in csr.edges(v) {
                    list.push((hasher.hash(t as usize) as VertexId, w));
                }
            }
            Csr::from_adjacency(&adj)
        };
        if self.symmetric {
            Self::symmetric(relabel(&self.out), self.weighted)
        } else {
            let out = relabel(&self.out);
            let inc = relabel(&self.inc);
            Self {
                out: Arc::new(out),
                inc: Arc::new(inc),
                symmetric: false,
                weighted: self.weighted,
            }
        }
    }
}
