//! Per-Socket Graph Shards
//!
//! A shard is the projection of the global graph onto one socket's vertex
//! range, with the retained adjacency copied into fresh storage. Socket
//! workers call these functions *after* binding to their node, so the copies
//! fault onto local pages; after filtering, every edge a socket worker
//! touches during traversal resides on its socket.

use std::ops::Range;

use super::{Csr, Graph, VertexId};

/// One socket's view of the graph: local vertices `[range.start, range.end)`
/// with their retained adjacency, indexed by local id `v - range.start`.
///
/// `fake_degree` is the retained edge count per local vertex in the shard's
/// primary direction; it drives core-shard sizing and per-vertex edge-data
/// offsets.
#[derive(Debug)]
pub struct ShardGraph {
    /// Global id range owned by this socket.
    pub range: Range<usize>,
    in_csr: Option<Csr>,
    out_csr: Option<Csr>,
    fake_degree: Box<[u32]>,
}

impl ShardGraph {
    /// Number of local vertices.
    #[inline]
    pub fn len(&self) -> usize {
        self.range.end - self.range.start
    }

    /// Whether the socket owns no vertices.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }

    /// In-edges of local vertex `local` (sources are global ids).
    ///
    /// # Panics
    ///
    /// Panics if the shard was built without the reverse direction.
    #[inline]
    pub fn in_edges(&self, local: usize) -> impl Iterator<Item = (VertexId, i32)> + '_ {
        self.in_csr
            .as_ref()
            .expect("shard built without in-edges")
            .edges(local)
    }

    /// Out-edges of local vertex `local` (targets are global ids).
    ///
    /// # Panics
    ///
    /// Panics if the shard was built without the forward direction.
    #[inline]
    pub fn out_edges(&self, local: usize) -> impl Iterator<Item = (VertexId, i32)> + '_ {
        self.out_csr
            .as_ref()
            .expect("shard built without out-edges")
            .edges(local)
    }

    /// Retained edge count of local vertex `local` in the primary direction.
    #[inline]
    pub fn fake_degree(&self, local: usize) -> u32 {
        self.fake_degree[local]
    }

    /// Per-vertex retained degrees.
    #[inline]
    pub fn fake_degrees(&self) -> &[u32] {
        &self.fake_degree
    }

    /// Total retained edges in the primary direction.
    pub fn local_edges(&self) -> usize {
        self.fake_degree.iter().map(|&d| d as usize).sum()
    }
}

/// Pull-mode projection: retains the in-edges of every vertex in
/// `[lo, hi)`. The socket owns the incoming edges of its vertices.
pub fn graph_filter(graph: &Graph, lo: usize, hi: usize) -> ShardGraph {
    let in_csr = copy_rows(graph.in_csr(), lo, hi);
    let fake_degree = degrees_of(&in_csr);
    ShardGraph {
        range: lo..hi,
        in_csr: Some(in_csr),
        out_csr: None,
        fake_degree,
    }
}

/// Push-mode projection: additionally retains the out-edges of local
/// vertices so forward traversal can scatter to any destination.
pub fn graph_filter_two_direction(graph: &Graph, lo: usize, hi: usize) -> ShardGraph {
    let in_csr = copy_rows(graph.in_csr(), lo, hi);
    let out_csr = copy_rows(graph.out_csr(), lo, hi);
    let fake_degree = degrees_of(&out_csr);
    ShardGraph {
        range: lo..hi,
        in_csr: Some(in_csr),
        out_csr: Some(out_csr),
        fake_degree,
    }
}

/// Copies rows `[lo, hi)` of a CSR into fresh (socket-local) storage.
fn copy_rows(csr: &Csr, lo: usize, hi: usize) -> Csr {
    let mut offsets = Vec::with_capacity(hi - lo + 1);
    let mut targets = Vec::new();
    let mut weights = Vec::new();
    offsets.push(0);
    for v in lo..hi {
        targets.extend_from_slice(csr.targets(v));
        weights.extend_from_slice(csr.weights(v));
        offsets.push(targets.len());
    }
    Csr::from_parts(
        offsets.into_boxed_slice(),
        targets.into_boxed_slice(),
        weights.into_boxed_slice(),
    )
}

fn degrees_of(csr: &Csr) -> Box<[u32]> {
    (0..csr.n()).map(|v| csr.degree(v) as u32).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cross() -> Graph {
        // 1 -> 2 and 3 -> 0, two sockets of two vertices each
        Graph::from_edges(4, &[(1, 2, 1), (3, 0, 1)])
    }

    #[test]
    fn test_pull_shard_keeps_in_edges() {
        let g = cross();
        let s0 = graph_filter(&g, 0, 2);
        // vertex 0 (local 0) has in-edge from 3
        assert_eq!(s0.in_edges(0).collect::<Vec<_>>(), vec![(3, 1)]);
        assert_eq!(s0.in_edges(1).count(), 0);
        assert_eq!(s0.fake_degree(0), 1);
        assert_eq!(s0.local_edges(), 1);
    }

    #[test]
    fn test_two_direction_shard() {
        let g = cross();
        let s0 = graph_filter_two_direction(&g, 0, 2);
        // vertex 1 (local 1) has out-edge to 2, crossing the socket boundary
        assert_eq!(s0.out_edges(1).collect::<Vec<_>>(), vec![(2, 1)]);
        // fake degree follows the forward direction in push mode
        assert_eq!(s0.fake_degree(1), 1);
        assert_eq!(s0.fake_degree(0), 0);
    }

    #[test]
    fn test_empty_shard() {
        let g = cross();
        let s = graph_filter(&g, 2, 2);
        assert!(s.is_empty());
        assert_eq!(s.local_edges(), 0);
    }
}
