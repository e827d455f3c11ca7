//! Dense Traversal Primitives
//!
//! Three edge sweeps and one vertex sweep, each over a subworker's
//! contiguous sub-range. All of them gate on the input frontier and call
//! back into the program's kernels; none of them synchronise, the caller's
//! phase barriers provide the ordering.

use std::ops::Range;

use crate::frontier::Frontier;
use crate::graph::ShardGraph;

use super::VertexProgram;

/// Position of an edge at its kernel call: `index` is the edge's rank within
/// the swept vertex's retained list (in-edges of the destination for pull,
/// out-edges of the source for push), `weight` its integer weight.
#[derive(Debug, Clone, Copy)]
pub struct EdgeSlot {
    /// Rank within the swept vertex's edge list.
    pub index: usize,
    /// Edge weight (`1` on unweighted graphs).
    pub weight: i32,
}

/// Per-vertex side-effect pass: applies the program's reset kernel to every
/// active vertex of `range`.
pub fn vertex_map<P: VertexProgram>(
    input: &Frontier,
    program: &P,
    state: &P::SocketState,
    range: Range<usize>,
) {
    for v in range {
        if input.get(v) {
            program.reset(state, v);
        }
    }
}

/// Pull-style dense sweep: every destination in `range` gathers over its
/// in-edges from active sources.
///
/// The executing subworker owns every `d` it writes, so the kernel's
/// non-atomic path applies and no output frontier bits are produced. The
/// `cond` gate is re-checked between edge visits so a settled destination
/// stops early.
pub fn edge_map_dense<P: VertexProgram>(
    shard: &ShardGraph,
    input: &Frontier,
    program: &P,
    state: &P::SocketState,
    range: Range<usize>,
) {
    for d in range {
        if !program.cond(d) {
            continue;
        }
        let local = d - shard.range.start;
        for (index, (src, weight)) in shard.in_edges(local).enumerate() {
            if input.get(src as usize) {
                program.update(state, src as usize, d, EdgeSlot { index, weight });
                if !program.cond(d) {
                    break;
                }
            }
        }
    }
}

/// Push-style dense sweep: every active source in `range` scatters over its
/// out-edges.
///
/// Destinations may belong to any socket, so updates go through the atomic
/// kernel; an update that reports activation sets the destination's bit in
/// the output frontier, routed to the owning socket.
pub fn edge_map_dense_forward<P: VertexProgram>(
    shard: &ShardGraph,
    input: &Frontier,
    output: &Frontier,
    program: &P,
    state: &P::SocketState,
    range: Range<usize>,
) {
    for s in range {
        if !input.get(s) {
            continue;
        }
        let local = s - shard.range.start;
        for (index, (dst, weight)) in shard.out_edges(local).enumerate() {
            let d = dst as usize;
            if program.cond(d) && program.update_atomic(state, s, d, EdgeSlot { index, weight }) {
                output.set(d, true);
            }
        }
    }
}

/// The optional per-destination reduction of the kernel contract.
///
/// Programs implementing this fold each destination's active in-edges into a
/// stack-local accumulator and publish once, trading one atomic per edge for
/// one atomic per destination.
pub trait ReduceProgram: VertexProgram {
    /// The thread-local accumulator.
    type Acc;

    /// Fresh accumulator for destination `dst`.
    fn init_acc(&self, dst: usize) -> Self::Acc;

    /// Folds edge `(src, dst)` into the accumulator.
    fn reduce(&self, acc: &mut Self::Acc, src: usize, edge: EdgeSlot) -> bool;

    /// Publishes the accumulator into `next[dst]` via the atomic path.
    /// Returns whether `dst` became active.
    fn combine(&self, state: &Self::SocketState, dst: usize, acc: Self::Acc) -> bool;
}

/// Pull-style sweep using the program's reduction triple.
///
/// Destinations with no active in-edge are skipped entirely: an empty
/// frontier performs no kernel calls.
pub fn edge_map_dense_reduce<P: ReduceProgram>(
    shard: &ShardGraph,
    input: &Frontier,
    program: &P,
    state: &P::SocketState,
    range: Range<usize>,
) {
    for d in range {
        if !program.cond(d) {
            continue;
        }
        let local = d - shard.range.start;
        let mut acc = program.init_acc(d);
        let mut touched = false;
        for (index, (src, weight)) in shard.in_edges(local).enumerate() {
            if input.get(src as usize) {
                program.reduce(&mut acc, src as usize, EdgeSlot { index, weight });
                touched = true;
            }
        }
        if touched {
            program.combine(state, d, acc);
        }
    }
}
