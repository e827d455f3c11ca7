//! Direct exercises of the dense traversal primitives and frontier
//! bookkeeping, outside the worker hierarchy.

use std::ops::Range;
use std::sync::Arc;

use strata_graph::engine::{
    edge_map_dense, edge_map_dense_forward, edge_map_dense_reduce, vertex_map, EdgeSlot,
    ReduceProgram, TraversalMode, VertexProgram,
};
use strata_graph::graph::{graph_filter, graph_filter_two_direction};
use strata_graph::numa::StripedArena;
use strata_graph::sync::atomic::Ordering;
use strata_graph::sync::{AtomicF64, DoubleBuffer};
use strata_graph::{Frontier, Graph, LocalFrontier, ShardGraph};

struct MatVec {
    vec: DoubleBuffer<StripedArena<AtomicF64>>,
}

impl MatVec {
    fn new(n: usize, init: &[f64]) -> Self {
        let mv = Self {
            vec: DoubleBuffer::new(
                StripedArena::new(&[n]).unwrap(),
                StripedArena::new(&[n]).unwrap(),
            ),
        };
        for (v, &x) in init.iter().enumerate() {
            mv.vec.curr().as_slice()[v].store(x, Ordering::Relaxed);
        }
        mv
    }

    fn next_values(&self) -> Vec<f64> {
        self.vec
            .next()
            .as_slice()
            .iter()
            .map(|c| c.load(Ordering::Relaxed))
            .collect()
    }
}

impl VertexProgram for MatVec {
    type SocketState = ();

    fn traversal_mode(&self) -> TraversalMode {
        TraversalMode::Push
    }

    fn state_size(&self) -> usize {
        8
    }

    fn build_socket_state(&self, _shard: &ShardGraph, _socket: usize) {}

    fn init_range(&self, _range: Range<usize>) {}

    fn reset(&self, _state: &(), v: usize) -> bool {
        self.vec.next().as_slice()[v].store(0.0, Ordering::Relaxed);
        true
    }

    fn update(&self, _state: &(), src: usize, dst: usize, edge: EdgeSlot) -> bool {
        let next = &self.vec.next().as_slice()[dst];
        next.store(
            next.load(Ordering::Relaxed)
                + self.vec.curr().as_slice()[src].load(Ordering::Relaxed) * edge.weight as f64,
            Ordering::Relaxed,
        );
        true
    }

    fn update_atomic(&self, _state: &(), src: usize, dst: usize, edge: EdgeSlot) -> bool {
        self.vec.next().as_slice()[dst]
            .fetch_add(self.vec.curr().as_slice()[src].load(Ordering::Relaxed) * edge.weight as f64);
        true
    }
}

impl ReduceProgram for MatVec {
    type Acc = f64;

    fn init_acc(&self, _dst: usize) -> f64 {
        0.0
    }

    fn reduce(&self, acc: &mut f64, src: usize, edge: EdgeSlot) -> bool {
        *acc += self.vec.curr().as_slice()[src].load(Ordering::Relaxed) * edge.weight as f64;
        true
    }

    fn combine(&self, _state: &(), dst: usize, acc: f64) -> bool {
        self.vec.next().as_slice()[dst].fetch_add(acc);
        true
    }
}

fn frontiers(ranges: &[Range<usize>], full: bool) -> Frontier {
    let frontier = Frontier::new(ranges.len());
    for (s, r) in ranges.iter().enumerate() {
        let lf = if full {
            LocalFrontier::full(r.clone())
        } else {
            LocalFrontier::empty(r.clone())
        };
        frontier.register(s, Arc::new(lf));
    }
    frontier.calculate_offsets();
    frontier
}

#[test]
fn pull_iteration_leaves_output_bitmap_clear() {
    // all-ones input; one pull iteration's clear + reset + gather sequence
    // produces no output bits and a zero global count
    let graph = Graph::from_edges(4, &[(0, 1, 1), (1, 2, 1), (2, 3, 1)]);
    let shard = graph_filter(&graph, 0, 4);
    let input = frontiers(&[0..4], true);
    let output = frontiers(&[0..4], false);
    let program = MatVec::new(4, &[1.0, 2.0, 3.0, 4.0]);

    output.local(0).clear_range(0..4);
    vertex_map(&input, &program, &(), 0..4);
    edge_map_dense(&shard, &input, &program, &(), 0..4);

    assert_eq!(output.calculate_non_zero(0), 0);
    assert_eq!(output.global_count(), 0);
    // the gather itself ran
    assert_eq!(program.next_values(), vec![0.0, 1.0, 2.0, 3.0]);
}

#[test]
fn push_iteration_sets_output_bits_for_touched_destinations() {
    let graph = Graph::from_edges(4, &[(1, 2, 1), (3, 0, 1)]);
    let shard0 = graph_filter_two_direction(&graph, 0, 2);
    let shard1 = graph_filter_two_direction(&graph, 2, 4);
    let input = frontiers(&[0..2, 2..4], true);
    let output = frontiers(&[0..2, 2..4], false);
    let program = MatVec::new(4, &[0.1, 0.2, 0.3, 0.4]);

    vertex_map(&input, &program, &(), 0..4);
    edge_map_dense_forward(&shard0, &input, &output, &program, &(), 0..2);
    edge_map_dense_forward(&shard1, &input, &output, &program, &(), 2..4);

    // destination bits routed to their owning sockets
    assert!(output.get(0));
    assert!(output.get(2));
    assert!(!output.get(1));
    assert!(!output.get(3));
    assert_eq!(output.calculate_non_zero(0), 1);
    assert_eq!(output.calculate_non_zero(1), 1);
    assert_eq!(output.global_count(), 2);
}

#[test]
fn empty_input_frontier_suppresses_all_kernel_calls() {
    let graph = Graph::from_edges(3, &[(0, 1, 1), (1, 2, 1)]);
    let shard = graph_filter_two_direction(&graph, 0, 3);
    let input = frontiers(&[0..3], false);
    let output = frontiers(&[0..3], false);
    let program = MatVec::new(3, &[5.0, 6.0, 7.0]);

    // next starts at a sentinel; neither sweep may touch it
    for c in program.vec.next().as_slice() {
        c.store(-1.0, Ordering::Relaxed);
    }
    vertex_map(&input, &program, &(), 0..3);
    edge_map_dense(&shard, &input, &program, &(), 0..3);
    edge_map_dense_forward(&shard, &input, &output, &program, &(), 0..3);
    edge_map_dense_reduce(&shard, &input, &program, &(), 0..3);

    assert_eq!(program.next_values(), vec![-1.0, -1.0, -1.0]);
    assert_eq!(output.global_count(), 0);
}

#[test]
fn reduce_sweep_matches_forward_sweep() {
    let edges = [(0u32, 2u32, 3), (1, 2, 4), (3, 2, 5), (0, 1, 2)];
    let graph = Graph::from_edges(4, &edges);
    let init = [0.5, 0.25, 0.125, 2.0];

    let forward = MatVec::new(4, &init);
    let shard = graph_filter_two_direction(&graph, 0, 4);
    let input = frontiers(&[0..4], true);
    let output = frontiers(&[0..4], false);
    vertex_map(&input, &forward, &(), 0..4);
    edge_map_dense_forward(&shard, &input, &output, &forward, &(), 0..4);

    let reduced = MatVec::new(4, &init);
    vertex_map(&input, &reduced, &(), 0..4);
    edge_map_dense_reduce(&shard, &input, &reduced, &(), 0..4);

    let a = forward.next_values();
    let b = reduced.next_values();
    for (x, y) in a.iter().zip(&b) {
        assert!((x - y).abs() < 1e-12);
    }
}

#[test]
fn partial_frontier_gates_sources() {
    let graph = Graph::from_edges(3, &[(0, 2, 1), (1, 2, 1)]);
    let shard = graph_filter(&graph, 0, 3);
    let input = frontiers(&[0..3], false);
    input.local(0).set(1, true);
    let program = MatVec::new(3, &[10.0, 1.0, 0.0]);

    vertex_map(&input, &program, &(), 0..3);
    edge_map_dense(&shard, &input, &program, &(), 0..3);

    // only the contribution from the active source 1 lands; inactive
    // vertex 2's reset also never ran, so next keeps its zero
    assert_eq!(program.next_values(), vec![0.0, 0.0, 1.0]);
}
