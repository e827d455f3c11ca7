//! End-to-end engine scenarios on simulated multi-socket layouts.
//!
//! Explicit socket partitions stand in for real NUMA placement, so these run
//! on any host: binding and `mbind` degrade to no-ops, the thread hierarchy
//! and traversal semantics do not.

use std::ops::Range;
use std::sync::Arc;

use strata_graph::engine::{EdgeSlot, TraversalMode, VertexProgram};
use strata_graph::numa::StripedArena;
use strata_graph::sync::atomic::Ordering;
use strata_graph::sync::{AtomicF32, AtomicF64, DoubleBuffer};
use strata_graph::{Engine, EngineConfig, Graph, ShardGraph};

/// Push-mode vector program: `next = A * curr`, the SpMV kernel.
struct PushMatVec {
    vec: DoubleBuffer<StripedArena<AtomicF64>>,
    init: Vec<f64>,
}

impl PushMatVec {
    fn new(sizes: &[usize], init: Vec<f64>) -> Self {
        Self {
            vec: DoubleBuffer::new(
                StripedArena::new(sizes).unwrap(),
                StripedArena::new(sizes).unwrap(),
            ),
            init,
        }
    }

    fn values(&self) -> Vec<f64> {
        self.vec
            .curr()
            .as_slice()
            .iter()
            .map(|c| c.load(Ordering::Relaxed))
            .collect()
    }
}

impl VertexProgram for PushMatVec {
    type SocketState = ();

    fn traversal_mode(&self) -> TraversalMode {
        TraversalMode::Push
    }

    fn state_size(&self) -> usize {
        8
    }

    fn build_socket_state(&self, _shard: &ShardGraph, _socket: usize) {}

    fn init_range(&self, range: Range<usize>) {
        let curr = self.vec.curr().as_slice();
        let next = self.vec.next().as_slice();
        for v in range {
            curr[v].store(self.init[v], Ordering::Relaxed);
            next[v].store(0.0, Ordering::Relaxed);
        }
    }

    fn reset(&self, _state: &(), v: usize) -> bool {
        self.vec.next().as_slice()[v].store(0.0, Ordering::Relaxed);
        true
    }

    fn update(&self, _state: &(), src: usize, dst: usize, edge: EdgeSlot) -> bool {
        let curr = self.vec.curr().as_slice();
        let next = &self.vec.next().as_slice()[dst];
        next.store(
            next.load(Ordering::Relaxed) + curr[src].load(Ordering::Relaxed) * edge.weight as f64,
            Ordering::Relaxed,
        );
        true
    }

    fn update_atomic(&self, _state: &(), src: usize, dst: usize, edge: EdgeSlot) -> bool {
        let curr = self.vec.curr().as_slice();
        self.vec.next().as_slice()[dst]
            .fetch_add(curr[src].load(Ordering::Relaxed) * edge.weight as f64);
        true
    }

    fn flip_global(&self) {
        self.vec.flip();
    }
}

/// Pull-mode variant of the same arithmetic, for determinism checks.
struct PullMatVec(PushMatVec);

impl VertexProgram for PullMatVec {
    type SocketState = ();

    fn traversal_mode(&self) -> TraversalMode {
        TraversalMode::Pull
    }

    fn state_size(&self) -> usize {
        8
    }

    fn build_socket_state(&self, _shard: &ShardGraph, _socket: usize) {}

    fn init_range(&self, range: Range<usize>) {
        self.0.init_range(range);
    }

    fn reset(&self, state: &(), v: usize) -> bool {
        self.0.reset(state, v)
    }

    fn update(&self, state: &(), src: usize, dst: usize, edge: EdgeSlot) -> bool {
        self.0.update(state, src, dst, edge)
    }

    fn update_atomic(&self, state: &(), src: usize, dst: usize, edge: EdgeSlot) -> bool {
        self.0.update_atomic(state, src, dst, edge)
    }

    fn flip_global(&self) {
        self.0.flip_global();
    }
}

fn run_push(
    graph: Graph,
    sizes: Vec<usize>,
    cores: usize,
    init: Vec<f64>,
    iters: i64,
) -> Vec<f64> {
    let config = EngineConfig {
        sockets: sizes.len(),
        cores_per_socket: cores,
        socket_sizes: Some(sizes.clone()),
    };
    let program = Arc::new(PushMatVec::new(&sizes, init));
    let engine = Engine::new(Arc::new(graph), config).unwrap();
    engine.run(Arc::clone(&program), iters).unwrap();
    program.values()
}

fn assert_close(actual: &[f64], expected: &[f64]) {
    assert_eq!(actual.len(), expected.len());
    for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
        assert!((a - e).abs() < 1e-12, "slot {}: {} vs {}", i, a, e);
    }
}

#[test]
fn spmv_identity_leaves_vector_unchanged() {
    let n = 8;
    let edges: Vec<_> = (0..n as u32).map(|v| (v, v, 1)).collect();
    let graph = Graph::from_edges(n, &edges);
    let init = vec![1.0 / n as f64; n];
    let result = run_push(graph, vec![2, 2, 2, 2], 6, init.clone(), 1);
    assert_close(&result, &init);
}

#[test]
fn spmv_chain_shifts_mass() {
    let edges = [(0u32, 1u32, 1), (1, 2, 1), (2, 3, 1)];
    let expect = [
        vec![0.0, 1.0, 0.0, 0.0],
        vec![0.0, 0.0, 1.0, 0.0],
        vec![0.0, 0.0, 0.0, 1.0],
    ];
    for (iters, expected) in (1i64..=3).zip(&expect) {
        let graph = Graph::from_edges(4, &edges);
        let result = run_push(
            graph,
            vec![1, 1, 1, 1],
            6,
            vec![1.0, 0.0, 0.0, 0.0],
            iters,
        );
        assert_close(&result, expected);
    }
}

#[test]
fn spmv_cross_socket_edges_use_atomic_path() {
    // sockets: {0, 1} and {2, 3}; both edges cross the boundary
    let graph = Graph::from_edges(4, &[(1, 2, 1), (3, 0, 1)]);
    let result = run_push(
        graph,
        vec![2, 2],
        2,
        vec![0.125, 0.25, 0.5, 0.75],
        1,
    );
    assert_close(&result, &[0.75, 0.0, 0.25, 0.0]);
}

#[test]
fn zero_iterations_preserve_initial_state() {
    let graph = Graph::from_edges(4, &[(0, 1, 1), (1, 2, 1)]);
    let init = vec![3.0, 1.0, 4.0, 1.5];
    let result = run_push(graph, vec![2, 2], 2, init.clone(), 0);
    assert_close(&result, &init);
}

#[test]
fn single_socket_runs_shared_memory() {
    let edges = [(0u32, 1u32, 2), (1, 2, 3), (2, 0, 5)];
    let graph = Graph::from_edges(3, &edges);
    let result = run_push(graph, vec![3], 4, vec![1.0, 1.0, 1.0], 1);
    assert_close(&result, &[5.0, 2.0, 3.0]);
}

#[test]
fn pull_mode_is_bitwise_deterministic() {
    // a small dense-ish graph with irrational-ish weights summed per vertex
    let n = 12;
    let mut edges = Vec::new();
    for v in 0..n as u32 {
        for k in 1..=3u32 {
            edges.push((v, (v * 7 + k * 5) % n as u32, (k as i32) * 3 - 2));
        }
    }
    let init: Vec<f64> = (0..n).map(|v| 1.0 / (v + 1) as f64).collect();

    let mut previous: Option<Vec<f64>> = None;
    for _ in 0..2 {
        let graph = Graph::from_edges(n, &edges);
        let sizes = vec![3, 3, 3, 3];
        let config = EngineConfig {
            sockets: 4,
            cores_per_socket: 3,
            socket_sizes: Some(sizes.clone()),
        };
        let program = Arc::new(PullMatVec(PushMatVec::new(&sizes, init.clone())));
        let engine = Engine::new(Arc::new(graph), config).unwrap();
        engine.run(Arc::clone(&program), 4).unwrap();
        let values = program.0.values();
        if let Some(prev) = &previous {
            // bitwise equality, not tolerance
            assert!(prev
                .iter()
                .zip(&values)
                .all(|(a, b)| a.to_bits() == b.to_bits()));
        }
        previous = Some(values);
    }
}

/// Minimal belief-propagation state: a per-vertex product accumulator that
/// the reset pass returns to all-ones each iteration.
struct ProductReset {
    products: DoubleBuffer<StripedArena<[AtomicF32; 2]>>,
    #[allow(dead_code)]
    vertex_potential: Vec<[f32; 2]>,
}

impl VertexProgram for ProductReset {
    type SocketState = ();

    fn traversal_mode(&self) -> TraversalMode {
        TraversalMode::Pull
    }

    fn state_size(&self) -> usize {
        8
    }

    fn build_socket_state(&self, _shard: &ShardGraph, _socket: usize) {}

    fn init_range(&self, range: Range<usize>) {
        for buf in [self.products.curr(), self.products.next()] {
            for v in range.clone() {
                for p in &buf.as_slice()[v] {
                    p.store(1.0, Ordering::Relaxed);
                }
            }
        }
    }

    fn reset(&self, _state: &(), v: usize) -> bool {
        for p in &self.products.next().as_slice()[v] {
            p.store(1.0, Ordering::Relaxed);
        }
        true
    }

    fn update(&self, _state: &(), _src: usize, dst: usize, _edge: EdgeSlot) -> bool {
        // fold an (here, constant) message into the destination's product
        for p in &self.products.next().as_slice()[dst] {
            p.store(p.load(Ordering::Relaxed) * 0.5, Ordering::Relaxed);
        }
        true
    }

    fn update_atomic(&self, _state: &(), _src: usize, dst: usize, _edge: EdgeSlot) -> bool {
        for p in &self.products.next().as_slice()[dst] {
            p.fetch_mul(0.5);
        }
        true
    }

    fn flip_global(&self) {
        self.products.flip();
    }
}

#[test]
fn bp_isolated_vertex_keeps_reset_product() {
    // one observed vertex with potential [0.7, 0.3] and no edges: every
    // iteration resets its product to [1, 1] and no kernel ever runs
    for iters in [1, 3, 7] {
        let graph = Graph::from_edges(1, &[]);
        let sizes = vec![1];
        let program = Arc::new(ProductReset {
            products: DoubleBuffer::new(
                StripedArena::new(&sizes).unwrap(),
                StripedArena::new(&sizes).unwrap(),
            ),
            vertex_potential: vec![[0.7, 0.3]],
        });
        let config = EngineConfig {
            sockets: 1,
            cores_per_socket: 2,
            socket_sizes: Some(sizes),
        };
        let engine = Engine::new(Arc::new(graph), config).unwrap();
        engine.run(Arc::clone(&program), iters).unwrap();
        let product = &program.products.curr().as_slice()[0];
        assert_eq!(product[0].load(Ordering::Relaxed), 1.0);
        assert_eq!(product[1].load(Ordering::Relaxed), 1.0);
    }
}

#[test]
fn failing_cond_gate_suppresses_kernel_calls() {
    use std::sync::atomic::{AtomicUsize, Ordering as StdOrdering};

    /// Counts kernel invocations; the assertion is that it stays zero.
    struct CountingKernel {
        inner: PushMatVec,
        calls: AtomicUsize,
    }

    impl VertexProgram for CountingKernel {
        type SocketState = ();

        fn traversal_mode(&self) -> TraversalMode {
            TraversalMode::Push
        }

        fn state_size(&self) -> usize {
            8
        }

        fn build_socket_state(&self, _shard: &ShardGraph, _socket: usize) {}

        fn init_range(&self, range: Range<usize>) {
            self.inner.init_range(range);
        }

        fn reset(&self, _state: &(), _v: usize) -> bool {
            true
        }

        fn update(&self, state: &(), src: usize, dst: usize, edge: EdgeSlot) -> bool {
            self.calls.fetch_add(1, StdOrdering::Relaxed);
            self.inner.update(state, src, dst, edge)
        }

        fn update_atomic(&self, state: &(), src: usize, dst: usize, edge: EdgeSlot) -> bool {
            self.calls.fetch_add(1, StdOrdering::Relaxed);
            self.inner.update_atomic(state, src, dst, edge)
        }

        // every source fails the gate, emptying the effective frontier
        fn cond(&self, _dst: usize) -> bool {
            false
        }

        fn flip_global(&self) {
            self.inner.flip_global();
        }
    }

    let graph = Graph::from_edges(4, &[(0, 1, 1), (2, 3, 1)]);
    let sizes = vec![2, 2];
    let init = vec![1.0, 2.0, 3.0, 4.0];
    let program = Arc::new(CountingKernel {
        inner: PushMatVec::new(&sizes, init),
        calls: AtomicUsize::new(0),
    });
    let config = EngineConfig {
        sockets: 2,
        cores_per_socket: 2,
        socket_sizes: Some(sizes),
    };
    let engine = Engine::new(Arc::new(graph), config).unwrap();
    engine.run(Arc::clone(&program), 2).unwrap();
    assert_eq!(program.calls.load(StdOrdering::Relaxed), 0);
}
