//! The Execution Engine
//!
//! One [`Engine::run`] call executes a [`VertexProgram`] for a bounded number
//! of iterations over a partitioned graph. The static thread layout is
//! `S x C`: one long-lived *socket worker* per socket, which pins itself to
//! its node, builds the socket's shard and state in local memory, and fans
//! out `C` *subworkers* that perform the dense traversal. There is no work
//! stealing and no pool resizing; the main thread only orchestrates startup
//! and joins.
//!
//! # Per-Iteration Protocol
//!
//! Every subworker executes, in lockstep:
//!
//! 1. submaster only: recount the input frontier's population
//! 2. clear the output frontier bits of this subworker's sub-range
//! 3. `vertex_map` (reset kernel) over the sub-range    [local spin barrier]
//! 4. `edge_map` in the program's traversal mode        [blocking barrier]
//! 5. buffer flips: process master flips the global vertex arenas, each
//!    submaster flips its socket's edge arenas          [blocking barrier]
//! 6. submasters synchronise globally, then release their subworkers
//!    locally (the hierarchical iteration boundary)
//!
//! Writes to `next` in iteration `k` are visible to reads of `curr` in
//! iteration `k + 1` through the step-6 barrier chain.

mod traverse;
mod worker;

pub use traverse::{
    edge_map_dense, edge_map_dense_forward, edge_map_dense_reduce, vertex_map, EdgeSlot,
    ReduceProgram,
};
pub use worker::Subworker;

use std::ops::Range;
use std::sync::{Arc, Barrier};
use std::time::{Duration, Instant};

use log::info;

use crate::barrier::SpinBarrier;
use crate::frontier::Frontier;
use crate::graph::{Graph, ShardGraph};
use crate::numa::NumaError;
use crate::partition::{page_aligned, Partition};
use crate::Topology;

/// Errors surfacing from engine startup. The iteration loop itself has no
/// recoverable failures.
#[derive(Debug)]
pub enum EngineError {
    /// Arena or shard allocation failed.
    Numa(NumaError),
    /// A worker thread could not be spawned.
    Spawn(std::io::Error),
    /// A worker thread panicked; the run is unrecoverable.
    WorkerPanicked {
        /// socket whose worker died
        socket: usize,
    },
    /// An explicit socket partition does not cover the vertex set.
    BadPartition {
        /// vertices the graph has
        expected: usize,
        /// vertices the partition covers
        actual: usize,
    },
    /// Zero sockets or cores were configured.
    EmptyLayout,
}

impl core::fmt::Display for EngineError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            EngineError::Numa(e) => write!(f, "numa error: {}", e),
            EngineError::Spawn(e) => write!(f, "worker spawn failed: {}", e),
            EngineError::WorkerPanicked { socket } => {
                write!(f, "worker for socket {} panicked", socket)
            }
            EngineError::BadPartition { expected, actual } => write!(
                f,
                "partition covers {} vertices, graph has {}",
                actual, expected
            ),
            EngineError::EmptyLayout => write!(f, "socket and core counts must be positive"),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::Numa(e) => Some(e),
            EngineError::Spawn(e) => Some(e),
            _ => None,
        }
    }
}

impl From<NumaError> for EngineError {
    fn from(e: NumaError) -> Self {
        EngineError::Numa(e)
    }
}

/// Result type for engine operations.
pub type Result<T> = core::result::Result<T, EngineError>;

/// Which dense sweep the per-iteration edge phase performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraversalMode {
    /// Gather: every local destination visits its in-edges; writes to `next`
    /// are owner-exclusive and need no synchronisation.
    Pull,
    /// Scatter: every active local source visits its out-edges; writes go
    /// through the atomic update path because destinations may be remote.
    Push,
}

/// The per-algorithm contract: state layout, kernels, and buffer flips.
///
/// The engine calls back into the program; the program supplies the
/// arithmetic. Vertex arenas are owned by the program (built over the socket
/// partition before the run); per-socket edge state is built by each socket
/// worker through [`VertexProgram::build_socket_state`].
pub trait VertexProgram: Send + Sync + 'static {
    /// Socket-local state: edge arenas, offsets, anything the kernels need
    /// beyond the global vertex arenas. Built on the bound socket thread so
    /// allocations fault locally.
    type SocketState: Send + Sync + 'static;

    /// The dense traversal this program's edge phase uses.
    fn traversal_mode(&self) -> TraversalMode;

    /// Size in bytes of one vertex-state record, for page-aligned socket
    /// sizing when no explicit partition is supplied.
    fn state_size(&self) -> usize;

    /// Builds socket `socket`'s local state from its shard.
    fn build_socket_state(&self, shard: &ShardGraph, socket: usize) -> Self::SocketState;

    /// Initialises the vertex arenas for one socket's range. Runs once per
    /// socket, on the bound socket worker, before iteration zero.
    fn init_range(&self, range: Range<usize>);

    /// Per-vertex reset applied at iteration start (typically zeroes the
    /// `next` record of `v`). The return value mirrors the kernel contract
    /// but is unused by the reset pass.
    fn reset(&self, state: &Self::SocketState, v: usize) -> bool;

    /// Non-atomic edge kernel: folds edge `(src, dst)` into `next[dst]`.
    /// Only called when the executing subworker owns `dst`. Returns whether
    /// `dst` became active.
    fn update(&self, state: &Self::SocketState, src: usize, dst: usize, edge: EdgeSlot) -> bool;

    /// Atomic edge kernel: like [`Self::update`] but `dst` may belong to any
    /// socket, so mutation must go through CAS-loop primitives.
    fn update_atomic(
        &self,
        state: &Self::SocketState,
        src: usize,
        dst: usize,
        edge: EdgeSlot,
    ) -> bool;

    /// Gate on further edge visits to `dst`; checked before and between
    /// kernel calls so a destination can stop early once settled.
    fn cond(&self, _dst: usize) -> bool {
        true
    }

    /// Swaps the global `curr`/`next` vertex arenas. Called exactly once per
    /// iteration, by the process master, between phase barriers.
    fn flip_global(&self) {}

    /// Swaps socket-local `curr`/`next` edge arenas. Called once per
    /// iteration per socket, by the submaster, between phase barriers.
    fn flip_socket(&self, _state: &Self::SocketState) {}
}

/// Thread layout and partition override for a run.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Socket workers to launch (`S`).
    pub sockets: usize,
    /// Subworkers per socket (`C`).
    pub cores_per_socket: usize,
    /// Explicit per-socket vertex counts; defaults to the page-aligned
    /// equal split over the program's record size.
    pub socket_sizes: Option<Vec<usize>>,
}

impl EngineConfig {
    /// Layout matching the machine: one worker per NUMA node, total CPUs
    /// divided by nodes below each.
    pub fn detect() -> Self {
        let topo = Topology::get();
        Self {
            sockets: topo.sockets(),
            cores_per_socket: topo.cores_per_socket(),
            socket_sizes: None,
        }
    }
}

/// Timing of a completed run.
#[derive(Debug, Clone, Copy)]
pub struct RunStats {
    /// Wall-clock time of the iteration phase (workers released to joined).
    pub elapsed: Duration,
}

/// Shared run state handed to every worker.
pub(crate) struct Shared<P: VertexProgram> {
    pub(crate) graph: Arc<Graph>,
    pub(crate) partition: Partition,
    pub(crate) program: Arc<P>,
    pub(crate) input: Frontier,
    pub(crate) output: Frontier,
    /// Blocking barrier across all `S * C` subworkers; separates the
    /// per-iteration phases.
    pub(crate) phase: Barrier,
    /// Blocking barrier across the `S` socket workers, for registration
    /// ordering at startup.
    pub(crate) setup: Barrier,
    /// Socket workers plus the main thread; releases the timed section.
    pub(crate) timer: Barrier,
    /// Spin barrier across the `S` submasters.
    pub(crate) submaster_spin: Arc<SpinBarrier>,
    pub(crate) cores: usize,
    pub(crate) max_iter: i64,
}

/// A configured engine, ready to execute programs over one graph.
pub struct Engine {
    graph: Arc<Graph>,
    config: EngineConfig,
}

impl Engine {
    /// Validates the layout and wraps the graph.
    pub fn new(graph: Arc<Graph>, config: EngineConfig) -> Result<Self> {
        if config.sockets == 0 || config.cores_per_socket == 0 {
            return Err(EngineError::EmptyLayout);
        }
        if let Some(sizes) = &config.socket_sizes {
            let covered: usize = sizes.iter().sum();
            if sizes.len() != config.sockets || covered != graph.n() {
                return Err(EngineError::BadPartition {
                    expected: graph.n(),
                    actual: covered,
                });
            }
        }
        Ok(Self { graph, config })
    }

    /// The socket partition a run of `program` would use.
    pub fn partition_for(&self, state_size: usize) -> Partition {
        match &self.config.socket_sizes {
            Some(sizes) => Partition::from_sizes(sizes.clone()),
            None => Partition::from_sizes(page_aligned(
                self.graph.n(),
                self.config.sockets,
                state_size,
            )),
        }
    }

    /// Executes `program` for `max_iter` iterations.
    ///
    /// `max_iter == 0` performs no iterations (state keeps its post-init
    /// values); a negative bound iterates forever and never returns. The
    /// bound is the only termination criterion.
    pub fn run<P: VertexProgram>(&self, program: Arc<P>, max_iter: i64) -> Result<RunStats> {
        let sockets = self.config.sockets;
        let cores = self.config.cores_per_socket;
        let partition = self.partition_for(program.state_size());

        info!(
            "launching {} x {} workers over {} vertices, {} edges",
            sockets,
            cores,
            self.graph.n(),
            self.graph.m()
        );

        let shared = Arc::new(Shared {
            graph: Arc::clone(&self.graph),
            partition,
            program,
            input: Frontier::new(sockets),
            output: Frontier::new(sockets),
            phase: Barrier::new(sockets * cores),
            setup: Barrier::new(sockets),
            timer: Barrier::new(sockets + 1),
            submaster_spin: Arc::new(SpinBarrier::new(sockets)),
            cores,
            max_iter,
        });

        let mut handles = Vec::with_capacity(sockets);
        for tid in 0..sockets {
            let shared = Arc::clone(&shared);
            let handle = std::thread::Builder::new()
                .name(format!("strata-socket-{}", tid))
                .spawn(move || worker::socket_worker(shared, tid))
                .map_err(EngineError::Spawn)?;
            handles.push(handle);
        }

        shared.timer.wait();
        let start = Instant::now();
        for (tid, handle) in handles.into_iter().enumerate() {
            handle
                .join()
                .map_err(|_| EngineError::WorkerPanicked { socket: tid })??;
        }
        let elapsed = start.elapsed();
        info!("iteration phase took {:.3?}", elapsed);
        Ok(RunStats { elapsed })
    }
}
