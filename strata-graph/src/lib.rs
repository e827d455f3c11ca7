//! Strata: a NUMA-Aware Runtime for Iterative Vertex-Centric Graph Computation
//!
//! This crate executes dense, iterative vertex programs (belief propagation,
//! SpMV, PageRank-style relaxations) over large in-memory graphs on
//! multi-socket machines. Its central idea is co-location: the vertex state
//! for an id range lives on the socket whose cores traverse the edges of that
//! range, so the per-iteration sweep touches almost exclusively local memory.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────── Socket 0 ─────────────────┐ ┌──────── Socket 1 ───────┐
//! │ socket worker (pins node 0)                │ │ socket worker (node 1)  │
//! │   graph shard [lo₀, hi₀)  local adjacency  │ │   graph shard [lo₁,hi₁) │
//! │   vertex arenas (striped)  local pages     │ │   ...                   │
//! │   ┌──────┬──────┬──────┐                   │ │   ┌──────┬──────┐       │
//! │   │ sub 0│ sub 1│ sub 2│  core shards      │ │   │ sub 0│ sub 1│       │
//! │   └──────┴──────┴──────┘                   │ │   └──────┴──────┘       │
//! └────────────────────────────────────────────┘ └─────────────────────────┘
//!          │  spin barriers (per-socket, per-submaster)  │
//!          └──────────── blocking phase barrier ─────────┘
//! ```
//!
//! The per-iteration loop is driven by two dense traversal primitives:
//! pull-style [`engine::edge_map_dense`] (gather over in-edges, owner-exclusive
//! writes) and push-style [`engine::edge_map_dense_forward`] (scatter over
//! out-edges, CAS-based cross-socket writes), plus a [`engine::vertex_map`]
//! side-effect pass. Synchronisation between phases uses a standard blocking
//! barrier across all workers; the iteration boundary collapses onto per-socket
//! submasters through lightweight spin barriers.
//!
//! # Module Map
//!
//! - [`sync`]: atomic float cells with CAS-loop `add`/`mul`/`div`, double
//!   buffering
//! - [`numa`]: topology discovery, thread binding, socket-striped arenas
//! - [`graph`]: immutable CSR graphs, loading, per-socket shard projection
//! - [`partition`]: socket and core-shard sizing, vertex id scattering
//! - [`frontier`]: per-socket active-vertex bitmaps with a global view
//! - [`barrier`]: the two-phase sense-reversing spin barrier
//! - [`engine`]: worker hierarchy, vertex-program contract, traversal
//!   primitives, driver loop

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod barrier;
pub mod engine;
pub mod frontier;
pub mod graph;
pub mod numa;
pub mod partition;
pub mod sync;

pub use engine::{Engine, EngineConfig, EngineError, RunStats, TraversalMode, VertexProgram};
pub use frontier::{Frontier, LocalFrontier};
pub use graph::{Graph, ShardGraph};
pub use numa::Topology;
pub use partition::ShardHasher;

/// Compile-time configuration constants.
pub mod config {
    /// Page granularity assumed for socket-range alignment and `mbind`.
    pub const PAGE_SIZE: usize = 4096;

    /// Cache line size used for padding contended words.
    pub const CACHE_LINE_SIZE: usize = 64;

    /// Upper bound on NUMA nodes representable in a policy nodemask.
    pub const MAX_NUMA_NODES: usize = 64;
}
