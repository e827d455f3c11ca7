//! Loopy belief propagation driver.
//!
//! Runs synchronous belief propagation over a pairwise Markov random field
//! laid out on the graph: each vertex carries a product accumulator over
//! `NSTATES` states, each edge a message vector. One iteration recomputes
//! every message from the source's current product and folds it into the
//! destination's next product; messages and products are double-buffered and
//! swap at the iteration boundary.
//!
//! Vertex and pairwise potentials are initialised uniformly here; a real
//! deployment would read them alongside the graph.

use std::io::{BufWriter, Write};
use std::ops::Range;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use strata_graph::engine::{EdgeSlot, TraversalMode, VertexProgram};
use strata_graph::graph::load_graph;
use strata_graph::numa::{StripedArena, Zeroed};
use strata_graph::sync::atomic::Ordering;
use strata_graph::sync::{AtomicF32, DoubleBuffer};
use strata_graph::{Engine, EngineConfig, ShardGraph, Topology};

/// States per vertex in the pairwise model.
const NSTATES: usize = 2;

#[derive(Parser, Debug)]
#[command(about = "NUMA-aware loopy belief propagation over a pairwise MRF")]
struct Args {
    /// Path to the graph file.
    input: PathBuf,

    /// Iteration bound; 0 runs no iterations, negative iterates forever.
    #[arg(default_value_t = -1, allow_negative_numbers = true)]
    max_iter: i64,

    /// Dump the state-0 product per vertex after the run.
    #[arg(short = 'r', long)]
    result: bool,

    /// Input adjacency is symmetric (undirected).
    #[arg(short = 's', long)]
    symmetric: bool,

    /// Input file is in the binary layout.
    #[arg(short = 'b', long)]
    binary: bool,
}

/// Per-vertex message-product accumulator.
struct VertexState {
    product: [AtomicF32; NSTATES],
}

// SAFETY: zero bits decode as 0.0 in every slot; no drop glue.
unsafe impl Zeroed for VertexState {}

/// Per-edge message vector, double-buffered in socket-local memory.
struct EdgeMessage {
    belief: [AtomicF32; NSTATES],
}

impl EdgeMessage {
    fn zeroed() -> Self {
        Self {
            belief: [AtomicF32::new(0.0), AtomicF32::new(0.0)],
        }
    }
}

/// Constant pairwise potential of one edge.
#[derive(Clone, Copy)]
struct EdgePotential {
    table: [[f32; NSTATES]; NSTATES],
}

/// Socket-local BP state: edge potentials, message buffers, and the offsets
/// that place edge `k` of local vertex `i` at `offsets[i] + k`.
struct BpSocketState {
    range: Range<usize>,
    offsets: Box<[usize]>,
    edge_w: Box<[EdgePotential]>,
    messages: DoubleBuffer<Box<[EdgeMessage]>>,
}

/// The belief propagation kernel.
struct Bp {
    /// Per-vertex observation potential, read-only during iteration.
    vertex_potential: Box<[[f32; NSTATES]]>,
    /// Product accumulators, striped over the socket partition.
    products: DoubleBuffer<StripedArena<VertexState>>,
}

impl Bp {
    fn new(socket_sizes: &[usize], n: usize) -> Result<Self> {
        let a = StripedArena::new(socket_sizes).context("allocating product arena")?;
        let b = StripedArena::new(socket_sizes).context("allocating product arena")?;
        Ok(Self {
            vertex_potential: vec![[1.0 / NSTATES as f32; NSTATES]; n].into_boxed_slice(),
            products: DoubleBuffer::new(a, b),
        })
    }

    fn result(&self) -> &StripedArena<VertexState> {
        self.products.curr()
    }

    /// Message slot of `edge` into local destination `dst`.
    fn slot(state: &BpSocketState, dst: usize, edge: &EdgeSlot) -> usize {
        state.offsets[dst - state.range.start] + edge.index
    }

    /// Recomputes the message on `edge` from `dst`'s current product and
    /// returns the per-state beliefs.
    fn recompute_message(
        &self,
        state: &BpSocketState,
        dst: usize,
        edge: &EdgeSlot,
    ) -> [f32; NSTATES] {
        let idx = Self::slot(state, dst, edge);
        let curr = self.products.curr().as_slice();
        let msgs = &state.messages.next()[idx];
        let mut beliefs = [0.0f32; NSTATES];
        for (i, belief) in beliefs.iter_mut().enumerate() {
            let mut acc = 0.0f32;
            for j in 0..NSTATES {
                acc += self.vertex_potential[dst][j]
                    * state.edge_w[idx].table[i][j]
                    * curr[dst].product[j].load(Ordering::Relaxed);
            }
            msgs.belief[i].store(acc, Ordering::Relaxed);
            *belief = acc;
        }
        beliefs
    }
}

impl VertexProgram for Bp {
    type SocketState = BpSocketState;

    fn traversal_mode(&self) -> TraversalMode {
        TraversalMode::Pull
    }

    fn state_size(&self) -> usize {
        core::mem::size_of::<VertexState>()
    }

    fn build_socket_state(&self, shard: &ShardGraph, _socket: usize) -> BpSocketState {
        let n_local = shard.len();
        let mut offsets = Vec::with_capacity(n_local);
        let mut acc = 0usize;
        for local in 0..n_local {
            offsets.push(acc);
            acc += shard.fake_degree(local) as usize;
        }
        let uniform = EdgePotential {
            table: [[1.0; NSTATES]; NSTATES],
        };
        let fill = |_| EdgeMessage::zeroed();
        BpSocketState {
            range: shard.range.clone(),
            offsets: offsets.into_boxed_slice(),
            edge_w: vec![uniform; acc].into_boxed_slice(),
            messages: DoubleBuffer::new(
                (0..acc).map(fill).collect(),
                (0..acc).map(fill).collect(),
            ),
        }
    }

    fn init_range(&self, range: Range<usize>) {
        for buf in [self.products.curr(), self.products.next()] {
            for v in range.clone() {
                for p in &buf.as_slice()[v].product {
                    p.store(1.0, Ordering::Relaxed);
                }
            }
        }
    }

    fn reset(&self, _state: &BpSocketState, v: usize) -> bool {
        for p in &self.products.next().as_slice()[v].product {
            p.store(1.0, Ordering::Relaxed);
        }
        true
    }

    fn update(&self, state: &BpSocketState, _src: usize, dst: usize, edge: EdgeSlot) -> bool {
        let beliefs = self.recompute_message(state, dst, &edge);
        let next = &self.products.next().as_slice()[dst];
        for (i, &b) in beliefs.iter().enumerate() {
            let p = &next.product[i];
            p.store(p.load(Ordering::Relaxed) * b, Ordering::Relaxed);
        }
        true
    }

    fn update_atomic(&self, state: &BpSocketState, _src: usize, dst: usize, edge: EdgeSlot) -> bool {
        let beliefs = self.recompute_message(state, dst, &edge);
        let next = &self.products.next().as_slice()[dst];
        for (i, &b) in beliefs.iter().enumerate() {
            next.product[i].fetch_mul(b);
        }
        true
    }

    fn flip_global(&self) {
        self.products.flip();
    }

    fn flip_socket(&self, state: &BpSocketState) {
        state.messages.flip();
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let topo = Topology::get();
    topo.interleave_all();

    let graph = load_graph(&args.input, args.symmetric, args.binary)
        .with_context(|| format!("while reading {}", args.input.display()))?;
    info!(
        "loaded {} vertices, {} edges from {}",
        graph.n(),
        graph.m(),
        args.input.display()
    );

    let mut config = EngineConfig::detect();
    let sizes = strata_graph::partition::page_aligned(
        graph.n(),
        config.sockets,
        core::mem::size_of::<VertexState>(),
    );
    config.socket_sizes = Some(sizes.clone());

    let program = Arc::new(Bp::new(&sizes, graph.n())?);
    let engine = Engine::new(Arc::new(graph), config)?;
    let stats = engine.run(Arc::clone(&program), args.max_iter)?;
    info!("belief propagation: {:.3?}", stats.elapsed);

    if args.result {
        dump(&program)?;
    }
    Ok(())
}

/// Writes the state-0 product per vertex; BP does not permute ids, so the
/// numbering is the input's.
fn dump(program: &Bp) -> Result<()> {
    let products = program.result().as_slice();
    let mut out = BufWriter::new(std::io::stdout().lock());
    for (i, state) in products.iter().enumerate() {
        writeln!(out, "{}\t{:.9e}", i, state.product[0].load(Ordering::Relaxed))?;
    }
    Ok(())
}
