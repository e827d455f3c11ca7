//! Sparse matrix-vector multiplication driver.
//!
//! Treats the weighted graph as a sparse matrix and the vertex arena as the
//! vector: each iteration computes `next = A * curr` with push-forward
//! traversal, then swaps the buffers. The vector starts uniform at `1/n`.

use std::io::{BufWriter, Write};
use std::ops::Range;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use strata_graph::engine::{EdgeSlot, ReduceProgram, TraversalMode, VertexProgram};
use strata_graph::graph::load_graph;
use strata_graph::numa::StripedArena;
use strata_graph::partition;
use strata_graph::sync::atomic::Ordering;
use strata_graph::sync::{AtomicF64, DoubleBuffer};
use strata_graph::{Engine, EngineConfig, ShardGraph, ShardHasher, Topology};

#[derive(Parser, Debug)]
#[command(about = "NUMA-aware sparse matrix-vector multiplication over a weighted graph")]
struct Args {
    /// Path to the graph file.
    input: PathBuf,

    /// Iteration bound; 0 runs no iterations, negative iterates forever.
    #[arg(default_value_t = -1, allow_negative_numbers = true)]
    max_iter: i64,

    /// Dump the final vector, one `<id>\t<value>` line per vertex.
    #[arg(short = 'r', long)]
    result: bool,

    /// Input adjacency is symmetric (undirected).
    #[arg(short = 's', long)]
    symmetric: bool,

    /// Input file is in the binary layout.
    #[arg(short = 'b', long)]
    binary: bool,
}

/// The SpMV kernel over a double-buffered vector arena.
struct Spmv {
    vec: DoubleBuffer<StripedArena<AtomicF64>>,
    n: usize,
}

impl Spmv {
    fn new(socket_sizes: &[usize], n: usize) -> Result<Self> {
        let a = StripedArena::new(socket_sizes).context("allocating vector arena")?;
        let b = StripedArena::new(socket_sizes).context("allocating vector arena")?;
        Ok(Self {
            vec: DoubleBuffer::new(a, b),
            n,
        })
    }

    /// The vector produced by the last completed iteration.
    fn result(&self) -> &StripedArena<AtomicF64> {
        self.vec.curr()
    }
}

impl VertexProgram for Spmv {
    type SocketState = ();

    fn traversal_mode(&self) -> TraversalMode {
        TraversalMode::Push
    }

    fn state_size(&self) -> usize {
        core::mem::size_of::<f64>()
    }

    fn build_socket_state(&self, _shard: &ShardGraph, _socket: usize) {}

    fn init_range(&self, range: Range<usize>) {
        let uniform = 1.0 / self.n as f64;
        let curr = self.vec.curr().as_slice();
        let next = self.vec.next().as_slice();
        for v in range {
            curr[v].store(uniform, Ordering::Relaxed);
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
        let contribution = curr[src].load(Ordering::Relaxed) * edge.weight as f64;
        next.store(next.load(Ordering::Relaxed) + contribution, Ordering::Relaxed);
        true
    }

    fn update_atomic(&self, _state: &(), src: usize, dst: usize, edge: EdgeSlot) -> bool {
        let curr = self.vec.curr().as_slice();
        let contribution = curr[src].load(Ordering::Relaxed) * edge.weight as f64;
        self.vec.next().as_slice()[dst].fetch_add(contribution);
        true
    }

    fn flip_global(&self) {
        self.vec.flip();
    }
}

impl ReduceProgram for Spmv {
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

    // Scatter ids across sockets, then cut the permuted graph by degree so
    // every socket carries a comparable share of edge mass.
    let hasher = ShardHasher::new(graph.n(), config.sockets);
    let graph = Arc::new(graph.permute(&hasher));
    let sizes = partition::by_degree(&graph, config.sockets, core::mem::size_of::<f64>());
    config.socket_sizes = Some(sizes.clone());

    let program = Arc::new(Spmv::new(&sizes, graph.n())?);
    let engine = Engine::new(graph, config)?;
    let stats = engine.run(Arc::clone(&program), args.max_iter)?;
    info!("spmv: {:.3?}", stats.elapsed);

    if args.result {
        dump(&program, &hasher)?;
    }
    Ok(())
}

/// Writes the final vector in original vertex numbering.
fn dump(program: &Spmv, hasher: &ShardHasher) -> Result<()> {
    let values = program.result().as_slice();
    let mut out = BufWriter::new(std::io::stdout().lock());
    for i in 0..values.len() {
        let v = values[hasher.hash(i)].load(Ordering::Relaxed);
        writeln!(out, "{}\t{:.9e}", i, v)?;
    }
    Ok(())
}
