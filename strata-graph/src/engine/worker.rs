//! Socket Workers and Subworkers
//!
//! The socket worker is the per-node setup thread: it binds itself (CPU
//! affinity and memory policy) to its node, builds everything its socket
//! needs in local memory, and fans out the subworkers that do the actual
//! per-iteration traversal. Subworkers inherit the node binding from their
//! parent.

use std::ops::Range;
use std::sync::Arc;

use log::debug;

use super::{traverse, EngineError, Result, Shared, TraversalMode, VertexProgram};
use crate::barrier::{SpinBarrier, SpinWaiter};
use crate::frontier::LocalFrontier;
use crate::graph::{graph_filter, graph_filter_two_direction, ShardGraph};
use crate::partition::sub_partition_by_degree;
use crate::Topology;

/// Per-thread traversal handle.
///
/// Identifies the worker within the hierarchy (`tid` = socket, `sub_tid` =
/// core), carries its dense sub-range, and owns its side of the two spin
/// barriers: the local one across the socket's `C` subworkers and the global
/// one across the `S` submasters.
pub struct Subworker {
    tid: usize,
    sub_tid: usize,
    dense: Range<usize>,
    local: SpinWaiter,
    submaster: SpinWaiter,
}

impl Subworker {
    pub(super) fn new(
        tid: usize,
        sub_tid: usize,
        dense: Range<usize>,
        local: Arc<SpinBarrier>,
        submaster: Arc<SpinBarrier>,
    ) -> Self {
        Self {
            tid,
            sub_tid,
            dense,
            local: SpinWaiter::new(local),
            submaster: SpinWaiter::new(submaster),
        }
    }

    /// Socket index.
    #[inline]
    pub fn tid(&self) -> usize {
        self.tid
    }

    /// Core index within the socket.
    #[inline]
    pub fn sub_tid(&self) -> usize {
        self.sub_tid
    }

    /// Whether this is the process master (`tid == 0` and `sub_tid == 0`).
    #[inline]
    pub fn is_master(&self) -> bool {
        self.tid == 0 && self.sub_tid == 0
    }

    /// Whether this is its socket's submaster (`sub_tid == 0`).
    #[inline]
    pub fn is_sub_master(&self) -> bool {
        self.sub_tid == 0
    }

    /// The global-id sub-range this subworker traverses densely.
    #[inline]
    pub fn dense_range(&self) -> Range<usize> {
        self.dense.clone()
    }

    /// Spin-rendezvous with the other subworkers of this socket.
    #[inline]
    pub fn local_sync(&mut self) {
        self.local.wait();
    }

    /// Spin-rendezvous with the other submasters. Submaster-only.
    #[inline]
    pub fn submaster_sync(&mut self) {
        debug_assert!(self.is_sub_master());
        self.submaster.wait();
    }
}

/// Body of one socket worker thread.
pub(super) fn socket_worker<P: VertexProgram>(shared: Arc<Shared<P>>, tid: usize) -> Result<()> {
    if let Err(e) = Topology::get().bind_current_thread(tid) {
        debug!("socket {}: running unpinned ({})", tid, e);
    }

    let range = shared.partition.range(tid);

    // Shard and socket state are built after the bind, so these allocations
    // fault onto this node.
    let shard = Arc::new(match shared.program.traversal_mode() {
        TraversalMode::Pull => graph_filter(&shared.graph, range.start, range.end),
        TraversalMode::Push => graph_filter_two_direction(&shared.graph, range.start, range.end),
    });
    let state = Arc::new(shared.program.build_socket_state(&shard, tid));
    shared.program.init_range(range.clone());

    let shard_sizes = sub_partition_by_degree(shard.fake_degrees(), shared.cores);
    debug!(
        "socket {}: {} local vertices, {} local edges, shards {:?}",
        tid,
        shard.len(),
        shard.local_edges(),
        shard_sizes
    );

    let input = Arc::new(LocalFrontier::full(range.clone()));
    let output = Arc::new(LocalFrontier::empty(range.clone()));

    // Registration window: every socket registers, then the master freezes
    // the id translation, then anyone may look bits up.
    shared.setup.wait();
    shared.input.register(tid, Arc::clone(&input));
    shared.output.register(tid, Arc::clone(&output));
    shared.setup.wait();
    if tid == 0 {
        shared.input.calculate_offsets();
        shared.output.calculate_offsets();
    }
    shared.setup.wait();

    // Releases the main thread's timer; everything above is untimed setup.
    shared.timer.wait();

    let local_spin = Arc::new(SpinBarrier::new(shared.cores));
    let mut subs = Vec::with_capacity(shared.cores);
    let mut pos = range.start;
    for sub_tid in 0..shared.cores {
        let dense = pos..pos + shard_sizes[sub_tid];
        pos = dense.end;
        let sub = Subworker::new(
            tid,
            sub_tid,
            dense,
            Arc::clone(&local_spin),
            Arc::clone(&shared.submaster_spin),
        );
        let shared = Arc::clone(&shared);
        let shard = Arc::clone(&shard);
        let state = Arc::clone(&state);
        let handle = std::thread::Builder::new()
            .name(format!("strata-worker-{}-{}", tid, sub_tid))
            .spawn(move || subworker_loop(shared, shard, state, sub))
            .map_err(EngineError::Spawn)?;
        subs.push(handle);
    }
    debug_assert_eq!(pos, range.end);

    for handle in subs {
        handle
            .join()
            .map_err(|_| EngineError::WorkerPanicked { socket: tid })?;
    }
    Ok(())
}

/// The per-iteration loop executed by every subworker.
fn subworker_loop<P: VertexProgram>(
    shared: Arc<Shared<P>>,
    shard: Arc<ShardGraph>,
    state: Arc<P::SocketState>,
    mut sub: Subworker,
) {
    let tid = sub.tid();
    let program = &*shared.program;

    // Single release point: every subworker of every socket exists and all
    // frontiers are frozen once this passes.
    shared.phase.wait();

    let mut iter: i64 = 0;
    loop {
        if shared.max_iter >= 0 && iter >= shared.max_iter {
            break;
        }
        iter += 1;

        if sub.is_sub_master() {
            shared.input.calculate_non_zero(tid);
        }
        shared.output.local(tid).clear_range(sub.dense_range());
        sub.local_sync();

        traverse::vertex_map(&shared.input, program, &state, sub.dense_range());
        shared.phase.wait();

        match program.traversal_mode() {
            TraversalMode::Pull => traverse::edge_map_dense(
                &shard,
                &shared.input,
                program,
                &state,
                sub.dense_range(),
            ),
            TraversalMode::Push => traverse::edge_map_dense_forward(
                &shard,
                &shared.input,
                &shared.output,
                program,
                &state,
                sub.dense_range(),
            ),
        }
        shared.phase.wait();

        // Buffer flips, then the hierarchical iteration boundary: the flips
        // happen-before the submaster rendezvous, which happens-before each
        // socket's local release, so every worker re-reads the flipped
        // handles in iteration k + 1.
        if sub.is_master() {
            program.flip_global();
        }
        if sub.is_sub_master() {
            program.flip_socket(&state);
            sub.submaster_sync();
        }
        sub.local_sync();
    }
}
