//! Physical Placement Validation for Socket-Striped Memory
//!
//! The engine claims that vertex state for socket `s`'s id range lives on
//! node `s`. This crate checks that claim against the kernel: it queries the
//! physical node of sampled pages with the `move_pages` syscall (count and
//! node arrays, `nodes = NULL`, which reports without migrating) and compares
//! the answer to the partition that produced the allocation.
//!
//! Intended for test builds and benchmarks on genuinely multi-node hosts;
//! everything degrades to an explicit "not verifiable" result on single-node
//! machines, non-Linux targets, or without `CAP_SYS_NICE`.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

mod placement;

pub use placement::{
    detect_nodes, get_physical_node, pin_to_cpu, prefault, verify_stripes, ProbeError,
    SocketPlacement, StripeReport,
};
