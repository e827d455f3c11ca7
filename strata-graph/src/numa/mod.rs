//! NUMA Topology and Socket-Local Memory
//!
//! Cross-socket memory traffic is the cost model this runtime is built
//! around: a core reading DRAM attached to another socket pays an
//! interconnect round trip on every miss. The engine therefore places each
//! vertex-state range, frontier bitmap, and adjacency shard on the socket
//! whose cores will sweep it.
//!
//! Two mechanisms achieve that placement:
//!
//! - [`Topology::bind_current_thread`] pins the calling thread to a socket's
//!   CPUs *and* restricts its memory policy to that node, so every ordinary
//!   allocation the socket worker makes afterwards (shard adjacency, offsets,
//!   bitmap words) faults onto local pages.
//! - [`StripedArena`] maps one contiguous virtual region and binds each
//!   socket's sub-range of pages to its node, giving all threads a uniform
//!   view of vertex state whose physical pages follow the partition.
//!
//! On hosts without NUMA (or non-Linux targets) both degrade to plain shared
//! memory; every operation stays correct, only the locality is lost.

mod arena;
mod topology;

pub use arena::{StripedArena, Zeroed};
pub use topology::{CpuSet, Topology};

/// Error types for NUMA operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NumaError {
    /// Reserving the arena's virtual region failed.
    AllocationFailed,
    /// A zero-byte or overflowing arena was requested.
    InvalidLength,
    /// Thread affinity could not be applied.
    AffinityError(i32),
    /// The socket index has no backing NUMA node.
    UnknownSocket(usize),
}

impl core::fmt::Display for NumaError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            NumaError::AllocationFailed => write!(f, "socket-striped allocation failed"),
            NumaError::InvalidLength => write!(f, "invalid arena length"),
            NumaError::AffinityError(errno) => {
                write!(f, "sched_setaffinity failed with errno {}", errno)
            }
            NumaError::UnknownSocket(s) => write!(f, "socket {} has no backing NUMA node", s),
        }
    }
}

impl std::error::Error for NumaError {}

/// Result type for NUMA operations.
pub type Result<T> = core::result::Result<T, NumaError>;
