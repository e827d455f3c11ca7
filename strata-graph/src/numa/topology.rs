//! NUMA Topology Discovery and Thread Binding
//!
//! The socket layout is discovered once at startup from
//! `/sys/devices/system/node`; there is no configuration file. Machines
//! without that hierarchy (containers, laptops, non-Linux) get a fallback
//! topology with a single synthetic node spanning every CPU, which turns the
//! engine into a plain shared-memory runtime.

use std::sync::OnceLock;

use super::{NumaError, Result};

static TOPOLOGY: OnceLock<Topology> = OnceLock::new();

/// A set of CPU ids, bitmask-backed (supports up to 512 CPUs).
#[derive(Debug, Clone, Default)]
pub struct CpuSet {
    mask: [u64; 8],
}

impl CpuSet {
    /// Creates an empty CPU set.
    pub const fn new() -> Self {
        Self { mask: [0; 8] }
    }

    /// Adds a CPU to the set.
    pub fn insert(&mut self, cpu: u32) {
        if (cpu as usize) < self.mask.len() * 64 {
            self.mask[(cpu / 64) as usize] |= 1 << (cpu % 64);
        }
    }

    /// Checks whether a CPU is in the set.
    pub fn contains(&self, cpu: u32) -> bool {
        (cpu as usize) < self.mask.len() * 64
            && self.mask[(cpu / 64) as usize] & (1 << (cpu % 64)) != 0
    }

    /// Number of CPUs in the set.
    pub fn count(&self) -> usize {
        self.mask.iter().map(|m| m.count_ones() as usize).sum()
    }

    /// Iterates over the CPUs in the set.
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        (0..(self.mask.len() as u32 * 64)).filter(|&cpu| self.contains(cpu))
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.mask.iter().all(|&m| m == 0)
    }
}

/// One NUMA node: its id and the CPUs attached to it.
#[derive(Debug, Clone)]
pub struct Node {
    id: u32,
    cpus: CpuSet,
}

impl Node {
    /// The kernel's node id.
    #[inline]
    pub fn id(&self) -> u32 {
        self.id
    }

    /// CPUs local to this node.
    #[inline]
    pub fn cpus(&self) -> &CpuSet {
        &self.cpus
    }
}

/// The machine's socket layout.
///
/// `sockets()` is the `S` of the engine's partition; `cores_per_socket()` is
/// the `C` fanned out below each socket worker.
#[derive(Debug)]
pub struct Topology {
    nodes: Vec<Node>,
    total_cpus: usize,
    numa_available: bool,
}

impl Topology {
    /// Gets or initialises the process-wide topology.
    pub fn get() -> &'static Self {
        TOPOLOGY.get_or_init(|| Self::discover().unwrap_or_else(Self::fallback))
    }

    /// Discovers the topology, or `None` when the sysfs hierarchy is absent.
    pub fn discover() -> Option<Self> {
        #[cfg(target_os = "linux")]
        {
            Self::discover_linux()
        }
        #[cfg(not(target_os = "linux"))]
        {
            None
        }
    }

    /// A single synthetic node covering every CPU.
    pub fn fallback() -> Self {
        let total_cpus = std::thread::available_parallelism()
            .map(|p| p.get())
            .unwrap_or(1);
        let mut cpus = CpuSet::new();
        for cpu in 0..total_cpus {
            cpus.insert(cpu as u32);
        }
        Self {
            nodes: vec![Node { id: 0, cpus }],
            total_cpus,
            numa_available: false,
        }
    }

    #[cfg(target_os = "linux")]
    fn discover_linux() -> Option<Self> {
        use std::fs;
        use std::path::Path;

        let base = Path::new("/sys/devices/system/node");
        if !base.exists() {
            return None;
        }

        let mut ids: Vec<u32> = Vec::new();
        for entry in fs::read_dir(base).ok()?.flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(rest) = name.strip_prefix("node") {
                if let Ok(id) = rest.parse::<u32>() {
                    ids.push(id);
                }
            }
        }
        if ids.is_empty() {
            return None;
        }
        ids.sort_unstable();

        let mut nodes = Vec::with_capacity(ids.len());
        let mut total_cpus = 0;
        for id in ids {
            let list = fs::read_to_string(base.join(format!("node{}/cpulist", id))).ok()?;
            let mut cpus = CpuSet::new();
            for cpu in parse_cpu_list(&list)? {
                cpus.insert(cpu);
            }
            total_cpus += cpus.count();
            nodes.push(Node { id, cpus });
        }

        let numa_available = nodes.len() > 1;
        Some(Self {
            nodes,
            total_cpus,
            numa_available,
        })
    }

    /// Number of sockets.
    #[inline]
    pub fn sockets(&self) -> usize {
        self.nodes.len()
    }

    /// Worker fan-out below each socket: total CPUs divided by sockets.
    #[inline]
    pub fn cores_per_socket(&self) -> usize {
        (self.total_cpus / self.nodes.len()).max(1)
    }

    /// Total CPUs across all nodes.
    #[inline]
    pub fn total_cpus(&self) -> usize {
        self.total_cpus
    }

    /// Whether more than one real node is present.
    #[inline]
    pub fn is_numa(&self) -> bool {
        self.numa_available
    }

    /// The node backing socket `s`, if the machine has one.
    pub fn node(&self, socket: usize) -> Option<&Node> {
        self.nodes.get(socket)
    }

    /// Pins the calling thread to socket `s`: CPU affinity restricted to the
    /// node's CPUs and memory policy bound to the node, so subsequent heap
    /// allocations by this thread fault onto local pages. Spawned children
    /// inherit both.
    ///
    /// Sockets beyond the physical node count (simulated multi-socket runs on
    /// small hosts) are reported as [`NumaError::UnknownSocket`]; callers
    /// treat that as non-fatal and continue unpinned.
    pub fn bind_current_thread(&self, socket: usize) -> Result<()> {
        let node = self
            .nodes
            .get(socket)
            .ok_or(NumaError::UnknownSocket(socket))?;

        #[cfg(target_os = "linux")]
        {
            bind_linux(node)
        }
        #[cfg(not(target_os = "linux"))]
        {
            let _ = node;
            Ok(())
        }
    }

    /// Sets the calling thread's memory policy to interleave pages across all
    /// nodes. Called once from the main thread before workers spawn, so state
    /// not explicitly placed (the global graph, mostly) spreads evenly
    /// instead of piling onto the node that happened to fault it.
    pub fn interleave_all(&self) {
        #[cfg(target_os = "linux")]
        {
            if !self.numa_available {
                return;
            }
            let mut nodemask: u64 = 0;
            for node in &self.nodes {
                if (node.id as usize) < crate::config::MAX_NUMA_NODES {
                    nodemask |= 1 << node.id;
                }
            }
            // MPOL_INTERLEAVE = 3; failure leaves the default policy in place.
            unsafe {
                libc::syscall(
                    libc::SYS_set_mempolicy,
                    3i32,
                    &nodemask as *const u64,
                    crate::config::MAX_NUMA_NODES as libc::c_ulong + 1,
                );
            }
        }
    }
}

#[cfg(target_os = "linux")]
fn bind_linux(node: &Node) -> Result<()> {
    unsafe {
        let mut cpuset: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_ZERO(&mut cpuset);
        for cpu in node.cpus.iter() {
            libc::CPU_SET(cpu as usize, &mut cpuset);
        }
        let rc = libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &cpuset);
        if rc != 0 {
            return Err(NumaError::AffinityError(*libc::__errno_location()));
        }

        // MPOL_BIND = 1. If the policy call fails (no NUMA, restricted
        // container) the affinity alone still keeps first-touch local.
        if (node.id as usize) < crate::config::MAX_NUMA_NODES {
            let nodemask: u64 = 1 << node.id;
            libc::syscall(
                libc::SYS_set_mempolicy,
                1i32,
                &nodemask as *const u64,
                crate::config::MAX_NUMA_NODES as libc::c_ulong + 1,
            );
        }
    }
    Ok(())
}

/// Parses a sysfs CPU list string such as `0-3,8-11`.
fn parse_cpu_list(s: &str) -> Option<Vec<u32>> {
    let mut cpus = Vec::new();
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Some(cpus);
    }
    for range in trimmed.split(',') {
        match range.split_once('-') {
            Some((lo, hi)) => {
                let lo: u32 = lo.parse().ok()?;
                let hi: u32 = hi.parse().ok()?;
                cpus.extend(lo..=hi);
            }
            None => cpus.push(range.parse().ok()?),
        }
    }
    Some(cpus)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_set() {
        let mut set = CpuSet::new();
        assert!(set.is_empty());
        set.insert(0);
        set.insert(63);
        set.insert(64);
        set.insert(300);
        assert!(set.contains(0));
        assert!(set.contains(63));
        assert!(set.contains(64));
        assert!(set.contains(300));
        assert!(!set.contains(1));
        assert_eq!(set.count(), 4);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![0, 63, 64, 300]);
    }

    #[test]
    fn test_parse_cpu_list() {
        assert_eq!(parse_cpu_list("0-3"), Some(vec![0, 1, 2, 3]));
        assert_eq!(parse_cpu_list("0,2,4"), Some(vec![0, 2, 4]));
        assert_eq!(parse_cpu_list("0-1,4-5"), Some(vec![0, 1, 4, 5]));
        assert_eq!(parse_cpu_list("7"), Some(vec![7]));
        assert_eq!(parse_cpu_list("  \n"), Some(vec![]));
        assert_eq!(parse_cpu_list("x"), None);
    }

    #[test]
    fn test_fallback_topology() {
        let topo = Topology::fallback();
        assert_eq!(topo.sockets(), 1);
        assert!(!topo.is_numa());
        assert!(topo.cores_per_socket() >= 1);
        assert_eq!(topo.node(0).unwrap().id(), 0);
        assert!(topo.node(1).is_none());
    }

    #[test]
    fn test_bind_unknown_socket() {
        let topo = Topology::fallback();
        assert_eq!(
            topo.bind_current_thread(9),
            Err(NumaError::UnknownSocket(9))
        );
    }
}
