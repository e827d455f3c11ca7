//! Page-placement probes built on `move_pages`.

use std::fs;

/// Errors from a placement probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    /// The platform exposes no NUMA query interface.
    Unsupported,
    /// `move_pages` (or affinity) failed with the given errno.
    Syscall(i32),
    /// The caller lacks the privilege to query page placement.
    InsufficientPrivileges,
    /// The page has not been faulted in yet.
    PageNotResident,
    /// A null or unmapped pointer was passed.
    InvalidPointer,
}

impl std::fmt::Display for ProbeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProbeError::Unsupported => write!(f, "placement queries unsupported on this platform"),
            ProbeError::Syscall(errno) => write!(f, "placement syscall failed with errno {}", errno),
            ProbeError::InsufficientPrivileges => {
                write!(f, "insufficient privileges for move_pages")
            }
            ProbeError::PageNotResident => write!(f, "page not resident"),
            ProbeError::InvalidPointer => write!(f, "invalid pointer"),
        }
    }
}

impl std::error::Error for ProbeError {}

/// Result type for probes.
pub type Result<T> = std::result::Result<T, ProbeError>;

/// NUMA node ids present on this machine, from sysfs. Empty or single-entry
/// results mean striping cannot be observed.
pub fn detect_nodes() -> Vec<u32> {
    let mut nodes = Vec::new();
    if let Ok(entries) = fs::read_dir("/sys/devices/system/node") {
        for entry in entries.flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(rest) = name.strip_prefix("node") {
                if let Ok(id) = rest.parse::<u32>() {
                    nodes.push(id);
                }
            }
        }
    }
    nodes.sort_unstable();
    nodes
}

/// Queries the physical node of the page containing `ptr` without moving it.
#[cfg(target_os = "linux")]
pub fn get_physical_node(ptr: *const u8) -> Result<i32> {
    if ptr.is_null() {
        return Err(ProbeError::InvalidPointer);
    }

    let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) } as usize;
    let page = ((ptr as usize) & !(page_size - 1)) as *mut libc::c_void;

    let mut pages = [page];
    let mut status = [-1i32];

    let rc = unsafe {
        libc::syscall(
            libc::SYS_move_pages,
            0i32,                    // current process
            1usize,                  // one page
            pages.as_mut_ptr(),
            std::ptr::null::<i32>(), // query only
            status.as_mut_ptr(),
            0i32,
        )
    };

    if rc != 0 {
        let errno = unsafe { *libc::__errno_location() };
        return Err(match errno {
            libc::EPERM => ProbeError::InsufficientPrivileges,
            libc::ENOENT => ProbeError::PageNotResident,
            _ => ProbeError::Syscall(errno),
        });
    }

    let node = status[0];
    if node < 0 {
        return Err(match -node {
            libc::ENOENT => ProbeError::PageNotResident,
            libc::EFAULT => ProbeError::InvalidPointer,
            errno => ProbeError::Syscall(errno),
        });
    }
    Ok(node)
}

/// Queries the physical node of the page containing `ptr`.
#[cfg(not(target_os = "linux"))]
pub fn get_physical_node(_ptr: *const u8) -> Result<i32> {
    Err(ProbeError::Unsupported)
}

/// Placement summary for one socket's stripe.
#[derive(Debug, Clone)]
pub struct SocketPlacement {
    /// Node the stripe should be on.
    pub expected_node: u32,
    /// Pages sampled.
    pub pages_checked: usize,
    /// Pages found on the expected node.
    pub pages_matched: usize,
    /// First node observed off the expected one, if any.
    pub first_mismatch: Option<i32>,
}

/// Placement summary for a striped allocation.
#[derive(Debug, Clone)]
pub struct StripeReport {
    /// Per-socket results, in partition order.
    pub sockets: Vec<SocketPlacement>,
    /// Whether every sampled page of every stripe matched.
    pub verified: bool,
    /// Why nothing could be sampled, when applicable.
    pub error: Option<ProbeError>,
}

/// Verifies a striped allocation against its partition.
///
/// `base` is the region start, `record_size` the bytes per record, and
/// `size_arr[s]` the record count of socket `s`'s stripe, expected on node
/// `s`. Samples up to `samples_per_stripe` pages per stripe, skipping the
/// unaligned boundary pages that the allocator leaves with their neighbour.
///
/// # Safety
///
/// `base` must point to a live allocation covering all stripes, with every
/// sampled page already faulted in (see [`prefault`]).
pub unsafe fn verify_stripes(
    base: *const u8,
    record_size: usize,
    size_arr: &[usize],
    samples_per_stripe: usize,
) -> StripeReport {
    let page_size = page_size();
    let mut sockets = Vec::with_capacity(size_arr.len());
    let mut verified = true;
    let mut error = None;

    let mut offset = 0usize;
    for (socket, &records) in size_arr.iter().enumerate() {
        let start = offset;
        let end = offset + records * record_size;
        offset = end;

        // interior pages only; boundary pages may legitimately belong to
        // the adjacent stripe
        let lo_page = start.div_ceil(page_size);
        let hi_page = end / page_size;

        let mut placement = SocketPlacement {
            expected_node: socket as u32,
            pages_checked: 0,
            pages_matched: 0,
            first_mismatch: None,
        };

        if lo_page < hi_page {
            let span = hi_page - lo_page;
            let step = (span / samples_per_stripe.max(1)).max(1);
            for page in (lo_page..hi_page).step_by(step) {
                match get_physical_node(base.add(page * page_size)) {
                    Ok(node) => {
                        placement.pages_checked += 1;
                        if node == socket as i32 {
                            placement.pages_matched += 1;
                        } else if placement.first_mismatch.is_none() {
                            placement.first_mismatch = Some(node);
                        }
                    }
                    Err(e) => {
                        if error.is_none() {
                            error = Some(e);
                        }
                    }
                }
            }
            if placement.pages_checked == 0 || placement.pages_matched != placement.pages_checked {
                verified = false;
            }
        }
        sockets.push(placement);
    }

    StripeReport {
        sockets,
        verified,
        error,
    }
}

/// Touches every page of `[ptr, ptr + len)` so placement can be queried.
///
/// # Safety
///
/// The range must be valid writable memory.
pub unsafe fn prefault(ptr: *mut u8, len: usize) {
    let page_size = page_size();
    let mut offset = 0;
    while offset < len {
        ptr.add(offset).write_volatile(0);
        offset += page_size;
    }
}

/// Pins the calling thread to one CPU.
#[cfg(target_os = "linux")]
pub fn pin_to_cpu(cpu: usize) -> Result<()> {
    unsafe {
        let mut cpuset: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_ZERO(&mut cpuset);
        libc::CPU_SET(cpu, &mut cpuset);
        let rc = libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &cpuset);
        if rc == 0 {
            Ok(())
        } else {
            Err(ProbeError::Syscall(*libc::__errno_location()))
        }
    }
}

/// Pins the calling thread to one CPU.
#[cfg(not(target_os = "linux"))]
pub fn pin_to_cpu(_cpu: usize) -> Result<()> {
    Err(ProbeError::Unsupported)
}

fn page_size() -> usize {
    #[cfg(target_os = "linux")]
    {
        unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize }
    }
    #[cfg(not(target_os = "linux"))]
    {
        4096
    }
}
