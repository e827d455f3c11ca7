//! Physical placement of the striped arena, verified against the kernel.
//!
//! Meaningful only on a multi-node host with `move_pages` privileges; on
//! anything else the test reports what it saw and passes vacuously.

use strata_graph::config::PAGE_SIZE;
use strata_graph::numa::StripedArena;
use strata_graph::sync::atomic::Ordering;
use strata_graph::sync::AtomicF64;
use strata_validation::{detect_nodes, prefault, verify_stripes};

#[test]
fn striped_arena_pages_land_on_their_sockets() {
    let nodes = detect_nodes();
    if nodes.len() < 2 {
        println!("single-node host ({:?}); placement not observable", nodes);
        return;
    }

    // four pages of f64 records per socket
    let per_socket = 4 * PAGE_SIZE / core::mem::size_of::<f64>();
    let sockets = nodes.len().min(4);
    let sizes = vec![per_socket; sockets];
    let arena = StripedArena::<AtomicF64>::new(&sizes).unwrap();

    // fault every page in from this thread; mbind placement must win over
    // the toucher's locality
    for cell in arena.as_slice() {
        cell.store(1.0, Ordering::Relaxed);
    }
    unsafe {
        prefault(
            arena.base_ptr() as *mut u8,
            arena.len() * core::mem::size_of::<AtomicF64>(),
        );
    }

    let report = unsafe {
        verify_stripes(
            arena.base_ptr(),
            core::mem::size_of::<AtomicF64>(),
            &sizes,
            16,
        )
    };

    if let Some(err) = &report.error {
        println!("placement probe unavailable: {}", err);
        return;
    }

    for s in &report.sockets {
        println!(
            "node {}: {}/{} pages local (first mismatch {:?})",
            s.expected_node, s.pages_matched, s.pages_checked, s.first_mismatch
        );
    }
    assert!(
        report.verified,
        "striped arena pages strayed from their sockets: {:?}",
        report.sockets
    );
}
