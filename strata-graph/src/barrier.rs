//! Two-Phase Sense-Reversing Spin Barrier
//!
//! The per-iteration synchronisation cost dominates runs with small iteration
//! counts, so the hot-path barriers never enter the kernel: arrival is a
//! single `fetch_add`, and waiting is a bounded spin on a shared sense word.
//!
//! Two instances exist per run: a *local* barrier across the subworkers of a
//! socket, and a *global* barrier across the per-socket submasters. Chaining
//! them (submasters synchronise globally, then release their subworkers
//! locally) gives an all-worker rendezvous whose cross-socket traffic is one
//! cache line per socket instead of one per core.

use std::sync::Arc;

use crossbeam_utils::CachePadded;

use crate::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Shared state of a spin barrier for a fixed set of participants.
///
/// The counter tracks arrivals in the current phase; the sense word flips
/// when the last participant arrives. Participants hold their phase parity in
/// a [`SpinWaiter`], which makes the barrier safely reusable back-to-back.
#[derive(Debug)]
pub struct SpinBarrier {
    count: CachePadded<AtomicUsize>,
    sense: CachePadded<AtomicBool>,
    participants: usize,
}

impl SpinBarrier {
    /// Creates a barrier for `participants` waiters.
    ///
    /// # Panics
    ///
    /// Panics if `participants` is zero.
    pub fn new(participants: usize) -> Self {
        assert!(participants > 0, "barrier needs at least one participant");
        Self {
            count: CachePadded::new(AtomicUsize::new(0)),
            sense: CachePadded::new(AtomicBool::new(false)),
            participants,
        }
    }

    /// Number of participants per phase.
    #[inline]
    pub fn participants(&self) -> usize {
        self.participants
    }
}

/// A participant's handle onto a [`SpinBarrier`].
///
/// Each participant must use its own waiter; the waiter carries the phase
/// sense that distinguishes round `k` from round `k + 1`.
#[derive(Debug)]
pub struct SpinWaiter {
    barrier: Arc<SpinBarrier>,
    sense: bool,
}

impl SpinWaiter {
    /// Creates a waiter starting at phase zero.
    pub fn new(barrier: Arc<SpinBarrier>) -> Self {
        Self {
            barrier,
            sense: false,
        }
    }

    /// Arrives at the barrier and spins until all participants have arrived.
    ///
    /// The last arrival resets the counter before flipping the sense, so a
    /// participant racing into the next phase observes a zeroed counter.
    /// The release store on the sense word publishes every write made before
    /// the barrier to every participant that observes the flip.
    pub fn wait(&mut self) {
        let next = !self.sense;
        let b = &*self.barrier;
        if b.count.fetch_add(1, Ordering::AcqRel) + 1 == b.participants {
            b.count.store(0, Ordering::Relaxed);
            b.sense.store(next, Ordering::Release);
        } else {
            while b.sense.load(Ordering::Acquire) != next {
                spin_wait();
            }
        }
        self.sense = next;
    }
}

#[cfg(not(loom))]
#[inline]
fn spin_wait() {
    std::hint::spin_loop();
}

// Loom requires spinning threads to yield so the scheduler can explore
// other interleavings.
#[cfg(loom)]
#[inline]
fn spin_wait() {
    loom::thread::yield_now();
}
