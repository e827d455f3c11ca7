//! Atomic Cells and Double Buffering
//!
//! Vertex state is stored in arenas of atomic floats. During owner-exclusive
//! phases (pull-mode traversal, per-range resets) a cell is touched by exactly
//! one worker and plain relaxed loads/stores suffice; during push-forward
//! traversal any socket may accumulate into any cell, which goes through the
//! CAS-loop read-modify-write operations below.
//!
//! Under `--cfg loom` all atomics come from Loom so the same code paths can
//! be exhaustively model-checked.

/// Atomic types, switchable to Loom's model-checking implementations.
#[cfg(loom)]
pub mod atomic {
    pub use loom::sync::atomic::{
        fence, AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering,
    };
}

/// Atomic types, switchable to Loom's model-checking implementations.
#[cfg(not(loom))]
pub mod atomic {
    pub use core::sync::atomic::{
        fence, AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering,
    };
}

use atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

/// An `f64` cell supporting lock-free accumulation from any thread.
///
/// The value is stored as its IEEE-754 bit pattern in an `AtomicU64`. The
/// read-modify-write operations retry a weak compare-exchange until the
/// observed bit pattern is unchanged, so they tolerate concurrent writers
/// from any socket to the same cell.
#[derive(Debug)]
pub struct AtomicF64(AtomicU64);

impl AtomicF64 {
    /// Creates a cell holding `v`.
    #[inline]
    pub fn new(v: f64) -> Self {
        Self(AtomicU64::new(v.to_bits()))
    }

    /// Loads the current value.
    #[inline]
    pub fn load(&self, order: Ordering) -> f64 {
        f64::from_bits(self.0.load(order))
    }

    /// Stores `v`.
    ///
    /// Only the owning worker may use plain stores on a cell; cross-socket
    /// mutation must go through [`Self::fetch_add`] and friends.
    #[inline]
    pub fn store(&self, v: f64, order: Ordering) {
        self.0.store(v.to_bits(), order);
    }

    /// Atomically adds `v`, returning the previous value.
    #[inline]
    pub fn fetch_add(&self, v: f64) -> f64 {
        self.rmw(|old| old + v)
    }

    /// Atomically multiplies by `v`, returning the previous value.
    #[inline]
    pub fn fetch_mul(&self, v: f64) -> f64 {
        self.rmw(|old| old * v)
    }

    /// Atomically divides by `v`, returning the previous value.
    #[inline]
    pub fn fetch_div(&self, v: f64) -> f64 {
        self.rmw(|old| old / v)
    }

    // Ordering across iterations is established by the phase barriers; the
    // CAS itself only needs atomicity.
    #[inline]
    fn rmw(&self, f: impl Fn(f64) -> f64) -> f64 {
        let mut old = self.0.load(Ordering::Relaxed);
        loop {
            let new = f(f64::from_bits(old)).to_bits();
            match self
                .0
                .compare_exchange_weak(old, new, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(prev) => return f64::from_bits(prev),
                Err(observed) => old = observed,
            }
        }
    }
}

impl Default for AtomicF64 {
    fn default() -> Self {
        Self::new(0.0)
    }
}

/// An `f32` cell supporting lock-free accumulation from any thread.
///
/// Same contract as [`AtomicF64`], over a 32-bit payload.
#[derive(Debug)]
pub struct AtomicF32(AtomicU32);

impl AtomicF32 {
    /// Creates a cell holding `v`.
    #[inline]
    pub fn new(v: f32) -> Self {
        Self(AtomicU32::new(v.to_bits()))
    }

    /// Loads the current value.
    #[inline]
    pub fn load(&self, order: Ordering) -> f32 {
        f32::from_bits(self.0.load(order))
    }

    /// Stores `v`. Owner-exclusive phases only.
    #[inline]
    pub fn store(&self, v: f32, order: Ordering) {
        self.0.store(v.to_bits(), order);
    }

    /// Atomically adds `v`, returning the previous value.
    #[inline]
    pub fn fetch_add(&self, v: f32) -> f32 {
        self.rmw(|old| old + v)
    }

    /// Atomically multiplies by `v`, returning the previous value.
    #[inline]
    pub fn fetch_mul(&self, v: f32) -> f32 {
        self.rmw(|old| old * v)
    }

    /// Atomically divides by `v`, returning the previous value.
    #[inline]
    pub fn fetch_div(&self, v: f32) -> f32 {
        self.rmw(|old| old / v)
    }

    #[inline]
    fn rmw(&self, f: impl Fn(f32) -> f32) -> f32 {
        let mut old = self.0.load(Ordering::Relaxed);
        loop {
            let new = f(f32::from_bits(old)).to_bits();
            match self
                .0
                .compare_exchange_weak(old, new, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(prev) => return f32::from_bits(prev),
                Err(observed) => old = observed,
            }
        }
    }
}

impl Default for AtomicF32 {
    fn default() -> Self {
        Self::new(0.0)
    }
}

/// The current/next pair of state buffers, flipped once per iteration.
///
/// Both buffers are allocated up front; the flip only toggles which one the
/// accessors resolve to. Exactly one worker (the process master for global
/// arenas, the socket submaster for socket-local arenas) calls [`Self::flip`]
/// per iteration, between the phase barriers, so every other worker re-reads
/// the handle and observes the swap before the next iteration starts.
#[derive(Debug)]
pub struct DoubleBuffer<T> {
    bufs: [T; 2],
    flipped: AtomicBool,
}

impl<T> DoubleBuffer<T> {
    /// Creates a handle where `curr` resolves to `a` and `next` to `b`.
    pub fn new(a: T, b: T) -> Self {
        Self {
            bufs: [a, b],
            flipped: AtomicBool::new(false),
        }
    }

    /// The buffer read during this iteration.
    #[inline]
    pub fn curr(&self) -> &T {
        &self.bufs[self.flipped.load(Ordering::Acquire) as usize]
    }

    /// The buffer written during this iteration.
    #[inline]
    pub fn next(&self) -> &T {
        &self.bufs[1 - self.flipped.load(Ordering::Acquire) as usize]
    }

    /// Swaps the roles of the two buffers.
    #[inline]
    pub fn flip(&self) {
        self.flipped.fetch_xor(true, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::atomic::Ordering;
    use super::*;

    #[test]
    fn test_f64_rmw() {
        let a = AtomicF64::new(2.0);
        assert_eq!(a.fetch_add(3.0), 2.0);
        assert_eq!(a.load(Ordering::Relaxed), 5.0);
        a.fetch_mul(4.0);
        assert_eq!(a.load(Ordering::Relaxed), 20.0);
        a.fetch_div(5.0);
        assert_eq!(a.load(Ordering::Relaxed), 4.0);
    }

    #[test]
    fn test_f32_rmw() {
        let a = AtomicF32::new(1.0);
        a.fetch_mul(0.5);
        a.fetch_add(0.25);
        assert_eq!(a.load(Ordering::Relaxed), 0.75);
    }

    #[test]
    fn test_concurrent_add() {
        use std::sync::Arc;

        let cell = Arc::new(AtomicF64::new(0.0));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let cell = Arc::clone(&cell);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        cell.fetch_add(1.0);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(cell.load(Ordering::Relaxed), 4000.0);
    }

    #[test]
    fn test_double_buffer_flip() {
        let db = DoubleBuffer::new(1u32, 2u32);
        assert_eq!(*db.curr(), 1);
        assert_eq!(*db.next(), 2);
        db.flip();
        assert_eq!(*db.curr(), 2);
        assert_eq!(*db.next(), 1);
        db.flip();
        assert_eq!(*db.curr(), 1);
    }
}
