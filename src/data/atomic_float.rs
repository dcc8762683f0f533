//! Atomic `f64` storage cell.
//!
//! Coefficient application adds into matrix and vector entries from many
//! threads at once. Rust has no native atomic float, so the value is kept as
//! its IEEE bit pattern in an `AtomicU64` and updated with a compare-exchange
//! loop. Non-finite values are stored as-is: a NaN in an assembled system is
//! a physics bug the solver must see.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

#[repr(transparent)]
#[derive(Default)]
pub struct AtomicF64 {
    bits: AtomicU64,
}

impl AtomicF64 {
    #[inline]
    pub fn new(value: f64) -> Self {
        Self {
            bits: AtomicU64::new(value.to_bits()),
        }
    }

    #[inline]
    pub fn zero() -> Self {
        Self::new(0.0)
    }

    #[inline]
    pub fn load(&self, ordering: Ordering) -> f64 {
        f64::from_bits(self.bits.load(ordering))
    }

    #[inline]
    pub fn store(&self, value: f64, ordering: Ordering) {
        self.bits.store(value.to_bits(), ordering);
    }

    /// Atomically add `delta`, returning the previous value.
    #[inline]
    pub fn fetch_add(&self, delta: f64, ordering: Ordering) -> f64 {
        let mut old_bits = self.bits.load(Ordering::Relaxed);
        loop {
            let new = f64::from_bits(old_bits) + delta;
            match self.bits.compare_exchange_weak(
                old_bits,
                new.to_bits(),
                ordering,
                Ordering::Relaxed,
            ) {
                Ok(_) => return f64::from_bits(old_bits),
                Err(current) => old_bits = current,
            }
        }
    }

    /// Exclusive write; needs no atomics.
    #[inline]
    pub fn set_mut(&mut self, value: f64) {
        *self.bits.get_mut() = value.to_bits();
    }

    #[inline]
    pub fn into_inner(self) -> f64 {
        f64::from_bits(self.bits.into_inner())
    }
}

impl Clone for AtomicF64 {
    fn clone(&self) -> Self {
        Self::new(self.load(Ordering::Relaxed))
    }
}

impl fmt::Debug for AtomicF64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.load(Ordering::Relaxed), f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_add_returns_previous() {
        let a = AtomicF64::new(1.5);
        assert_eq!(a.fetch_add(2.0, Ordering::Relaxed), 1.5);
        assert_eq!(a.load(Ordering::Relaxed), 3.5);
    }

    #[test]
    fn concurrent_adds_lose_nothing() {
        let a = AtomicF64::zero();
        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..1000 {
                        a.fetch_add(1.0, Ordering::Relaxed);
                    }
                });
            }
        });
        assert_eq!(a.load(Ordering::Relaxed), 8000.0);
    }

    #[test]
    fn nan_is_not_filtered() {
        let a = AtomicF64::zero();
        a.fetch_add(f64::NAN, Ordering::Relaxed);
        assert!(a.load(Ordering::Relaxed).is_nan());
    }

    #[test]
    fn exclusive_write_is_seen_by_loads() {
        let mut a = AtomicF64::new(4.0);
        a.set_mut(-1.0);
        assert_eq!(a.load(Ordering::Relaxed), -1.0);
        a.set_mut(0.0);
        assert_eq!(a.into_inner().to_bits(), 0.0f64.to_bits());
    }
}
