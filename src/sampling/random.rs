// SPDX-License-Identifier: Apache-2.0 OR MIT
// Uniform random draws for probabilistic sampling

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Source of uniform draws in [0, 1)
pub trait RandomSource: Send + Sync {
    fn next_f64(&self) -> f64;
}

/// Per-thread RNG; no shared state between producers
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    #[inline]
    fn next_f64(&self) -> f64 {
        rand::thread_rng().gen::<f64>()
    }
}

/// Reproducible RNG for load generation runs
#[derive(Debug)]
pub struct SeededRandom {
    rng: Mutex<StdRng>,
}

impl SeededRandom {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl RandomSource for SeededRandom {
    fn next_f64(&self) -> f64 {
        self.rng
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .gen::<f64>()
    }
}

/// Cycles through a fixed list of draws
///
/// Lets callers force specific sampling outcomes, e.g. alternating
/// keep/drop to prove a cached decision is not re-drawn.
#[derive(Debug)]
pub struct ScriptedRandom {
    values: Vec<f64>,
    next: AtomicUsize,
}

impl ScriptedRandom {
    /// # Panics
    /// Panics if `values` is empty
    pub fn new(values: impl Into<Vec<f64>>) -> Self {
        let values = values.into();
        assert!(!values.is_empty(), "ScriptedRandom needs at least one value");
        Self {
            values,
            next: AtomicUsize::new(0),
        }
    }

    /// Number of draws taken so far
    pub fn draws(&self) -> usize {
        self.next.load(Ordering::Relaxed)
    }
}

impl RandomSource for ScriptedRandom {
    fn next_f64(&self) -> f64 {
        let idx = self.next.fetch_add(1, Ordering::Relaxed);
        self.values[idx % self.values.len()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_random_in_unit_interval() {
        let source = ThreadRandom;
        for _ in 0..1000 {
            let v = source.next_f64();
            assert!((0.0..1.0).contains(&v));
        }
    }

    #[test]
    fn test_seeded_random_is_reproducible() {
        let a = SeededRandom::new(42);
        let b = SeededRandom::new(42);
        let left: Vec<f64> = (0..10).map(|_| a.next_f64()).collect();
        let right: Vec<f64> = (0..10).map(|_| b.next_f64()).collect();
        assert_eq!(left, right);
    }

    #[test]
    fn test_scripted_random_cycles() {
        let source = ScriptedRandom::new([0.1, 0.9]);
        assert_eq!(source.next_f64(), 0.1);
        assert_eq!(source.next_f64(), 0.9);
        assert_eq!(source.next_f64(), 0.1);
        assert_eq!(source.draws(), 3);
    }
}
