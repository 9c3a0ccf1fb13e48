//! Chaotic storage wrapper for fault injection testing
//!
//! Storage wrapper that randomly fails operations to test error handling and
//! recovery. Used for chaos testing to ensure the session surfaces storage
//! failures instead of corrupting its credential slots.

use std::sync::{Arc, Mutex};

use super::{SessionStorage, StorageError};

/// Chaotic storage wrapper that randomly injects failures
///
/// Delegates to an underlying storage implementation but randomly fails
/// operations based on a configured failure rate. Uses Arc<Mutex<>> for the
/// RNG state, making it Clone and thread-safe.
#[derive(Clone)]
pub struct ChaoticStorage<S: SessionStorage> {
    inner: S,
    /// Failure rate (0.0 = never fail, 1.0 = always fail)
    failure_rate: f64,
    /// RNG state for deterministic chaos
    rng: Arc<Mutex<ChaoticRng>>,
    /// Operation counter
    operation_count: Arc<Mutex<usize>>,
}

/// Simple deterministic RNG for chaos injection
///
/// Linear congruential generator (LCG): fast and reproducible with the same
/// seed.
struct ChaoticRng {
    state: u64,
}

impl ChaoticRng {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Generate next random value [0.0, 1.0)
    fn next(&mut self) -> f64 {
        // LCG constants from Numerical Recipes
        const A: u64 = 1_664_525;
        const C: u64 = 1_013_904_223;
        const M: u64 = 1u64 << 32;

        self.state = (A.wrapping_mul(self.state).wrapping_add(C)) % M;
        (self.state as f64) / (M as f64)
    }

    fn should_fail(&mut self, failure_rate: f64) -> bool {
        self.next() < failure_rate
    }
}

impl<S: SessionStorage> ChaoticStorage<S> {
    /// Create a new chaotic storage wrapper
    ///
    /// # Panics
    ///
    /// Panics if `failure_rate` is not in [0.0, 1.0]
    pub fn new(inner: S, failure_rate: f64) -> Self {
        Self::with_seed(inner, failure_rate, 0x1234_5678_9ABC_DEF0)
    }

    /// Create with explicit seed for reproducible chaos
    ///
    /// # Panics
    ///
    /// Panics if `failure_rate` is not in [0.0, 1.0]
    #[allow(clippy::panic)]
    pub fn with_seed(inner: S, failure_rate: f64, seed: u64) -> Self {
        assert!(
            (0.0..=1.0).contains(&failure_rate),
            "failure_rate must be between 0.0 and 1.0, got {failure_rate}"
        );

        Self {
            inner,
            failure_rate,
            rng: Arc::new(Mutex::new(ChaoticRng::new(seed))),
            operation_count: Arc::new(Mutex::new(0)),
        }
    }

    /// Underlying storage (for checking invariants after chaos).
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Total number of storage operations attempted.
    #[allow(clippy::expect_used)]
    pub fn operation_count(&self) -> usize {
        *self.operation_count.lock().expect("operation_count mutex poisoned")
    }

    /// Count the operation and decide whether it fails.
    #[allow(clippy::expect_used)]
    fn inject(&self) -> Result<(), StorageError> {
        *self.operation_count.lock().expect("operation_count mutex poisoned") += 1;
        if self.rng.lock().expect("ChaoticRng mutex poisoned").should_fail(self.failure_rate) {
            return Err(StorageError::Io("chaotic failure injection".to_string()));
        }
        Ok(())
    }
}

impl<S: SessionStorage> SessionStorage for ChaoticStorage<S> {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.inject()?;
        self.inner.get_item(key)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.inject()?;
        self.inner.set_item(key, value)
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.inject()?;
        self.inner.remove_item(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    #[test]
    fn zero_rate_never_fails() {
        let storage = ChaoticStorage::new(MemoryStorage::new(), 0.0);
        for i in 0..100 {
            storage.set_item(&format!("k{i}"), "v").unwrap();
        }
        assert_eq!(storage.operation_count(), 100);
        assert_eq!(storage.inner().len(), 100);
    }

    #[test]
    fn full_rate_always_fails_without_touching_inner() {
        let storage = ChaoticStorage::new(MemoryStorage::new(), 1.0);
        for _ in 0..10 {
            assert!(matches!(storage.set_item("k", "v"), Err(StorageError::Io(_))));
        }
        assert!(storage.inner().is_empty());
    }

    #[test]
    fn same_seed_same_failures() {
        let pattern = |seed| {
            let storage = ChaoticStorage::with_seed(MemoryStorage::new(), 0.5, seed);
            (0..32).map(|_| storage.get_item("k").is_err()).collect::<Vec<_>>()
        };
        assert_eq!(pattern(7), pattern(7));
    }
}
