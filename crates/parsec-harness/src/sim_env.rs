//! Deterministic environment: seeded ChaCha RNG and Tokio time.
//!
//! Under a paused Tokio clock (`#[tokio::test(start_paused = true)]`) sleeps
//! advance virtual time instantly, so backoff schedules run without waiting.

use std::{
    future::Future,
    sync::{Arc, Mutex},
    time::Duration,
};

use parsec_core::Environment;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;

/// Wall clock reported at simulation start (2023-11-14T22:13:20Z).
pub const SIM_EPOCH_SECS: u64 = 1_700_000_000;

/// Simulation environment.
///
/// Clones share one RNG stream.
#[derive(Clone)]
pub struct SimEnv {
    rng: Arc<Mutex<ChaCha20Rng>>,
    started: tokio::time::Instant,
}

impl SimEnv {
    /// Environment with seed 0.
    pub fn new() -> Self {
        Self::with_seed(0)
    }

    /// Environment with an explicit seed.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Arc::new(Mutex::new(ChaCha20Rng::seed_from_u64(seed))),
            started: tokio::time::Instant::now(),
        }
    }

    /// Virtual time elapsed since creation.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

impl Default for SimEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment for SimEnv {
    type Instant = tokio::time::Instant;

    fn now(&self) -> Self::Instant {
        tokio::time::Instant::now()
    }

    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    #[allow(clippy::expect_used)]
    fn random_bytes(&self, buffer: &mut [u8]) {
        self.rng.lock().expect("Mutex poisoned").fill_bytes(buffer);
    }

    fn wall_clock_secs(&self) -> u64 {
        SIM_EPOCH_SECS + self.started.elapsed().as_secs()
    }
}

impl std::fmt::Debug for SimEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimEnv").finish_non_exhaustive()
    }
}
