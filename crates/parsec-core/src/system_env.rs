//! Environment backed by the operating system.
//!
//! Monotonic time comes from `std::time::Instant`, randomness from the OS
//! CSPRNG through getrandom, and backoff sleeps from Tokio's timer.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crate::env::Environment;

/// Environment for real sessions.
///
/// Every SCK seed, `createTSK` nonce and sealing nonce a production session
/// uses is drawn from here.
///
/// # Panics
///
/// [`Environment::random_bytes`] panics if the OS RNG fails: without it no
/// key or nonce can be produced safely.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// System environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    #[allow(clippy::expect_used)]
    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer).expect("invariant: OS RNG available for key and nonce generation");
    }

    fn wall_clock_secs(&self) -> u64 {
        SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, |since| since.as_secs())
    }
}
