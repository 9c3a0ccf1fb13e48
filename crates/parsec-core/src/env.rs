//! Time and randomness seam.
//!
//! The session engine never reads the clock or an RNG directly. Production
//! code passes [`SystemEnv`](crate::SystemEnv); simulations pass a seeded RNG
//! and a paused Tokio clock so negotiations replay byte for byte.

use std::time::Duration;

/// Source of time and randomness for a session.
///
/// Implementations must keep `now()` monotonic and, outside of tests, draw
/// `random_bytes()` from a cryptographically secure generator.
pub trait Environment: Clone + Send + Sync + 'static {
    /// Monotonic instant, used to measure negotiations.
    type Instant: Copy + Ord + Send + Sync + std::ops::Sub<Output = Duration>;

    /// Current monotonic time.
    fn now(&self) -> Self::Instant;

    /// Wait for `duration`. Only registration backoff sleeps.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;

    /// Fill `buffer` with random bytes.
    ///
    /// Seeded implementations must produce the same bytes for the same seed.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Seconds since the Unix epoch.
    ///
    /// Advisory only (TSK expiry), never used for ordering.
    fn wall_clock_secs(&self) -> u64;

    /// Random fixed-size array: key seeds and nonces.
    fn random_array<const N: usize>(&self) -> [u8; N] {
        let mut bytes = [0u8; N];
        self.random_bytes(&mut bytes);
        bytes
    }
}
