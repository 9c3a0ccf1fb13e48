//! Session configuration.

use std::time::Duration;

/// SCK strength for newly generated keys (RSA-equivalent bits).
pub const DEFAULT_KEY_STRENGTH: u32 = 4096;

/// Registrations attempted before provisioning fails.
pub const DEFAULT_MAX_REGISTRATION_ATTEMPTS: u32 = 5;

/// Delay after the first rejected registration, doubled on each further one.
pub const DEFAULT_REGISTRATION_BACKOFF: Duration = Duration::from_millis(500);

/// Upper bound for the registration backoff.
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(30);

/// `createTSK` attempts per session lifetime before an unknown service
/// signer discards the SCK.
pub const DEFAULT_TRUST_ATTEMPTS: u32 = 3;

/// `createTSK` rounds allowed within one negotiation.
pub const DEFAULT_MAX_TSK_ROUNDS: u32 = 3;

/// Session configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Ask the service for test-grade POW tasks
    pub test_mode: bool,
    /// Strength of newly generated SCKs
    pub key_strength: u32,
    /// Registrations attempted before giving up
    pub max_registration_attempts: u32,
    /// First registration backoff
    pub registration_backoff: Duration,
    /// Registration backoff cap
    pub max_backoff: Duration,
    /// Lifetime `createTSK` attempts before an untrusted signer escalates
    pub trust_attempts: u32,
    /// `createTSK` rounds per negotiation
    pub max_tsk_rounds: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            test_mode: false,
            key_strength: DEFAULT_KEY_STRENGTH,
            max_registration_attempts: DEFAULT_MAX_REGISTRATION_ATTEMPTS,
            registration_backoff: DEFAULT_REGISTRATION_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
            trust_attempts: DEFAULT_TRUST_ATTEMPTS,
            max_tsk_rounds: DEFAULT_MAX_TSK_ROUNDS,
        }
    }
}

impl SessionConfig {
    /// Set test mode.
    #[must_use]
    pub fn with_test_mode(mut self, test_mode: bool) -> Self {
        self.test_mode = test_mode;
        self
    }

    /// Set the SCK strength.
    #[must_use]
    pub fn with_key_strength(mut self, key_strength: u32) -> Self {
        self.key_strength = key_strength;
        self
    }

    /// Set the registration attempt budget.
    #[must_use]
    pub fn with_max_registration_attempts(mut self, attempts: u32) -> Self {
        self.max_registration_attempts = attempts;
        self
    }

    /// Set the registration backoff and its cap.
    #[must_use]
    pub fn with_registration_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.registration_backoff = initial;
        self.max_backoff = max;
        self
    }

    /// Set the lifetime trust budget.
    #[must_use]
    pub fn with_trust_attempts(mut self, attempts: u32) -> Self {
        self.trust_attempts = attempts;
        self
    }

    /// Set the per-negotiation `createTSK` round limit.
    #[must_use]
    pub fn with_max_tsk_rounds(mut self, rounds: u32) -> Self {
        self.max_tsk_rounds = rounds;
        self
    }

    /// Delay after the `attempt`-th rejected registration (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let doublings = attempt.saturating_sub(1).min(31);
        self.registration_backoff.saturating_mul(1 << doublings).min(self.max_backoff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = SessionConfig::default();
        assert!(!config.test_mode);
        assert_eq!(config.key_strength, 4096);
        assert_eq!(config.max_registration_attempts, 5);
        assert_eq!(config.trust_attempts, 3);
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let config = SessionConfig::default()
            .with_registration_backoff(Duration::from_millis(100), Duration::from_millis(350));

        assert_eq!(config.backoff_for(1), Duration::from_millis(100));
        assert_eq!(config.backoff_for(2), Duration::from_millis(200));
        assert_eq!(config.backoff_for(3), Duration::from_millis(350));
        assert_eq!(config.backoff_for(40), Duration::from_millis(350));
    }
}
