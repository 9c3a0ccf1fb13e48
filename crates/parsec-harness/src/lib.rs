//! Deterministic simulation harness for Parsec session testing.
//!
//! [`SimService`] plays the Parsec service in-process and [`SimEnv`] supplies
//! seeded randomness and Tokio time, so every scenario (cold start, lost TSK,
//! rejected SCK, untrusted service, outages) replays identically.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod sim_env;
pub mod sim_service;

use std::sync::Arc;

use parsec_core::{KeyAddressProvider, MemoryStorage, Session, SessionConfig, SessionStorage};
pub use sim_env::SimEnv;
pub use sim_service::SimService;

/// Session running against the simulated service.
pub type SimSession<S = MemoryStorage> = Session<SimService, S, SimEnv>;

/// Config for simulated sessions: test-mode POW.
pub fn test_config() -> SessionConfig {
    SessionConfig::default().with_test_mode(true)
}

/// Session over `storage` trusting the service's real key.
pub fn connect<S: SessionStorage>(service: &Arc<SimService>, storage: S, env: SimEnv) -> SimSession<S> {
    connect_with(service, storage, service.addresses(), env, test_config())
}

/// Session with explicit trusted addresses and config.
pub fn connect_with<S: SessionStorage>(
    service: &Arc<SimService>,
    storage: S,
    addresses: KeyAddressProvider,
    env: SimEnv,
    config: SessionConfig,
) -> SimSession<S> {
    Session::new(storage, Arc::clone(service), addresses, env, config)
}
