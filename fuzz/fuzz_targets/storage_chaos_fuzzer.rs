//! Fuzz target for stored values under storage failures
//!
//! Drives a [`StoredValue`] over [`ChaoticStorage`] and compares it with a
//! model of what the backing store accepted.
//!
//! # Strategy
//!
//! - Failure rates from 0% to 90%
//! - Interleaved writes, clears, reads and refreshes
//!
//! # Invariants
//!
//! - Storage errors propagate as `Err`, NEVER panic
//! - A successful read returns exactly the last accepted write
//! - A failed write leaves the cached value untouched

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use parsec_core::{ChaoticStorage, MemoryStorage, PlainText, SessionStorage, StoredValue};

#[derive(Debug, Clone, Arbitrary)]
struct ChaosScenario {
    /// Seed for ChaoticStorage RNG (deterministic failures)
    chaos_seed: u64,
    /// Failure rate 0-9 maps to 0%-90%
    failure_rate_tenth: u8,
    operations: Vec<ChaosOperation>,
}

#[derive(Debug, Clone, Arbitrary)]
enum ChaosOperation {
    Set(String),
    Clear,
    Read,
    Refresh,
}

fuzz_target!(|scenario: ChaosScenario| {
    let failure_rate = f64::from(scenario.failure_rate_tenth % 10) / 10.0;
    let inner = MemoryStorage::new();
    let storage = ChaoticStorage::with_seed(inner.clone(), failure_rate, scenario.chaos_seed);
    let mut value = StoredValue::new(storage, "slot", PlainText);

    // What the backing store holds according to accepted operations
    let mut accepted: Option<String> = None;

    for operation in scenario.operations {
        match operation {
            ChaosOperation::Set(text) => {
                if value.set(Some(text.clone())).is_ok() {
                    accepted = Some(text);
                }
            },
            ChaosOperation::Clear => {
                if value.clear().is_ok() {
                    accepted = None;
                }
            },
            ChaosOperation::Read => {
                if let Ok(read) = value.value() {
                    assert_eq!(read, accepted);
                }
            },
            ChaosOperation::Refresh => value.refresh(),
        }
        assert_eq!(inner.get_item("slot").expect("memory storage never fails"), accepted);
    }
});
