//! Fuzz target for POW verification
//!
//! # Strategy
//!
//! - Arbitrary lengths (including beyond the digest width) and sources
//! - Arbitrary solution bytes, truncated or oversized
//!
//! # Invariants
//!
//! - `check` NEVER panics
//! - `check` accepts only 8 byte solutions
//! - A solved task under 8 bits always checks

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use parsec_core::{PowTask, pow};

#[derive(Debug, Clone, Arbitrary)]
struct PowInput {
    length: u32,
    source: Vec<u8>,
    solution: Vec<u8>,
}

fuzz_target!(|input: PowInput| {
    let task = PowTask::new(input.length, input.source.clone());
    if pow::check(&task, &input.solution) {
        assert_eq!(input.solution.len(), 8);
    }

    let small = PowTask::new(input.length % 8, input.source);
    let solution = pow::solve(&small).expect("a task under 8 bits is always solvable");
    assert!(pow::check(&small, &solution.to_bytes()));
});
