//! Proof-of-work admission tickets.
//!
//! The service hands out a task `{type, length, source}` when an SCK asks to
//! register. A solution is an 8 byte nonce such that
//! `digest(nonce || source)` has EXACTLY `length` leading zero bits.
//!
//! Bytes are taken in order; within a byte bits are read from the least
//! significant one, so a digest starting `0x00 0x68` counts 8 + 3 = 11:
//!
//! ```text
//! nonce  = [ low u32 LE | high u32 LE ]     (= u64 counter, little-endian)
//!
//! digest = 0x00      0x68 (0110_1000)  ...
//!          8 zeros   3 zeros, then a one   -> 11
//! ```
//!
//! Solving costs about `2^(length + 1)` digest evaluations, checking costs
//! one.

use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_384};
use thiserror::Error;

/// The only task kind this engine knows how to solve
pub const POW_KIND_LEADING_ZEROS: u8 = 1;

/// Size of an encoded solution
pub const POW_SOLUTION_SIZE: usize = 8;

/// Proof-of-work errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PowError {
    /// Task kind is not [`POW_KIND_LEADING_ZEROS`]
    #[error("unsupported POW task type {0}")]
    UnsupportedKind(u8),

    /// Requested zero-bit count exceeds the digest width
    #[error("POW length {length} exceeds digest width of {digest_bits} bits")]
    Unsatisfiable {
        /// Requested leading zero bits
        length: u32,
        /// Bits produced by the digest
        digest_bits: u32,
    },

    /// The whole 64-bit counter space was scanned without a match
    #[error("POW counter space exhausted")]
    Exhausted,
}

/// A POW task as issued by the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowTask {
    /// Task kind, only [`POW_KIND_LEADING_ZEROS`] is supported
    #[serde(rename = "type")]
    pub kind: u8,
    /// Required number of leading zero bits
    pub length: u32,
    /// Service-chosen source bytes appended to the nonce
    #[serde(alias = "salt", with = "serde_bytes")]
    pub source: Vec<u8>,
}

impl PowTask {
    /// Leading-zero task over `source`.
    pub fn new(length: u32, source: impl Into<Vec<u8>>) -> Self {
        Self { kind: POW_KIND_LEADING_ZEROS, length, source: source.into() }
    }
}

/// A solved nonce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PowSolution {
    counter: u64,
}

impl PowSolution {
    /// Counter value that solved the task.
    pub fn counter(&self) -> u64 {
        self.counter
    }

    /// Wire form: low 32-bit word first, each word little-endian.
    pub fn to_bytes(&self) -> [u8; POW_SOLUTION_SIZE] {
        self.counter.to_le_bytes()
    }

    /// Parse the wire form. `None` unless exactly 8 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let bytes: [u8; POW_SOLUTION_SIZE] = bytes.try_into().ok()?;
        Some(Self { counter: u64::from_le_bytes(bytes) })
    }
}

/// Count leading zero bits of a digest.
///
/// Bytes are scanned in order, each byte from its least significant bit,
/// stopping at the first one bit. Returns `8 * bytes.len()` for an all-zero
/// buffer.
pub fn count_leading_zero_bits(bytes: &[u8]) -> u32 {
    let mut count = 0;
    for &byte in bytes {
        if byte != 0 {
            return count + byte.trailing_zeros();
        }
        count += 8;
    }
    count
}

/// Solve `task` with SHA3-384.
pub fn solve(task: &PowTask) -> Result<PowSolution, PowError> {
    solve_with::<Sha3_384>(task)
}

/// Solve `task` with digest `D`.
///
/// Deterministic: the same task always yields the same (smallest) counter.
pub fn solve_with<D: Digest>(task: &PowTask) -> Result<PowSolution, PowError> {
    if task.kind != POW_KIND_LEADING_ZEROS {
        return Err(PowError::UnsupportedKind(task.kind));
    }
    let digest_bits = (<D as Digest>::output_size() * 8) as u32;
    if task.length > digest_bits {
        return Err(PowError::Unsatisfiable { length: task.length, digest_bits });
    }

    let mut counter = 0u64;
    loop {
        let mut digest = D::new();
        digest.update(counter.to_le_bytes());
        digest.update(&task.source);
        if count_leading_zero_bits(&digest.finalize()) == task.length {
            return Ok(PowSolution { counter });
        }
        counter = counter.checked_add(1).ok_or(PowError::Exhausted)?;
    }
}

/// Check a wire-form solution against `task` with SHA3-384.
pub fn check(task: &PowTask, solution: &[u8]) -> bool {
    check_with::<Sha3_384>(task, solution)
}

/// Check a wire-form solution against `task` with digest `D`.
///
/// False for an unsupported task kind or a solution that is not 8 bytes.
pub fn check_with<D: Digest>(task: &PowTask, solution: &[u8]) -> bool {
    if task.kind != POW_KIND_LEADING_ZEROS || solution.len() != POW_SOLUTION_SIZE {
        return false;
    }
    let mut digest = D::new();
    digest.update(solution);
    digest.update(&task.source);
    count_leading_zero_bits(&digest.finalize()) == task.length
}
