//! Fuzz target for everything decoded from service replies
//!
//! # Strategy
//!
//! - Random bytes fed to every command, reply and grant decoder
//! - The same bytes as a signed record, a packed key and a POW solution
//!
//! # Invariants
//!
//! - Decoders return `Err` on malformed input, NEVER panic
//! - A POW solution parses from exactly 8 bytes and encodes back to them
//! - A signed record that unpacks reports its own signer's address

#![no_main]

use libfuzzer_sys::fuzz_target;
use parsec_core::{
    Command, PowSolution,
    protocol::{CreateTskGrant, SessionInfo, TskGrant},
    rpc::from_bytes,
};
use parsec_crypto::{PrivateKey, SignedRecord};

fuzz_target!(|data: &[u8]| {
    let _ = Command::unpack(data);
    let _ = Command::unpack_command(data);
    let _ = from_bytes::<CreateTskGrant>(data);
    let _ = from_bytes::<TskGrant>(data);
    let _ = from_bytes::<SessionInfo>(data);
    let _ = PrivateKey::unpack(data);

    if let Some(solution) = PowSolution::from_bytes(data) {
        assert_eq!(solution.to_bytes().as_slice(), &data[..8]);
    }

    if let Ok(record) = SignedRecord::unpack(data) {
        assert_eq!(record.signer_address(), record.signer().address());
    }
});
