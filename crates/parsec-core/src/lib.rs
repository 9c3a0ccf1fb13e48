//! Parsec session engine
//!
//! Establishes and maintains an authenticated, encrypted session with a
//! Parsec service over any [`Connection`]. Key material is persisted through
//! a [`SessionStorage`] so a restarted client resumes its session instead of
//! registering again.
//!
//! # Key Hierarchy
//!
//! ```text
//! SCK ── registered once with a proof of work ──► SessionId
//!  │
//!  └── createTSK (signed by SCK, answered by a trusted service key)
//!          │
//!          ▼
//!         TSK ── seals every command sent through `cmd`
//! ```
//!
//! # Recovery
//!
//! - Rejected TSK: mint a new one with the cached SCK
//! - Rejected SCK: register a new SCK (bounded, with backoff)
//! - Unknown service signer: refresh the trusted addresses, bounded per
//!   session lifetime
//! - Transport failure: returned to the caller, nothing is regenerated
//!
//! Protocol logic is decoupled from time and randomness via [`Environment`],
//! so the whole flow runs deterministically under simulation.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod async_stored_value;
pub mod endpoint;
pub mod env;
pub mod error;
pub mod key_addresses;
pub mod pow;
pub mod protocol;
pub mod rpc;
pub mod session;
pub mod storage;
pub mod stored_value;
pub mod system_env;

pub use async_stored_value::{AsyncStoredValue, AsyncStringCodec};
pub use endpoint::{Endpoint, SerializedEndpoint};
pub use env::Environment;
pub use error::SessionError;
pub use key_addresses::KeyAddressProvider;
pub use pow::{PowError, PowSolution, PowTask};
pub use rpc::{CallError, Command, Connection, ErrorCode, RemoteError, Value};
pub use session::{Session, SessionConfig};
pub use storage::{
    CachedStorage, ChaoticStorage, EncryptedStorage, MemoryStorage, PrefixedStorage, RedbStorage,
    SessionStorage, StorageError,
};
pub use stored_value::{PlainText, StoredValue, StringCodec};
pub use system_env::SystemEnv;
