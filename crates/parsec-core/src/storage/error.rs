//! Storage error types

use thiserror::Error;

/// Errors that can occur during storage operations
///
/// Errors are `Clone` so they can travel through the shared endpoint future
/// to every concurrent caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Serialization or deserialization failed
    ///
    /// Raised by value codecs when a stored string cannot be decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error (file system, database, etc.)
    #[error("I/O error: {0}")]
    Io(String),

    /// Encrypted store could not be opened or a value could not be decrypted
    #[error("storage crypto error: {0}")]
    Crypto(String),
}
