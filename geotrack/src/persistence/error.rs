//! Error types for checkpoint storage.

use std::io;

use thiserror::Error;

/// Errors raised while reading or writing a checkpoint.
///
/// The gateway recovers from all of them locally; they are exposed so
/// callers of the `try_*` methods can inspect the fault.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// The storage medium could not be read.
    #[error("Failed to read checkpoint '{key}': {source}")]
    Read {
        key: String,
        #[source]
        source: io::Error,
    },

    /// The storage medium could not be written.
    #[error("Failed to write checkpoint '{key}': {source}")]
    Write {
        key: String,
        #[source]
        source: io::Error,
    },

    /// A value could not be encoded.
    #[error("Failed to encode {what}: {reason}")]
    Encode { what: &'static str, reason: String },

    /// Stored bytes could not be decoded.
    #[error("Failed to decode {what}: {reason}")]
    Decode { what: &'static str, reason: String },

    /// Stored bytes were written by an unknown format version.
    #[error("Unsupported {what} format version {found} (expected {expected})")]
    UnsupportedVersion {
        what: &'static str,
        found: u32,
        expected: u32,
    },
}
