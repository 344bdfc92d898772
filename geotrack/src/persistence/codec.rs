//! Byte encoding of checkpoints.
//!
//! [`JsonCodec`] wraps every value in a small versioned document:
//!
//! ```text
//! {"version":1,"listeners":[{"name":"fence","kind":"geofence","params":{"radius":"30"}}]}
//! {"version":1,"position":{"latitude":10.0,"longitude":20.0,...}}
//! ```

use serde::{Deserialize, Serialize};

use super::error::PersistenceError;
use crate::listener::ListenerRecord;
use crate::position::Position;

/// Current checkpoint format version.
pub const FORMAT_VERSION: u32 = 1;

/// Encodes and decodes checkpoint values.
pub trait Codec: Send + Sync {
    fn encode_position(&self, position: &Position) -> Result<Vec<u8>, PersistenceError>;

    fn decode_position(&self, bytes: &[u8]) -> Result<Position, PersistenceError>;

    fn encode_registry(&self, records: &[ListenerRecord]) -> Result<Vec<u8>, PersistenceError>;

    fn decode_registry(&self, bytes: &[u8]) -> Result<Vec<ListenerRecord>, PersistenceError>;
}

#[derive(Serialize)]
struct RegistryDocumentRef<'a> {
    version: u32,
    listeners: &'a [ListenerRecord],
}

#[derive(Deserialize)]
struct RegistryDocument {
    version: u32,
    listeners: Vec<ListenerRecord>,
}

#[derive(Serialize)]
struct PositionDocumentRef<'a> {
    version: u32,
    position: &'a Position,
}

#[derive(Deserialize)]
struct PositionDocument {
    version: u32,
    position: Position,
}

/// JSON codec backed by `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl JsonCodec {
    fn check_version(what: &'static str, found: u32) -> Result<(), PersistenceError> {
        if found == FORMAT_VERSION {
            Ok(())
        } else {
            Err(PersistenceError::UnsupportedVersion {
                what,
                found,
                expected: FORMAT_VERSION,
            })
        }
    }
}

impl Codec for JsonCodec {
    fn encode_position(&self, position: &Position) -> Result<Vec<u8>, PersistenceError> {
        serde_json::to_vec(&PositionDocumentRef {
            version: FORMAT_VERSION,
            position,
        })
        .map_err(|e| PersistenceError::Encode {
            what: "position",
            reason: e.to_string(),
        })
    }

    fn decode_position(&self, bytes: &[u8]) -> Result<Position, PersistenceError> {
        let document: PositionDocument =
            serde_json::from_slice(bytes).map_err(|e| PersistenceError::Decode {
                what: "position",
                reason: e.to_string(),
            })?;
        Self::check_version("position", document.version)?;
        Ok(document.position)
    }

    fn encode_registry(&self, records: &[ListenerRecord]) -> Result<Vec<u8>, PersistenceError> {
        serde_json::to_vec(&RegistryDocumentRef {
            version: FORMAT_VERSION,
            listeners: records,
        })
        .map_err(|e| PersistenceError::Encode {
            what: "listener registry",
            reason: e.to_string(),
        })
    }

    fn decode_registry(&self, bytes: &[u8]) -> Result<Vec<ListenerRecord>, PersistenceError> {
        let document: RegistryDocument =
            serde_json::from_slice(bytes).map_err(|e| PersistenceError::Decode {
                what: "listener registry",
                reason: e.to_string(),
            })?;
        Self::check_version("listener registry", document.version)?;
        Ok(document.listeners)
    }
}
