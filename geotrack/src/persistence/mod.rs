//! Durable checkpoints for the listener registry and last known position.
//!
//! # Components
//!
//! - [`Codec`] - turns positions and registry records into bytes ([`JsonCodec`])
//! - [`ByteStore`] - keyed byte storage ([`FileStore`], [`MemoryStore`])
//! - [`PersistenceGateway`] - best-effort save/load on top of both
//!
//! The registry and the position live under two separate keys, so losing or
//! corrupting one checkpoint never affects the other.

mod codec;
mod error;
mod gateway;
mod storage;

pub use codec::{Codec, JsonCodec, FORMAT_VERSION};
pub use error::PersistenceError;
pub use gateway::PersistenceGateway;
pub use storage::{ByteStore, FileStore, MemoryStore};

/// Default storage key of the listener registry.
pub const DEFAULT_REGISTRY_KEY: &str = "location_listeners";

/// Default storage key of the last known position.
pub const DEFAULT_POSITION_KEY: &str = "last_location";
