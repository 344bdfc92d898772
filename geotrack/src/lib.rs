//! geotrack - durable device position tracking
//!
//! This library keeps a device subscribed to its best position provider and
//! fans position changes out to a registry of named listeners. Both the
//! registry and the last known fix survive process restarts.
//!
//! # Components
//!
//! - [`source`] - `PositionSource` abstraction over the OS location service
//! - [`selector`] - `ProviderSelector` choosing and switching providers
//! - [`pump`] - `UpdatePump` delivering fixes to listeners
//! - [`registry`] - `ListenerRegistry` of named listeners
//! - [`persistence`] - `PersistenceGateway` checkpoints
//! - [`tracker`] - `LocationTracker` service wiring it all together
//!
//! # Usage
//!
//! ```ignore
//! use geotrack::config::TrackerConfig;
//! use geotrack::tracker::LocationTracker;
//!
//! let tracker = LocationTracker::from_config(&TrackerConfig::load()?, source);
//! tracker.restore(&factory);
//! tracker.add_listener("geofence", geofence)?;
//! ```

pub mod config;
pub mod listener;
pub mod logging;
pub mod persistence;
pub mod position;
pub mod pump;
pub mod registry;
pub mod selector;
pub mod source;
pub mod tracker;

pub use listener::{ListenerError, ListenerFactory, ListenerRecord, PositionListener};
pub use position::{Position, ProviderId};
pub use tracker::{EventOutcome, LocationTracker, RestoreSummary, TrackerError};

/// Version of the geotrack library.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
