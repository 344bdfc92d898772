//! Configuration for the location tracker.
//!
//! Settings are read from `~/.geotrack/config.ini`:
//!
//! ```text
//! [tracking]
//! min_time_ms = 60000
//! min_distance_m = 10
//!
//! [storage]
//! directory = ~/.geotrack/data
//! registry_key = location_listeners
//! position_key = last_location
//! ```
//!
//! A missing file yields [`TrackerConfig::default`]. Settings structs live in
//! `settings`, constants in `defaults`, INI parsing in `parser`.

mod defaults;
mod file;
mod parser;
mod settings;

pub use defaults::*;
pub use file::{config_directory, config_file_path, ConfigFileError};
pub use settings::{StorageSettings, TrackerConfig, TrackingSettings};
