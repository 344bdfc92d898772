//! Default values for all configuration settings.

use std::path::PathBuf;

use super::file::config_directory;
use super::settings::{StorageSettings, TrackerConfig, TrackingSettings};
use crate::persistence::{DEFAULT_POSITION_KEY, DEFAULT_REGISTRY_KEY};
use crate::position::Accuracy;
use crate::source::{DEFAULT_MIN_DISTANCE_M, DEFAULT_MIN_TIME};

/// Default subdirectory of the config directory holding checkpoints.
pub const DEFAULT_STORAGE_SUBDIR: &str = "data";

/// Default storage directory (`~/.geotrack/data`).
pub fn default_storage_dir() -> PathBuf {
    config_directory().join(DEFAULT_STORAGE_SUBDIR)
}

impl Default for TrackingSettings {
    fn default() -> Self {
        Self {
            min_time: DEFAULT_MIN_TIME,
            min_distance_m: DEFAULT_MIN_DISTANCE_M,
            accuracy: Accuracy::Fine,
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            directory: default_storage_dir(),
            registry_key: DEFAULT_REGISTRY_KEY.to_string(),
            position_key: DEFAULT_POSITION_KEY.to_string(),
        }
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            tracking: TrackingSettings::default(),
            storage: StorageSettings::default(),
        }
    }
}
