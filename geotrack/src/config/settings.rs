//! Settings structs, one per `[section]` of the INI file.

use std::path::PathBuf;
use std::time::Duration;

use crate::position::{Accuracy, Criteria};
use crate::source::SubscriptionParams;

/// Complete tracker configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerConfig {
    /// `[tracking]` section
    pub tracking: TrackingSettings,
    /// `[storage]` section
    pub storage: StorageSettings,
}

/// Subscription filtering applied by the position source.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackingSettings {
    /// Minimum time between two delivered fixes.
    pub min_time: Duration,
    /// Minimum distance in meters between two delivered fixes.
    pub min_distance_m: f32,
    /// Accuracy a provider must offer to be selected.
    pub accuracy: Accuracy,
}

/// Where checkpoints are written.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageSettings {
    /// Private directory holding the checkpoint files.
    pub directory: PathBuf,
    /// File name of the listener registry checkpoint.
    pub registry_key: String,
    /// File name of the last known position checkpoint.
    pub position_key: String,
}

impl TrackerConfig {
    pub fn with_min_time(mut self, min_time: Duration) -> Self {
        self.tracking.min_time = min_time;
        self
    }

    pub fn with_min_distance(mut self, min_distance_m: f32) -> Self {
        self.tracking.min_distance_m = min_distance_m;
        self
    }

    pub fn with_accuracy(mut self, accuracy: Accuracy) -> Self {
        self.tracking.accuracy = accuracy;
        self
    }

    pub fn with_storage_dir(mut self, directory: impl Into<PathBuf>) -> Self {
        self.storage.directory = directory.into();
        self
    }

    /// Subscription parameters derived from the `[tracking]` section.
    pub fn subscription_params(&self) -> SubscriptionParams {
        SubscriptionParams {
            min_time: self.tracking.min_time,
            min_distance_m: self.tracking.min_distance_m,
        }
    }

    /// Provider criteria derived from the `[tracking]` section.
    pub fn criteria(&self) -> Criteria {
        Criteria::new(self.tracking.accuracy)
    }
}
