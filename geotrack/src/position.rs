//! Core value types for position tracking.
//!
//! - [`ProviderId`] - Name of a position source ("gps", "network", ...)
//! - [`Position`] - A single fix reported by a provider
//! - [`Criteria`] - Desired quality used when asking for the best provider

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Mean Earth radius in meters.
const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Name of a position provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderId(String);

impl ProviderId {
    /// Create a provider id from its name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The provider name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProviderId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// A single position fix.
///
/// Immutable once constructed. Fixes are produced by a
/// [`PositionSource`](crate::source::PositionSource) or by decoding a
/// checkpoint written before a restart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    latitude: f64,
    longitude: f64,
    /// Horizontal accuracy radius in meters (lower is better).
    accuracy: f32,
    timestamp: DateTime<Utc>,
    provider: ProviderId,
}

impl Position {
    /// Create a fix with an explicit timestamp.
    pub fn new(
        latitude: f64,
        longitude: f64,
        accuracy: f32,
        timestamp: DateTime<Utc>,
        provider: ProviderId,
    ) -> Self {
        Self {
            latitude,
            longitude,
            accuracy,
            timestamp,
            provider,
        }
    }

    /// Create a fix stamped with the current time.
    pub fn now(latitude: f64, longitude: f64, accuracy: f32, provider: ProviderId) -> Self {
        Self::new(latitude, longitude, accuracy, Utc::now(), provider)
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    pub fn accuracy(&self) -> f32 {
        self.accuracy
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn provider(&self) -> &ProviderId {
        &self.provider
    }

    /// Position as (latitude, longitude).
    pub fn coordinates(&self) -> (f64, f64) {
        (self.latitude, self.longitude)
    }

    /// Great-circle distance to another fix in meters (haversine).
    pub fn distance_m(&self, other: &Position) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let delta_lat = (other.latitude - self.latitude).to_radians();
        let delta_lon = (other.longitude - self.longitude).to_radians();

        let a = (delta_lat / 2.0).sin().powi(2)
            + lat1.cos() * lat2.cos() * (delta_lon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().asin();

        EARTH_RADIUS_M * c
    }
}

/// Largest accuracy radius, in meters, that still counts as fine.
pub const FINE_ACCURACY_M: f32 = 100.0;

/// Horizontal accuracy requested from a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Accuracy {
    /// Providers accurate to [`FINE_ACCURACY_M`] or better.
    #[default]
    Fine,
    /// Any provider.
    Coarse,
}

impl Accuracy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Accuracy::Fine => "fine",
            Accuracy::Coarse => "coarse",
        }
    }
}

impl std::str::FromStr for Accuracy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fine" => Ok(Accuracy::Fine),
            "coarse" => Ok(Accuracy::Coarse),
            other => Err(format!("unknown accuracy '{}'", other)),
        }
    }
}

/// Quality criteria for choosing a provider.
///
/// Power draw is never considered; among qualifying providers the most
/// accurate one wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Criteria {
    pub accuracy: Accuracy,
}

impl Criteria {
    pub fn new(accuracy: Accuracy) -> Self {
        Self { accuracy }
    }

    /// Whether a provider with the given accuracy radius qualifies.
    pub fn accepts(&self, accuracy_m: f32) -> bool {
        match self.accuracy {
            Accuracy::Fine => accuracy_m <= FINE_ACCURACY_M,
            Accuracy::Coarse => true,
        }
    }
}
